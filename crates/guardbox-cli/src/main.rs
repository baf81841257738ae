//! Guardbox CLI
//!
//! A command-line tool for running untrusted Python code under a policy.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use guardbox::activity::{Activity, ActivityEntry, CategorySummary};
use guardbox::{
    Config, EXAMPLE_CONFIG, EnforcementMode, ExecutionResult, Report, Supervisor,
};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

/// Exit code when the sandboxed code did not succeed
const EXIT_CODE_FAILED: u8 = 1;
/// Exit code when the sandbox itself could not run
const EXIT_INFRASTRUCTURE: u8 = 2;

#[derive(Parser)]
#[command(name = "guardbox")]
#[command(about = "Run untrusted Python code under an import, file and network policy")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: guardbox.toml)
        #[arg(short, long, default_value = "guardbox.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a Python script in the sandbox
    Run(RunArgs),

    /// Show a saved JSON report in detail
    ShowReport {
        /// Report file written by `run --report`
        #[arg(value_name = "FILE")]
        report: PathBuf,
    },

    /// Show the effective configuration
    ShowConfig,
}

#[derive(Args)]
struct RunArgs {
    /// Script to run
    #[arg(value_name = "FILE")]
    script: PathBuf,

    /// Execution timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Memory limit in MB
    #[arg(long)]
    memory: Option<u64>,

    /// CPU limit in percent
    #[arg(long)]
    cpu: Option<f64>,

    /// Allow opening files for reading
    #[arg(long)]
    allow_file_read: bool,

    /// Allow opening files for writing
    #[arg(long)]
    allow_file_write: bool,

    /// Allow outbound connections
    #[arg(long)]
    allow_network: bool,

    /// Module names to restrict (replaces the configured list)
    #[arg(long, num_args = 1.., value_name = "MODULE")]
    restricted_imports: Option<Vec<String>>,

    /// Module names always allowed, overriding restrictions
    #[arg(long, num_args = 1.., value_name = "MODULE")]
    allowed_imports: Option<Vec<String>>,

    /// Paths always allowed, overriding file restrictions
    #[arg(long, num_args = 1.., value_name = "PATH")]
    allowed_file_paths: Option<Vec<String>>,

    /// Addresses always allowed, overriding network restrictions
    #[arg(long, num_args = 1.., value_name = "ADDRESS")]
    allowed_network_addresses: Option<Vec<String>>,

    /// Record restricted operations but let them proceed
    #[arg(long)]
    audit: bool,

    /// Input file fed to the script's stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Path to save the JSON report
    #[arg(short, long)]
    report: Option<PathBuf>,
}

impl RunArgs {
    /// Apply command-line overrides on top of the loaded configuration
    fn apply(&self, config: &mut Config) {
        let limits = &mut config.limits;
        if let Some(timeout) = self.timeout {
            limits.timeout_seconds = timeout;
        }
        if let Some(memory) = self.memory {
            limits.memory_limit_mb = memory;
        }
        if let Some(cpu) = self.cpu {
            limits.cpu_limit_percent = cpu;
        }

        let policy = &mut config.policy;
        policy.allow_file_read |= self.allow_file_read;
        policy.allow_file_write |= self.allow_file_write;
        policy.allow_network |= self.allow_network;
        if self.audit {
            policy.mode = EnforcementMode::Audit;
        }
        if let Some(modules) = &self.restricted_imports {
            policy.restricted_imports = modules.iter().cloned().collect();
        }
        if let Some(modules) = &self.allowed_imports {
            policy.allowed_imports = modules.iter().cloned().collect();
        }
        if let Some(paths) = &self.allowed_file_paths {
            policy.allowed_file_paths = paths.iter().cloned().collect();
        }
        if let Some(addresses) = &self.allowed_network_addresses {
            policy.allowed_network_addresses = addresses.iter().cloned().collect();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_INFRASTRUCTURE)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // Load configuration
    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => {
            init_config(&output, force).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run(args) => run_script(config, &args).await,
        Commands::ShowReport { report } => {
            show_report(&report).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_script(mut config: Config, args: &RunArgs) -> Result<ExitCode> {
    args.apply(&mut config);
    config.validate().context("invalid options")?;

    let code = tokio::fs::read_to_string(&args.script)
        .await
        .with_context(|| format!("failed to read script '{}'", args.script.display()))?;

    let input_data = if let Some(input_path) = &args.input {
        Some(
            tokio::fs::read(input_path)
                .await
                .context("failed to read input file")?,
        )
    } else {
        None
    };

    info!(script = %args.script.display(), "running script");
    let supervisor = Supervisor::new(config);
    let result = supervisor
        .run(&code, input_data.as_deref())
        .await
        .context("sandbox could not run")?;

    // Child output first, as the script produced it
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);

    info!(
        status = ?result.status,
        duration = format_args!("{:.3}s", result.duration.as_secs_f64()),
        peak_memory_kb = result.peak_memory_kb,
        exit_code = result.exit_code,
        signal = result.signal,
        "execution result"
    );

    if let Some(path) = &args.report {
        let json =
            serde_json::to_string_pretty(&result.report).context("failed to serialize report")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("failed to write report to '{}'", path.display()))?;
        eprintln!("\nReport saved to {}", path.display());
    } else {
        print_summary(&result);
    }

    if result.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_CODE_FAILED))
    }
}

fn print_summary(result: &ExecutionResult) {
    let report = &result.report;
    let rule = "=".repeat(60);
    eprintln!("\n{rule}");
    eprintln!("SANDBOX ACTIVITY REPORT");
    eprintln!("{rule}");
    eprintln!("Status: {:?} ({})", result.status, result.termination_reason());
    eprintln!(
        "Execution time: {:.2}s",
        report.execution_summary.duration_seconds
    );
    eprintln!(
        "Total activities: {}",
        report.execution_summary.total_activities
    );
    eprintln!("Imports: {}", counts(&report.imports));
    eprintln!("File operations: {}", counts(&report.file_operations));
    eprintln!("Network operations: {}", counts(&report.network_operations));
    eprintln!("Exceptions: {}", report.exceptions.total);
    eprintln!("{rule}");
}

fn counts(summary: &CategorySummary) -> String {
    format!(
        "{} (allowed: {}, blocked: {})",
        summary.total, summary.allowed, summary.blocked
    )
}

async fn show_report(path: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read report '{}'", path.display()))?;
    let report: Report = serde_json::from_str(&content).context("failed to parse report")?;
    print!("{}", render_report(&report));
    Ok(())
}

fn render_report(report: &Report) -> String {
    use std::fmt::Write;

    let rule = "=".repeat(60);
    let mut out = String::new();
    let summary = &report.execution_summary;

    let _ = writeln!(out, "{rule}\nDETAILED SANDBOX ACTIVITY REPORT\n{rule}");
    let _ = writeln!(out, "\nExecution Summary:");
    let _ = writeln!(out, "  Duration: {:.3} seconds", summary.duration_seconds);
    let _ = writeln!(out, "  Start: {}", summary.start_time.to_rfc3339());
    let _ = writeln!(out, "  End: {}", summary.end_time.to_rfc3339());
    let _ = writeln!(out, "  Total Activities: {}", summary.total_activities);

    let _ = writeln!(
        out,
        "  Note: imports made inside the standard library are not recorded"
    );

    for (title, category) in [
        ("Imports", &report.imports),
        ("File Operations", &report.file_operations),
        ("Network Operations", &report.network_operations),
    ] {
        let _ = writeln!(out, "\n{title} ({} total):", category.total);
        let _ = writeln!(out, "  Allowed: {}", category.allowed);
        let _ = writeln!(out, "  Blocked: {}", category.blocked);
        if !category.details.is_empty() {
            let _ = writeln!(out, "\n  Details:");
            for record in category.details.iter().filter_map(Activity::operation) {
                let status = if record.decision.is_allowed() {
                    "ALLOWED"
                } else {
                    "BLOCKED"
                };
                let _ = writeln!(out, "    {status}: {} {}", record.kind, record.target);
                if !record.decision.is_allowed() {
                    let _ = writeln!(out, "      Reason: {}", record.reason);
                }
            }
        }
    }

    let _ = writeln!(out, "\nExceptions ({} total):", report.exceptions.total);
    for activity in &report.exceptions.details {
        if let ActivityEntry::Exception(exception) = &activity.entry {
            let _ = writeln!(
                out,
                "  {}: {}",
                exception.exception_type, exception.message
            );
        }
    }

    if !report.resource_limits.details.is_empty() {
        let _ = writeln!(out, "\nResource Limits:");
        for activity in &report.resource_limits.details {
            if let ActivityEntry::ResourceLimit(event) = &activity.entry {
                let _ = writeln!(
                    out,
                    "  {} at {:.3}s: observed {:.2}, limit {:.2}",
                    event.kind, activity.timestamp, event.observed, event.limit
                );
            }
        }
    }

    let _ = writeln!(out, "\n{rule}");
    out
}

fn show_config(config: &Config) {
    println!("Interpreter:");
    println!("  Command: {}", config.interpreter.command.join(" "));
    println!("  PATH: {}", config.interpreter.effective_path());
    println!();
    println!("Resource limits:");
    println!("  Timeout: {}s", config.limits.timeout_seconds);
    println!("  Memory limit: {} MB", config.limits.memory_limit_mb);
    println!(
        "  CPU limit: {}% ({})",
        config.limits.cpu_limit_percent,
        if config.limits.enforce_cpu_limit {
            "enforced"
        } else {
            "advisory"
        }
    );
    println!("  Address space limit: {}", config.limits.address_space_limit);
    println!();
    let policy = &config.policy;
    println!("Policy ({:?} mode):", policy.mode);
    println!("  Allow file read: {}", policy.allow_file_read);
    println!("  Allow file write: {}", policy.allow_file_write);
    println!("  Allow network: {}", policy.allow_network);
    println!("  Restricted imports: {}", join(&policy.restricted_imports));
    println!("  Allowed imports: {}", join(&policy.allowed_imports));
    println!("  Allowed file paths: {}", join(&policy.allowed_file_paths));
    println!(
        "  Allowed network addresses: {}",
        join(&policy.allowed_network_addresses)
    );
}

fn join<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    let items: Vec<&str> = items.into_iter().map(String::as_str).collect();
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
