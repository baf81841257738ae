//! Target matching for file paths and network addresses

use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path: fold `.` and `..`, drop duplicate separators.
///
/// The filesystem is never consulted, so symlinks are not resolved.
pub fn normalize_path(path: &str) -> PathBuf {
    let mut out = PathBuf::new();
    let mut depth = 0usize;

    for component in Path::new(path).components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    out.pop();
                    depth -= 1;
                } else if !out.has_root() {
                    out.push("..");
                }
                // `..` at the root stays at the root
            }
            Component::Normal(name) => {
                out.push(name);
                depth += 1;
            }
        }
    }

    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Whether `target` equals `allowed` or lies under it, after normalization.
///
/// Comparison is per component, so `/tmp/data` does not admit `/tmp/database`.
pub fn path_matches(allowed: &str, target: &str) -> bool {
    let allowed = normalize_path(allowed);
    let target = normalize_path(target);
    target.starts_with(&allowed)
}

/// Split `host`, `host:port` or `[v6]:port` into host and optional port.
///
/// A bare IPv6 literal (more than one colon, no brackets) is all host.
pub fn split_address(address: &str) -> (&str, Option<u16>) {
    if let Some(rest) = address.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((host, tail)) => {
                let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
                (host, port)
            }
            None => (address, None),
        };
    }

    if address.matches(':').count() == 1
        && let Some((host, port)) = address.rsplit_once(':')
        && let Ok(port) = port.parse()
    {
        return (host, Some(port));
    }

    (address, None)
}

/// Whether the allowlist entry admits the target address.
///
/// A bare host entry matches any port on that host; `host:port` matches only
/// that pair. Hosts compare case-insensitively.
pub(crate) fn address_matches(allowed: &str, target: &str) -> bool {
    let (allowed_host, allowed_port) = split_address(allowed);
    let (target_host, target_port) = split_address(target);

    if allowed_host.is_empty() || !allowed_host.eq_ignore_ascii_case(target_host) {
        return false;
    }
    match allowed_port {
        None => true,
        Some(port) => target_port == Some(port),
    }
}
