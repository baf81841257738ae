//! Wire format of the guard channel
//!
//! One JSON object per line in each direction. Every request gets exactly one
//! reply line.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors decoding a request line
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty request line")]
    Empty,

    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A message from the in-child hooks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GuardRequest {
    /// Hooks are installed; sent once before user code runs
    Hello { pid: u32 },

    /// Module import by absolute dotted name
    Import { target: String },

    /// File open with the mode string the caller passed
    Open { target: String, mode: String },

    /// Outbound connection to `host:port`
    Connect { target: String },

    /// Unhandled exception escaping the user code
    Exception {
        exception_type: String,
        message: String,
        #[serde(default)]
        traceback: String,
    },
}

/// Reply sent for every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GuardReply {
    /// Outcome of a guarded operation
    Verdict {
        /// What the policy decided
        allowed: bool,
        /// Whether the child should carry out the operation
        proceed: bool,
        reason: String,
    },

    /// Acknowledgement for non-guarded messages
    Ack { ok: bool },
}

impl GuardReply {
    pub fn ack() -> Self {
        GuardReply::Ack { ok: true }
    }

    pub fn nack() -> Self {
        GuardReply::Ack { ok: false }
    }
}

/// Decode one request line
pub fn decode_request(line: &str) -> Result<GuardRequest, ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ProtocolError::Empty);
    }
    Ok(serde_json::from_str(line)?)
}

/// Encode a reply as a single newline-terminated line
pub fn encode_reply(reply: &GuardReply) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(reply)?;
    line.push('\n');
    Ok(line)
}
