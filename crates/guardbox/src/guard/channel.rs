//! Unix socket server answering guard requests from the child

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use crate::guard::GuardSet;
use crate::guard::protocol::{GuardReply, decode_request, encode_reply};

/// Listening end of the guard channel
#[derive(Debug)]
pub struct GuardChannel {
    listener: UnixListener,
    path: PathBuf,
}

impl GuardChannel {
    /// Bind a listening socket at `path`
    pub fn bind(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let listener = UnixListener::bind(&path)?;
        debug!(path = %path.display(), "guard channel bound");
        Ok(Self { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept and answer connections until `shutdown` fires
    ///
    /// Connections already accepted are drained before returning, so every
    /// request the child managed to send is recorded.
    pub async fn serve(self, guards: Arc<GuardSet>, mut shutdown: oneshot::Receiver<()>) {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        trace!("guard connection accepted");
                        connections.spawn(handle_connection(stream, guards.clone()));
                    }
                    Err(e) => {
                        warn!(error = %e, "guard channel accept failed");
                        break;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "guard connection task failed");
                    }
                }
            }
        }

        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "guard connection task failed");
            }
        }
        debug!("guard channel closed");
    }
}

async fn handle_connection(stream: UnixStream, guards: Arc<GuardSet>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "guard connection read failed");
                break;
            }
        };

        let reply = match decode_request(&line) {
            Ok(request) => guards.handle(request),
            Err(e) => {
                warn!(error = %e, "ignoring malformed guard request");
                GuardReply::nack()
            }
        };

        let encoded = match encode_reply(&reply) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "failed to encode guard reply");
                break;
            }
        };
        if let Err(e) = writer.write_all(encoded.as_bytes()).await {
            debug!(error = %e, "guard connection write failed");
            break;
        }
    }
}
