//! Answers IPC requests by forwarding them to the reactor.

use std::os::unix::net::{UnixListener as StdUnixListener, UnixStream as StdUnixStream};
use std::path::{Path, PathBuf};
use std::{fs, io};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{Instrument, debug, info, info_span, warn};

use super::reactor::{QueryError, ReactorQueryHandle};
use crate::ipc::{ErrorReply, Request, decode_line, encode_line};
use crate::model::server::EnabledReply;

/// A bound but not yet serving socket.
pub struct Server {
    listener: StdUnixListener,
    path: PathBuf,
}

impl Server {
    /// Binds `path`, replacing a socket file nobody is listening on.
    pub fn bind(path: &Path) -> io::Result<Server> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let listener = match StdUnixListener::bind(path) {
            Ok(listener) => listener,
            Err(err) if err.kind() == io::ErrorKind::AddrInUse => {
                if StdUnixStream::connect(path).is_ok() {
                    return Err(io::Error::new(
                        io::ErrorKind::AddrInUse,
                        format!("daemon already listening at {}", path.display()),
                    ));
                }
                debug!(path = %path.display(), "Replacing stale socket");
                fs::remove_file(path)?;
                StdUnixListener::bind(path)?
            }
            Err(err) => return Err(err),
        };
        listener.set_nonblocking(true)?;
        info!(path = %path.display(), "Listening");
        Ok(Server { listener, path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Accepts connections until the listener fails. Must be called from
    /// inside a tokio runtime.
    pub async fn serve(self, reactor: ReactorQueryHandle) -> io::Result<()> {
        let listener = UnixListener::from_std(self.listener)?;
        loop {
            let (stream, _) = listener.accept().await?;
            let reactor = reactor.clone();
            tokio::spawn(
                async move {
                    if let Err(err) = handle_connection(stream, &reactor).await {
                        debug!(%err, "Connection ended with error");
                    }
                }
                .instrument(info_span!("server::connection")),
            );
        }
    }
}

async fn handle_connection(stream: UnixStream, reactor: &ReactorQueryHandle) -> io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut line = String::new();
    if BufReader::new(read).read_line(&mut line).await? == 0 {
        return Ok(());
    }
    let reply = match decode_line::<Request>(&line) {
        Ok(request) => dispatch(request, reactor).await,
        Err(err) => {
            warn!(%err, "Malformed request");
            encode_line(&ErrorReply::new(format!("malformed request: {err}")))
        }
    };
    write.write_all(&reply.map_err(io::Error::other)?).await?;
    write.shutdown().await
}

async fn dispatch(request: Request, reactor: &ReactorQueryHandle) -> serde_json::Result<Vec<u8>> {
    debug!(?request, "Handling request");
    let id = match request {
        Request::ToggleSpace { id } | Request::SetSpace { id, .. } => Some(id),
        Request::Status => None,
    };
    if id.is_some_and(|id| id.is_unknown()) {
        return encode_line(&ErrorReply::new("space id must be non-zero"));
    }
    let result = match request {
        Request::ToggleSpace { id } => {
            reactor.toggle_space(id).await.map(|enabled| encode_line(&EnabledReply { enabled }))
        }
        Request::SetSpace { id, enabled } => reactor
            .set_space(id, enabled)
            .await
            .map(|enabled| encode_line(&EnabledReply { enabled })),
        Request::Status => reactor.status().await.map(|status| encode_line(&status)),
    };
    match result {
        Ok(encoded) => encoded,
        Err(QueryError::ReactorGone) => encode_line(&ErrorReply::new("daemon is shutting down")),
    }
}
