use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, instrument};

use super::endpoint::{EndpointError, EndpointFile};
use super::protocol::{Request, encode_line};
use crate::common::config::Paths;
use crate::model::SpaceId;
use crate::model::server::{EnabledReply, StatusSnapshot};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon is not running: {0}")]
    DaemonUnavailable(String),
    #[error("daemon did not reply within {0:?}")]
    RequestTimeout(Duration),
    #[error("invalid reply from daemon: {0}")]
    InvalidResponse(String),
    #[error("daemon rejected the request: {0}")]
    Rejected(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<EndpointError> for ClientError {
    fn from(err: EndpointError) -> Self {
        match err {
            EndpointError::Io(err) => ClientError::Io(err),
            other => ClientError::DaemonUnavailable(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket: PathBuf,
}

impl DaemonClient {
    /// Checks that a live daemon is advertised before handing out a client.
    pub fn connect(paths: &Paths) -> Result<DaemonClient, ClientError> {
        let pid = EndpointFile::new(paths.endpoint_file()).live_pid()?;
        debug!(pid, "Found daemon");
        Ok(DaemonClient::new(paths.socket()))
    }

    pub fn new(socket: PathBuf) -> DaemonClient { DaemonClient { socket } }

    pub async fn toggle_space(&self, id: SpaceId) -> Result<bool, ClientError> {
        let reply: EnabledReply = self.call(Request::ToggleSpace { id }).await?;
        Ok(reply.enabled)
    }

    pub async fn set_space(&self, id: SpaceId, enabled: bool) -> Result<bool, ClientError> {
        let reply: EnabledReply = self.call(Request::SetSpace { id, enabled }).await?;
        Ok(reply.enabled)
    }

    pub async fn status(&self) -> Result<StatusSnapshot, ClientError> {
        self.call(Request::Status).await
    }

    #[instrument(skip(self), fields(socket = %self.socket.display()))]
    async fn call<T: DeserializeOwned>(&self, request: Request) -> Result<T, ClientError> {
        let line = tokio::time::timeout(REQUEST_TIMEOUT, self.exchange(request))
            .await
            .map_err(|_| ClientError::RequestTimeout(REQUEST_TIMEOUT))??;
        parse_reply(&line)
    }

    async fn exchange(&self, request: Request) -> Result<String, ClientError> {
        let mut stream = match UnixStream::connect(&self.socket).await {
            Ok(stream) => stream,
            Err(err) if is_unreachable(&err) => {
                return Err(ClientError::DaemonUnavailable(err.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        let bytes = encode_line(&request).map_err(io::Error::other)?;
        stream.write_all(&bytes).await?;
        stream.flush().await?;

        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line).await?;
        Ok(line)
    }
}

fn is_unreachable(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused)
}

fn parse_reply<T: DeserializeOwned>(line: &str) -> Result<T, ClientError> {
    if line.trim().is_empty() {
        return Err(ClientError::InvalidResponse("empty reply".to_string()));
    }
    let value: Value =
        serde_json::from_str(line).map_err(|err| ClientError::InvalidResponse(err.to_string()))?;
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(ClientError::Rejected(error.to_string()));
    }
    serde_json::from_value(value).map_err(|err| ClientError::InvalidResponse(err.to_string()))
}
