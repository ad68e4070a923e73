//! Local IPC between the command-line client and the daemon.
//!
//! The daemon listens on a Unix socket named after [`SERVICE_NAME`] and
//! advertises itself through an endpoint file holding its pid. Each
//! connection carries one newline-terminated JSON request and one reply.
//!
//! [`SERVICE_NAME`]: crate::common::config::SERVICE_NAME

mod client;
mod endpoint;
mod protocol;

pub use client::{ClientError, DaemonClient, REQUEST_TIMEOUT};
pub use endpoint::{EndpointError, EndpointFile};
pub use protocol::{ErrorReply, Request, decode_line, encode_line};
