// Error types for server startup and the TCP client.
//
// Move rejections are not errors in this sense: they are ordinary outcomes
// of `Session::submit_move` (`session::Rejection`) and never stop the server.

use std::io;

use thiserror::Error;

use crate::rules::RuleError;

/// Failure to bring the server up.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid starting position: {0}")]
    StartingPosition(#[from] RuleError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failure in `TableClient`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("connection lost: {0}")]
    Io(#[from] io::Error),

    #[error("expected role assignment, got {0}")]
    UnexpectedGreeting(String),
}
