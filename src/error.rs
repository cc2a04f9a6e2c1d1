//! Error types for transport, authentication and command execution.
//!
//! Each layer of a device interaction has its own error enum. The batch
//! orchestrator folds all of them into [`DeviceError`], which in turn decides
//! the status recorded in a device report.

use std::time::Duration;

use thiserror::Error;

use crate::batch::DeviceStatus;

/// Errors raised by the remote-shell transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The TCP/SSH handshake did not finish within the connect timeout.
    #[error("connect to {addr} timed out after {}s", .waited.as_secs())]
    ConnectTimeout { addr: String, waited: Duration },

    /// The device refused the connection or the SSH handshake failed.
    #[error("connect to {addr} refused: {reason}")]
    ConnectRefused { addr: String, reason: String },

    /// No expected pattern showed up before the deadline.
    ///
    /// Carries whatever unmatched text was buffered when the wait gave up.
    #[error("no expected prompt within {}s (pending output: {pending:?})", .waited.as_secs_f32())]
    ExpectTimeout { waited: Duration, pending: String },

    /// The remote end closed the stream before a pattern matched.
    #[error("stream closed by remote (pending output: {pending:?})")]
    StreamClosed { pending: String },

    /// A prompt pattern failed to compile.
    #[error("invalid prompt pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// An error occurred in the async-ssh2-tokio library.
    #[error("async ssh2 error: {0}")]
    Ssh2Error(#[from] async_ssh2_tokio::Error),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    RusshError(#[from] russh::Error),
}

impl TransportError {
    /// True when the failure happened while opening the connection.
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectTimeout { .. }
                | TransportError::ConnectRefused { .. }
                | TransportError::Ssh2Error(_)
                | TransportError::RusshError(_)
        )
    }
}

/// Errors raised while driving the vendor login flow.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The password was sent but the command prompt never appeared.
    #[error("authentication timed out waiting for the command prompt")]
    AuthTimeout,

    /// The device showed a prompt that is not valid in the current state,
    /// e.g. the login prompt again after the password was sent.
    #[error("unexpected prompt {prompt:?} while {state}")]
    UnexpectedPrompt { state: String, prompt: String },

    /// The transport failed while a login prompt was pending.
    #[error("transport failed during login: {0}")]
    Transport(#[from] TransportError),
}

/// Errors raised once the session is authenticated.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The command prompt did not show up after authentication.
    #[error("command prompt {prompt:?} not found: {source}")]
    PromptNotFound {
        prompt: String,
        #[source]
        source: TransportError,
    },

    /// The prompt did not come back after a command.
    #[error("command {command:?} timed out (partial output: {partial:?})")]
    CommandTimeout { command: String, partial: String },

    /// A previous failure left the session in an unknown state.
    #[error("session is no longer usable after an earlier failure")]
    SessionUnusable,

    /// The transport failed while a command was in flight.
    #[error("transport failed during command: {0}")]
    Transport(#[from] TransportError),
}

/// A failure that stopped processing of one device before its session was
/// ready for commands.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("connection failed: {0}")]
    Connect(TransportError),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("command error: {0}")]
    Command(#[from] CommandError),
}

impl DeviceError {
    /// The report status this failure maps to.
    pub fn status(&self) -> DeviceStatus {
        match self {
            DeviceError::Connect(_) => DeviceStatus::ConnectFailed,
            DeviceError::Auth(_) => DeviceStatus::AuthFailed,
            DeviceError::Command(_) => DeviceStatus::CommandError,
        }
    }
}

/// Errors raised while loading configuration from the environment.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("environment variable {name} has invalid value {value:?}")]
    InvalidVar { name: String, value: String },
}

/// Errors raised while reading a device target list.
#[derive(Error, Debug)]
pub enum TargetError {
    #[error("target file {0} not found")]
    NotFound(String),

    #[error("failed to read target file: {0}")]
    Io(#[from] std::io::Error),

    #[error("no valid IP addresses found in {0}")]
    NoValidTargets(String),
}
