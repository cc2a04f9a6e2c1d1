//! Byte-stream transport to an access point's interactive shell.
//!
//! A [`Connector`] opens a raw [`Stream`] for one [`DeviceTarget`]. The
//! [`SessionTransport`] wraps that stream with a receive buffer and the
//! `expect` primitive the rest of the crate is built on: wait until one of a
//! priority-ordered [`PatternSet`] shows up in the output, the deadline
//! passes, or the remote end hangs up.
//!
//! # Main Components
//!
//! - [`SessionTransport`] - buffered send/expect/close over one stream
//! - [`PatternSet`] - compiled prompt literals, first match wins
//! - [`SshConnector`] - real SSH shell channels via `async-ssh2-tokio`
//! - [`ScriptedConnector`] - scripted devices for tests and dry runs

use std::borrow::Cow;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_ssh2_tokio::client::{AuthMethod, Client};
use async_ssh2_tokio::{Config, ServerCheckMethod};
use async_trait::async_trait;
use log::{debug, trace, warn};
use regex::{Regex, RegexSet};
use russh::client::Msg;
use russh::{Channel, ChannelMsg, Preferred};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::{self, DeviceTarget};
use crate::error::TransportError;

pub use pattern::{PatternMatch, PatternSet};
pub use script::{DeviceScript, ScriptStep, ScriptedConnector, ScriptedStream, Transcript};
pub use security::{ConnectionSecurityOptions, SecurityLevel};
pub use ssh::{SshConnector, SshStream};

/// A raw, already-connected shell stream.
#[async_trait]
pub trait Stream: Send {
    /// Writes text to the remote shell.
    async fn write(&mut self, data: &str) -> Result<(), TransportError>;

    /// Next chunk of shell output, or `None` once the remote side closed.
    async fn read(&mut self) -> Option<String>;

    /// Closes the stream. Must tolerate being called more than once.
    async fn shutdown(&mut self);
}

/// Opens streams to devices.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn Stream>, TransportError>;
}

/// Result of a successful [`SessionTransport::expect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectMatch {
    /// Index of the pattern that matched, in declaration order.
    pub index: usize,
    /// Output received before the match.
    pub before: String,
    /// The matched text itself.
    pub matched: String,
}

impl ExpectMatch {
    /// Everything this expect consumed from the stream.
    pub fn consumed(&self) -> String {
        format!("{}{}", self.before, self.matched)
    }
}

/// One open connection to one device.
pub struct SessionTransport {
    addr: String,
    stream: Option<Box<dyn Stream>>,
    buffer: String,
    eof: bool,
}

impl SessionTransport {
    /// Connects to `target`, giving up after its connect timeout.
    pub async fn open(
        connector: &dyn Connector,
        target: &DeviceTarget,
    ) -> Result<SessionTransport, TransportError> {
        let addr = target.addr();
        let waited = target.timeouts.connect();
        debug!("{} connecting (timeout {:?})", addr, waited);
        let stream = match tokio::time::timeout(waited, connector.connect(target)).await {
            Ok(stream) => stream?,
            Err(_) => return Err(TransportError::ConnectTimeout { addr, waited }),
        };
        debug!("{} shell stream open", addr);
        Ok(Self::new(addr, stream))
    }

    pub fn new(addr: impl Into<String>, stream: Box<dyn Stream>) -> Self {
        Self {
            addr: addr.into(),
            stream: Some(stream),
            buffer: String::new(),
            eof: false,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// True until the stream was closed by either side.
    pub fn is_open(&self) -> bool {
        self.stream.is_some() && !self.eof
    }

    pub async fn send(&mut self, data: &str) -> Result<(), TransportError> {
        if self.eof {
            return Err(self.closed_error());
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(self.closed_error());
        };
        stream.write(data).await
    }

    /// Sends `line` followed by a newline.
    pub async fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.send(&format!("{line}\n")).await
    }

    /// Waits up to `timeout` for one of `patterns`.
    pub async fn expect(
        &mut self,
        patterns: &PatternSet,
        timeout: Duration,
    ) -> Result<ExpectMatch, TransportError> {
        self.expect_until(patterns, Instant::now() + timeout).await
    }

    /// Waits until `deadline` for one of `patterns`.
    ///
    /// Output up to and including the match is consumed; anything after it
    /// stays buffered for the next call.
    pub async fn expect_until(
        &mut self,
        patterns: &PatternSet,
        deadline: Instant,
    ) -> Result<ExpectMatch, TransportError> {
        self.expect_budget(patterns, Instant::now(), deadline).await
    }

    /// Like [`expect_until`](Self::expect_until) for a wait that began at
    /// `started`. A timeout reports `waited` from `started`, so several calls
    /// sharing one deadline report the whole wait.
    pub async fn expect_budget(
        &mut self,
        patterns: &PatternSet,
        started: Instant,
        deadline: Instant,
    ) -> Result<ExpectMatch, TransportError> {
        loop {
            if let Some(found) = patterns.find(&self.buffer) {
                let consumed: String = self.buffer.drain(..found.end).collect();
                let matched = consumed[found.start..].to_string();
                let before = consumed[..found.start].to_string();
                trace!("{} matched {:?}", self.addr, matched);
                return Ok(ExpectMatch {
                    index: found.index,
                    before,
                    matched,
                });
            }
            self.fill(started, deadline).await?;
        }
    }

    /// Consumes the remote echo of `line` from the head of the output.
    ///
    /// Returns the echoed text including its line ending, or `None` when the
    /// output does not start with `line`. Leading blanks on either side are
    /// ignored. While the output so far could still be the start of the echo,
    /// more is read, so prompt text inside `line` is never mistaken for a
    /// real prompt.
    pub async fn skip_echo(
        &mut self,
        line: &str,
        started: Instant,
        deadline: Instant,
    ) -> Result<Option<String>, TransportError> {
        let line = line.trim();
        loop {
            let head = self.buffer.trim_start_matches([' ', '\t', '\r', '\n']);
            match head.strip_prefix(line) {
                Some(rest) => {
                    let rest = rest.trim_start_matches([' ', '\t']);
                    if let Some(after) = rest.strip_prefix("\r\n").or(rest.strip_prefix('\n')) {
                        let end = self.buffer.len() - after.len();
                        let echo: String = self.buffer.drain(..end).collect();
                        trace!("{} echo {:?}", self.addr, echo);
                        return Ok(Some(echo));
                    }
                    if !rest.is_empty() && rest != "\r" {
                        return Ok(None);
                    }
                }
                None if !line.starts_with(head) => return Ok(None),
                None => {}
            }
            self.fill(started, deadline).await?;
        }
    }

    /// Reads one more chunk into the buffer, or fails once the stream is
    /// closed or `deadline` passed.
    async fn fill(&mut self, started: Instant, deadline: Instant) -> Result<(), TransportError> {
        if self.eof {
            return Err(self.closed_error());
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(self.closed_error());
        };

        match tokio::time::timeout_at(deadline, stream.read()).await {
            Ok(Some(chunk)) => {
                trace!("{} <- {:?}", self.addr, chunk);
                self.buffer.push_str(&chunk);
            }
            Ok(None) => {
                debug!("{} remote closed the stream", self.addr);
                self.eof = true;
            }
            Err(_) => {
                return Err(TransportError::ExpectTimeout {
                    waited: Instant::now().saturating_duration_since(started),
                    pending: self.buffer.clone(),
                });
            }
        }
        Ok(())
    }

    /// Drops buffered output nobody waited for, returning it.
    pub fn discard_pending(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    /// Closes the stream. Safe to call any number of times.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await;
            debug!("{} transport closed", self.addr);
        }
    }

    fn closed_error(&self) -> TransportError {
        TransportError::StreamClosed {
            pending: self.buffer.clone(),
        }
    }
}

mod pattern;
mod script;
mod security;
mod ssh;
