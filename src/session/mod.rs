//! One device interaction: login, prompt gate, commands, reboot, close.
//!
//! A [`Session`] owns exactly one [`SessionTransport`] for its whole life
//! and is closed at the end of the device's processing whatever happened.
//!
//! # Main Components
//!
//! - [`Session`] - transport plus login state for one device
//! - [`CommandResult`] - output of one command with echo and prompt removed
//! - [`DeviceInfo`] - version/uptime gathered from the CLI
//! - [`RebootOutcome`] - how the reboot command ended

use std::time::Duration;

use log::{debug, info, trace, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::auth::{AuthFlow, AuthState};
use crate::config::{Commands, DeviceTarget, Prompts};
use crate::error::{AuthError, CommandError, DeviceError, TransportError};
use crate::transport::{Connector, PatternSet, SessionTransport};

pub use info::DeviceInfo;
pub use reboot::RebootOutcome;

/// Terminal noise stripped from command output: ANSI escape sequences,
/// NUL padding and backspace runs.
pub static TERMINAL_NOISE: Lazy<Regex> =
    Lazy::new(
        || match Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]|\x00+|(\u{8}+(\s+\u{8}+)*)") {
            Ok(re) => re,
            Err(err) => panic!("invalid TERMINAL_NOISE regex: {err}"),
        },
    );

/// Output of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// The command line that was sent.
    pub command: String,
    /// Everything received between sending and the next prompt.
    pub raw: String,
    /// `raw` without the echoed command line and the trailing prompt.
    pub output: String,
}

impl CommandResult {
    pub fn new(command: &str, raw: String, prompt: &str) -> Self {
        let output = clean_output(&raw, command, prompt);
        Self {
            command: command.to_string(),
            raw,
            output,
        }
    }
}

/// Removes terminal noise, the echoed command line and any trailing prompt.
pub fn clean_output(raw: &str, command: &str, prompt: &str) -> String {
    let text = TERMINAL_NOISE.replace_all(raw, "");
    let text = text.replace("\r\n", "\n").replace('\r', "");

    let mut content = text.trim_start_matches('\n');
    let command = command.trim();
    if !command.is_empty()
        && let Some(rest) = content.trim_start_matches([' ', '\t']).strip_prefix(command)
    {
        content = match rest.find('\n') {
            Some(pos) if rest[..pos].trim().is_empty() => &rest[pos + 1..],
            None if rest.trim().is_empty() => "",
            _ => content,
        };
    }

    let mut content = content.trim_end();
    let prompt = prompt.trim();
    if !prompt.is_empty() {
        while let Some(rest) = content.strip_suffix(prompt) {
            content = rest.trim_end();
        }
    }
    content.trim_matches('\n').trim_end().to_string()
}

/// An open connection to one device and its login state.
pub struct Session {
    target: DeviceTarget,
    transport: SessionTransport,
    auth: AuthFlow,
    prompt: PatternSet,
    prompt_literal: String,
    reboot_ack: PatternSet,
    reboot_prompt: usize,
    ready: bool,
    usable: bool,
}

impl Session {
    /// Connects to `target`. Nothing is sent yet.
    pub async fn open(
        connector: &dyn Connector,
        target: &DeviceTarget,
        prompts: &Prompts,
    ) -> Result<Session, DeviceError> {
        let transport = SessionTransport::open(connector, target)
            .await
            .map_err(DeviceError::Connect)?;
        Session::new(target, transport, prompts).map_err(DeviceError::Connect)
    }

    pub fn new(
        target: &DeviceTarget,
        transport: SessionTransport,
        prompts: &Prompts,
    ) -> Result<Session, TransportError> {
        let mut reboot_ack = Vec::new();
        let ack = prompts.reboot_ack.trim();
        if !ack.is_empty() {
            reboot_ack.push(format!(r"(?m)^[ \t]*{}[ \t]*\r?\n", regex::escape(ack)));
        }
        reboot_ack.push(regex::escape(&prompts.command));
        let reboot_prompt = reboot_ack.len() - 1;

        Ok(Self {
            target: target.clone(),
            transport,
            auth: AuthFlow::new(prompts)?,
            prompt: PatternSet::literals([prompts.command.as_str()])?,
            prompt_literal: prompts.command.clone(),
            reboot_ack: PatternSet::regexes(reboot_ack)?,
            reboot_prompt,
            ready: false,
            usable: true,
        })
    }

    pub fn target(&self) -> &DeviceTarget {
        &self.target
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth.state()
    }

    /// True once the prompt gate passed.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// False after a command failure left the CLI in an unknown state.
    pub fn is_usable(&self) -> bool {
        self.usable && self.transport.is_open()
    }

    /// Runs the login state machine.
    pub async fn authenticate(&mut self) -> Result<(), AuthError> {
        self.auth.run(&mut self.transport, &self.target).await?;
        debug!("{} authenticated", self.target.addr());
        Ok(())
    }

    /// Logs in and waits for the command prompt.
    pub async fn start(&mut self) -> Result<(), DeviceError> {
        self.authenticate().await?;
        self.wait_ready().await?;
        Ok(())
    }

    /// Sends `exit` if the shell is still there, then closes the transport.
    pub async fn close(&mut self) {
        if self.transport.is_open()
            && let Err(e) = self.transport.send_line("exit").await
        {
            debug!("{} Failed to send exit command: {:?}", self.target.addr(), e);
        }
        self.transport.close().await;
        self.ready = false;
        self.usable = false;
    }
}

mod command;
mod info;
mod reboot;
