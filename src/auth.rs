//! Login state machine for the access point's interactive shell.
//!
//! Ruckus APs ask for credentials inside the shell (`Please login:` /
//! `password :`) even after the SSH handshake. The flow is modelled as an
//! explicit finite state machine: [`transition`] is a pure table keyed by the
//! current [`AuthState`] and the [`PromptKind`] that matched, and
//! [`AuthFlow::run`] drives it against a [`SessionTransport`].
//!
//! ```text
//! Init -> AwaitLoginPrompt -> AwaitPasswordPrompt -> AwaitCommandPrompt -> Authenticated
//!              |  ^ host key: answer "yes", same state, same deadline
//!              +--+
//! any waiting state -- timeout / closed / unexpected prompt --> Failed
//! ```

use std::fmt;

use log::debug;
use tokio::time::Instant;

use crate::config::{DeviceTarget, Prompts};
use crate::error::{AuthError, TransportError};
use crate::transport::{PatternSet, SessionTransport};

/// Login progress of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthState {
    Init,
    AwaitLoginPrompt,
    AwaitPasswordPrompt,
    /// Password sent; waiting for the CLI prompt that confirms the login.
    AwaitCommandPrompt,
    Authenticated,
    Failed,
}

impl AuthState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuthState::Authenticated | AuthState::Failed)
    }

    /// Prompt kinds watched while in this state, in priority order.
    pub fn watched(&self) -> &'static [PromptKind] {
        use PromptKind::*;

        match self {
            AuthState::AwaitLoginPrompt => &[Login, HostKey, Password],
            AuthState::AwaitPasswordPrompt => &[Password, Login],
            AuthState::AwaitCommandPrompt => &[Command, Login, Password],
            AuthState::Init | AuthState::Authenticated | AuthState::Failed => &[],
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AuthState::Init => "starting",
            AuthState::AwaitLoginPrompt => "waiting for the login prompt",
            AuthState::AwaitPasswordPrompt => "waiting for the password prompt",
            AuthState::AwaitCommandPrompt => "waiting for the command prompt",
            AuthState::Authenticated => "authenticated",
            AuthState::Failed => "failed",
        };
        f.write_str(text)
    }
}

/// Which family of prompt matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    HostKey,
    Login,
    Password,
    Command,
}

/// What to send in reaction to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    Nothing,
    AcceptHostKey,
    SendUsername,
    SendPassword,
    Reject,
}

/// The transition table.
pub fn transition(state: AuthState, seen: PromptKind) -> (AuthState, AuthAction) {
    use AuthAction::*;
    use AuthState::*;

    match (state, seen) {
        (Init, _) => (Failed, Reject),
        (AwaitLoginPrompt, PromptKind::HostKey) => (AwaitLoginPrompt, AcceptHostKey),
        (AwaitLoginPrompt, PromptKind::Login) => (AwaitPasswordPrompt, SendUsername),
        (AwaitPasswordPrompt, PromptKind::Password) => (AwaitCommandPrompt, SendPassword),
        (AwaitCommandPrompt, PromptKind::Command) => (Authenticated, Nothing),
        (Authenticated, _) => (Authenticated, Nothing),
        (Failed, _) => (Failed, Nothing),
        _ => (Failed, Reject),
    }
}

struct Watch {
    patterns: PatternSet,
    kinds: Vec<PromptKind>,
}

impl Watch {
    fn compile(state: AuthState, prompts: &Prompts) -> Result<Watch, TransportError> {
        let mut literals = Vec::new();
        let mut kinds = Vec::new();
        for kind in state.watched() {
            let group: Vec<&str> = match kind {
                PromptKind::HostKey => vec![prompts.host_key.as_str()],
                PromptKind::Login => prompts.login.iter().map(|s| s.as_str()).collect(),
                PromptKind::Password => prompts.password.iter().map(|s| s.as_str()).collect(),
                PromptKind::Command => vec![prompts.command.as_str()],
            };
            for literal in group.into_iter().filter(|s| !s.is_empty()) {
                literals.push(literal);
                kinds.push(*kind);
            }
        }
        Ok(Watch {
            patterns: PatternSet::literals(literals)?,
            kinds,
        })
    }
}

/// Drives the login exchange for one session.
pub struct AuthFlow {
    state: AuthState,
    await_login: Watch,
    await_password: Watch,
    await_command: Watch,
}

impl AuthFlow {
    pub fn new(prompts: &Prompts) -> Result<AuthFlow, TransportError> {
        Ok(Self {
            state: AuthState::Init,
            await_login: Watch::compile(AuthState::AwaitLoginPrompt, prompts)?,
            await_password: Watch::compile(AuthState::AwaitPasswordPrompt, prompts)?,
            await_command: Watch::compile(AuthState::AwaitCommandPrompt, prompts)?,
        })
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    fn watch(&self, state: AuthState) -> Option<&Watch> {
        match state {
            AuthState::AwaitLoginPrompt => Some(&self.await_login),
            AuthState::AwaitPasswordPrompt => Some(&self.await_password),
            AuthState::AwaitCommandPrompt => Some(&self.await_command),
            _ => None,
        }
    }

    /// Runs the flow to a terminal state.
    ///
    /// Every prompt wait gets `target.timeouts.login`. Answering the host-key
    /// question keeps the deadline of the wait that was already running.
    pub async fn run(
        &mut self,
        transport: &mut SessionTransport,
        target: &DeviceTarget,
    ) -> Result<(), AuthError> {
        let result = self.drive(transport, target).await;
        if let Err(err) = &result {
            debug!("{} authentication failed in state {:?}: {}", target.addr(), self.state, err);
            self.state = AuthState::Failed;
        }
        result
    }

    async fn drive(
        &mut self,
        transport: &mut SessionTransport,
        target: &DeviceTarget,
    ) -> Result<(), AuthError> {
        let timeout = target.timeouts.login();
        if self.state == AuthState::Init {
            self.state = AuthState::AwaitLoginPrompt;
        }
        let mut started = Instant::now();
        let mut deadline = started + timeout;

        while !self.state.is_terminal() {
            let state = self.state;
            let Some(watch) = self.watch(state) else {
                break;
            };
            let found = match transport.expect_budget(&watch.patterns, started, deadline).await {
                Ok(found) => found,
                Err(TransportError::ExpectTimeout { .. })
                    if state == AuthState::AwaitCommandPrompt =>
                {
                    return Err(AuthError::AuthTimeout);
                }
                Err(err) => return Err(err.into()),
            };
            let seen = watch.kinds[found.index];
            let (next, action) = transition(state, seen);
            debug!("{} auth {:?} --{:?}--> {:?}", target.addr(), state, seen, next);

            match action {
                AuthAction::Nothing => {}
                AuthAction::AcceptHostKey => transport.send_line("yes").await?,
                AuthAction::SendUsername => transport.send_line(&target.username).await?,
                AuthAction::SendPassword => transport.send_line(&target.password).await?,
                AuthAction::Reject => {
                    return Err(AuthError::UnexpectedPrompt {
                        state: state.to_string(),
                        prompt: found.matched,
                    });
                }
            }

            if next != state {
                started = Instant::now();
                deadline = started + timeout;
            }
            self.state = next;
        }

        match self.state {
            AuthState::Authenticated => Ok(()),
            state => Err(AuthError::UnexpectedPrompt {
                state: state.to_string(),
                prompt: String::new(),
            }),
        }
    }
}
