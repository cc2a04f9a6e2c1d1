use super::*;

impl Session {
    /// Prompt gate after login.
    ///
    /// Sends an empty line and waits for the command prompt, so banner or
    /// MOTD text printed around the first prompt cannot be mistaken for
    /// command output later.
    pub async fn wait_ready(&mut self) -> Result<(), CommandError> {
        self.ready = false;
        if self.auth.state() != AuthState::Authenticated {
            return Err(CommandError::SessionUnusable);
        }
        let addr = self.target.addr();
        let banner = self.transport.discard_pending();
        if !banner.trim().is_empty() {
            trace!("{} discarding banner {:?}", addr, banner);
        }

        let gate = match self.transport.send_line("").await {
            Ok(()) => {
                self.transport
                    .expect(&self.prompt, self.target.timeouts.ready())
                    .await
            }
            Err(err) => Err(err),
        };
        match gate {
            Ok(_) => {
                self.ready = true;
                debug!("{} command prompt ready", addr);
                Ok(())
            }
            Err(source) => {
                self.usable = false;
                Err(CommandError::PromptNotFound {
                    prompt: self.prompt_literal.clone(),
                    source,
                })
            }
        }
    }

    /// Executes a command with the target's command timeout.
    pub async fn execute(&mut self, command: &str) -> Result<CommandResult, CommandError> {
        let timeout = self.target.timeouts.command();
        self.execute_with_timeout(command, timeout).await
    }

    /// Sends one command line and captures its output up to the next prompt.
    ///
    /// Any failure marks the session unusable: the CLI may still be busy with
    /// the command, so nothing else is sent on it.
    pub async fn execute_with_timeout(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandResult, CommandError> {
        if !self.ready || !self.is_usable() {
            return Err(CommandError::SessionUnusable);
        }
        let addr = self.target.addr();
        self.transport.discard_pending();

        debug!("{} exec {:?}", addr, command);
        let started = Instant::now();
        let deadline = started + timeout;
        let result = match self.transport.send_line(command).await {
            Ok(()) => self.read_reply(command, started, deadline).await,
            Err(err) => Err(err),
        };

        match result {
            Ok((echo, reply)) => {
                let result = CommandResult::new(command, echo + &reply, &self.prompt_literal);
                trace!("{} {:?} -> {:?}", addr, command, result.output);
                Ok(result)
            }
            Err(TransportError::ExpectTimeout { pending, .. }) => {
                self.usable = false;
                warn!("{} command {:?} timed out", addr, command);
                Err(CommandError::CommandTimeout {
                    command: command.to_string(),
                    partial: clean_output(&pending, command, &self.prompt_literal),
                })
            }
            Err(err) => {
                self.usable = false;
                Err(CommandError::Transport(err))
            }
        }
    }

    /// Echo (possibly empty) and the text up to the next prompt.
    async fn read_reply(
        &mut self,
        command: &str,
        started: Instant,
        deadline: Instant,
    ) -> Result<(String, String), TransportError> {
        let echo = self
            .transport
            .skip_echo(command, started, deadline)
            .await?
            .unwrap_or_default();
        let found = self
            .transport
            .expect_budget(&self.prompt, started, deadline)
            .await?;
        Ok((echo, found.before))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{login_script, ready_session, session};
    use super::*;
    use crate::transport::DeviceScript;

    #[tokio::test]
    async fn execute_returns_payload_without_echo_or_prompt() {
        let script = login_script()
            .echo(true)
            .respond("get version", "Model X v1\r\nrkscli: ");
        let (mut session, _) = ready_session(script).await;
        let result = session.execute("get version").await.expect("version");
        assert_eq!(result.output, "Model X v1");
        assert_eq!(result.raw, "get version\r\nModel X v1\r\n");
        assert!(session.is_usable());
    }

    #[tokio::test]
    async fn echo_is_removed_for_indented_commands() {
        let script = login_script()
            .echo(true)
            .respond("  get version", "Model X v1\r\nrkscli: ");
        let (mut session, _) = ready_session(script).await;
        let result = session.execute("  get version").await.expect("version");
        assert_eq!(result.output, "Model X v1");
    }

    #[tokio::test]
    async fn prompt_text_inside_a_command_is_not_the_prompt() {
        let script = login_script()
            .echo(true)
            .respond("set banner rkscli: hi", "Banner set\r\nOK\r\nrkscli: ")
            .respond("get version", "Model X v1\r\nrkscli: ");
        let (mut session, _) = ready_session(script).await;
        let result = session.execute("set banner rkscli: hi").await.expect("banner");
        assert_eq!(result.output, "Banner set\nOK");
        assert_eq!(session.execute("get version").await.expect("version").output, "Model X v1");
    }

    #[tokio::test]
    async fn consecutive_commands_do_not_leak_into_each_other() {
        let script = login_script()
            .respond("get version", "Model X v1\r\nrkscli: ")
            .respond("get uptime", "up 3 days\r\nrkscli: ");
        let (mut session, _) = ready_session(script).await;
        assert_eq!(session.execute("get version").await.expect("version").output, "Model X v1");
        assert_eq!(session.execute("get uptime").await.expect("uptime").output, "up 3 days");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_marks_session_unusable() {
        let script = login_script().respond("get version", "partial out");
        let (mut session, transcript) = ready_session(script).await;

        let err = match session.execute("get version").await {
            Ok(_) => panic!("missing prompt should time out"),
            Err(err) => err,
        };
        match err {
            CommandError::CommandTimeout { command, partial } => {
                assert_eq!(command, "get version");
                assert_eq!(partial, "partial out");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!session.is_usable());

        let err = match session.execute("get uptime").await {
            Ok(_) => panic!("unusable session must refuse commands"),
            Err(err) => err,
        };
        assert!(matches!(err, CommandError::SessionUnusable));
        assert!(!transcript.received().contains(&"get uptime".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_prompt_after_login_is_prompt_not_found() {
        let script = DeviceScript::new()
            .emit("Please login: ")
            .respond("super", "password : ")
            .respond("sp-admin", "Welcome\r\nrkscli: ")
            .ignore("");
        let (mut session, _) = session(script);
        session.authenticate().await.expect("login");

        let err = match session.wait_ready().await {
            Ok(()) => panic!("prompt gate should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, CommandError::PromptNotFound { .. }));
        assert!(!session.is_ready());
        assert!(matches!(
            session.execute("get version").await,
            Err(CommandError::SessionUnusable)
        ));
    }

    #[tokio::test]
    async fn commands_before_the_gate_are_refused() {
        let (mut session, transcript) = session(login_script());
        let err = match session.execute("get version").await {
            Ok(_) => panic!("not ready"),
            Err(err) => err,
        };
        assert!(matches!(err, CommandError::SessionUnusable));
        assert!(transcript.received().is_empty());
    }
}
