use super::*;

/// How a reboot attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RebootOutcome {
    /// The command was sent and the device acknowledged it, hung up, or went silent.
    Success,
    /// The command was sent but the CLI prompt came back.
    Ambiguous,
    /// The command never left: connection, login or prompt gate failed first.
    FailedBeforeSend,
}

impl Session {
    /// Sends the reboot command.
    ///
    /// A device that reboots drops the connection straight away, so a closed
    /// stream or a silent one after the send both count as success. Errors are
    /// only returned for failures that happen before the command is sent.
    pub async fn reboot(&mut self, command: &str) -> Result<RebootOutcome, CommandError> {
        if !self.ready || !self.is_usable() {
            return Err(CommandError::SessionUnusable);
        }
        let addr = self.target.addr();
        self.transport.discard_pending();

        info!("{} sending reboot command {:?}", addr, command);
        if let Err(err) = self.transport.send_line(command).await {
            self.usable = false;
            return Err(CommandError::Transport(err));
        }

        let outcome = match self
            .transport
            .expect(&self.reboot_ack, self.target.timeouts.reboot())
            .await
        {
            Ok(found) if found.index == self.reboot_prompt => {
                warn!("{} prompt returned after reboot command", addr);
                RebootOutcome::Ambiguous
            }
            Ok(found) => {
                debug!("{} reboot acknowledged with {:?}", addr, found.matched);
                self.usable = false;
                RebootOutcome::Success
            }
            Err(TransportError::StreamClosed { .. }) => {
                debug!("{} connection closed after reboot command", addr);
                self.usable = false;
                RebootOutcome::Success
            }
            Err(TransportError::ExpectTimeout { .. }) => {
                debug!("{} device went silent after reboot command", addr);
                self.usable = false;
                RebootOutcome::Success
            }
            Err(err) => {
                warn!("{} unexpected transport error after reboot command: {}", addr, err);
                self.usable = false;
                RebootOutcome::Ambiguous
            }
        };
        Ok(outcome)
    }
}
