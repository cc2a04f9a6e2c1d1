use super::*;

/// Opens interactive shell channels over SSH.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    security: ConnectionSecurityOptions,
}

impl SshConnector {
    pub fn new(security: ConnectionSecurityOptions) -> Self {
        Self { security }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn Stream>, TransportError> {
        let device_addr = target.addr();

        let config = Config {
            preferred: self.security.preferred(),
            inactivity_timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        let client = Client::connect_with_config(
            (target.host.as_str(), target.port),
            &target.username,
            AuthMethod::with_password(&target.password),
            self.security.server_check.clone(),
            config,
        )
        .await
        .map_err(|err| TransportError::ConnectRefused {
            addr: device_addr.clone(),
            reason: err.to_string(),
        })?;
        debug!("{} TCP connection successful", device_addr);

        let channel = client.get_channel().await?;
        channel
            .request_pty(false, "xterm", 800, 600, 0, 0, &[])
            .await?;
        channel.request_shell(false).await?;
        debug!("{} Shell request successful", device_addr);

        Ok(Box::new(SshStream {
            addr: device_addr,
            client: Some(client),
            channel,
            partial: Vec::new(),
            closed: false,
        }))
    }
}

/// Interactive shell channel of one SSH connection.
pub struct SshStream {
    addr: String,
    client: Option<Client>,
    channel: Channel<Msg>,
    /// Start of a UTF-8 sequence cut off at the end of the last packet.
    partial: Vec<u8>,
    closed: bool,
}

impl SshStream {
    fn finish(&mut self) -> Option<String> {
        self.closed = true;
        if self.partial.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.partial);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Decodes `data` after the bytes held over from the previous packet.
/// An incomplete character at the end is kept in `partial`.
fn decode_chunk(partial: &mut Vec<u8>, data: &[u8]) -> String {
    partial.extend_from_slice(data);
    let tail = partial.split_off(partial.len() - incomplete_tail(partial));
    let text = String::from_utf8_lossy(partial).into_owned();
    *partial = tail;
    text
}

/// Length of a multi-byte sequence that `bytes` ends in the middle of.
fn incomplete_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let needed = match bytes[bytes.len() - back] {
            0x00..=0x7f => return 0,
            0x80..=0xbf => continue,
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf7 => 4,
            _ => return 0,
        };
        return if needed > back { back } else { 0 };
    }
    0
}

#[async_trait]
impl Stream for SshStream {
    async fn write(&mut self, data: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::StreamClosed {
                pending: String::new(),
            });
        }
        self.channel.data(data.as_bytes()).await?;
        Ok(())
    }

    async fn read(&mut self) -> Option<String> {
        if self.closed {
            return None;
        }
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { ref data })
                | Some(ChannelMsg::ExtendedData { ref data, .. }) => {
                    let text = decode_chunk(&mut self.partial, data);
                    if !text.is_empty() {
                        return Some(text);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!("{} Shell exited with status code: {}", self.addr, exit_status);
                    return self.finish();
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    debug!("{} Shell sent EOF.", self.addr);
                    return self.finish();
                }
                Some(_) => {}
            }
        }
    }

    async fn shutdown(&mut self) {
        if !self.closed {
            if let Err(e) = self.channel.eof().await {
                debug!("{} Failed to send EOF: {:?}", self.addr, e);
            }
            self.closed = true;
        }
        // async-ssh2-tokio closes the connection when the client is dropped.
        if self.client.take().is_some() {
            debug!("{} SSH connection released", self.addr);
        }
    }
}
