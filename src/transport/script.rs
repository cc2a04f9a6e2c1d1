use super::*;

/// One step of a scripted device conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Unsolicited output, emitted as soon as the previous step completes.
    Emit { output: String },
    /// Turns echo of received lines on or off from this point.
    Echo { on: bool },
    /// Waits for `input` (`*` matches any line), then emits `output`.
    Respond { input: String, output: String },
    /// Waits for `input`, emits `output`, then closes the stream.
    Close {
        input: String,
        #[serde(default)]
        output: String,
    },
    /// Waits for `input` and never answers.
    Ignore { input: String },
}

impl ScriptStep {
    fn accepts(input: &str, line: &str) -> bool {
        input == "*" || input == line
    }
}

/// An ordered conversation a scripted device plays back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceScript {
    pub steps: Vec<ScriptStep>,
}

impl DeviceScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(mut self, output: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Emit {
            output: output.into(),
        });
        self
    }

    pub fn echo(mut self, on: bool) -> Self {
        self.steps.push(ScriptStep::Echo { on });
        self
    }

    pub fn respond(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Respond {
            input: input.into(),
            output: output.into(),
        });
        self
    }

    pub fn close_on(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Close {
            input: input.into(),
            output: output.into(),
        });
        self
    }

    pub fn ignore(mut self, input: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Ignore {
            input: input.into(),
        });
        self
    }

    /// Parses one JSON-encoded [`ScriptStep`] per line; blank lines are skipped.
    pub fn from_jsonl(jsonl: &str) -> Result<Self, serde_json::Error> {
        let steps = jsonl
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<ScriptStep>, _>>()?;
        Ok(Self { steps })
    }

    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for step in &self.steps {
            out.push_str(&serde_json::to_string(step)?);
            out.push('\n');
        }
        Ok(out)
    }
}

#[derive(Debug, Default)]
struct TranscriptState {
    received: Vec<String>,
    unexpected: Vec<String>,
    shutdowns: usize,
    released: bool,
}

/// Shared view of what a scripted device saw. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    inner: Arc<Mutex<TranscriptState>>,
}

impl Transcript {
    fn with<R>(&self, f: impl FnOnce(&mut TranscriptState) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Every line the client sent, in order.
    pub fn received(&self) -> Vec<String> {
        self.with(|s| s.received.clone())
    }

    /// Lines that did not fit the script.
    pub fn unexpected(&self) -> Vec<String> {
        self.with(|s| s.unexpected.clone())
    }

    /// How often the client shut the stream down.
    pub fn shutdowns(&self) -> usize {
        self.with(|s| s.shutdowns)
    }

    /// True once the stream itself was dropped.
    pub fn released(&self) -> bool {
        self.with(|s| s.released)
    }
}

/// A [`Stream`] that plays a [`DeviceScript`] back.
pub struct ScriptedStream {
    steps: Vec<ScriptStep>,
    cursor: usize,
    echo: bool,
    outgoing: VecDeque<String>,
    partial_line: String,
    closed: bool,
    transcript: Transcript,
}

impl ScriptedStream {
    pub fn new(script: DeviceScript) -> (Self, Transcript) {
        let transcript = Transcript::default();
        let mut stream = Self {
            steps: script.steps,
            cursor: 0,
            echo: false,
            outgoing: VecDeque::new(),
            partial_line: String::new(),
            closed: false,
            transcript: transcript.clone(),
        };
        stream.run_unsolicited();
        (stream, transcript)
    }

    fn push_output(&mut self, output: &str) {
        if !output.is_empty() {
            self.outgoing.push_back(output.to_string());
        }
    }

    fn run_unsolicited(&mut self) {
        while let Some(step) = self.steps.get(self.cursor).cloned() {
            match step {
                ScriptStep::Emit { output } => self.push_output(&output),
                ScriptStep::Echo { on } => self.echo = on,
                _ => break,
            }
            self.cursor += 1;
        }
    }

    fn on_line(&mut self, line: &str) {
        self.transcript.with(|s| s.received.push(line.to_string()));
        if self.closed {
            return;
        }
        if self.echo {
            self.push_output(&format!("{line}\r\n"));
        }
        match self.steps.get(self.cursor).cloned() {
            Some(ScriptStep::Respond { input, output }) if ScriptStep::accepts(&input, line) => {
                self.push_output(&output);
                self.cursor += 1;
                self.run_unsolicited();
            }
            Some(ScriptStep::Close { input, output }) if ScriptStep::accepts(&input, line) => {
                self.push_output(&output);
                self.cursor += 1;
                self.closed = true;
            }
            Some(ScriptStep::Ignore { input }) if ScriptStep::accepts(&input, line) => {
                self.cursor += 1;
                self.run_unsolicited();
            }
            Some(step) => {
                warn!("script expected {:?}, got {:?}", step, line);
                self.transcript.with(|s| s.unexpected.push(line.to_string()));
            }
            None => {
                self.transcript.with(|s| s.unexpected.push(line.to_string()));
            }
        }
    }
}

#[async_trait]
impl Stream for ScriptedStream {
    async fn write(&mut self, data: &str) -> Result<(), TransportError> {
        if self.closed && self.outgoing.is_empty() {
            return Err(TransportError::StreamClosed {
                pending: String::new(),
            });
        }
        self.partial_line.push_str(data);
        while let Some(pos) = self.partial_line.find('\n') {
            let raw: String = self.partial_line.drain(..=pos).collect();
            let line = raw.trim_end_matches(['\r', '\n']).to_string();
            self.on_line(&line);
        }
        Ok(())
    }

    async fn read(&mut self) -> Option<String> {
        if let Some(chunk) = self.outgoing.pop_front() {
            return Some(chunk);
        }
        if self.closed {
            return None;
        }
        std::future::pending::<Option<String>>().await
    }

    async fn shutdown(&mut self) {
        self.closed = true;
        self.outgoing.clear();
        self.transcript.with(|s| s.shutdowns += 1);
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.transcript.with(|s| s.released = true);
    }
}

/// Hands out scripted devices by host.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    scripts: HashMap<String, DeviceScript>,
    refused: HashSet<String>,
    hanging: HashSet<String>,
    transcripts: Mutex<HashMap<String, Transcript>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `script` for every connection to `host`.
    pub fn device(mut self, host: impl Into<String>, script: DeviceScript) -> Self {
        self.scripts.insert(host.into(), script);
        self
    }

    /// Refuses connections to `host`.
    pub fn refuse(mut self, host: impl Into<String>) -> Self {
        self.refused.insert(host.into());
        self
    }

    /// Never answers connections to `host`.
    pub fn hang(mut self, host: impl Into<String>) -> Self {
        self.hanging.insert(host.into());
        self
    }

    /// Transcript of the most recent connection to `host`.
    pub fn transcript(&self, host: &str) -> Option<Transcript> {
        self.transcripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .cloned()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn Stream>, TransportError> {
        if self.hanging.contains(&target.host) {
            std::future::pending::<()>().await;
        }
        let script = match self.scripts.get(&target.host) {
            Some(script) if !self.refused.contains(&target.host) => script.clone(),
            _ => {
                return Err(TransportError::ConnectRefused {
                    addr: target.addr(),
                    reason: "connection refused".to_string(),
                });
            }
        };
        let (stream, transcript) = ScriptedStream::new(script);
        self.transcripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target.host.clone(), transcript);
        Ok(Box::new(stream))
    }
}
