use super::*;

/// Final status of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum DeviceStatus {
    Success,
    AuthFailed,
    ConnectFailed,
    CommandError,
    /// Some diagnostic output was captured but the requested job did not finish.
    PartialInfoOnly,
    /// The run was cancelled while this device was in flight.
    Aborted,
}

impl DeviceStatus {
    pub fn is_success(&self) -> bool {
        *self == DeviceStatus::Success
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DeviceStatus::Success => "Success",
            DeviceStatus::AuthFailed => "AuthFailed",
            DeviceStatus::ConnectFailed => "ConnectFailed",
            DeviceStatus::CommandError => "CommandError",
            DeviceStatus::PartialInfoOnly => "PartialInfoOnly",
            DeviceStatus::Aborted => "Aborted",
        };
        f.write_str(text)
    }
}

/// Outcome record for one device. Built once at the end of its processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeviceReport {
    pub host: String,
    pub port: u16,
    pub status: DeviceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
    /// Set when a reboot was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reboot: Option<RebootOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl DeviceReport {
    pub(super) fn new(target: &DeviceTarget, status: DeviceStatus) -> Self {
        Self {
            host: target.host.clone(),
            port: target.port,
            status,
            version: None,
            uptime: None,
            reboot: None,
            error: None,
            elapsed_ms: 0,
        }
    }

    /// Report for a device that never got a ready session.
    pub fn failed(target: &DeviceTarget, err: &DeviceError, reboot_requested: bool) -> Self {
        let mut report = Self::new(target, err.status());
        report.error = Some(err.to_string());
        if reboot_requested {
            report.reboot = Some(RebootOutcome::FailedBeforeSend);
        }
        report
    }

    /// Report for a device whose processing was cancelled.
    pub fn aborted(target: &DeviceTarget) -> Self {
        let mut report = Self::new(target, DeviceStatus::Aborted);
        report.error = Some("cancelled while in progress".to_string());
        report
    }

    /// One-line description used by the console output.
    pub fn message(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        match (self.status, self.reboot) {
            (DeviceStatus::Success, Some(RebootOutcome::Success)) => {
                "Reboot initiated successfully".to_string()
            }
            (DeviceStatus::Success, _) => "OK".to_string(),
            (status, _) => status.to_string(),
        }
    }
}

/// Report status for a device whose session became ready.
///
/// `info` is `None` when info collection was not requested, `reboot` is
/// `None` when no reboot was requested.
pub fn derive_status(info: Option<&DeviceInfo>, reboot: Option<RebootOutcome>) -> DeviceStatus {
    let captured_any = info.is_some_and(|info| !info.is_empty());
    match reboot {
        Some(RebootOutcome::Success) => DeviceStatus::Success,
        Some(_) if captured_any => DeviceStatus::PartialInfoOnly,
        Some(_) => DeviceStatus::CommandError,
        None => match info {
            None => DeviceStatus::Success,
            Some(info) if info.is_complete() => DeviceStatus::Success,
            Some(_) if captured_any => DeviceStatus::PartialInfoOnly,
            Some(_) => DeviceStatus::CommandError,
        },
    }
}

/// Counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Summary {
    pub total: usize,
    pub success: usize,
    pub auth_failed: usize,
    pub connect_failed: usize,
    pub command_error: usize,
    pub partial_info_only: usize,
    pub aborted: usize,
}

impl Summary {
    pub fn from_reports(reports: &[DeviceReport]) -> Self {
        reports.iter().fold(Summary::default(), |mut summary, report| {
            summary.total += 1;
            match report.status {
                DeviceStatus::Success => summary.success += 1,
                DeviceStatus::AuthFailed => summary.auth_failed += 1,
                DeviceStatus::ConnectFailed => summary.connect_failed += 1,
                DeviceStatus::CommandError => summary.command_error += 1,
                DeviceStatus::PartialInfoOnly => summary.partial_info_only += 1,
                DeviceStatus::Aborted => summary.aborted += 1,
            }
            summary
        })
    }

    pub fn count(&self, status: DeviceStatus) -> usize {
        match status {
            DeviceStatus::Success => self.success,
            DeviceStatus::AuthFailed => self.auth_failed,
            DeviceStatus::ConnectFailed => self.connect_failed,
            DeviceStatus::CommandError => self.command_error,
            DeviceStatus::PartialInfoOnly => self.partial_info_only,
            DeviceStatus::Aborted => self.aborted,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.success == self.total
    }
}

/// Reports in input order plus their summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BatchResult {
    pub reports: Vec<DeviceReport>,
    pub summary: Summary,
    /// True when the run was cancelled before the last device.
    #[serde(default)]
    pub cancelled: bool,
}

/// Folds reports into a [`BatchResult`]. Pure; the order of `reports` is kept.
pub fn aggregate(reports: Vec<DeviceReport>, cancelled: bool) -> BatchResult {
    let summary = Summary::from_reports(&reports);
    BatchResult {
        reports,
        summary,
        cancelled,
    }
}

/// JSON schema of [`BatchResult`], the document `--json` prints. The CLI
/// shows it with `--schema`.
pub fn report_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(BatchResult)).unwrap_or_default()
}
