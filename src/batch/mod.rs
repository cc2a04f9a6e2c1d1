//! Sequential processing of device lists.
//!
//! The [`BatchOrchestrator`] walks its targets strictly in input order, one
//! device at a time. Every device gets exactly one [`Session`], which is
//! closed before the next device starts, and exactly one [`DeviceReport`]
//! whatever happened to it. A failing device never stops the batch.
//!
//! # Main Components
//!
//! - [`BatchOrchestrator`] - drives login, info collection and reboot per device
//! - [`DeviceReport`] / [`DeviceStatus`] - the per-device outcome
//! - [`aggregate`] / [`Summary`] - pure folding of reports into counts

use std::fmt;
use std::future::Future;

use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::{AbortPolicy, BatchConfig, DeviceTarget};
use crate::error::DeviceError;
use crate::session::{DeviceInfo, RebootOutcome, Session};
use crate::transport::Connector;

pub use report::{
    BatchResult, DeviceReport, DeviceStatus, Summary, aggregate, derive_status, report_schema,
};

mod report;

/// Runs devices one after another with a fixed pause in between.
pub struct BatchOrchestrator<C> {
    connector: C,
    config: BatchConfig,
}

impl<C: Connector> BatchOrchestrator<C> {
    pub fn new(connector: C, config: BatchConfig) -> Self {
        Self { connector, config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Processes one device and surfaces failures before the prompt gate as
    /// errors instead of folding them into a report.
    ///
    /// The session is closed on every path.
    pub async fn run_single(&self, target: &DeviceTarget) -> Result<DeviceReport, DeviceError> {
        let started = Instant::now();
        let mut session = Session::open(&self.connector, target, &self.config.prompts).await?;
        let outcome = self.drive(&mut session).await;
        session.close().await;

        let mut report = outcome?;
        report.elapsed_ms = elapsed_ms(started);
        Ok(report)
    }

    /// Processes every target. Never fails; each device ends up in a report.
    pub async fn run_batch(&self, targets: &[DeviceTarget]) -> BatchResult {
        self.run_batch_until(targets, std::future::pending::<()>())
            .await
    }

    /// Like [`run_batch`](Self::run_batch), but stops as soon as `shutdown`
    /// completes.
    ///
    /// The in-flight device's transport is dropped at once. Reports already
    /// finished are kept; the interrupted device is recorded as
    /// [`DeviceStatus::Aborted`] or left out depending on the configured
    /// [`AbortPolicy`]. Devices not started yet get no report.
    pub async fn run_batch_until<F>(&self, targets: &[DeviceTarget], shutdown: F) -> BatchResult
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let total = targets.len();
        let mut reports = Vec::with_capacity(total);
        let mut cancelled = false;

        for (index, target) in targets.iter().enumerate() {
            info!("[{}/{}] processing {}", index + 1, total, target.host);
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    warn!("batch cancelled while processing {}", target.host);
                    if self.config.abort_policy == AbortPolicy::Record {
                        reports.push(DeviceReport::aborted(target));
                    }
                    cancelled = true;
                }
                report = self.process(target) => {
                    info!(
                        "[{}/{}] {}: {} ({})",
                        index + 1,
                        total,
                        report.host,
                        report.status,
                        report.message()
                    );
                    reports.push(report);
                }
            }
            if cancelled {
                break;
            }

            if index + 1 < total && !self.config.inter_device_delay.is_zero() {
                debug!("waiting {:?} before next device", self.config.inter_device_delay);
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        warn!("batch cancelled between devices");
                        cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.config.inter_device_delay) => {}
                }
            }
        }

        aggregate(reports, cancelled)
    }

    async fn process(&self, target: &DeviceTarget) -> DeviceReport {
        let started = Instant::now();
        match self.run_single(target).await {
            Ok(report) => report,
            Err(err) => {
                warn!("{} failed: {}", target.addr(), err);
                let mut report = DeviceReport::failed(target, &err, self.config.perform_reboot);
                report.elapsed_ms = elapsed_ms(started);
                report
            }
        }
    }

    async fn drive(&self, session: &mut Session) -> Result<DeviceReport, DeviceError> {
        session.start().await?;
        let target = session.target().clone();
        let mut details: Vec<String> = Vec::new();

        let info: Option<DeviceInfo> = if self.config.collect_info {
            let info = session.collect_info(&self.config.commands).await;
            details.extend(info.errors.iter().map(ToString::to_string));
            Some(info)
        } else {
            None
        };

        let reboot = if self.config.perform_reboot {
            match session.reboot(&self.config.commands.reboot).await {
                Ok(RebootOutcome::Ambiguous) => {
                    details.push("prompt returned after reboot command".to_string());
                    Some(RebootOutcome::Ambiguous)
                }
                Ok(outcome) => Some(outcome),
                Err(err) => {
                    details.push(format!("reboot not sent: {err}"));
                    Some(RebootOutcome::FailedBeforeSend)
                }
            }
        } else {
            None
        };

        let mut report = DeviceReport::new(&target, derive_status(info.as_ref(), reboot));
        if let Some(info) = info {
            report.version = info.version;
            report.uptime = info.uptime;
        }
        report.reboot = reboot;
        if !details.is_empty() {
            report.error = Some(details.join("; "));
        }
        Ok(report)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{DeviceScript, ScriptedConnector};
    use std::time::Duration;

    fn login(password_reply: &str) -> DeviceScript {
        DeviceScript::new()
            .emit("Please login: ")
            .respond("super", "password : ")
            .respond("sp-admin", password_reply)
    }

    fn healthy() -> DeviceScript {
        login("rkscli:")
            .respond("", "\r\nrkscli:")
            .close_on("reboot", "")
    }

    fn target(host: &str) -> DeviceTarget {
        DeviceTarget::new(host, "super", "sp-admin")
    }

    fn config(collect_info: bool, perform_reboot: bool) -> BatchConfig {
        BatchConfig {
            collect_info,
            perform_reboot,
            ..BatchConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn login_version_and_reboot_end_to_end() {
        let script = login("rkscli:")
            .respond("", "\r\nrkscli:")
            .respond("get version", "Model X v1\nrkscli:")
            .respond("get uptime", "up 2 days\nrkscli:")
            .close_on("reboot", "");
        let connector = ScriptedConnector::new().device("192.168.1.1", script);
        let orchestrator = BatchOrchestrator::new(connector, config(true, true));

        let report = orchestrator
            .run_single(&target("192.168.1.1"))
            .await
            .expect("device report");
        assert_eq!(report.status, DeviceStatus::Success);
        assert_eq!(report.version.as_deref(), Some("Model X v1"));
        assert_eq!(report.uptime.as_deref(), Some("up 2 days"));
        assert_eq!(report.reboot, Some(RebootOutcome::Success));
        assert_eq!(report.error, None);

        let transcript = orchestrator
            .connector()
            .transcript("192.168.1.1")
            .expect("device contacted");
        assert_eq!(
            transcript.received(),
            vec!["super", "sp-admin", "", "get version", "get uptime", "reboot"]
        );
        assert_eq!(transcript.shutdowns(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_single_surfaces_errors_and_still_closes() {
        let connector = ScriptedConnector::new()
            .refuse("10.0.0.1")
            .device("10.0.0.2", login("\r\nPlease login: "));
        let orchestrator = BatchOrchestrator::new(connector, BatchConfig::default());

        let err = match orchestrator.run_single(&target("10.0.0.1")).await {
            Ok(report) => panic!("refused host produced {report:?}"),
            Err(err) => err,
        };
        assert!(matches!(err, DeviceError::Connect(_)));
        assert_eq!(err.status(), DeviceStatus::ConnectFailed);

        let err = match orchestrator.run_single(&target("10.0.0.2")).await {
            Ok(report) => panic!("rejected login produced {report:?}"),
            Err(err) => err,
        };
        assert!(matches!(err, DeviceError::Auth(_)));
        let transcript = orchestrator
            .connector()
            .transcript("10.0.0.2")
            .expect("device contacted");
        assert_eq!(transcript.shutdowns(), 1);
        assert!(!transcript.received().contains(&"reboot".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn batch_yields_one_report_per_target_in_order() {
        let connector = ScriptedConnector::new()
            .device("10.0.0.1", healthy())
            .refuse("10.0.0.2")
            .device("10.0.0.3", login("\r\nPlease login: "))
            .device("10.0.0.4", login("rkscli:").ignore(""))
            .device("10.0.0.5", healthy());
        let orchestrator = BatchOrchestrator::new(connector, BatchConfig::default());
        let targets: Vec<DeviceTarget> = (1..=5).map(|i| target(&format!("10.0.0.{i}"))).collect();

        let result = orchestrator.run_batch(&targets).await;
        let hosts: Vec<&str> = result.reports.iter().map(|r| r.host.as_str()).collect();
        assert_eq!(hosts, ["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5"]);
        let statuses: Vec<DeviceStatus> = result.reports.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            [
                DeviceStatus::Success,
                DeviceStatus::ConnectFailed,
                DeviceStatus::AuthFailed,
                DeviceStatus::CommandError,
                DeviceStatus::Success,
            ]
        );
        assert_eq!(result.summary.total, 5);
        assert_eq!(result.summary.success, 2);
        assert!(!result.cancelled);

        for report in &result.reports[1..4] {
            assert_eq!(report.reboot, Some(RebootOutcome::FailedBeforeSend));
            assert!(report.error.is_some());
        }
        for host in ["10.0.0.1", "10.0.0.3", "10.0.0.4", "10.0.0.5"] {
            let transcript = orchestrator
                .connector()
                .transcript(host)
                .expect("device contacted");
            assert_eq!(transcript.shutdowns(), 1, "{host} left open");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delay_only_between_devices() {
        let connector = ScriptedConnector::new()
            .device("10.0.0.1", healthy())
            .device("10.0.0.2", healthy())
            .device("10.0.0.3", healthy());
        let orchestrator = BatchOrchestrator::new(connector, BatchConfig::default());
        let targets = [target("10.0.0.1"), target("10.0.0.2"), target("10.0.0.3")];

        let started = Instant::now();
        let result = orchestrator.run_batch(&targets).await;
        assert_eq!(result.summary.success, 3);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn info_only_run_never_reboots() {
        let script = login("rkscli:")
            .respond("", "\r\nrkscli:")
            .respond("get version", "Model X v1\r\nrkscli:")
            .respond("get uptime", "up 2 days\r\nrkscli:");
        let connector = ScriptedConnector::new().device("10.0.0.1", script);
        let orchestrator = BatchOrchestrator::new(connector, config(true, false));

        let result = orchestrator.run_batch(&[target("10.0.0.1")]).await;
        let report = &result.reports[0];
        assert_eq!(report.status, DeviceStatus::Success);
        assert_eq!(report.reboot, None);
        let transcript = orchestrator
            .connector()
            .transcript("10.0.0.1")
            .expect("device contacted");
        assert!(!transcript.received().contains(&"reboot".to_string()));
        assert_eq!(transcript.received().last().map(String::as_str), Some("exit"));
    }

    #[tokio::test(start_paused = true)]
    async fn ambiguous_reboot_after_info_is_partial() {
        let script = login("rkscli:")
            .respond("", "\r\nrkscli:")
            .respond("get version", "Model X v1\r\nrkscli:")
            .respond("get uptime", "up 2 days\r\nrkscli:")
            .respond("reboot", "not allowed\r\nrkscli:");
        let connector = ScriptedConnector::new().device("10.0.0.1", script);
        let orchestrator = BatchOrchestrator::new(connector, config(true, true));

        let report = orchestrator
            .run_single(&target("10.0.0.1"))
            .await
            .expect("device report");
        assert_eq!(report.status, DeviceStatus::PartialInfoOnly);
        assert_eq!(report.reboot, Some(RebootOutcome::Ambiguous));
        assert_eq!(report.version.as_deref(), Some("Model X v1"));
        assert!(report.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn info_timeout_skips_reboot() {
        let script = login("rkscli:")
            .respond("", "\r\nrkscli:")
            .ignore("get version");
        let connector = ScriptedConnector::new().device("10.0.0.1", script);
        let orchestrator = BatchOrchestrator::new(connector, config(true, true));

        let report = orchestrator
            .run_single(&target("10.0.0.1"))
            .await
            .expect("device report");
        assert_eq!(report.status, DeviceStatus::CommandError);
        assert_eq!(report.reboot, Some(RebootOutcome::FailedBeforeSend));
        let transcript = orchestrator
            .connector()
            .transcript("10.0.0.1")
            .expect("device contacted");
        assert!(!transcript.received().contains(&"reboot".to_string()));
    }

    fn abort_fixture(policy: AbortPolicy) -> BatchOrchestrator<ScriptedConnector> {
        let connector = ScriptedConnector::new()
            .device("10.0.0.1", healthy())
            .device("10.0.0.2", login("rkscli:").ignore(""))
            .device("10.0.0.3", healthy());
        let config = BatchConfig {
            abort_policy: policy,
            ..BatchConfig::default()
        };
        BatchOrchestrator::new(connector, config)
    }

    fn abort_targets() -> [DeviceTarget; 3] {
        [target("10.0.0.1"), target("10.0.0.2"), target("10.0.0.3")]
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_records_in_flight_device_as_aborted() {
        let orchestrator = abort_fixture(AbortPolicy::Record);
        let shutdown = tokio::time::sleep(Duration::from_secs(5));

        let result = orchestrator.run_batch_until(&abort_targets(), shutdown).await;
        assert!(result.cancelled);
        assert_eq!(result.reports.len(), 2);
        assert_eq!(result.reports[0].status, DeviceStatus::Success);
        assert_eq!(result.reports[1].status, DeviceStatus::Aborted);
        assert_eq!(result.summary.aborted, 1);

        let in_flight = orchestrator
            .connector()
            .transcript("10.0.0.2")
            .expect("device contacted");
        assert!(in_flight.released());
        assert!(orchestrator.connector().transcript("10.0.0.3").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_can_omit_in_flight_device() {
        let orchestrator = abort_fixture(AbortPolicy::Omit);
        let shutdown = tokio::time::sleep(Duration::from_secs(5));

        let result = orchestrator.run_batch_until(&abort_targets(), shutdown).await;
        assert!(result.cancelled);
        assert_eq!(result.reports.len(), 1);
        assert_eq!(result.reports[0].host, "10.0.0.1");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_delay_keeps_finished_reports() {
        let orchestrator = abort_fixture(AbortPolicy::Record);
        let shutdown = tokio::time::sleep(Duration::from_secs(1));

        let result = orchestrator.run_batch_until(&abort_targets(), shutdown).await;
        assert!(result.cancelled);
        assert_eq!(result.reports.len(), 1);
        assert_eq!(result.summary.aborted, 0);
        assert!(orchestrator.connector().transcript("10.0.0.2").is_none());
    }
}
