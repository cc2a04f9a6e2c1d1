//! # rkreboot - Ruckus Access Point Reboot Tool
//!
//! `rkreboot` logs into Ruckus access points over their interactive SSH CLI,
//! optionally reads version and uptime, and sends the reboot command. It works
//! on a single device or on a list of devices processed one after another.
//!
//! ## Features
//!
//! - **Explicit login state machine**: vendor and generic login/password prompts,
//!   host-key confirmation answered automatically
//! - **Prompt gate**: no command is sent before the CLI prompt is confirmed
//! - **Bounded waits**: every read from the device has a deadline
//! - **Disconnect-as-success reboot**: a device that hangs up after `reboot` did its job
//! - **Batch runs**: one report per device, in input order, failures never stop the run
//! - **Scripted devices**: the transport is a trait, so flows can be replayed without hardware
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rkreboot::batch::BatchOrchestrator;
//! use rkreboot::config::{BatchConfig, DeviceTemplate};
//! use rkreboot::transport::SshConnector;
//!
//! #[tokio::main]
//! async fn main() {
//!     let template = DeviceTemplate::new("super", "sp-admin");
//!     let targets = vec![template.target("192.168.1.10"), template.target("192.168.1.11")];
//!
//!     let config = BatchConfig {
//!         collect_info: true,
//!         ..BatchConfig::default()
//!     };
//!     let orchestrator = BatchOrchestrator::new(SshConnector::default(), config);
//!     let result = orchestrator.run_batch(&targets).await;
//!
//!     for report in &result.reports {
//!         println!("{}: {} {}", report.host, report.status, report.message());
//!     }
//!     println!(
//!         "{}/{} devices rebooted successfully",
//!         result.summary.success, result.summary.total
//!     );
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`transport::SessionTransport`] - buffered send/expect/close over one shell stream
//! - [`auth::AuthFlow`] - login state machine
//! - [`session::Session`] - prompt gate, commands, info collection and reboot
//! - [`batch::BatchOrchestrator`] - sequential processing of many devices
//! - [`error`] - error types per layer
//! - [`config`] - targets, timeouts, prompts and SSH algorithm lists

pub mod auth;
pub mod batch;
pub mod config;
pub mod error;
pub mod session;
pub mod targets;
pub mod transport;
