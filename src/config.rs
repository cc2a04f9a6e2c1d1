//! Configuration values: SSH algorithm profiles, prompt and command literals,
//! per-device timeouts and batch options.
//!
//! Nothing in here is global. A [`BatchConfig`] is built once by the caller
//! and handed to the orchestrator; each [`DeviceTarget`] carries its own
//! timeouts.

use std::fmt;
use std::time::Duration;

use russh::keys::{Algorithm, EcdsaCurve, HashAlg};
use russh::{cipher, compression, kex, mac};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Modern key exchange algorithms only.
pub const SECURE_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_GEX_SHA256,
    kex::DH_G16_SHA512,
    kex::DH_G18_SHA512,
];

/// Modern algorithms first, then the SHA-1 groups still shipped by older AP firmware.
pub const BALANCED_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_GEX_SHA256,
    kex::DH_G14_SHA256,
    kex::DH_G16_SHA512,
    kex::DH_G14_SHA1,
    kex::DH_GEX_SHA1,
];

/// Every key exchange russh knows, for firmware that predates all of the above.
pub const LEGACY_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_GEX_SHA1,
    kex::DH_GEX_SHA256,
    kex::DH_G1_SHA1,
    kex::DH_G14_SHA1,
    kex::DH_G14_SHA256,
    kex::DH_G15_SHA512,
    kex::DH_G16_SHA512,
    kex::DH_G17_SHA512,
    kex::DH_G18_SHA512,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::NONE,
];

pub static SECURE_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
];

pub static BALANCED_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
    cipher::AES_256_CBC,
    cipher::AES_192_CBC,
    cipher::AES_128_CBC,
];

pub static LEGACY_CIPHERS: &[cipher::Name] = &[
    cipher::CLEAR,
    cipher::NONE,
    cipher::AES_128_CTR,
    cipher::AES_192_CTR,
    cipher::AES_256_CTR,
    cipher::AES_256_GCM,
    cipher::AES_128_CBC,
    cipher::AES_192_CBC,
    cipher::AES_256_CBC,
    cipher::CHACHA20_POLY1305,
];

pub const SECURE_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
];

pub const BALANCED_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA1,
];

pub const LEGACY_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::NONE,
    mac::HMAC_SHA1,
    mac::HMAC_SHA256,
    mac::HMAC_SHA512,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512_ETM,
];

pub const DEFAULT_COMPRESSION_ALGORITHMS: &[compression::Name] = &[
    compression::NONE,
    compression::ZLIB,
    compression::ZLIB_LEGACY,
];

pub const SECURE_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
];

/// Secure key types plus plain `ssh-rsa`, which most AP firmware still presents.
pub const BALANCED_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa { hash: None },
];

pub const LEGACY_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Dsa,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Ed25519,
    Algorithm::Rsa { hash: None },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
];

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Per-operation timeouts for one device, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Timeouts {
    /// Opening the SSH connection.
    pub connect: u64,
    /// Each wait for a login, password or post-login prompt.
    pub login: u64,
    /// The post-login prompt gate.
    pub ready: u64,
    /// Waiting for the prompt to come back after a command.
    pub command: u64,
    /// Waiting after `reboot` is sent. Kept short: the device usually just goes away.
    pub reboot: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: 30,
            login: 30,
            ready: 10,
            command: 30,
            reboot: 10,
        }
    }
}

impl Timeouts {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect)
    }

    pub fn login(&self) -> Duration {
        Duration::from_secs(self.login)
    }

    pub fn ready(&self) -> Duration {
        Duration::from_secs(self.ready)
    }

    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command)
    }

    pub fn reboot(&self) -> Duration {
        Duration::from_secs(self.reboot)
    }
}

/// One access point to work on. Immutable once built.
#[derive(Clone)]
pub struct DeviceTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timeouts: Timeouts,
}

impl DeviceTarget {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            password: password.into(),
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// `user@host:port`, used as the log and error key for this device.
    pub fn addr(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

impl fmt::Debug for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

/// Shared credentials and settings that turn a bare host into a [`DeviceTarget`].
#[derive(Clone)]
pub struct DeviceTemplate {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub timeouts: Timeouts,
}

impl DeviceTemplate {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            port: DEFAULT_PORT,
            timeouts: Timeouts::default(),
        }
    }

    /// Builds the target for one host.
    pub fn target(&self, host: impl Into<String>) -> DeviceTarget {
        DeviceTarget {
            host: host.into(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            timeouts: self.timeouts,
        }
    }

    /// Loads a single-device setup from `RUCKUS_*` environment variables.
    ///
    /// Returns `Ok(None)` when any of `RUCKUS_HOST`, `RUCKUS_USERNAME` or
    /// `RUCKUS_PASSWORD` is unset.
    pub fn from_env() -> Result<Option<(String, DeviceTemplate)>, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`DeviceTemplate::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<(String, DeviceTemplate)>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (Some(host), Some(username), Some(password)) = (
            lookup("RUCKUS_HOST"),
            lookup("RUCKUS_USERNAME"),
            lookup("RUCKUS_PASSWORD"),
        ) else {
            return Ok(None);
        };
        if host.is_empty() || username.is_empty() || password.is_empty() {
            return Ok(None);
        }

        let mut template = DeviceTemplate::new(username, password);
        if let Some(port) = parse_var(&lookup, "RUCKUS_PORT")? {
            template.port = port;
        }
        if let Some(timeout) = parse_var::<u64, _>(&lookup, "RUCKUS_TIMEOUT")? {
            template.timeouts.connect = timeout;
            template.timeouts.login = timeout;
            template.timeouts.command = timeout;
        }
        if let Some(timeout) = parse_var(&lookup, "RUCKUS_REBOOT_TIMEOUT")? {
            template.timeouts.reboot = timeout;
        }
        Ok(Some((host, template)))
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar {
                name: name.to_string(),
                value,
            }),
    }
}

/// Literals recognised during login and at the device CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Prompts {
    /// Login prompts, vendor first then the generic fallback.
    pub login: Vec<String>,
    /// Password prompts, vendor first then the generic fallbacks.
    pub password: Vec<String>,
    /// Host-key confirmation question, answered with `yes`.
    pub host_key: String,
    /// The CLI prompt marking "ready for the next command".
    pub command: String,
    /// Acknowledgement some firmware prints on a line of its own before going
    /// down for a reboot.
    pub reboot_ack: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            login: vec!["Please login:".to_string(), "login:".to_string()],
            password: vec![
                "password :".to_string(),
                "Password:".to_string(),
                "password:".to_string(),
            ],
            host_key: "yes/no".to_string(),
            command: "rkscli:".to_string(),
            reboot_ack: "OK".to_string(),
        }
    }
}

/// Fixed command lines sent to the device CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Commands {
    pub version: String,
    pub uptime: String,
    pub reboot: String,
}

impl Default for Commands {
    fn default() -> Self {
        Self {
            version: "get version".to_string(),
            uptime: "get uptime".to_string(),
            reboot: "reboot".to_string(),
        }
    }
}

/// What happens to the in-flight device when a batch is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum AbortPolicy {
    /// Drop the device from the result entirely.
    Omit,
    /// Record it with the `Aborted` status.
    #[default]
    Record,
}

/// Options for one batch (or single-device) run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Query version and uptime once the session is ready.
    pub collect_info: bool,
    /// Send the reboot command once the session is ready.
    pub perform_reboot: bool,
    /// Pause between two devices.
    pub inter_device_delay: Duration,
    pub abort_policy: AbortPolicy,
    pub prompts: Prompts,
    pub commands: Commands,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            collect_info: false,
            perform_reboot: true,
            inter_device_delay: Duration::from_secs(2),
            abort_policy: AbortPolicy::default(),
            prompts: Prompts::default(),
            commands: Commands::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn from_lookup_requires_host_user_and_password() {
        let loaded = DeviceTemplate::from_lookup(lookup(&[
            ("RUCKUS_HOST", "10.0.0.1"),
            ("RUCKUS_USERNAME", "super"),
        ]))
        .expect("lookup");
        assert!(loaded.is_none());
    }

    #[test]
    fn from_lookup_applies_port_and_timeouts() {
        let (host, template) = DeviceTemplate::from_lookup(lookup(&[
            ("RUCKUS_HOST", "10.0.0.1"),
            ("RUCKUS_USERNAME", "super"),
            ("RUCKUS_PASSWORD", "sp-admin"),
            ("RUCKUS_PORT", "2222"),
            ("RUCKUS_TIMEOUT", "15"),
            ("RUCKUS_REBOOT_TIMEOUT", "5"),
        ]))
        .expect("lookup")
        .expect("complete environment");

        assert_eq!(host, "10.0.0.1");
        assert_eq!(template.port, 2222);
        assert_eq!(template.timeouts.login, 15);
        assert_eq!(template.timeouts.command, 15);
        assert_eq!(template.timeouts.reboot, 5);
        assert_eq!(template.timeouts.ready, Timeouts::default().ready);
    }

    #[test]
    fn from_lookup_rejects_malformed_port() {
        let err = match DeviceTemplate::from_lookup(lookup(&[
            ("RUCKUS_HOST", "10.0.0.1"),
            ("RUCKUS_USERNAME", "super"),
            ("RUCKUS_PASSWORD", "sp-admin"),
            ("RUCKUS_PORT", "twenty-two"),
        ])) {
            Ok(_) => panic!("malformed port should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, ConfigError::InvalidVar { ref name, .. } if name == "RUCKUS_PORT"));
    }

    #[test]
    fn template_stamps_hosts_into_targets() {
        let template = DeviceTemplate::new("super", "sp-admin");
        let target = template.target("192.168.1.7");
        assert_eq!(target.addr(), "super@192.168.1.7:22");
        assert_eq!(target.timeouts, Timeouts::default());
    }

    #[test]
    fn target_debug_redacts_password() {
        let target = DeviceTarget::new("10.0.0.1", "super", "sp-admin");
        let rendered = format!("{target:?}");
        assert!(!rendered.contains("sp-admin"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn default_prompts_list_vendor_literals_first() {
        let prompts = Prompts::default();
        assert_eq!(prompts.login[0], "Please login:");
        assert_eq!(prompts.password[0], "password :");
        assert_eq!(prompts.command, "rkscli:");
    }
}
