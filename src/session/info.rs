use super::*;

/// Diagnostic information read from the device CLI.
///
/// Output is stored verbatim once echo and prompt are removed; nothing is
/// parsed, so unexpected firmware output still ends up in the report.
#[derive(Debug, Default)]
pub struct DeviceInfo {
    pub version: Option<String>,
    pub uptime: Option<String>,
    /// Failures of individual queries. They do not stop the remaining flow.
    pub errors: Vec<CommandError>,
}

impl DeviceInfo {
    /// True when every query produced output.
    pub fn is_complete(&self) -> bool {
        self.version.is_some() && self.uptime.is_some()
    }

    /// True when no query produced output.
    pub fn is_empty(&self) -> bool {
        self.version.is_none() && self.uptime.is_none()
    }
}

impl Session {
    /// Queries version, then uptime.
    pub async fn collect_info(&mut self, commands: &Commands) -> DeviceInfo {
        let mut info = DeviceInfo::default();
        match self.execute(&commands.version).await {
            Ok(result) => info.version = Some(result.output),
            Err(err) => {
                warn!("{} version query failed: {}", self.target.addr(), err);
                info.errors.push(err);
            }
        }
        match self.execute(&commands.uptime).await {
            Ok(result) => info.uptime = Some(result.output),
            Err(err) => {
                warn!("{} uptime query failed: {}", self.target.addr(), err);
                info.errors.push(err);
            }
        }
        info
    }
}
