//! Device lists read from CSV-like files.
//!
//! Only the first comma-separated field of a line is used. Blank lines and
//! lines starting with `#` are skipped; anything else must be an IP address.

use std::io::ErrorKind;
use std::net::IpAddr;
use std::path::Path;

use log::{info, warn};

use crate::error::TargetError;

/// Hosts parsed from a target list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetList {
    /// Valid addresses in file order.
    pub hosts: Vec<String>,
    /// `(line number, text)` of entries that are not IP addresses.
    pub rejected: Vec<(usize, String)>,
}

/// Parses target lines. Line numbers in `rejected` start at 1.
pub fn parse_target_lines<I, S>(lines: I) -> TargetList
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut list = TargetList::default();
    for (index, line) in lines.into_iter().enumerate() {
        let line = line.as_ref();
        let field = line.split(',').next().unwrap_or_default().trim();
        if field.is_empty() || field.starts_with('#') {
            continue;
        }
        match field.parse::<IpAddr>() {
            Ok(_) => list.hosts.push(field.to_string()),
            Err(_) => list.rejected.push((index + 1, field.to_string())),
        }
    }
    list
}

/// Reads and parses a target file.
///
/// Rejected lines are logged and skipped; a file without a single valid
/// address is an error.
pub fn read_target_file(path: impl AsRef<Path>) -> Result<TargetList, TargetError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(TargetError::NotFound(display));
        }
        Err(err) => return Err(err.into()),
    };

    let list = parse_target_lines(content.lines());
    for (line, text) in &list.rejected {
        warn!("{}:{}: {:?} is not a valid IP address", display, line, text);
    }
    if list.hosts.is_empty() {
        return Err(TargetError::NoValidTargets(display));
    }
    info!("loaded {} valid IP addresses from {}", list.hosts.len(), display);
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let list = parse_target_lines(["# comment", "192.168.1.1", "", "192.168.1.2"]);
        assert_eq!(list.hosts, vec!["192.168.1.1", "192.168.1.2"]);
        assert!(list.rejected.is_empty());
    }

    #[test]
    fn only_the_first_field_counts() {
        let list = parse_target_lines([
            " 10.0.0.1 , lobby AP",
            "10.0.0.2,#not a comment",
            "fe80::1,ipv6",
        ]);
        assert_eq!(list.hosts, vec!["10.0.0.1", "10.0.0.2", "fe80::1"]);
    }

    #[test]
    fn invalid_addresses_are_rejected_with_line_numbers() {
        let list = parse_target_lines(["ip", "10.0.0.1", "", "ap-lobby.local", "300.1.1.1"]);
        assert_eq!(list.hosts, vec!["10.0.0.1"]);
        assert_eq!(
            list.rejected,
            vec![
                (1, "ip".to_string()),
                (4, "ap-lobby.local".to_string()),
                (5, "300.1.1.1".to_string()),
            ]
        );
    }

    #[test]
    fn reading_a_file() {
        let dir = std::env::temp_dir().join(format!("rkreboot-targets-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");

        let good = dir.join("aps.csv");
        let content = "ip,name\n10.1.1.1,lobby\n# spare\n10.1.1.2,office\n";
        std::fs::write(&good, content).expect("write");
        let list = read_target_file(&good).expect("valid list");
        assert_eq!(list.hosts, vec!["10.1.1.1", "10.1.1.2"]);
        assert_eq!(list.rejected, vec![(1, "ip".to_string())]);

        let empty = dir.join("empty.csv");
        std::fs::write(&empty, "# nothing here\n\n").expect("write");
        assert!(matches!(read_target_file(&empty), Err(TargetError::NoValidTargets(_))));

        assert!(matches!(
            read_target_file(dir.join("missing.csv")),
            Err(TargetError::NotFound(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
