//! Hostname blocklist.
//!
//! Every file in the blocklist directory contributes one hostname per line:
//! ```text
//! # comment
//! ads.example.com
//! 0.0.0.0 tracker.example.com
//! ```
//! Matching is exact and case-sensitive. No suffix or wildcard rules.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;

use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Blocked,
    Allowed,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Blocked => f.write_str("blocked"),
            Decision::Allowed => f.write_str("allowed"),
        }
    }
}

/// Immutable set of blocked hostnames, built once at startup.
#[derive(Debug, Default, Clone)]
pub struct BlockSet {
    hosts: HashSet<String>,
}

impl BlockSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every regular file in `dir`. A missing directory gives an empty set.
    pub fn load_dir(dir: &Path) -> std::io::Result<Self> {
        if !dir.exists() {
            warn!("Blocklist directory {:?} not found, nothing will be blocked", dir);
            return Ok(Self::new());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        let mut hosts = HashSet::new();
        for path in &files {
            let content = std::fs::read_to_string(path)?;
            let before = hosts.len();
            hosts.extend(parse_list(&content));
            debug!("{:?}: {} new entries", path, hosts.len() - before);
        }

        info!("Loaded {} blocked domains from {} files", hosts.len(), files.len());
        Ok(Self { hosts })
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains(host)
    }

    /// Block decision for one session. Emits one event per call.
    pub fn decide(&self, host: &str, client: SocketAddr) -> Decision {
        if self.contains(host) {
            info!("{} from {} blocked", host, client);
            Decision::Blocked
        } else {
            info!("{} from {} allowed", host, client);
            Decision::Allowed
        }
    }
}

impl<S: Into<String>> FromIterator<S> for BlockSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            hosts: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Entries of one list file, in file order, duplicates included.
pub fn parse_list(content: &str) -> Vec<String> {
    let mut hosts = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // hosts-file format: "0.0.0.0 name"
        let host = if line.starts_with("0.0.0.0 ") || line.starts_with("127.0.0.1 ") {
            line.split_whitespace().nth(1)
        } else {
            line.split_whitespace().next()
        };

        if let Some(h) = host {
            hosts.push(h.to_string());
        }
    }

    hosts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn client() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[test]
    fn test_parse_plain_and_hosts_format() {
        let content = "\
# Comment line
ads.example.com

0.0.0.0 tracker.example.com
127.0.0.1 doubleclick.net
  spaced.example.com
";
        assert_eq!(
            parse_list(content),
            vec![
                "ads.example.com",
                "tracker.example.com",
                "doubleclick.net",
                "spaced.example.com",
            ]
        );
    }

    #[test]
    fn test_parse_keeps_case() {
        assert_eq!(parse_list("Ads.Example.COM\r\n"), vec!["Ads.Example.COM"]);
    }

    #[test]
    fn test_exact_match_only() {
        let set: BlockSet = ["ads.example.com"].into_iter().collect();
        assert_eq!(set.decide("ads.example.com", client()), Decision::Blocked);
        assert_eq!(set.decide("ADS.example.com", client()), Decision::Allowed);
        assert_eq!(set.decide("sub.ads.example.com", client()), Decision::Allowed);
        assert_eq!(set.decide("example.com", client()), Decision::Allowed);
    }

    #[test]
    fn test_load_dir_unions_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "one.example\ntwo.example\n").unwrap();
        fs::write(dir.path().join("b.txt"), "two.example\n0.0.0.0 three.example\n").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.txt"), "ignored.example\n").unwrap();

        let set = BlockSet::load_dir(dir.path()).unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.contains("one.example"));
        assert!(set.contains("two.example"));
        assert!(set.contains("three.example"));
        assert!(!set.contains("ignored.example"));
    }

    #[test]
    fn test_load_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let set = BlockSet::load_dir(&dir.path().join("absent")).unwrap();
        assert!(set.is_empty());
    }
}
