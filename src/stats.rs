use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use humansize::{format_size, BINARY};

#[derive(Clone, Default)]
pub struct Stats {
    total_connections: Arc<AtomicUsize>,
    active_connections: Arc<AtomicUsize>,
    blocked_connections: Arc<AtomicUsize>,
    rejected_connections: Arc<AtomicUsize>,
    failed_connections: Arc<AtomicUsize>,
    traffic_in: Arc<AtomicU64>,
    traffic_out: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total: usize,
    pub active: usize,
    pub blocked: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Bytes sent to clients.
    pub traffic_in: u64,
    /// Bytes sent to origins.
    pub traffic_out: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_blocked(&self) {
        self.blocked_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.failed_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_in(&self, bytes: u64) {
        self.traffic_in.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_out(&self, bytes: u64) {
        self.traffic_out.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn active_count(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Counts a new session as total and active until the guard drops.
    pub fn session_guard(&self) -> SessionGuard {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        SessionGuard {
            active: Arc::clone(&self.active_connections),
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total: self.total_connections.load(Ordering::Relaxed),
            active: self.active_connections.load(Ordering::Relaxed),
            blocked: self.blocked_connections.load(Ordering::Relaxed),
            rejected: self.rejected_connections.load(Ordering::Relaxed),
            failed: self.failed_connections.load(Ordering::Relaxed),
            traffic_in: self.traffic_in.load(Ordering::Relaxed),
            traffic_out: self.traffic_out.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    pub fn print(&self) {
        println!("\n╔══════════════════════════════════════════════════════╗");
        println!("║                 \x1b[92mFINAL STATISTICS\x1b[0m                    ║");
        println!("╚══════════════════════════════════════════════════════╝\n");

        for line in self.summary_lines() {
            println!("{}", line);
        }
    }

    /// Sessions still running at snapshot time have not added their final bytes.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("  \x1b[97mTotal Connections:\x1b[0m      {}", self.total),
            format!("  \x1b[97mStill Active:\x1b[0m           {}", self.active),
            format!("  \x1b[97mBlocked Connections:\x1b[0m    {}", self.blocked),
            format!("  \x1b[97mRejected (capacity):\x1b[0m    {}", self.rejected),
            format!("  \x1b[97mFailed Connections:\x1b[0m     {}", self.failed),
            format!("  \x1b[97mTotal Downloaded:\x1b[0m       {}", format_size(self.traffic_in, BINARY)),
            format!("  \x1b[97mTotal Uploaded:\x1b[0m         {}", format_size(self.traffic_out, BINARY)),
        ];
        if self.active > 0 {
            lines.push(format!(
                "  \x1b[93m(traffic covers finished sessions and partial counts for {} still open)\x1b[0m",
                self.active
            ));
        }
        lines
    }
}

pub struct SessionGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = Stats::new();
        stats.inc_blocked();
        stats.inc_rejected();
        stats.inc_rejected();
        stats.add_in(100);
        stats.add_out(200);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.blocked, 1);
        assert_eq!(snapshot.rejected, 2);
        assert_eq!(snapshot.failed, 0);
        assert_eq!(snapshot.traffic_in, 100);
        assert_eq!(snapshot.traffic_out, 200);
    }

    #[test]
    fn test_summary_reports_unfinished_sessions() {
        let stats = Stats::new();
        let done = stats.session_guard();
        drop(done);
        let _open = stats.session_guard();
        stats.add_in(2048);

        let lines = stats.snapshot().summary_lines();
        assert!(lines.iter().any(|l| l.contains("Still Active") && l.ends_with(" 1")));
        assert!(lines.iter().any(|l| l.contains("Downloaded") && l.contains("KiB")));
        assert!(lines.last().unwrap().contains("1 still open"));
    }

    #[test]
    fn test_summary_without_open_sessions() {
        let stats = Stats::new();
        drop(stats.session_guard());

        let lines = stats.snapshot().summary_lines();
        assert!(!lines.iter().any(|l| l.contains("still open")));
    }

    #[test]
    fn test_session_guard() {
        let stats = Stats::new();
        {
            let _guard = stats.session_guard();
            assert_eq!(stats.active_count(), 1);
        }
        assert_eq!(stats.active_count(), 0);
        assert_eq!(stats.snapshot().total, 1);
    }
}
