use std::net::IpAddr;
use std::sync::Arc;

use dashmap::DashMap;

/// Distinct client addresses with live sessions, capped at `capacity`.
///
/// Only the accept loop admits. Sessions release their slot by dropping the
/// [`AddressLease`] they were handed, so the count of an address is the number
/// of its sessions still running.
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    addrs: Arc<DashMap<IpAddr, usize>>,
    capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            addrs: Arc::new(DashMap::new()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of distinct addresses currently tracked.
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.addrs.contains_key(ip)
    }

    /// Admission check for a fresh connection. `None` means the registry is full
    /// and the connection must be closed without starting a session.
    pub fn admit(&self, ip: IpAddr) -> Option<AddressLease> {
        if self.addrs.len() >= self.capacity {
            return None;
        }
        *self.addrs.entry(ip).or_insert(0) += 1;
        Some(AddressLease {
            addrs: Arc::clone(&self.addrs),
            ip,
        })
    }
}

/// Held by a session for its whole lifetime.
#[derive(Debug)]
pub struct AddressLease {
    addrs: Arc<DashMap<IpAddr, usize>>,
    ip: IpAddr,
}

impl AddressLease {
    pub fn ip(&self) -> IpAddr {
        self.ip
    }
}

impl Drop for AddressLease {
    fn drop(&mut self) {
        if let Some(mut count) = self.addrs.get_mut(&self.ip) {
            *count = count.saturating_sub(1);
        }
        self.addrs.remove_if(&self.ip, |_, count| *count == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_admit_until_full() {
        let registry = ConnectionRegistry::new(2);
        let _a = registry.admit(ip("10.0.0.1")).unwrap();
        let _b = registry.admit(ip("10.0.0.2")).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.admit(ip("10.0.0.3")).is_none());
        assert!(!registry.contains(&ip("10.0.0.3")));
    }

    #[test]
    fn test_same_address_recorded_once() {
        let registry = ConnectionRegistry::new(2);
        let first = registry.admit(ip("10.0.0.1")).unwrap();
        let second = registry.admit(ip("10.0.0.1")).unwrap();
        assert_eq!(registry.len(), 1);

        drop(first);
        assert!(registry.contains(&ip("10.0.0.1")));
        drop(second);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_full_registry_rejects_known_address_too() {
        let registry = ConnectionRegistry::new(1);
        let _lease = registry.admit(ip("10.0.0.1")).unwrap();
        assert!(registry.admit(ip("10.0.0.1")).is_none());
    }

    #[test]
    fn test_release_frees_slot() {
        let registry = ConnectionRegistry::new(1);
        let lease = registry.admit(ip("10.0.0.1")).unwrap();
        assert!(registry.admit(ip("10.0.0.2")).is_none());
        drop(lease);
        let lease = registry.admit(ip("10.0.0.2")).unwrap();
        assert_eq!(lease.ip(), ip("10.0.0.2"));
    }
}
