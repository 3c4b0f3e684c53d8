//! Admission control: per-remote connection caps and request rate limiting.
//!
//! Two independent checks keyed by remote address:
//! - a live-connection count, enforced at accept time; over-limit
//!   connections are closed with no response
//! - a sliding 60-second request window, enforced per command; over-limit
//!   commands get `RateLimited` and are not dispatched

use crate::config::AdmissionConfig;
use dashmap::DashMap;
use std::net::IpAddr;
use std::time::Instant;

struct RateWindow {
    start: Instant,
    count: u32,
}

/// Shared admission state
pub struct AdmissionControl {
    config: AdmissionConfig,
    connections: DashMap<IpAddr, usize>,
    windows: DashMap<IpAddr, RateWindow>,
}

impl AdmissionControl {
    /// Create with the given limits
    #[must_use]
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            connections: DashMap::new(),
            windows: DashMap::new(),
        }
    }

    /// Count a new connection from `ip`. Returns `false`, leaving the count
    /// untouched, when the remote is at its cap.
    pub fn try_admit(&self, ip: IpAddr) -> bool {
        let mut entry = self.connections.entry(ip).or_insert(0);
        if *entry >= self.config.max_connections_per_ip {
            return false;
        }
        *entry += 1;
        true
    }

    /// Release a connection slot for `ip`
    pub fn release(&self, ip: IpAddr) {
        if let Some(mut entry) = self.connections.get_mut(&ip) {
            *entry = entry.saturating_sub(1);
        }
        self.connections.remove_if(&ip, |_, count| *count == 0);
    }

    /// Live connections currently counted for `ip`
    #[must_use]
    pub fn live_connections(&self, ip: IpAddr) -> usize {
        self.connections.get(&ip).map(|c| *c).unwrap_or(0)
    }

    /// Count one command against the window. Returns `false` when the
    /// command must be refused with `RateLimited`.
    pub fn check_rate(&self, ip: IpAddr) -> bool {
        self.check_rate_at(ip, Instant::now())
    }

    fn check_rate_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut window = self.windows.entry(ip).or_insert_with(|| RateWindow {
            start: now,
            count: 0,
        });

        if now.duration_since(window.start) >= self.config.rate_window {
            window.start = now;
            window.count = 0;
        }

        if window.count >= self.config.max_requests_per_window {
            return false;
        }

        window.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn control(max_conns: usize, max_requests: u32) -> AdmissionControl {
        AdmissionControl::new(AdmissionConfig {
            max_connections_per_ip: max_conns,
            rate_window: Duration::from_secs(60),
            max_requests_per_window: max_requests,
        })
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_connection_cap() {
        let control = control(10, 100);
        let addr = ip("192.0.2.1");

        for _ in 0..10 {
            assert!(control.try_admit(addr));
        }
        assert_eq!(control.live_connections(addr), 10);
        assert!(!control.try_admit(addr));

        control.release(addr);
        assert!(control.try_admit(addr));
    }

    #[test]
    fn test_connection_cap_is_per_remote() {
        let control = control(1, 100);
        assert!(control.try_admit(ip("192.0.2.1")));
        assert!(control.try_admit(ip("192.0.2.2")));
        assert!(!control.try_admit(ip("192.0.2.1")));
    }

    #[test]
    fn test_release_below_zero_is_harmless() {
        let control = control(2, 100);
        let addr = ip("192.0.2.9");
        control.release(addr);
        assert_eq!(control.live_connections(addr), 0);
        assert!(control.try_admit(addr));
    }

    #[test]
    fn test_rate_limit_within_window() {
        let control = control(10, 100);
        let addr = ip("198.51.100.7");
        let start = Instant::now();

        for _ in 0..100 {
            assert!(control.check_rate_at(addr, start));
        }
        // 101st command within the window is refused and not counted.
        assert!(!control.check_rate_at(addr, start + Duration::from_secs(30)));
    }

    #[test]
    fn test_rate_window_resets() {
        let control = control(10, 100);
        let addr = ip("198.51.100.8");
        let start = Instant::now();

        for _ in 0..100 {
            assert!(control.check_rate_at(addr, start));
        }
        assert!(!control.check_rate_at(addr, start + Duration::from_secs(59)));
        assert!(control.check_rate_at(addr, start + Duration::from_secs(60)));
    }

    #[test]
    fn test_rate_limit_is_per_remote() {
        let control = control(10, 1);
        let start = Instant::now();
        assert!(control.check_rate_at(ip("203.0.113.1"), start));
        assert!(control.check_rate_at(ip("203.0.113.2"), start));
        assert!(!control.check_rate_at(ip("203.0.113.1"), start));
    }
}
