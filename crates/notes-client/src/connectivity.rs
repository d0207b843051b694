//! Connectivity monitor.
//!
//! Periodically probes the server and feeds the result to the
//! `ModeController`:
//! - Reachable: report connectivity, probe again after `interval`
//! - Unreachable: report loss, retry with exponential backoff

use async_trait::async_trait;
use notes_sync::{KeyValueStore, Mode, ModeController};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::http_remote::HttpRemote;

/// Configuration for probing behavior.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Delay after the first failed probe
    pub initial_delay: Duration,
    /// Maximum delay between failed probes
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Delay between probes while the server is reachable
    pub interval: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            interval: Duration::from_secs(30),
        }
    }
}

/// Calculates the delay after `attempt` consecutive failures.
pub fn calculate_backoff(attempt: u32, config: &ProbeConfig) -> Duration {
    let delay_secs = config.initial_delay.as_secs_f64() * config.backoff_factor.powi(attempt.saturating_sub(1) as i32);

    Duration::from_secs_f64(delay_secs.min(config.max_delay.as_secs_f64()))
}

/// Failure streak of the probe.
#[derive(Debug, Clone, Default)]
pub struct ProbeState {
    /// Consecutive failed probes
    pub failures: u32,
}

impl ProbeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful probe. Returns the delay until the next one.
    pub fn record_success(&mut self, config: &ProbeConfig) -> Duration {
        self.failures = 0;
        config.interval
    }

    /// Record a failed probe. Returns the delay until the next one.
    pub fn record_failure(&mut self, config: &ProbeConfig) -> Duration {
        self.failures += 1;
        calculate_backoff(self.failures, config)
    }
}

/// Something that can tell whether the server is reachable.
#[async_trait]
pub trait Reachability: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

#[async_trait]
impl Reachability for HttpRemote {
    async fn is_reachable(&self) -> bool {
        self.probe().await
    }
}

pub struct ConnectivityMonitor<P: Reachability, K: KeyValueStore> {
    probe: P,
    mode: Arc<ModeController<K>>,
    config: ProbeConfig,
    state: ProbeState,
}

impl<P: Reachability, K: KeyValueStore> ConnectivityMonitor<P, K> {
    pub fn new(probe: P, mode: Arc<ModeController<K>>, config: ProbeConfig) -> Self {
        Self {
            probe,
            mode,
            config,
            state: ProbeState::new(),
        }
    }

    /// Probe once and report the result. Returns the delay until the next probe.
    pub async fn check(&mut self) -> Duration {
        let reachable = self.probe.is_reachable().await;
        let delay = if reachable {
            self.state.record_success(&self.config)
        } else {
            self.state.record_failure(&self.config)
        };

        match self.mode.set_connectivity(reachable) {
            Ok(Mode::Online) => debug!("Server reachable, next probe in {:?}", delay),
            Ok(Mode::Offline) if reachable => debug!("Server reachable but offline mode is pinned"),
            Ok(Mode::Offline) => info!(
                "Server unreachable ({} attempt(s)), retrying in {:?}",
                self.state.failures, delay
            ),
            Err(e) => error!("Failed to record connectivity: {}", e),
        }
        delay
    }

    /// Probe forever.
    pub async fn run(mut self) {
        loop {
            let delay = self.check().await;
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notes_sync::{InMemoryKv, Namespace};
    use std::sync::atomic::{AtomicBool, Ordering};

    // ==================== Backoff calculation ====================

    #[test]
    fn test_calculate_backoff_exponential() {
        let config = ProbeConfig::default();

        // 5s, 10s, 20s, 40s, 60s (capped)
        assert_eq!(calculate_backoff(1, &config), Duration::from_secs(5));
        assert_eq!(calculate_backoff(2, &config), Duration::from_secs(10));
        assert_eq!(calculate_backoff(3, &config), Duration::from_secs(20));
        assert_eq!(calculate_backoff(4, &config), Duration::from_secs(40));
        assert_eq!(calculate_backoff(5, &config), Duration::from_secs(60));
        assert_eq!(calculate_backoff(10, &config), Duration::from_secs(60));
    }

    #[test]
    fn test_calculate_backoff_custom_config() {
        let config = ProbeConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_factor: 3.0,
            interval: Duration::from_secs(1),
        };

        // 1s, 3s, 9s, 10s (capped)
        assert_eq!(calculate_backoff(1, &config), Duration::from_secs(1));
        assert_eq!(calculate_backoff(2, &config), Duration::from_secs(3));
        assert_eq!(calculate_backoff(3, &config), Duration::from_secs(9));
        assert_eq!(calculate_backoff(4, &config), Duration::from_secs(10));
    }

    // ==================== ProbeState ====================

    #[test]
    fn test_probe_state_backs_off_then_resets() {
        let config = ProbeConfig::default();
        let mut state = ProbeState::new();

        assert_eq!(state.record_failure(&config), Duration::from_secs(5));
        assert_eq!(state.record_failure(&config), Duration::from_secs(10));
        assert_eq!(state.failures, 2);

        assert_eq!(state.record_success(&config), Duration::from_secs(30));
        assert_eq!(state.failures, 0);
        assert_eq!(state.record_failure(&config), Duration::from_secs(5));
    }

    // ==================== Monitor ====================

    struct Toggle(AtomicBool);

    #[async_trait]
    impl Reachability for Arc<Toggle> {
        async fn is_reachable(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_monitor_drives_mode() {
        let kv = Arc::new(InMemoryKv::new());
        let mode = Arc::new(ModeController::load(kv, &Namespace::default()).unwrap());
        let toggle = Arc::new(Toggle(AtomicBool::new(false)));
        let mut monitor = ConnectivityMonitor::new(Arc::clone(&toggle), Arc::clone(&mode), ProbeConfig::default());

        assert_eq!(monitor.check().await, Duration::from_secs(5));
        assert_eq!(mode.mode(), Mode::Offline);

        toggle.0.store(true, Ordering::SeqCst);
        assert_eq!(monitor.check().await, Duration::from_secs(30));
        assert_eq!(mode.mode(), Mode::Online);
    }

    #[tokio::test]
    async fn test_monitor_respects_pinned_offline() {
        let kv = Arc::new(InMemoryKv::new());
        let mode = Arc::new(ModeController::load(kv, &Namespace::default()).unwrap());
        mode.request_mode(Mode::Offline).unwrap();

        let toggle = Arc::new(Toggle(AtomicBool::new(true)));
        let mut monitor = ConnectivityMonitor::new(toggle, Arc::clone(&mode), ProbeConfig::default());
        monitor.check().await;

        assert_eq!(mode.mode(), Mode::Offline);
    }
}
