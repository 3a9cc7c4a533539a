//! Per-source circuit breaker.
//!
//! Consecutive failures past the threshold open a source's circuit; after
//! the cooldown the next `is_open` check quietly closes it again (implicit
//! half-open). Fallback kicks in only when every registered source is open.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Default, Clone)]
struct SourceState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceHealth {
    pub source: String,
    pub open: bool,
    pub consecutive_failures: u32,
    /// Seconds left until the circuit may close again; 0 when closed.
    pub cooldown_remaining_secs: u64,
}

pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    states: Mutex<HashMap<String, SourceState>>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            threshold,
            cooldown: Duration::from_secs(cooldown_secs),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// A success closes the circuit and clears the failure streak.
    pub fn record_success(&self, source: &str) {
        let mut states = self.states.lock().expect("breaker lock");
        let state = states.entry(source.to_string()).or_default();
        if state.opened_at.is_some() {
            info!(source, "circuit closed after successful call");
        }
        *state = SourceState::default();
    }

    /// Record a failure; returns true when this failure opened the circuit.
    pub fn record_failure(&self, source: &str) -> bool {
        let mut states = self.states.lock().expect("breaker lock");
        let state = states.entry(source.to_string()).or_default();
        state.consecutive_failures += 1;
        if state.opened_at.is_none() && state.consecutive_failures >= self.threshold {
            state.opened_at = Some(Instant::now());
            warn!(
                source,
                failures = state.consecutive_failures,
                "circuit opened"
            );
            return true;
        }
        false
    }

    /// Open circuits close themselves once the cooldown has elapsed; the
    /// failure streak survives so one more failure re-opens immediately.
    pub fn is_open(&self, source: &str) -> bool {
        let mut states = self.states.lock().expect("breaker lock");
        let Some(state) = states.get_mut(source) else {
            return false;
        };
        match state.opened_at {
            Some(opened) if opened.elapsed() >= self.cooldown => {
                info!(source, "circuit cooldown elapsed, allowing a retry");
                state.opened_at = None;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// True when every listed source is open, i.e. no real data can be had.
    pub fn should_use_fallback(&self, sources: &[&str]) -> bool {
        !sources.is_empty() && sources.iter().all(|s| self.is_open(s))
    }

    pub fn health_status(&self) -> Vec<SourceHealth> {
        let states = self.states.lock().expect("breaker lock");
        let mut out: Vec<SourceHealth> = states
            .iter()
            .map(|(source, state)| {
                let remaining = state
                    .opened_at
                    .map(|opened| self.cooldown.saturating_sub(opened.elapsed()).as_secs())
                    .unwrap_or(0);
                SourceHealth {
                    source: source.clone(),
                    open: state.opened_at.is_some() && remaining > 0,
                    consecutive_failures: state.consecutive_failures,
                    cooldown_remaining_secs: remaining,
                }
            })
            .collect();
        out.sort_by(|a, b| a.source.cmp(&b.source));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_at_threshold_not_before() {
        let b = CircuitBreaker::new(3, 300);
        assert!(!b.record_failure("sina"));
        assert!(!b.record_failure("sina"));
        assert!(!b.is_open("sina"));
        assert!(b.record_failure("sina"));
        assert!(b.is_open("sina"));
    }

    #[test]
    fn success_resets_streak() {
        let b = CircuitBreaker::new(3, 300);
        b.record_failure("sina");
        b.record_failure("sina");
        b.record_success("sina");
        assert!(!b.record_failure("sina"));
        assert!(!b.is_open("sina"));
    }

    #[test]
    fn cooldown_closes_the_circuit() {
        let b = CircuitBreaker::new(1, 0);
        assert!(b.record_failure("sina"));
        // Zero cooldown: the next check already allows a retry.
        assert!(!b.is_open("sina"));
    }

    #[test]
    fn unknown_source_is_closed() {
        let b = CircuitBreaker::new(5, 300);
        assert!(!b.is_open("nobody"));
    }

    #[test]
    fn fallback_requires_every_source_open() {
        let b = CircuitBreaker::new(1, 300);
        b.record_failure("sina");
        assert!(!b.should_use_fallback(&["sina", "eastmoney"]));
        b.record_failure("eastmoney");
        assert!(b.should_use_fallback(&["sina", "eastmoney"]));
    }

    #[test]
    fn health_reports_open_state() {
        let b = CircuitBreaker::new(1, 300);
        b.record_failure("eastmoney");
        b.record_success("sina");
        let health = b.health_status();
        assert_eq!(health.len(), 2);
        let em = health.iter().find(|h| h.source == "eastmoney").unwrap();
        assert!(em.open);
        assert!(em.cooldown_remaining_secs > 0);
        let sina = health.iter().find(|h| h.source == "sina").unwrap();
        assert!(!sina.open);
    }
}
