use serde::{Deserialize, Serialize};

use crate::models::ModelSpec;

/// Default warning threshold for context window utilization (80%)
pub const DEFAULT_WARNING_THRESHOLD: f64 = 0.80;

/// Default critical threshold for context window utilization (95%)
pub const DEFAULT_CRITICAL_THRESHOLD: f64 = 0.95;

/// Messages always kept when trimming: system prompt and latest message.
pub const DEFAULT_KEEP_MESSAGES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WindowStatus {
    Ok { utilization: f64, remaining: u64 },
    Warning { utilization: f64, remaining: u64 },
    Critical { utilization: f64, remaining: u64 },
    Exceeded { overage: u64 },
}

impl WindowStatus {
    pub fn should_proceed(&self) -> bool {
        !matches!(self, Self::Exceeded { .. })
    }

    pub fn utilization(&self) -> Option<f64> {
        match self {
            Self::Ok { utilization, .. }
            | Self::Warning { utilization, .. }
            | Self::Critical { utilization, .. } => Some(*utilization),
            Self::Exceeded { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextWindow {
    limit: u64,
    current_usage: u64,
    peak_usage: u64,
    warning_threshold: f64,
    critical_threshold: f64,
}

impl ContextWindow {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            current_usage: 0,
            peak_usage: 0,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            critical_threshold: DEFAULT_CRITICAL_THRESHOLD,
        }
    }

    pub fn for_model(spec: &ModelSpec) -> Self {
        Self::new(spec.context_window)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn usage(&self) -> u64 {
        self.current_usage
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.current_usage)
    }

    pub fn utilization(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        self.current_usage as f64 / self.limit as f64
    }

    pub fn status(&self) -> WindowStatus {
        let utilization = self.utilization();

        if self.current_usage > self.limit {
            WindowStatus::Exceeded {
                overage: self.current_usage - self.limit,
            }
        } else if utilization >= self.critical_threshold {
            WindowStatus::Critical {
                utilization,
                remaining: self.remaining(),
            }
        } else if utilization >= self.warning_threshold {
            WindowStatus::Warning {
                utilization,
                remaining: self.remaining(),
            }
        } else {
            WindowStatus::Ok {
                utilization,
                remaining: self.remaining(),
            }
        }
    }

    pub fn can_fit(&self, additional: u64) -> bool {
        self.current_usage.saturating_add(additional) <= self.limit
    }

    pub fn update(&mut self, new_usage: u64) {
        self.current_usage = new_usage;
        if new_usage > self.peak_usage {
            self.peak_usage = new_usage;
        }
    }

    pub fn add(&mut self, tokens: u64) {
        self.update(self.current_usage.saturating_add(tokens));
    }

    pub fn reset(&mut self, new_usage: u64) {
        self.current_usage = new_usage;
    }

    pub fn peak(&self) -> u64 {
        self.peak_usage
    }
}

/// Number of oldest messages to drop so the history fits `limit`.
///
/// `message_tokens` is ordered oldest first. The first message (system
/// prompt) is never dropped, and trimming stops once only `keep` messages
/// remain, so the result may still exceed the limit.
pub fn trim_count(message_tokens: &[u64], limit: u64, keep: usize) -> usize {
    let mut total: u64 = message_tokens.iter().sum();
    let mut dropped = 0;
    let removable = message_tokens.len().saturating_sub(keep.max(1));

    // index 0 is the system prompt
    for tokens in message_tokens.iter().skip(1).take(removable) {
        if total <= limit {
            break;
        }
        total -= tokens;
        dropped += 1;
    }

    if dropped > 0 {
        tracing::debug!(dropped, remaining_tokens = total, limit, "trimmed history");
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_window_status() {
        let mut window = ContextWindow::new(200_000);

        window.update(100_000);
        assert!(matches!(window.status(), WindowStatus::Ok { .. }));

        window.update(180_000);
        assert!(matches!(window.status(), WindowStatus::Warning { .. }));

        window.update(195_000);
        assert!(matches!(window.status(), WindowStatus::Critical { .. }));

        window.update(250_000);
        assert!(matches!(
            window.status(),
            WindowStatus::Exceeded { overage: 50_000 }
        ));
        assert!(!window.status().should_proceed());
    }

    #[test]
    fn test_peak_and_fit() {
        let mut window = ContextWindow::new(4_096);
        window.add(3_000);
        window.reset(1_000);
        assert_eq!(window.peak(), 3_000);
        assert_eq!(window.remaining(), 3_096);
        assert!(window.can_fit(3_096));
        assert!(!window.can_fit(3_097));
    }

    #[test]
    fn test_status_utilization() {
        let mut window = ContextWindow::new(1_000);
        window.update(250);
        assert_eq!(window.status().utilization(), Some(0.25));
        window.update(1_001);
        assert_eq!(window.status().utilization(), None);
    }

    #[test]
    fn test_zero_limit() {
        let window = ContextWindow::new(0);
        assert_eq!(window.utilization(), 0.0);
        assert!(window.can_fit(0));
    }

    #[test]
    fn test_trim_count() {
        // system, then alternating user/assistant
        let messages = [50, 100, 100, 100, 100];
        assert_eq!(trim_count(&messages, 1_000, DEFAULT_KEEP_MESSAGES), 0);
        assert_eq!(trim_count(&messages, 300, DEFAULT_KEEP_MESSAGES), 2);
        assert_eq!(trim_count(&messages, 250, DEFAULT_KEEP_MESSAGES), 2);
        // never drops below two messages
        assert_eq!(trim_count(&messages, 10, DEFAULT_KEEP_MESSAGES), 3);
    }

    #[test]
    fn test_trim_count_short_history() {
        assert_eq!(trim_count(&[], 10, DEFAULT_KEEP_MESSAGES), 0);
        assert_eq!(trim_count(&[500, 500], 10, DEFAULT_KEEP_MESSAGES), 0);
    }
}
