//! Session cost ledger with warning and hard limits.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::pricing::PricingTable;
use super::quote::CostQuote;
use crate::{Error, Result};

/// Action to take when the session cost limit is reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnExceed {
    /// Refuse further calls once the limit is reached.
    #[default]
    StopBeforeNext,
    /// Log a warning and keep recording.
    WarnAndContinue,
}

impl FromStr for OnExceed {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stop" | "stop_before_next" => Ok(Self::StopBeforeNext),
            "warn" | "warn_and_continue" => Ok(Self::WarnAndContinue),
            other => Err(format!(
                "expected 'stop' or 'warn', got '{}'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub quote: CostQuote,
    /// Caller-supplied tags such as lesson or request id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// File format for [`CostTracker::export`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    /// Full [`SessionReport`].
    #[default]
    Json,
    /// One row per call.
    Csv,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!("expected 'json' or 'csv', got '{}'", other)),
        }
    }
}

const CSV_HEADER: [&str; 6] = [
    "timestamp",
    "model",
    "prompt_tokens",
    "completion_tokens",
    "total_tokens",
    "cost",
];

#[derive(Serialize)]
struct CsvRow<'a> {
    timestamp: DateTime<Utc>,
    model: &'a str,
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
    cost: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: Decimal,
}

impl ModelUsage {
    fn add(&mut self, quote: &CostQuote) {
        self.calls += 1;
        self.input_tokens = self.input_tokens.saturating_add(quote.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(quote.output_tokens);
        self.cost += quote.total_cost;
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BudgetStatus {
    Unlimited {
        used: Decimal,
    },
    WithinBudget {
        used: Decimal,
        limit: Decimal,
        remaining: Decimal,
    },
    Warning {
        used: Decimal,
        limit: Option<Decimal>,
        threshold: Decimal,
    },
    Exceeded {
        used: Decimal,
        limit: Decimal,
        overage: Decimal,
    },
}

impl BudgetStatus {
    pub fn is_exceeded(&self) -> bool {
        matches!(self, Self::Exceeded { .. })
    }

    pub fn used(&self) -> Decimal {
        match self {
            Self::Unlimited { used }
            | Self::WithinBudget { used, .. }
            | Self::Warning { used, .. }
            | Self::Exceeded { used, .. } => *used,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_name: String,
    pub started_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub total_calls: u64,
    pub total_tokens: u64,
    pub total_cost: Decimal,
    pub by_model: BTreeMap<String, ModelUsage>,
    pub calls: Vec<CallRecord>,
}

#[derive(Debug, Default)]
struct Ledger {
    calls: Vec<CallRecord>,
    total_cost: Decimal,
    total_tokens: u64,
}

/// Records priced calls for one session.
///
/// Quotes come from the tracker's own price table, so totals are exact
/// decimal sums of the recorded quotes. The limit check and the append
/// happen under one lock, so concurrent callers never record past a
/// `StopBeforeNext` limit.
#[derive(Debug)]
pub struct CostTracker {
    session_name: String,
    started_at: DateTime<Utc>,
    pricing: Arc<PricingTable>,
    warning_threshold: Option<Decimal>,
    max_cost: Option<Decimal>,
    on_exceed: OnExceed,
    // written only while `ledger` is held
    by_model: DashMap<String, ModelUsage>,
    ledger: Mutex<Ledger>,
}

impl CostTracker {
    pub fn new(pricing: Arc<PricingTable>) -> Self {
        let started_at = Utc::now();
        Self {
            session_name: format!("session_{}", started_at.format("%Y%m%d_%H%M%S")),
            started_at,
            pricing,
            warning_threshold: None,
            max_cost: None,
            on_exceed: OnExceed::default(),
            by_model: DashMap::new(),
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn with_session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = name.into();
        self
    }

    pub fn with_warning_threshold(mut self, threshold: Option<Decimal>) -> Self {
        self.warning_threshold = threshold;
        self
    }

    pub fn with_max_cost(mut self, max_cost: Option<Decimal>) -> Self {
        self.max_cost = max_cost;
        self
    }

    pub fn with_on_exceed(mut self, on_exceed: OnExceed) -> Self {
        self.on_exceed = on_exceed;
        self
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn on_exceed(&self) -> OnExceed {
        self.on_exceed
    }

    /// Prices and records one call.
    ///
    /// Under [`OnExceed::StopBeforeNext`] a session already at or over its
    /// limit refuses the call without recording it.
    pub fn record(&self, model: &str, input_tokens: i64, output_tokens: i64) -> Result<CostQuote> {
        self.record_with(model, input_tokens, output_tokens, BTreeMap::new())
    }

    /// Like [`record`](Self::record), attaching metadata to the call record.
    pub fn record_with(
        &self,
        model: &str,
        input_tokens: i64,
        output_tokens: i64,
        metadata: BTreeMap<String, String>,
    ) -> Result<CostQuote> {
        let mut ledger = self.lock_ledger();
        if self.on_exceed == OnExceed::StopBeforeNext
            && let Some(limit) = self.max_cost
            && ledger.total_cost >= limit
        {
            return Err(Error::CostLimitExceeded {
                used: ledger.total_cost,
                limit,
            });
        }

        let quote = self
            .pricing
            .calculate_cost(model, input_tokens, output_tokens)?;
        self.append(&mut ledger, quote.clone(), metadata);
        Ok(quote)
    }

    /// Records an already priced quote without consulting the limit.
    pub fn record_quote(&self, quote: CostQuote) {
        let mut ledger = self.lock_ledger();
        self.append(&mut ledger, quote, BTreeMap::new());
    }

    fn append(&self, ledger: &mut Ledger, quote: CostQuote, metadata: BTreeMap<String, String>) {
        let before = ledger.total_cost;

        self.by_model
            .entry(quote.model_name.clone())
            .or_default()
            .add(&quote);
        ledger.total_cost += quote.total_cost;
        ledger.total_tokens = ledger.total_tokens.saturating_add(quote.total_tokens());
        ledger.calls.push(CallRecord {
            timestamp: Utc::now(),
            quote,
            metadata,
        });

        let after = ledger.total_cost;
        if let Some(threshold) = self.warning_threshold
            && before < threshold
            && after >= threshold
        {
            tracing::warn!(
                session = %self.session_name,
                used = %after,
                threshold = %threshold,
                "session cost crossed warning threshold"
            );
        }
        if let Some(max) = self.max_cost
            && before < max
            && after >= max
        {
            tracing::warn!(
                session = %self.session_name,
                used = %after,
                limit = %max,
                on_exceed = ?self.on_exceed,
                "session cost limit reached"
            );
        }
    }

    pub fn total_cost(&self) -> Decimal {
        self.lock_ledger().total_cost
    }

    pub fn total_tokens(&self) -> u64 {
        self.lock_ledger().total_tokens
    }

    pub fn total_calls(&self) -> u64 {
        self.lock_ledger().calls.len() as u64
    }

    pub fn usage(&self, model: &str) -> Option<ModelUsage> {
        self.by_model.get(model).map(|e| e.value().clone())
    }

    pub fn check(&self) -> BudgetStatus {
        self.status_for(self.total_cost())
    }

    fn status_for(&self, used: Decimal) -> BudgetStatus {
        match (self.max_cost, self.warning_threshold) {
            (Some(limit), _) if used >= limit => BudgetStatus::Exceeded {
                used,
                limit,
                overage: used - limit,
            },
            (limit, Some(threshold)) if used >= threshold => BudgetStatus::Warning {
                used,
                limit,
                threshold,
            },
            (Some(limit), _) => BudgetStatus::WithinBudget {
                used,
                limit,
                remaining: limit - used,
            },
            (None, _) => BudgetStatus::Unlimited { used },
        }
    }

    pub fn should_stop(&self) -> bool {
        self.on_exceed == OnExceed::StopBeforeNext && self.check().is_exceeded()
    }

    pub fn remaining(&self) -> Option<Decimal> {
        self.max_cost
            .map(|max| (max - self.total_cost()).max(Decimal::ZERO))
    }

    /// Consistent snapshot of the session.
    pub fn report(&self) -> SessionReport {
        let ledger = self.lock_ledger();
        let by_model = self
            .by_model
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        SessionReport {
            session_name: self.session_name.clone(),
            started_at: self.started_at,
            generated_at: Utc::now(),
            total_calls: ledger.calls.len() as u64,
            total_tokens: ledger.total_tokens,
            total_cost: ledger.total_cost,
            by_model,
            calls: ledger.calls.clone(),
        }
    }

    pub fn export(&self, path: impl AsRef<Path>, format: ExportFormat) -> Result<()> {
        match format {
            ExportFormat::Json => self.export_json(path),
            ExportFormat::Csv => self.export_csv(path),
        }
    }

    pub fn export_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(&self.report())?;
        std::fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "exported session report");
        Ok(())
    }

    /// Writes one row per recorded call. The header is written even for an
    /// empty session.
    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let report = self.report();

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;
        writer.write_record(CSV_HEADER)?;
        for call in &report.calls {
            writer.serialize(CsvRow {
                timestamp: call.timestamp,
                model: &call.quote.model_name,
                prompt_tokens: call.quote.input_tokens,
                completion_tokens: call.quote.output_tokens,
                total_tokens: call.quote.total_tokens(),
                cost: call.quote.total_cost,
            })?;
        }
        writer.flush()?;
        tracing::debug!(path = %path.display(), rows = report.calls.len(), "exported session csv");
        Ok(())
    }

    pub fn reset(&self) {
        let mut ledger = self.lock_ledger();
        self.by_model.clear();
        *ledger = Ledger::default();
    }

    fn lock_ledger(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tracker() -> CostTracker {
        CostTracker::new(Arc::new(PricingTable::builtin()))
    }

    #[test]
    fn test_cost_tracking() {
        let tracker = tracker().with_session_name("lesson-03");

        tracker.record("gpt-3.5-turbo", 100, 200).unwrap();
        tracker.record("gpt-3.5-turbo", 50, 100).unwrap();
        tracker.record("gpt-4", 1_000, 500).unwrap();

        // 0.00055 + 0.000275 + (0.03 + 0.03)
        assert_eq!(tracker.total_cost(), dec!(0.060825));
        assert_eq!(tracker.total_tokens(), 1_950);
        assert_eq!(tracker.total_calls(), 3);

        let turbo = tracker.usage("gpt-3.5-turbo").unwrap();
        assert_eq!(turbo.calls, 2);
        assert_eq!(turbo.cost, dec!(0.000825));
        assert!(tracker.usage("gpt-4-turbo").is_none());
    }

    #[test]
    fn test_unknown_model_not_recorded() {
        let tracker = tracker();
        assert!(tracker.record("mystery", 1, 1).is_err());
        assert_eq!(tracker.total_calls(), 0);
    }

    #[test]
    fn test_unlimited_budget() {
        let tracker = tracker();
        for _ in 0..100 {
            tracker.record("gpt-4", 1_000_000, 1_000_000).unwrap();
        }
        assert!(!tracker.should_stop());
        assert!(matches!(tracker.check(), BudgetStatus::Unlimited { .. }));
        assert_eq!(tracker.remaining(), None);
    }

    #[test]
    fn test_stop_before_next() {
        let tracker = tracker()
            .with_warning_threshold(Some(dec!(0.05)))
            .with_max_cost(Some(dec!(0.1)));

        // 0.03 + 0.03 per call
        tracker.record("gpt-4", 1_000, 500).unwrap();
        assert!(matches!(tracker.check(), BudgetStatus::Warning { .. }));

        tracker.record("gpt-4", 1_000, 500).unwrap();
        assert!(tracker.should_stop());
        assert_eq!(tracker.remaining(), Some(Decimal::ZERO));

        let err = tracker.record("gpt-4", 1, 1).unwrap_err();
        match err {
            Error::CostLimitExceeded { used, limit } => {
                assert_eq!(used, dec!(0.12));
                assert_eq!(limit, dec!(0.1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(tracker.total_calls(), 2);
    }

    #[test]
    fn test_warn_and_continue() {
        let tracker = tracker()
            .with_max_cost(Some(dec!(0.01)))
            .with_on_exceed(OnExceed::WarnAndContinue);

        tracker.record("gpt-4", 1_000, 1_000).unwrap();
        tracker.record("gpt-4", 1_000, 1_000).unwrap();

        assert!(tracker.check().is_exceeded());
        assert!(!tracker.should_stop());
        assert_eq!(tracker.total_calls(), 2);
    }

    #[test]
    fn test_within_budget() {
        let tracker = tracker().with_max_cost(Some(dec!(1)));
        tracker.record("gpt-3.5-turbo", 100, 200).unwrap();
        match tracker.check() {
            BudgetStatus::WithinBudget { remaining, .. } => assert_eq!(remaining, dec!(0.99945)),
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[test]
    fn test_report_and_reset() {
        let tracker = tracker().with_session_name("report");
        tracker.record("gpt-3.5-turbo", 100, 200).unwrap();
        tracker.record("gpt-4", 10, 10).unwrap();

        let report = tracker.report();
        assert_eq!(report.session_name, "report");
        assert_eq!(report.total_calls, 2);
        assert_eq!(report.calls.len(), 2);
        assert_eq!(report.by_model.len(), 2);
        assert_eq!(report.total_cost, tracker.total_cost());

        tracker.reset();
        assert_eq!(tracker.total_cost(), Decimal::ZERO);
        assert!(tracker.report().calls.is_empty());
    }

    #[test]
    fn test_on_exceed_from_str() {
        assert_eq!("stop".parse::<OnExceed>().unwrap(), OnExceed::StopBeforeNext);
        assert_eq!(" WARN ".parse::<OnExceed>().unwrap(), OnExceed::WarnAndContinue);
        assert!("ignore".parse::<OnExceed>().is_err());
    }

    #[test]
    fn test_concurrent_updates() {
        use std::thread;

        let tracker = Arc::new(tracker());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let t = Arc::clone(&tracker);
                thread::spawn(move || {
                    for _ in 0..100 {
                        t.record("gpt-3.5-turbo", 100, 200).unwrap();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        // 1000 calls * $0.00055
        assert_eq!(tracker.total_cost(), dec!(0.55));
        assert_eq!(tracker.total_calls(), 1_000);
        assert_eq!(tracker.report().calls.len(), 1_000);
    }

    #[test]
    fn test_limit_holds_under_contention() {
        use std::thread;

        // 0.09 per call against 0.1: the second call crosses the limit
        let tracker = Arc::new(tracker().with_max_cost(Some(dec!(0.1))));
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let t = Arc::clone(&tracker);
                thread::spawn(move || {
                    let mut refused = 0u64;
                    for _ in 0..50 {
                        if t.record("gpt-4", 1_000, 1_000).is_err() {
                            refused += 1;
                        }
                    }
                    refused
                })
            })
            .collect();

        let refused: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(tracker.total_calls(), 2);
        assert_eq!(refused, 32 * 50 - 2);
        assert_eq!(tracker.total_cost(), dec!(0.18));

        let report = tracker.report();
        assert_eq!(report.total_calls, report.calls.len() as u64);
        let summed: Decimal = report.calls.iter().map(|c| c.quote.total_cost).sum();
        assert_eq!(report.total_cost, summed);
    }

    #[test]
    fn test_record_with_metadata() {
        let tracker = tracker();
        let metadata = BTreeMap::from([("lesson".to_string(), "03".to_string())]);
        tracker
            .record_with("gpt-3.5-turbo", 100, 200, metadata)
            .unwrap();
        tracker.record("gpt-3.5-turbo", 100, 200).unwrap();

        let report = tracker.report();
        assert_eq!(report.calls[0].metadata["lesson"], "03");
        assert!(report.calls[1].metadata.is_empty());

        let json = serde_json::to_value(&report.calls[1]).unwrap();
        assert!(json.get("metadata").is_none());
        assert_eq!(json["model_name"], "gpt-3.5-turbo");
    }

    #[test]
    fn test_export_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.csv");

        let tracker = tracker();
        tracker.record("gpt-3.5-turbo", 100, 200).unwrap();
        tracker.record("gpt-4", 1_000, 500).unwrap();
        tracker.export(&path, ExportFormat::Csv).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), CSV_HEADER.to_vec());

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "gpt-3.5-turbo");
        assert_eq!(&rows[0][2], "100");
        assert_eq!(&rows[0][3], "200");
        assert_eq!(&rows[0][4], "300");
        assert_eq!(rows[0][5].parse::<Decimal>().unwrap(), dec!(0.00055));
        assert_eq!(rows[1][5].parse::<Decimal>().unwrap(), dec!(0.06));
    }

    #[test]
    fn test_export_csv_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");

        tracker().export_csv(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content.trim(),
            "timestamp,model,prompt_tokens,completion_tokens,total_tokens,cost"
        );
    }

    #[test]
    fn test_export_format_from_str() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
