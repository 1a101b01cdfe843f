//! API cost calculation and session cost tracking.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub mod pricing;
mod quote;
mod tracker;

pub use pricing::{PriceEntry, PricingTable, PricingTableBuilder};
pub use quote::CostQuote;
pub use tracker::{
    BudgetStatus, CallRecord, CostTracker, ExportFormat, ModelUsage, OnExceed, SessionReport,
};

/// Prices are quoted per this many tokens.
pub(crate) const TOKENS_PER_PRICE_UNIT: Decimal = dec!(1000);
