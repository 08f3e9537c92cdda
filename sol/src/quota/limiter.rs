//! RateLimiter - daily completion quota with date-based reset
//!
//! The counter lives in the store; the limiter itself is stateless. Every
//! read and write first reconciles the stored date key against today, so a
//! stale record can never leak yesterday's count into a new day. The quota
//! is supplied per call because entitlements can change mid-day.

use chrono::NaiveDate;
use eyre::Result;
use std::sync::Arc;
use tracing::debug;

use mindstore::RateLimitRecord;

use crate::config::QuotaConfig;
use crate::session::SessionStore;

/// Subscription tier, the source of the daily quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionTier {
    Free,
    Premium,
}

impl SubscriptionTier {
    /// Parse a tier string; anything unrecognized is treated as free
    pub fn parse(tier: &str) -> Self {
        debug!(%tier, "SubscriptionTier::parse: called");
        match tier.trim().to_lowercase().as_str() {
            "premium" => Self::Premium,
            _ => Self::Free,
        }
    }

    /// Daily completion quota for this tier
    pub fn daily_limit(&self, config: &QuotaConfig) -> u32 {
        match self {
            Self::Free => config.free_daily_limit,
            Self::Premium => config.premium_daily_limit,
        }
    }
}

/// Snapshot of today's usage against the quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    /// Requests recorded today
    pub count: u32,

    /// Quota in effect
    pub limit: u32,

    /// Requests left today
    pub remaining: u32,

    /// Whether the quota is exhausted
    pub limit_reached: bool,
}

impl QuotaStatus {
    /// User-facing phrasing for the current usage level, if any applies
    ///
    /// Limit reached gets the fixed reset-tomorrow phrasing; a low count
    /// (≤ 5 remaining) gets the low-count phrasing; otherwise a warning
    /// appears from 80% usage upward.
    pub fn notice(&self) -> Option<String> {
        debug!(count = self.count, limit = self.limit, "QuotaStatus::notice: called");
        if self.limit_reached {
            return Some(
                "You've used all of today's messages. Your quota resets tomorrow - I'll be here then.".to_string(),
            );
        }
        if self.remaining <= 5 {
            return Some(format!(
                "Just {} {} left today.",
                self.remaining,
                if self.remaining == 1 { "message" } else { "messages" }
            ));
        }
        if u64::from(self.count) * 100 >= u64::from(self.limit) * 80 {
            return Some("Heads up: you're at 80% of today's messages.".to_string());
        }
        None
    }
}

/// Daily quota tracking backed by the session store
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn SessionStore>,
}

impl RateLimiter {
    /// Create a limiter over the given store
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Check today's usage against the quota
    ///
    /// Resets the count on date rollover and re-stamps the record with the
    /// current quota even when no rollover happened.
    pub fn can_proceed(&self, limit: u32) -> Result<QuotaStatus> {
        self.can_proceed_on(today(), limit)
    }

    fn can_proceed_on(&self, today: NaiveDate, limit: u32) -> Result<QuotaStatus> {
        let date_key = format_date(today);
        debug!(%date_key, %limit, "can_proceed_on: called");

        let record = self.reconciled_record(&date_key, limit)?;
        self.store.save_rate_limit_record(&record)?;

        Ok(status_of(&record))
    }

    /// Count one confirmed successful completion
    ///
    /// Must be called only after a successful round-trip - never after a
    /// fallback or failure.
    pub fn record_success(&self, limit: u32) -> Result<()> {
        self.record_success_on(today(), limit)
    }

    fn record_success_on(&self, today: NaiveDate, limit: u32) -> Result<()> {
        let date_key = format_date(today);
        debug!(%date_key, "record_success_on: called");

        let mut record = self.reconciled_record(&date_key, limit)?;
        record.count += 1;
        record.date_key = date_key;
        self.store.save_rate_limit_record(&record)
    }

    /// Load the stored record, resetting the count when the stored date
    /// key is not today and applying the current quota
    fn reconciled_record(&self, date_key: &str, limit: u32) -> Result<RateLimitRecord> {
        let record = match self.store.rate_limit_record()? {
            Some(mut record) if record.date_key == date_key => {
                record.limit = limit;
                record
            }
            _ => RateLimitRecord::fresh(date_key, limit),
        };
        Ok(record)
    }
}

fn status_of(record: &RateLimitRecord) -> QuotaStatus {
    QuotaStatus {
        count: record.count,
        limit: record.limit,
        remaining: record.limit.saturating_sub(record.count),
        limit_reached: record.count >= record.limit,
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
