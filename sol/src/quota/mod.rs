//! Daily usage quota

mod limiter;

pub use limiter::{QuotaStatus, RateLimiter, SubscriptionTier};
