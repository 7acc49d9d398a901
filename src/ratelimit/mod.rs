//! Fixed-window rate limiting and per-key request records.

mod kinds;
mod limiter;
mod policy;
mod record;

pub use kinds::{LimiterKind, RateLimiters};
pub use limiter::{RateLimiter, DEFAULT_KEY};
pub use policy::{PolicyConfig, RateLimitPolicy, DEFAULT_RETRY_AFTER};
pub use record::RequestRecord;
