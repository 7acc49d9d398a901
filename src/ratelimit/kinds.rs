//! Named limiter instances for the dashboard's request classes.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::limiter::RateLimiter;
use super::policy::RateLimitPolicy;
use crate::config::PoliciesConfig;
use crate::error::LimiterError;

/// Which limiter a request goes through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LimiterKind {
    /// General inventory list calls
    #[default]
    Api,
    /// IP search calls
    Search,
    /// Heavy bulk operations
    Bulk,
}

impl LimiterKind {
    pub const ALL: [LimiterKind; 3] = [LimiterKind::Api, LimiterKind::Search, LimiterKind::Bulk];

    pub fn as_str(&self) -> &'static str {
        match self {
            LimiterKind::Api => "api",
            LimiterKind::Search => "search",
            LimiterKind::Bulk => "bulk",
        }
    }
}

impl fmt::Display for LimiterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimiterKind {
    type Err = LimiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "api" => Ok(LimiterKind::Api),
            "search" => Ok(LimiterKind::Search),
            "bulk" => Ok(LimiterKind::Bulk),
            _ => Err(LimiterError::Config(format!(
                "Invalid limiter kind: {}. Valid options are: api, search, bulk",
                s
            ))),
        }
    }
}

/// The three limiter instances, built once and shared by reference.
///
/// Each instance owns its own registry; exhausting one never affects the
/// others.
#[derive(Debug, Clone)]
pub struct RateLimiters {
    api: Arc<RateLimiter>,
    search: Arc<RateLimiter>,
    bulk: Arc<RateLimiter>,
}

impl RateLimiters {
    /// Build all three limiters from their policies.
    pub fn new(policies: &PoliciesConfig) -> Self {
        Self {
            api: Arc::new(RateLimiter::new(RateLimitPolicy::from(&policies.api))),
            search: Arc::new(RateLimiter::new(RateLimitPolicy::from(&policies.search))),
            bulk: Arc::new(RateLimiter::new(RateLimitPolicy::from(&policies.bulk))),
        }
    }

    /// The limiter for `kind`.
    pub fn get(&self, kind: LimiterKind) -> &Arc<RateLimiter> {
        match kind {
            LimiterKind::Api => &self.api,
            LimiterKind::Search => &self.search,
            LimiterKind::Bulk => &self.bulk,
        }
    }

    /// Reset every key in every limiter.
    pub fn reset_all(&self) {
        for kind in LimiterKind::ALL {
            self.get(kind).reset(None);
        }
    }
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new(&PoliciesConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::PolicyConfig;
    use std::time::Duration;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("api".parse::<LimiterKind>().unwrap(), LimiterKind::Api);
        assert_eq!("Search".parse::<LimiterKind>().unwrap(), LimiterKind::Search);
        assert_eq!("BULK".parse::<LimiterKind>().unwrap(), LimiterKind::Bulk);
        assert!("other".parse::<LimiterKind>().is_err());
    }

    #[test]
    fn test_kind_display_round_trips() {
        for kind in LimiterKind::ALL {
            assert_eq!(kind.to_string().parse::<LimiterKind>().unwrap(), kind);
        }
        assert_eq!(LimiterKind::default(), LimiterKind::Api);
    }

    #[test]
    fn test_limiters_use_configured_policies() {
        let limiters = RateLimiters::default();

        let search = limiters.get(LimiterKind::Search).policy();
        assert_eq!(search.max_requests, 900);
        assert_eq!(search.window, Duration::from_secs(60));
        assert_eq!(search.retry_after, Duration::from_millis(150));

        assert_eq!(limiters.get(LimiterKind::Api).policy().max_requests, 1800);
        assert_eq!(limiters.get(LimiterKind::Bulk).policy().retry_after, Duration::from_millis(500));
    }

    #[test]
    fn test_limiters_are_independent() {
        let policies = PoliciesConfig {
            api: PolicyConfig::new(1, 60_000, 100),
            search: PolicyConfig::new(1, 60_000, 100),
            bulk: PolicyConfig::new(1, 60_000, 100),
        };
        let limiters = RateLimiters::new(&policies);

        assert!(limiters.get(LimiterKind::Api).check_limit("/firewalls/"));
        assert!(!limiters.get(LimiterKind::Api).check_limit("/firewalls/"));

        assert!(limiters.get(LimiterKind::Search).check_limit("/firewalls/"));
        assert!(limiters.get(LimiterKind::Bulk).check_limit("/firewalls/"));

        limiters.reset_all();
        for kind in LimiterKind::ALL {
            assert_eq!(limiters.get(kind).key_count(), 0);
        }
    }

    #[test]
    fn test_clones_share_instances() {
        let limiters = RateLimiters::default();
        let clone = limiters.clone();

        assert!(limiters.get(LimiterKind::Bulk).check_limit("k"));
        assert_eq!(clone.get(LimiterKind::Bulk).current_count("k"), Some(1));
    }
}
