//! Freshness classification of location reports.
//!
//! A report is `Active` until it is older than the stale horizon, `Stale`
//! until it is older than the history horizon, and `Expired` afterwards.

use std::time::Duration;

use crate::{errors::Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Freshness {
    Active,
    Stale,
    Expired,
}

impl Freshness {
    pub fn as_str(self) -> &'static str {
        match self {
            Freshness::Active => "active",
            Freshness::Stale => "stale",
            Freshness::Expired => "expired",
        }
    }
}

/// Validated pair of thresholds, in whole seconds.
///
/// `stale < history` always holds, so every class is reachable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Horizons {
    history_secs: u64,
    stale_secs: u64,
}

impl Horizons {
    pub fn new(history_secs: u64, stale_secs: u64) -> Result<Self> {
        if history_secs == 0 {
            return Err(Error::Config(
                "history horizon must be greater than zero".to_string(),
            ));
        }
        if stale_secs >= history_secs {
            return Err(Error::Config(format!(
                "stale horizon ({stale_secs}s) must be less than history horizon ({history_secs}s)"
            )));
        }
        Ok(Self {
            history_secs,
            stale_secs,
        })
    }

    pub fn from_durations(history: Duration, stale: Duration) -> Result<Self> {
        Self::new(history.as_secs(), stale.as_secs())
    }

    pub fn history(&self) -> Duration {
        Duration::from_secs(self.history_secs)
    }

    pub fn stale(&self) -> Duration {
        Duration::from_secs(self.stale_secs)
    }

    pub fn classify(&self, now: i64, last_update: i64) -> Freshness {
        let age = report_age(now, last_update);
        if age > self.history_secs {
            Freshness::Expired
        } else if age > self.stale_secs {
            Freshness::Stale
        } else {
            Freshness::Active
        }
    }
}

/// Classify with raw thresholds, rejecting a misconfigured pair.
pub fn classify(
    now: i64,
    last_update: i64,
    history_secs: u64,
    stale_secs: u64,
) -> Result<Freshness> {
    Ok(Horizons::new(history_secs, stale_secs)?.classify(now, last_update))
}

/// Seconds since `last_update`; timestamps from the future count as age zero.
pub fn report_age(now: i64, last_update: i64) -> u64 {
    let age = i128::from(now) - i128::from(last_update);
    u64::try_from(age.max(0)).unwrap_or(u64::MAX)
}
