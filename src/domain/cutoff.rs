use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use std::fmt::{self, Display, Formatter};

/// The instant below which records become deletion candidates.
///
/// Computed once per run and shared read-only by every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cutoff(DateTime<Utc>);

impl Cutoff {
    /// UTC midnight of `now`, minus `retention_days` whole days.
    pub fn from_retention_days(now: DateTime<Utc>, retention_days: u32) -> Self {
        let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let instant = midnight
            .checked_sub_signed(TimeDelta::days(i64::from(retention_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self(instant)
    }

    pub fn today(retention_days: u32) -> Self {
        Self::from_retention_days(Utc::now(), retention_days)
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Display for Cutoff {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
