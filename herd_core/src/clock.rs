//! Reference-date providers for "what is due" queries.

use crate::calendar::JalaliDate;
use crate::Result;

/// Source of the current Jalali date
pub trait Clock {
    fn today(&self) -> Result<JalaliDate>;
}

/// Local wall-clock date
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> Result<JalaliDate> {
        JalaliDate::from_naive_date(chrono::Local::now().date_naive())
    }
}

/// Always reports the same date
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub JalaliDate);

impl Clock for FixedClock {
    fn today(&self) -> Result<JalaliDate> {
        Ok(self.0)
    }
}
