use crate::SystemTimeExt;
use chrono::NaiveDate;
use web_time::SystemTime;

/// Source of "now" for everything that stamps or expires entries
pub trait Clock: 'static + waaa::Send + waaa::Sync {
    fn now(&self) -> SystemTime;

    fn today(&self) -> crate::Result<NaiveDate> {
        self.now().utc_date()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
