use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Seconds in one service day.
pub const DAY: i64 = 24 * 60 * 60;

/// Seconds since the start of a service day. GTFS allows values past
/// 24:00:00 for trips that run after midnight.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Time(u32);

impl From<u32> for Time {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Time {
    pub const fn from_seconds(secs: u32) -> Self {
        Self(secs)
    }

    pub const fn as_seconds(&self) -> u32 {
        self.0
    }

    /// Seconds with a service-day offset removed, the unit every track works in.
    pub fn shifted(&self, offset: i64) -> f64 {
        (self.0 as i64 - offset) as f64
    }

    pub fn to_hms_string(&self) -> String {
        let h = self.0 / 3600;
        let m = (self.0 % 3600) / 60;
        let s = self.0 % 60;
        format!("{:02}:{:02}:{:02}", h, m, s)
    }

    pub fn from_hms(time: &str) -> Option<Self> {
        const HOUR_TO_SEC: u32 = 60 * 60;
        const MINUTE_TO_SEC: u32 = 60;
        let mut split = time.trim().split(':');
        let hours: u32 = split.next()?.parse().ok()?;
        let minutes: u32 = split.next()?.parse().ok()?;
        let seconds: u32 = split.next()?.parse().ok()?;
        if split.next().is_some() {
            return None;
        }
        let seconds = hours
            .checked_mul(HOUR_TO_SEC)?
            .checked_add(minutes.checked_mul(MINUTE_TO_SEC)?)?
            .checked_add(seconds)?;
        Some(Self(seconds))
    }
}

/// Wall-clock seconds since midnight, ignoring the date.
pub fn seconds_into_day(timestamp: &NaiveDateTime) -> u32 {
    timestamp.num_seconds_from_midnight()
}

#[test]
fn parse_unparse_1() {
    let time = "00:00:00";
    let stime = Time::from_hms(time).unwrap();
    assert_eq!(time, stime.to_hms_string())
}

#[test]
fn parse_unparse_2() {
    let time = "12:30:30";
    let stime = Time::from_hms(time).unwrap();
    assert_eq!(time, stime.to_hms_string())
}

#[test]
fn parse_past_midnight() {
    let time = "25:30:00";
    let stime = Time::from_hms(time).unwrap();
    assert_eq!(stime.as_seconds(), 91_800);
    assert_eq!(time, stime.to_hms_string())
}

#[test]
fn huge_hours_do_not_overflow() {
    assert_eq!(Time::from_hms("9999999:00:00"), None);
    assert_eq!(Time::from_hms("1193046:28:15"), Some(Time::from_seconds(u32::MAX)));
    assert_eq!(Time::from_hms("1193046:28:16"), None);
}

#[test]
fn shifted_by_day() {
    let stime = Time::from_seconds(91_800);
    assert_eq!(stime.shifted(DAY), 5_400.0);
    assert_eq!(Time::from_seconds(100).shifted(-DAY), 86_500.0);
}

