use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};

/// Local hour at which every attendance entry is stamped
pub const PLAYDAY_HOUR: i64 = 7;

/// A closed UTC range `[from, to]` with second precision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Day and month boundaries in the group's local offset.
///
/// All "today" and "this month" queries go through here so the store only
/// ever sees explicit UTC ranges.
#[derive(Debug, Clone, Copy)]
pub struct Calendar {
    offset: FixedOffset,
}

impl Calendar {
    pub fn new(utc_offset_minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix());
        Self { offset }
    }

    #[cfg(test)]
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    /// UTC instant of a local wall clock time on `day`
    fn local_to_utc(&self, day: NaiveDate, since_midnight: Duration) -> DateTime<Utc> {
        let local = day.and_time(NaiveTime::MIN) + since_midnight;
        let shift = Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&(local - shift))
    }

    pub fn start_of_day(&self, day: NaiveDate) -> DateTime<Utc> {
        self.local_to_utc(day, Duration::zero())
    }

    /// `[00:00:00, 23:59:59]` local
    pub fn day(&self, day: NaiveDate) -> Window {
        Window {
            from: self.start_of_day(day),
            to: self.local_to_utc(day, Duration::seconds(86_399)),
        }
    }

    /// `[first 00:00:00, last 23:59:59]` local
    pub fn month(&self, day: NaiveDate) -> Window {
        let first = first_of_month(day);
        let last = first + Duration::days(i64::from(days_in_month(day)) - 1);
        Window {
            from: self.start_of_day(first),
            to: self.day(last).to,
        }
    }

    /// Month start up to (not including) the start of `day`; none on the 1st
    pub fn before_day_in_month(&self, day: NaiveDate) -> Option<Window> {
        if day.day() == 1 {
            return None;
        }
        Some(Window {
            from: self.start_of_day(first_of_month(day)),
            to: self.start_of_day(day) - Duration::seconds(1),
        })
    }

    /// UTC instant of `hour:00` local on `day`
    pub fn at_hour(&self, day: NaiveDate, hour: u32) -> DateTime<Utc> {
        self.local_to_utc(day, Duration::hours(i64::from(hour)))
    }

    /// Timestamp used for attendance entries
    pub fn playday_stamp(&self, day: NaiveDate) -> DateTime<Utc> {
        self.local_to_utc(day, Duration::hours(PLAYDAY_HOUR))
    }
}

pub fn first_of_month(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.day0()))
}

pub fn days_in_month(day: NaiveDate) -> u32 {
    match day.month() {
        4 | 6 | 9 | 11 => 30,
        2 => {
            let year = day.year();
            if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) {
                29
            } else {
                28
            }
        }
        _ => 31,
    }
}

/// Days left in the month counting `day` itself
pub fn remaining_days(day: NaiveDate) -> u32 {
    days_in_month(day) - day.day() + 1
}

/// First day of the month after `day`
pub fn next_month(day: NaiveDate) -> NaiveDate {
    first_of_month(day) + Duration::days(i64::from(days_in_month(day)))
}

pub fn is_last_day_of_month(day: NaiveDate) -> bool {
    remaining_days(day) == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(date(2024, 2, 10)), 29);
        assert_eq!(days_in_month(date(2023, 2, 10)), 28);
        assert_eq!(days_in_month(date(1900, 2, 1)), 28);
        assert_eq!(days_in_month(date(2000, 2, 1)), 29);
        assert_eq!(days_in_month(date(2024, 9, 1)), 30);
        assert_eq!(days_in_month(date(2024, 12, 31)), 31);
    }

    #[test]
    fn test_remaining_days_includes_today() {
        assert_eq!(remaining_days(date(2024, 9, 1)), 30);
        assert_eq!(remaining_days(date(2024, 9, 30)), 1);
        assert!(is_last_day_of_month(date(2024, 2, 29)));
    }

    #[test]
    fn test_month_window_in_local_offset() {
        // UTC+05:30
        let calendar = Calendar::new(330);
        let window = calendar.month(date(2024, 9, 15));

        assert_eq!(window.from.to_rfc3339(), "2024-08-31T18:30:00+00:00");
        assert_eq!(window.to.to_rfc3339(), "2024-09-30T18:29:59+00:00");
    }

    #[test]
    fn test_recovery_window() {
        let calendar = Calendar::utc();
        assert!(calendar.before_day_in_month(date(2024, 9, 1)).is_none());

        let window = calendar.before_day_in_month(date(2024, 9, 3)).unwrap();
        assert_eq!(window.from, calendar.start_of_day(date(2024, 9, 1)));
        assert!(window.to < calendar.start_of_day(date(2024, 9, 3)));
        assert!(window.to > calendar.playday_stamp(date(2024, 9, 2)));
    }

    #[test]
    fn test_playday_stamp_within_day() {
        let calendar = Calendar::new(-300);
        let day = date(2024, 3, 10);
        let stamp = calendar.playday_stamp(day);
        let window = calendar.day(day);

        assert!(stamp >= window.from && stamp <= window.to);
        assert_eq!(calendar.local_date(stamp), day);
    }

    #[test]
    fn test_next_month_rolls_year() {
        assert_eq!(next_month(date(2024, 12, 20)), date(2025, 1, 1));
        assert_eq!(next_month(date(2024, 1, 31)), date(2024, 2, 1));
    }
}
