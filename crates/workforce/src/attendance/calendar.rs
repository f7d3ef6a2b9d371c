//! Logical-date resolution with night-shift rollover.
//!
//! Attendance rows are keyed by the calendar date in the configured timezone,
//! except that events strictly before the rollover hour belong to the
//! previous day — a 03:45 punch-out closes the night shift that started the
//! evening before.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy)]
pub struct AttendanceCalendar {
    tz: Tz,
    rollover_hour: u32,
}

impl AttendanceCalendar {
    pub fn new(tz: Tz, rollover_hour: u32) -> Self {
        Self { tz, rollover_hour }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// The logical date an instant is attributed to. Idempotent: the same
    /// instant always resolves to the same date.
    pub fn logical_date(&self, at: DateTime<Utc>) -> NaiveDate {
        let local = at.with_timezone(&self.tz);
        let date = local.date_naive();
        // Strictly before the rollover hour: previous day. At the rollover
        // hour exactly: the new day.
        if local.hour() < self.rollover_hour {
            date - Duration::days(1)
        } else {
            date
        }
    }

    /// The earliest date an open record may be carried forward from when
    /// closing against `target`.
    pub fn carry_forward_floor(&self, target: NaiveDate) -> NaiveDate {
        target - Duration::days(1)
    }

    /// `YYYY/MM/DD` prefix for stored image keys.
    pub fn key_prefix(&self, date: NaiveDate) -> String {
        format!("{:04}/{:02}/{:02}", date.year(), date.month(), date.day())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Kolkata;

    fn calendar() -> AttendanceCalendar {
        AttendanceCalendar::new(Kolkata, 4)
    }

    fn kolkata_instant(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Kolkata
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn before_rollover_belongs_to_previous_day() {
        let at = kolkata_instant(2023, 6, 15, 3, 45, 0);
        assert_eq!(
            calendar().logical_date(at),
            NaiveDate::from_ymd_opt(2023, 6, 14).unwrap()
        );
    }

    #[test]
    fn exactly_at_rollover_belongs_to_new_day() {
        let at = kolkata_instant(2023, 6, 15, 4, 0, 0);
        assert_eq!(
            calendar().logical_date(at),
            NaiveDate::from_ymd_opt(2023, 6, 15).unwrap()
        );
    }

    #[test]
    fn one_second_before_rollover_belongs_to_previous_day() {
        let at = kolkata_instant(2023, 6, 15, 3, 59, 59);
        assert_eq!(
            calendar().logical_date(at),
            NaiveDate::from_ymd_opt(2023, 6, 14).unwrap()
        );
    }

    #[test]
    fn daytime_belongs_to_same_day() {
        let at = kolkata_instant(2023, 6, 15, 9, 0, 0);
        assert_eq!(
            calendar().logical_date(at),
            NaiveDate::from_ymd_opt(2023, 6, 15).unwrap()
        );
    }

    #[test]
    fn logical_date_is_idempotent() {
        let at = kolkata_instant(2023, 6, 15, 3, 59, 59);
        let cal = calendar();
        assert_eq!(cal.logical_date(at), cal.logical_date(at));
    }

    #[test]
    fn zero_rollover_never_shifts() {
        let cal = AttendanceCalendar::new(Kolkata, 0);
        let at = kolkata_instant(2023, 6, 15, 0, 0, 1);
        assert_eq!(
            cal.logical_date(at),
            NaiveDate::from_ymd_opt(2023, 6, 15).unwrap()
        );
    }

    #[test]
    fn key_prefix_is_zero_padded() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(calendar().key_prefix(date), "2024/03/07");
    }
}
