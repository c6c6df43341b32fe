use super::error::Rejection;
use super::model::{MarkRequest, OverrideEntry, ScheduleConfig};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc, Weekday};

pub fn canonical_today(now: DateTime<Utc>, zone: FixedOffset) -> NaiveDate {
    now.with_timezone(&zone).date_naive()
}

/// Timetable key for a date, e.g. `"Monday"`.
pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

pub fn check_not_future(
    date: NaiveDate,
    now: DateTime<Utc>,
    zone: FixedOffset,
) -> Result<(), Rejection> {
    if date > canonical_today(now, zone) {
        return Err(Rejection::FutureDate);
    }
    Ok(())
}

pub fn check_not_cancelled(
    overrides: Option<&OverrideEntry>,
    slot_index: u32,
) -> Result<(), Rejection> {
    if overrides.is_some_and(|o| o.is_cancelled(slot_index)) {
        return Err(Rejection::SlotCancelled);
    }
    Ok(())
}

/// Slot index is positional within the stored per-weekday order.
pub fn check_schedule(schedule: &ScheduleConfig, request: &MarkRequest) -> Result<(), Rejection> {
    let weekday = weekday_name(request.date);
    let Some(slot) = schedule.slot(weekday, request.slot_index) else {
        return Err(Rejection::InvalidSlot);
    };
    if slot.subject.trim() != request.subject.trim() {
        return Err(Rejection::SubjectMismatch);
    }
    Ok(())
}

/// All pre-transaction gates, in the order callers see them.
pub fn validate_request(
    request: &MarkRequest,
    now: DateTime<Utc>,
    zone: FixedOffset,
    schedule: &ScheduleConfig,
    overrides: Option<&OverrideEntry>,
) -> Result<(), Rejection> {
    check_not_future(request.date, now, zone)?;
    check_not_cancelled(overrides, request.slot_index)?;
    check_schedule(schedule, request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::model::{AttendanceStatus, ScheduledSlot, SlotOverride};
    use chrono::TimeZone;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(330 * 60).expect("offset")
    }

    fn schedule() -> ScheduleConfig {
        let mut s = ScheduleConfig::default();
        s.days.insert(
            "Monday".into(),
            vec![
                ScheduledSlot {
                    subject: "Maths".into(),
                },
                ScheduledSlot {
                    subject: "English".into(),
                },
            ],
        );
        s
    }

    fn req(subject: &str, date: &str, slot_index: u32) -> MarkRequest {
        MarkRequest {
            subject: subject.into(),
            status: AttendanceStatus::Present,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("date"),
            slot_index,
        }
    }

    #[test]
    fn weekday_of_known_monday() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 8).expect("date");
        assert_eq!(weekday_name(d), "Monday");
    }

    #[test]
    fn future_date_uses_canonical_zone() {
        // 20:00 UTC on Jan 7 is already Jan 8 in IST
        let now = Utc.with_ymd_and_hms(2024, 1, 7, 20, 0, 0).unwrap();
        let jan8 = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        assert_eq!(check_not_future(jan8, now, ist()), Ok(()));
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(check_not_future(jan8, now, utc), Err(Rejection::FutureDate));
    }

    #[test]
    fn cancelled_slot_is_rejected() {
        let mut o = OverrideEntry::default();
        o.slots.insert(1, SlotOverride { cancelled: true });
        assert_eq!(check_not_cancelled(Some(&o), 1), Err(Rejection::SlotCancelled));
        assert_eq!(check_not_cancelled(Some(&o), 0), Ok(()));
        assert_eq!(check_not_cancelled(None, 1), Ok(()));
    }

    #[test]
    fn schedule_gate_checks_slot_and_subject() {
        let s = schedule();
        assert_eq!(check_schedule(&s, &req("Maths", "2024-01-08", 0)), Ok(()));
        assert_eq!(
            check_schedule(&s, &req("English", "2024-01-08", 0)),
            Err(Rejection::SubjectMismatch)
        );
        assert_eq!(
            check_schedule(&s, &req("Maths", "2024-01-08", 2)),
            Err(Rejection::InvalidSlot)
        );
        // Tuesday has no timetable at all
        assert_eq!(
            check_schedule(&s, &req("Maths", "2024-01-09", 0)),
            Err(Rejection::InvalidSlot)
        );
    }

    #[test]
    fn gates_run_future_then_override_then_schedule() {
        let now = Utc.with_ymd_and_hms(2024, 1, 8, 6, 0, 0).unwrap();
        let mut o = OverrideEntry::default();
        o.slots.insert(0, SlotOverride { cancelled: true });
        let s = schedule();
        assert_eq!(
            validate_request(&req("English", "2024-01-15", 0), now, ist(), &s, Some(&o)),
            Err(Rejection::FutureDate)
        );
        assert_eq!(
            validate_request(&req("English", "2024-01-08", 0), now, ist(), &s, Some(&o)),
            Err(Rejection::SlotCancelled)
        );
        assert_eq!(
            validate_request(&req("English", "2024-01-08", 0), now, ist(), &s, None),
            Err(Rejection::SubjectMismatch)
        );
    }
}
