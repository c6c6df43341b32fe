use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Pending,
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Present => "present",
            Self::Absent => "absent",
        }
    }

    /// Contribution of one slot in this state, as `(present, total)`.
    pub fn delta(self) -> (i64, i64) {
        match self {
            Self::Pending => (0, 0),
            Self::Present => (1, 1),
            Self::Absent => (0, 1),
        }
    }
}

/// The persisted value at one `(date, slotIndex)`.
///
/// The subject is captured at write time; aggregate reversal always uses this
/// subject, never the one the timetable currently shows for the slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStatusEntry {
    pub status: AttendanceStatus,
    pub subject: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectStats {
    pub present: u32,
    pub total: u32,
}

impl SubjectStats {
    pub fn percentage(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(100.0 * f64::from(self.present) / f64::from(self.total))
    }
}

pub type DayLog = BTreeMap<u32, SlotStatusEntry>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserAttendanceRecord {
    pub daily_logs: BTreeMap<NaiveDate, DayLog>,
    pub attendance: BTreeMap<String, SubjectStats>,
    pub last_update: Option<DateTime<Utc>>,
}

impl UserAttendanceRecord {
    pub fn entry(&self, date: NaiveDate, slot_index: u32) -> Option<&SlotStatusEntry> {
        self.daily_logs.get(&date).and_then(|day| day.get(&slot_index))
    }

    /// Logged status at a slot; a slot with no entry is `Pending`.
    pub fn status_at(&self, date: NaiveDate, slot_index: u32) -> AttendanceStatus {
        self.entry(date, slot_index)
            .map(|e| e.status)
            .unwrap_or(AttendanceStatus::Pending)
    }

    pub fn stats(&self, subject: &str) -> SubjectStats {
        self.attendance.get(subject).copied().unwrap_or_default()
    }
}

/// A record as loaded from the store, with the version the commit must match.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedRecord {
    pub version: i64,
    pub record: UserAttendanceRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkRequest {
    pub subject: String,
    pub status: AttendanceStatus,
    pub date: NaiveDate,
    pub slot_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledSlot {
    pub subject: String,
}

/// Weekday name (`"Monday"`, ...) to the positional slot list for that day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub days: BTreeMap<String, Vec<ScheduledSlot>>,
}

impl ScheduleConfig {
    pub fn slot(&self, weekday: &str, slot_index: u32) -> Option<&ScheduledSlot> {
        self.days
            .get(weekday)
            .and_then(|slots| slots.get(slot_index as usize))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOverride {
    pub cancelled: bool,
}

/// Overrides for a single date, by slot index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideEntry {
    pub slots: BTreeMap<u32, SlotOverride>,
}

impl OverrideEntry {
    pub fn is_cancelled(&self, slot_index: u32) -> bool {
        self.slots
            .get(&slot_index)
            .map(|o| o.cancelled)
            .unwrap_or(false)
    }
}
