use super::model::{
    AttendanceStatus, MarkRequest, SlotStatusEntry, SubjectStats, UserAttendanceRecord,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotWrite {
    Set(SlotStatusEntry),
    /// Back to `pending`: the log row goes away.
    Clear,
}

/// The exact write set for one accepted status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub date: NaiveDate,
    pub slot_index: u32,
    pub slot: SlotWrite,
    /// One entry per touched subject bucket; two when the logged subject
    /// differs from the requested one.
    pub stats: Vec<(String, SubjectStats)>,
    pub clamped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NoOp,
    Apply(Reconciliation),
}

#[derive(Debug, Clone, Copy, Default)]
struct Counter {
    present: i64,
    total: i64,
}

impl Counter {
    fn from_stats(s: SubjectStats) -> Self {
        Self {
            present: i64::from(s.present),
            total: i64::from(s.total),
        }
    }

    fn add(&mut self, (present, total): (i64, i64), sign: i64) {
        self.present += sign * present;
        self.total += sign * total;
    }

    /// Returns the clamped stats and whether any value had to move.
    fn settle(self) -> (SubjectStats, bool) {
        let total = self.total.max(0);
        let present = self.present.max(0).min(total);
        let clamped = total != self.total || present != self.present;
        (
            SubjectStats {
                present: u32::try_from(present).unwrap_or(u32::MAX),
                total: u32::try_from(total).unwrap_or(u32::MAX),
            },
            clamped,
        )
    }
}

pub fn reconcile(snapshot: &UserAttendanceRecord, request: &MarkRequest) -> Outcome {
    let old_entry = snapshot.entry(request.date, request.slot_index);
    let old_status = snapshot.status_at(request.date, request.slot_index);

    if old_status == request.status {
        return Outcome::NoOp;
    }

    let mut touched: BTreeMap<&str, Counter> = BTreeMap::new();
    if let Some(old) = old_entry {
        touched
            .entry(old.subject.as_str())
            .or_insert_with(|| Counter::from_stats(snapshot.stats(&old.subject)))
            .add(old.status.delta(), -1);
    }
    // pending contributes nothing, so the requested bucket is left alone
    if request.status != AttendanceStatus::Pending {
        touched
            .entry(request.subject.as_str())
            .or_insert_with(|| Counter::from_stats(snapshot.stats(&request.subject)))
            .add(request.status.delta(), 1);
    }

    let mut clamped = false;
    let mut stats = Vec::with_capacity(touched.len());
    for (subject, counter) in touched {
        let (settled, moved) = counter.settle();
        if moved {
            clamped = true;
            tracing::warn!(
                subject,
                computed_present = counter.present,
                computed_total = counter.total,
                present = settled.present,
                total = settled.total,
                date = %request.date,
                slot_index = request.slot_index,
                "attendance counters clamped; daily log and aggregates had drifted"
            );
        }
        stats.push((subject.to_string(), settled));
    }

    let slot = match request.status {
        AttendanceStatus::Pending => SlotWrite::Clear,
        status => SlotWrite::Set(SlotStatusEntry {
            status,
            subject: request.subject.clone(),
        }),
    };

    Outcome::Apply(Reconciliation {
        date: request.date,
        slot_index: request.slot_index,
        slot,
        stats,
        clamped,
    })
}

#[cfg(test)]
impl UserAttendanceRecord {
    /// Folds a write set into this snapshot, as the store would persist it.
    pub fn apply(&mut self, rec: &Reconciliation) {
        for (subject, stats) in &rec.stats {
            self.attendance.insert(subject.clone(), *stats);
        }
        match &rec.slot {
            SlotWrite::Set(entry) => {
                self.daily_logs
                    .entry(rec.date)
                    .or_default()
                    .insert(rec.slot_index, entry.clone());
            }
            SlotWrite::Clear => {
                if let Some(day) = self.daily_logs.get_mut(&rec.date) {
                    day.remove(&rec.slot_index);
                    if day.is_empty() {
                        self.daily_logs.remove(&rec.date);
                    }
                }
            }
        }
    }
}
