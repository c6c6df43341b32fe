//! Persistence seams for the attendance core and their SQLite implementation.
//!
//! The record store is optimistic: `load` hands out the row's `version`, and
//! `commit` only lands if that version is still current. Nothing is locked
//! between the two calls.

use crate::attendance::error::StoreError;
use crate::attendance::model::{
    AttendanceStatus, OverrideEntry, ScheduleConfig, ScheduledSlot, SlotOverride,
    SlotStatusEntry, SubjectStats, UserAttendanceRecord, VersionedRecord,
};
use crate::attendance::reconcile::{Reconciliation, SlotWrite};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    Committed,
    /// The record moved on since it was loaded.
    Conflict,
}

pub trait RecordStore {
    fn load(&self, user_id: &str) -> Result<Option<VersionedRecord>, StoreError>;

    fn commit(
        &self,
        user_id: &str,
        expected_version: i64,
        write: &Reconciliation,
        now: DateTime<Utc>,
    ) -> Result<CommitStatus, StoreError>;
}

pub trait Timetable {
    fn load_schedule(&self) -> Result<ScheduleConfig, StoreError>;
    fn load_override(&self, date: NaiveDate) -> Result<Option<OverrideEntry>, StoreError>;
}

pub trait ResetTarget {
    fn list_user_ids(&self) -> Result<Vec<String>, StoreError>;
    /// Empties aggregates and logs for every user in the batch, as one commit.
    fn reset_batch(&self, user_ids: &[String]) -> Result<(), StoreError>;
}

pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn record_reset_run(
        &self,
        run_id: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        batches: usize,
        updated: usize,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO reset_runs(id, started_at, finished_at, batches, updated)
             VALUES(?, ?, ?, ?, ?)",
            (
                run_id,
                started_at.to_rfc3339(),
                finished_at.to_rfc3339(),
                batches as i64,
                updated as i64,
            ),
        )?;
        Ok(())
    }
}

fn parse_date(raw: &str, table: &'static str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| StoreError::Corrupt {
        table,
        message: format!("bad date {:?}: {}", raw, e),
    })
}

fn counter(raw: i64, table: &'static str) -> Result<u32, StoreError> {
    u32::try_from(raw).map_err(|_| StoreError::Corrupt {
        table,
        message: format!("counter out of range: {}", raw),
    })
}

fn millis_to_instant(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::Corrupt {
            table: "users",
            message: format!("bad last_update_ms: {}", ms),
        })
}

impl RecordStore for SqliteStore<'_> {
    fn load(&self, user_id: &str) -> Result<Option<VersionedRecord>, StoreError> {
        // One read transaction so the three selects see the same snapshot.
        let tx = self.conn.unchecked_transaction()?;
        let head: Option<(i64, Option<i64>)> = tx
            .query_row(
                "SELECT version, last_update_ms FROM users WHERE id = ?",
                [user_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((version, last_update_ms)) = head else {
            return Ok(None);
        };

        let mut record = UserAttendanceRecord {
            last_update: last_update_ms.map(millis_to_instant).transpose()?,
            ..Default::default()
        };

        {
            let mut stmt =
                tx.prepare("SELECT subject, present, total FROM subject_stats WHERE user_id = ?")?;
            let rows = stmt
                .query_map([user_id], |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, i64>(1)?,
                        r.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            for (subject, present, total) in rows {
                record.attendance.insert(
                    subject,
                    SubjectStats {
                        present: counter(present, "subject_stats")?,
                        total: counter(total, "subject_stats")?,
                    },
                );
            }
        }

        {
            let mut stmt = tx.prepare(
                "SELECT date, slot_index, status, subject
                 FROM slot_logs
                 WHERE user_id = ?",
            )?;
            let rows = stmt
                .query_map([user_id], |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, i64>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            for (date, slot_index, status, subject) in rows {
                let date = parse_date(&date, "slot_logs")?;
                let slot_index = counter(slot_index, "slot_logs")?;
                let status = match AttendanceStatus::parse(&status) {
                    Some(AttendanceStatus::Pending) => continue,
                    Some(s) => s,
                    None => {
                        return Err(StoreError::Corrupt {
                            table: "slot_logs",
                            message: format!("unknown status {:?}", status),
                        })
                    }
                };
                record
                    .daily_logs
                    .entry(date)
                    .or_default()
                    .insert(slot_index, SlotStatusEntry { status, subject });
            }
        }
        tx.finish()?;

        Ok(Some(VersionedRecord { version, record }))
    }

    fn commit(
        &self,
        user_id: &str,
        expected_version: i64,
        write: &Reconciliation,
        now: DateTime<Utc>,
    ) -> Result<CommitStatus, StoreError> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let bumped = tx.execute(
            "UPDATE users SET version = version + 1, last_update_ms = ?
             WHERE id = ? AND version = ?",
            (now.timestamp_millis(), user_id, expected_version),
        )?;
        if bumped == 0 {
            // dropped transaction rolls back
            return Ok(CommitStatus::Conflict);
        }

        for (subject, stats) in &write.stats {
            tx.execute(
                "INSERT INTO subject_stats(user_id, subject, present, total)
                 VALUES(?, ?, ?, ?)
                 ON CONFLICT(user_id, subject) DO UPDATE SET
                   present = excluded.present,
                   total = excluded.total",
                (user_id, subject, stats.present, stats.total),
            )?;
        }

        let date = write.date.format(DATE_FORMAT).to_string();
        match &write.slot {
            SlotWrite::Set(entry) => {
                tx.execute(
                    "INSERT INTO slot_logs(user_id, date, slot_index, status, subject, updated_at)
                     VALUES(?, ?, ?, ?, ?, ?)
                     ON CONFLICT(user_id, date, slot_index) DO UPDATE SET
                       status = excluded.status,
                       subject = excluded.subject,
                       updated_at = excluded.updated_at",
                    (
                        user_id,
                        &date,
                        write.slot_index,
                        entry.status.as_str(),
                        &entry.subject,
                        now.to_rfc3339(),
                    ),
                )?;
            }
            SlotWrite::Clear => {
                tx.execute(
                    "DELETE FROM slot_logs WHERE user_id = ? AND date = ? AND slot_index = ?",
                    (user_id, &date, write.slot_index),
                )?;
            }
        }

        tx.commit()?;
        Ok(CommitStatus::Committed)
    }
}

impl Timetable for SqliteStore<'_> {
    fn load_schedule(&self) -> Result<ScheduleConfig, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT weekday, subject
             FROM schedule_slots
             ORDER BY weekday, position",
        )?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut schedule = ScheduleConfig::default();
        for (weekday, subject) in rows {
            schedule
                .days
                .entry(weekday)
                .or_default()
                .push(ScheduledSlot { subject });
        }
        Ok(schedule)
    }

    fn load_override(&self, date: NaiveDate) -> Result<Option<OverrideEntry>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT slot_index, cancelled FROM slot_overrides WHERE date = ?")?;
        let rows = stmt
            .query_map([date.format(DATE_FORMAT).to_string()], |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)? != 0))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if rows.is_empty() {
            return Ok(None);
        }
        let mut entry = OverrideEntry::default();
        for (slot_index, cancelled) in rows {
            entry
                .slots
                .insert(counter(slot_index, "slot_overrides")?, SlotOverride { cancelled });
        }
        Ok(Some(entry))
    }
}

impl ResetTarget for SqliteStore<'_> {
    fn list_user_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT id FROM users ORDER BY id")?;
        let ids = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn reset_batch(&self, user_ids: &[String]) -> Result<(), StoreError> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for user_id in user_ids {
            tx.execute("DELETE FROM subject_stats WHERE user_id = ?", [user_id])?;
            tx.execute("DELETE FROM slot_logs WHERE user_id = ?", [user_id])?;
            // In-flight marks that read the old counters must not land on top.
            tx.execute(
                "UPDATE users SET version = version + 1 WHERE id = ?",
                [user_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
