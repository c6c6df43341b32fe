use super::error::Rejection;
use super::model::MarkRequest;
use super::policy::Policy;
use super::reconcile::{reconcile, Outcome};
use super::validate::validate_request;
use crate::store::{CommitStatus, RecordStore, Timetable};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    /// False when the slot already held the requested status.
    pub changed: bool,
}

/// Runs one mark-attendance call: gates first, then the read → reconcile →
/// compare-and-swap cycle against the user's record.
pub struct MutationCoordinator<'a, S, T> {
    store: &'a S,
    timetable: &'a T,
    policy: &'a Policy,
}

impl<'a, S: RecordStore, T: Timetable> MutationCoordinator<'a, S, T> {
    pub fn new(store: &'a S, timetable: &'a T, policy: &'a Policy) -> Self {
        Self {
            store,
            timetable,
            policy,
        }
    }

    pub fn submit(
        &self,
        user_id: &str,
        request: &MarkRequest,
        now: DateTime<Utc>,
    ) -> Result<Accepted, Rejection> {
        let overrides = self
            .timetable
            .load_override(request.date)
            .map_err(|e| e.into_rejection("load_override"))?;
        let schedule = self
            .timetable
            .load_schedule()
            .map_err(|e| e.into_rejection("load_schedule"))?;
        validate_request(
            request,
            now,
            self.policy.zone(),
            &schedule,
            overrides.as_ref(),
        )?;

        self.transact(user_id, request, now)
    }

    fn transact(
        &self,
        user_id: &str,
        request: &MarkRequest,
        now: DateTime<Utc>,
    ) -> Result<Accepted, Rejection> {
        let attempts = self.policy.max_commit_attempts.max(1);
        for attempt in 1..=attempts {
            let Some(loaded) = self
                .store
                .load(user_id)
                .map_err(|e| e.into_rejection("load_record"))?
            else {
                return Err(Rejection::UserNotFound);
            };

            // Checked against the snapshot the commit is conditioned on, so two
            // racing calls cannot both slip through.
            if let Some(last) = loaded.record.last_update {
                if now - last < self.policy.rate_limit_window() {
                    return Err(Rejection::RateLimited);
                }
            }

            let rec = match reconcile(&loaded.record, request) {
                Outcome::NoOp => {
                    tracing::debug!(
                        user_id,
                        date = %request.date,
                        slot_index = request.slot_index,
                        "status unchanged, nothing to write"
                    );
                    return Ok(Accepted { changed: false });
                }
                Outcome::Apply(rec) => rec,
            };

            match self
                .store
                .commit(user_id, loaded.version, &rec, now)
                .map_err(|e| e.into_rejection("commit_record"))?
            {
                CommitStatus::Committed => {
                    tracing::info!(
                        user_id,
                        subject = %request.subject,
                        status = request.status.as_str(),
                        date = %request.date,
                        slot_index = request.slot_index,
                        attempt,
                        clamped = rec.clamped,
                        "attendance marked"
                    );
                    return Ok(Accepted { changed: true });
                }
                CommitStatus::Conflict => {
                    tracing::debug!(user_id, attempt, "record changed underneath, retrying");
                }
            }
        }

        tracing::warn!(user_id, attempts, "gave up after repeated write conflicts");
        Err(Rejection::TransientConflict)
    }
}
