use crate::attendance::model::UserAttendanceRecord;
use crate::attendance::{AttendanceStatus, MarkRequest, MutationCoordinator, Rejection};
use crate::auth::{CredentialVerifier, WorkspaceCredentials};
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::handlers::setup::request_policy;
use crate::ipc::types::{AppState, Request};
use crate::store::{RecordStore, SqliteStore, DATE_FORMAT};
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

fn get_token(params: &Value) -> Result<&str, HandlerErr> {
    params
        .get("token")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| Rejection::InvalidCredential.into())
}

/// Field presence first (reported together), then shape.
fn parse_mark_request(params: &Value) -> Result<MarkRequest, HandlerErr> {
    let subject = params
        .get("subject")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let status = params.get("status").and_then(|v| v.as_str());
    let date = params
        .get("date")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty());
    let slot_index = params.get("slotIndex").filter(|v| !v.is_null());

    let missing: Vec<&str> = [
        ("subject", subject.is_none()),
        ("status", status.is_none()),
        ("date", date.is_none()),
        ("slotIndex", slot_index.is_none()),
    ]
    .into_iter()
    .filter_map(|(k, absent)| absent.then_some(k))
    .collect();
    let (Some(subject), Some(status), Some(date), Some(slot_index)) =
        (subject, status, date, slot_index)
    else {
        return Err(Rejection::MissingFields(missing.join(", ")).into());
    };

    let status = AttendanceStatus::parse(status)
        .ok_or_else(|| HandlerErr::bad_params("status must be one of: present, absent, pending"))?;
    let date = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT)
        .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))?;
    let slot_index = slot_index
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| HandlerErr::bad_params("slotIndex must be a non-negative integer"))?;

    Ok(MarkRequest {
        subject: subject.to_string(),
        status,
        date,
        slot_index,
    })
}

fn attendance_mark(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let policy = request_policy(conn)?;
    let identity = WorkspaceCredentials::new(conn).verify(get_token(params)?)?;
    let request = parse_mark_request(params)?;

    let store = SqliteStore::new(conn);
    let accepted = MutationCoordinator::new(&store, &store, &policy).submit(
        &identity.user_id,
        &request,
        Utc::now(),
    )?;
    Ok(json!({ "success": true, "changed": accepted.changed }))
}

fn record_json(user_id: &str, record: &UserAttendanceRecord) -> Value {
    let attendance: Map<String, Value> = record
        .attendance
        .iter()
        .map(|(subject, stats)| {
            (
                subject.clone(),
                json!({
                    "present": stats.present,
                    "total": stats.total,
                    "percentage": stats.percentage()
                }),
            )
        })
        .collect();
    let daily_logs: Map<String, Value> = record
        .daily_logs
        .iter()
        .map(|(date, day)| {
            let slots: Map<String, Value> = day
                .iter()
                .map(|(slot, entry)| {
                    (
                        slot.to_string(),
                        json!({ "status": entry.status, "subject": entry.subject }),
                    )
                })
                .collect();
            (date.format(DATE_FORMAT).to_string(), Value::Object(slots))
        })
        .collect();
    json!({
        "userId": user_id,
        "attendance": attendance,
        "dailyLogs": daily_logs,
        "lastUpdate": record.last_update.map(|t| t.to_rfc3339())
    })
}

fn attendance_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let identity = WorkspaceCredentials::new(conn).verify(get_token(params)?)?;
    let loaded = SqliteStore::new(conn)
        .load(&identity.user_id)
        .map_err(|e| e.into_rejection("load_record"))?
        .ok_or(Rejection::UserNotFound)?;
    Ok(record_json(&identity.user_id, &loaded.record))
}

fn handle_attendance_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_mark(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_attendance_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_get(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.mark" => Some(handle_attendance_mark(state, req)),
        "attendance.get" => Some(handle_attendance_get(state, req)),
        _ => None,
    }
}
