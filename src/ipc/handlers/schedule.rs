use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::{SqliteStore, Timetable};
use serde_json::{json, Map, Value};

fn handle_schedule_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let schedule = match SqliteStore::new(conn).load_schedule() {
        Ok(s) => s,
        Err(e) => {
            let r = e.into_rejection("load_schedule");
            return err(&req.id, r.code(), r.to_string(), None);
        }
    };
    let days: Map<String, Value> = schedule
        .days
        .into_iter()
        .map(|(weekday, slots)| {
            let slots: Vec<Value> = slots
                .into_iter()
                .enumerate()
                .map(|(i, s)| json!({ "slotIndex": i, "subject": s.subject }))
                .collect();
            (weekday, Value::Array(slots))
        })
        .collect();
    ok(&req.id, json!({ "schedule": days }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.get" => Some(handle_schedule_get(state, req)),
        _ => None,
    }
}
