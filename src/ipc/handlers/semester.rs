use crate::attendance::{reset_all_users, Rejection, ResetError};
use crate::auth::{authorize_reset, ResetAuthorization, ResetGrant, WorkspaceCredentials};
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::handlers::setup::request_policy;
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use chrono::Utc;
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

fn non_empty_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

fn reset_authorization(params: &Value) -> Result<ResetAuthorization<'_>, HandlerErr> {
    if let Some(token) = non_empty_str(params, "token") {
        return Ok(ResetAuthorization::Token(token));
    }
    if let Some(secret) = non_empty_str(params, "secret") {
        return Ok(ResetAuthorization::Secret(secret));
    }
    Err(Rejection::MissingFields("token or secret".into()).into())
}

fn semester_reset(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let policy = request_policy(conn)?;
    let creds = WorkspaceCredentials::new(conn);
    let grant = authorize_reset(&creds, &creds, &policy, reset_authorization(params)?)?;
    let actor = match &grant {
        ResetGrant::Admin(email) => email.as_str(),
        ResetGrant::SharedSecret => "shared-secret",
    };

    let store = SqliteStore::new(conn);
    let started_at = Utc::now();
    tracing::info!(actor, batch_size = policy.reset_batch_size, "semester reset started");
    let summary = match reset_all_users(&store, policy.reset_batch_size) {
        Ok(s) => s,
        Err(ResetError::Listing(e)) => return Err(e.into_rejection("list_users").into()),
        Err(ResetError::Partial {
            committed_batches,
            total_batches,
            updated,
            source,
        }) => {
            tracing::error!(
                actor,
                committed_batches,
                total_batches,
                updated,
                error = %source,
                "semester reset incomplete"
            );
            return Err(HandlerErr {
                code: "reset_partial",
                message: "Action Failed".to_string(),
                details: Some(json!({
                    "committedBatches": committed_batches,
                    "totalBatches": total_batches,
                    "updated": updated
                })),
            });
        }
    };

    if summary.updated == 0 {
        return Ok(json!({ "success": true, "batches": 0, "updated": 0, "message": "No users to update" }));
    }

    let run_id = Uuid::new_v4().to_string();
    if let Err(e) = store.record_reset_run(
        &run_id,
        started_at,
        Utc::now(),
        summary.batches,
        summary.updated,
    ) {
        // The reset itself is committed; only the audit row is missing.
        tracing::warn!(%run_id, error = %e, "could not record reset run");
    }
    tracing::info!(
        actor,
        %run_id,
        batches = summary.batches,
        updated = summary.updated,
        "semester reset finished"
    );
    Ok(json!({
        "success": true,
        "batches": summary.batches,
        "updated": summary.updated,
        "runId": run_id
    }))
}

fn handle_semester_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match semester_reset(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "semester.reset" => Some(handle_semester_reset(state, req)),
        _ => None,
    }
}
