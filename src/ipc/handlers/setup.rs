use crate::attendance::{Policy, Rejection};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Policy,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "policy" => Some(Self::Policy),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Policy => "setup.policy",
        }
    }
}

fn default_section(section: SetupSection) -> anyhow::Result<Value> {
    match section {
        SetupSection::Policy => Ok(serde_json::to_value(Policy::default())?),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_nullable_digest(v: &Value, key: &str) -> Result<Value, String> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let s = parse_string_max(v, key, 64)?.to_ascii_lowercase();
    if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("{} must be 64 hex characters or null", key));
    }
    Ok(Value::String(s))
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Policy => match k.as_str() {
                "rateLimitWindowMs" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 600_000)?));
                }
                "utcOffsetMinutes" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, -720, 840)?));
                }
                "maxCommitAttempts" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 20)?));
                }
                "resetBatchSize" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 500)?));
                }
                "adminEmailDomain" => {
                    let s = parse_string_max(v, k, 120)?
                        .trim_start_matches('@')
                        .to_ascii_lowercase();
                    if s.is_empty() || !s.contains('.') {
                        return Err("adminEmailDomain must be a domain like example.edu".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "resetSecretSha256" => {
                    obj.insert(k.clone(), parse_nullable_digest(v, k)?);
                }
                _ => return Err(format!("unknown policy field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section)?;
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Field by field: a malformed stored field keeps its default.
            for (k, v) in saved_obj {
                let one: Map<String, Value> = std::iter::once((k.clone(), v.clone())).collect();
                if let Err(msg) = merge_section_patch(section, &mut current, &one) {
                    tracing::warn!(key = section.key(), field = %k, %msg, "ignoring invalid stored setting");
                }
            }
        }
    }
    Ok(current)
}

pub fn load_policy(conn: &rusqlite::Connection) -> anyhow::Result<Policy> {
    let value = load_section(conn, SetupSection::Policy)?;
    Ok(serde_json::from_value(value)?)
}

/// `load_policy` for the attendance paths: the cause is logged, callers only
/// see `store_unavailable`.
pub fn request_policy(conn: &rusqlite::Connection) -> Result<Policy, Rejection> {
    load_policy(conn).map_err(|e| {
        tracing::error!(operation = "load_policy", error = %e, "attendance store failure");
        Rejection::StoreUnavailable
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut policy = match load_section(conn, SetupSection::Policy) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    // Report whether a secret exists, not its digest.
    if let Some(obj) = policy.as_object_mut() {
        let configured = obj
            .remove("resetSecretSha256")
            .is_some_and(|v| !v.is_null());
        obj.insert("resetSecretConfigured".into(), Value::Bool(configured));
    }
    ok(&req.id, json!({ "policy": policy }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(key = section.key(), fields = patch_obj.len(), "setup updated");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
