use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

pub const DB_FILE: &str = "attendance.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    // Several sidecars may share one workspace; writers wait instead of failing.
    conn.busy_timeout(Duration::from_secs(5))?;
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))?;
    ensure_schema(&conn)?;
    Ok(conn)
}

pub fn ensure_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            email TEXT,
            version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT
        )",
        [],
    )?;
    // Older workspaces predate rate limiting.
    ensure_users_last_update(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_stats(
            user_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            present INTEGER NOT NULL DEFAULT 0,
            total INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(user_id, subject),
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS slot_logs(
            user_id TEXT NOT NULL,
            date TEXT NOT NULL,
            slot_index INTEGER NOT NULL,
            status TEXT NOT NULL,
            subject TEXT NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(user_id, date, slot_index),
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_slot_logs_user ON slot_logs(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedule_slots(
            weekday TEXT NOT NULL,
            position INTEGER NOT NULL,
            subject TEXT NOT NULL,
            PRIMARY KEY(weekday, position)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS slot_overrides(
            date TEXT NOT NULL,
            slot_index INTEGER NOT NULL,
            cancelled INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(date, slot_index)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS credentials(
            token_sha256 TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            email TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_credentials_user ON credentials(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admins(
            email TEXT PRIMARY KEY
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS reset_runs(
            id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            batches INTEGER NOT NULL,
            updated INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn ensure_users_last_update(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "users", "last_update_ms")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE users ADD COLUMN last_update_ms INTEGER", [])?;
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent_and_migrates_last_update() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute(
            "CREATE TABLE users(id TEXT PRIMARY KEY, email TEXT, version INTEGER NOT NULL DEFAULT 0, created_at TEXT)",
            [],
        )
        .expect("legacy users table");
        conn.execute("INSERT INTO users(id) VALUES('u1')", [])
            .expect("legacy row");

        ensure_schema(&conn).expect("first pass");
        ensure_schema(&conn).expect("second pass");

        assert!(table_has_column(&conn, "users", "last_update_ms").expect("pragma"));
        let last: Option<i64> = conn
            .query_row("SELECT last_update_ms FROM users WHERE id = 'u1'", [], |r| r.get(0))
            .expect("row");
        assert_eq!(last, None);
    }

    #[test]
    fn settings_roundtrip() {
        let conn = Connection::open_in_memory().expect("open");
        ensure_schema(&conn).expect("schema");
        assert_eq!(settings_get_json(&conn, "setup.policy").expect("get"), None);
        let v = serde_json::json!({ "rateLimitWindowMs": 0 });
        settings_set_json(&conn, "setup.policy", &v).expect("set");
        assert_eq!(settings_get_json(&conn, "setup.policy").expect("get"), Some(v));
    }
}
