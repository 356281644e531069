//! Structured diagnostics: every event is mirrored to the `log` facade and
//! persisted in the `event_log` table so operators can inspect word supply and
//! provider behaviour after the fact.

use r2d2_sqlite::rusqlite::{params, Connection};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::DbPool;

/// One row of the event log.
#[derive(Debug, Clone)]
pub struct Event {
    pub level: log::Level,
    pub code: Option<&'static str>,
    pub module: &'static str,
    pub message: String,
    pub explain: Option<&'static str>,
    pub data: Option<Value>,
}

impl Event {
    pub fn new(level: log::Level, module: &'static str, message: impl Into<String>) -> Self {
        Self {
            level,
            code: None,
            module,
            message: message.into(),
            explain: None,
            data: None,
        }
    }

    pub fn code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn explain(mut self, explain: &'static str) -> Self {
        self.explain = Some(explain);
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

pub fn log_event(conn: &Connection, event: &Event) -> rusqlite::Result<()> {
    log::log!(target: event.module, event.level, "{}", event.message);
    let id = Uuid::new_v4().to_string();
    let ts = OffsetDateTime::now_utc().unix_timestamp();
    let level = event.level.as_str().to_lowercase();
    let data_str = event.data.as_ref().map(|v| v.to_string());
    conn.execute(
        "INSERT INTO event_log (id, ts, level, code, module, message, explain, data) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            ts,
            level,
            event.code,
            event.module,
            event.message,
            event.explain,
            data_str
        ],
    )?;
    Ok(())
}

/// Persist an event off the async executor. Failures to write the log are
/// reported through the facade only.
pub fn spawn_event(pool: &DbPool, event: Event) {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || match pool.get() {
        Ok(conn) => {
            if let Err(err) = log_event(&conn, &event) {
                log::warn!("failed to persist event {:?}: {err}", event.code);
            }
        }
        Err(err) => log::warn!("event log unavailable: {err}"),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_db;
    use serde_json::json;

    /// Most recent `(level, message)` pairs recorded for a module.
    fn recent_events(conn: &Connection, module: &str, limit: usize) -> rusqlite::Result<Vec<(String, String)>> {
        let mut stmt = conn.prepare(
            "SELECT level, message FROM event_log WHERE module = ?1 ORDER BY ts DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![module, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    #[test]
    fn log_event_persists_row() {
        let pool = init_memory_db().unwrap();
        let conn = pool.get().unwrap();
        let event = Event::new(log::Level::Warn, "word.supply", "generation failed")
            .code("GEN-1001")
            .data(json!({ "category": "animals" }));
        log_event(&conn, &event).unwrap();
        let events = recent_events(&conn, "word.supply", 10).unwrap();
        assert_eq!(events, vec![("warn".to_string(), "generation failed".to_string())]);
    }
}
