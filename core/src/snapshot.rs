//! Versioned persistence of the session settings that survive restarts.
//!
//! Only roster names, custom categories and the game configuration are kept;
//! the running round never is. Older records are migrated once, at load time.

use r2d2_sqlite::rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::OffsetDateTime;

use crate::db::DbPool;
use crate::errors::GameError;
use crate::model::{Difficulty, Language};

pub const SNAPSHOT_VERSION: u32 = 1;
pub const SNAPSHOT_KEY: &str = "session.snapshot";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedGameState {
    pub total_players: usize,
    pub impostor_count: usize,
    pub difficulty: Difficulty,
    pub language: Language,
    pub selected_categories: Vec<String>,
    pub show_hints_to_impostors: bool,
}

impl Default for PersistedGameState {
    fn default() -> Self {
        Self {
            total_players: 3,
            impostor_count: 1,
            difficulty: Difficulty::Medium,
            language: Language::En,
            selected_categories: vec!["animals".into(), "food".into(), "movies".into()],
            show_hints_to_impostors: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSnapshot {
    pub player_names: Vec<String>,
    pub custom_categories: Vec<String>,
    pub game_state: PersistedGameState,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(default)]
    version: u32,
    state: Value,
}

pub fn encode_snapshot(snapshot: &SessionSnapshot) -> Result<String, GameError> {
    let envelope = Envelope {
        version: SNAPSHOT_VERSION,
        state: serde_json::to_value(snapshot)?,
    };
    Ok(serde_json::to_string(&envelope)?)
}

pub fn decode_snapshot(raw: &str) -> Result<SessionSnapshot, GameError> {
    let envelope: Envelope = serde_json::from_str(raw)?;
    let state = migrate(envelope.version, envelope.state)?;
    Ok(serde_json::from_value(state)?)
}

fn migrate(version: u32, mut state: Value) -> Result<Value, GameError> {
    match version {
        0 => {
            if !state.is_object() {
                state = json!({});
            }
            let game_state = state
                .as_object_mut()
                .map(|obj| obj.entry("gameState").or_insert_with(|| json!({})));
            if let Some(Value::Object(game_state)) = game_state {
                game_state.insert("difficulty".into(), json!("medium"));
                game_state.insert("language".into(), json!("en"));
            }
            log::info!("migrated session snapshot from version 0");
            Ok(state)
        }
        SNAPSHOT_VERSION => Ok(state),
        other => Err(GameError::Validation(format!(
            "unsupported session snapshot version {other}"
        ))),
    }
}

/// Persistence adapter for session snapshots.
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<Option<SessionSnapshot>, GameError>;
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), GameError>;
}

/// Stores the snapshot in the `app_settings` table.
#[derive(Clone)]
pub struct SqliteSnapshotStore {
    pool: DbPool,
}

impl SqliteSnapshotStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn load(&self) -> Result<Option<SessionSnapshot>, GameError> {
        let conn = self.pool.get()?;
        read_raw(&conn)?.map(|raw| decode_snapshot(&raw)).transpose()
    }

    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), GameError> {
        let conn = self.pool.get()?;
        write_raw(&conn, &encode_snapshot(snapshot)?)
    }
}

fn read_raw(conn: &Connection) -> Result<Option<String>, GameError> {
    Ok(conn
        .query_row(
            "SELECT value FROM app_settings WHERE key = ?1",
            params![SNAPSHOT_KEY],
            |row| row.get(0),
        )
        .optional()?)
}

fn write_raw(conn: &Connection, value: &str) -> Result<(), GameError> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO app_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![SNAPSHOT_KEY, value, now],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_db;

    #[test]
    fn version_zero_gains_difficulty_and_language() {
        let raw = r#"{"version":0,"state":{"playerNames":["Ana","Bo","Cy","Di"],"customCategories":["dinosaurs"],"gameState":{"totalPlayers":4,"impostorCount":1,"selectedCategories":["dinosaurs"],"showHintsToImpostors":false}}}"#;
        let snapshot = decode_snapshot(raw).unwrap();
        assert_eq!(snapshot.game_state.difficulty, Difficulty::Medium);
        assert_eq!(snapshot.game_state.language, Language::En);
        assert_eq!(snapshot.game_state.total_players, 4);
        assert!(!snapshot.game_state.show_hints_to_impostors);
        assert_eq!(snapshot.custom_categories, vec!["dinosaurs".to_string()]);
    }

    #[test]
    fn future_versions_are_rejected() {
        let raw = r#"{"version":7,"state":{}}"#;
        assert!(matches!(decode_snapshot(raw), Err(GameError::Validation(_))));
    }

    #[test]
    fn sqlite_store_overwrites_previous_snapshot() {
        let store = SqliteSnapshotStore::new(init_memory_db().unwrap());
        assert_eq!(store.load().unwrap(), None);

        let mut snapshot = SessionSnapshot::default();
        store.save(&snapshot).unwrap();
        snapshot.game_state.language = Language::Sv;
        snapshot.player_names = vec!["Ana".into()];
        store.save(&snapshot).unwrap();

        assert_eq!(store.load().unwrap(), Some(snapshot));
    }
}
