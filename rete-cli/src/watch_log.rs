//! Persisted watch trace, repurposing the teacher's sqlite-backed
//! `event_log` idiom (open/append/query) as the sink for CLIPS-style
//! `watch` categories instead of incident ids (SPEC_FULL ambient stack).

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchCategory {
    Facts,
    Rules,
    Activations,
    Compilations,
    Statistics,
}

impl WatchCategory {
    pub fn from_item(item: rete_core::WatchItem) -> Option<Self> {
        match item {
            rete_core::WatchItem::Facts => Some(WatchCategory::Facts),
            rete_core::WatchItem::Rules => Some(WatchCategory::Rules),
            rete_core::WatchItem::Activations => Some(WatchCategory::Activations),
            rete_core::WatchItem::Compilations => Some(WatchCategory::Compilations),
            rete_core::WatchItem::Statistics => Some(WatchCategory::Statistics),
            rete_core::WatchItem::All => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum WatchKind {
    Assert,
    Retract,
    Modify,
    Duplicate,
    Fire,
    Activate,
    Deactivate,
    Compile,
    Stat,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchEntry {
    pub id: Option<i64>,
    pub category: WatchCategory,
    pub kind: WatchKind,
    pub description: String,
    pub details: Option<serde_json::Value>,
    pub timestamp: String,
}

#[derive(Clone)]
pub struct WatchLog {
    db_path: Arc<PathBuf>,
}

impl WatchLog {
    pub fn open(path: &str) -> Result<Self, String> {
        let db_path = PathBuf::from(path);
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
        }

        let conn = Connection::open(&db_path).map_err(|e| e.to_string())?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            CREATE TABLE IF NOT EXISTS watch_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category TEXT NOT NULL,
                kind TEXT NOT NULL,
                description TEXT NOT NULL,
                details TEXT,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_watch_category ON watch_entries(category);
            CREATE INDEX IF NOT EXISTS idx_watch_ts ON watch_entries(timestamp);
            ",
        )
        .map_err(|e| e.to_string())?;

        Ok(Self {
            db_path: Arc::new(db_path),
        })
    }

    pub fn record(
        &self,
        category: WatchCategory,
        kind: WatchKind,
        description: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Result<i64, String> {
        let conn = Connection::open(&*self.db_path).map_err(|e| e.to_string())?;
        let category_str = serde_json::to_string(&category).map_err(|e| e.to_string())?;
        let kind_str = serde_json::to_string(&kind).map_err(|e| e.to_string())?;
        let details_str = details
            .as_ref()
            .map(|d| serde_json::to_string(d).map_err(|e| e.to_string()))
            .transpose()?;
        let timestamp = chrono::Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO watch_entries (category, kind, description, details, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![category_str, kind_str, description.into(), details_str, timestamp],
        )
        .map_err(|e| e.to_string())?;

        Ok(conn.last_insert_rowid())
    }

    pub fn entries_for_category(&self, category: WatchCategory) -> Result<Vec<WatchEntry>, String> {
        let conn = Connection::open(&*self.db_path).map_err(|e| e.to_string())?;
        let category_str = serde_json::to_string(&category).map_err(|e| e.to_string())?;
        let mut stmt = conn
            .prepare(
                "SELECT id, category, kind, description, details, timestamp
                 FROM watch_entries
                 WHERE category = ?1
                 ORDER BY id ASC",
            )
            .map_err(|e| e.to_string())?;

        let rows = stmt
            .query_map(params![category_str], map_row)
            .map_err(|e| e.to_string())?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| e.to_string())?);
        }
        Ok(entries)
    }

    pub fn entries_after(&self, after_id: i64) -> Result<Vec<WatchEntry>, String> {
        let conn = Connection::open(&*self.db_path).map_err(|e| e.to_string())?;
        let mut stmt = conn
            .prepare(
                "SELECT id, category, kind, description, details, timestamp
                 FROM watch_entries
                 WHERE id > ?1
                 ORDER BY id ASC",
            )
            .map_err(|e| e.to_string())?;

        let rows = stmt
            .query_map(params![after_id], map_row)
            .map_err(|e| e.to_string())?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| e.to_string())?);
        }
        Ok(entries)
    }

    pub fn latest_entry_id(&self) -> Result<Option<i64>, String> {
        let conn = Connection::open(&*self.db_path).map_err(|e| e.to_string())?;
        conn.query_row("SELECT MAX(id) FROM watch_entries", [], |row| {
            row.get::<_, Option<i64>>(0)
        })
        .optional()
        .map_err(|e| e.to_string())
        .map(|v| v.flatten())
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WatchEntry> {
    let category_str: String = row.get(1)?;
    let kind_str: String = row.get(2)?;
    let details_str: Option<String> = row.get(4)?;

    let category: WatchCategory = serde_json::from_str(&category_str).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(err))
    })?;
    let kind: WatchKind = serde_json::from_str(&kind_str).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(err))
    })?;
    let details = details_str
        .map(|s| {
            serde_json::from_str(&s).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(err))
            })
        })
        .transpose()?;

    Ok(WatchEntry {
        id: row.get(0)?,
        category,
        kind,
        description: row.get(3)?,
        details,
        timestamp: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_path(name: &str) -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        format!("/tmp/rete-cli-tests/{name}-{nanos}.db")
    }

    #[test]
    fn record_and_query_roundtrip() {
        let log = WatchLog::open(&db_path("roundtrip")).expect("open");
        let id = log
            .record(
                WatchCategory::Facts,
                WatchKind::Assert,
                "assert p",
                Some(serde_json::json!({"fact": 1})),
            )
            .expect("record");
        assert!(id > 0);

        let entries = log.entries_for_category(WatchCategory::Facts).expect("entries");
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0].kind, WatchKind::Assert));
        assert_eq!(entries[0].details, Some(serde_json::json!({"fact": 1})));
    }

    #[test]
    fn entries_after_tracks_incremental_stream() {
        let log = WatchLog::open(&db_path("after")).expect("open");
        let a = log
            .record(WatchCategory::Facts, WatchKind::Assert, "assert p", None)
            .expect("record a");
        let b = log
            .record(WatchCategory::Rules, WatchKind::Fire, "fire R", None)
            .expect("record b");

        let entries = log.entries_after(a).expect("entries after");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, Some(b));
    }

    #[test]
    fn category_filter_excludes_other_categories() {
        let log = WatchLog::open(&db_path("filter")).expect("open");
        log.record(WatchCategory::Facts, WatchKind::Assert, "a", None)
            .expect("record");
        log.record(WatchCategory::Rules, WatchKind::Fire, "b", None)
            .expect("record");

        let facts = log.entries_for_category(WatchCategory::Facts).expect("entries");
        assert_eq!(facts.len(), 1);
        assert!(matches!(facts[0].kind, WatchKind::Assert));
    }
}
