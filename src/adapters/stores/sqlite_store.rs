use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::core::errors::{Result, TrailError};
use crate::core::models::entity_ref::{EntityId, EntityKind, EntityRef};
use crate::core::models::entry::{
    AssignMode, Entry, EntryId, Insertion, NewEntry, RetargetScope, Target,
};
use crate::core::models::query::Predicate;
use crate::core::services::query_planner::QueryPlan;
use crate::core::traits::entry_store::EntryStore;

const SCHEMA_SQL: &str = "\
CREATE TABLE IF NOT EXISTS trail_entry (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts_seconds INTEGER NOT NULL,
    ts_nanos INTEGER NOT NULL,
    event_type TEXT NOT NULL,
    message TEXT NOT NULL,
    data TEXT,
    external_key TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_entry_external_key
    ON trail_entry(event_type, external_key);
CREATE INDEX IF NOT EXISTS idx_entry_timestamp
    ON trail_entry(ts_seconds DESC, ts_nanos DESC, id DESC);

CREATE TABLE IF NOT EXISTS trail_target (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id INTEGER NOT NULL REFERENCES trail_entry(id) ON DELETE CASCADE,
    relation_name TEXT NOT NULL,
    related_kind TEXT NOT NULL,
    related_id TEXT NOT NULL,
    UNIQUE (entry_id, relation_name)
);
CREATE INDEX IF NOT EXISTS idx_target_entry ON trail_target(entry_id);
CREATE INDEX IF NOT EXISTS idx_target_related ON trail_target(related_kind, related_id);
";

const ENTRY_COLUMNS: &str =
    "e.id, e.ts_seconds, e.ts_nanos, e.event_type, e.message, e.data, e.external_key";

/// SQLite keeps at most 32766 bound parameters per statement.
const ID_CHUNK: usize = 500;

impl From<rusqlite::Error> for TrailError {
    fn from(e: rusqlite::Error) -> Self {
        Self::StorageFailure {
            detail: format!("sqlite: {e}"),
        }
    }
}

/// Entry store backed by an SQLite database.
///
/// Entries live in `trail_entry`, targets in `trail_target`. Every
/// multi-row write runs in its own transaction, rolled back on any early
/// return. The `(event_type, external_key)` unique index makes the
/// idempotent insert a single conditional statement.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating the schema if
    /// needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        // WAL lets readers proceed while a writer holds the database.
        if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
            tracing::debug!(error = %e, "could not switch sqlite journal to WAL");
        }
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Private database that disappears with the store.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA_SQL)?;

        tracing::debug!(path = ?path, "sqlite entry store ready");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| TrailError::StorageFailure {
            detail: "sqlite connection lock poisoned".into(),
        })
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

// ─── Encoding ────────────────────────────────────────────────────────

/// `(seconds, nanoseconds)` since the Unix epoch. Covers the whole
/// `DateTime<Utc>` range and sorts as a row value.
fn encode_timestamp(ts: &DateTime<Utc>) -> (i64, i64) {
    (ts.timestamp(), i64::from(ts.timestamp_subsec_nanos()))
}

fn decode_timestamp(seconds: i64, nanos: i64) -> rusqlite::Result<DateTime<Utc>> {
    let nanos =
        u32::try_from(nanos).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(2, nanos))?;
    DateTime::from_timestamp(seconds, nanos)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(1, seconds))
}

/// Sets of references travel as one JSON parameter, `[[kind, id], ...]`,
/// unpacked with `json_each`, so their size is bounded by neither the
/// bound-parameter limit nor the expression depth.
fn encode_reference_set<'a>(references: impl IntoIterator<Item = &'a EntityRef>) -> Result<String> {
    let pairs = references
        .into_iter()
        .map(|r| -> Result<(&str, String)> { Ok((r.kind.as_str(), encode_entity_id(&r.id)?)) })
        .collect::<Result<Vec<_>>>()?;
    serde_json::to_string(&pairs).map_err(|e| TrailError::StorageFailure {
        detail: format!("cannot encode reference set: {e}"),
    })
}

fn encode_entity_id(id: &EntityId) -> Result<String> {
    serde_json::to_string(id).map_err(|e| TrailError::StorageFailure {
        detail: format!("cannot encode entity id {id}: {e}"),
    })
}

fn sql_id(id: EntryId) -> Result<i64> {
    i64::try_from(id.0).map_err(|_| TrailError::StorageFailure {
        detail: format!("entry id {id} out of range for sqlite"),
    })
}

fn conversion_error(
    column: usize,
    ty: Type,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, ty, Box::new(e))
}

fn decode_entry_id(raw: i64, column: usize) -> rusqlite::Result<EntryId> {
    u64::try_from(raw)
        .map(EntryId)
        .map_err(|e| conversion_error(column, Type::Integer, e))
}

/// Reconstruct an `Entry` (without targets) from a row of `ENTRY_COLUMNS`.
fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entry> {
    let id = decode_entry_id(row.get(0)?, 0)?;

    let timestamp = decode_timestamp(row.get(1)?, row.get(2)?)?;

    let data: Option<String> = row.get(5)?;
    let data = data
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| conversion_error(5, Type::Text, e))?;

    Ok(Entry {
        id,
        timestamp,
        event_type: row.get(3)?,
        message: row.get(4)?,
        data,
        external_key: row.get(6)?,
        targets: Vec::new(),
    })
}

/// Reconstruct a `Target` from `entry_id, relation_name, related_kind, related_id`.
fn row_to_target(row: &rusqlite::Row<'_>) -> rusqlite::Result<Target> {
    let entry_id = decode_entry_id(row.get(0)?, 0)?;
    let kind: String = row.get(2)?;
    let id: String = row.get(3)?;
    let id: EntityId = serde_json::from_str(&id).map_err(|e| conversion_error(3, Type::Text, e))?;

    Ok(Target {
        entry_id,
        relation_name: row.get(1)?,
        reference: EntityRef {
            kind: EntityKind::new(kind),
            id,
        },
    })
}

// ─── Reads ───────────────────────────────────────────────────────────

fn entry_exists(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM trail_entry WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )?)
}

fn load_entry(conn: &Connection, id: i64) -> Result<Option<Entry>> {
    let entry = conn
        .query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM trail_entry e WHERE e.id = ?1"),
            params![id],
            row_to_entry,
        )
        .optional()?;

    let Some(mut entry) = entry else {
        return Ok(None);
    };
    entry.targets = load_targets(conn, id)?;
    Ok(Some(entry))
}

fn load_targets(conn: &Connection, id: i64) -> Result<Vec<Target>> {
    let mut stmt = conn.prepare_cached(
        "SELECT entry_id, relation_name, related_kind, related_id
         FROM trail_target WHERE entry_id = ?1 ORDER BY id",
    )?;
    let targets = stmt
        .query_map(params![id], row_to_target)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(targets)
}

/// Attach targets to a batch of entries with one query per chunk of ids.
fn attach_targets(conn: &Connection, entries: &mut [Entry]) -> Result<()> {
    let mut by_entry: HashMap<EntryId, Vec<Target>> = HashMap::new();

    let ids = entries.iter().map(|e| sql_id(e.id)).collect::<Result<Vec<_>>>()?;
    for chunk in ids.chunks(ID_CHUNK) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "SELECT entry_id, relation_name, related_kind, related_id
             FROM trail_target WHERE entry_id IN ({placeholders}) ORDER BY id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk.iter()), row_to_target)?;
        for target in rows {
            let target = target?;
            by_entry.entry(target.entry_id).or_default().push(target);
        }
    }

    for entry in entries.iter_mut() {
        entry.targets = by_entry.remove(&entry.id).unwrap_or_default();
    }
    Ok(())
}

// ─── Query compilation ───────────────────────────────────────────────

/// Compile a normalized predicate into a `WHERE` fragment over
/// `trail_entry e`.
///
/// Each `RelatedTo` becomes its own `EXISTS` over `trail_target`, so an
/// AND of relations needs one matching target row per operand and an
/// entry is selected at most once however many targets match.
fn compile(predicate: &Predicate, sql: &mut String, params: &mut Vec<Value>) -> Result<()> {
    match predicate {
        Predicate::True => sql.push('1'),
        Predicate::False => sql.push('0'),
        Predicate::RelatedTo(related) if related.references.is_empty() => sql.push('0'),
        Predicate::RelatedTo(related) => {
            sql.push_str("EXISTS (SELECT 1 FROM trail_target t WHERE t.entry_id = e.id AND ");
            match related.references.first() {
                Some(reference) if related.references.len() == 1 => {
                    sql.push_str("t.related_kind = ? AND t.related_id = ?");
                    params.push(Value::Text(reference.kind.to_string()));
                    params.push(Value::Text(encode_entity_id(&reference.id)?));
                }
                _ => {
                    sql.push_str(
                        "(t.related_kind, t.related_id) IN (\
                         SELECT json_extract(value, '$[0]'), json_extract(value, '$[1]') \
                         FROM json_each(?))",
                    );
                    params.push(Value::Text(encode_reference_set(&related.references)?));
                }
            }
            if let Some(name) = &related.relation {
                sql.push_str(" AND t.relation_name = ?");
                params.push(Value::Text(name.clone()));
            }
            sql.push(')');
        }
        Predicate::EventType(event_type) => {
            sql.push_str("e.event_type = ?");
            params.push(Value::Text(event_type.clone()));
        }
        Predicate::EventTypePrefix(prefix) => {
            sql.push_str("substr(e.event_type, 1, length(?)) = ?");
            params.push(Value::Text(prefix.clone()));
            params.push(Value::Text(prefix.clone()));
        }
        Predicate::Since(instant) => {
            let (seconds, nanos) = encode_timestamp(instant);
            sql.push_str("(e.ts_seconds, e.ts_nanos) >= (?, ?)");
            params.extend([Value::Integer(seconds), Value::Integer(nanos)]);
        }
        Predicate::Until(instant) => {
            let (seconds, nanos) = encode_timestamp(instant);
            sql.push_str("(e.ts_seconds, e.ts_nanos) < (?, ?)");
            params.extend([Value::Integer(seconds), Value::Integer(nanos)]);
        }
        Predicate::MessageContains(needle) => {
            sql.push_str("instr(e.message, ?) > 0");
            params.push(Value::Text(needle.clone()));
        }
        Predicate::And(items) => compile_connective(items, " AND ", '1', sql, params)?,
        Predicate::Or(items) => compile_connective(items, " OR ", '0', sql, params)?,
        Predicate::Not(inner) => {
            sql.push_str("NOT (");
            compile(inner, sql, params)?;
            sql.push(')');
        }
    }
    Ok(())
}

fn compile_connective(
    items: &[Predicate],
    joiner: &str,
    empty: char,
    sql: &mut String,
    params: &mut Vec<Value>,
) -> Result<()> {
    if items.is_empty() {
        sql.push(empty);
        return Ok(());
    }
    sql.push('(');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            sql.push_str(joiner);
        }
        compile(item, sql, params)?;
    }
    sql.push(')');
    Ok(())
}

// ─── EntryStore ──────────────────────────────────────────────────────

impl EntryStore for SqliteStore {
    fn insert_entry(&self, entry: &NewEntry) -> Result<Insertion> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let timestamp = entry.timestamp.unwrap_or_else(Utc::now);
        let data = entry
            .data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| TrailError::StorageFailure {
                detail: format!("cannot encode entry data: {e}"),
            })?;

        let (seconds, nanos) = encode_timestamp(&timestamp);
        let inserted = tx.execute(
            "INSERT INTO trail_entry (ts_seconds, ts_nanos, event_type, message, data, external_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (event_type, external_key) DO NOTHING",
            params![
                seconds,
                nanos,
                entry.event_type,
                entry.message,
                data,
                entry.external_key,
            ],
        )?;

        if inserted == 0 {
            // Only the external key index can swallow an insert.
            let existing_id: i64 = tx.query_row(
                "SELECT id FROM trail_entry WHERE event_type = ?1 AND external_key = ?2",
                params![entry.event_type, entry.external_key],
                |row| row.get(0),
            )?;
            let existing = load_entry(&tx, existing_id)?.ok_or_else(|| TrailError::StorageFailure {
                detail: format!("entry {existing_id} vanished during insert"),
            })?;
            return Ok(Insertion::Existing(existing));
        }

        let id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO trail_target (entry_id, relation_name, related_kind, related_id)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (relation_name, reference) in &entry.targets {
                stmt.execute(params![
                    id,
                    relation_name,
                    reference.kind.as_str(),
                    encode_entity_id(&reference.id)?,
                ])?;
            }
        }
        tx.commit()?;

        let id = decode_entry_id(id, 0)?;
        Ok(Insertion::Created(entry.clone().into_entry(id, timestamp)))
    }

    fn get_entry(&self, id: EntryId) -> Result<Option<Entry>> {
        let conn = self.lock()?;
        load_entry(&conn, sql_id(id)?)
    }

    fn upsert_target(
        &self,
        id: EntryId,
        relation_name: &str,
        reference: &EntityRef,
        mode: AssignMode,
    ) -> Result<Target> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let raw_id = sql_id(id)?;

        if !entry_exists(&tx, raw_id)? {
            return Err(TrailError::EntryNotFound { id });
        }

        let on_conflict = match mode {
            AssignMode::Replace => {
                "DO UPDATE SET related_kind = excluded.related_kind, related_id = excluded.related_id"
            }
            AssignMode::NoReplace => "DO NOTHING",
        };
        let written = tx.execute(
            &format!(
                "INSERT INTO trail_target (entry_id, relation_name, related_kind, related_id)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (entry_id, relation_name) {on_conflict}"
            ),
            params![
                raw_id,
                relation_name,
                reference.kind.as_str(),
                encode_entity_id(&reference.id)?,
            ],
        )?;

        if written == 0 {
            return Err(TrailError::DuplicateTarget {
                entry_id: id,
                relation_name: relation_name.to_string(),
            });
        }
        tx.commit()?;

        Ok(Target {
            entry_id: id,
            relation_name: relation_name.to_string(),
            reference: reference.clone(),
        })
    }

    fn entry_targets(&self, id: EntryId) -> Result<Vec<Target>> {
        let conn = self.lock()?;
        let raw_id = sql_id(id)?;
        if !entry_exists(&conn, raw_id)? {
            return Err(TrailError::EntryNotFound { id });
        }
        load_targets(&conn, raw_id)
    }

    fn retarget(&self, old: &EntityRef, new: &EntityRef, scope: &RetargetScope) -> Result<usize> {
        let conn = self.lock()?;

        let mut sql = String::from(
            "UPDATE trail_target SET related_kind = ?, related_id = ?
             WHERE related_kind = ? AND related_id = ?",
        );
        let mut values = vec![
            Value::Text(new.kind.to_string()),
            Value::Text(encode_entity_id(&new.id)?),
            Value::Text(old.kind.to_string()),
            Value::Text(encode_entity_id(&old.id)?),
        ];

        match scope {
            RetargetScope::All => {}
            RetargetScope::Entries(ids) if ids.is_empty() => return Ok(0),
            RetargetScope::Entries(ids) => {
                let ids = ids.iter().map(|id| sql_id(*id)).collect::<Result<Vec<_>>>()?;
                let ids = serde_json::to_string(&ids).map_err(|e| TrailError::StorageFailure {
                    detail: format!("cannot encode entry ids: {e}"),
                })?;
                sql.push_str(" AND entry_id IN (SELECT value FROM json_each(?))");
                values.push(Value::Text(ids));
            }
        }

        // One statement, so the rewrite is atomic without a transaction.
        Ok(conn.execute(&sql, params_from_iter(values))?)
    }

    fn find(&self, plan: &QueryPlan) -> Result<Vec<Entry>> {
        let mut sql = format!("SELECT {ENTRY_COLUMNS} FROM trail_entry e WHERE ");
        let mut values = Vec::new();
        compile(&plan.predicate, &mut sql, &mut values)?;
        sql.push_str(" ORDER BY e.ts_seconds DESC, e.ts_nanos DESC, e.id DESC");
        if let Some(limit) = plan.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        }
        tracing::trace!(%sql, "sqlite find");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut entries = stmt
            .query_map(params_from_iter(values), row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        attach_targets(&conn, &mut entries)?;
        Ok(entries)
    }

    fn delete_entry(&self, id: EntryId) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let raw_id = sql_id(id)?;

        tx.execute("DELETE FROM trail_target WHERE entry_id = ?1", params![raw_id])?;
        let deleted = tx.execute("DELETE FROM trail_entry WHERE id = ?1", params![raw_id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }
}
