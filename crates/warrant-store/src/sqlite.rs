//! SQLite-backed store

use crate::StoreError;
use rusqlite::types::{ToSql, Value};
use rusqlite::{params, Connection, OptionalExtension, Row};
use semver::Version;
use std::path::Path;
use warrant_domain::traits::{
    DecisionQuery, DecisionStore, PolicyQuery, PolicyStore, ProvenanceStore, Store,
};
use warrant_domain::{
    Decision, DecisionId, DecisionStatus, Policy, PolicyId, ProvenanceEntry, ProvenanceId,
    ScannedEntry, SourceType, Timestamp, UndecodableEntry,
};

const ENTRY_COLUMNS: &str = "id, source_type, source_id, action, timestamp, input_refs, output_refs, metadata, hash, previous_hash";

/// SQLite-based implementation of the decision, ledger and policy stores
///
/// Decisions and policies are kept as JSON bodies next to the columns that
/// queries filter on. Ledger entries are stored column by column so that
/// every hashed field is individually visible to auditors.
///
/// # Thread Safety
///
/// SQLite connections are not thread-safe. Each thread should have its own
/// `SqliteStore` instance; SQLite serializes their writes.
pub struct SqliteStore {
    conn: Connection,
    in_transaction: bool,
}

impl SqliteStore {
    /// Open (or create) a store at `path`
    ///
    /// Use `:memory:` for an in-memory database (useful for testing).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use warrant_store::SqliteStore;
    ///
    /// let store = SqliteStore::new("warrant.db").unwrap();
    /// ```
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let mut store = Self {
            conn,
            in_transaction: false,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&mut self) -> Result<(), StoreError> {
        let schema = include_str!("schema.sql");
        self.conn.execute_batch(schema)?;
        Ok(())
    }

    fn now() -> i64 {
        Timestamp::now().as_millis() as i64
    }

    fn decode_decisions(bodies: Vec<String>) -> Result<Vec<Decision>, StoreError> {
        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }

    /// Build the WHERE clause shared by decision queries and counts
    fn decision_filter(query: &DecisionQuery) -> (String, Vec<Box<dyn ToSql>>) {
        let mut sql = String::from(" WHERE 1=1");
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if !query.statuses.is_empty() {
            let placeholders = vec!["?"; query.statuses.len()].join(", ");
            sql.push_str(&format!(" AND status IN ({})", placeholders));
            for status in &query.statuses {
                params.push(Box::new(status.as_str().to_string()));
            }
        }

        if let Some(decision_type) = &query.decision_type {
            sql.push_str(" AND decision_type = ?");
            params.push(Box::new(decision_type.clone()));
        }

        if let Some(proposed_by) = &query.proposed_by {
            sql.push_str(" AND proposed_by = ?");
            params.push(Box::new(proposed_by.clone()));
        }

        (sql, params)
    }

    fn read_entry(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
        Ok(RawEntry {
            id: row.get(0)?,
            source_type: row.get(1)?,
            source_id: row.get(2)?,
            action: row.get(3)?,
            timestamp: row.get(4)?,
            input_refs: row.get(5)?,
            output_refs: row.get(6)?,
            metadata: row.get(7)?,
            hash: row.get(8)?,
            previous_hash: row.get(9)?,
        })
    }
}

/// Ledger row as stored, before conversion into the domain type
///
/// Columns are read untyped so that a row edited outside the store can
/// still be reported rather than failing the whole read.
struct RawEntry {
    id: Value,
    source_type: Value,
    source_id: Value,
    action: Value,
    timestamp: Value,
    input_refs: Value,
    output_refs: Value,
    metadata: Value,
    hash: Value,
    previous_hash: Value,
}

impl RawEntry {
    fn decode(&self) -> Result<ProvenanceEntry, String> {
        let id = ProvenanceId::from_string(&text(&self.id, "id")?)?;
        let source_type = text(&self.source_type, "source_type")?;
        let source_type = SourceType::parse(&source_type)
            .ok_or_else(|| format!("Unknown source type: {}", source_type))?;
        let timestamp = match self.timestamp {
            Value::Integer(millis) if millis >= 0 => Timestamp::from_millis(millis as u64),
            ref other => return Err(format!("timestamp is not a valid time: {}", rendered(other))),
        };

        Ok(ProvenanceEntry {
            id,
            source_type,
            source_id: text(&self.source_id, "source_id")?,
            action: text(&self.action, "action")?,
            timestamp,
            input_refs: json(&self.input_refs, "input_refs")?,
            output_refs: json(&self.output_refs, "output_refs")?,
            metadata: json(&self.metadata, "metadata")?,
            hash: text(&self.hash, "hash")?,
            previous_hash: text(&self.previous_hash, "previous_hash")?,
        })
    }

    /// Decode the row, keeping its chain columns when decoding fails
    fn scanned(self) -> ScannedEntry {
        match self.decode() {
            Ok(entry) => ScannedEntry::Entry(entry),
            Err(reason) => ScannedEntry::Undecodable(UndecodableEntry {
                id: rendered(&self.id),
                hash: rendered(&self.hash),
                previous_hash: rendered(&self.previous_hash),
                reason,
            }),
        }
    }
}

impl TryFrom<RawEntry> for ProvenanceEntry {
    type Error = StoreError;

    fn try_from(raw: RawEntry) -> Result<Self, Self::Error> {
        raw.decode().map_err(StoreError::InvalidData)
    }
}

fn text(value: &Value, column: &str) -> Result<String, String> {
    match value {
        Value::Text(s) => Ok(s.clone()),
        other => Err(format!("{} is not text: {}", column, rendered(other))),
    }
}

fn json<T: serde::de::DeserializeOwned>(value: &Value, column: &str) -> Result<T, String> {
    let body = text(value, column)?;
    serde_json::from_str(&body).map_err(|e| format!("{} is not valid JSON: {}", column, e))
}

/// Column value as stored, rendered as text
fn rendered(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

impl Store for SqliteStore {
    type Error = StoreError;

    fn transaction<T, E, F>(&mut self, f: F) -> Result<Result<T, E>, Self::Error>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        // Nested calls join the outer transaction
        if self.in_transaction {
            return Ok(f(self));
        }

        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        self.in_transaction = true;
        let result = f(self);
        self.in_transaction = false;

        match result {
            Ok(value) => {
                if let Err(e) = self.conn.execute_batch("COMMIT") {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    return Err(e.into());
                }
                Ok(Ok(value))
            }
            Err(e) => {
                self.conn.execute_batch("ROLLBACK")?;
                Ok(Err(e))
            }
        }
    }
}

impl DecisionStore for SqliteStore {
    fn insert_decision(&mut self, decision: &Decision) -> Result<(), Self::Error> {
        let id = decision.id.to_string();

        let exists: bool = self
            .conn
            .query_row("SELECT 1 FROM decisions WHERE id = ?1", params![&id], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        if exists {
            return Err(StoreError::Duplicate(format!("decision {}", id)));
        }

        self.conn.execute(
            "INSERT INTO decisions (id, decision_type, status, risk_level, proposed_by, proposed_at, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &id,
                &decision.decision_type,
                decision.status.as_str(),
                decision.risk_level.as_str(),
                &decision.proposed_by,
                decision.proposed_at.as_millis() as i64,
                serde_json::to_string(decision)?,
                Self::now(),
            ],
        )?;
        Ok(())
    }

    fn update_decision(
        &mut self,
        decision: &Decision,
        expected_status: DecisionStatus,
    ) -> Result<(), Self::Error> {
        let id = decision.id.to_string();
        let changed = self.conn.execute(
            "UPDATE decisions SET status = ?1, risk_level = ?2, body = ?3
             WHERE id = ?4 AND status = ?5",
            params![
                decision.status.as_str(),
                decision.risk_level.as_str(),
                serde_json::to_string(decision)?,
                &id,
                expected_status.as_str(),
            ],
        )?;

        if changed == 1 {
            return Ok(());
        }

        let actual: Option<String> = self
            .conn
            .query_row("SELECT status FROM decisions WHERE id = ?1", params![&id], |row| row.get(0))
            .optional()?;
        match actual {
            None => Err(StoreError::NotFound(format!("decision {}", id))),
            Some(actual) => Err(StoreError::Conflict {
                id,
                expected: expected_status.as_str().to_string(),
                actual,
            }),
        }
    }

    fn get_decision(&self, id: DecisionId) -> Result<Option<Decision>, Self::Error> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM decisions WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn query_decisions(&self, query: &DecisionQuery) -> Result<Vec<Decision>, Self::Error> {
        let (filter, mut params) = Self::decision_filter(query);
        let mut sql = format!(
            "SELECT body FROM decisions{} ORDER BY proposed_at DESC, id DESC",
            filter
        );
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            params.push(Box::new(limit as i64));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let bodies = stmt
            .query_map(&param_refs[..], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut decisions = Self::decode_decisions(bodies)?;
        decisions.reverse();
        Ok(decisions)
    }

    fn count_decisions(&self, query: &DecisionQuery) -> Result<usize, Self::Error> {
        let (filter, params) = Self::decision_filter(query);
        let sql = format!("SELECT COUNT(*) FROM decisions{}", filter);
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let count: i64 = self.conn.query_row(&sql, &param_refs[..], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl ProvenanceStore for SqliteStore {
    fn append_entry(&mut self, entry: &ProvenanceEntry) -> Result<u64, Self::Error> {
        let claimed: bool = self
            .conn
            .query_row(
                "SELECT 1 FROM provenance WHERE previous_hash = ?1",
                params![&entry.previous_hash],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if claimed {
            return Err(StoreError::ChainConflict(entry.previous_hash.clone()));
        }

        self.conn.execute(
            "INSERT INTO provenance (id, source_type, source_id, action, timestamp, input_refs, output_refs, metadata, hash, previous_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                entry.id.to_string(),
                entry.source_type.as_str(),
                &entry.source_id,
                &entry.action,
                entry.timestamp.as_millis() as i64,
                serde_json::to_string(&entry.input_refs)?,
                serde_json::to_string(&entry.output_refs)?,
                serde_json::to_string(&entry.metadata)?,
                &entry.hash,
                &entry.previous_hash,
                Self::now(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid() as u64)
    }

    fn get_entry(&self, id: ProvenanceId) -> Result<Option<ProvenanceEntry>, Self::Error> {
        let sql = format!("SELECT {} FROM provenance WHERE id = ?1", ENTRY_COLUMNS);
        let raw = self
            .conn
            .query_row(&sql, params![id.to_string()], Self::read_entry)
            .optional()?;
        raw.map(ProvenanceEntry::try_from).transpose()
    }

    fn last_entry(&self) -> Result<Option<ProvenanceEntry>, Self::Error> {
        let sql = format!("SELECT {} FROM provenance ORDER BY seq DESC LIMIT 1", ENTRY_COLUMNS);
        let raw = self.conn.query_row(&sql, [], Self::read_entry).optional()?;
        raw.map(ProvenanceEntry::try_from).transpose()
    }

    fn scan_entries(&self, offset: u64, limit: usize) -> Result<Vec<ScannedEntry>, Self::Error> {
        let sql = format!(
            "SELECT {} FROM provenance ORDER BY seq ASC LIMIT ?1 OFFSET ?2",
            ENTRY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit as i64, offset as i64], Self::read_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().map(RawEntry::scanned).collect())
    }

    fn count_entries(&self) -> Result<u64, Self::Error> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM provenance", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl PolicyStore for SqliteStore {
    fn upsert_policy(&mut self, policy: &Policy) -> Result<(), Self::Error> {
        let now = Self::now();
        self.conn.execute(
            "INSERT INTO policies (id, version, status, priority, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(id, version) DO UPDATE SET
             status = excluded.status, priority = excluded.priority,
             body = excluded.body, updated_at = excluded.updated_at",
            params![
                policy.id.as_str(),
                policy.version.to_string(),
                policy.status.as_str(),
                policy.priority as i64,
                serde_json::to_string(policy)?,
                now,
            ],
        )?;
        Ok(())
    }

    fn get_policy(&self, id: &PolicyId, version: &Version) -> Result<Option<Policy>, Self::Error> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM policies WHERE id = ?1 AND version = ?2",
                params![id.as_str(), version.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn query_policies(&self, query: &PolicyQuery) -> Result<Vec<Policy>, Self::Error> {
        let mut sql = String::from("SELECT body FROM policies WHERE 1=1");
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(id) = &query.id {
            sql.push_str(" AND id = ?");
            params.push(Box::new(id.as_str().to_string()));
        }

        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            params.push(Box::new(status.as_str().to_string()));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let bodies = stmt
            .query_map(&param_refs[..], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut policies = bodies
            .iter()
            .map(|body| serde_json::from_str::<Policy>(body).map_err(StoreError::from))
            .collect::<Result<Vec<_>, _>>()?;
        // Text ordering of versions is wrong ("1.10.0" < "1.9.0"), so sort here
        policies.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.version.cmp(&b.version)));
        Ok(policies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warrant_domain::{NewDecision, PolicyStatus, GENESIS_HASH};

    #[test]
    fn test_schema_initializes_twice() {
        let mut store = SqliteStore::new(":memory:").unwrap();
        assert!(store.initialize_schema().is_ok());
    }

    #[test]
    fn test_status_filter_uses_wire_strings() {
        let mut store = SqliteStore::new(":memory:").unwrap();
        let decision =
            Decision::propose(NewDecision::new("refund", "Refund", "agent:a"), Timestamp::now()).unwrap();
        store.insert_decision(&decision).unwrap();

        let status: String = store
            .conn
            .query_row("SELECT status FROM decisions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(status, "proposed");
    }

    #[test]
    fn test_corrupt_source_type_is_invalid_data() {
        let mut store = SqliteStore::new(":memory:").unwrap();
        let entry = ProvenanceEntry {
            id: ProvenanceId::new(),
            source_type: SourceType::System,
            source_id: "system".into(),
            action: "boot".into(),
            timestamp: Timestamp::from_millis(1),
            input_refs: vec![],
            output_refs: vec![],
            metadata: Default::default(),
            hash: "abc".into(),
            previous_hash: GENESIS_HASH.into(),
        };
        store.append_entry(&entry).unwrap();
        store
            .conn
            .execute("UPDATE provenance SET source_type = 'robot'", [])
            .unwrap();

        assert!(matches!(store.last_entry(), Err(StoreError::InvalidData(_))));
    }

    fn boot_entry(hash: &str, previous_hash: &str) -> ProvenanceEntry {
        ProvenanceEntry {
            id: ProvenanceId::new(),
            source_type: SourceType::System,
            source_id: "system".into(),
            action: "boot".into(),
            timestamp: Timestamp::from_millis(1),
            input_refs: vec![],
            output_refs: vec![],
            metadata: Default::default(),
            hash: hash.into(),
            previous_hash: previous_hash.into(),
        }
    }

    #[test]
    fn test_scan_keeps_undecodable_rows() {
        let mut store = SqliteStore::new(":memory:").unwrap();
        store.append_entry(&boot_entry("h1", GENESIS_HASH)).unwrap();
        store.append_entry(&boot_entry("h2", "h1")).unwrap();
        store.append_entry(&boot_entry("h3", "h2")).unwrap();
        store
            .conn
            .execute("UPDATE provenance SET source_type = 'robot' WHERE seq = 2", [])
            .unwrap();
        store
            .conn
            .execute("UPDATE provenance SET metadata = 'not json' WHERE seq = 3", [])
            .unwrap();

        let rows = store.scan_entries(0, 10).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].entry().is_some());

        match &rows[1] {
            ScannedEntry::Undecodable(raw) => {
                assert_eq!(raw.hash, "h2");
                assert_eq!(raw.previous_hash, "h1");
                assert!(raw.reason.contains("robot"));
            }
            other => panic!("expected undecodable row, got {:?}", other),
        }
        match &rows[2] {
            ScannedEntry::Undecodable(raw) => assert!(raw.reason.contains("metadata")),
            other => panic!("expected undecodable row, got {:?}", other),
        }
    }

    #[test]
    fn test_scan_keeps_rows_with_retyped_columns() {
        let mut store = SqliteStore::new(":memory:").unwrap();
        store.append_entry(&boot_entry("h1", GENESIS_HASH)).unwrap();
        store
            .conn
            .execute("UPDATE provenance SET timestamp = 'yesterday'", [])
            .unwrap();

        let rows = store.scan_entries(0, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].entry().is_none());
        assert_eq!(rows[0].hash(), "h1");
        assert_eq!(rows[0].previous_hash(), GENESIS_HASH);
    }

    #[test]
    fn test_policy_versions_sort_semantically() {
        let mut store = SqliteStore::new(":memory:").unwrap();
        for minor in [10, 9, 2] {
            let policy = Policy::new("p", "P")
                .with_version(Version::new(1, minor, 0))
                .with_status(PolicyStatus::Active);
            store.upsert_policy(&policy).unwrap();
        }
        let versions: Vec<String> = store
            .query_policies(&PolicyQuery::default())
            .unwrap()
            .iter()
            .map(|p| p.version.to_string())
            .collect();
        assert_eq!(versions, vec!["1.2.0", "1.9.0", "1.10.0"]);
    }
}
