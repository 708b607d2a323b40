// crates/propsync-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Entity Store
// Description: Durable EntityGateway and AuditRecorder backed by SQLite WAL.
// Purpose: Persist versioned entity records and the append-only audit trail.
// Dependencies: propsync-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Each entity row stores the full flat record JSON plus indexed metadata
//! columns (`entity_type`, timestamps, `version`, `is_deleted`). Writes go
//! through a single mutex-guarded connection; updates re-read the row,
//! apply the patch through the core entity model, and bump the version by
//! exactly 1 inside one transaction. Soft-deleted rows stay in the table
//! and are excluded from every read path. The audit trail is append-only
//! with a monotonic sequence used for newest-first history.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use async_trait::async_trait;
use propsync_core::AuditError;
use propsync_core::AuditOperation;
use propsync_core::AuditRecorder;
use propsync_core::AuditTrailEntry;
use propsync_core::EntityGateway;
use propsync_core::EntityId;
use propsync_core::EntityKind;
use propsync_core::EntityRecord;
use propsync_core::GatewayError;
use propsync_core::ListFilter;
use propsync_core::Timestamp;
use propsync_core::UserId;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` entity store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config with defaults for everything but the path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw record payloads.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Record not found or soft-deleted.
    #[error("sqlite store entity not found: {0}")]
    NotFound(String),
}

impl From<SqliteStoreError> for GatewayError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message)
            | SqliteStoreError::Db(message)
            | SqliteStoreError::VersionMismatch(message) => Self::Io(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
        }
    }
}

impl From<SqliteStoreError> for AuditError {
    fn from(error: SqliteStoreError) -> Self {
        Self::Io(error.to_string())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed entity gateway and audit recorder.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
/// - Accepted updates bump `version` by exactly 1 in one transaction.
/// - Soft-deleted rows are retained but excluded from reads.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] for path violations, connection
    /// failures, or an unsupported stored schema version.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the connection, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads one row by identifier, soft-deleted rows included.
    fn fetch_raw(
        connection: &Connection,
        id: &EntityId,
    ) -> Result<Option<EntityRecord>, SqliteStoreError> {
        let json: Option<String> = connection
            .query_row("SELECT record_json FROM entities WHERE id = ?1", params![id.as_str()], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        match json {
            None => Ok(None),
            Some(json) => {
                let record: EntityRecord = serde_json::from_str(&json)
                    .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
                Ok(Some(record))
            }
        }
    }

    /// Writes a full record row inside the caller's transaction.
    fn upsert_row(
        tx: &rusqlite::Transaction<'_>,
        record: &EntityRecord,
    ) -> Result<(), SqliteStoreError> {
        let json = serde_json::to_string(record)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        tx.execute(
            "INSERT INTO entities (
                id, entity_type, record_json, created_at, updated_at,
                created_by, updated_by, version, is_deleted
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                record_json = excluded.record_json,
                updated_at = excluded.updated_at,
                updated_by = excluded.updated_by,
                version = excluded.version,
                is_deleted = excluded.is_deleted",
            params![
                record.meta.id.as_str(),
                record.kind().as_str(),
                json,
                record.meta.created_at.as_unix_millis(),
                record.meta.updated_at.as_unix_millis(),
                record.meta.created_by.as_str(),
                record.meta.updated_by.as_str(),
                i64::try_from(record.meta.version).unwrap_or(i64::MAX),
                i64::from(record.meta.is_deleted),
            ],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(())
    }
}

/// Returns true when a record's body matches every equality constraint.
fn matches_filter(record: &EntityRecord, filter: &ListFilter) -> bool {
    if filter.equals.is_empty() {
        return true;
    }
    let Ok(map) = record.body.to_map() else {
        return false;
    };
    filter.equals.iter().all(|(field, expected)| map.get(field) == Some(expected))
}

#[async_trait]
impl EntityGateway for SqliteStore {
    async fn get(
        &self,
        kind: EntityKind,
        id: &EntityId,
    ) -> Result<Option<EntityRecord>, GatewayError> {
        let connection = self.lock();
        let record = Self::fetch_raw(&connection, id)?;
        Ok(record.filter(|record| record.kind() == kind && !record.meta.is_deleted))
    }

    async fn list(
        &self,
        kind: EntityKind,
        filter: &ListFilter,
    ) -> Result<Vec<EntityRecord>, GatewayError> {
        let connection = self.lock();
        let mut stmt = connection
            .prepare(
                "SELECT record_json FROM entities
                 WHERE entity_type = ?1 AND is_deleted = 0
                 ORDER BY created_at ASC, id ASC",
            )
            .map_err(|err| GatewayError::Io(err.to_string()))?;
        let rows = stmt
            .query_map(params![kind.as_str()], |row| row.get::<_, String>(0))
            .map_err(|err| GatewayError::Io(err.to_string()))?;
        let mut records = Vec::new();
        for json in rows {
            let json = json.map_err(|err| GatewayError::Io(err.to_string()))?;
            let record: EntityRecord = serde_json::from_str(&json)
                .map_err(|err| GatewayError::Invalid(err.to_string()))?;
            if matches_filter(&record, filter) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn insert(&self, record: &EntityRecord) -> Result<EntityRecord, GatewayError> {
        let mut stored = record.clone();
        stored.meta.id = EntityId::random();
        stored.meta.version = 1;
        stored.meta.is_deleted = false;
        let mut connection = self.lock();
        let tx =
            connection.transaction().map_err(|err| GatewayError::Io(err.to_string()))?;
        Self::upsert_row(&tx, &stored)?;
        tx.commit().map_err(|err| GatewayError::Io(err.to_string()))?;
        Ok(stored)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &EntityId,
        patch: &Map<String, Value>,
        updated_by: &UserId,
    ) -> Result<EntityRecord, GatewayError> {
        let mut connection = self.lock();
        let tx =
            connection.transaction().map_err(|err| GatewayError::Io(err.to_string()))?;
        let current = Self::fetch_raw(&tx, id)?
            .filter(|record| record.kind() == kind && !record.meta.is_deleted)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        let mut next =
            current.with_patch(patch).map_err(|err| GatewayError::Invalid(err.to_string()))?;
        next.meta.version = current.meta.version + 1;
        next.meta.updated_at = Timestamp::now();
        next.meta.updated_by = updated_by.clone();
        Self::upsert_row(&tx, &next)?;
        tx.commit().map_err(|err| GatewayError::Io(err.to_string()))?;
        Ok(next)
    }

    async fn soft_delete(
        &self,
        kind: EntityKind,
        id: &EntityId,
        deleted_by: &UserId,
    ) -> Result<(), GatewayError> {
        let mut connection = self.lock();
        let tx =
            connection.transaction().map_err(|err| GatewayError::Io(err.to_string()))?;
        let mut record = Self::fetch_raw(&tx, id)?
            .filter(|record| record.kind() == kind && !record.meta.is_deleted)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        record.meta.is_deleted = true;
        record.meta.version += 1;
        record.meta.updated_at = Timestamp::now();
        record.meta.updated_by = deleted_by.clone();
        Self::upsert_row(&tx, &record)?;
        tx.commit().map_err(|err| GatewayError::Io(err.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl AuditRecorder for SqliteStore {
    async fn record(&self, entry: &AuditTrailEntry) -> Result<(), AuditError> {
        let old_value = match &entry.old_value {
            Some(value) => {
                Some(serde_json::to_string(value).map_err(|err| AuditError::Io(err.to_string()))?)
            }
            None => None,
        };
        let new_value = match &entry.new_value {
            Some(value) => {
                Some(serde_json::to_string(value).map_err(|err| AuditError::Io(err.to_string()))?)
            }
            None => None,
        };
        let connection = self.lock();
        connection
            .execute(
                "INSERT INTO audit_trail (
                    entity_type, entity_id, field_changed, old_value, new_value,
                    operation, user_id, recorded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.entity_kind.as_str(),
                    entry.entity_id.as_str(),
                    entry.field_changed,
                    old_value,
                    new_value,
                    operation_label(entry.operation),
                    entry.user_id.as_str(),
                    entry.recorded_at.as_unix_millis(),
                ],
            )
            .map_err(|err| AuditError::Io(err.to_string()))?;
        Ok(())
    }

    async fn history(
        &self,
        entity_id: &EntityId,
        kind: Option<EntityKind>,
    ) -> Result<Vec<AuditTrailEntry>, AuditError> {
        let connection = self.lock();
        let mut stmt = connection
            .prepare(
                "SELECT entity_type, entity_id, field_changed, old_value, new_value,
                        operation, user_id, recorded_at
                 FROM audit_trail
                 WHERE entity_id = ?1 AND (?2 IS NULL OR entity_type = ?2)
                 ORDER BY seq DESC",
            )
            .map_err(|err| AuditError::Io(err.to_string()))?;
        let kind_label = kind.map(EntityKind::as_str);
        let rows = stmt
            .query_map(params![entity_id.as_str(), kind_label], audit_row)
            .map_err(|err| AuditError::Io(err.to_string()))?;
        let mut entries = Vec::new();
        for row in rows {
            let raw = row.map_err(|err| AuditError::Io(err.to_string()))?;
            entries.push(raw.into_entry()?);
        }
        Ok(entries)
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Raw audit row before JSON and label decoding.
struct RawAuditRow {
    /// Stored entity kind label.
    entity_type: String,
    /// Stored entity identifier.
    entity_id: String,
    /// Stored field name.
    field_changed: String,
    /// Stored old value JSON, if any.
    old_value: Option<String>,
    /// Stored new value JSON, if any.
    new_value: Option<String>,
    /// Stored operation label.
    operation: String,
    /// Stored acting user.
    user_id: String,
    /// Stored row timestamp.
    recorded_at: i64,
}

impl RawAuditRow {
    /// Decodes the raw row into an [`AuditTrailEntry`].
    fn into_entry(self) -> Result<AuditTrailEntry, AuditError> {
        let entity_kind = EntityKind::parse(&self.entity_type)
            .ok_or_else(|| AuditError::Io(format!("unknown entity type: {}", self.entity_type)))?;
        let operation = parse_operation(&self.operation)
            .ok_or_else(|| AuditError::Io(format!("unknown operation: {}", self.operation)))?;
        let old_value = match self.old_value {
            Some(json) => Some(
                serde_json::from_str(&json).map_err(|err| AuditError::Io(err.to_string()))?,
            ),
            None => None,
        };
        let new_value = match self.new_value {
            Some(json) => Some(
                serde_json::from_str(&json).map_err(|err| AuditError::Io(err.to_string()))?,
            ),
            None => None,
        };
        Ok(AuditTrailEntry {
            entity_kind,
            entity_id: EntityId::new(self.entity_id),
            field_changed: self.field_changed,
            old_value,
            new_value,
            operation,
            user_id: UserId::new(self.user_id),
            recorded_at: Timestamp::from_unix_millis(self.recorded_at),
        })
    }
}

/// Maps one `SQLite` row into a [`RawAuditRow`].
fn audit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAuditRow> {
    Ok(RawAuditRow {
        entity_type: row.get(0)?,
        entity_id: row.get(1)?,
        field_changed: row.get(2)?,
        old_value: row.get(3)?,
        new_value: row.get(4)?,
        operation: row.get(5)?,
        user_id: row.get(6)?,
        recorded_at: row.get(7)?,
    })
}

/// Returns the stable label for an audit operation.
const fn operation_label(operation: AuditOperation) -> &'static str {
    match operation {
        AuditOperation::Create => "create",
        AuditOperation::Update => "update",
        AuditOperation::Delete => "delete",
    }
}

/// Parses a stored operation label.
fn parse_operation(label: &str) -> Option<AuditOperation> {
    match label {
        "create" => Some(AuditOperation::Create),
        "update" => Some(AuditOperation::Update),
        "delete" => Some(AuditOperation::Delete),
        _ => None,
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS entities (
                    id TEXT PRIMARY KEY,
                    entity_type TEXT NOT NULL,
                    record_json BLOB NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    created_by TEXT NOT NULL,
                    updated_by TEXT NOT NULL,
                    version INTEGER NOT NULL,
                    is_deleted INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_entities_type
                    ON entities (entity_type, is_deleted);
                CREATE TABLE IF NOT EXISTS audit_trail (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    entity_type TEXT NOT NULL,
                    entity_id TEXT NOT NULL,
                    field_changed TEXT NOT NULL,
                    old_value TEXT,
                    new_value TEXT,
                    operation TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    recorded_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_audit_entity
                    ON audit_trail (entity_id, entity_type);",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}
