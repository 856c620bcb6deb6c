pub mod changes;
pub mod schema;

pub use changes::{Change, ChangeBus, Subscription};

use crate::error::AppError;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Record types kept in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Project,
    Vehicle,
    Track,
    TrackPoint,
    Photo,
}

/// A row type with its table mapping
pub trait Record: Sized + Send + Sync + 'static {
    const KIND: EntityKind;
    const TABLE: &'static str;
    /// Column list in the order `from_row` reads them
    const COLUMNS: &'static str;
    const ORDER_BY: &'static str;

    type Filter: RecordFilter;

    fn id(&self) -> Uuid;

    /// Owning entity, used to route change notifications
    fn parent_id(&self) -> Option<Uuid>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    fn insert(&self, conn: &Connection) -> rusqlite::Result<()>;
}

/// Equality filter over a record table.
///
/// Every field is optional. The predicate is written as `(?n IS NULL OR col = ?n)`
/// so an absent field matches all rows.
pub trait RecordFilter: Clone + Send + Sync + 'static {
    const PREDICATE: &'static str;

    /// One value per placeholder, `Value::Null` for absent fields
    fn params(&self) -> Vec<Value>;

    /// Parent id this filter is restricted to, if any
    fn parent_id(&self) -> Option<Uuid> {
        None
    }

    /// Whether a committed change could alter the result of this filter
    fn may_match(&self, change: &Change) -> bool {
        match (self.parent_id(), change.parent_id) {
            (Some(wanted), Some(actual)) => wanted == actual,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// Shared handle to the local database.
///
/// Cloning is cheap. The connection lock is only held for the duration of a
/// single statement or transaction and never across an `.await`.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    changes: ChangeBus,
}

impl Store {
    /// Opens (and creates) the database file and applies the schema
    pub fn open(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        log::info!("Opened database at {}", path.display());
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, AppError> {
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            changes: ChangeBus::new(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.conn
            .lock()
            .map_err(|_| AppError::Other("Database lock poisoned".to_string()))
    }

    /// Runs read-only work on the connection
    pub fn read<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&Connection) -> Result<T, AppError>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Runs `f` inside an IMMEDIATE transaction.
    ///
    /// Changes pushed by `f` are published after the commit. On error the
    /// transaction is rolled back and nothing is published.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&Connection, &mut Vec<Change>) -> Result<T, AppError>,
    {
        let mut pending = Vec::new();
        let value = {
            let mut conn = self.lock()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = f(&tx, &mut pending)?;
            tx.commit()?;
            value
        };
        self.changes.publish_all(pending);
        Ok(value)
    }

    /// Inserts one record
    pub fn put<R: Record>(&self, record: &R) -> Result<Uuid, AppError> {
        self.transaction(|conn, changes| {
            record.insert(conn)?;
            changes.push(Change::of(record));
            Ok(record.id())
        })
    }

    pub fn get<R: Record>(&self, id: Uuid) -> Result<Option<R>, AppError> {
        self.read(|conn| get_with::<R>(conn, id))
    }

    /// Like `get`, but a missing record is `NotFound`
    pub fn require<R: Record>(&self, id: Uuid) -> Result<R, AppError> {
        self.get::<R>(id)?
            .ok_or_else(|| AppError::NotFound(format!("{:?} {}", R::KIND, id)))
    }

    pub fn query<R: Record>(&self, filter: &R::Filter) -> Result<Vec<R>, AppError> {
        self.read(|conn| query_with::<R>(conn, filter))
    }

    /// Watches the result set of `filter`
    pub fn subscribe<R: Record>(&self, filter: R::Filter) -> Subscription<R> {
        Subscription::new(self.clone(), filter, self.changes.subscribe())
    }

    pub fn changes(&self) -> &ChangeBus {
        &self.changes
    }
}

/// `get` on an already locked connection or open transaction
pub fn get_with<R: Record>(conn: &Connection, id: Uuid) -> Result<Option<R>, AppError> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?1", R::COLUMNS, R::TABLE);
    let record = conn
        .query_row(&sql, [id.to_string()], |row| R::from_row(row))
        .optional()?;
    Ok(record)
}

/// `query` on an already locked connection or open transaction
pub fn query_with<R: Record>(conn: &Connection, filter: &R::Filter) -> Result<Vec<R>, AppError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {}",
        R::COLUMNS,
        R::TABLE,
        <R::Filter as RecordFilter>::PREDICATE,
        R::ORDER_BY
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(filter.params()), |row| {
        R::from_row(row)
    })?;
    let records = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Counts the rows of a table matching `filter`
pub fn count_with<R: Record>(conn: &Connection, filter: &R::Filter) -> Result<u64, AppError> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {}",
        R::TABLE,
        <R::Filter as RecordFilter>::PREDICATE
    );
    let count: i64 = conn.query_row(&sql, rusqlite::params_from_iter(filter.params()), |row| {
        row.get(0)
    })?;
    Ok(count as u64)
}

pub(crate) fn opt_uuid(id: Option<Uuid>) -> Value {
    Value::from(id.map(|id| id.to_string()))
}

pub(crate) fn opt_text<T: ToString>(value: Option<T>) -> Value {
    Value::from(value.map(|v| v.to_string()))
}
