//! rusqlite によるSQLiteデータソース

use std::time::Duration;

use log::debug;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags, ToSql};

use super::{Cell, DataHandle, DataSource, QueryResult, Row};
use crate::config::DEFAULT_BUSY_TIMEOUT_MS;
use crate::error::Error;

/// SQLiteファイルを開くデータソース
#[derive(Debug, Clone)]
pub struct SqliteDataSource {
    busy_timeout: Duration,
    create_if_missing: bool,
}

impl Default for SqliteDataSource {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            create_if_missing: false,
        }
    }
}

impl SqliteDataSource {
    /// 既存ファイルのみを開くデータソースを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// busy timeoutを設定
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// ファイルが存在しない場合に作成するかどうか
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }
}

impl DataSource for SqliteDataSource {
    fn connect(&self, target: &str) -> Result<Box<dyn DataHandle>, Error> {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        let conn = Connection::open_with_flags(target, flags)
            .map_err(|e| Error::DataSourceOpen(format!("{}: {}", target, e)))?;
        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| Error::DataSourceOpen(format!("{}: {}", target, e)))?;
        // SQLiteはファイルを遅延して読むため、壊れたファイルはここで検出する
        conn.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))
            .map_err(|e| Error::DataSourceOpen(format!("{}: {}", target, e)))?;

        debug!("Opened SQLite database '{}' (busy timeout {:?})", target, self.busy_timeout);
        Ok(Box::new(SqliteHandle { conn: Some(conn) }))
    }
}

/// 開かれたSQLite接続
struct SqliteHandle {
    conn: Option<Connection>,
}

impl DataHandle for SqliteHandle {
    fn query(&mut self, statement: &str, params: &[Cell]) -> Result<QueryResult, Error> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| Error::Query("connection is closed".to_string()))?;
        let mut stmt = conn
            .prepare(statement)
            .map_err(|e| Error::Query(e.to_string()))?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        if columns.is_empty() {
            let changes = stmt
                .execute(params_from_iter(params.iter()))
                .map_err(|e| Error::Query(e.to_string()))?;
            return Ok(QueryResult::from_changes(changes));
        }

        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|e| Error::Query(e.to_string()))?;
        let mut collected = Vec::new();
        while let Some(row) = rows.next().map_err(|e| Error::Query(e.to_string()))? {
            let mut cells = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                let value = row.get_ref(index).map_err(|e| Error::Query(e.to_string()))?;
                cells.push(Cell::from(value));
            }
            collected.push(Row::new(cells));
        }
        QueryResult::new(columns, collected)
    }

    fn close(&mut self) -> Result<(), Error> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .map_err(|(_, e)| Error::InternalServerError(format!("Failed to close SQLite connection: {}", e)))?;
        }
        Ok(())
    }
}

impl<'a> From<ValueRef<'a>> for Cell {
    fn from(value: ValueRef<'a>) -> Self {
        match value {
            ValueRef::Null => Cell::Null,
            ValueRef::Integer(v) => Cell::Integer(v),
            ValueRef::Real(v) => Cell::Real(v),
            ValueRef::Text(v) => Cell::Text(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(v) => Cell::Blob(v.to_vec()),
        }
    }
}

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Cell::Null => ToSqlOutput::Owned(Value::Null),
            Cell::Integer(v) => ToSqlOutput::from(*v),
            Cell::Real(v) => ToSqlOutput::from(*v),
            Cell::Text(v) => ToSqlOutput::from(v.as_str()),
            Cell::Blob(v) => ToSqlOutput::from(v.as_slice()),
        })
    }
}
