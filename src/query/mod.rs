//! 表形式クエリのアダプタ
//!
//! スクリプトからは [`Database`] ハンドル経由でのみデータソースに触れる。
//! 結果は即時に実体化されるため、ハンドルを閉じた後も [`QueryResult`] は読める。

#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::fmt;
use std::ops::Index;

use log::{debug, warn};
use serde::Serialize;

use crate::error::Error;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDataSource;

/// セルの値
///
/// `Display` はHTMLエスケープを行わずにそのまま文字列化する。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("null"),
            Cell::Integer(v) => write!(f, "{}", v),
            Cell::Real(v) => write!(f, "{}", v),
            Cell::Text(v) => f.write_str(v),
            Cell::Blob(v) => f.write_str(&String::from_utf8_lossy(v)),
        }
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Integer(v)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Real(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Text(v)
    }
}

impl From<Vec<u8>> for Cell {
    fn from(v: Vec<u8>) -> Self {
        Cell::Blob(v)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Cell::Null)
    }
}

/// 1行分のセル（エンジンが報告した列順）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row(Vec<Cell>);

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self(cells)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cell> {
        self.0.iter()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.0
    }
}

impl Index<usize> for Row {
    type Output = Cell;

    fn index(&self, index: usize) -> &Cell {
        &self.0[index]
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Cell;
    type IntoIter = std::slice::Iter<'a, Cell>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// クエリ結果
///
/// 全ての行は列数と同じ数のセルを持つ。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    columns: Vec<String>,
    rows: Vec<Row>,
    #[serde(skip)]
    changes: usize,
}

impl QueryResult {
    /// 列名と行から結果を構築（列数が揃っていない場合はエラー）
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Result<Self, Error> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(Error::Query(format!(
                "row {} has {} column(s), expected {}",
                index,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self {
            columns,
            rows,
            changes: 0,
        })
    }

    /// 結果列を持たない文（INSERT/UPDATE等）の結果
    pub fn from_changes(changes: usize) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            changes,
        }
    }

    /// 列名（エンジンが報告した順）
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 変更された行数（結果列を持たない文の場合のみ意味を持つ）
    pub fn changes(&self) -> usize {
        self.changes
    }

    /// 先頭に列名の行を追加した結果を返す
    pub fn with_header_row(mut self) -> Self {
        if self.columns.is_empty() {
            return self;
        }
        let header = Row::new(self.columns.iter().cloned().map(Cell::Text).collect());
        self.rows.insert(0, header);
        self
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// データソース（接続先を開く能力）
///
/// ホストがスクリプトに注入する。プールする実装でも open/query/close の契約は変わらない。
#[cfg_attr(test, mockall::automock)]
pub trait DataSource: Send + Sync {
    /// 接続先を開く
    fn connect(&self, target: &str) -> Result<Box<dyn DataHandle>, Error>;
}

/// 開かれた接続
#[cfg_attr(test, mockall::automock)]
pub trait DataHandle: Send {
    /// 文を実行し、結果を全て実体化して返す
    fn query(&mut self, statement: &str, params: &[Cell]) -> Result<QueryResult, Error>;

    /// 接続を閉じる
    fn close(&mut self) -> Result<(), Error>;
}

/// スクリプトが扱うデータベースハンドル
///
/// `close` は何度呼んでもよい。閉じ忘れたまま破棄された場合は警告を出して閉じる。
pub struct Database {
    target: String,
    handle: Option<Box<dyn DataHandle>>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("target", &self.target)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Database {
    /// データソースから接続を開く
    pub fn open(source: &dyn DataSource, target: &str) -> Result<Self, Error> {
        if target.is_empty() {
            return Err(Error::DataSourceOpen("empty connection target".to_string()));
        }
        let handle = source.connect(target)?;
        debug!("Opened data source '{}'", target);
        Ok(Self {
            target: target.to_string(),
            handle: Some(handle),
        })
    }

    /// 接続先の名前
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    fn handle_mut(&mut self) -> Result<&mut Box<dyn DataHandle>, Error> {
        let target = &self.target;
        self.handle
            .as_mut()
            .ok_or_else(|| Error::Query(format!("data source '{}' is already closed", target)))
    }

    /// 文を実行する
    pub fn query(&mut self, statement: &str) -> Result<QueryResult, Error> {
        self.query_with_params(statement, &[])
    }

    /// パラメータをバインドして文を実行する
    pub fn query_with_params(&mut self, statement: &str, params: &[Cell]) -> Result<QueryResult, Error> {
        if statement.trim().is_empty() {
            return Err(Error::Query("empty statement".to_string()));
        }
        let result = self.handle_mut()?.query(statement, params)?;
        debug!(
            "Query on '{}' returned {} row(s) x {} column(s)",
            self.target,
            result.len(),
            result.column_count()
        );
        Ok(result)
    }

    /// 先頭行に列名を含めて文を実行する
    pub fn query_with_header(&mut self, statement: &str) -> Result<QueryResult, Error> {
        Ok(self.query(statement)?.with_header_row())
    }

    /// 接続を閉じる（2回目以降は何もしない）
    pub fn close(&mut self) -> Result<(), Error> {
        match self.handle.take() {
            Some(mut handle) => {
                debug!("Closing data source '{}'", self.target);
                handle.close()
            }
            None => Ok(()),
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.handle.is_some() {
            warn!(
                "Data source '{}' was not closed by the script; closing it on drop",
                self.target
            );
            if let Err(e) = self.close() {
                warn!("Failed to close data source '{}': {}", self.target, e);
            }
        }
    }
}
