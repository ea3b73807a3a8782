//! 環境変数によるホスト設定
//!
//! いずれの値も未設定・不正値の場合はデフォルトにフォールバックする。

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// リクエストボディの最大サイズ（デフォルト 5MB）
pub const DEFAULT_MAX_BODY_SIZE: usize = 5 * 1024 * 1024;
/// エラーログファイルのデフォルトパス
pub const DEFAULT_ERROR_LOG: &str = "cgiscript_error.log";
/// データベースファイルのデフォルトパス
pub const DEFAULT_DB_PATH: &str = "../data/foo.db";
/// 一覧表示するテーブルのデフォルト名
pub const DEFAULT_DB_TABLE: &str = "data";
/// SQLiteのbusy timeoutのデフォルト値（ミリ秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 50;

/// ホスト全体の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// リクエストボディの最大サイズ（バイト）
    pub max_body_size: usize,
    /// エラーログの出力先
    pub error_log_path: PathBuf,
    /// データベースのパス
    pub db_path: String,
    /// 一覧表示するテーブル名
    pub db_table: String,
    /// SQLiteのbusy timeout
    pub busy_timeout: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            error_log_path: PathBuf::from(DEFAULT_ERROR_LOG),
            db_path: DEFAULT_DB_PATH.to_string(),
            db_table: DEFAULT_DB_TABLE.to_string(),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

impl HostConfig {
    /// 環境変数から設定を読み込む
    ///
    /// | 変数 | 既定値 |
    /// |------|--------|
    /// | `CGISCRIPT_MAX_BODY_SIZE` | 5MB |
    /// | `CGISCRIPT_ERROR_LOG` | `cgiscript_error.log` |
    /// | `CGISCRIPT_DB_PATH` | `../data/foo.db` |
    /// | `CGISCRIPT_DB_TABLE` | `data` |
    /// | `CGISCRIPT_SQLITE_BUSY_TIMEOUT_MS` | 50 |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_body_size: parse_env("CGISCRIPT_MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            error_log_path: non_empty_env("CGISCRIPT_ERROR_LOG")
                .map(PathBuf::from)
                .unwrap_or(defaults.error_log_path),
            db_path: non_empty_env("CGISCRIPT_DB_PATH").unwrap_or(defaults.db_path),
            db_table: non_empty_env("CGISCRIPT_DB_TABLE")
                .filter(|t| is_valid_table_name(t))
                .unwrap_or(defaults.db_table),
            busy_timeout: parse_env::<u64>("CGISCRIPT_SQLITE_BUSY_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.busy_timeout),
        }
    }
}

/// テーブル名として埋め込んでよい識別子か（英数字とアンダースコアのみ）
pub fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}
