//! cgiscript: CGI形式のスクリプトとホストの契約
//!
//! 1リクエストにつき1回スクリプトを実行し、次の機能を注入する。
//!
//! - リクエストコンテキスト（メソッド、フォームフィールド、ヘッダー等）
//! - 二段階（ヘッダー → ボディ）のレスポンスライター
//! - 表形式クエリのアダプタ（SQLiteは `sqlite` feature）
//!
//! CGIバインディングは `cgi` feature で有効になる。

pub mod common;
pub mod config;
pub mod error;
pub mod form;
pub mod query;
pub mod script;
pub mod scripts;

#[cfg(feature = "cgi")]
pub mod cgi;

pub use common::{Method, Request, Response};
pub use config::HostConfig;
pub use error::Error;
pub use query::{Cell, DataHandle, DataSource, Database, QueryResult, Row};
pub use script::{Execution, RequestContext, ResponseWriter, Script, ScriptContext, ScriptDriver};
