//! CGI環境での実行をサポートするモジュール
//!
//! 環境変数と標準入力からリクエストを構築し、
//! 標準出力にHTTPレスポンスフォーマットで出力する。

pub mod core;
pub mod error_logging;
pub mod request;
pub mod response;

pub use self::core::{run_cgi, serve_request};
