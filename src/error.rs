//! エラー型の定義

use thiserror::Error;

/// スクリプトとホスト間で発生するエラー型
#[derive(Error, Debug)]
pub enum Error {
    /// リクエストボディをフォームデータとして解釈できない
    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    /// ボディ出力開始後のヘッダー操作
    #[error("Header modified after body output: {0}")]
    HeaderAfterBody(String),

    /// 確定済みレスポンスへの書き込み
    #[error("Response already finalized: {0}")]
    ResponseFinalized(String),

    /// ヘッダー名または値が不正
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// データソースを開けない
    #[error("Failed to open data source: {0}")]
    DataSourceOpen(String),

    /// クエリ実行エラー（エンジンの診断メッセージを保持）
    #[error("Query error: {0}")]
    Query(String),

    /// 無効なリクエスト
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// リクエストボディが上限を超えている
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// スクリプト実行中のpanic
    #[error("Script panicked: {0}")]
    ScriptPanicked(String),

    /// 内部サーバーエラー
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl Error {
    /// エラーからHTTPステータスコードを取得
    pub fn status_code(&self) -> u16 {
        match self {
            Error::MalformedBody(_) => 400,
            Error::InvalidRequest(_) => 400,
            Error::PayloadTooLarge(_) => 413,
            Error::HeaderAfterBody(_) => 500,
            Error::ResponseFinalized(_) => 500,
            Error::InvalidHeader(_) => 500,
            Error::DataSourceOpen(_) => 500,
            Error::Query(_) => 500,
            Error::ScriptPanicked(_) => 500,
            Error::InternalServerError(_) => 500,
        }
    }
}
