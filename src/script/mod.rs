//! スクリプトとホストの契約
//!
//! スクリプトはグローバルなホストオブジェクトを使わず、
//! [`ScriptContext`] 経由でリクエスト・レスポンス・データソースを受け取る。

pub mod context;
pub mod driver;
pub mod response;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::HostConfig;
use crate::error::Error;
use crate::query::{DataSource, Database};

pub use context::RequestContext;
pub use driver::{Execution, ScriptDriver, ScriptDriverBuilder};
pub use response::{ResponseState, ResponseWriter};

/// 1リクエストを処理するスクリプト
#[async_trait]
pub trait Script: Send + Sync {
    /// スクリプトを実行する
    ///
    /// エラーを返すとドライバがレスポンスを確定させ、失敗を呼び出し元へ報告する。
    async fn run(&self, cx: &mut ScriptContext) -> Result<(), Error>;
}

/// スクリプトに注入される実行コンテキスト
pub struct ScriptContext {
    /// リクエスト
    pub request: RequestContext,
    /// レスポンスライター
    pub response: ResponseWriter,
    data_source: Arc<dyn DataSource>,
    config: HostConfig,
}

impl fmt::Debug for ScriptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptContext")
            .field("request", &self.request)
            .field("response", &self.response)
            .field("config", &self.config)
            .finish()
    }
}

impl ScriptContext {
    pub fn new(request: RequestContext, data_source: Arc<dyn DataSource>, config: HostConfig) -> Self {
        Self {
            request,
            response: ResponseWriter::new(),
            data_source,
            config,
        }
    }

    /// ホスト設定
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// 注入されたデータソースで接続先を開く
    pub fn open_database(&self, target: &str) -> Result<Database, Error> {
        Database::open(self.data_source.as_ref(), target)
    }
}
