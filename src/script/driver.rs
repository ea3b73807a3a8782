//! スクリプトドライバ
//!
//! 1リクエストを1回のスクリプト実行に結び付け、終了時（正常・エラー・panic）に
//! 必ずレスポンスを確定させる。

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio::task;

use super::{RequestContext, Script, ScriptContext};
use crate::common::{Request, Response};
use crate::config::HostConfig;
use crate::error::Error;
use crate::query::DataSource;

/// 1回の実行結果
///
/// `failure` が `Some` でも `response` は必ずクライアントへ返せる状態になっている。
#[derive(Debug)]
pub struct Execution {
    /// 確定したレスポンス
    pub response: Response,
    /// スクリプトの失敗（呼び出し元へ報告する）
    pub failure: Option<Error>,
}

impl Execution {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// 失敗があれば `Err` として取り出す
    pub fn into_result(self) -> Result<Response, Error> {
        match self.failure {
            Some(e) => Err(e),
            None => Ok(self.response),
        }
    }
}

/// [`ScriptDriver`] のビルダー
#[derive(Default)]
pub struct ScriptDriverBuilder {
    script: Option<Arc<dyn Script>>,
    data_source: Option<Arc<dyn DataSource>>,
    config: Option<HostConfig>,
}

impl ScriptDriverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 実行するスクリプトを設定
    pub fn script<S>(mut self, script: S) -> Self
    where
        S: Script + 'static,
    {
        self.script = Some(Arc::new(script));
        self
    }

    /// スクリプトへ注入するデータソースを設定
    pub fn data_source<D>(mut self, source: D) -> Self
    where
        D: DataSource + 'static,
    {
        self.data_source = Some(Arc::new(source));
        self
    }

    /// ホスト設定を設定（省略時はデフォルト）
    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// ドライバを構築する
    ///
    /// データソースを省略した場合、接続しようとすると `DataSourceOpen` を返す。
    pub fn build(self) -> Result<ScriptDriver, Error> {
        let script = self
            .script
            .ok_or_else(|| Error::InternalServerError("no script configured".to_string()))?;
        Ok(ScriptDriver {
            script,
            data_source: self.data_source.unwrap_or_else(|| Arc::new(NoDataSource)),
            config: self.config.unwrap_or_default(),
        })
    }
}

/// データソース未設定時のプレースホルダ
struct NoDataSource;

impl DataSource for NoDataSource {
    fn connect(&self, target: &str) -> Result<Box<dyn crate::query::DataHandle>, Error> {
        Err(Error::DataSourceOpen(format!("{}: no data source configured", target)))
    }
}

/// スクリプトを1リクエストずつ実行するドライバ
pub struct ScriptDriver {
    script: Arc<dyn Script>,
    data_source: Arc<dyn DataSource>,
    config: HostConfig,
}

impl ScriptDriver {
    pub fn builder() -> ScriptDriverBuilder {
        ScriptDriverBuilder::new()
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// リクエストに対してスクリプトを実行し、確定したレスポンスを返す
    pub async fn execute(&self, request: Request) -> Execution {
        let method = request.method;
        let path = request.path.clone();
        debug!("Dispatching script for {} {}", method, path);

        let mut cx = ScriptContext::new(
            RequestContext::new(request),
            Arc::clone(&self.data_source),
            self.config.clone(),
        );
        cx.response.open();
        let cx = Arc::new(Mutex::new(cx));

        // panicしても書き込み済みの状態を参照できるよう、コンテキストは共有して渡す
        let script = Arc::clone(&self.script);
        let task_cx = Arc::clone(&cx);
        let task_result = task::spawn(async move {
            let mut guard = task_cx.lock().await;
            script.run(&mut guard).await
        })
        .await;

        let failure = match task_result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                error!("Script failed at {} {}: {}", method, path, e);
                Some(e)
            }
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    "panic occurred in script".to_string()
                } else {
                    format!("script task cancelled: {}", join_err)
                };
                error!("{} at {} {}", message, method, path);
                Some(Error::ScriptPanicked(message))
            }
        };

        let mut cx = cx.lock().await;
        let response = match &failure {
            None => cx.response.finalize(),
            // ボディ出力前なら確定済みのものは無いのでエラーレスポンスに差し替える
            Some(e) if !cx.response.has_body() => {
                cx.response.finalize();
                Response::from_error(e)
            }
            Some(_) => {
                warn!("Script failed after body output; sending partial response");
                cx.response.finalize()
            }
        };
        info!("{} {} -> {}", method, path, response.status);

        Execution { response, failure }
    }
}
