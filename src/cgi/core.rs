//! CGIメイン実行ロジック

use std::io::{self, Write};

use log::{debug, error, info};

use super::error_logging::{gather_cgi_context, log_error_to_file};
use super::request::request_from_env;
use super::response::{write_response, write_response_to};
use crate::common::{Request, Response};
use crate::error::Error;
use crate::script::ScriptDriver;

/// CGI環境のリクエストをスクリプトで処理し、標準出力に書き出す
///
/// スクリプトが失敗してもレスポンスは必ず出力し、その後で失敗を返す。
pub async fn run_cgi(driver: &ScriptDriver) -> Result<(), Error> {
    let request = request_from_env(io::stdin().lock(), driver.config().max_body_size);
    let (response, failure) = process(driver, request).await;
    write_response(response)?;
    finish(failure)
}

/// 構築済み（または構築に失敗した）リクエストを処理して任意のライターへ書き出す
pub async fn serve_request<W: Write>(
    driver: &ScriptDriver,
    request: Result<Request, Error>,
    out: &mut W,
) -> Result<(), Error> {
    let (response, failure) = process(driver, request).await;
    write_response_to(response, out)?;
    finish(failure)
}

async fn process(driver: &ScriptDriver, request: Result<Request, Error>) -> (Response, Option<Error>) {
    let log_path = &driver.config().error_log_path;
    let request = match request {
        Ok(request) => request,
        Err(e) => {
            error!("Rejected CGI request: {}", e);
            log_error_to_file(log_path, &format!("Rejected CGI request: {:?}", e));
            return (Response::from_error(&e), Some(e));
        }
    };

    let method = request.method.to_string();
    let path = request.path.clone();
    debug!("Processing CGI request: {} {}", method, path);

    let execution = driver.execute(request).await;
    if let Some(e) = &execution.failure {
        log_error_to_file(log_path, &format!("Script failed at {} {}: {:?}", method, path, e));
        if matches!(e, Error::ScriptPanicked(_)) {
            log_error_to_file(log_path, &gather_cgi_context(&method, &path));
        }
    }
    (execution.response, execution.failure)
}

fn finish(failure: Option<Error>) -> Result<(), Error> {
    match failure {
        Some(e) => Err(e),
        None => {
            info!("CGI request processed successfully");
            Ok(())
        }
    }
}
