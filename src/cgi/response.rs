//! CGIレスポンスの出力機能

use std::io::{self, Write};

use log::error;

use crate::common::{is_valid_header_name, is_valid_header_value, reason_phrase, Response};
use crate::error::Error;

fn write_err(what: &'static str) -> impl Fn(io::Error) -> Error {
    move |e| Error::InternalServerError(format!("Failed to write {}: {}", what, e))
}

/// レスポンスを任意のライターへ書き出す
///
/// `Status:` 行、設定順のヘッダー、`Content-Length`、空行、ボディの順に出力する。
pub fn write_response_to<W: Write>(mut response: Response, out: &mut W) -> Result<(), Error> {
    let mut headers: Vec<(String, String)> = Vec::with_capacity(response.headers.len());
    for (name, value) in &response.headers {
        // 予約ヘッダーはホストが出力する
        if name.eq_ignore_ascii_case("Status") || name.eq_ignore_ascii_case("Content-Length") {
            continue;
        }
        if !is_valid_header_name(name) || !is_valid_header_value(value) {
            error!("Invalid header detected - name: '{}'", name);
            response = Response::from_error(&Error::InvalidHeader(name.clone()));
            headers = response.headers.clone();
            break;
        }
        headers.push((name.clone(), value.clone()));
    }

    write!(out, "Status: {} {}\r\n", response.status, reason_phrase(response.status))
        .map_err(write_err("status line"))?;
    for (name, value) in &headers {
        write!(out, "{}: {}\r\n", name, value).map_err(write_err("header"))?;
    }
    if let Some(body) = &response.body {
        write!(out, "Content-Length: {}\r\n", body.len()).map_err(write_err("Content-Length"))?;
    }
    out.write_all(b"\r\n").map_err(write_err("header/body separator"))?;
    if let Some(body) = &response.body {
        out.write_all(body).map_err(write_err("response body"))?;
    }
    Ok(())
}

/// レスポンスを標準出力に書き出す
pub fn write_response(response: Response) -> Result<(), Error> {
    let mut out = io::stdout().lock();
    let res = write_response_to(response, &mut out);
    out.flush().map_err(|e| Error::InternalServerError(format!("Failed to flush stdout: {}", e)))?;
    res
}
