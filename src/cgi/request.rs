//! CGI環境からのリクエスト構築

use std::collections::HashMap;
use std::env;
use std::io::Read;

use log::{debug, warn};

use crate::common::{decompress_gzip, is_valid_header_name, is_valid_header_value, parse_query_string, Method, Request};
use crate::error::Error;

/// `HTTP_X_AUTH_TOKEN` → `X-Auth-Token` のように変換
fn header_name_from_env(key: &str) -> String {
    key.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                None => String::new(),
                Some(c) => c.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
            }
        })
        .collect::<Vec<String>>()
        .join("-")
}

/// 環境変数からHTTPヘッダーを取得する
pub fn get_cgi_headers() -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for (key, value) in env::vars() {
        let header_name = if let Some(rest) = key.strip_prefix("HTTP_") {
            header_name_from_env(rest)
        } else if key == "CONTENT_TYPE" || key == "CONTENT_LENGTH" {
            header_name_from_env(&key)
        } else {
            continue;
        };
        if !is_valid_header_name(&header_name) || !is_valid_header_value(&value) {
            debug!("Skipping invalid CGI header variable {}", key);
            continue;
        }
        headers.insert(header_name, value);
    }
    headers
}

/// `CONTENT_LENGTH` バイトのボディを読み込む
///
/// 上限を超える場合は読み込まずに `PayloadTooLarge` を返す。
pub fn read_request_body<R: Read>(mut input: R, max_body_size: usize) -> Result<Option<Vec<u8>>, Error> {
    let content_length = match env::var("CONTENT_LENGTH") {
        Ok(value) if !value.trim().is_empty() => value.trim().parse::<usize>().map_err(|_| {
            Error::InvalidRequest(format!("Invalid CONTENT_LENGTH: {}", value))
        })?,
        _ => return Ok(None),
    };
    if content_length == 0 {
        return Ok(None);
    }
    if content_length > max_body_size {
        return Err(Error::PayloadTooLarge(format!(
            "Request body size {} bytes exceeds maximum allowed size {} bytes",
            content_length, max_body_size
        )));
    }

    let mut buffer = vec![0u8; content_length];
    input
        .read_exact(&mut buffer)
        .map_err(|e| Error::InvalidRequest(format!("Failed to read request body: {}", e)))?;
    Ok(Some(buffer))
}

/// CGI環境変数と標準入力から [`Request`] を構築する
pub fn request_from_env<R: Read>(input: R, max_body_size: usize) -> Result<Request, Error> {
    let method_str = env::var("REQUEST_METHOD").map_err(|_| {
        Error::InvalidRequest("REQUEST_METHOD environment variable not set".to_string())
    })?;
    let method = Method::from_str(&method_str)
        .ok_or_else(|| Error::InvalidRequest(format!("Invalid HTTP method: {}", method_str)))?;

    let path = env::var("PATH_INFO").ok().filter(|p| !p.is_empty()).unwrap_or_else(|| "/".to_string());
    let query_string = env::var("QUERY_STRING").unwrap_or_default();
    let secure = env::var("HTTPS")
        .map(|v| v.eq_ignore_ascii_case("on") || v == "1")
        .unwrap_or(false);

    let mut request = Request::new(method, path).with_secure(secure);
    request.query_params = parse_query_string(&query_string);
    request.headers = get_cgi_headers()
        .into_iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v))
        .collect();
    request.body = read_request_body(input, max_body_size)?;

    let gzipped = request
        .header("content-encoding")
        .map(|v| v.trim().eq_ignore_ascii_case("gzip"))
        .unwrap_or(false);
    if gzipped {
        if let Some(body) = request.body.take() {
            let decoded = decompress_gzip(&body, max_body_size).map_err(|e| {
                warn!("Failed to decompress gzip body: {}", e);
                e
            })?;
            request.headers.remove("content-encoding");
            request.body = Some(decoded);
        }
    }

    Ok(request)
}
