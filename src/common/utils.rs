//! 共通ユーティリティ関数群（URLデコード、クエリ解析、ヘッダー検証、gzip解凍 等）

use std::collections::HashMap;
use std::io::Read;

use flate2::read::GzDecoder;

use crate::error::Error;

/// URLエンコーディングのデコード関数
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(h), Some(l)) = (from_hex(bytes[i + 1]), from_hex(bytes[i + 2])) {
                result.push(h * 16 + l);
                i += 3;
                continue;
            }
        } else if bytes[i] == b'+' {
            result.push(b' ');
            i += 1;
            continue;
        }
        result.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&result).into_owned()
}

/// 16進数文字をバイト値に変換するヘルパー関数
fn from_hex(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// `k=v&k=v` 形式を出現順のペア列にデコードする
///
/// 同じキーが複数回現れても全て保持する。
pub fn parse_urlencoded_pairs(input: &str) -> Vec<(String, String)> {
    input
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next().unwrap_or("");
            let value = parts.next().unwrap_or("");
            (percent_decode(key), percent_decode(value))
        })
        .collect()
}

/// クエリ文字列をパースしてURLデコードを行う（同名キーは後勝ち）
pub fn parse_query_string(query_string: &str) -> HashMap<String, String> {
    parse_urlencoded_pairs(query_string).into_iter().collect()
}

/// Cookieヘッダーを名前と値に分解する
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim_matches('"').to_string()))
        })
        .collect()
}

/// ヘッダー名が安全なトークンかを判定
/// token = 1*tchar, tchar = "!#$%&'*+-.^_`|~" / DIGIT / ALPHA
pub fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || matches!(c, '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '.' | '^' | '_' | '`' | '|' | '~')
        })
}

/// ヘッダー値が安全かどうか検証する（ASCIIのホワイトリスト）
/// 許可: HTAB(0x09), SP(0x20), 可視ASCII(0x21–0x7E)
pub fn is_valid_header_value(value: &str) -> bool {
    value
        .as_bytes()
        .iter()
        .all(|&c| c == b'\t' || c == b' ' || (0x21..=0x7e).contains(&c))
}

/// gzipボディを解凍する（解凍後サイズが上限を超える場合はエラー）
pub fn decompress_gzip(body: &[u8], max_size: usize) -> Result<Vec<u8>, Error> {
    let mut decoded = Vec::new();
    // 上限+1バイトまで読めば超過を判定できる
    let mut limited = GzDecoder::new(body).take((max_size as u64).saturating_add(1));
    limited
        .read_to_end(&mut decoded)
        .map_err(|e| Error::MalformedBody(format!("Failed to decompress gzip body: {}", e)))?;
    if decoded.len() > max_size {
        return Err(Error::PayloadTooLarge(format!(
            "Decompressed body exceeds maximum allowed size {} bytes",
            max_size
        )));
    }
    Ok(decoded)
}
