//! multipart/form-data のデコード
//!
//! ボディ全体を一度に展開せず、パートを借用スライスとして順に返す。
//! 区切り文字の欠落やボディの途中切れは `Error::MalformedBody` になる。

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::OnceLock;

use log::debug;
use regex::Regex;

use crate::error::Error;

/// RFC 2046 による境界文字列の最大長
const MAX_BOUNDARY_LEN: usize = 70;

/// ヘッダーパラメータ（`; key=value` / `; key="value"`）の正規表現
static PARAM_REGEX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn param_regex() -> Result<&'static Regex, Error> {
    PARAM_REGEX
        .get_or_init(|| Regex::new(r#";\s*([A-Za-z0-9_*.-]+)\s*=\s*(?:"((?:[^"\\]|\\.)*)"|([^;\s]*))"#))
        .as_ref()
        .map_err(|e| Error::InternalServerError(format!("Invalid parameter regex: {}", e)))
}

/// `type/subtype; k=v; ...` 形式のヘッダー値からパラメータを取り出す（キーは小文字）
pub fn header_params(value: &str) -> Result<HashMap<String, String>, Error> {
    let regex = param_regex()?;
    let mut params = HashMap::new();
    for caps in regex.captures_iter(value) {
        let key = caps[1].to_ascii_lowercase();
        let raw = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or("");
        // 引用符内のバックスラッシュエスケープを解除
        let unescaped = if caps.get(2).is_some() {
            raw.replace("\\\"", "\"").replace("\\\\", "\\")
        } else {
            raw.to_string()
        };
        params.insert(key, unescaped);
    }
    Ok(params)
}

/// Content-Typeからboundaryを取得する
pub fn boundary_from_content_type(content_type: &str) -> Result<String, Error> {
    let boundary = header_params(content_type)?
        .remove("boundary")
        .ok_or_else(|| Error::MalformedBody("multipart boundary is missing".to_string()))?;

    if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN {
        return Err(Error::MalformedBody(format!(
            "multipart boundary length must be 1..={} characters",
            MAX_BOUNDARY_LEN
        )));
    }
    if boundary.ends_with(' ') || !boundary.bytes().all(is_boundary_char) {
        return Err(Error::MalformedBody("multipart boundary contains invalid characters".to_string()));
    }
    Ok(boundary)
}

/// RFC 2046 bchars
fn is_boundary_char(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(b, b'\'' | b'(' | b')' | b'+' | b'_' | b',' | b'-' | b'.' | b'/' | b':' | b'=' | b'?' | b' ')
}

/// multipartの1パート
#[derive(Debug, Clone, PartialEq)]
pub struct Part<'a> {
    /// フィールド名
    pub name: String,
    /// ファイル名（ファイルアップロードの場合のみ）
    pub filename: Option<String>,
    /// パートのContent-Type
    pub content_type: Option<String>,
    /// パートの生データ
    pub data: &'a [u8],
}

impl<'a> Part<'a> {
    /// ファイルアップロードのパートか
    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }

    /// 値をテキストとして取得（不正なUTF-8は置換文字になる）
    pub fn text(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.data)
    }
}

/// multipartボディのパートを順に返すイテレータ
///
/// エラーを返した後は `None` を返し続ける。
pub struct MultipartParser<'a> {
    body: &'a [u8],
    /// `--boundary`
    delimiter: Vec<u8>,
    pos: usize,
    state: ParserState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Preamble,
    InParts,
    Done,
}

impl<'a> MultipartParser<'a> {
    /// 新しいパーサーを作成
    pub fn new(body: &'a [u8], boundary: &str) -> Self {
        let mut delimiter = Vec::with_capacity(boundary.len() + 2);
        delimiter.extend_from_slice(b"--");
        delimiter.extend_from_slice(boundary.as_bytes());
        Self {
            body,
            delimiter,
            pos: 0,
            state: ParserState::Preamble,
        }
    }

    /// 区切り行の直後を処理する。終端区切りなら `false` を返す
    fn after_delimiter(&mut self) -> Result<bool, Error> {
        let rest = &self.body[self.pos..];
        if rest.starts_with(b"--") {
            // 終端区切り以降（epilogue）は無視する
            self.pos = self.body.len();
            return Ok(false);
        }
        // transport-paddingを読み飛ばす
        let padding = rest.iter().take_while(|&&b| b == b' ' || b == b'\t').count();
        let rest = &rest[padding..];
        if rest.starts_with(b"\n") {
            return Err(Error::MalformedBody(
                "multipart body uses LF line breaks; CRLF is required".to_string(),
            ));
        }
        if !rest.starts_with(b"\r\n") {
            return Err(Error::MalformedBody("expected CRLF after boundary".to_string()));
        }
        self.pos += padding + 2;
        Ok(true)
    }

    fn skip_preamble(&mut self) -> Result<(), Error> {
        let start = if self.body.starts_with(&self.delimiter) {
            0
        } else {
            let mut needle = b"\r\n".to_vec();
            needle.extend_from_slice(&self.delimiter);
            find(self.body, &needle, 0)
                .map(|i| i + 2)
                .ok_or_else(|| Error::MalformedBody("multipart boundary not found in body".to_string()))?
        };
        self.pos = start + self.delimiter.len();
        Ok(())
    }

    fn next_part(&mut self) -> Result<Option<Part<'a>>, Error> {
        if self.state == ParserState::Preamble {
            self.skip_preamble()?;
            self.state = ParserState::InParts;
            if !self.after_delimiter()? {
                self.state = ParserState::Done;
                return Ok(None);
            }
        }

        let body = self.body;
        let header_start = self.pos;
        let (header_bytes, content_start) = if body[header_start..].starts_with(b"\r\n") {
            (&body[header_start..header_start], header_start + 2)
        } else {
            let end = find(body, b"\r\n\r\n", header_start)
                .ok_or_else(|| Error::MalformedBody("truncated part headers".to_string()))?;
            (&body[header_start..end], end + 4)
        };

        let mut needle = b"\r\n".to_vec();
        needle.extend_from_slice(&self.delimiter);
        let content_end = find(body, &needle, content_start)
            .ok_or_else(|| Error::MalformedBody("truncated part body: closing boundary missing".to_string()))?;

        let part = parse_part_headers(header_bytes, &body[content_start..content_end])?;
        self.pos = content_end + needle.len();
        if !self.after_delimiter()? {
            self.state = ParserState::Done;
        }
        Ok(Some(part))
    }
}

impl<'a> Iterator for MultipartParser<'a> {
    type Item = Result<Part<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == ParserState::Done {
            return None;
        }
        match self.next_part() {
            Ok(Some(part)) => Some(Ok(part)),
            Ok(None) => None,
            Err(e) => {
                debug!("multipart parse failed at offset {}: {}", self.pos, e);
                self.state = ParserState::Done;
                Some(Err(e))
            }
        }
    }
}

fn parse_part_headers<'a>(header_bytes: &[u8], data: &'a [u8]) -> Result<Part<'a>, Error> {
    let headers = std::str::from_utf8(header_bytes)
        .map_err(|_| Error::MalformedBody("part headers are not valid UTF-8".to_string()))?;

    let mut disposition = None;
    let mut content_type = None;
    for line in headers.split("\r\n").filter(|l| !l.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::MalformedBody(format!("invalid part header line: {}", line)))?;
        let name = name.trim();
        if name.eq_ignore_ascii_case("Content-Disposition") {
            disposition = Some(value.trim());
        } else if name.eq_ignore_ascii_case("Content-Type") {
            content_type = Some(value.trim().to_string());
        }
    }

    let disposition = disposition
        .ok_or_else(|| Error::MalformedBody("part without Content-Disposition".to_string()))?;
    let kind = disposition.split(';').next().unwrap_or("").trim();
    if !kind.eq_ignore_ascii_case("form-data") {
        return Err(Error::MalformedBody(format!("unexpected disposition type: {}", kind)));
    }
    let mut params = header_params(disposition)?;
    let name = params
        .remove("name")
        .ok_or_else(|| Error::MalformedBody("form-data part without name".to_string()))?;

    Ok(Part {
        name,
        filename: params.remove("filename"),
        content_type,
        data,
    })
}

/// `haystack[from..]` 内で `needle` が最初に現れる位置
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}
