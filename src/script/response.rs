//! 二段階（ヘッダー → ボディ）のレスポンスライター

use std::fmt::{self, Write as _};

use log::{debug, error};

use crate::common::{is_valid_header_name, is_valid_header_value, Response};
use crate::error::Error;

/// レスポンスの状態
///
/// `Created → HeadersOpen → BodyWriting → Finalized` の順にのみ遷移する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    Created,
    HeadersOpen,
    BodyWriting,
    Finalized,
}

/// スクリプトが使うレスポンスライター
#[derive(Debug)]
pub struct ResponseWriter {
    state: ResponseState,
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseWriter {
    /// `Created` 状態のライターを作成
    pub fn new() -> Self {
        Self {
            state: ResponseState::Created,
            status: 200,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// 現在の状態
    pub fn state(&self) -> ResponseState {
        self.state
    }

    /// ディスパッチ時にヘッダー受付を開始する
    pub(crate) fn open(&mut self) {
        if self.state == ResponseState::Created {
            self.state = ResponseState::HeadersOpen;
        }
    }

    fn ensure_headers_open(&self, what: &str) -> Result<(), Error> {
        match self.state {
            ResponseState::Created | ResponseState::HeadersOpen => Ok(()),
            ResponseState::BodyWriting => {
                error!("{} after body output has started", what);
                Err(Error::HeaderAfterBody(format!("{} after body output has started", what)))
            }
            ResponseState::Finalized => Err(Error::ResponseFinalized(what.to_string())),
        }
    }

    /// ヘッダーを設定する（同名は大文字小文字を区別せず上書き、位置は最初の設定順）
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), Error> {
        self.ensure_headers_open(&format!("setHeader({})", name))?;
        if !is_valid_header_name(name) {
            return Err(Error::InvalidHeader(format!("invalid header name: {:?}", name)));
        }
        if !is_valid_header_value(value) {
            return Err(Error::InvalidHeader(format!("invalid value for header {}", name)));
        }
        // Status / Content-Length はホストが出力する
        if name.eq_ignore_ascii_case("Status") || name.eq_ignore_ascii_case("Content-Length") {
            return Err(Error::InvalidHeader(format!("header {} is reserved", name)));
        }
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    /// ヘッダーを削除する
    pub fn remove_header(&mut self, name: &str) -> Result<(), Error> {
        self.ensure_headers_open(&format!("removeHeader({})", name))?;
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        Ok(())
    }

    /// 設定済みヘッダーの値を取得
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// ステータスコードを設定する
    pub fn set_status(&mut self, status: u16) -> Result<(), Error> {
        self.ensure_headers_open("setResponseCode")?;
        if !(100..=999).contains(&status) {
            return Err(Error::InvalidHeader(format!("invalid status code: {}", status)));
        }
        self.status = status;
        Ok(())
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// 断片をテキストとしてボディに追記する
    ///
    /// 最初の呼び出しでヘッダーブロックが確定し、以後ヘッダーは変更できない。
    pub fn print<I>(&mut self, fragments: I) -> Result<(), Error>
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        match self.state {
            ResponseState::Finalized => {
                return Err(Error::ResponseFinalized("print".to_string()));
            }
            ResponseState::Created | ResponseState::HeadersOpen => {
                debug!("Header block closed with {} header(s)", self.headers.len());
                self.state = ResponseState::BodyWriting;
            }
            ResponseState::BodyWriting => {}
        }
        for fragment in fragments {
            write!(self.body, "{}", fragment)
                .map_err(|e| Error::InternalServerError(format!("Failed to format output: {}", e)))?;
        }
        Ok(())
    }

    /// これまでに出力したボディ
    pub fn body(&self) -> &str {
        &self.body
    }

    /// ボディ出力が始まっているか
    pub fn has_body(&self) -> bool {
        matches!(self.state, ResponseState::BodyWriting)
            || (self.state == ResponseState::Finalized && !self.body.is_empty())
    }

    /// レスポンスを確定する
    ///
    /// `print` が一度も呼ばれていなくても、ステータスとヘッダーのみの有効なレスポンスを返す。
    pub(crate) fn finalize(&mut self) -> Response {
        self.state = ResponseState::Finalized;
        let body = std::mem::take(&mut self.body);
        Response {
            status: self.status,
            headers: std::mem::take(&mut self.headers),
            body: if body.is_empty() { None } else { Some(body.into_bytes()) },
        }
    }
}
