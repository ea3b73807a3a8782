//! スクリプトから見たリクエスト

use log::debug;

use crate::common::{parse_cookie_header, Method, Request};
use crate::error::Error;
use crate::form::{FieldExtractor, UploadedFile};

/// 1リクエスト分のリクエストコンテキスト
#[derive(Debug, Clone)]
pub struct RequestContext {
    request: Request,
}

impl RequestContext {
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    /// HTTPメソッド
    pub fn method(&self) -> Method {
        self.request.method
    }

    /// リクエストパス
    pub fn path(&self) -> &str {
        &self.request.path
    }

    /// リクエストヘッダー（大文字小文字を区別しない）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    /// デコード済みのクエリパラメータ
    pub fn query(&self, key: &str) -> Option<&str> {
        self.request.query_params.get(key).map(String::as_str)
    }

    /// Cookieの値
    pub fn cookie(&self, name: &str) -> Option<String> {
        let header = self.request.header("cookie")?;
        parse_cookie_header(header).remove(name)
    }

    /// HTTPS経由のリクエストか
    pub fn is_secure(&self) -> bool {
        self.request.secure
    }

    /// 生のリクエストボディ
    pub fn body(&self) -> Option<&[u8]> {
        self.request.body.as_deref()
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// フォームとして読むべきボディがあれば抽出器を返す
    ///
    /// POST以外、またはボディが空の場合は `None`。
    fn extractor(&self) -> Result<Option<FieldExtractor<'_>>, Error> {
        if self.request.method != Method::POST {
            return Ok(None);
        }
        match self.request.body.as_deref() {
            Some(body) if !body.is_empty() => {
                FieldExtractor::new(self.request.header("content-type"), body).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// POSTフィールドの値ごとにハンドラを呼び出す
    ///
    /// 値は送信順に同期的に渡される。フィールドが無ければ一度も呼ばれない。
    pub fn post_multi<F>(&self, field: &str, handler: F) -> Result<(), Error>
    where
        F: FnMut(&str),
    {
        if let Some(extractor) = self.extractor()? {
            extractor.for_each_value(field, handler)?;
        } else {
            debug!("post_multi('{}') on {} request without form body", field, self.request.method);
        }
        Ok(())
    }

    /// POSTフィールドの値を送信順に取得
    pub fn post_values(&self, field: &str) -> Result<Vec<String>, Error> {
        match self.extractor()? {
            Some(extractor) => extractor.values(field),
            None => Ok(Vec::new()),
        }
    }

    /// POSTフィールドの最初の値
    pub fn post(&self, field: &str) -> Result<Option<String>, Error> {
        match self.extractor()? {
            Some(extractor) => extractor.first_value(field),
            None => Ok(None),
        }
    }

    /// アップロードされたファイル
    pub fn file(&self, field: &str) -> Result<Option<UploadedFile>, Error> {
        match self.extractor()? {
            Some(extractor) => extractor.file(field),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form_request(body: &str) -> Request {
        Request::new(Method::POST, "/form")
            .with_header("Content-Type", "multipart/form-data; boundary=b0")
            .with_body(body)
    }

    const BODY: &str = "--b0\r\nContent-Disposition: form-data; name=\"cbox\"\r\n\r\nx\r\n--b0\r\nContent-Disposition: form-data; name=\"cbox\"\r\n\r\ny\r\n--b0--\r\n";

    #[test]
    fn test_post_multi_delivers_in_order() {
        let cx = RequestContext::new(form_request(BODY));
        let mut values = Vec::new();
        cx.post_multi("cbox", |v| values.push(v.to_string())).unwrap();
        assert_eq!(values, vec!["x", "y"]);
        assert_eq!(cx.post_values("cbox").unwrap(), vec!["x", "y"]);
        assert_eq!(cx.post("cbox").unwrap(), Some("x".to_string()));
    }

    #[test]
    fn test_post_multi_absent_field() {
        let cx = RequestContext::new(form_request(BODY));
        let mut calls = 0;
        cx.post_multi("other", |_| calls += 1).unwrap();
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_get_request_has_no_form_values() {
        let cx = RequestContext::new(Request::new(Method::GET, "/form").with_body(BODY));
        let mut calls = 0;
        cx.post_multi("cbox", |_| calls += 1).unwrap();
        assert_eq!(calls, 0);
        assert_eq!(cx.method(), Method::GET);
        assert_eq!(cx.file("cbox").unwrap(), None);
    }

    #[test]
    fn test_unparseable_body_is_malformed() {
        let request = Request::new(Method::POST, "/form")
            .with_header("Content-Type", "text/plain")
            .with_body("cbox=x");
        let cx = RequestContext::new(request);
        assert!(matches!(cx.post_multi("cbox", |_| {}), Err(Error::MalformedBody(_))));
    }

    #[test]
    fn test_request_accessors() {
        let request = Request::new(Method::GET, "/report")
            .with_query_param("page", "2")
            .with_header("Cookie", "sid=abc; theme=dark")
            .with_header("Accept", "application/json")
            .with_secure(true);
        let cx = RequestContext::new(request);

        assert_eq!(cx.path(), "/report");
        assert_eq!(cx.request().path, "/report");
        assert_eq!(cx.request().method, Method::GET);
        assert_eq!(cx.query("page"), Some("2"));
        assert_eq!(cx.query("missing"), None);
        assert_eq!(cx.cookie("theme"), Some("dark".to_string()));
        assert_eq!(cx.header("ACCEPT"), Some("application/json"));
        assert!(cx.is_secure());
        assert_eq!(cx.body(), None);
    }
}
