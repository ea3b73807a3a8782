//! POSTボディからのフォームフィールド抽出
//!
//! `multipart/form-data` と `application/x-www-form-urlencoded` に対応する。
//! 指定したフィールド名の値だけを出現順に取り出す。

pub mod multipart;

use std::borrow::Cow;

use log::debug;

use crate::common::parse_urlencoded_pairs;
use crate::error::Error;
use multipart::{boundary_from_content_type, MultipartParser};

/// フォームボディのエンコーディング
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEncoding {
    /// multipart/form-data
    Multipart { boundary: String },
    /// application/x-www-form-urlencoded
    UrlEncoded,
}

impl FormEncoding {
    /// Content-Typeヘッダーからエンコーディングを判定する
    pub fn from_content_type(content_type: Option<&str>) -> Result<Self, Error> {
        let content_type = content_type
            .ok_or_else(|| Error::MalformedBody("POST body without Content-Type".to_string()))?;
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "multipart/form-data" => Ok(FormEncoding::Multipart {
                boundary: boundary_from_content_type(content_type)?,
            }),
            "application/x-www-form-urlencoded" => Ok(FormEncoding::UrlEncoded),
            other => Err(Error::MalformedBody(format!(
                "unsupported form content type: {}",
                other
            ))),
        }
    }
}

/// アップロードされたファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// クライアントが送ったファイル名
    pub filename: String,
    /// パートのContent-Type
    pub content_type: Option<String>,
    /// ファイル内容
    pub data: Vec<u8>,
}

/// フォームボディから値を取り出す抽出器
#[derive(Debug, Clone)]
pub struct FieldExtractor<'a> {
    body: &'a [u8],
    encoding: FormEncoding,
}

impl<'a> FieldExtractor<'a> {
    /// Content-Typeとボディから抽出器を作成
    pub fn new(content_type: Option<&str>, body: &'a [u8]) -> Result<Self, Error> {
        Ok(Self {
            body,
            encoding: FormEncoding::from_content_type(content_type)?,
        })
    }

    /// 判定済みのエンコーディング
    pub fn encoding(&self) -> &FormEncoding {
        &self.encoding
    }

    /// 指定フィールドの値を出現順に集める（ファイルパートは除く）
    ///
    /// ボディ全体の構造を検証し終えてから値を返すため、
    /// 途中で壊れたボディは値を1つも返さずにエラーになる。
    fn matching_values(&self, field: &str) -> Result<Vec<Cow<'a, str>>, Error> {
        let mut values = Vec::new();
        match &self.encoding {
            FormEncoding::Multipart { boundary } => {
                for part in MultipartParser::new(self.body, boundary) {
                    let part = part?;
                    if part.name == field && !part.is_file() {
                        values.push(part.text());
                    }
                }
            }
            FormEncoding::UrlEncoded => {
                let text = String::from_utf8_lossy(self.body);
                for (key, value) in parse_urlencoded_pairs(text.trim_end_matches(&['\r', '\n'][..])) {
                    if key == field {
                        values.push(Cow::Owned(value));
                    }
                }
            }
        }
        Ok(values)
    }

    /// 指定フィールドの値ごとにハンドラを呼び出し、呼び出し回数を返す
    pub fn for_each_value<F>(&self, field: &str, mut handler: F) -> Result<usize, Error>
    where
        F: FnMut(&str),
    {
        let values = self.matching_values(field)?;
        debug!("form field '{}' has {} value(s)", field, values.len());
        for value in &values {
            handler(value.as_ref());
        }
        Ok(values.len())
    }

    /// 指定フィールドの値を出現順のVecとして取得
    pub fn values(&self, field: &str) -> Result<Vec<String>, Error> {
        Ok(self
            .matching_values(field)?
            .into_iter()
            .map(Cow::into_owned)
            .collect())
    }

    /// 指定フィールドの最初の値を取得
    pub fn first_value(&self, field: &str) -> Result<Option<String>, Error> {
        Ok(self
            .matching_values(field)?
            .into_iter()
            .next()
            .map(Cow::into_owned))
    }

    /// 指定フィールドの最初のファイルパートを取得（multipartのみ）
    pub fn file(&self, field: &str) -> Result<Option<UploadedFile>, Error> {
        let FormEncoding::Multipart { boundary } = &self.encoding else {
            return Ok(None);
        };
        let mut found = None;
        // 構造検証のため最後まで読み切る
        for part in MultipartParser::new(self.body, boundary) {
            let part = part?;
            if found.is_none() && part.name == field {
                if let Some(filename) = part.filename.clone() {
                    found = Some(UploadedFile {
                        filename,
                        content_type: part.content_type.clone(),
                        data: part.data.to_vec(),
                    });
                }
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CT: &str = "multipart/form-data; boundary=XyZ";

    fn multipart_body(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut out = String::new();
        for (name, value) in parts {
            out.push_str(&format!(
                "--XyZ\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                name, value
            ));
        }
        out.push_str("--XyZ--\r\n");
        out.into_bytes()
    }

    #[test]
    fn test_encoding_detection() {
        assert_eq!(
            FormEncoding::from_content_type(Some(CT)).unwrap(),
            FormEncoding::Multipart { boundary: "XyZ".to_string() }
        );
        assert_eq!(
            FormEncoding::from_content_type(Some("Application/X-WWW-Form-Urlencoded; charset=UTF-8")).unwrap(),
            FormEncoding::UrlEncoded
        );
        assert!(matches!(
            FormEncoding::from_content_type(Some("application/json")),
            Err(Error::MalformedBody(_))
        ));
        assert!(matches!(FormEncoding::from_content_type(None), Err(Error::MalformedBody(_))));
    }

    #[test]
    fn test_for_each_value_order_and_count() {
        let body = multipart_body(&[("cbox", "x"), ("name", "n"), ("cbox", "y"), ("cbox", "z")]);
        let extractor = FieldExtractor::new(Some(CT), &body).unwrap();
        assert_eq!(extractor.encoding(), &FormEncoding::Multipart { boundary: "XyZ".to_string() });

        let mut seen = Vec::new();
        let count = extractor.for_each_value("cbox", |v| seen.push(v.to_string())).unwrap();
        assert_eq!(count, 3);
        assert_eq!(seen, vec!["x", "y", "z"]);

        let mut calls = 0;
        extractor.for_each_value("absent", |_| calls += 1).unwrap();
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_malformed_body_never_calls_handler() {
        let mut body = multipart_body(&[("cbox", "x"), ("cbox", "y")]);
        body.truncate(body.len() - 12);
        let extractor = FieldExtractor::new(Some(CT), &body).unwrap();

        let mut calls = 0;
        let result = extractor.for_each_value("cbox", |_| calls += 1);
        assert!(matches!(result, Err(Error::MalformedBody(_))));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_urlencoded_values() {
        let body = b"cbox=x&cbox=a%20b&other=1\r\n";
        let extractor = FieldExtractor::new(Some("application/x-www-form-urlencoded"), body).unwrap();
        assert_eq!(extractor.encoding(), &FormEncoding::UrlEncoded);
        assert_eq!(extractor.values("cbox").unwrap(), vec!["x", "a b"]);
        assert_eq!(extractor.first_value("other").unwrap(), Some("1".to_string()));
        assert_eq!(extractor.first_value("none").unwrap(), None);
        assert_eq!(extractor.file("cbox").unwrap(), None);
    }

    #[test]
    fn test_file_parts_are_separate_from_values() {
        let body = "--XyZ\r\nContent-Disposition: form-data; name=\"doc\"; filename=\"r.csv\"\r\nContent-Type: text/csv\r\n\r\na,b\r\n--XyZ\r\nContent-Disposition: form-data; name=\"doc\"\r\n\r\nplain\r\n--XyZ--\r\n";
        let extractor = FieldExtractor::new(Some(CT), body.as_bytes()).unwrap();

        assert_eq!(extractor.values("doc").unwrap(), vec!["plain"]);
        let file = extractor.file("doc").unwrap().unwrap();
        assert_eq!(file.filename, "r.csv");
        assert_eq!(file.content_type.as_deref(), Some("text/csv"));
        assert_eq!(file.data, b"a,b".to_vec());
    }
}
