//! 同梱スクリプト
//!
//! - [`FormSelectionScript`]: チェックボックス `cbox` の選択値を要約して返す
//! - [`TableReportScript`]: テーブルの全行をHTML（またはJSON）の表として返す

use async_trait::async_trait;
use log::{debug, warn};

use crate::common::Method;
use crate::config::is_valid_table_name;
use crate::error::Error;
use crate::query::{Database, QueryResult};
use crate::script::{Script, ScriptContext};

/// 選択値を集めるフォームフィールド名
pub const SELECTION_FIELD: &str = "cbox";

/// フォームの選択値を要約するスクリプト
#[derive(Debug, Clone, Default)]
pub struct FormSelectionScript;

impl FormSelectionScript {
    pub fn new() -> Self {
        Self
    }
}

/// 選択値の一覧から要約行を作る
pub fn selection_summary(selections: &[String]) -> String {
    match selections {
        [] => "No selections".to_string(),
        [only] => format!("Selected {}", only),
        many => format!("Selected {}", many.join(",")),
    }
}

#[async_trait]
impl Script for FormSelectionScript {
    async fn run(&self, cx: &mut ScriptContext) -> Result<(), Error> {
        cx.response.set_header("Content-Type", "text/plain;charset=UTF-8")?;
        cx.response.set_header("Cache-Control", "private, max-age=0, no-cache")?;

        let mut selections = Vec::new();
        if cx.request.method() == Method::POST {
            cx.request
                .post_multi(SELECTION_FIELD, |value| selections.push(value.to_string()))?;
        }
        debug!("{} selection(s) received", selections.len());

        cx.response.print([selection_summary(&selections)])?;
        cx.response.print(["\n", "Done"])?;
        Ok(())
    }
}

/// テーブルの内容を表として出力するスクリプト
///
/// 接続先とテーブル名は [`HostConfig`](crate::config::HostConfig) から取る。
/// セルの値はエスケープせずにそのまま埋め込む。
#[derive(Debug, Clone, Default)]
pub struct TableReportScript;

impl TableReportScript {
    pub fn new() -> Self {
        Self
    }
}

fn wants_json(cx: &ScriptContext) -> bool {
    cx.request
        .header("accept")
        .map(|accept| {
            accept
                .split(',')
                .any(|t| t.split(';').next().unwrap_or("").trim().eq_ignore_ascii_case("application/json"))
        })
        .unwrap_or(false)
}

/// クエリ結果をHTMLの表に整形する
pub fn render_html_table(caption: &str, table: &QueryResult) -> Vec<String> {
    let mut out = Vec::with_capacity(table.len() + 3);
    out.push("<table border='1'>\n".to_string());
    out.push(format!("\t<caption>{}</caption>\n", caption));
    for row in table {
        let mut line = String::from("<tr>");
        for cell in row {
            line.push_str(&format!("<td>{}</td>", cell));
        }
        line.push_str("</tr>\n");
        out.push(line);
    }
    out.push("</table>\n".to_string());
    out
}

/// `work` を実行してから接続を閉じる
///
/// `work` が失敗した場合はその診断を優先し、close の失敗は警告に留める。
pub fn close_after<T, F>(db: &mut Database, work: F) -> Result<T, Error>
where
    F: FnOnce(&mut Database) -> Result<T, Error>,
{
    let result = work(db);
    match (result, db.close()) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(e), close) => {
            if let Err(close_err) = close {
                warn!("Failed to close data source '{}' after error: {}", db.target(), close_err);
            }
            Err(e)
        }
    }
}

#[async_trait]
impl Script for TableReportScript {
    async fn run(&self, cx: &mut ScriptContext) -> Result<(), Error> {
        let json = wants_json(cx);
        let content_type = if json {
            "application/json;charset=UTF-8"
        } else {
            "text/html;charset=UTF-8"
        };
        cx.response.set_header("Content-Type", content_type)?;

        let table_name = cx.config().db_table.clone();
        if !is_valid_table_name(&table_name) {
            return Err(Error::Query(format!("invalid table name: {}", table_name)));
        }
        let target = cx.config().db_path.clone();

        let mut db = cx.open_database(&target)?;
        let table = close_after(&mut db, |db| db.query(&format!("SELECT * FROM {}", table_name)))?;

        if json {
            let body = serde_json::to_string(&table)
                .map_err(|e| Error::InternalServerError(format!("Failed to serialize result: {}", e)))?;
            cx.response.print([body])?;
            return Ok(());
        }

        cx.response.print([
            "<html>\n<head>\n\t<title>Sqlite Test</title>\n</head>\n<body>\n<h1>Sqlite Test</h1>",
        ])?;
        cx.response.print(render_html_table(&table_name, &table))?;
        cx.response.print(["</body>\n</html>"])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Request;
    use crate::query::{Cell, DataHandle, MockDataHandle, MockDataSource, Row};
    use crate::script::ScriptDriver;

    /// クエリもcloseも失敗する接続を返すデータソース
    fn failing_source() -> MockDataSource {
        let mut handle = MockDataHandle::new();
        handle
            .expect_query()
            .returning(|_, _| Err(Error::Query("no such table: data".to_string())));
        handle
            .expect_close()
            .times(1)
            .returning(|| Err(Error::InternalServerError("disk I/O error".to_string())));
        let mut source = MockDataSource::new();
        source
            .expect_connect()
            .return_once(move |_| Ok(Box::new(handle) as Box<dyn DataHandle>));
        source
    }

    #[test]
    fn test_selection_summary() {
        assert_eq!(selection_summary(&[]), "No selections");
        assert_eq!(selection_summary(&["solo".to_string()]), "Selected solo");
        assert_eq!(
            selection_summary(&["x".to_string(), "y".to_string()]),
            "Selected x,y"
        );
    }

    #[test]
    fn test_render_html_table_is_unescaped() {
        let table = QueryResult::new(
            vec!["id".to_string(), "name".to_string()],
            vec![
                Row::new(vec![Cell::Integer(1), Cell::from("<i>a</i>")]),
                Row::new(vec![Cell::Integer(2), Cell::Null]),
            ],
        )
        .unwrap();
        let html = render_html_table("data", &table).concat();
        assert_eq!(
            html,
            "<table border='1'>\n\t<caption>data</caption>\n<tr><td>1</td><td><i>a</i></td></tr>\n<tr><td>2</td><td>null</td></tr>\n</table>\n"
        );
    }

    #[test]
    fn test_close_after_keeps_work_error() {
        // close の失敗よりクエリの診断を優先する
        let source = failing_source();
        let mut db = Database::open(&source, "foo.db").unwrap();
        let result = close_after(&mut db, |db| db.query("SELECT * FROM data"));
        match result {
            Err(Error::Query(msg)) => assert!(msg.contains("no such table")),
            other => panic!("expected Query error, got {:?}", other),
        }
        assert!(db.is_closed());
    }

    #[test]
    fn test_close_after_reports_close_error_on_success() {
        let mut handle = MockDataHandle::new();
        handle
            .expect_close()
            .returning(|| Err(Error::InternalServerError("disk I/O error".to_string())));
        let mut source = MockDataSource::new();
        source
            .expect_connect()
            .return_once(move |_| Ok(Box::new(handle) as Box<dyn DataHandle>));

        let mut db = Database::open(&source, "foo.db").unwrap();
        let result = close_after(&mut db, |_| Ok(1));
        assert!(matches!(result, Err(Error::InternalServerError(_))));
    }

    #[tokio::test]
    async fn test_table_report_query_error_survives_close_error() {
        let driver = ScriptDriver::builder()
            .script(TableReportScript::new())
            .data_source(failing_source())
            .build()
            .unwrap();
        let execution = driver.execute(Request::new(Method::GET, "/sql.jsx")).await;
        match execution.failure {
            Some(Error::Query(msg)) => assert!(msg.contains("no such table")),
            other => panic!("expected Query error, got {:?}", other),
        }
        assert_eq!(execution.response.status, 500);
    }
}
