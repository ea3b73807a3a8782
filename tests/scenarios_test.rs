//! スクリプトドライバを通したシナリオテスト

use async_trait::async_trait;
use cgiscript::common::{Method, Request};
use cgiscript::config::HostConfig;
use cgiscript::error::Error;
use cgiscript::query::{Cell, DataHandle, DataSource, QueryResult, Row};
use cgiscript::script::{Script, ScriptContext, ScriptDriver};
use cgiscript::scripts::{FormSelectionScript, TableReportScript};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const BOUNDARY: &str = "----cgiscriptBoundary7MA4YWxkTrZu0gW";

fn multipart_request(fields: &[(&str, &str)]) -> Request {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            BOUNDARY, name, value
        ));
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));
    Request::new(Method::POST, "/form.jsx")
        .with_header("Content-Type", format!("multipart/form-data; boundary={}", BOUNDARY))
        .with_body(body)
}

async fn run_form(request: Request) -> String {
    let driver = ScriptDriver::builder()
        .script(FormSelectionScript::new())
        .build()
        .unwrap();
    let response = driver.execute(request).await.into_result().unwrap();
    assert_eq!(response.header("Content-Type"), Some("text/plain;charset=UTF-8"));
    String::from_utf8(response.body.unwrap_or_default()).unwrap()
}

#[tokio::test]
async fn test_scenario_a_two_values() {
    let body = run_form(multipart_request(&[("cbox", "x"), ("other", "1"), ("cbox", "y")])).await;
    assert_eq!(body, "Selected x,y\nDone");
}

#[tokio::test]
async fn test_scenario_b_no_values() {
    let body = run_form(multipart_request(&[("other", "1")])).await;
    assert_eq!(body, "No selections\nDone");
}

#[tokio::test]
async fn test_scenario_c_single_value() {
    let body = run_form(multipart_request(&[("cbox", "solo")])).await;
    assert_eq!(body, "Selected solo\nDone");
}

#[tokio::test]
async fn test_post_multi_count_matches_submissions() {
    for count in 0..6 {
        let values: Vec<String> = (0..count).map(|i| format!("v{}", i)).collect();
        let fields: Vec<(&str, &str)> = values.iter().map(|v| ("cbox", v.as_str())).collect();
        let body = run_form(multipart_request(&fields)).await;
        let expected = match count {
            0 => "No selections\nDone".to_string(),
            _ => format!("Selected {}\nDone", values.join(",")),
        };
        assert_eq!(body, expected);
    }
}

/// 固定の行を返すインメモリのデータソース
#[derive(Default)]
struct FixedRows {
    closes: Arc<AtomicUsize>,
}

struct FixedHandle {
    closes: Arc<AtomicUsize>,
}

impl DataSource for FixedRows {
    fn connect(&self, target: &str) -> Result<Box<dyn DataHandle>, Error> {
        if target.ends_with("missing.db") {
            return Err(Error::DataSourceOpen(format!("{}: unable to open database file", target)));
        }
        Ok(Box::new(FixedHandle { closes: Arc::clone(&self.closes) }))
    }
}

impl DataHandle for FixedHandle {
    fn query(&mut self, statement: &str, _params: &[Cell]) -> Result<QueryResult, Error> {
        if statement != "SELECT * FROM data" {
            return Err(Error::Query(format!("no such table in: {}", statement)));
        }
        QueryResult::new(
            vec!["id".to_string(), "name".to_string()],
            vec![
                Row::new(vec![Cell::Integer(1), Cell::from("a")]),
                Row::new(vec![Cell::Integer(2), Cell::from("b")]),
            ],
        )
    }

    fn close(&mut self) -> Result<(), Error> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_scenario_d_html_table() {
    let closes = Arc::new(AtomicUsize::new(0));
    let driver = ScriptDriver::builder()
        .script(TableReportScript::new())
        .data_source(FixedRows { closes: Arc::clone(&closes) })
        .build()
        .unwrap();

    let response = driver
        .execute(Request::new(Method::GET, "/sql.jsx"))
        .await
        .into_result()
        .unwrap();
    let html = String::from_utf8(response.body.unwrap()).unwrap();

    assert_eq!(
        html,
        "<html>\n<head>\n\t<title>Sqlite Test</title>\n</head>\n<body>\n<h1>Sqlite Test</h1>\
         <table border='1'>\n\t<caption>data</caption>\n\
         <tr><td>1</td><td>a</td></tr>\n\
         <tr><td>2</td><td>b</td></tr>\n\
         </table>\n</body>\n</html>"
    );
    assert_eq!(html.matches("<tr>").count(), 2);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_scenario_e_missing_database() {
    let config = HostConfig {
        db_path: "../data/missing.db".to_string(),
        ..HostConfig::default()
    };
    let driver = ScriptDriver::builder()
        .script(TableReportScript::new())
        .data_source(FixedRows::default())
        .config(config)
        .build()
        .unwrap();

    let execution = driver.execute(Request::new(Method::GET, "/sql.jsx")).await;
    assert!(matches!(execution.failure, Some(Error::DataSourceOpen(_))));
    assert_eq!(execution.response.status, 500);
    assert!(execution.response.body.is_some());
}

struct HeaderAfterPrint;

#[async_trait]
impl Script for HeaderAfterPrint {
    async fn run(&self, cx: &mut ScriptContext) -> Result<(), Error> {
        cx.response.set_header("X-First", "1")?;
        cx.response.set_header("x-first", "2")?;
        cx.response.print(["body"])?;
        match cx.response.set_header("X-Second", "1") {
            Err(Error::HeaderAfterBody(_)) => {}
            other => panic!("expected HeaderAfterBody, got {:?}", other),
        }
        cx.response.print([" more"])?;
        Ok(())
    }
}

#[tokio::test]
async fn test_header_after_body_is_rejected() {
    let driver = ScriptDriver::builder().script(HeaderAfterPrint).build().unwrap();
    let response = driver
        .execute(Request::new(Method::GET, "/"))
        .await
        .into_result()
        .unwrap();
    assert_eq!(response.headers, vec![("X-First".to_string(), "2".to_string())]);
    assert_eq!(response.body, Some(b"body more".to_vec()));
}

struct CloseTwice;

#[async_trait]
impl Script for CloseTwice {
    async fn run(&self, cx: &mut ScriptContext) -> Result<(), Error> {
        let mut db = cx.open_database("foo.db")?;
        let table = db.query("SELECT * FROM data")?;
        db.close()?;
        db.close()?;
        // 閉じた後も実体化済みの結果は読める
        for row in &table {
            assert_eq!(row.len(), table.column_count());
        }
        cx.response.print([table.len()])?;
        Ok(())
    }
}

#[tokio::test]
async fn test_close_twice_is_harmless() {
    let closes = Arc::new(AtomicUsize::new(0));
    let driver = ScriptDriver::builder()
        .script(CloseTwice)
        .data_source(FixedRows { closes: Arc::clone(&closes) })
        .build()
        .unwrap();
    let response = driver
        .execute(Request::new(Method::GET, "/"))
        .await
        .into_result()
        .unwrap();
    assert_eq!(response.body, Some(b"2".to_vec()));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use cgiscript::query::SqliteDataSource;
    use rusqlite::Connection;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_table_report_against_sqlite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foo.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE data (id INTEGER, name TEXT);
             INSERT INTO data VALUES (1, 'a');
             INSERT INTO data VALUES (2, '<b>b</b>');",
        )
        .unwrap();
        drop(conn);

        let config = HostConfig {
            db_path: path.to_string_lossy().into_owned(),
            ..HostConfig::default()
        };
        let driver = ScriptDriver::builder()
            .script(TableReportScript::new())
            .data_source(SqliteDataSource::new())
            .config(config)
            .build()
            .unwrap();

        let response = driver
            .execute(Request::new(Method::GET, "/sql.jsx"))
            .await
            .into_result()
            .unwrap();
        let html = String::from_utf8(response.body.unwrap()).unwrap();
        assert!(html.contains("<tr><td>1</td><td>a</td></tr>\n<tr><td>2</td><td><b>b</b></td></tr>\n"));
    }

    #[tokio::test]
    async fn test_table_report_missing_sqlite_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.db");
        let config = HostConfig {
            db_path: path.to_string_lossy().into_owned(),
            ..HostConfig::default()
        };
        let driver = ScriptDriver::builder()
            .script(TableReportScript::new())
            .data_source(SqliteDataSource::new())
            .config(config)
            .build()
            .unwrap();

        let execution = driver.execute(Request::new(Method::GET, "/sql.jsx")).await;
        assert!(matches!(execution.failure, Some(Error::DataSourceOpen(_))));
        assert_eq!(execution.response.status, 500);
        assert!(!path.exists());
    }
}
