//! エラーログファイルへの記録

use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::Local;
use log::warn;

/// エラー内容をログファイルに追記する
///
/// ログファイルに書けない場合は警告を出すだけで処理を続ける。
pub fn log_error_to_file(path: &Path, message: &str) {
    let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f UTC");
    let local_time = Local::now().format("%Y-%m-%d %H:%M:%S%.3f %Z");

    let file = OpenOptions::new().create(true).append(true).open(path);
    let mut file = match file {
        Ok(f) => f,
        Err(e) => {
            warn!("Cannot open error log {}: {}", path.display(), e);
            return;
        }
    };
    let separator = "=".repeat(80);
    let entry = format!(
        "{sep}\nCGISCRIPT ERROR\nTimestamp (UTC): {}\nTimestamp (Local): {}\nProcess ID: {}\n{}\n{}\n{sep}\n\n",
        timestamp,
        local_time,
        std::process::id(),
        "-".repeat(80),
        message,
        sep = separator,
    );
    if let Err(e) = file.write_all(entry.as_bytes()) {
        warn!("Cannot write error log {}: {}", path.display(), e);
    }
}

/// 失敗時に記録するCGI環境の要約（機密値はマスク）
pub fn gather_cgi_context(method: &str, path: &str) -> String {
    let mut lines = vec![
        "CGI context:".to_string(),
        format!("  REQUEST_METHOD={}", method),
        format!("  PATH_INFO={}", path),
    ];

    let vars = [
        "QUERY_STRING",
        "CONTENT_TYPE",
        "CONTENT_LENGTH",
        "SERVER_NAME",
        "REMOTE_ADDR",
        "HTTP_HOST",
        "HTTP_USER_AGENT",
        "HTTP_ACCEPT",
        "HTTP_AUTHORIZATION",
        "HTTP_COOKIE",
    ];
    for key in vars {
        if let Ok(val) = env::var(key) {
            lines.push(format!("  {}={}", key, redact_value_for_log(key, &val)));
        }
    }
    lines.join("\n")
}

/// ログ用に値をマスク・切り詰めする
pub fn redact_value_for_log(key: &str, value: &str) -> String {
    let key_l = key.to_ascii_lowercase();
    if key_l == "query_string" {
        return redact_query_string(value);
    }
    if is_sensitive_key_like(&key_l) {
        return "***redacted***".to_string();
    }
    match value.char_indices().nth(200) {
        Some((cut, _)) => format!("{}...[truncated]", &value[..cut]),
        None => value.to_string(),
    }
}

/// 機密情報を含みそうなキー名か
pub fn is_sensitive_key_like(lower_key: &str) -> bool {
    const PATTERNS: [&str; 10] = [
        "authorization",
        "cookie",
        "token",
        "secret",
        "password",
        "pass",
        "session",
        "csrf",
        "key",
        "auth",
    ];
    PATTERNS.iter().any(|p| lower_key.contains(p))
}

/// クエリ文字列中の機密パラメータの値をマスクする
pub fn redact_query_string(qs: &str) -> String {
    qs.split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            if is_sensitive_key_like(&k.to_ascii_lowercase()) {
                format!("{}=***redacted***", k)
            } else {
                format!("{}={}", k, v)
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}
