//! テーブル一覧スクリプトのCGIエントリポイント

use cgiscript::cgi;
use cgiscript::config::HostConfig;
use cgiscript::query::SqliteDataSource;
use cgiscript::script::ScriptDriver;
use cgiscript::scripts::TableReportScript;
use env_logger::Env;
use log::{error, info};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = HostConfig::from_env();
    info!("Starting table-cgi (database: {})", config.db_path);

    let source = SqliteDataSource::new().with_busy_timeout(config.busy_timeout);
    let driver = match ScriptDriver::builder()
        .script(TableReportScript::new())
        .data_source(source)
        .config(config)
        .build()
    {
        Ok(driver) => driver,
        Err(err) => {
            error!("Failed to build script driver: {:?}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = cgi::run_cgi(&driver).await {
        error!("Error running CGI script: {:?}", err);
        std::process::exit(1);
    }
}
