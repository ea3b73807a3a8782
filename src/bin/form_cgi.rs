//! フォーム選択スクリプトのCGIエントリポイント

use cgiscript::cgi;
use cgiscript::config::HostConfig;
use cgiscript::script::ScriptDriver;
use cgiscript::scripts::FormSelectionScript;
use env_logger::Env;
use log::{error, info};

#[tokio::main]
async fn main() {
    // CGIでは標準出力がHTTPレスポンスとなるため、ログは標準エラー出力に出力する
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("Starting form-cgi");

    let driver = match ScriptDriver::builder()
        .script(FormSelectionScript::new())
        .config(HostConfig::from_env())
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
