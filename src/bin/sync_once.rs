//! Runs one full catalog sync with the configured backends and prints the report.
//!
//! $ cargo run --bin sync_once -- --settings=settings/dev.toml

use moviehub::logger::*;
use moviehub::server::*;
use moviehub::settings::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap();
    let project_settings = parse_settings(cli.settings.as_deref())?;
    logger.reload_from_config(&LogConfig::from(&project_settings.log))?;

    let server = Server::try_new_without_scheduler(&project_settings).await?;
    let outcome = server.catalog_sync.run_full_sync().await;
    server.shutdown().await;

    match outcome {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(e.report())?);
            Err(e.into())
        }
    }
}
