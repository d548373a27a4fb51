//! Application entry point for livewatch.
//!
//! Initializes all components and either runs the scheduler or a single
//! command given on the command line.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use anyhow::bail;
use chrono::Utc;
use dotenv::dotenv;
use livewatch::catalog::Catalog;
use livewatch::catalog::credentials::ClientCredentials;
use livewatch::catalog::credentials::CredentialCache;
use livewatch::catalog::twitch_catalog::TwitchCatalog;
use livewatch::config::Config;
use livewatch::logging::setup_logging;
use livewatch::repository::Repository;
use livewatch::service::Services;
use livewatch::sink::NotificationSink;
use livewatch::sink::discord_webhook_sink::DiscordWebhookSink;
use livewatch::task::scheduler::Scheduler;
use livewatch::task::trigger::Trigger;
use livewatch::task::trigger::handle_trigger;
use log::debug;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let init_start = Instant::now();
    let config = load_config().await?;
    let args: Vec<String> = std::env::args().skip(1).collect();

    let sink: Arc<dyn NotificationSink> = Arc::new(DiscordWebhookSink::new()?);
    if let [command, endpoint] = args.as_slice()
        && command == "validate"
    {
        let reachable = sink.validate(endpoint).await;
        println!("{}", if reachable { "reachable" } else { "unreachable" });
        return Ok(());
    }

    let db = setup_database(&config, init_start).await?;
    let catalog = setup_catalog(&config)?;
    let services = Arc::new(Services::new(&config, db, catalog, sink));

    match args.first().map(String::as_str) {
        None => run(&config, services, init_start).await,
        Some("status") => {
            let summary = services.stats.daily_summary(Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Some(command) => {
            let trigger: Trigger = match command.parse() {
                Ok(trigger) => trigger,
                Err(e) => bail!("{e}. Usage: livewatch [discovery|cleanup|status|validate <endpoint>]"),
            };
            let report = handle_trigger(&services, trigger).await?;
            println!("{report}");
            Ok(())
        }
    }
}

async fn load_config() -> Result<Arc<Config>> {
    debug!("Loading configuration...");
    let mut config = Config::new();
    config.load()?;
    let config = Arc::new(config);
    setup_logging(&config)?;
    info!("Starting livewatch...");
    Ok(config)
}

async fn setup_database(config: &Config, init_start: Instant) -> Result<Arc<Repository>> {
    debug!("Setting up Database...");
    let db = Arc::new(Repository::new(&config.db_url, &config.db_path).await?);

    info!("Running database migrations...");
    db.run_migrations().await?;
    info!(
        "Database setup complete ({:.2}s).",
        init_start.elapsed().as_secs_f64()
    );

    Ok(db)
}

fn setup_catalog(config: &Config) -> Result<Arc<dyn Catalog>> {
    debug!("Setting up Catalog...");
    let source = Arc::new(ClientCredentials::new(
        &config.twitch_auth_url,
        &config.twitch_client_id,
        &config.twitch_client_secret,
    )?);
    let credentials = Arc::new(CredentialCache::new(&config.twitch_client_id, source));
    let catalog = TwitchCatalog::new(
        &config.twitch_api_url,
        config.catalog_page_size,
        credentials,
    )?;
    Ok(Arc::new(catalog))
}

async fn run(config: &Config, services: Arc<Services>, init_start: Instant) -> Result<()> {
    let scheduler = Scheduler::new(
        services,
        config.discovery_interval,
        config.cleanup_interval,
        config.cycle_timeout,
    );
    scheduler.clone().start()?;

    info!(
        "livewatch is up in {:.2}s. Press Ctrl+C to stop.",
        init_start.elapsed().as_secs_f64()
    );

    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down.");
    scheduler.stop();

    Ok(())
}
