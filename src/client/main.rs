/**
 * Wardrobe Sync Entry Point
 *
 * Hydrates the local cache from SQLite and runs one sync cycle for a user.
 *
 *   wardrobe-sync [--config PATH] [USER_ID]
 *
 * USER_ID falls back to WARDROBE_USER_ID; WARDROBE_TOKEN sets the bearer token.
 */

use std::path::PathBuf;
use std::sync::Arc;
use wardrobe_core::client::sync::{SyncOutcome, SyncTrigger};
use wardrobe_core::client::{AppState, Config, HttpBackend, LocalDatabase};
use wardrobe_core::shared::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let mut config_path: Option<PathBuf> = None;
    let mut user_id = std::env::var("WARDROBE_USER_ID").ok();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = args.next().map(PathBuf::from),
            _ => user_id = Some(arg),
        }
    }
    let user_id = user_id.ok_or("usage: wardrobe-sync [--config PATH] USER_ID")?;

    let app_config = match &config_path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    }
    .with_env_overrides()?;
    tracing::info!("Using server {}", app_config.server_url);

    let database = LocalDatabase::open(app_config.database_path()).await?;
    let mut config = Config::from_app(app_config.clone());
    config.set_token(std::env::var("WARDROBE_TOKEN").ok());
    let backend = Arc::new(HttpBackend::new(config)?);

    let state = AppState::initialize(app_config, Arc::new(database), backend).await?;
    state.sync.set_user(user_id.as_str()).await;

    let Some(outcome) = state.sync.trigger(SyncTrigger::Startup).await else {
        return Ok(());
    };
    for (kind, result) in [("items", &outcome.items), ("outfits", &outcome.outfits)] {
        match result {
            SyncOutcome::Completed(report) => println!(
                "{kind}: {} fetched, {} flushed, {} pending, {} conflicts",
                report.fetched,
                report.flushed,
                report.pending_remaining,
                report.conflicts.len()
            ),
            SyncOutcome::Failed { status, error } => println!("{kind}: {status} ({error})"),
            other => println!("{kind}: {other:?}"),
        }
    }
    Ok(())
}
