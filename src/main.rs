use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use twiga_mirror::config::Environment;
use twiga_mirror::relay::WhatsAppRelay;
use twiga_mirror::source::PgMessageSource;
use twiga_mirror::{AppConfig, ChatSession};

/// Bundled defaults for builds that ship without a `.env` file.
const BUNDLED_CONFIG: &str = include_str!("../assets/config.env");

#[cfg(not(target_arch = "wasm32"))]
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }
    load_bundled_config();
}

#[cfg(target_arch = "wasm32")]
fn load_dotenv() {
    load_bundled_config();
}

fn load_bundled_config() {
    for line in BUNDLED_CONFIG.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        // Real environment wins over the bundled file.
        if std::env::var(key).is_err() {
            // SAFETY: runs at startup before any other thread exists.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
}

fn init_tracing(environment: Environment) {
    let level = match environment {
        Environment::Development => LevelFilter::DEBUG,
        Environment::Test | Environment::Production => LevelFilter::INFO,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn build_session(config: &AppConfig) -> anyhow::Result<ChatSession> {
    let source = PgMessageSource::new(&config.database_url).context("invalid DATABASE_URL")?;
    let relay = WhatsAppRelay::new(config.callback_url.clone(), config.recipient_id.clone());
    Ok(ChatSession::new(
        Arc::new(source),
        Arc::new(relay),
        config.session.clone(),
    ))
}

fn main() -> anyhow::Result<()> {
    load_dotenv();
    let config = AppConfig::from_env().context("failed to load configuration")?;
    init_tracing(config.environment);
    info!(
        environment = ?config.environment,
        callback = %config.callback_url,
        fetch_limit = config.session.fetch_limit,
        "starting chat mirror"
    );

    let session = build_session(&config)?;
    dioxus::LaunchBuilder::new()
        .with_context(session)
        .launch(twiga_mirror::ui::App);
    Ok(())
}
