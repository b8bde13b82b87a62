use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use droopy::config::{Args, Config};
use droopy::language::Localisations;
use droopy::server::{print_startup_banner, run};
use droopy::state::AppState;
use droopy::storage::spawn_sweeper;
use droopy::tls::load_acceptor;

// use mimalloc as the global allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> ExitCode {
    // load .env file if it exists (fails silently if not found)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_args(Args::parse()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(1);
        }
    };

    // create the directory if it doesn't exist
    if !config.directory.exists() {
        if let Err(e) = std::fs::create_dir_all(&config.directory) {
            tracing::error!("Failed to create directory {:?}: {}", config.directory, e);
            return ExitCode::from(1);
        }
        tracing::info!("Created upload directory at: {:?}", config.directory);
    }

    let mut localisations = Localisations::default();
    if let Some(path) = &config.translations {
        if let Err(e) = localisations.merge_file(path) {
            tracing::error!("{}", e);
            return ExitCode::from(1);
        }
    }

    let acceptor = match &config.tls {
        Some(settings) => match load_acceptor(settings) {
            Ok(acceptor) => Some(acceptor),
            Err(e) => {
                tracing::error!("TLS setup failed: {}", e);
                return ExitCode::from(2);
            }
        },
        None => None,
    };

    print_startup_banner(&config, &localisations);
    let state = match AppState::new(config, localisations) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(1);
        }
    };

    // first sweep runs right away, then on the interval
    if let Err(e) = spawn_sweeper(
        state.config.directory.clone(),
        state.config.temp_max_age,
        state.config.sweep_interval,
        state.in_flight.clone(),
    ) {
        tracing::warn!("Temp sweeper not started: {}", e);
    }

    match run(state, acceptor) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(1)
        }
    }
}
