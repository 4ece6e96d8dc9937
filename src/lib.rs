pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use shared::{AppConfig, AppError, Result};
pub use state::AppState;

const DEFAULT_LOG_FILTER: &str = "fieldcheck=debug,info";

/// `RUST_LOG` が未設定なら `fieldcheck=debug,info` でログを初期化する
pub fn init_logging() {
    if let Err(err) = init_logging_with(DEFAULT_LOG_FILTER, false) {
        eprintln!("logging already initialised: {err}");
    }
}

pub fn init_logging_with(default_filter: &str, json: bool) -> anyhow::Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = if json {
        fmt::layer().json().with_current_span(false).boxed()
    } else {
        fmt::layer().with_thread_ids(false).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
