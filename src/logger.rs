//! logger.rs
//! Logger de la aplicación (env_logger). `RUST_LOG` tiene prioridad.

const DEFAULT_FILTER: &str = "info,sqlx=warn";

pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_FILTER))
        .format_timestamp_secs()
        .init();
}
