use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::FormatoLog;

/// Filtro usado quando `RUST_LOG` não está definido
const FILTRO_PADRAO: &str = "info,sqlx=warn,tower_http=info";

pub fn init_tracing(formato: FormatoLog) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(FILTRO_PADRAO));
    let registry = tracing_subscriber::registry().with(filter);
    match formato {
        FormatoLog::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()?,
        FormatoLog::Texto => registry.with(fmt::layer().with_target(true)).try_init()?,
    }
    Ok(())
}
