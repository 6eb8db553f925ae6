//! Rotas HTTP sob `/api/v1`
//!
//! Cada submódulo expõe `router()` com as rotas do seu recurso; `app_router`
//! junta tudo e aplica as camadas de CORS, compressão, timeout, limite de
//! concorrência e trace.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderValue, Method},
    Router,
};
use saude_db::repositorio::Paginacao;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;

use crate::config::Config;
use crate::servicos::lgpd::Solicitante;
use crate::state::AppState;

mod alertas;
mod anamneses;
mod cidadaos;
mod coletas;
mod dashboard;
mod lgpd;
mod mapa;
mod saude;
mod visitas;

#[cfg(test)]
mod tests;

/// Cabeçalho com o identificador de quem opera o sistema
pub const CABECALHO_USUARIO: &str = "x-usuario";

fn cors(config: &Config) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);
    if config.cors_allow.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }
    let origens: Vec<HeaderValue> = config
        .cors_allow
        .iter()
        .filter_map(|origem| match origem.parse() {
            Ok(valor) => Some(valor),
            Err(_) => {
                warn!(origem, "Origem CORS inválida ignorada");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origens))
}

pub fn app_router(state: Arc<AppState>) -> Router {
    let cors = cors(&state.config);
    let timeout = state.config.request_timeout;
    let limite = state.config.max_requisicoes_simultaneas;

    let api = Router::new()
        .merge(saude::router())
        .merge(cidadaos::router())
        .merge(coletas::router())
        .merge(anamneses::router())
        .merge(alertas::router())
        .merge(mapa::router())
        .merge(dashboard::router())
        .merge(visitas::router())
        .merge(lgpd::router());

    Router::new()
        .nest("/api/v1", api)
        .with_state(state)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TimeoutLayer::new(timeout))
        .layer(ConcurrencyLimitLayer::new(limite))
        .layer(TraceLayer::new_for_http())
}

fn cabecalho(parts: &Parts, nome: &str) -> Option<String> {
    parts
        .headers
        .get(nome)
        .and_then(|valor| valor.to_str().ok())
        .map(|valor| valor.trim().to_string())
        .filter(|valor| !valor.is_empty())
}

/// Identifica o solicitante pelos cabeçalhos; a trilha de auditoria da LGPD
/// grava usuário, IP, user agent e URL de cada acesso.
#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Solicitante {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip_address = cabecalho(parts, "x-forwarded-for")
            .and_then(|lista| lista.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| cabecalho(parts, "x-real-ip"));

        Ok(Solicitante {
            usuario: cabecalho(parts, CABECALHO_USUARIO).unwrap_or_else(|| "anonimo".to_string()),
            ip_address,
            user_agent: cabecalho(parts, header::USER_AGENT.as_str()).unwrap_or_default(),
            url: parts.uri.to_string(),
        })
    }
}

/// Página pedida na query string; ausente vale 1 com 50 itens
pub fn paginacao(pagina: Option<u32>, por_pagina: Option<u32>) -> Paginacao {
    let padrao = Paginacao::default();
    Paginacao {
        pagina: pagina.unwrap_or(padrao.pagina),
        por_pagina: por_pagina.unwrap_or(padrao.por_pagina),
    }
}
