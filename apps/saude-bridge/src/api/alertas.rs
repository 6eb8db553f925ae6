use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use saude_core::modelos::{AlertaSaude, PrioridadeAlerta};
use saude_db::repositorio::alertas::{self, FiltroAlertas};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::paginacao;
use crate::error::ApiResult;
use crate::servicos::lgpd::Solicitante;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct ListagemQuery {
    cidadao_id: Option<Uuid>,
    prioridade: Option<PrioridadeAlerta>,
    #[serde(default)]
    incluir_resolvidos: bool,
    pagina: Option<u32>,
    por_pagina: Option<u32>,
}

async fn listar_alertas(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListagemQuery>,
) -> ApiResult<Json<Vec<AlertaSaude>>> {
    let filtro = FiltroAlertas {
        cidadao_id: query.cidadao_id,
        prioridade: query.prioridade,
        incluir_resolvidos: query.incluir_resolvidos,
        paginacao: paginacao(query.pagina, query.por_pagina),
    };
    Ok(Json(alertas::listar(&state.pool, &filtro).await?))
}

async fn marcar_visualizado(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    alertas::marcar_visualizado(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
struct DadosResolucao {
    resolvido_por: Option<String>,
}

async fn resolver_alerta(
    State(state): State<Arc<AppState>>,
    solicitante: Solicitante,
    Path(id): Path<Uuid>,
    payload: Option<Json<DadosResolucao>>,
) -> ApiResult<Json<AlertaSaude>> {
    let dados = payload.map(|Json(dados)| dados).unwrap_or_default();
    let resolvido_por = dados
        .resolvido_por
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or(solicitante.usuario);
    Ok(Json(alertas::resolver(&state.pool, id, &resolvido_por, Utc::now()).await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/alertas", get(listar_alertas))
        .route("/alertas/:id/visualizar", post(marcar_visualizado))
        .route("/alertas/:id/resolver", post(resolver_alerta))
}
