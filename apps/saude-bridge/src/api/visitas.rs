//! Agenda de visitas domiciliares

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use saude_core::agenda::{verificar_conflito, MotivoVisita, StatusVisita, VisitaAgendada};
use saude_db::repositorio::cidadaos;
use saude_db::repositorio::visitas::{self, FiltroVisitas};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Visita com os campos derivados que a agenda exibe
#[derive(Serialize)]
struct VisitaDetalhada {
    #[serde(flatten)]
    visita: VisitaAgendada,
    cor_status: &'static str,
    atrasada: bool,
    hoje: bool,
    pode_ser_cancelada: bool,
}

impl VisitaDetalhada {
    fn new(visita: VisitaAgendada, agora: DateTime<Utc>) -> Self {
        Self {
            cor_status: visita.cor_status(),
            atrasada: visita.eh_atrasada(agora),
            hoje: visita.eh_hoje(agora),
            pode_ser_cancelada: visita.pode_ser_cancelada(agora),
            visita,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
struct NovaVisita {
    cidadao_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    agente: String,
    data_visita: DateTime<Utc>,
    motivo: MotivoVisita,
    #[serde(default)]
    #[validate(length(max = 1000))]
    observacoes: String,
}

async fn agendar_visita(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NovaVisita>,
) -> ApiResult<(StatusCode, Json<VisitaDetalhada>)> {
    payload.validate()?;
    if !cidadaos::existe(&state.pool, payload.cidadao_id).await? {
        return Err(ApiError::NaoEncontrado(format!(
            "Cidadão {} não encontrado",
            payload.cidadao_id
        )));
    }

    let agora = Utc::now();
    let visita = VisitaAgendada::agendar(
        payload.cidadao_id,
        payload.agente.trim().to_string(),
        payload.data_visita,
        payload.motivo,
        payload.observacoes,
        agora,
    )?;
    let proximas = visitas::em_aberto_proximas(&state.pool, visita.cidadao_id, visita.data_visita).await?;
    verificar_conflito(visita.data_visita, &proximas, None)?;

    visitas::inserir(&state.pool, &visita).await?;
    info!(visita_id = %visita.id, cidadao_id = %visita.cidadao_id, data = %visita.data_visita, "Visita agendada");
    Ok((StatusCode::CREATED, Json(VisitaDetalhada::new(visita, agora))))
}

#[derive(Debug, Deserialize)]
struct ListagemQuery {
    agente: Option<String>,
    cidadao_id: Option<Uuid>,
    status: Option<StatusVisita>,
    inicio: Option<DateTime<Utc>>,
    fim: Option<DateTime<Utc>>,
}

async fn listar_visitas(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListagemQuery>,
) -> ApiResult<Json<Vec<VisitaDetalhada>>> {
    let filtro = FiltroVisitas {
        agente: query.agente.filter(|a| !a.trim().is_empty()),
        cidadao_id: query.cidadao_id,
        status: query.status,
        inicio: query.inicio,
        fim: query.fim,
    };
    let agora = Utc::now();
    Ok(Json(
        visitas::listar(&state.pool, &filtro)
            .await?
            .into_iter()
            .map(|v| VisitaDetalhada::new(v, agora))
            .collect(),
    ))
}

async fn obter_visita(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<VisitaDetalhada>> {
    let visita = visitas::buscar(&state.pool, id).await?;
    Ok(Json(VisitaDetalhada::new(visita, Utc::now())))
}

async fn confirmar_visita(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<VisitaDetalhada>> {
    let agora = Utc::now();
    let mut visita = visitas::buscar(&state.pool, id).await?;
    visita.confirmar(agora)?;
    visitas::atualizar(&state.pool, &visita).await?;
    Ok(Json(VisitaDetalhada::new(visita, agora)))
}

#[derive(Debug, Deserialize, Validate)]
struct DadosRealizacao {
    #[validate(range(min = 1, max = 600))]
    duracao_minutos: Option<u32>,
    #[serde(default)]
    relatorio: String,
}

async fn realizar_visita(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DadosRealizacao>,
) -> ApiResult<Json<VisitaDetalhada>> {
    payload.validate()?;
    let agora = Utc::now();
    let mut visita = visitas::buscar(&state.pool, id).await?;
    visita.registrar_realizacao(payload.duracao_minutos, payload.relatorio, agora)?;
    visitas::atualizar(&state.pool, &visita).await?;
    info!(visita_id = %id, "Visita realizada");
    Ok(Json(VisitaDetalhada::new(visita, agora)))
}

#[derive(Debug, Default, Deserialize)]
struct DadosCancelamento {
    motivo: Option<String>,
}

async fn cancelar_visita(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<DadosCancelamento>>,
) -> ApiResult<Json<VisitaDetalhada>> {
    let dados = payload.map(|Json(dados)| dados).unwrap_or_default();
    let agora = Utc::now();
    let mut visita = visitas::buscar(&state.pool, id).await?;
    visita.cancelar(dados.motivo.as_deref(), agora)?;
    visitas::atualizar(&state.pool, &visita).await?;
    info!(visita_id = %id, "Visita cancelada");
    Ok(Json(VisitaDetalhada::new(visita, agora)))
}

#[derive(Debug, Deserialize)]
struct DadosReagendamento {
    nova_data: DateTime<Utc>,
}

async fn reagendar_visita(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DadosReagendamento>,
) -> ApiResult<(StatusCode, Json<VisitaDetalhada>)> {
    let agora = Utc::now();
    let mut antiga = visitas::buscar(&state.pool, id).await?;
    let nova = antiga.reagendar(payload.nova_data, agora)?;

    let proximas = visitas::em_aberto_proximas(&state.pool, nova.cidadao_id, nova.data_visita).await?;
    verificar_conflito(nova.data_visita, &proximas, Some(antiga.id))?;

    visitas::reagendar(&state.pool, &antiga, &nova).await?;
    Ok((StatusCode::CREATED, Json(VisitaDetalhada::new(nova, agora))))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/visitas", post(agendar_visita).get(listar_visitas))
        .route("/visitas/:id", get(obter_visita))
        .route("/visitas/:id/confirmar", post(confirmar_visita))
        .route("/visitas/:id/realizar", post(realizar_visita))
        .route("/visitas/:id/cancelar", post(cancelar_visita))
        .route("/visitas/:id/reagendar", post(reagendar_visita))
}
