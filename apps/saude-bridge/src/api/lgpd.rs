//! Direitos do titular e conformidade com a LGPD

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use saude_core::lgpd::{
    AuditoriaAcesso, Consentimento, DadosAnonimizados, Finalidade, Severidade, TipoAcao,
    TipoViolacao, ViolacaoDados,
};
use saude_db::repositorio::{cidadaos, lgpd};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::servicos::lgpd::{
    anonimizar_cidadao, auditar, conceder_consentimento, relatorio_cidadao,
    relatorio_conformidade, revogar_consentimento, RelatorioCidadao, RelatorioConformidade,
    Solicitante,
};
use crate::state::AppState;

/// Janela padrão do histórico de acessos
const DIAS_ACESSOS_PADRAO: i64 = 30;

#[derive(Debug, Deserialize)]
struct PedidoConsentimento {
    cidadao_id: Uuid,
    finalidade: Finalidade,
}

async fn conceder(
    State(state): State<Arc<AppState>>,
    solicitante: Solicitante,
    Json(pedido): Json<PedidoConsentimento>,
) -> ApiResult<(StatusCode, Json<Consentimento>)> {
    let consentimento = conceder_consentimento(
        &state.pool,
        pedido.cidadao_id,
        pedido.finalidade,
        &solicitante,
        Utc::now(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(consentimento)))
}

#[derive(Serialize)]
struct SituacaoConsentimento {
    cidadao_id: Uuid,
    finalidade: Finalidade,
    ativo: bool,
}

async fn verificar(
    State(state): State<Arc<AppState>>,
    Json(pedido): Json<PedidoConsentimento>,
) -> ApiResult<Json<SituacaoConsentimento>> {
    let ativo = lgpd::consentimento_ativo(&state.pool, pedido.cidadao_id, pedido.finalidade, Utc::now())
        .await?;
    Ok(Json(SituacaoConsentimento {
        cidadao_id: pedido.cidadao_id,
        finalidade: pedido.finalidade,
        ativo,
    }))
}

async fn revogar(
    State(state): State<Arc<AppState>>,
    solicitante: Solicitante,
    Json(pedido): Json<PedidoConsentimento>,
) -> ApiResult<Json<Consentimento>> {
    revogar_consentimento(
        &state.pool,
        pedido.cidadao_id,
        pedido.finalidade,
        &solicitante,
        Utc::now(),
    )
    .await?
    .map(Json)
    .ok_or_else(|| {
        ApiError::NaoEncontrado(format!(
            "Nenhum consentimento de {} para {}",
            pedido.cidadao_id, pedido.finalidade
        ))
    })
}

async fn consentimentos(
    State(state): State<Arc<AppState>>,
    Path(cidadao_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Consentimento>>> {
    if !cidadaos::existe(&state.pool, cidadao_id).await? {
        return Err(ApiError::NaoEncontrado(format!("Cidadão {} não encontrado", cidadao_id)));
    }
    Ok(Json(lgpd::consentimentos_do_cidadao(&state.pool, cidadao_id).await?))
}

#[derive(Debug, Deserialize)]
struct AcessosQuery {
    dias: Option<i64>,
}

async fn acessos(
    State(state): State<Arc<AppState>>,
    Path(cidadao_id): Path<Uuid>,
    Query(query): Query<AcessosQuery>,
) -> ApiResult<Json<Vec<AuditoriaAcesso>>> {
    let dias = query.dias.unwrap_or(DIAS_ACESSOS_PADRAO).clamp(1, 3650);
    let desde = Utc::now() - Duration::days(dias);
    Ok(Json(lgpd::historico_acessos(&state.pool, cidadao_id, desde).await?))
}

async fn relatorio(
    State(state): State<Arc<AppState>>,
    solicitante: Solicitante,
    Path(cidadao_id): Path<Uuid>,
) -> ApiResult<Json<RelatorioCidadao>> {
    Ok(Json(relatorio_cidadao(&state, cidadao_id, &solicitante, Utc::now()).await?))
}

async fn anonimizar(
    State(state): State<Arc<AppState>>,
    solicitante: Solicitante,
    Path(cidadao_id): Path<Uuid>,
) -> ApiResult<Json<DadosAnonimizados>> {
    Ok(Json(anonimizar_cidadao(&state, cidadao_id, &solicitante, Utc::now()).await?))
}

async fn conformidade(State(state): State<Arc<AppState>>) -> ApiResult<Json<RelatorioConformidade>> {
    Ok(Json(relatorio_conformidade(&state.pool, Utc::now()).await?))
}

#[derive(Debug, Deserialize, Validate)]
struct NovaViolacao {
    tipo_violacao: TipoViolacao,
    severidade: Severidade,
    #[validate(length(min = 10))]
    descricao: String,
    #[serde(default)]
    cidadaos_afetados: Vec<Uuid>,
    #[serde(default)]
    tipos_dados_afetados: Vec<String>,
    data_ocorrencia_estimada: Option<DateTime<Utc>>,
    #[serde(default)]
    acoes_corretivas: String,
}

/// Violação com o prazo da ANPD calculado no momento da consulta
#[derive(Serialize)]
struct ViolacaoDetalhada {
    #[serde(flatten)]
    violacao: ViolacaoDados,
    deve_notificar_anpd: bool,
    horas_restantes_anpd: Option<i64>,
}

impl ViolacaoDetalhada {
    fn new(violacao: ViolacaoDados, agora: DateTime<Utc>) -> Self {
        Self {
            deve_notificar_anpd: violacao.deve_notificar_anpd(agora),
            horas_restantes_anpd: violacao.horas_restantes_anpd(agora),
            violacao,
        }
    }
}

async fn registrar_violacao(
    State(state): State<Arc<AppState>>,
    solicitante: Solicitante,
    Json(payload): Json<NovaViolacao>,
) -> ApiResult<(StatusCode, Json<ViolacaoDetalhada>)> {
    payload.validate()?;
    let agora = Utc::now();
    let violacao = ViolacaoDados {
        id: Uuid::new_v4(),
        tipo_violacao: payload.tipo_violacao,
        severidade: payload.severidade,
        descricao: payload.descricao,
        cidadaos_afetados: payload.cidadaos_afetados,
        tipos_dados_afetados: payload.tipos_dados_afetados,
        data_deteccao: agora,
        data_ocorrencia_estimada: payload.data_ocorrencia_estimada,
        detectado_por: Some(solicitante.usuario.clone()),
        acoes_corretivas: payload.acoes_corretivas,
        anpd_notificada: false,
        data_notificacao_anpd: None,
        cidadaos_notificados: false,
        data_notificacao_cidadaos: None,
        resolvida: false,
        data_resolucao: None,
    };
    lgpd::registrar_violacao(&state.pool, &violacao).await?;

    for cidadao_id in &violacao.cidadaos_afetados {
        auditar(
            &state.pool,
            &solicitante,
            *cidadao_id,
            TipoAcao::ViolacaoDados,
            json!({ "violacao_id": violacao.id, "severidade": violacao.severidade }),
            agora,
        )
        .await?;
    }

    if violacao.deve_notificar_anpd(agora) {
        error!(
            violacao_id = %violacao.id,
            severidade = %violacao.severidade,
            "Violação exige notificação à ANPD em até 72 horas"
        );
    }
    Ok((StatusCode::CREATED, Json(ViolacaoDetalhada::new(violacao, agora))))
}

async fn listar_violacoes(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<ViolacaoDetalhada>>> {
    let agora = Utc::now();
    Ok(Json(
        lgpd::listar_violacoes(&state.pool)
            .await?
            .into_iter()
            .map(|v| ViolacaoDetalhada::new(v, agora))
            .collect(),
    ))
}

async fn notificar_anpd(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ViolacaoDetalhada>> {
    let agora = Utc::now();
    let violacao = lgpd::registrar_notificacao_anpd(&state.pool, id, agora).await?;
    Ok(Json(ViolacaoDetalhada::new(violacao, agora)))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/lgpd/consentimentos", post(conceder))
        .route("/lgpd/consentimentos/verificar", post(verificar))
        .route("/lgpd/consentimentos/revogar", post(revogar))
        .route("/lgpd/cidadaos/:id/consentimentos", get(consentimentos))
        .route("/lgpd/cidadaos/:id/acessos", get(acessos))
        .route("/lgpd/cidadaos/:id/relatorio", get(relatorio))
        .route("/lgpd/cidadaos/:id/anonimizar", post(anonimizar))
        .route("/lgpd/conformidade", get(conformidade))
        .route("/lgpd/violacoes", post(registrar_violacao).get(listar_violacoes))
        .route("/lgpd/violacoes/:id/notificar-anpd", post(notificar_anpd))
}
