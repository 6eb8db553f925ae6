use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use saude_core::lgpd::Finalidade;
use saude_core::modelos::{Anamnese, NivelRisco, StatusAnamnese};
use saude_db::repositorio::anamneses::{self, FiltroAnamneses};
use saude_db::repositorio::{dados_saude, lgpd};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::api::paginacao;
use crate::error::{ApiError, ApiResult};
use crate::servicos::anamnese::{gerar_anamnese, revisar_anamnese, Revisao};
use crate::servicos::lgpd::Solicitante;
use crate::servicos::ErroServico;
use crate::state::AppState;
use crate::tarefas;

#[derive(Debug, Deserialize)]
struct PedidoAnamnese {
    dados_saude_id: Uuid,
    /// Responde 202 e gera em segundo plano
    #[serde(default)]
    assincrono: bool,
}

async fn criar_anamnese(
    State(state): State<Arc<AppState>>,
    Json(pedido): Json<PedidoAnamnese>,
) -> ApiResult<Response> {
    if !state.ia_habilitada() {
        return Err(ApiError::ServicoExterno(
            "Geração de anamneses desabilitada: chave da IA não configurada".to_string(),
        ));
    }

    let dados = dados_saude::buscar(&state.pool, pedido.dados_saude_id).await?;
    if anamneses::da_coleta(&state.pool, dados.id).await?.is_some() {
        return Err(ApiError::Conflito(format!(
            "Já existe anamnese para a coleta {}",
            dados.id
        )));
    }

    let agora = Utc::now();
    if pedido.assincrono {
        // a recusa por falta de consentimento sai na hora, não na tarefa
        if !lgpd::consentimento_ativo(
            &state.pool,
            dados.cidadao_id,
            Finalidade::InteligenciaArtificial,
            agora,
        )
        .await?
        {
            return Err(ErroServico::SemConsentimento(Finalidade::InteligenciaArtificial).into());
        }
        tarefas::agendar_geracao_anamnese(state.clone(), dados.id);
        let corpo = json!({ "dados_saude_id": dados.id, "status": "agendada" });
        return Ok((StatusCode::ACCEPTED, Json(corpo)).into_response());
    }

    let anamnese = gerar_anamnese(&state, dados.id, agora).await?;
    Ok((StatusCode::CREATED, Json(anamnese)).into_response())
}

#[derive(Debug, Deserialize)]
struct ListagemQuery {
    cidadao_id: Option<Uuid>,
    status: Option<StatusAnamnese>,
    triagem_risco: Option<NivelRisco>,
    pagina: Option<u32>,
    por_pagina: Option<u32>,
}

async fn listar_anamneses(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListagemQuery>,
) -> ApiResult<Json<Vec<Anamnese>>> {
    let filtro = FiltroAnamneses {
        cidadao_id: query.cidadao_id,
        status: query.status,
        triagem_risco: query.triagem_risco,
        paginacao: paginacao(query.pagina, query.por_pagina),
    };
    Ok(Json(anamneses::listar(&state.pool, &filtro).await?))
}

async fn obter_anamnese(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Anamnese>> {
    Ok(Json(anamneses::buscar(&state.pool, id).await?))
}

#[derive(Debug, Deserialize, Validate)]
struct DadosRevisao {
    status: StatusAnamnese,
    /// Ausente, vale o usuário do cabeçalho
    revisado_por: Option<String>,
    #[serde(default)]
    #[validate(length(max = 2000))]
    comentarios: String,
    #[serde(default)]
    resumo_final: String,
    #[serde(default)]
    diagnostico_final: String,
    #[serde(default)]
    recomendacoes_finais: String,
}

async fn revisar(
    State(state): State<Arc<AppState>>,
    solicitante: Solicitante,
    Path(id): Path<Uuid>,
    Json(payload): Json<DadosRevisao>,
) -> ApiResult<Json<Anamnese>> {
    payload.validate()?;
    if payload.status == StatusAnamnese::Pendente {
        return Err(ApiError::RequisicaoInvalida(
            "Uma revisão não pode devolver a anamnese para pendente".to_string(),
        ));
    }

    let revisao = Revisao {
        status: payload.status,
        revisado_por: payload
            .revisado_por
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or(solicitante.usuario),
        comentarios: payload.comentarios,
        resumo_final: payload.resumo_final,
        diagnostico_final: payload.diagnostico_final,
        recomendacoes_finais: payload.recomendacoes_finais,
    };
    Ok(Json(revisar_anamnese(&state, id, revisao, Utc::now()).await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/anamneses", post(criar_anamnese).get(listar_anamneses))
        .route("/anamneses/:id", get(obter_anamnese))
        .route("/anamneses/:id/revisao", post(revisar))
}
