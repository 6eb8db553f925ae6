use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use saude_core::clinico::{avaliar_coleta, AchadoClinico};
use saude_core::modelos::{DadosSaude, NivelAtividade};
use saude_core::validadores::validar_pressao_arterial;
use saude_db::repositorio::{cidadaos, dados_saude};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::tarefas;

fn horas_sono_padrao() -> u32 {
    8
}

fn agua_padrao() -> f64 {
    2.0
}

fn atividade_padrao() -> NivelAtividade {
    NivelAtividade::Sedentario
}

/// Coleta de campo; os limites acompanham as restrições da tabela
#[derive(Debug, Deserialize, Validate)]
pub struct NovaColeta {
    pub cidadao_id: Uuid,
    pub agente_coleta: Option<String>,
    /// `120/80`, `120x80` ou `120 80`
    pub pressao_arterial: String,
    #[validate(range(min = 30, max = 220))]
    pub frequencia_cardiaca: u32,
    #[validate(range(min = 30.0, max = 45.0))]
    pub temperatura: f64,
    #[validate(range(min = 1.0, max = 300.0))]
    pub peso: f64,
    #[validate(range(min = 0.3, max = 2.5))]
    pub altura: f64,
    #[validate(length(min = 3))]
    pub sintomas_principais: String,
    #[serde(default)]
    #[validate(range(max = 10))]
    pub nivel_dor: u8,
    #[serde(default)]
    pub duracao_sintomas: String,
    #[serde(default)]
    pub historico_doencas: String,
    #[serde(default)]
    pub medicamentos_uso: String,
    #[serde(default)]
    pub alergias: String,
    #[serde(default)]
    pub fumante: bool,
    #[serde(default)]
    pub etilista: bool,
    #[serde(default = "atividade_padrao")]
    pub nivel_atividade_fisica: NivelAtividade,
    #[serde(default = "horas_sono_padrao")]
    #[validate(range(min = 1, max = 24))]
    pub horas_sono: u32,
    #[serde(default)]
    pub alimentacao_balanceada: bool,
    #[serde(default = "agua_padrao")]
    #[validate(range(min = 0.1, max = 10.0))]
    pub consumo_agua_litros: f64,
    pub dados_extras: Option<serde_json::Value>,
}

/// Resposta imediata; alertas e risco seguem em segundo plano
#[derive(Serialize)]
struct ColetaRegistrada {
    #[serde(flatten)]
    dados: DadosSaude,
    pressao_arterial: String,
    imc: Option<f64>,
    classificacao_imc: Option<&'static str>,
    achados: Vec<AchadoClinico>,
}

async fn registrar_coleta(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NovaColeta>,
) -> ApiResult<(StatusCode, Json<ColetaRegistrada>)> {
    payload.validate()?;
    let pressao = validar_pressao_arterial(&payload.pressao_arterial)?;
    if !cidadaos::existe(&state.pool, payload.cidadao_id).await? {
        return Err(ApiError::NaoEncontrado(format!(
            "Cidadão {} não encontrado",
            payload.cidadao_id
        )));
    }

    let dados = DadosSaude {
        id: Uuid::new_v4(),
        cidadao_id: payload.cidadao_id,
        agente_coleta: payload.agente_coleta.filter(|a| !a.trim().is_empty()),
        pressao_sistolica: pressao.sistolica,
        pressao_diastolica: pressao.diastolica,
        frequencia_cardiaca: payload.frequencia_cardiaca,
        temperatura: payload.temperatura,
        peso: payload.peso,
        altura: payload.altura,
        sintomas_principais: payload.sintomas_principais.trim().to_string(),
        nivel_dor: payload.nivel_dor,
        duracao_sintomas: payload.duracao_sintomas,
        historico_doencas: payload.historico_doencas,
        medicamentos_uso: payload.medicamentos_uso,
        alergias: payload.alergias,
        fumante: payload.fumante,
        etilista: payload.etilista,
        nivel_atividade_fisica: payload.nivel_atividade_fisica,
        horas_sono: payload.horas_sono,
        alimentacao_balanceada: payload.alimentacao_balanceada,
        consumo_agua_litros: payload.consumo_agua_litros,
        dados_extras: payload.dados_extras,
        criado_em: Utc::now(),
        sincronizado: false,
    };
    dados_saude::inserir(&state.pool, &dados).await?;

    tarefas::agendar_processamento_coleta(state.clone(), dados.id);

    Ok((
        StatusCode::CREATED,
        Json(ColetaRegistrada {
            pressao_arterial: dados.pressao_arterial(),
            imc: dados.imc(),
            classificacao_imc: dados.classificacao_imc(),
            achados: avaliar_coleta(&dados),
            dados,
        }),
    ))
}

async fn obter_coleta(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DadosSaude>> {
    Ok(Json(dados_saude::buscar(&state.pool, id).await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/coleta-dados", post(registrar_coleta))
        .route("/coleta-dados/:id", get(obter_coleta))
}
