use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Duration, Utc};
use saude_core::modelos::{NivelRisco, PrioridadeAlerta, StatusAnamnese};
use saude_db::repositorio::auditoria_ia::{self, UsoIa};
use saude_db::repositorio::{alertas, anamneses, cidadaos, dados_saude, localizacoes};
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::AppState;

/// Janela do uso de IA e das anamneses recentes
const DIAS_RECENTES: i64 = 30;

#[derive(Serialize)]
struct ContagemCidade {
    cidade: String,
    nivel_risco: NivelRisco,
    total: i64,
}

#[derive(Serialize)]
struct Painel {
    cidadaos_ativos: i64,
    cidadaos_com_coleta: i64,
    anamneses_por_status: BTreeMap<StatusAnamnese, i64>,
    anamneses_por_risco: BTreeMap<NivelRisco, i64>,
    anamneses_recentes_por_risco: BTreeMap<NivelRisco, i64>,
    alertas_abertos: i64,
    alertas_urgentes: i64,
    mapa_por_risco: BTreeMap<NivelRisco, i64>,
    mapa_por_cidade: Vec<ContagemCidade>,
    uso_ia_30_dias: UsoIa,
    ia_habilitada: bool,
    gerado_em: DateTime<Utc>,
}

async fn painel(State(state): State<Arc<AppState>>) -> ApiResult<Json<Painel>> {
    let pool = &state.pool;
    let agora = Utc::now();
    let desde = agora - Duration::days(DIAS_RECENTES);

    let mapa_por_cidade = localizacoes::contar_por_cidade(pool)
        .await?
        .into_iter()
        .map(|(cidade, nivel_risco, total)| ContagemCidade {
            cidade,
            nivel_risco,
            total,
        })
        .collect();

    Ok(Json(Painel {
        cidadaos_ativos: cidadaos::contar_ativos(pool).await?,
        cidadaos_com_coleta: dados_saude::contar_cidadaos_com_coleta(pool).await?,
        anamneses_por_status: anamneses::contar_por_status(pool, None).await?,
        anamneses_por_risco: anamneses::contar_por_risco(pool, None).await?,
        anamneses_recentes_por_risco: anamneses::contar_por_risco(pool, Some(desde)).await?,
        alertas_abertos: alertas::contar_abertos(pool, None).await?,
        alertas_urgentes: alertas::contar_abertos(pool, Some(PrioridadeAlerta::Urgente)).await?,
        mapa_por_risco: localizacoes::contar_por_risco(pool).await?,
        mapa_por_cidade,
        uso_ia_30_dias: auditoria_ia::uso_desde(pool, desde).await?,
        ia_habilitada: state.ia_habilitada(),
        gerado_em: agora,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/dashboard", get(painel))
}
