//! Mapa de risco: marcadores, GeoJSON e geocodificação sob demanda

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use saude_core::geo::{colecao_geojson, MarcadorMapa};
use saude_core::modelos::{calcular_idade, LocalizacaoSaude, NivelRisco};
use saude_db::repositorio::localizacoes::{self, FiltroMapa};
use saude_db::repositorio::cidadaos;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::servicos::geocodificacao::processar_cidadao_sem_localizacao;
use crate::state::AppState;
use crate::tarefas::{self, ResumoGeocodificacao};

#[derive(Debug, Default, Deserialize)]
struct MapaQuery {
    nivel_risco: Option<NivelRisco>,
    cidade: Option<String>,
    data_inicio: Option<NaiveDate>,
    data_fim: Option<NaiveDate>,
    #[serde(default)]
    apenas_com_anamnese: bool,
}

impl From<MapaQuery> for FiltroMapa {
    fn from(query: MapaQuery) -> Self {
        FiltroMapa {
            nivel_risco: query.nivel_risco,
            cidade: query.cidade.filter(|c| !c.trim().is_empty()),
            data_inicio: query.data_inicio,
            data_fim: query.data_fim,
            apenas_com_anamnese: query.apenas_com_anamnese,
        }
    }
}

async fn marcadores(state: &AppState, filtro: &FiltroMapa) -> ApiResult<Vec<MarcadorMapa>> {
    let hoje = Utc::now().date_naive();
    Ok(localizacoes::listar_mapa(&state.pool, filtro)
        .await?
        .iter()
        .map(|ponto| {
            MarcadorMapa::new(
                &ponto.localizacao,
                &ponto.nome,
                Some(calcular_idade(ponto.data_nascimento, hoje)),
            )
        })
        .collect())
}

async fn pontos(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MapaQuery>,
) -> ApiResult<Json<Vec<MarcadorMapa>>> {
    Ok(Json(marcadores(&state, &query.into()).await?))
}

async fn geojson(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MapaQuery>,
) -> ApiResult<Json<Value>> {
    let marcadores = marcadores(&state, &query.into()).await?;
    Ok(Json(colecao_geojson(&marcadores, Utc::now())))
}

#[derive(Serialize)]
struct ResultadoGeocodificacao {
    /// `false` quando o ponto já existia ou o endereço não foi localizado
    criada: bool,
    localizacao: Option<LocalizacaoSaude>,
}

async fn geocodificar_cidadao(
    State(state): State<Arc<AppState>>,
    Path(cidadao_id): Path<Uuid>,
) -> ApiResult<Json<ResultadoGeocodificacao>> {
    let cidadao = cidadaos::buscar(&state.pool, &state.cofre, cidadao_id).await?;
    let criada = processar_cidadao_sem_localizacao(
        &state.pool,
        &state.geocodificacao,
        &state.calculador,
        &cidadao,
        Utc::now(),
    )
    .await?;

    let resultado = match criada {
        Some(localizacao) => ResultadoGeocodificacao {
            criada: true,
            localizacao: Some(localizacao),
        },
        None => ResultadoGeocodificacao {
            criada: false,
            localizacao: localizacoes::do_cidadao(&state.pool, cidadao_id).await?,
        },
    };
    Ok(Json(resultado))
}

#[derive(Debug, Deserialize)]
struct PendentesQuery {
    limite: Option<i64>,
}

async fn geocodificar_pendentes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PendentesQuery>,
) -> ApiResult<Json<ResumoGeocodificacao>> {
    let limite = query.limite.unwrap_or(50).clamp(1, 500);
    Ok(Json(tarefas::geocodificar_pendentes(&state, limite).await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/mapa/pontos", get(pontos))
        .route("/mapa/geojson", get(geojson))
        .route("/mapa/geocodificar/:cidadao_id", post(geocodificar_cidadao))
        .route("/mapa/geocodificar-pendentes", post(geocodificar_pendentes))
}
