use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::built_info;
use crate::state::AppState;

#[derive(Serialize)]
struct Build {
    versao: &'static str,
    rustc: &'static str,
    alvo: &'static str,
    perfil: &'static str,
}

#[derive(Serialize)]
struct Saude {
    status: &'static str,
    banco_de_dados: bool,
    versao_esquema: i64,
    ia_habilitada: bool,
    build: Build,
    verificado_em: DateTime<Utc>,
}

async fn saude(State(state): State<Arc<AppState>>) -> Json<Saude> {
    let banco_de_dados = match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&state.pool).await {
        Ok(_) => true,
        Err(erro) => {
            warn!(error = %erro, "Banco de dados indisponível");
            false
        }
    };

    Json(Saude {
        status: if banco_de_dados { "ok" } else { "degradado" },
        banco_de_dados,
        versao_esquema: saude_db::migrations::versao_esquema(),
        ia_habilitada: state.ia_habilitada(),
        build: Build {
            versao: built_info::PKG_VERSION,
            rustc: built_info::RUSTC_VERSION,
            alvo: built_info::TARGET,
            perfil: built_info::PROFILE,
        },
        verificado_em: Utc::now(),
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/saude", get(saude))
}
