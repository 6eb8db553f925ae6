//! Processamento de uma coleta de campo recém-gravada

use chrono::{DateTime, Utc};
use saude_core::clinico::{avaliar_coleta, AlertaClinico};
use saude_core::{EntradaRisco, NivelRisco, ResultadoRisco};
use saude_db::repositorio::{alertas, cidadaos, dados_saude};
use saude_db::DbError;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::servicos::{alerta_saude, risco, ErroServico};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct ResultadoColeta {
    /// Risco da coleta isolada, sem a triagem de anamneses anteriores
    pub risco: ResultadoRisco,
    pub alertas_criados: usize,
    pub exige_anamnese: bool,
}

/// Gera os alertas clínicos da coleta, calcula o risco e atualiza o ponto do
/// cidadão no mapa.
///
/// Os alertas e a marca de sincronizada são gravados juntos numa transação.
/// Uma coleta já sincronizada não gera alertas de novo, o que torna seguro
/// repetir o processamento depois de uma falha.
pub async fn processar_coleta(
    estado: &AppState,
    dados_saude_id: Uuid,
    agora: DateTime<Utc>,
) -> Result<ResultadoColeta, ErroServico> {
    let pool = &estado.pool;
    let dados = dados_saude::buscar(pool, dados_saude_id).await?;
    let cidadao = cidadaos::buscar(pool, &estado.cofre, dados.cidadao_id).await?;

    let alertas_criados = if dados.sincronizado {
        debug!(%dados_saude_id, "Coleta já sincronizada; alertas não são recriados");
        0
    } else {
        let achados = avaliar_coleta(&dados);
        let total = achados.len();
        let mut tx = pool.begin().await.map_err(DbError::from)?;
        for achado in achados {
            let alerta = alerta_saude(AlertaClinico::from(achado), cidadao.id, None, Some(dados.id), agora);
            alertas::inserir(&mut *tx, &alerta).await?;
        }
        dados_saude::marcar_sincronizado(&mut *tx, dados.id).await?;
        tx.commit().await.map_err(DbError::from)?;
        total
    };

    let entrada = EntradaRisco::a_partir_de(&cidadao, Some(&dados), None, agora.date_naive());
    let resultado = estado.calculador.calcular(&entrada);
    risco::atualizar_no_mapa(pool, &estado.calculador, &cidadao, agora).await?;

    let exige_anamnese = matches!(resultado.nivel, NivelRisco::Alto | NivelRisco::Critico);
    info!(
        dados_saude_id = %dados.id,
        cidadao_id = %cidadao.id,
        nivel = %resultado.nivel,
        alertas_criados,
        "Coleta processada"
    );
    Ok(ResultadoColeta {
        risco: resultado,
        alertas_criados,
        exige_anamnese,
    })
}
