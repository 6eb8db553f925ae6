//! Coletas de sinais vitais

use saude_core::modelos::DadosSaude;
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::error::DbError;
use crate::models;

pub async fn inserir(pool: &SqlitePool, dados: &DadosSaude) -> Result<(), DbError> {
    let extras = dados
        .dados_extras
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        "INSERT INTO dados_saude (id, cidadao_id, agente_coleta, pressao_sistolica,
            pressao_diastolica, frequencia_cardiaca, temperatura, peso, altura,
            sintomas_principais, nivel_dor, duracao_sintomas, historico_doencas,
            medicamentos_uso, alergias, fumante, etilista, nivel_atividade_fisica, horas_sono,
            alimentacao_balanceada, consumo_agua_litros, dados_extras, criado_em, sincronizado)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(dados.id.to_string())
    .bind(dados.cidadao_id.to_string())
    .bind(dados.agente_coleta.as_deref())
    .bind(i64::from(dados.pressao_sistolica))
    .bind(i64::from(dados.pressao_diastolica))
    .bind(i64::from(dados.frequencia_cardiaca))
    .bind(dados.temperatura)
    .bind(dados.peso)
    .bind(dados.altura)
    .bind(&dados.sintomas_principais)
    .bind(i64::from(dados.nivel_dor))
    .bind(&dados.duracao_sintomas)
    .bind(&dados.historico_doencas)
    .bind(&dados.medicamentos_uso)
    .bind(&dados.alergias)
    .bind(dados.fumante)
    .bind(dados.etilista)
    .bind(dados.nivel_atividade_fisica.as_str())
    .bind(i64::from(dados.horas_sono))
    .bind(dados.alimentacao_balanceada)
    .bind(dados.consumo_agua_litros)
    .bind(extras)
    .bind(dados.criado_em)
    .bind(dados.sincronizado)
    .execute(pool)
    .await?;

    info!(
        dados_saude_id = %dados.id,
        cidadao_id = %dados.cidadao_id,
        pressao = %dados.pressao_arterial(),
        "Coleta de dados registrada"
    );
    Ok(())
}

pub async fn buscar(pool: &SqlitePool, id: Uuid) -> Result<DadosSaude, DbError> {
    let linha = sqlx::query("SELECT * FROM dados_saude WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DbError::nao_encontrado("dados de saúde", id))?;
    models::dados_saude(&linha)
}

/// Coleta mais recente do cidadão
pub async fn ultima_do_cidadao(
    pool: &SqlitePool,
    cidadao_id: Uuid,
) -> Result<Option<DadosSaude>, DbError> {
    sqlx::query("SELECT * FROM dados_saude WHERE cidadao_id = ? ORDER BY criado_em DESC LIMIT 1")
        .bind(cidadao_id.to_string())
        .fetch_optional(pool)
        .await?
        .map(|linha| models::dados_saude(&linha))
        .transpose()
}

/// Coletas do cidadão, da mais recente para a mais antiga
pub async fn listar_do_cidadao(
    pool: &SqlitePool,
    cidadao_id: Uuid,
) -> Result<Vec<DadosSaude>, DbError> {
    sqlx::query("SELECT * FROM dados_saude WHERE cidadao_id = ? ORDER BY criado_em DESC")
        .bind(cidadao_id.to_string())
        .fetch_all(pool)
        .await?
        .iter()
        .map(models::dados_saude)
        .collect()
}

pub async fn marcar_sincronizado<'e, E>(executor: E, id: Uuid) -> Result<(), DbError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE dados_saude SET sincronizado = 1 WHERE id = ?")
        .bind(id.to_string())
        .execute(executor)
        .await?;
    Ok(())
}

/// Cidadãos distintos com pelo menos uma coleta
pub async fn contar_cidadaos_com_coleta(pool: &SqlitePool) -> Result<i64, DbError> {
    Ok(sqlx::query_scalar(
        "SELECT COUNT(DISTINCT d.cidadao_id) FROM dados_saude d
         JOIN cidadaos c ON c.id = d.cidadao_id WHERE c.ativo = 1",
    )
    .fetch_one(pool)
    .await?)
}
