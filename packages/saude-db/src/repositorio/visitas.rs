//! Visitas domiciliares

use chrono::{DateTime, Duration, Utc};
use saude_core::agenda::{VisitaAgendada, JANELA_CONFLITO_MINUTOS};
use saude_core::agenda::StatusVisita;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::error::DbError;
use crate::models;

#[derive(Debug, Clone, Default)]
pub struct FiltroVisitas {
    pub agente: Option<String>,
    pub cidadao_id: Option<Uuid>,
    pub status: Option<StatusVisita>,
    pub inicio: Option<DateTime<Utc>>,
    pub fim: Option<DateTime<Utc>>,
}

pub async fn inserir(pool: &SqlitePool, visita: &VisitaAgendada) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO visitas_agendadas (id, cidadao_id, agente, data_visita, motivo, observacoes,
            status, data_realizacao, duracao_minutos, relatorio_visita, notificacao_enviada,
            lembrete_agente, criado_em, atualizado_em)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(visita.id.to_string())
    .bind(visita.cidadao_id.to_string())
    .bind(&visita.agente)
    .bind(visita.data_visita)
    .bind(visita.motivo.as_str())
    .bind(&visita.observacoes)
    .bind(visita.status.as_str())
    .bind(visita.data_realizacao)
    .bind(visita.duracao_minutos.map(i64::from))
    .bind(&visita.relatorio_visita)
    .bind(visita.notificacao_enviada)
    .bind(visita.lembrete_agente)
    .bind(visita.criado_em)
    .bind(visita.atualizado_em)
    .execute(pool)
    .await?;

    info!(visita_id = %visita.id, agente = %visita.agente, data = %visita.data_visita, "Visita agendada");
    Ok(())
}

/// Grava mudanças de status, realização e observações
pub async fn atualizar(pool: &SqlitePool, visita: &VisitaAgendada) -> Result<(), DbError> {
    let resultado = sqlx::query(
        "UPDATE visitas_agendadas
         SET data_visita = ?, observacoes = ?, status = ?, data_realizacao = ?,
             duracao_minutos = ?, relatorio_visita = ?, notificacao_enviada = ?,
             lembrete_agente = ?, atualizado_em = ?
         WHERE id = ?",
    )
    .bind(visita.data_visita)
    .bind(&visita.observacoes)
    .bind(visita.status.as_str())
    .bind(visita.data_realizacao)
    .bind(visita.duracao_minutos.map(i64::from))
    .bind(&visita.relatorio_visita)
    .bind(visita.notificacao_enviada)
    .bind(visita.lembrete_agente)
    .bind(visita.atualizado_em)
    .bind(visita.id.to_string())
    .execute(pool)
    .await?;

    if resultado.rows_affected() == 0 {
        return Err(DbError::nao_encontrado("visita", visita.id));
    }
    Ok(())
}

/// Reagendamento: a visita antiga e a nova gravadas na mesma transação
pub async fn reagendar(
    pool: &SqlitePool,
    antiga: &VisitaAgendada,
    nova: &VisitaAgendada,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE visitas_agendadas SET status = ?, atualizado_em = ? WHERE id = ?")
        .bind(antiga.status.as_str())
        .bind(antiga.atualizado_em)
        .bind(antiga.id.to_string())
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO visitas_agendadas (id, cidadao_id, agente, data_visita, motivo, observacoes,
            status, relatorio_visita, notificacao_enviada, lembrete_agente, criado_em, atualizado_em)
         VALUES (?, ?, ?, ?, ?, ?, ?, '', 0, ?, ?, ?)",
    )
    .bind(nova.id.to_string())
    .bind(nova.cidadao_id.to_string())
    .bind(&nova.agente)
    .bind(nova.data_visita)
    .bind(nova.motivo.as_str())
    .bind(&nova.observacoes)
    .bind(nova.status.as_str())
    .bind(nova.lembrete_agente)
    .bind(nova.criado_em)
    .bind(nova.atualizado_em)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(antiga = %antiga.id, nova = %nova.id, data = %nova.data_visita, "Visita reagendada");
    Ok(())
}

pub async fn buscar(pool: &SqlitePool, id: Uuid) -> Result<VisitaAgendada, DbError> {
    let linha = sqlx::query("SELECT * FROM visitas_agendadas WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DbError::nao_encontrado("visita", id))?;
    models::visita(&linha)
}

pub async fn listar(pool: &SqlitePool, filtro: &FiltroVisitas) -> Result<Vec<VisitaAgendada>, DbError> {
    sqlx::query(
        "SELECT * FROM visitas_agendadas
         WHERE (?1 IS NULL OR agente = ?1)
           AND (?2 IS NULL OR cidadao_id = ?2)
           AND (?3 IS NULL OR status = ?3)
           AND (?4 IS NULL OR data_visita >= ?4)
           AND (?5 IS NULL OR data_visita <= ?5)
         ORDER BY data_visita",
    )
    .bind(filtro.agente.as_deref())
    .bind(filtro.cidadao_id.map(|id| id.to_string()))
    .bind(filtro.status.map(|s| s.as_str()))
    .bind(filtro.inicio)
    .bind(filtro.fim)
    .fetch_all(pool)
    .await?
    .iter()
    .map(models::visita)
    .collect()
}

/// Visitas em aberto do cidadão perto de `data`, para a checagem de conflito
pub async fn em_aberto_proximas(
    pool: &SqlitePool,
    cidadao_id: Uuid,
    data: DateTime<Utc>,
) -> Result<Vec<VisitaAgendada>, DbError> {
    // margem folgada; a janela exata é conferida em `verificar_conflito`
    let margem = Duration::minutes(JANELA_CONFLITO_MINUTOS * 2);
    listar(
        pool,
        &FiltroVisitas {
            cidadao_id: Some(cidadao_id),
            inicio: Some(data - margem),
            fim: Some(data + margem),
            ..Default::default()
        },
    )
    .await
    .map(|visitas| visitas.into_iter().filter(|v| v.status.em_aberto()).collect())
}
