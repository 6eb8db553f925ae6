//! Consentimentos, auditoria de acesso, violações e dados anonimizados

use chrono::{DateTime, Utc};
use saude_core::lgpd::{
    AuditoriaAcesso, Consentimento, DadosAnonimizados, Finalidade, ViolacaoDados,
};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::DbError;
use crate::models;

/// Cria ou substitui o consentimento do par (cidadão, finalidade)
pub async fn gravar_consentimento(
    pool: &SqlitePool,
    consentimento: &Consentimento,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO consentimentos_lgpd (id, cidadao_id, finalidade, consentido,
            token_consentimento, ip_address, user_agent, data_consentimento, valido_ate,
            data_revogacao)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (cidadao_id, finalidade) DO UPDATE SET
            consentido = excluded.consentido,
            token_consentimento = excluded.token_consentimento,
            ip_address = excluded.ip_address,
            user_agent = excluded.user_agent,
            data_consentimento = excluded.data_consentimento,
            valido_ate = excluded.valido_ate,
            data_revogacao = excluded.data_revogacao",
    )
    .bind(consentimento.id.to_string())
    .bind(consentimento.cidadao_id.to_string())
    .bind(consentimento.finalidade.as_str())
    .bind(consentimento.consentido)
    .bind(&consentimento.token_consentimento)
    .bind(consentimento.ip_address.as_deref())
    .bind(&consentimento.user_agent)
    .bind(consentimento.data_consentimento)
    .bind(consentimento.valido_ate)
    .bind(consentimento.data_revogacao)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn consentimento(
    pool: &SqlitePool,
    cidadao_id: Uuid,
    finalidade: Finalidade,
) -> Result<Option<Consentimento>, DbError> {
    sqlx::query("SELECT * FROM consentimentos_lgpd WHERE cidadao_id = ? AND finalidade = ?")
        .bind(cidadao_id.to_string())
        .bind(finalidade.as_str())
        .fetch_optional(pool)
        .await?
        .map(|linha| models::consentimento(&linha))
        .transpose()
}

pub async fn consentimentos_do_cidadao(
    pool: &SqlitePool,
    cidadao_id: Uuid,
) -> Result<Vec<Consentimento>, DbError> {
    sqlx::query("SELECT * FROM consentimentos_lgpd WHERE cidadao_id = ? ORDER BY finalidade")
        .bind(cidadao_id.to_string())
        .fetch_all(pool)
        .await?
        .iter()
        .map(models::consentimento)
        .collect()
}

/// Há consentimento ativo para a finalidade?
pub async fn consentimento_ativo(
    pool: &SqlitePool,
    cidadao_id: Uuid,
    finalidade: Finalidade,
    agora: DateTime<Utc>,
) -> Result<bool, DbError> {
    Ok(consentimento(pool, cidadao_id, finalidade)
        .await?
        .map(|c| c.ativo(agora))
        .unwrap_or(false))
}

/// Cidadãos com ao menos um consentimento vigente
pub async fn contar_cidadaos_com_consentimento(
    pool: &SqlitePool,
    agora: DateTime<Utc>,
) -> Result<i64, DbError> {
    Ok(sqlx::query_scalar(
        "SELECT COUNT(DISTINCT cidadao_id) FROM consentimentos_lgpd
         WHERE consentido = 1 AND data_revogacao IS NULL AND valido_ate > ?",
    )
    .bind(agora)
    .fetch_one(pool)
    .await?)
}

pub async fn registrar_acesso(pool: &SqlitePool, acesso: &AuditoriaAcesso) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO auditoria_acessos (id, usuario, cidadao_id, tipo_acao, detalhes, ip_address,
            user_agent, url_acessada, timestamp)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(acesso.id.to_string())
    .bind(&acesso.usuario)
    .bind(acesso.cidadao_id.to_string())
    .bind(acesso.tipo_acao.as_str())
    .bind(serde_json::to_string(&acesso.detalhes)?)
    .bind(acesso.ip_address.as_deref())
    .bind(&acesso.user_agent)
    .bind(&acesso.url_acessada)
    .bind(acesso.timestamp)
    .execute(pool)
    .await?;

    info!(
        target: "lgpd_audit",
        cidadao_id = %acesso.cidadao_id,
        usuario = %acesso.usuario,
        acao = %acesso.tipo_acao,
        "Acesso registrado"
    );
    Ok(())
}

/// Acessos ao cadastro do cidadão desde `desde`, mais recentes primeiro
pub async fn historico_acessos(
    pool: &SqlitePool,
    cidadao_id: Uuid,
    desde: DateTime<Utc>,
) -> Result<Vec<AuditoriaAcesso>, DbError> {
    sqlx::query(
        "SELECT * FROM auditoria_acessos WHERE cidadao_id = ? AND timestamp >= ?
         ORDER BY timestamp DESC",
    )
    .bind(cidadao_id.to_string())
    .bind(desde)
    .fetch_all(pool)
    .await?
    .iter()
    .map(models::auditoria_acesso)
    .collect()
}

pub async fn contar_acessos_desde(pool: &SqlitePool, desde: DateTime<Utc>) -> Result<i64, DbError> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM auditoria_acessos WHERE timestamp >= ?")
        .bind(desde)
        .fetch_one(pool)
        .await?)
}

pub async fn registrar_violacao(pool: &SqlitePool, violacao: &ViolacaoDados) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO violacoes_dados (id, tipo_violacao, severidade, descricao, cidadaos_afetados,
            tipos_dados_afetados, data_deteccao, data_ocorrencia_estimada, detectado_por,
            acoes_corretivas, anpd_notificada, data_notificacao_anpd, cidadaos_notificados,
            data_notificacao_cidadaos, resolvida, data_resolucao)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(violacao.id.to_string())
    .bind(violacao.tipo_violacao.as_str())
    .bind(violacao.severidade.as_str())
    .bind(&violacao.descricao)
    .bind(serde_json::to_string(&violacao.cidadaos_afetados)?)
    .bind(serde_json::to_string(&violacao.tipos_dados_afetados)?)
    .bind(violacao.data_deteccao)
    .bind(violacao.data_ocorrencia_estimada)
    .bind(violacao.detectado_por.as_deref())
    .bind(&violacao.acoes_corretivas)
    .bind(violacao.anpd_notificada)
    .bind(violacao.data_notificacao_anpd)
    .bind(violacao.cidadaos_notificados)
    .bind(violacao.data_notificacao_cidadaos)
    .bind(violacao.resolvida)
    .bind(violacao.data_resolucao)
    .execute(pool)
    .await?;

    warn!(
        violacao_id = %violacao.id,
        severidade = %violacao.severidade,
        afetados = violacao.cidadaos_afetados.len(),
        "Violação de dados registrada"
    );
    Ok(())
}

pub async fn buscar_violacao(pool: &SqlitePool, id: Uuid) -> Result<ViolacaoDados, DbError> {
    let linha = sqlx::query("SELECT * FROM violacoes_dados WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DbError::nao_encontrado("violação", id))?;
    models::violacao(&linha)
}

pub async fn listar_violacoes(pool: &SqlitePool) -> Result<Vec<ViolacaoDados>, DbError> {
    sqlx::query("SELECT * FROM violacoes_dados ORDER BY data_deteccao DESC")
        .fetch_all(pool)
        .await?
        .iter()
        .map(models::violacao)
        .collect()
}

pub async fn registrar_notificacao_anpd(
    pool: &SqlitePool,
    id: Uuid,
    agora: DateTime<Utc>,
) -> Result<ViolacaoDados, DbError> {
    let resultado = sqlx::query(
        "UPDATE violacoes_dados SET anpd_notificada = 1, data_notificacao_anpd = ? WHERE id = ?",
    )
    .bind(agora)
    .bind(id.to_string())
    .execute(pool)
    .await?;
    if resultado.rows_affected() == 0 {
        return Err(DbError::nao_encontrado("violação", id));
    }
    info!(violacao_id = %id, "Notificação à ANPD registrada");
    buscar_violacao(pool, id).await
}

pub async fn inserir_anonimizado(
    pool: &SqlitePool,
    dados: &DadosAnonimizados,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO dados_anonimizados (id, hash_cidadao, faixa_etaria, sexo, regiao_residencia,
            tem_doenca_cronica, categoria_imc, nivel_risco_geral, data_anonimizacao, finalidade)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(dados.id.to_string())
    .bind(&dados.hash_cidadao)
    .bind(&dados.faixa_etaria)
    .bind(dados.sexo.as_str())
    .bind(&dados.regiao_residencia)
    .bind(dados.tem_doenca_cronica)
    .bind(&dados.categoria_imc)
    .bind(dados.nivel_risco_geral.map(|n| n.as_str()))
    .bind(dados.data_anonimizacao)
    .bind(&dados.finalidade)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn anonimizados_por_hash(
    pool: &SqlitePool,
    hash_cidadao: &str,
) -> Result<Vec<DadosAnonimizados>, DbError> {
    sqlx::query("SELECT * FROM dados_anonimizados WHERE hash_cidadao = ? ORDER BY data_anonimizacao")
        .bind(hash_cidadao)
        .fetch_all(pool)
        .await?
        .iter()
        .map(models::anonimizado)
        .collect()
}

pub async fn contar_anonimizados(pool: &SqlitePool) -> Result<i64, DbError> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM dados_anonimizados")
        .fetch_one(pool)
        .await?)
}
