//! Alertas de saúde

use chrono::{DateTime, Utc};
use saude_core::modelos::{AlertaSaude, PrioridadeAlerta};
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use super::Paginacao;
use crate::error::DbError;
use crate::models;

#[derive(Debug, Clone, Default)]
pub struct FiltroAlertas {
    pub cidadao_id: Option<Uuid>,
    pub prioridade: Option<PrioridadeAlerta>,
    /// `false` traz apenas os não resolvidos
    pub incluir_resolvidos: bool,
    pub paginacao: Paginacao,
}

pub async fn inserir<'e, E>(executor: E, alerta: &AlertaSaude) -> Result<(), DbError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO alertas_saude (id, cidadao_id, anamnese_id, dados_saude_id, tipo, prioridade,
            titulo, descricao, acao_recomendada, prazo_acao, visualizado, resolvido, resolvido_por,
            data_resolucao, criado_em)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(alerta.id.to_string())
    .bind(alerta.cidadao_id.to_string())
    .bind(alerta.anamnese_id.map(|id| id.to_string()))
    .bind(alerta.dados_saude_id.map(|id| id.to_string()))
    .bind(alerta.tipo.as_str())
    .bind(alerta.prioridade.as_str())
    .bind(&alerta.titulo)
    .bind(&alerta.descricao)
    .bind(&alerta.acao_recomendada)
    .bind(alerta.prazo_acao)
    .bind(alerta.visualizado)
    .bind(alerta.resolvido)
    .bind(alerta.resolvido_por.as_deref())
    .bind(alerta.data_resolucao)
    .bind(alerta.criado_em)
    .execute(executor)
    .await?;

    if alerta.prioridade == PrioridadeAlerta::Urgente {
        warn!(alerta_id = %alerta.id, cidadao_id = %alerta.cidadao_id, titulo = %alerta.titulo, "Alerta urgente criado");
    } else {
        info!(alerta_id = %alerta.id, prioridade = %alerta.prioridade, "Alerta criado");
    }
    Ok(())
}

pub async fn buscar(pool: &SqlitePool, id: Uuid) -> Result<AlertaSaude, DbError> {
    let linha = sqlx::query("SELECT * FROM alertas_saude WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DbError::nao_encontrado("alerta", id))?;
    models::alerta(&linha)
}

/// Mais urgentes primeiro, depois os mais recentes
pub async fn listar(pool: &SqlitePool, filtro: &FiltroAlertas) -> Result<Vec<AlertaSaude>, DbError> {
    sqlx::query(
        "SELECT * FROM alertas_saude
         WHERE (?1 IS NULL OR cidadao_id = ?1)
           AND (?2 IS NULL OR prioridade = ?2)
           AND (?3 = 1 OR resolvido = 0)
         ORDER BY CASE prioridade
                    WHEN 'urgente' THEN 0 WHEN 'alta' THEN 1 WHEN 'media' THEN 2 ELSE 3
                  END,
                  criado_em DESC
         LIMIT ?4 OFFSET ?5",
    )
    .bind(filtro.cidadao_id.map(|id| id.to_string()))
    .bind(filtro.prioridade.map(|p| p.as_str()))
    .bind(filtro.incluir_resolvidos)
    .bind(filtro.paginacao.limite())
    .bind(filtro.paginacao.deslocamento())
    .fetch_all(pool)
    .await?
    .iter()
    .map(models::alerta)
    .collect()
}

pub async fn marcar_visualizado(pool: &SqlitePool, id: Uuid) -> Result<(), DbError> {
    let resultado = sqlx::query("UPDATE alertas_saude SET visualizado = 1 WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    if resultado.rows_affected() == 0 {
        return Err(DbError::nao_encontrado("alerta", id));
    }
    Ok(())
}

/// Resolve um alerta em aberto; alerta já resolvido é `ConstraintViolation`
pub async fn resolver(
    pool: &SqlitePool,
    id: Uuid,
    resolvido_por: &str,
    agora: DateTime<Utc>,
) -> Result<AlertaSaude, DbError> {
    let alerta = buscar(pool, id).await?;
    if alerta.resolvido {
        return Err(DbError::ConstraintViolation(format!("Alerta {} já resolvido", id)));
    }

    sqlx::query(
        "UPDATE alertas_saude
         SET resolvido = 1, visualizado = 1, resolvido_por = ?, data_resolucao = ?
         WHERE id = ? AND resolvido = 0",
    )
    .bind(resolvido_por)
    .bind(agora)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    info!(alerta_id = %id, resolvido_por, "Alerta resolvido");
    buscar(pool, id).await
}

pub async fn contar_abertos(
    pool: &SqlitePool,
    prioridade: Option<PrioridadeAlerta>,
) -> Result<i64, DbError> {
    Ok(sqlx::query_scalar(
        "SELECT COUNT(*) FROM alertas_saude WHERE resolvido = 0 AND (?1 IS NULL OR prioridade = ?1)",
    )
    .bind(prioridade.map(|p| p.as_str()))
    .fetch_one(pool)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositorio::cidadaos;
    use crate::testes::{banco_temporario, cidadao_exemplo};
    use saude_core::modelos::TipoAlerta;

    fn alerta(cidadao_id: Uuid, prioridade: PrioridadeAlerta) -> AlertaSaude {
        AlertaSaude {
            id: Uuid::new_v4(),
            cidadao_id,
            anamnese_id: None,
            dados_saude_id: None,
            tipo: TipoAlerta::Acompanhamento,
            prioridade,
            titulo: format!("Alerta {}", prioridade),
            descricao: "Descrição".to_string(),
            acao_recomendada: String::new(),
            prazo_acao: None,
            visualizado: false,
            resolvido: false,
            resolvido_por: None,
            data_resolucao: None,
            criado_em: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_ordem_e_resolucao() -> anyhow::Result<()> {
        let banco = banco_temporario().await?;
        let cidadao = cidadao_exemplo("529.982.247-25");
        cidadaos::inserir(&banco.pool, &banco.cofre, &cidadao).await?;

        let baixa = alerta(cidadao.id, PrioridadeAlerta::Baixa);
        let urgente = alerta(cidadao.id, PrioridadeAlerta::Urgente);
        inserir(&banco.pool, &baixa).await?;
        inserir(&banco.pool, &urgente).await?;

        let abertos = listar(&banco.pool, &FiltroAlertas::default()).await?;
        assert_eq!(abertos[0].id, urgente.id);
        assert_eq!(contar_abertos(&banco.pool, Some(PrioridadeAlerta::Urgente)).await?, 1);

        let resolvido = resolver(&banco.pool, urgente.id, "enf.carla", Utc::now()).await?;
        assert!(resolvido.resolvido && resolvido.visualizado);
        assert_eq!(resolvido.resolvido_por.as_deref(), Some("enf.carla"));

        assert!(matches!(
            resolver(&banco.pool, urgente.id, "enf.carla", Utc::now()).await,
            Err(DbError::ConstraintViolation(_))
        ));
        assert_eq!(listar(&banco.pool, &FiltroAlertas::default()).await?.len(), 1);
        assert_eq!(contar_abertos(&banco.pool, None).await?, 1);
        Ok(())
    }
}
