//! Anamneses e o fluxo de revisão

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use saude_core::modelos::{Anamnese, NivelRisco, StatusAnamnese};
use saude_core::risco::TriagemPrevia;
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use tracing::info;
use uuid::Uuid;

use super::Paginacao;
use crate::error::DbError;
use crate::models;

#[derive(Debug, Clone, Default)]
pub struct FiltroAnamneses {
    pub cidadao_id: Option<Uuid>,
    pub status: Option<StatusAnamnese>,
    pub triagem_risco: Option<NivelRisco>,
    pub paginacao: Paginacao,
}

/// Aceita o pool ou uma transação aberta. A restrição única em
/// `dados_saude_id` devolve `ConstraintViolation` para uma segunda anamnese
/// da mesma coleta.
pub async fn inserir<'e, E>(executor: E, anamnese: &Anamnese) -> Result<(), DbError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO anamneses (id, cidadao_id, dados_saude_id, resumo_anamnese,
            diagnostico_clinico, hipoteses_diagnosticas, diagnostico_diferencial, triagem_risco,
            recomendacoes, exames_complementares, modelo_ia, confianca_ia, dados_entrada_ia,
            resposta_completa_ia, status, revisado_por, data_revisao, comentarios_revisao,
            resumo_final, diagnostico_final, recomendacoes_finais, criado_em)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(anamnese.id.to_string())
    .bind(anamnese.cidadao_id.to_string())
    .bind(anamnese.dados_saude_id.to_string())
    .bind(&anamnese.resumo_anamnese)
    .bind(&anamnese.diagnostico_clinico)
    .bind(serde_json::to_string(&anamnese.hipoteses_diagnosticas)?)
    .bind(serde_json::to_string(&anamnese.diagnostico_diferencial)?)
    .bind(anamnese.triagem_risco.as_str())
    .bind(&anamnese.recomendacoes)
    .bind(serde_json::to_string(&anamnese.exames_complementares)?)
    .bind(&anamnese.modelo_ia)
    .bind(anamnese.confianca_ia)
    .bind(serde_json::to_string(&anamnese.dados_entrada_ia)?)
    .bind(serde_json::to_string(&anamnese.resposta_completa_ia)?)
    .bind(anamnese.status.as_str())
    .bind(anamnese.revisado_por.as_deref())
    .bind(anamnese.data_revisao)
    .bind(&anamnese.comentarios_revisao)
    .bind(&anamnese.resumo_final)
    .bind(&anamnese.diagnostico_final)
    .bind(&anamnese.recomendacoes_finais)
    .bind(anamnese.criado_em)
    .execute(executor)
    .await?;

    info!(
        anamnese_id = %anamnese.id,
        cidadao_id = %anamnese.cidadao_id,
        triagem = %anamnese.triagem_risco,
        "Anamnese registrada"
    );
    Ok(())
}

pub async fn buscar(pool: &SqlitePool, id: Uuid) -> Result<Anamnese, DbError> {
    let linha = sqlx::query("SELECT * FROM anamneses WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DbError::nao_encontrado("anamnese", id))?;
    models::anamnese(&linha)
}

pub async fn listar(pool: &SqlitePool, filtro: &FiltroAnamneses) -> Result<Vec<Anamnese>, DbError> {
    sqlx::query(
        "SELECT * FROM anamneses
         WHERE (?1 IS NULL OR cidadao_id = ?1)
           AND (?2 IS NULL OR status = ?2)
           AND (?3 IS NULL OR triagem_risco = ?3)
         ORDER BY criado_em DESC
         LIMIT ?4 OFFSET ?5",
    )
    .bind(filtro.cidadao_id.map(|id| id.to_string()))
    .bind(filtro.status.map(|s| s.as_str()))
    .bind(filtro.triagem_risco.map(|n| n.as_str()))
    .bind(filtro.paginacao.limite())
    .bind(filtro.paginacao.deslocamento())
    .fetch_all(pool)
    .await?
    .iter()
    .map(models::anamnese)
    .collect()
}

/// As `quantidade` anamneses mais recentes do cidadão
pub async fn recentes_do_cidadao(
    pool: &SqlitePool,
    cidadao_id: Uuid,
    quantidade: i64,
) -> Result<Vec<Anamnese>, DbError> {
    sqlx::query("SELECT * FROM anamneses WHERE cidadao_id = ? ORDER BY criado_em DESC LIMIT ?")
        .bind(cidadao_id.to_string())
        .bind(quantidade)
        .fetch_all(pool)
        .await?
        .iter()
        .map(models::anamnese)
        .collect()
}

/// Triagem da anamnese mais recente que não foi rejeitada
pub async fn triagem_vigente(
    pool: &SqlitePool,
    cidadao_id: Uuid,
) -> Result<Option<TriagemPrevia>, DbError> {
    let linha = sqlx::query(
        "SELECT id, triagem_risco, criado_em FROM anamneses
         WHERE cidadao_id = ? AND status != 'rejeitada'
         ORDER BY criado_em DESC LIMIT 1",
    )
    .bind(cidadao_id.to_string())
    .fetch_optional(pool)
    .await?;

    linha
        .map(|linha| {
            Ok(TriagemPrevia {
                nivel: models::enumerado(&linha, "triagem_risco")?,
                anamnese_id: models::uuid(&linha, "id")?,
                registrada_em: linha.try_get("criado_em")?,
            })
        })
        .transpose()
}

/// Anamnese já gerada para esta coleta, se houver
pub async fn da_coleta(pool: &SqlitePool, dados_saude_id: Uuid) -> Result<Option<Anamnese>, DbError> {
    sqlx::query("SELECT * FROM anamneses WHERE dados_saude_id = ? ORDER BY criado_em DESC LIMIT 1")
        .bind(dados_saude_id.to_string())
        .fetch_optional(pool)
        .await?
        .map(|linha| models::anamnese(&linha))
        .transpose()
}

/// Grava o resultado de uma revisão já aplicada ao modelo
pub async fn gravar_revisao(pool: &SqlitePool, anamnese: &Anamnese) -> Result<(), DbError> {
    let resultado = sqlx::query(
        "UPDATE anamneses SET status = ?, revisado_por = ?, data_revisao = ?,
            comentarios_revisao = ?, resumo_final = ?, diagnostico_final = ?,
            recomendacoes_finais = ?
         WHERE id = ?",
    )
    .bind(anamnese.status.as_str())
    .bind(anamnese.revisado_por.as_deref())
    .bind(anamnese.data_revisao)
    .bind(&anamnese.comentarios_revisao)
    .bind(&anamnese.resumo_final)
    .bind(&anamnese.diagnostico_final)
    .bind(&anamnese.recomendacoes_finais)
    .bind(anamnese.id.to_string())
    .execute(pool)
    .await?;

    if resultado.rows_affected() == 0 {
        return Err(DbError::nao_encontrado("anamnese", anamnese.id));
    }
    info!(anamnese_id = %anamnese.id, status = %anamnese.status, "Anamnese revisada");
    Ok(())
}

pub async fn contar_por_status(
    pool: &SqlitePool,
    desde: Option<DateTime<Utc>>,
) -> Result<BTreeMap<StatusAnamnese, i64>, DbError> {
    let linhas = sqlx::query(
        "SELECT status, COUNT(*) AS total FROM anamneses
         WHERE (?1 IS NULL OR criado_em >= ?1)
         GROUP BY status",
    )
    .bind(desde)
    .fetch_all(pool)
    .await?;

    let mut contagem: BTreeMap<StatusAnamnese, i64> =
        StatusAnamnese::TODOS.iter().map(|s| (*s, 0)).collect();
    for linha in &linhas {
        contagem.insert(models::enumerado(linha, "status")?, linha.try_get("total")?);
    }
    Ok(contagem)
}

pub async fn contar_por_risco(
    pool: &SqlitePool,
    desde: Option<DateTime<Utc>>,
) -> Result<BTreeMap<NivelRisco, i64>, DbError> {
    let linhas = sqlx::query(
        "SELECT triagem_risco, COUNT(*) AS total FROM anamneses
         WHERE (?1 IS NULL OR criado_em >= ?1)
         GROUP BY triagem_risco",
    )
    .bind(desde)
    .fetch_all(pool)
    .await?;

    let mut contagem: BTreeMap<NivelRisco, i64> =
        NivelRisco::TODOS.iter().map(|n| (*n, 0)).collect();
    for linha in &linhas {
        contagem.insert(models::enumerado(linha, "triagem_risco")?, linha.try_get("total")?);
    }
    Ok(contagem)
}

pub async fn contar(pool: &SqlitePool) -> Result<i64, DbError> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM anamneses")
        .fetch_one(pool)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositorio::{cidadaos, dados_saude};
    use crate::testes::{anamnese_exemplo, banco_temporario, cidadao_exemplo, dados_exemplo};
    use chrono::Duration;

    #[tokio::test]
    async fn test_triagem_vigente_ignora_rejeitada() -> anyhow::Result<()> {
        let banco = banco_temporario().await?;
        let cidadao = cidadao_exemplo("529.982.247-25");
        cidadaos::inserir(&banco.pool, &banco.cofre, &cidadao).await?;
        let dados = dados_exemplo(cidadao.id);
        dados_saude::inserir(&banco.pool, &dados).await?;

        assert!(triagem_vigente(&banco.pool, cidadao.id).await?.is_none());

        let mut antiga = anamnese_exemplo(&dados, NivelRisco::Alto);
        antiga.criado_em = antiga.criado_em - Duration::hours(2);
        inserir(&banco.pool, &antiga).await?;

        let retorno = dados_exemplo(cidadao.id);
        dados_saude::inserir(&banco.pool, &retorno).await?;
        let mut rejeitada = anamnese_exemplo(&retorno, NivelRisco::Baixo);
        rejeitada.status = StatusAnamnese::Rejeitada;
        inserir(&banco.pool, &rejeitada).await?;

        let triagem = triagem_vigente(&banco.pool, cidadao.id).await?.expect("triagem");
        assert_eq!(triagem.nivel, NivelRisco::Alto);
        assert_eq!(triagem.anamnese_id, antiga.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_revisao_e_contagens() -> anyhow::Result<()> {
        let banco = banco_temporario().await?;
        let cidadao = cidadao_exemplo("529.982.247-25");
        cidadaos::inserir(&banco.pool, &banco.cofre, &cidadao).await?;
        let dados = dados_exemplo(cidadao.id);
        dados_saude::inserir(&banco.pool, &dados).await?;

        let mut anamnese = anamnese_exemplo(&dados, NivelRisco::Critico);
        inserir(&banco.pool, &anamnese).await?;

        let lida = buscar(&banco.pool, anamnese.id).await?;
        assert_eq!(lida.hipoteses_diagnosticas, anamnese.hipoteses_diagnosticas);
        assert_eq!(lida.resposta_completa_ia, anamnese.resposta_completa_ia);

        anamnese.status = StatusAnamnese::Aprovada;
        anamnese.revisado_por = Some("dra.ana".to_string());
        anamnese.data_revisao = Some(Utc::now());
        anamnese.resumo_final = "Resumo revisado".to_string();
        gravar_revisao(&banco.pool, &anamnese).await?;

        let revisada = buscar(&banco.pool, anamnese.id).await?;
        assert_eq!(revisada.status, StatusAnamnese::Aprovada);
        assert_eq!(revisada.resumo_vigente(), "Resumo revisado");

        let por_status = contar_por_status(&banco.pool, None).await?;
        assert_eq!(por_status[&StatusAnamnese::Aprovada], 1);
        assert_eq!(por_status[&StatusAnamnese::Pendente], 0);
        let por_risco = contar_por_risco(&banco.pool, Some(Utc::now() - Duration::days(1))).await?;
        assert_eq!(por_risco[&NivelRisco::Critico], 1);

        let filtro = FiltroAnamneses {
            status: Some(StatusAnamnese::Pendente),
            ..Default::default()
        };
        assert!(listar(&banco.pool, &filtro).await?.is_empty());
        assert_eq!(da_coleta(&banco.pool, dados.id).await?.map(|a| a.id), Some(anamnese.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_uma_anamnese_por_coleta() -> anyhow::Result<()> {
        let banco = banco_temporario().await?;
        let cidadao = cidadao_exemplo("529.982.247-25");
        cidadaos::inserir(&banco.pool, &banco.cofre, &cidadao).await?;
        let dados = dados_exemplo(cidadao.id);
        dados_saude::inserir(&banco.pool, &dados).await?;

        inserir(&banco.pool, &anamnese_exemplo(&dados, NivelRisco::Alto)).await?;
        let erro = inserir(&banco.pool, &anamnese_exemplo(&dados, NivelRisco::Baixo))
            .await
            .unwrap_err();
        assert!(matches!(erro, DbError::ConstraintViolation(_)));

        // dentro de transação desfeita nada fica gravado
        let outra = dados_exemplo(cidadao.id);
        dados_saude::inserir(&banco.pool, &outra).await?;
        let mut tx = banco.pool.begin().await?;
        inserir(&mut *tx, &anamnese_exemplo(&outra, NivelRisco::Medio)).await?;
        tx.rollback().await?;
        assert!(da_coleta(&banco.pool, outra.id).await?.is_none());
        assert_eq!(contar(&banco.pool).await?, 1);
        Ok(())
    }
}
