//! Log de auditoria das chamadas de IA

use chrono::{DateTime, Utc};
use saude_core::modelos::RegistroAuditoriaIa;
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::error::DbError;
use crate::models;

pub async fn registrar<'e, E>(executor: E, registro: &RegistroAuditoriaIa) -> Result<(), DbError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO logs_auditoria_ia (id, tipo_operacao, cidadao_id, anamnese_id, modelo_ia,
            prompt_enviado, dados_entrada, resposta_ia, tempo_processamento_ms, sucesso,
            erro_detalhes, tokens_utilizados, custo_estimado, dados_anonimizados, criado_em)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(registro.id.to_string())
    .bind(registro.tipo_operacao.as_str())
    .bind(registro.cidadao_id.map(|id| id.to_string()))
    .bind(registro.anamnese_id.map(|id| id.to_string()))
    .bind(&registro.modelo_ia)
    .bind(&registro.prompt_enviado)
    .bind(serde_json::to_string(&registro.dados_entrada)?)
    .bind(serde_json::to_string(&registro.resposta_ia)?)
    .bind(registro.tempo_processamento_ms)
    .bind(registro.sucesso)
    .bind(&registro.erro_detalhes)
    .bind(registro.tokens_utilizados)
    .bind(registro.custo_estimado)
    .bind(registro.dados_anonimizados)
    .bind(registro.criado_em)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn do_cidadao(
    pool: &SqlitePool,
    cidadao_id: Uuid,
) -> Result<Vec<RegistroAuditoriaIa>, DbError> {
    sqlx::query("SELECT * FROM logs_auditoria_ia WHERE cidadao_id = ? ORDER BY criado_em DESC")
        .bind(cidadao_id.to_string())
        .fetch_all(pool)
        .await?
        .iter()
        .map(models::registro_ia)
        .collect()
}

/// Totais de uso da IA num período
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct UsoIa {
    pub chamadas: i64,
    pub falhas: i64,
    pub tokens: i64,
    pub custo_estimado: f64,
}

pub async fn uso_desde(pool: &SqlitePool, desde: DateTime<Utc>) -> Result<UsoIa, DbError> {
    let linha = sqlx::query(
        "SELECT COUNT(*) AS chamadas,
                COALESCE(SUM(CASE WHEN sucesso = 0 THEN 1 ELSE 0 END), 0) AS falhas,
                COALESCE(SUM(tokens_utilizados), 0) AS tokens,
                COALESCE(SUM(custo_estimado), 0.0) AS custo
         FROM logs_auditoria_ia WHERE criado_em >= ?",
    )
    .bind(desde)
    .fetch_one(pool)
    .await?;

    Ok(UsoIa {
        chamadas: linha.try_get("chamadas")?,
        falhas: linha.try_get("falhas")?,
        tokens: linha.try_get("tokens")?,
        custo_estimado: linha.try_get("custo")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testes::banco_temporario;
    use chrono::Duration;
    use saude_core::modelos::TipoOperacaoIa;
    use serde_json::json;

    fn registro(sucesso: bool, tokens: Option<i64>) -> RegistroAuditoriaIa {
        RegistroAuditoriaIa {
            id: Uuid::new_v4(),
            tipo_operacao: TipoOperacaoIa::Anamnese,
            cidadao_id: Some(Uuid::new_v4()),
            anamnese_id: None,
            modelo_ia: "gpt-3.5-turbo".to_string(),
            prompt_enviado: "prompt".to_string(),
            dados_entrada: json!({"faixa_etaria": "30_49"}),
            resposta_ia: json!({}),
            tempo_processamento_ms: 850,
            sucesso,
            erro_detalhes: if sucesso { String::new() } else { "timeout".to_string() },
            tokens_utilizados: tokens,
            custo_estimado: tokens.map(|t| t as f64 * 0.000002),
            dados_anonimizados: true,
            criado_em: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_uso_agrega_sucessos_e_falhas() -> anyhow::Result<()> {
        let banco = banco_temporario().await?;
        let ok = registro(true, Some(1000));
        registrar(&banco.pool, &ok).await?;
        registrar(&banco.pool, &registro(false, None)).await?;

        let uso = uso_desde(&banco.pool, Utc::now() - Duration::hours(1)).await?;
        assert_eq!(uso.chamadas, 2);
        assert_eq!(uso.falhas, 1);
        assert_eq!(uso.tokens, 1000);
        assert!((uso.custo_estimado - 0.002).abs() < 1e-9);

        let cidadao_id = ok.cidadao_id.expect("cidadão");
        let registros = do_cidadao(&banco.pool, cidadao_id).await?;
        assert_eq!(registros.len(), 1);
        assert_eq!(registros[0].dados_entrada["faixa_etaria"], "30_49");
        Ok(())
    }
}
