//! Pontos do mapa de risco

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use saude_core::geo::LIMITE_MARCADORES;
use saude_core::modelos::{LocalizacaoSaude, NivelRisco};
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbError;
use crate::models;

/// Filtros do mapa
#[derive(Debug, Clone, Default)]
pub struct FiltroMapa {
    pub nivel_risco: Option<NivelRisco>,
    /// Trecho do nome da cidade
    pub cidade: Option<String>,
    /// Data da anamnese associada, inclusiva
    pub data_inicio: Option<NaiveDate>,
    pub data_fim: Option<NaiveDate>,
    /// Só pontos com anamnese associada
    pub apenas_com_anamnese: bool,
}

/// Ponto do mapa acompanhado do necessário para montar o marcador
#[derive(Debug, Clone)]
pub struct PontoMapa {
    pub localizacao: LocalizacaoSaude,
    pub nome: String,
    pub data_nascimento: NaiveDate,
}

/// Cria ou substitui o ponto do cidadão (um por cidadão)
pub async fn gravar(pool: &SqlitePool, localizacao: &LocalizacaoSaude) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO localizacoes_saude (id, cidadao_id, dados_saude_id, anamnese_id, latitude,
            longitude, endereco_completo, bairro, cidade, estado, cep, nivel_risco,
            pontuacao_risco, criado_em, atualizado_em, ativo)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (cidadao_id) DO UPDATE SET
            dados_saude_id = excluded.dados_saude_id,
            anamnese_id = excluded.anamnese_id,
            latitude = excluded.latitude,
            longitude = excluded.longitude,
            endereco_completo = excluded.endereco_completo,
            bairro = excluded.bairro,
            cidade = excluded.cidade,
            estado = excluded.estado,
            cep = excluded.cep,
            nivel_risco = excluded.nivel_risco,
            pontuacao_risco = excluded.pontuacao_risco,
            atualizado_em = excluded.atualizado_em,
            ativo = excluded.ativo",
    )
    .bind(localizacao.id.to_string())
    .bind(localizacao.cidadao_id.to_string())
    .bind(localizacao.dados_saude_id.map(|id| id.to_string()))
    .bind(localizacao.anamnese_id.map(|id| id.to_string()))
    .bind(localizacao.latitude)
    .bind(localizacao.longitude)
    .bind(&localizacao.endereco_completo)
    .bind(&localizacao.bairro)
    .bind(&localizacao.cidade)
    .bind(&localizacao.estado)
    .bind(&localizacao.cep)
    .bind(localizacao.nivel_risco.as_str())
    .bind(localizacao.pontuacao_risco)
    .bind(localizacao.criado_em)
    .bind(localizacao.atualizado_em)
    .bind(localizacao.ativo)
    .execute(pool)
    .await?;

    debug!(
        cidadao_id = %localizacao.cidadao_id,
        nivel = %localizacao.nivel_risco,
        pontuacao = localizacao.pontuacao_risco,
        "Localização gravada"
    );
    Ok(())
}

pub async fn do_cidadao(
    pool: &SqlitePool,
    cidadao_id: Uuid,
) -> Result<Option<LocalizacaoSaude>, DbError> {
    sqlx::query("SELECT * FROM localizacoes_saude WHERE cidadao_id = ?")
        .bind(cidadao_id.to_string())
        .fetch_optional(pool)
        .await?
        .map(|linha| models::localizacao(&linha))
        .transpose()
}

/// Atualiza nível e pontuação; devolve `false` se o cidadão não tem ponto
pub async fn atualizar_risco<'e, E>(
    executor: E,
    cidadao_id: Uuid,
    nivel: NivelRisco,
    pontuacao: i64,
    anamnese_id: Option<Uuid>,
    agora: DateTime<Utc>,
) -> Result<bool, DbError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let resultado = sqlx::query(
        "UPDATE localizacoes_saude
         SET nivel_risco = ?, pontuacao_risco = ?,
             anamnese_id = COALESCE(?, anamnese_id), atualizado_em = ?
         WHERE cidadao_id = ?",
    )
    .bind(nivel.as_str())
    .bind(pontuacao)
    .bind(anamnese_id.map(|id| id.to_string()))
    .bind(agora)
    .bind(cidadao_id.to_string())
    .execute(executor)
    .await?;
    Ok(resultado.rows_affected() > 0)
}

/// Pontos ativos de cidadãos ativos, limitados a `LIMITE_MARCADORES`
pub async fn listar_mapa(pool: &SqlitePool, filtro: &FiltroMapa) -> Result<Vec<PontoMapa>, DbError> {
    let linhas = sqlx::query(
        "SELECT l.*, c.nome AS cidadao_nome, c.data_nascimento AS cidadao_nascimento
         FROM localizacoes_saude l
         JOIN cidadaos c ON c.id = l.cidadao_id
         LEFT JOIN anamneses a ON a.id = l.anamnese_id
         WHERE l.ativo = 1 AND c.ativo = 1
           AND (?1 IS NULL OR l.nivel_risco = ?1)
           AND (?2 IS NULL OR l.cidade LIKE '%' || ?2 || '%')
           AND (?3 IS NULL OR date(a.criado_em) >= ?3)
           AND (?4 IS NULL OR date(a.criado_em) <= ?4)
           AND (?5 = 0 OR l.anamnese_id IS NOT NULL)
         ORDER BY l.pontuacao_risco DESC
         LIMIT ?6",
    )
    .bind(filtro.nivel_risco.map(|n| n.as_str()))
    .bind(filtro.cidade.as_deref())
    .bind(filtro.data_inicio)
    .bind(filtro.data_fim)
    .bind(filtro.apenas_com_anamnese)
    .bind(LIMITE_MARCADORES as i64)
    .fetch_all(pool)
    .await?;

    linhas
        .iter()
        .map(|linha| {
            Ok(PontoMapa {
                localizacao: models::localizacao(linha)?,
                nome: linha.try_get("cidadao_nome")?,
                data_nascimento: linha.try_get("cidadao_nascimento")?,
            })
        })
        .collect()
}

/// Total de pontos ativos por nível
pub async fn contar_por_risco(pool: &SqlitePool) -> Result<BTreeMap<NivelRisco, i64>, DbError> {
    let linhas = sqlx::query(
        "SELECT nivel_risco, COUNT(*) AS total FROM localizacoes_saude
         WHERE ativo = 1 GROUP BY nivel_risco",
    )
    .fetch_all(pool)
    .await?;

    let mut contagem: BTreeMap<NivelRisco, i64> =
        NivelRisco::TODOS.iter().map(|n| (*n, 0)).collect();
    for linha in &linhas {
        contagem.insert(models::enumerado(linha, "nivel_risco")?, linha.try_get("total")?);
    }
    Ok(contagem)
}

/// Contagem por cidade e nível
pub async fn contar_por_cidade(pool: &SqlitePool) -> Result<Vec<(String, NivelRisco, i64)>, DbError> {
    let linhas = sqlx::query(
        "SELECT cidade, nivel_risco, COUNT(*) AS total FROM localizacoes_saude
         WHERE ativo = 1 GROUP BY cidade, nivel_risco ORDER BY cidade, nivel_risco",
    )
    .fetch_all(pool)
    .await?;

    linhas
        .iter()
        .map(|linha| {
            Ok((
                linha.try_get("cidade")?,
                models::enumerado(linha, "nivel_risco")?,
                linha.try_get("total")?,
            ))
        })
        .collect()
}
