//! Risco por cidadão a partir do que está gravado

use chrono::{DateTime, NaiveDate, Utc};
use saude_core::modelos::Cidadao;
use saude_core::{CalculadorRisco, EntradaRisco, ResultadoRisco};
use saude_db::repositorio::{anamneses, cidadaos, dados_saude, localizacoes};
use saude_db::{Cofre, DbError};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Cadastro, coleta mais recente e a triagem vigente da última anamnese
pub async fn entrada_do_cidadao(
    pool: &SqlitePool,
    cidadao: &Cidadao,
    hoje: NaiveDate,
) -> Result<EntradaRisco, DbError> {
    let ultimos_dados = dados_saude::ultima_do_cidadao(pool, cidadao.id).await?;
    let triagem = anamneses::triagem_vigente(pool, cidadao.id).await?;
    Ok(EntradaRisco::a_partir_de(cidadao, ultimos_dados.as_ref(), triagem, hoje))
}

pub async fn calcular_risco_cidadao(
    pool: &SqlitePool,
    calculador: &CalculadorRisco,
    cidadao: &Cidadao,
    hoje: NaiveDate,
) -> Result<ResultadoRisco, DbError> {
    let entrada = entrada_do_cidadao(pool, cidadao, hoje).await?;
    Ok(calculador.calcular(&entrada))
}

/// Recalcula e grava no mapa o risco de um cidadão. Devolve `false` quando
/// o cidadão ainda não tem ponto no mapa.
pub async fn atualizar_no_mapa(
    pool: &SqlitePool,
    calculador: &CalculadorRisco,
    cidadao: &Cidadao,
    agora: DateTime<Utc>,
) -> Result<(ResultadoRisco, bool), DbError> {
    let resultado = calcular_risco_cidadao(pool, calculador, cidadao, agora.date_naive()).await?;
    let atualizado = localizacoes::atualizar_risco(
        pool,
        cidadao.id,
        resultado.nivel,
        resultado.pontuacao_inteira(),
        resultado.anamnese_id,
        agora,
    )
    .await?;
    Ok((resultado, atualizado))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResumoRecalculo {
    pub processados: usize,
    pub atualizados: usize,
    pub sem_localizacao: usize,
    pub falhas: usize,
}

/// Recalcula o risco de todos os cidadãos ativos. A falha de um cidadão não
/// interrompe os demais.
pub async fn recalcular_todos(
    pool: &SqlitePool,
    cofre: &Cofre,
    calculador: &CalculadorRisco,
    agora: DateTime<Utc>,
) -> Result<ResumoRecalculo, DbError> {
    let mut resumo = ResumoRecalculo::default();

    for cidadao in cidadaos::listar_ativos(pool, cofre).await? {
        resumo.processados += 1;
        match atualizar_no_mapa(pool, calculador, &cidadao, agora).await {
            Ok((_, true)) => resumo.atualizados += 1,
            Ok((_, false)) => resumo.sem_localizacao += 1,
            Err(erro) => {
                warn!(cidadao_id = %cidadao.id, error = %erro, "Falha ao recalcular risco");
                resumo.falhas += 1;
            }
        }
    }

    info!(
        processados = resumo.processados,
        atualizados = resumo.atualizados,
        sem_localizacao = resumo.sem_localizacao,
        falhas = resumo.falhas,
        "Recálculo de riscos concluído"
    );
    Ok(resumo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use saude_core::modelos::{LocalizacaoSaude, NivelRisco};
    use saude_core::FonteRisco;
    use saude_db::testes::{anamnese_exemplo, banco_temporario, cidadao_exemplo, dados_exemplo};
    use uuid::Uuid;

    fn localizacao(cidadao: &Cidadao) -> LocalizacaoSaude {
        let agora = Utc::now();
        LocalizacaoSaude {
            id: Uuid::new_v4(),
            cidadao_id: cidadao.id,
            dados_saude_id: None,
            anamnese_id: None,
            latitude: -3.73,
            longitude: -38.52,
            endereco_completo: "Centro, Fortaleza/CE".to_string(),
            bairro: "Centro".to_string(),
            cidade: "Fortaleza".to_string(),
            estado: "CE".to_string(),
            cep: "60110-000".to_string(),
            nivel_risco: NivelRisco::Baixo,
            pontuacao_risco: 0,
            criado_em: agora,
            atualizado_em: agora,
            ativo: true,
        }
    }

    #[tokio::test]
    async fn test_triagem_da_anamnese_prevalece() -> anyhow::Result<()> {
        let banco = banco_temporario().await?;
        let cidadao = cidadao_exemplo("529.982.247-25");
        cidadaos::inserir(&banco.pool, &banco.cofre, &cidadao).await?;
        let dados = dados_exemplo(cidadao.id);
        dados_saude::inserir(&banco.pool, &dados).await?;

        let calculador = CalculadorRisco::new();
        let hoje = Utc::now().date_naive();
        let calculado = calcular_risco_cidadao(&banco.pool, &calculador, &cidadao, hoje).await?;
        assert_eq!(calculado.fonte, FonteRisco::CalculoAutomatico);

        let anamnese = anamnese_exemplo(&dados, NivelRisco::Critico);
        anamneses::inserir(&banco.pool, &anamnese).await?;
        let vigente = calcular_risco_cidadao(&banco.pool, &calculador, &cidadao, hoje).await?;
        assert_eq!(vigente.fonte, FonteRisco::AnamneseIa);
        assert_eq!(vigente.nivel, NivelRisco::Critico);
        assert_eq!(vigente.anamnese_id, Some(anamnese.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_recalcular_todos() -> anyhow::Result<()> {
        let banco = banco_temporario().await?;
        let com_mapa = cidadao_exemplo("529.982.247-25");
        let sem_mapa = cidadao_exemplo("111.444.777-35");
        cidadaos::inserir(&banco.pool, &banco.cofre, &com_mapa).await?;
        cidadaos::inserir(&banco.pool, &banco.cofre, &sem_mapa).await?;
        localizacoes::gravar(&banco.pool, &localizacao(&com_mapa)).await?;
        dados_saude::inserir(&banco.pool, &dados_exemplo(com_mapa.id)).await?;

        let resumo =
            recalcular_todos(&banco.pool, &banco.cofre, &CalculadorRisco::new(), Utc::now()).await?;
        assert_eq!(
            resumo,
            ResumoRecalculo {
                processados: 2,
                atualizados: 1,
                sem_localizacao: 1,
                falhas: 0,
            }
        );

        let ponto = localizacoes::do_cidadao(&banco.pool, com_mapa.id).await?.expect("ponto");
        assert!(ponto.pontuacao_risco > 0);
        Ok(())
    }
}
