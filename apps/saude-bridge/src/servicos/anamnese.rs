//! Geração de anamneses pela IA e revisão humana

use std::time::Instant;

use chrono::{DateTime, Utc};
use saude_core::anamnese::{
    estimar_custo, montar_prompt, prompt_sistema, ContextoAnonimizado, RespostaAnamnese,
    ANAMNESES_NO_HISTORICO, MAX_TOKENS, TEMPERATURA,
};
use saude_core::clinico::alerta_de_risco;
use saude_core::lgpd::Finalidade;
use saude_core::modelos::{AlertaSaude, Anamnese, RegistroAuditoriaIa, StatusAnamnese, TipoOperacaoIa};
use saude_core::ErroValidacao;
use saude_db::repositorio::{alertas, anamneses, auditoria_ia, cidadaos, dados_saude, lgpd, localizacoes};
use saude_db::DbError;
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::servicos::ia::RequisicaoIa;
use crate::servicos::{alerta_saude, risco, ErroServico};
use crate::state::AppState;

/// Gera e grava a anamnese de uma coleta. Exige consentimento ativo para
/// processamento por IA e registra a chamada no log de auditoria, com
/// sucesso ou falha.
///
/// Uma coleta tem no máximo uma anamnese: se ela já existe é devolvida sem
/// nova chamada à IA. A anamnese, a auditoria, o alerta e o ponto do mapa
/// são gravados na mesma transação, então uma nova tentativa após falha não
/// duplica nada.
pub async fn gerar_anamnese(
    estado: &AppState,
    dados_saude_id: Uuid,
    agora: DateTime<Utc>,
) -> Result<Anamnese, ErroServico> {
    let pool = &estado.pool;
    let dados = dados_saude::buscar(pool, dados_saude_id).await?;
    if let Some(existente) = anamneses::da_coleta(pool, dados.id).await? {
        debug!(anamnese_id = %existente.id, %dados_saude_id, "Coleta já possui anamnese");
        return Ok(existente);
    }
    let cidadao = cidadaos::buscar(pool, &estado.cofre, dados.cidadao_id).await?;

    if !lgpd::consentimento_ativo(pool, cidadao.id, Finalidade::InteligenciaArtificial, agora).await? {
        warn!(cidadao_id = %cidadao.id, "Anamnese negada: sem consentimento para IA");
        return Err(ErroServico::SemConsentimento(Finalidade::InteligenciaArtificial));
    }

    let anteriores =
        anamneses::recentes_do_cidadao(pool, cidadao.id, ANAMNESES_NO_HISTORICO as i64).await?;
    let resultado_risco =
        risco::calcular_risco_cidadao(pool, &estado.calculador, &cidadao, agora.date_naive()).await?;
    let contexto =
        ContextoAnonimizado::montar(&cidadao, &dados, &anteriores, &resultado_risco, agora.date_naive());
    let dados_entrada = serde_json::to_value(&contexto)?;

    let requisicao = RequisicaoIa {
        modelo: estado.ia.modelo(),
        prompt_sistema: prompt_sistema().to_string(),
        prompt_usuario: montar_prompt(&contexto),
        temperatura: TEMPERATURA,
        max_tokens: MAX_TOKENS,
    };

    let inicio = Instant::now();
    let chamada = estado.ia.completar(&requisicao).await;
    let tempo_ms = inicio.elapsed().as_millis() as i64;

    let mut registro = RegistroAuditoriaIa {
        id: Uuid::new_v4(),
        tipo_operacao: TipoOperacaoIa::Anamnese,
        cidadao_id: Some(cidadao.id),
        anamnese_id: None,
        modelo_ia: requisicao.modelo.clone(),
        prompt_enviado: requisicao.prompt_usuario.clone(),
        dados_entrada: dados_entrada.clone(),
        resposta_ia: json!({}),
        tempo_processamento_ms: tempo_ms,
        sucesso: false,
        erro_detalhes: String::new(),
        tokens_utilizados: None,
        custo_estimado: None,
        dados_anonimizados: true,
        criado_em: agora,
    };

    let resposta_ia = match chamada {
        Ok(resposta) => resposta,
        Err(erro) => {
            error!(cidadao_id = %cidadao.id, error = %erro, "Falha na chamada à IA");
            registro.erro_detalhes = erro.to_string();
            auditoria_ia::registrar(pool, &registro).await?;
            return Err(erro.into());
        }
    };

    let resposta = RespostaAnamnese::interpretar(&resposta_ia.texto);
    if !resposta.estruturada {
        warn!(cidadao_id = %cidadao.id, "Resposta da IA fora do formato JSON; usando texto livre");
    }

    let anamnese = Anamnese {
        id: Uuid::new_v4(),
        cidadao_id: cidadao.id,
        dados_saude_id: dados.id,
        resumo_anamnese: resposta.resumo_anamnese.clone(),
        diagnostico_clinico: resposta.diagnostico_clinico.clone(),
        hipoteses_diagnosticas: resposta.hipoteses_diagnosticas.clone(),
        diagnostico_diferencial: resposta.diagnostico_diferencial.clone(),
        triagem_risco: resposta.triagem_risco,
        recomendacoes: resposta.recomendacoes.clone(),
        exames_complementares: resposta.exames_complementares.clone(),
        modelo_ia: requisicao.modelo.clone(),
        confianca_ia: Some((resposta.confianca() * 100.0).round()),
        dados_entrada_ia: dados_entrada,
        resposta_completa_ia: json!({
            "texto": resposta_ia.texto,
            "interpretada": resposta,
            "tokens_utilizados": resposta_ia.tokens_utilizados,
        }),
        status: StatusAnamnese::Pendente,
        revisado_por: None,
        data_revisao: None,
        comentarios_revisao: String::new(),
        resumo_final: String::new(),
        diagnostico_final: String::new(),
        recomendacoes_finais: String::new(),
        criado_em: agora,
    };

    registro.sucesso = true;
    registro.anamnese_id = Some(anamnese.id);
    registro.resposta_ia = anamnese.resposta_completa_ia.clone();
    registro.tokens_utilizados = resposta_ia.tokens_utilizados.map(i64::from);
    registro.custo_estimado = resposta_ia
        .tokens_utilizados
        .map(|tokens| estimar_custo(tokens, &requisicao.modelo));

    let alerta = alerta_de_risco(anamnese.triagem_risco, &anamnese.resumo_anamnese)
        .map(|alerta| alerta_saude(alerta, cidadao.id, Some(anamnese.id), Some(dados.id), agora));

    if let Err(erro) = gravar_anamnese(pool, &anamnese, &registro, alerta.as_ref(), agora).await {
        // a chamada à IA aconteceu e fica auditada mesmo sem anamnese gravada
        registro.sucesso = false;
        registro.anamnese_id = None;
        registro.erro_detalhes = erro.to_string();
        if let Err(auditoria) = auditoria_ia::registrar(pool, &registro).await {
            warn!(cidadao_id = %cidadao.id, error = %auditoria, "Falha ao auditar chamada à IA");
        }
        return Err(erro.into());
    }

    info!(
        anamnese_id = %anamnese.id,
        cidadao_id = %cidadao.id,
        triagem = %anamnese.triagem_risco,
        tempo_ms,
        "Anamnese gerada"
    );
    Ok(anamnese)
}

async fn gravar_anamnese(
    pool: &SqlitePool,
    anamnese: &Anamnese,
    registro: &RegistroAuditoriaIa,
    alerta: Option<&AlertaSaude>,
    agora: DateTime<Utc>,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;
    anamneses::inserir(&mut *tx, anamnese).await?;
    auditoria_ia::registrar(&mut *tx, registro).await?;
    if let Some(alerta) = alerta {
        alertas::inserir(&mut *tx, alerta).await?;
    }
    // a triagem da anamnese passa a valer no mapa
    localizacoes::atualizar_risco(
        &mut *tx,
        anamnese.cidadao_id,
        anamnese.triagem_risco,
        anamnese.triagem_risco.pontuacao_equivalente().round() as i64,
        Some(anamnese.id),
        agora,
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

/// Decisão do revisor
#[derive(Debug, Clone)]
pub struct Revisao {
    pub status: StatusAnamnese,
    pub revisado_por: String,
    pub comentarios: String,
    pub resumo_final: String,
    pub diagnostico_final: String,
    pub recomendacoes_finais: String,
}

/// Aplica a revisão e recalcula o risco do cidadão no mapa, já que uma
/// anamnese rejeitada deixa de valer como triagem.
pub async fn revisar_anamnese(
    estado: &AppState,
    anamnese_id: Uuid,
    revisao: Revisao,
    agora: DateTime<Utc>,
) -> Result<Anamnese, ErroServico> {
    let pool = &estado.pool;
    let mut anamnese = anamneses::buscar(pool, anamnese_id).await?;
    if !anamnese.status.pode_transitar_para(revisao.status) {
        return Err(ErroValidacao::TransicaoInvalida {
            de: anamnese.status.to_string(),
            para: revisao.status.to_string(),
        }
        .into());
    }

    anamnese.status = revisao.status;
    anamnese.revisado_por = Some(revisao.revisado_por);
    anamnese.data_revisao = Some(agora);
    anamnese.comentarios_revisao = revisao.comentarios;
    anamnese.resumo_final = revisao.resumo_final;
    anamnese.diagnostico_final = revisao.diagnostico_final;
    anamnese.recomendacoes_finais = revisao.recomendacoes_finais;
    anamneses::gravar_revisao(pool, &anamnese).await?;

    let cidadao = cidadaos::buscar(pool, &estado.cofre, anamnese.cidadao_id).await?;
    risco::atualizar_no_mapa(pool, &estado.calculador, &cidadao, agora).await?;

    info!(anamnese_id = %anamnese.id, status = %anamnese.status, "Anamnese revisada");
    Ok(anamnese)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servicos::ia::{ErroIa, MockProvedorIa, RespostaIa};
    use crate::testes::ambiente_de_teste;
    use saude_core::lgpd::Consentimento;
    use saude_core::modelos::{NivelRisco, PrioridadeAlerta};
    use saude_db::repositorio::alertas::FiltroAlertas;
    use saude_db::testes::{cidadao_exemplo, dados_exemplo};
    use std::sync::Arc;

    const RESPOSTA_ALTO: &str = r#"```json
{
  "resumo_anamnese": "Paciente idosa hipertensa com cefaleia e tontura há 3 dias.",
  "diagnostico_clinico": "Hipertensão arterial descompensada",
  "hipoteses_diagnosticas": ["Crise hipertensiva", "Cefaleia tensional"],
  "diagnostico_diferencial": "AVC, enxaqueca",
  "triagem_risco": "Alto",
  "recomendacoes": "Aferir pressão em 24h, revisar dose de anti-hipertensivo e orientar sinais de alarme.",
  "exames_complementares": ["Eletrocardiograma", "Creatinina"]
}
```"#;

    fn provedor_com(resposta: Result<&'static str, u16>) -> MockProvedorIa {
        let mut ia = MockProvedorIa::new();
        ia.expect_modelo().return_const("gpt-3.5-turbo".to_string());
        ia.expect_completar()
            .withf(|req| !req.prompt_usuario.contains("Maria") && !req.prompt_usuario.contains("529.982"))
            .times(1)
            .returning(move |_| match resposta {
                Ok(texto) => Ok(RespostaIa {
                    texto: texto.to_string(),
                    tokens_utilizados: Some(800),
                }),
                Err(status) => Err(ErroIa::Status {
                    status,
                    corpo: "indisponível".to_string(),
                }),
            });
        ia
    }

    async fn cadastrar(estado: &AppState, consentir: bool) -> anyhow::Result<Uuid> {
        let cidadao = cidadao_exemplo("529.982.247-25");
        cidadaos::inserir(&estado.pool, &estado.cofre, &cidadao).await?;
        if consentir {
            let consentimento = Consentimento::conceder(
                cidadao.id,
                Finalidade::InteligenciaArtificial,
                Utc::now(),
                None,
                String::new(),
            );
            lgpd::gravar_consentimento(&estado.pool, &consentimento).await?;
        }
        let dados = dados_exemplo(cidadao.id);
        dados_saude::inserir(&estado.pool, &dados).await?;
        Ok(dados.id)
    }

    #[tokio::test]
    async fn test_gerar_anamnese_completa() -> anyhow::Result<()> {
        let ambiente = ambiente_de_teste(Arc::new(provedor_com(Ok(RESPOSTA_ALTO))), None).await?;
        let estado = &ambiente.estado;
        let dados_id = cadastrar(estado, true).await?;

        let anamnese = gerar_anamnese(estado, dados_id, Utc::now()).await?;
        assert_eq!(anamnese.triagem_risco, NivelRisco::Alto);
        assert_eq!(anamnese.status, StatusAnamnese::Pendente);
        assert_eq!(anamnese.diagnostico_diferencial, vec!["AVC", "enxaqueca"]);
        assert_eq!(anamnese.confianca_ia, Some(90.0));

        let logs = auditoria_ia::do_cidadao(&estado.pool, anamnese.cidadao_id).await?;
        assert_eq!(logs.len(), 1);
        assert!(logs[0].sucesso);
        assert_eq!(logs[0].tokens_utilizados, Some(800));
        assert!(logs[0].dados_entrada.get("faixa_etaria").is_some());

        let abertos = alertas::listar(
            &estado.pool,
            &FiltroAlertas {
                cidadao_id: Some(anamnese.cidadao_id),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(abertos.len(), 1);
        assert_eq!(abertos[0].prioridade, PrioridadeAlerta::Alta);
        assert_eq!(abertos[0].anamnese_id, Some(anamnese.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_sem_consentimento_nao_chama_ia() -> anyhow::Result<()> {
        let mut ia = MockProvedorIa::new();
        ia.expect_completar().times(0);
        let ambiente = ambiente_de_teste(Arc::new(ia), None).await?;
        let dados_id = cadastrar(&ambiente.estado, false).await?;

        let erro = gerar_anamnese(&ambiente.estado, dados_id, Utc::now()).await.unwrap_err();
        assert!(matches!(erro, ErroServico::SemConsentimento(Finalidade::InteligenciaArtificial)));
        Ok(())
    }

    #[tokio::test]
    async fn test_falha_da_ia_fica_auditada() -> anyhow::Result<()> {
        let ambiente = ambiente_de_teste(Arc::new(provedor_com(Err(503))), None).await?;
        let estado = &ambiente.estado;
        let dados_id = cadastrar(estado, true).await?;

        let erro = gerar_anamnese(estado, dados_id, Utc::now()).await.unwrap_err();
        assert!(erro.transitorio());

        let dados = dados_saude::buscar(&estado.pool, dados_id).await?;
        let logs = auditoria_ia::do_cidadao(&estado.pool, dados.cidadao_id).await?;
        assert_eq!(logs.len(), 1);
        assert!(!logs[0].sucesso);
        assert!(logs[0].erro_detalhes.contains("503"));
        assert!(anamneses::da_coleta(&estado.pool, dados_id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_coleta_com_anamnese_nao_chama_ia_de_novo() -> anyhow::Result<()> {
        let ambiente = ambiente_de_teste(Arc::new(provedor_com(Ok(RESPOSTA_ALTO))), None).await?;
        let estado = &ambiente.estado;
        let dados_id = cadastrar(estado, true).await?;

        let primeira = gerar_anamnese(estado, dados_id, Utc::now()).await?;
        // o mock aceita uma única chamada à IA
        let segunda = gerar_anamnese(estado, dados_id, Utc::now()).await?;
        assert_eq!(segunda.id, primeira.id);

        let logs = auditoria_ia::do_cidadao(&estado.pool, primeira.cidadao_id).await?;
        assert_eq!(logs.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_geracoes_simultaneas_gravam_uma_anamnese() -> anyhow::Result<()> {
        let mut ia = MockProvedorIa::new();
        ia.expect_modelo().return_const("gpt-3.5-turbo".to_string());
        ia.expect_completar().times(1..=2).returning(|_| {
            Ok(RespostaIa {
                texto: RESPOSTA_ALTO.to_string(),
                tokens_utilizados: Some(800),
            })
        });
        let ambiente = ambiente_de_teste(Arc::new(ia), None).await?;
        let estado = &ambiente.estado;
        let dados_id = cadastrar(estado, true).await?;

        let (a, b) = tokio::join!(
            gerar_anamnese(estado, dados_id, Utc::now()),
            gerar_anamnese(estado, dados_id, Utc::now())
        );
        for resultado in [&a, &b] {
            if let Err(erro) = resultado {
                assert!(matches!(erro, ErroServico::Db(DbError::ConstraintViolation(_))), "{erro}");
            }
        }
        let vencedora = a.or(b)?;

        let filtro = saude_db::repositorio::anamneses::FiltroAnamneses {
            cidadao_id: Some(vencedora.cidadao_id),
            ..Default::default()
        };
        assert_eq!(anamneses::listar(&estado.pool, &filtro).await?.len(), 1);
        let abertos = alertas::listar(
            &estado.pool,
            &FiltroAlertas {
                cidadao_id: Some(vencedora.cidadao_id),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(abertos.len(), 1);
        assert_eq!(abertos[0].anamnese_id, Some(vencedora.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_revisao_rejeitada_devolve_calculo() -> anyhow::Result<()> {
        let ambiente = ambiente_de_teste(Arc::new(provedor_com(Ok(RESPOSTA_ALTO))), None).await?;
        let estado = &ambiente.estado;
        let dados_id = cadastrar(estado, true).await?;
        let anamnese = gerar_anamnese(estado, dados_id, Utc::now()).await?;

        let revisao = Revisao {
            status: StatusAnamnese::Rejeitada,
            revisado_por: "dra.ana".to_string(),
            comentarios: "Dados incompletos".to_string(),
            resumo_final: String::new(),
            diagnostico_final: String::new(),
            recomendacoes_finais: String::new(),
        };
        let revisada = revisar_anamnese(estado, anamnese.id, revisao.clone(), Utc::now()).await?;
        assert_eq!(revisada.status, StatusAnamnese::Rejeitada);
        assert_eq!(revisada.revisado_por.as_deref(), Some("dra.ana"));
        assert!(anamneses::triagem_vigente(&estado.pool, anamnese.cidadao_id).await?.is_none());

        // rejeitada é estado final
        let erro = revisar_anamnese(estado, anamnese.id, revisao, Utc::now()).await.unwrap_err();
        assert!(matches!(erro, ErroServico::Validacao(ErroValidacao::TransicaoInvalida { .. })));
        Ok(())
    }
}
