//! Tarefas em segundo plano
//!
//! Cada requisição que dispara trabalho demorado (processar coleta, gerar
//! anamnese, geocodificar) devolve a resposta na hora e segue numa tarefa
//! `tokio`. Falhas transitórias são repetidas com espera exponencial.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use saude_db::repositorio::cidadaos;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ConfigTarefas;
use crate::servicos::anamnese::gerar_anamnese;
use crate::servicos::coleta::processar_coleta;
use crate::servicos::geocodificacao::processar_cidadao_sem_localizacao;
use crate::servicos::{risco, ErroServico};
use crate::state::AppState;

/// Cidadãos sem ponto no mapa tratados a cada ciclo periódico
const GEOCODIFICACOES_POR_CICLO: i64 = 50;

/// Atraso do primeiro ciclo, para o servidor terminar de subir
const ATRASO_INICIAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoliticaRetentativa {
    /// Novas tentativas além da primeira
    pub tentativas: u32,
    pub base: Duration,
}

impl PoliticaRetentativa {
    pub fn da_config(config: &ConfigTarefas) -> Self {
        Self {
            tentativas: config.max_tentativas,
            base: config.retentativa_base,
        }
    }

    /// Espera antes da nova tentativa `n` (contada a partir de 0)
    pub fn espera(&self, n: u32) -> Duration {
        self.base.saturating_mul(2u32.saturating_pow(n))
    }
}

/// Executa `operacao` até dar certo, até a falha não ser transitória ou até
/// esgotar as tentativas.
pub async fn com_retentativas<T, F, Fut>(
    nome: &str,
    politica: PoliticaRetentativa,
    mut operacao: F,
) -> Result<T, ErroServico>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ErroServico>>,
{
    let mut feitas = 0;
    loop {
        match operacao().await {
            Ok(valor) => return Ok(valor),
            Err(erro) if erro.transitorio() && feitas < politica.tentativas => {
                let espera = politica.espera(feitas);
                warn!(
                    tarefa = nome,
                    tentativa = feitas + 1,
                    espera_ms = espera.as_millis() as u64,
                    error = %erro,
                    "Falha transitória; nova tentativa agendada"
                );
                tokio::time::sleep(espera).await;
                feitas += 1;
            }
            Err(erro) => return Err(erro),
        }
    }
}

/// Processa a coleta e, quando o risco pede, gera a anamnese em seguida
pub fn agendar_processamento_coleta(estado: Arc<AppState>, dados_saude_id: Uuid) -> JoinHandle<()> {
    tokio::spawn(async move {
        let politica = PoliticaRetentativa::da_config(&estado.config.tarefas);
        let resultado = com_retentativas("processar_coleta", politica, || {
            processar_coleta(&estado, dados_saude_id, Utc::now())
        })
        .await;

        let resultado = match resultado {
            Ok(resultado) => resultado,
            Err(erro) => {
                error!(%dados_saude_id, error = %erro, "Falha ao processar coleta");
                return;
            }
        };

        if !resultado.exige_anamnese {
            return;
        }
        if !estado.ia_habilitada() {
            debug!(%dados_saude_id, "Risco elevado, mas a IA está desabilitada");
            return;
        }
        info!(%dados_saude_id, nivel = %resultado.risco.nivel, "Gerando anamnese automática");
        executar_geracao_anamnese(&estado, dados_saude_id).await;
    })
}

pub fn agendar_geracao_anamnese(estado: Arc<AppState>, dados_saude_id: Uuid) -> JoinHandle<()> {
    tokio::spawn(async move {
        executar_geracao_anamnese(&estado, dados_saude_id).await;
    })
}

async fn executar_geracao_anamnese(estado: &AppState, dados_saude_id: Uuid) {
    let politica = PoliticaRetentativa::da_config(&estado.config.tarefas);
    match com_retentativas("gerar_anamnese", politica, || {
        gerar_anamnese(estado, dados_saude_id, Utc::now())
    })
    .await
    {
        Ok(anamnese) => debug!(anamnese_id = %anamnese.id, "Tarefa de anamnese concluída"),
        Err(ErroServico::SemConsentimento(finalidade)) => {
            info!(%dados_saude_id, %finalidade, "Anamnese não gerada: sem consentimento")
        }
        Err(erro) => error!(%dados_saude_id, error = %erro, "Falha ao gerar anamnese"),
    }
}

pub fn agendar_geocodificacao(estado: Arc<AppState>, cidadao_id: Uuid) -> JoinHandle<()> {
    tokio::spawn(async move {
        let politica = PoliticaRetentativa::da_config(&estado.config.tarefas);
        let resultado = com_retentativas("geocodificar_cidadao", politica, || async {
            let cidadao = cidadaos::buscar(&estado.pool, &estado.cofre, cidadao_id).await?;
            processar_cidadao_sem_localizacao(
                &estado.pool,
                &estado.geocodificacao,
                &estado.calculador,
                &cidadao,
                Utc::now(),
            )
            .await
        })
        .await;

        if let Err(erro) = resultado {
            error!(%cidadao_id, error = %erro, "Falha ao geocodificar cidadão");
        }
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResumoGeocodificacao {
    pub processados: usize,
    pub localizados: usize,
    pub falhas: usize,
}

/// Cria pontos no mapa para até `limite` cidadãos ainda sem localização
pub async fn geocodificar_pendentes(
    estado: &AppState,
    limite: i64,
) -> Result<ResumoGeocodificacao, ErroServico> {
    let mut resumo = ResumoGeocodificacao::default();
    for cidadao in cidadaos::listar_sem_localizacao(&estado.pool, &estado.cofre, limite).await? {
        resumo.processados += 1;
        match processar_cidadao_sem_localizacao(
            &estado.pool,
            &estado.geocodificacao,
            &estado.calculador,
            &cidadao,
            Utc::now(),
        )
        .await
        {
            Ok(Some(_)) => resumo.localizados += 1,
            Ok(None) => {}
            Err(erro) => {
                warn!(cidadao_id = %cidadao.id, error = %erro, "Geocodificação pendente falhou");
                resumo.falhas += 1;
            }
        }
    }
    Ok(resumo)
}

/// Um ciclo: localiza pendentes e recalcula o risco de todos no mapa
pub async fn executar_ciclo(estado: &AppState) {
    match geocodificar_pendentes(estado, GEOCODIFICACOES_POR_CICLO).await {
        Ok(resumo) if resumo.processados > 0 => info!(
            processados = resumo.processados,
            localizados = resumo.localizados,
            falhas = resumo.falhas,
            "Geocodificação de pendentes concluída"
        ),
        Ok(_) => {}
        Err(erro) => warn!(error = %erro, "Falha ao listar cidadãos sem localização"),
    }

    if let Err(erro) =
        risco::recalcular_todos(&estado.pool, &estado.cofre, &estado.calculador, Utc::now()).await
    {
        error!(error = %erro, "Falha no recálculo periódico de riscos");
    }
}

pub fn iniciar_recalculo_periodico(estado: Arc<AppState>) -> JoinHandle<()> {
    let periodo = estado.config.tarefas.intervalo_recalculo;
    tokio::spawn(async move {
        info!(intervalo_secs = periodo.as_secs(), "Agendador de recálculo iniciado");
        let mut intervalo = interval_at(Instant::now() + ATRASO_INICIAL, periodo);
        intervalo.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            intervalo.tick().await;
            executar_ciclo(&estado).await;
        }
    })
}
