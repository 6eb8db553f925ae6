use std::sync::Arc;

use anyhow::Context;
use reqwest::Client;
use saude_core::CalculadorRisco;
use saude_db::Cofre;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::Config;
use crate::servicos::geocodificacao::ServicoGeocodificacao;
use crate::servicos::ia::{ClienteChatCompletions, ProvedorIa};

/// Estado compartilhado pelos handlers e pelas tarefas em segundo plano
pub struct AppState {
    pub pool: SqlitePool,
    pub cofre: Cofre,
    pub config: Config,
    pub calculador: CalculadorRisco,
    pub geocodificacao: ServicoGeocodificacao,
    pub ia: Arc<dyn ProvedorIa>,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        cofre: Cofre,
        config: Config,
        ia: Arc<dyn ProvedorIa>,
    ) -> anyhow::Result<Self> {
        let cliente_geo = Client::builder()
            .timeout(config.geo.timeout)
            .build()
            .context("Falha ao criar cliente HTTP de geocodificação")?;
        let geocodificacao = ServicoGeocodificacao::new(cliente_geo, &config.geo);

        Ok(Self {
            pool,
            cofre,
            config,
            calculador: CalculadorRisco::new(),
            geocodificacao,
            ia,
        })
    }

    /// Sem chave configurada a anamnese automática fica desligada
    pub fn ia_habilitada(&self) -> bool {
        self.config.ia.api_key.is_some()
    }
}

pub async fn build_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let (pool, cofre) = saude_db::conectar(&config.db).await?;
    info!(db_path = %config.db.db_path, "Banco de dados em uso");

    let cliente_ia = Client::builder()
        .timeout(config.ia.timeout)
        .build()
        .context("Falha ao criar cliente HTTP da IA")?;
    let ia: Arc<dyn ProvedorIa> = Arc::new(ClienteChatCompletions::new(cliente_ia, &config.ia));
    if config.ia.api_key.is_none() {
        warn!("OPENAI_API_KEY não definida; geração de anamneses desabilitada");
    }

    Ok(Arc::new(AppState::new(pool, cofre, config, ia)?))
}
