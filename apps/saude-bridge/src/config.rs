//! Configuração do serviço a partir do ambiente
//!
//! Lê o `.env` (quando existe) e as variáveis `SAUDE_*`. Tudo tem valor
//! padrão, exceto `SAUDE_MASTER_KEY`, que protege a chave de dados.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use saude_core::anamnese::MODELO_PADRAO;
use saude_db::DbConfig;

const ENDERECO_PADRAO: &str = "0.0.0.0:8080";
const VIACEP_PADRAO: &str = "https://viacep.com.br";
const NOMINATIM_PADRAO: &str = "https://nominatim.openstreetmap.org";
const IA_PADRAO: &str = "https://api.openai.com/v1";
const USER_AGENT: &str = concat!("Sistema-Saude-Publica/", env!("CARGO_PKG_VERSION"));

/// Formato das linhas de log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatoLog {
    Texto,
    Json,
}

impl FromStr for FormatoLog {
    type Err = anyhow::Error;

    fn from_str(valor: &str) -> Result<Self> {
        match valor.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(FormatoLog::Json),
            "texto" | "text" | "pretty" => Ok(FormatoLog::Texto),
            outro => Err(anyhow!("SAUDE_LOG_FORMAT desconhecido: {}", outro)),
        }
    }
}

/// Cliente do modelo de linguagem (API compatível com chat-completions)
#[derive(Debug, Clone)]
pub struct ConfigIa {
    /// Sem chave a geração de anamneses fica desabilitada
    pub api_key: Option<String>,
    pub base_url: String,
    pub modelo: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ConfigGeo {
    pub viacep_url: String,
    pub nominatim_url: String,
    /// Pausa entre tentativas no Nominatim (política de uso: 1 req/s)
    pub pausa: Duration,
    pub user_agent: String,
    pub timeout: Duration,
}

/// Tarefas em segundo plano
#[derive(Debug, Clone)]
pub struct ConfigTarefas {
    pub intervalo_recalculo: Duration,
    /// Espera antes da primeira nova tentativa; dobra a cada falha
    pub retentativa_base: Duration,
    pub max_tentativas: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub db: DbConfig,
    /// Sal dos hashes de anonimização
    pub lgpd_salt: String,
    pub ia: ConfigIa,
    pub geo: ConfigGeo,
    pub tarefas: ConfigTarefas,
    pub formato_log: FormatoLog,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
    pub max_requisicoes_simultaneas: usize,
}

fn numero<T>(lookup: &impl Fn(&str) -> Option<String>, chave: &str, padrao: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(chave).filter(|v| !v.trim().is_empty()) {
        Some(valor) => valor
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} inválido ({}): {}", chave, valor, e)),
        None => Ok(padrao),
    }
}

fn url(lookup: &impl Fn(&str) -> Option<String>, chave: &str, padrao: &str) -> String {
    lookup(chave)
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| padrao.to_string())
}

impl Config {
    /// Carrega o `.env` e lê o ambiente do processo
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|chave| std::env::var(chave).ok())
    }

    /// Monta a configuração a partir de uma função de consulta
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let listen_addr: SocketAddr = lookup("SAUDE_LISTEN_ADDR")
            .unwrap_or_else(|| ENDERECO_PADRAO.to_string())
            .parse()
            .context("SAUDE_LISTEN_ADDR inválido")?;

        let key_phrase = lookup("SAUDE_MASTER_KEY").unwrap_or_default();
        if key_phrase.trim().is_empty() {
            bail!("SAUDE_MASTER_KEY não definida; ela protege os dados pessoais cifrados");
        }

        let db = DbConfig {
            db_path: lookup("SAUDE_DB_PATH").unwrap_or_else(|| DbConfig::default().db_path),
            key_phrase,
            max_connections: numero(&lookup, "SAUDE_DB_MAX_CONNECTIONS", 5)?,
            trace_level: numero(&lookup, "SAUDE_DB_TRACE", 0)?,
        };

        let lgpd_salt = lookup("SAUDE_LGPD_SALT")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "saude-publica".to_string());

        let ia = ConfigIa {
            api_key: lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()),
            base_url: url(&lookup, "SAUDE_IA_BASE_URL", IA_PADRAO),
            modelo: lookup("SAUDE_IA_MODELO")
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| MODELO_PADRAO.to_string()),
            timeout: Duration::from_secs(numero(&lookup, "SAUDE_IA_TIMEOUT_SECS", 60)?),
        };

        let geo = ConfigGeo {
            viacep_url: url(&lookup, "SAUDE_VIACEP_URL", VIACEP_PADRAO),
            nominatim_url: url(&lookup, "SAUDE_NOMINATIM_URL", NOMINATIM_PADRAO),
            pausa: Duration::from_millis(numero(&lookup, "SAUDE_GEO_PAUSA_MS", 1000)?),
            user_agent: USER_AGENT.to_string(),
            timeout: Duration::from_secs(10),
        };

        let tarefas = ConfigTarefas {
            intervalo_recalculo: Duration::from_secs(numero(
                &lookup,
                "SAUDE_RECALCULO_INTERVALO_SECS",
                6 * 60 * 60,
            )?),
            retentativa_base: Duration::from_secs(numero(&lookup, "SAUDE_RETENTATIVA_BASE_SECS", 60)?),
            max_tentativas: numero(&lookup, "SAUDE_MAX_TENTATIVAS", 3)?,
        };

        let formato_log = match lookup("SAUDE_LOG_FORMAT") {
            Some(valor) if !valor.trim().is_empty() => valor.parse()?,
            _ => FormatoLog::Texto,
        };

        let cors_allow = lookup("SAUDE_CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            listen_addr,
            db,
            lgpd_salt,
            ia,
            geo,
            tarefas,
            formato_log,
            cors_allow,
            request_timeout: Duration::from_millis(numero(&lookup, "SAUDE_REQUEST_TIMEOUT_MS", 30_000)?),
            max_requisicoes_simultaneas: numero(&lookup, "SAUDE_MAX_REQUISICOES", 256)?,
        })
    }
}
