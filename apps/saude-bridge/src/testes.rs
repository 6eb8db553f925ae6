//! Estado da aplicação sobre um banco temporário, para os testes

use std::sync::Arc;

use saude_db::testes::{banco_temporario, BancoTemporario};

use crate::config::Config;
use crate::servicos::ia::ProvedorIa;
use crate::state::AppState;

/// Mantém o banco vivo enquanto o estado estiver em uso
pub struct AmbienteTeste {
    pub estado: Arc<AppState>,
    _banco: BancoTemporario,
}

/// `geo_url` aponta ViaCEP e Nominatim para um servidor simulado; sem ele as
/// chamadas vão para uma porta fechada e falham.
pub async fn ambiente_de_teste(
    ia: Arc<dyn ProvedorIa>,
    geo_url: Option<&str>,
) -> anyhow::Result<AmbienteTeste> {
    let banco = banco_temporario().await?;
    let geo = geo_url.unwrap_or("http://127.0.0.1:9").to_string();
    let config = Config::from_lookup(|chave| match chave {
        "SAUDE_MASTER_KEY" => Some("frase-de-teste".to_string()),
        "OPENAI_API_KEY" => Some("sk-teste".to_string()),
        "SAUDE_LGPD_SALT" => Some("sal-de-teste".to_string()),
        "SAUDE_VIACEP_URL" | "SAUDE_NOMINATIM_URL" => Some(geo.clone()),
        "SAUDE_GEO_PAUSA_MS" => Some("0".to_string()),
        "SAUDE_RETENTATIVA_BASE_SECS" => Some("0".to_string()),
        "SAUDE_MAX_TENTATIVAS" => Some("2".to_string()),
        _ => None,
    })?;

    let estado = AppState::new(banco.pool.clone(), banco.cofre.clone(), config, ia)?;
    Ok(AmbienteTeste {
        estado: Arc::new(estado),
        _banco: banco,
    })
}
