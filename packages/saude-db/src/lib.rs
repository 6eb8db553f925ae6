//! Saúde DB - Persistência do sistema de saúde pública
//!
//! Esta biblioteca fornece:
//! - Migrações automáticas do banco de dados
//! - Criptografia dos identificadores pessoais do cidadão
//! - Conversão entre linhas do SQLite e os modelos de `saude-core`
//! - Repositórios por agregado (cidadãos, coletas, anamneses, alertas, mapa,
//!   visitas, LGPD, auditoria de IA)

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use tracing::info;

pub mod crypto;
pub mod error;
pub mod migrations;
pub mod models;
pub mod repositorio;

#[cfg(any(test, feature = "test-utils"))]
pub mod testes;

pub use crypto::Cofre;
pub use error::DbError;

/// Configuração da conexão com o banco de dados
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Caminho para o arquivo SQLite
    pub db_path: String,
    /// Frase do administrador; a chave de embrulho é derivada dela com Argon2id
    pub key_phrase: String,
    /// Número máximo de conexões no pool
    pub max_connections: u32,
    /// Nível de trace do SQL (0 desliga o log de comandos)
    pub trace_level: u8,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            db_path: "data/saude.db".to_string(),
            key_phrase: "".to_string(), // deve ser definida explicitamente
            max_connections: 5,
            trace_level: 0,
        }
    }
}

/// Inicializa o pool SQLite e aplica as migrações pendentes
pub async fn init_db_pool(config: &DbConfig) -> Result<SqlitePool> {
    let db_path = Path::new(&config.db_path);

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .context("Falha ao criar diretório para banco de dados")?;
        }
    }

    let mut connection_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .pragma("synchronous", "NORMAL");
    if config.trace_level == 0 {
        connection_options = connection_options.disable_statement_logging();
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connection_options)
        .await
        .context("Falha ao conectar ao banco de dados SQLite")?;

    migrations::run_migrations(&pool)
        .await
        .context("Falha ao aplicar migrações")?;

    info!("Banco de dados inicializado com sucesso: {}", config.db_path);
    Ok(pool)
}

/// Pool pronto e cofre aberto com a chave mestra
pub async fn conectar(config: &DbConfig) -> Result<(SqlitePool, Cofre)> {
    let pool = init_db_pool(config).await?;
    let cofre = crypto::abrir_cofre(&pool, &config.key_phrase)
        .await
        .context("Falha ao abrir a chave mestra")?;
    Ok((pool, cofre))
}
