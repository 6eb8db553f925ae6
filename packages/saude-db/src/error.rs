//! Definições de erro para a biblioteca saude-db
//!
//! Este módulo define os tipos de erro usados pela camada de persistência

use saude_core::ErroValidacao;
use thiserror::Error;

use crate::crypto::CryptoError;

/// Erros específicos para operações de banco de dados
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Erro de conexão com banco de dados: {0}")]
    ConnectionError(String),

    #[error("Erro de migração: {0}")]
    MigrationError(String),

    #[error("Erro de consulta: {0}")]
    QueryError(String),

    #[error("Entidade não encontrada: {0}")]
    NotFound(String),

    #[error("Violação de restrição: {0}")]
    ConstraintViolation(String),

    #[error("Erro de criptografia: {0}")]
    CryptoError(#[from] CryptoError),

    /// Valor gravado que não corresponde a nenhuma variante conhecida
    #[error("Valor armazenado inválido: {0}")]
    DecodeError(#[from] ErroValidacao),

    #[error("Erro interno: {0}")]
    InternalError(String),
}

impl DbError {
    pub fn nao_encontrado(entidade: &str, id: impl std::fmt::Display) -> Self {
        DbError::NotFound(format!("{} {}", entidade, id))
    }
}

/// Conversão de erros específicos do SQLx para nossos tipos de erro
impl From<sqlx::Error> for DbError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => DbError::NotFound("Registro não encontrado".to_string()),
            sqlx::Error::Database(dbe) => {
                // 2067 = SQLITE_CONSTRAINT_UNIQUE, 787 = SQLITE_CONSTRAINT_FOREIGNKEY
                if let Some(code) = dbe.code() {
                    if matches!(code.as_ref(), "2067" | "1555" | "787" | "19") {
                        return DbError::ConstraintViolation(dbe.message().to_string());
                    }
                }
                DbError::QueryError(dbe.message().to_string())
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::QueryError(format!("Coluna não encontrada: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::QueryError(format!("Erro ao decodificar coluna {}: {}", index, source))
            }
            sqlx::Error::Io(io_err) => DbError::ConnectionError(io_err.to_string()),
            sqlx::Error::Configuration(conf_err) => DbError::ConnectionError(conf_err.to_string()),
            sqlx::Error::PoolClosed => {
                DbError::ConnectionError("Pool de conexões fechado".to_string())
            }
            sqlx::Error::PoolTimedOut => {
                DbError::ConnectionError("Timeout no pool de conexões".to_string())
            }
            sqlx::Error::WorkerCrashed => {
                DbError::InternalError("Worker do banco de dados falhou".to_string())
            }
            _ => DbError::InternalError(format!("Erro inesperado: {:?}", error)),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(error: serde_json::Error) -> Self {
        DbError::QueryError(format!("JSON armazenado inválido: {}", error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_vira_not_found() {
        let erro: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(erro, DbError::NotFound(_)));
    }

    #[test]
    fn test_valor_desconhecido_vira_decode() {
        let erro: DbError = "roxo".parse::<saude_core::NivelRisco>().unwrap_err().into();
        assert!(matches!(erro, DbError::DecodeError(_)));
        assert!(erro.to_string().contains("roxo"));
    }
}
