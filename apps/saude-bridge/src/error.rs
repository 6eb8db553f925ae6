use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use saude_core::agenda::ErroAgenda;
use saude_core::ErroValidacao;
use saude_db::DbError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::servicos::ErroServico;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Db(#[from] DbError),
    #[error("{0}")]
    Validacao(#[from] ErroValidacao),
    #[error("{0}")]
    Agenda(#[from] ErroAgenda),
    #[error("Dados inválidos: {0}")]
    Campos(#[from] validator::ValidationErrors),
    #[error("{0}")]
    NaoEncontrado(String),
    #[error("{0}")]
    RequisicaoInvalida(String),
    #[error("{0}")]
    Conflito(String),
    #[error("{0}")]
    SemConsentimento(String),
    #[error("Serviço externo indisponível: {0}")]
    ServicoExterno(String),
    #[error("Erro interno: {0}")]
    Interno(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct CorpoErro {
    erro: String,
    codigo: u16,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Db(DbError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Db(DbError::ConstraintViolation(_)) => StatusCode::CONFLICT,
            ApiError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Validacao(ErroValidacao::TransicaoInvalida { .. }) => StatusCode::CONFLICT,
            ApiError::Validacao(_) => StatusCode::BAD_REQUEST,
            ApiError::Agenda(ErroAgenda::Conflito) => StatusCode::CONFLICT,
            ApiError::Agenda(_) => StatusCode::BAD_REQUEST,
            ApiError::Campos(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NaoEncontrado(_) => StatusCode::NOT_FOUND,
            ApiError::RequisicaoInvalida(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflito(_) => StatusCode::CONFLICT,
            ApiError::SemConsentimento(_) => StatusCode::FORBIDDEN,
            ApiError::ServicoExterno(_) => StatusCode::BAD_GATEWAY,
            ApiError::Interno(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Erro ao atender requisição");
        }
        let body = Json(CorpoErro {
            erro: self.to_string(),
            codigo: status.as_u16(),
        });
        (status, body).into_response()
    }
}

impl From<ErroServico> for ApiError {
    fn from(erro: ErroServico) -> Self {
        match erro {
            ErroServico::Db(e) => ApiError::Db(e),
            ErroServico::Validacao(e) => ApiError::Validacao(e),
            ErroServico::SemConsentimento(finalidade) => ApiError::SemConsentimento(format!(
                "Cidadão sem consentimento ativo para {}",
                finalidade.descricao().to_lowercase()
            )),
            ErroServico::Geocodificacao(e) => ApiError::ServicoExterno(e.to_string()),
            ErroServico::Ia(e) => ApiError::ServicoExterno(e.to_string()),
            ErroServico::Serializacao(e) => ApiError::Interno(e.into()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
