//! Definições de erro para as regras de domínio

use thiserror::Error;

/// Erros de validação de dados informados pelo usuário
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErroValidacao {
    #[error("CPF inválido: {0}")]
    CpfInvalido(String),

    #[error("Telefone inválido: {0}")]
    TelefoneInvalido(String),

    #[error("CEP inválido: {0}")]
    CepInvalido(String),

    #[error("Pressão arterial inválida: {0}")]
    PressaoInvalida(String),

    #[error("Data de nascimento inválida: {0}")]
    DataNascimentoInvalida(String),

    #[error("Valor desconhecido para {campo}: {valor}")]
    ValorDesconhecido { campo: &'static str, valor: String },

    #[error("Transição de status não permitida: {de} -> {para}")]
    TransicaoInvalida { de: String, para: String },

    #[error("Campo obrigatório ausente: {0}")]
    CampoAusente(&'static str),
}
