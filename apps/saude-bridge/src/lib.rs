//! Saúde Bridge - API HTTP do sistema de saúde pública
//!
//! Cadastro de cidadãos, coleta de campo, triagem de risco, anamnese
//! assistida por IA com revisão humana, mapa de risco, agenda de visitas e
//! conformidade com a LGPD. As regras de domínio ficam em `saude-core` e a
//! persistência em `saude-db`; este crate cuida de HTTP, serviços externos e
//! tarefas em segundo plano.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod servicos;
pub mod state;
pub mod tarefas;

#[cfg(test)]
mod testes;

/// Versão, compilador e alvo registrados em tempo de build
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
