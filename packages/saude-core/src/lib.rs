//! Saúde Core - Regras de domínio do sistema de saúde pública
//!
//! Esta biblioteca fornece:
//! - Tipos de domínio compartilhados (cidadão, dados de saúde, anamnese)
//! - Cálculo determinístico de risco de saúde
//! - Validadores e normalização de texto médico
//! - Alertas clínicos baseados em sinais vitais
//! - Ferramentas de conformidade com a LGPD
//! - Regras de agendamento de visitas
//!
//! Nenhum módulo deste crate realiza I/O; persistência e chamadas HTTP
//! ficam em `saude-db` e `saude-bridge`.

pub mod agenda;
pub mod anamnese;
pub mod clinico;
pub mod erro;
pub mod geo;
pub mod lgpd;
pub mod modelos;
pub mod normalizador;
pub mod risco;
pub mod validadores;

pub use erro::ErroValidacao;
pub use modelos::NivelRisco;
pub use risco::{CalculadorRisco, EntradaRisco, FonteRisco, ResultadoRisco};
