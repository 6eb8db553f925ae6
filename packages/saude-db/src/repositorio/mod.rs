//! Repositórios por agregado
//!
//! Funções assíncronas sobre um `SqlitePool`. Quem grava dados do cidadão
//! recebe também o `Cofre`, que cifra e decifra os identificadores pessoais.

use serde::Deserialize;

pub mod alertas;
pub mod anamneses;
pub mod auditoria_ia;
pub mod cidadaos;
pub mod dados_saude;
pub mod lgpd;
pub mod localizacoes;
pub mod visitas;

/// Maior página aceita numa listagem
pub const POR_PAGINA_MAXIMO: u32 = 200;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Paginacao {
    /// Começa em 1
    pub pagina: u32,
    pub por_pagina: u32,
}

impl Default for Paginacao {
    fn default() -> Self {
        Self {
            pagina: 1,
            por_pagina: 50,
        }
    }
}

impl Paginacao {
    pub fn limite(&self) -> i64 {
        i64::from(self.por_pagina.clamp(1, POR_PAGINA_MAXIMO))
    }

    pub fn deslocamento(&self) -> i64 {
        i64::from(self.pagina.max(1) - 1) * self.limite()
    }
}
