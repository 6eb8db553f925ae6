//! Serviços com I/O: chamadas HTTP externas e fluxos que combinam vários
//! repositórios.

use chrono::{DateTime, Utc};
use saude_core::clinico::AlertaClinico;
use saude_core::lgpd::Finalidade;
use saude_core::modelos::AlertaSaude;
use saude_core::ErroValidacao;
use saude_db::DbError;
use thiserror::Error;
use uuid::Uuid;

pub mod anamnese;
pub mod coleta;
pub mod geocodificacao;
pub mod ia;
pub mod lgpd;
pub mod risco;

use geocodificacao::ErroGeocodificacao;
use ia::ErroIa;

#[derive(Error, Debug)]
pub enum ErroServico {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Geocodificacao(#[from] ErroGeocodificacao),

    #[error(transparent)]
    Ia(#[from] ErroIa),

    #[error(transparent)]
    Validacao(#[from] ErroValidacao),

    #[error("Cidadão sem consentimento ativo para {0}")]
    SemConsentimento(Finalidade),

    #[error("Erro de serialização: {0}")]
    Serializacao(#[from] serde_json::Error),
}

impl ErroServico {
    /// Falhas que podem desaparecer numa nova tentativa
    pub fn transitorio(&self) -> bool {
        match self {
            ErroServico::Geocodificacao(erro) => erro.transitorio(),
            ErroServico::Ia(erro) => erro.transitorio(),
            ErroServico::Db(DbError::ConnectionError(_)) => true,
            _ => false,
        }
    }
}

/// Converte um alerta clínico no registro persistido
pub fn alerta_saude(
    clinico: AlertaClinico,
    cidadao_id: Uuid,
    anamnese_id: Option<Uuid>,
    dados_saude_id: Option<Uuid>,
    agora: DateTime<Utc>,
) -> AlertaSaude {
    AlertaSaude {
        id: Uuid::new_v4(),
        cidadao_id,
        anamnese_id,
        dados_saude_id,
        tipo: clinico.tipo,
        prioridade: clinico.prioridade,
        titulo: clinico.titulo,
        descricao: clinico.descricao,
        acao_recomendada: clinico.acao_recomendada,
        prazo_acao: Some(agora + clinico.prazo),
        visualizado: false,
        resolvido: false,
        resolvido_por: None,
        data_resolucao: None,
        criado_em: agora,
    }
}
