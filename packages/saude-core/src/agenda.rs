//! Agenda de visitas domiciliares dos agentes de saúde

use chrono::{DateTime, Duration, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::modelos::enum_textual;

/// Antecedência máxima de um agendamento
pub const ANTECEDENCIA_MAXIMA_DIAS: i64 = 180;
/// Janela em que duas visitas ao mesmo cidadão conflitam
pub const JANELA_CONFLITO_MINUTOS: i64 = 30;
/// Horário de atendimento, em horas locais [início, fim)
pub const HORARIO_ATENDIMENTO: (u32, u32) = (8, 17);

/// Diferença do horário de Brasília para UTC
const DESLOCAMENTO_BRASILIA_HORAS: i64 = -3;

/// Data e hora no horário de Brasília
pub fn horario_local(data: DateTime<Utc>) -> NaiveDateTime {
    (data + Duration::hours(DESLOCAMENTO_BRASILIA_HORAS)).naive_utc()
}

enum_textual! {
    MotivoVisita, "motivo" {
        RetornoExame => "retorno_exame",
        AvaliacaoSintomas => "avaliacao_sintomas",
        AcompanhamentoComorbidades => "acompanhamento_comorbidades",
        PrimeiraVisita => "primeira_visita",
        RevisaoAnamnese => "revisao_anamnese",
        Medicacao => "medicacao",
        Preventiva => "preventiva",
        Emergencia => "emergencia",
        Outros => "outros",
    }
}

impl MotivoVisita {
    pub fn rotulo(&self) -> &'static str {
        match self {
            MotivoVisita::RetornoExame => "Retorno de Exame",
            MotivoVisita::AvaliacaoSintomas => "Avaliação de Sintomas",
            MotivoVisita::AcompanhamentoComorbidades => "Acompanhamento de Comorbidades",
            MotivoVisita::PrimeiraVisita => "Primeira Visita",
            MotivoVisita::RevisaoAnamnese => "Revisão de Anamnese",
            MotivoVisita::Medicacao => "Controle de Medicação",
            MotivoVisita::Preventiva => "Consulta Preventiva",
            MotivoVisita::Emergencia => "Situação de Emergência",
            MotivoVisita::Outros => "Outros",
        }
    }
}

enum_textual! {
    StatusVisita, "status_visita" {
        Agendada => "agendada",
        Confirmada => "confirmada",
        Realizada => "realizada",
        Cancelada => "cancelada",
        Reagendada => "reagendada",
    }
}

impl StatusVisita {
    /// Agendada ou confirmada
    pub fn em_aberto(&self) -> bool {
        matches!(self, StatusVisita::Agendada | StatusVisita::Confirmada)
    }

    pub fn cor(&self) -> &'static str {
        match self {
            StatusVisita::Agendada => "#ffc107",
            StatusVisita::Confirmada => "#28a745",
            StatusVisita::Realizada => "#6c757d",
            StatusVisita::Cancelada => "#dc3545",
            StatusVisita::Reagendada => "#fd7e14",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErroAgenda {
    #[error("Não é possível agendar visitas no passado")]
    DataNoPassado,

    #[error("Não é possível agendar visitas com mais de 180 dias de antecedência")]
    AntecedenciaExcessiva,

    #[error("Visitas devem ser agendadas entre 08:00 e 17:00")]
    ForaDoHorario,

    #[error("Já existe uma visita agendada para este cidadão próximo a este horário")]
    Conflito,

    #[error("Visita com status '{0}' não pode ser alterada")]
    NaoEditavel(StatusVisita),

    #[error("Somente visitas futuras em aberto podem ser canceladas")]
    NaoCancelavel,
}

/// Visita agendada
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitaAgendada {
    pub id: Uuid,
    pub cidadao_id: Uuid,
    /// Identificador do agente responsável
    pub agente: String,
    pub data_visita: DateTime<Utc>,
    pub motivo: MotivoVisita,
    pub observacoes: String,
    pub status: StatusVisita,
    pub data_realizacao: Option<DateTime<Utc>>,
    pub duracao_minutos: Option<u32>,
    pub relatorio_visita: String,
    pub notificacao_enviada: bool,
    pub lembrete_agente: bool,
    pub criado_em: DateTime<Utc>,
    pub atualizado_em: DateTime<Utc>,
}

/// Valida a data de uma nova visita (ou de um reagendamento)
pub fn validar_data_visita(data: DateTime<Utc>, agora: DateTime<Utc>) -> Result<(), ErroAgenda> {
    if data < agora {
        return Err(ErroAgenda::DataNoPassado);
    }
    if data > agora + Duration::days(ANTECEDENCIA_MAXIMA_DIAS) {
        return Err(ErroAgenda::AntecedenciaExcessiva);
    }
    let hora = horario_local(data).hour();
    if hora < HORARIO_ATENDIMENTO.0 || hora >= HORARIO_ATENDIMENTO.1 {
        return Err(ErroAgenda::ForaDoHorario);
    }
    Ok(())
}

/// Verifica conflito com outras visitas em aberto do mesmo cidadão
pub fn verificar_conflito<'a>(
    data: DateTime<Utc>,
    existentes: impl IntoIterator<Item = &'a VisitaAgendada>,
    ignorar: Option<Uuid>,
) -> Result<(), ErroAgenda> {
    let janela = Duration::minutes(JANELA_CONFLITO_MINUTOS);
    let conflita = existentes.into_iter().any(|v| {
        Some(v.id) != ignorar
            && v.status.em_aberto()
            && v.data_visita >= data - janela
            && v.data_visita <= data + janela
    });
    if conflita {
        Err(ErroAgenda::Conflito)
    } else {
        Ok(())
    }
}

impl VisitaAgendada {
    pub fn agendar(
        cidadao_id: Uuid,
        agente: String,
        data_visita: DateTime<Utc>,
        motivo: MotivoVisita,
        observacoes: String,
        agora: DateTime<Utc>,
    ) -> Result<Self, ErroAgenda> {
        validar_data_visita(data_visita, agora)?;
        Ok(Self {
            id: Uuid::new_v4(),
            cidadao_id,
            agente,
            data_visita,
            motivo,
            observacoes,
            status: StatusVisita::Agendada,
            data_realizacao: None,
            duracao_minutos: None,
            relatorio_visita: String::new(),
            notificacao_enviada: false,
            lembrete_agente: true,
            criado_em: agora,
            atualizado_em: agora,
        })
    }

    pub fn eh_hoje(&self, agora: DateTime<Utc>) -> bool {
        horario_local(self.data_visita).date() == horario_local(agora).date()
    }

    pub fn eh_atrasada(&self, agora: DateTime<Utc>) -> bool {
        self.data_visita < agora && self.status.em_aberto()
    }

    pub fn pode_ser_editada(&self) -> bool {
        self.status.em_aberto()
    }

    pub fn pode_ser_cancelada(&self, agora: DateTime<Utc>) -> bool {
        self.status.em_aberto() && self.data_visita > agora
    }

    pub fn cor_status(&self) -> &'static str {
        self.status.cor()
    }

    fn exigir_editavel(&self) -> Result<(), ErroAgenda> {
        if self.pode_ser_editada() {
            Ok(())
        } else {
            Err(ErroAgenda::NaoEditavel(self.status))
        }
    }

    pub fn confirmar(&mut self, agora: DateTime<Utc>) -> Result<(), ErroAgenda> {
        self.exigir_editavel()?;
        self.status = StatusVisita::Confirmada;
        self.atualizado_em = agora;
        Ok(())
    }

    pub fn registrar_realizacao(
        &mut self,
        duracao_minutos: Option<u32>,
        relatorio: String,
        agora: DateTime<Utc>,
    ) -> Result<(), ErroAgenda> {
        self.exigir_editavel()?;
        self.status = StatusVisita::Realizada;
        self.data_realizacao = Some(agora);
        self.duracao_minutos = duracao_minutos;
        self.relatorio_visita = relatorio;
        self.atualizado_em = agora;
        Ok(())
    }

    pub fn cancelar(&mut self, motivo: Option<&str>, agora: DateTime<Utc>) -> Result<(), ErroAgenda> {
        if !self.pode_ser_cancelada(agora) {
            return Err(ErroAgenda::NaoCancelavel);
        }
        self.status = StatusVisita::Cancelada;
        if let Some(motivo) = motivo.filter(|m| !m.trim().is_empty()) {
            if !self.observacoes.is_empty() {
                self.observacoes.push('\n');
            }
            self.observacoes.push_str("Cancelamento: ");
            self.observacoes.push_str(motivo.trim());
        }
        self.atualizado_em = agora;
        Ok(())
    }

    /// Marca esta visita como reagendada e devolve a nova visita
    pub fn reagendar(
        &mut self,
        nova_data: DateTime<Utc>,
        agora: DateTime<Utc>,
    ) -> Result<VisitaAgendada, ErroAgenda> {
        self.exigir_editavel()?;
        let nova = VisitaAgendada::agendar(
            self.cidadao_id,
            self.agente.clone(),
            nova_data,
            self.motivo,
            self.observacoes.clone(),
            agora,
        )?;
        self.status = StatusVisita::Reagendada;
        self.atualizado_em = agora;
        Ok(nova)
    }
}
