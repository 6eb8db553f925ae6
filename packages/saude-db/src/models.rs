//! Conversão entre linhas do SQLite e os modelos de domínio
//!
//! UUIDs e enums são gravados como TEXT, listas e documentos livres como
//! JSON em TEXT. Os identificadores pessoais do cidadão chegam cifrados em
//! `CidadaoCifrado` e só são abertos com o `Cofre`.

use std::str::FromStr;

use chrono::NaiveDate;
use saude_core::agenda::VisitaAgendada;
use saude_core::lgpd::{AuditoriaAcesso, Consentimento, DadosAnonimizados, ViolacaoDados};
use saude_core::modelos::{
    AlertaSaude, Anamnese, Cidadao, CondicoesCronicas, DadosSaude, LocalizacaoSaude,
    RegistroAuditoriaIa,
};
use saude_core::ErroValidacao;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use crate::crypto::{Cofre, EncryptedData};
use crate::error::DbError;

pub(crate) fn uuid(row: &SqliteRow, coluna: &str) -> Result<Uuid, DbError> {
    let texto: String = row.try_get(coluna)?;
    Uuid::parse_str(&texto).map_err(|e| DbError::QueryError(format!("UUID inválido em {}: {}", coluna, e)))
}

pub(crate) fn uuid_opcional(row: &SqliteRow, coluna: &str) -> Result<Option<Uuid>, DbError> {
    let texto: Option<String> = row.try_get(coluna)?;
    texto
        .map(|t| Uuid::parse_str(&t))
        .transpose()
        .map_err(|e| DbError::QueryError(format!("UUID inválido em {}: {}", coluna, e)))
}

pub(crate) fn enumerado<T>(row: &SqliteRow, coluna: &str) -> Result<T, DbError>
where
    T: FromStr<Err = ErroValidacao>,
{
    let texto: String = row.try_get(coluna)?;
    Ok(texto.parse()?)
}

pub(crate) fn json<T: DeserializeOwned>(row: &SqliteRow, coluna: &str) -> Result<T, DbError> {
    let texto: String = row.try_get(coluna)?;
    Ok(serde_json::from_str(&texto)?)
}

/// Inteiro não negativo gravado como INTEGER
pub(crate) fn natural(row: &SqliteRow, coluna: &str) -> Result<u32, DbError> {
    let valor: i64 = row.try_get(coluna)?;
    u32::try_from(valor).map_err(|_| DbError::QueryError(format!("Valor fora da faixa em {}: {}", coluna, valor)))
}

fn cifrado(row: &SqliteRow, prefixo: &str) -> Result<EncryptedData, DbError> {
    Ok(EncryptedData {
        ciphertext: row.try_get(format!("{}_ciphertext", prefixo).as_str())?,
        nonce: row.try_get(format!("{}_nonce", prefixo).as_str())?,
    })
}

fn cifrado_opcional(row: &SqliteRow, prefixo: &str) -> Result<Option<EncryptedData>, DbError> {
    let ciphertext: Option<Vec<u8>> = row.try_get(format!("{}_ciphertext", prefixo).as_str())?;
    let nonce: Option<Vec<u8>> = row.try_get(format!("{}_nonce", prefixo).as_str())?;
    Ok(ciphertext.zip(nonce).map(|(ciphertext, nonce)| EncryptedData { ciphertext, nonce }))
}

/// Cidadão como está no banco, com CPF, telefone, e-mail e endereço cifrados
#[derive(Debug, Clone)]
pub struct CidadaoCifrado {
    pub cpf: EncryptedData,
    pub telefone: EncryptedData,
    pub email: Option<EncryptedData>,
    pub endereco: EncryptedData,
    /// Demais campos, com os identificadores ainda vazios
    pub base: Cidadao,
}

impl FromRow<'_, SqliteRow> for CidadaoCifrado {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        cidadao_cifrado(row).map_err(|e| sqlx::Error::Decode(Box::new(e)))
    }
}

fn cidadao_cifrado(row: &SqliteRow) -> Result<CidadaoCifrado, DbError> {
    let base = Cidadao {
        id: uuid(row, "id")?,
        nome: row.try_get("nome")?,
        cpf: String::new(),
        data_nascimento: row.try_get("data_nascimento")?,
        sexo: enumerado(row, "sexo")?,
        estado_civil: enumerado(row, "estado_civil")?,
        telefone: String::new(),
        email: None,
        endereco: String::new(),
        cep: row.try_get("cep")?,
        bairro: row.try_get("bairro")?,
        cidade: row.try_get("cidade")?,
        estado: row.try_get("estado")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        endereco_capturado_automaticamente: row.try_get("endereco_capturado_automaticamente")?,
        profissao: row.try_get("profissao")?,
        renda_familiar: row.try_get("renda_familiar")?,
        possui_plano_saude: row.try_get("possui_plano_saude")?,
        condicoes: CondicoesCronicas {
            hipertensao: row.try_get("hipertensao")?,
            diabetes: row.try_get("diabetes")?,
            doenca_cardiaca: row.try_get("doenca_cardiaca")?,
            doenca_renal: row.try_get("doenca_renal")?,
            asma: row.try_get("asma")?,
            depressao: row.try_get("depressao")?,
        },
        medicamentos_continuo: row.try_get("medicamentos_continuo")?,
        alergias_conhecidas: row.try_get("alergias_conhecidas")?,
        cirurgias_anteriores: row.try_get("cirurgias_anteriores")?,
        criado_em: row.try_get("criado_em")?,
        atualizado_em: row.try_get("atualizado_em")?,
        ativo: row.try_get("ativo")?,
    };

    Ok(CidadaoCifrado {
        cpf: cifrado(row, "cpf")?,
        telefone: cifrado(row, "telefone")?,
        email: cifrado_opcional(row, "email")?,
        endereco: cifrado(row, "endereco")?,
        base,
    })
}

impl CidadaoCifrado {
    pub fn decifrar(self, cofre: &Cofre) -> Result<Cidadao, DbError> {
        let mut cidadao = self.base;
        cidadao.cpf = cofre.decifrar(&self.cpf)?;
        cidadao.telefone = cofre.decifrar(&self.telefone)?;
        cidadao.email = self.email.as_ref().map(|e| cofre.decifrar(e)).transpose()?;
        cidadao.endereco = cofre.decifrar(&self.endereco)?;
        Ok(cidadao)
    }
}

/// Resumo de cidadão para listagens, sem identificadores pessoais
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumoCidadao {
    pub id: Uuid,
    pub nome: String,
    pub data_nascimento: NaiveDate,
    pub cidade: String,
    pub estado: String,
    pub tem_localizacao: bool,
    pub ativo: bool,
}

impl FromRow<'_, SqliteRow> for ResumoCidadao {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let id: String = row.try_get("id")?;
        let latitude: Option<f64> = row.try_get("latitude")?;
        Ok(Self {
            id: Uuid::parse_str(&id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            nome: row.try_get("nome")?,
            data_nascimento: row.try_get("data_nascimento")?,
            cidade: row.try_get("cidade")?,
            estado: row.try_get("estado")?,
            tem_localizacao: latitude.is_some(),
            ativo: row.try_get("ativo")?,
        })
    }
}

pub(crate) fn dados_saude(row: &SqliteRow) -> Result<DadosSaude, DbError> {
    let dados_extras: Option<String> = row.try_get("dados_extras")?;
    let nivel_dor: i64 = row.try_get("nivel_dor")?;
    Ok(DadosSaude {
        id: uuid(row, "id")?,
        cidadao_id: uuid(row, "cidadao_id")?,
        agente_coleta: row.try_get("agente_coleta")?,
        pressao_sistolica: natural(row, "pressao_sistolica")?,
        pressao_diastolica: natural(row, "pressao_diastolica")?,
        frequencia_cardiaca: natural(row, "frequencia_cardiaca")?,
        temperatura: row.try_get("temperatura")?,
        peso: row.try_get("peso")?,
        altura: row.try_get("altura")?,
        sintomas_principais: row.try_get("sintomas_principais")?,
        nivel_dor: u8::try_from(nivel_dor)
            .map_err(|_| DbError::QueryError(format!("nivel_dor fora da faixa: {}", nivel_dor)))?,
        duracao_sintomas: row.try_get("duracao_sintomas")?,
        historico_doencas: row.try_get("historico_doencas")?,
        medicamentos_uso: row.try_get("medicamentos_uso")?,
        alergias: row.try_get("alergias")?,
        fumante: row.try_get("fumante")?,
        etilista: row.try_get("etilista")?,
        nivel_atividade_fisica: enumerado(row, "nivel_atividade_fisica")?,
        horas_sono: natural(row, "horas_sono")?,
        alimentacao_balanceada: row.try_get("alimentacao_balanceada")?,
        consumo_agua_litros: row.try_get("consumo_agua_litros")?,
        dados_extras: dados_extras.map(|t| serde_json::from_str(&t)).transpose()?,
        criado_em: row.try_get("criado_em")?,
        sincronizado: row.try_get("sincronizado")?,
    })
}

pub(crate) fn anamnese(row: &SqliteRow) -> Result<Anamnese, DbError> {
    Ok(Anamnese {
        id: uuid(row, "id")?,
        cidadao_id: uuid(row, "cidadao_id")?,
        dados_saude_id: uuid(row, "dados_saude_id")?,
        resumo_anamnese: row.try_get("resumo_anamnese")?,
        diagnostico_clinico: row.try_get("diagnostico_clinico")?,
        hipoteses_diagnosticas: json(row, "hipoteses_diagnosticas")?,
        diagnostico_diferencial: json(row, "diagnostico_diferencial")?,
        triagem_risco: enumerado(row, "triagem_risco")?,
        recomendacoes: row.try_get("recomendacoes")?,
        exames_complementares: json(row, "exames_complementares")?,
        modelo_ia: row.try_get("modelo_ia")?,
        confianca_ia: row.try_get("confianca_ia")?,
        dados_entrada_ia: json(row, "dados_entrada_ia")?,
        resposta_completa_ia: json(row, "resposta_completa_ia")?,
        status: enumerado(row, "status")?,
        revisado_por: row.try_get("revisado_por")?,
        data_revisao: row.try_get("data_revisao")?,
        comentarios_revisao: row.try_get("comentarios_revisao")?,
        resumo_final: row.try_get("resumo_final")?,
        diagnostico_final: row.try_get("diagnostico_final")?,
        recomendacoes_finais: row.try_get("recomendacoes_finais")?,
        criado_em: row.try_get("criado_em")?,
    })
}

pub(crate) fn alerta(row: &SqliteRow) -> Result<AlertaSaude, DbError> {
    Ok(AlertaSaude {
        id: uuid(row, "id")?,
        cidadao_id: uuid(row, "cidadao_id")?,
        anamnese_id: uuid_opcional(row, "anamnese_id")?,
        dados_saude_id: uuid_opcional(row, "dados_saude_id")?,
        tipo: enumerado(row, "tipo")?,
        prioridade: enumerado(row, "prioridade")?,
        titulo: row.try_get("titulo")?,
        descricao: row.try_get("descricao")?,
        acao_recomendada: row.try_get("acao_recomendada")?,
        prazo_acao: row.try_get("prazo_acao")?,
        visualizado: row.try_get("visualizado")?,
        resolvido: row.try_get("resolvido")?,
        resolvido_por: row.try_get("resolvido_por")?,
        data_resolucao: row.try_get("data_resolucao")?,
        criado_em: row.try_get("criado_em")?,
    })
}

pub(crate) fn localizacao(row: &SqliteRow) -> Result<LocalizacaoSaude, DbError> {
    Ok(LocalizacaoSaude {
        id: uuid(row, "id")?,
        cidadao_id: uuid(row, "cidadao_id")?,
        dados_saude_id: uuid_opcional(row, "dados_saude_id")?,
        anamnese_id: uuid_opcional(row, "anamnese_id")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        endereco_completo: row.try_get("endereco_completo")?,
        bairro: row.try_get("bairro")?,
        cidade: row.try_get("cidade")?,
        estado: row.try_get("estado")?,
        cep: row.try_get("cep")?,
        nivel_risco: enumerado(row, "nivel_risco")?,
        pontuacao_risco: row.try_get("pontuacao_risco")?,
        criado_em: row.try_get("criado_em")?,
        atualizado_em: row.try_get("atualizado_em")?,
        ativo: row.try_get("ativo")?,
    })
}

pub(crate) fn registro_ia(row: &SqliteRow) -> Result<RegistroAuditoriaIa, DbError> {
    Ok(RegistroAuditoriaIa {
        id: uuid(row, "id")?,
        tipo_operacao: enumerado(row, "tipo_operacao")?,
        cidadao_id: uuid_opcional(row, "cidadao_id")?,
        anamnese_id: uuid_opcional(row, "anamnese_id")?,
        modelo_ia: row.try_get("modelo_ia")?,
        prompt_enviado: row.try_get("prompt_enviado")?,
        dados_entrada: json(row, "dados_entrada")?,
        resposta_ia: json(row, "resposta_ia")?,
        tempo_processamento_ms: row.try_get("tempo_processamento_ms")?,
        sucesso: row.try_get("sucesso")?,
        erro_detalhes: row.try_get("erro_detalhes")?,
        tokens_utilizados: row.try_get("tokens_utilizados")?,
        custo_estimado: row.try_get("custo_estimado")?,
        dados_anonimizados: row.try_get("dados_anonimizados")?,
        criado_em: row.try_get("criado_em")?,
    })
}

pub(crate) fn visita(row: &SqliteRow) -> Result<VisitaAgendada, DbError> {
    let duracao: Option<i64> = row.try_get("duracao_minutos")?;
    Ok(VisitaAgendada {
        id: uuid(row, "id")?,
        cidadao_id: uuid(row, "cidadao_id")?,
        agente: row.try_get("agente")?,
        data_visita: row.try_get("data_visita")?,
        motivo: enumerado(row, "motivo")?,
        observacoes: row.try_get("observacoes")?,
        status: enumerado(row, "status")?,
        data_realizacao: row.try_get("data_realizacao")?,
        duracao_minutos: duracao.and_then(|d| u32::try_from(d).ok()),
        relatorio_visita: row.try_get("relatorio_visita")?,
        notificacao_enviada: row.try_get("notificacao_enviada")?,
        lembrete_agente: row.try_get("lembrete_agente")?,
        criado_em: row.try_get("criado_em")?,
        atualizado_em: row.try_get("atualizado_em")?,
    })
}

pub(crate) fn consentimento(row: &SqliteRow) -> Result<Consentimento, DbError> {
    Ok(Consentimento {
        id: uuid(row, "id")?,
        cidadao_id: uuid(row, "cidadao_id")?,
        finalidade: enumerado(row, "finalidade")?,
        consentido: row.try_get("consentido")?,
        token_consentimento: row.try_get("token_consentimento")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        data_consentimento: row.try_get("data_consentimento")?,
        valido_ate: row.try_get("valido_ate")?,
        data_revogacao: row.try_get("data_revogacao")?,
    })
}

pub(crate) fn auditoria_acesso(row: &SqliteRow) -> Result<AuditoriaAcesso, DbError> {
    Ok(AuditoriaAcesso {
        id: uuid(row, "id")?,
        usuario: row.try_get("usuario")?,
        cidadao_id: uuid(row, "cidadao_id")?,
        tipo_acao: enumerado(row, "tipo_acao")?,
        detalhes: json(row, "detalhes")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        url_acessada: row.try_get("url_acessada")?,
        timestamp: row.try_get("timestamp")?,
    })
}

pub(crate) fn violacao(row: &SqliteRow) -> Result<ViolacaoDados, DbError> {
    Ok(ViolacaoDados {
        id: uuid(row, "id")?,
        tipo_violacao: enumerado(row, "tipo_violacao")?,
        severidade: enumerado(row, "severidade")?,
        descricao: row.try_get("descricao")?,
        cidadaos_afetados: json(row, "cidadaos_afetados")?,
        tipos_dados_afetados: json(row, "tipos_dados_afetados")?,
        data_deteccao: row.try_get("data_deteccao")?,
        data_ocorrencia_estimada: row.try_get("data_ocorrencia_estimada")?,
        detectado_por: row.try_get("detectado_por")?,
        acoes_corretivas: row.try_get("acoes_corretivas")?,
        anpd_notificada: row.try_get("anpd_notificada")?,
        data_notificacao_anpd: row.try_get("data_notificacao_anpd")?,
        cidadaos_notificados: row.try_get("cidadaos_notificados")?,
        data_notificacao_cidadaos: row.try_get("data_notificacao_cidadaos")?,
        resolvida: row.try_get("resolvida")?,
        data_resolucao: row.try_get("data_resolucao")?,
    })
}

pub(crate) fn anonimizado(row: &SqliteRow) -> Result<DadosAnonimizados, DbError> {
    let nivel: Option<String> = row.try_get("nivel_risco_geral")?;
    Ok(DadosAnonimizados {
        id: uuid(row, "id")?,
        hash_cidadao: row.try_get("hash_cidadao")?,
        faixa_etaria: row.try_get("faixa_etaria")?,
        sexo: enumerado(row, "sexo")?,
        regiao_residencia: row.try_get("regiao_residencia")?,
        tem_doenca_cronica: row.try_get("tem_doenca_cronica")?,
        categoria_imc: row.try_get("categoria_imc")?,
        nivel_risco_geral: nivel.map(|n| n.parse()).transpose()?,
        data_anonimizacao: row.try_get("data_anonimizacao")?,
        finalidade: row.try_get("finalidade")?,
    })
}
