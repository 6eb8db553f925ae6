//! Conformidade com a LGPD
//!
//! Mascaramento de identificadores, pseudônimos, regras de consentimento,
//! trilha de auditoria de acesso e registro de violações. Tudo aqui é
//! transformação pura; a persistência fica em `saude-db`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::modelos::{calcular_idade, enum_textual, Cidadao, DadosSaude, NivelRisco, Sexo};

/// Validade de um consentimento
pub const VALIDADE_CONSENTIMENTO_DIAS: i64 = 365;

/// Prazo para notificar a ANPD após a detecção de uma violação grave
pub const PRAZO_NOTIFICACAO_ANPD_HORAS: i64 = 72;

/// Bytes aleatórios do token de consentimento
const BYTES_TOKEN: usize = 32;

enum_textual! {
    /// Finalidade de tratamento consentida pelo cidadão
    Finalidade, "finalidade" {
        AtendimentoMedico => "ATENDIMENTO_MEDICO",
        PesquisaCientifica => "PESQUISA_CIENTIFICA",
        EstatisticasPublicas => "ESTATISTICAS_PUBLICAS",
        InteligenciaArtificial => "INTELIGENCIA_ARTIFICIAL",
        ComunicacaoEmergencia => "COMUNICACAO_EMERGENCIA",
    }
}

impl Finalidade {
    pub fn descricao(&self) -> &'static str {
        match self {
            Finalidade::AtendimentoMedico => "Atendimento médico e cuidados de saúde",
            Finalidade::PesquisaCientifica => "Pesquisa científica em saúde pública",
            Finalidade::EstatisticasPublicas => "Estatísticas e análises de saúde pública",
            Finalidade::InteligenciaArtificial => "Processamento por IA para diagnóstico",
            Finalidade::ComunicacaoEmergencia => "Comunicação em casos de emergência",
        }
    }
}

enum_textual! {
    TipoAcao, "tipo_acao" {
        AcessoDados => "ACESSO_DADOS",
        ModificacaoDados => "MODIFICACAO_DADOS",
        ExclusaoDados => "EXCLUSAO_DADOS",
        AnonimizacaoDados => "ANONIMIZACAO_DADOS",
        ExportacaoDados => "EXPORTACAO_DADOS",
        ConsentimentoDado => "CONSENTIMENTO_DADO",
        ConsentimentoRevogado => "CONSENTIMENTO_REVOGADO",
        ViolacaoDados => "VIOLACAO_DADOS",
    }
}

enum_textual! {
    TipoViolacao, "tipo_violacao" {
        AcessoNaoAutorizado => "ACESSO_NAO_AUTORIZADO",
        VazamentoDados => "VAZAMENTO_DADOS",
        PerdaDados => "PERDA_DADOS",
        AlteracaoNaoAutorizada => "ALTERACAO_NAO_AUTORIZADA",
        TentativaInvasao => "TENTATIVA_INVASAO",
        UsoIndevido => "USO_INDEVIDO",
    }
}

enum_textual! {
    Severidade, "severidade" {
        Baixa => "BAIXA",
        Media => "MEDIA",
        Alta => "ALTA",
        Critica => "CRITICA",
    }
}

// Mascaramento

/// `***.***.***-NN`
pub fn mascarar_cpf(cpf: &str) -> String {
    if cpf.is_empty() {
        return String::new();
    }
    let digitos: String = cpf.chars().filter(char::is_ascii_digit).collect();
    if digitos.len() != 11 {
        return "***.***.***-**".to_string();
    }
    format!("***.***.***-{}", &digitos[9..])
}

/// Apenas as iniciais: "João Silva" vira "J. S."
pub fn mascarar_nome(nome: &str) -> String {
    nome.split_whitespace()
        .filter_map(|palavra| palavra.chars().next())
        .map(|inicial| format!("{}.", inicial.to_uppercase()))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn mascarar_email(email: &str) -> String {
    match email.split_once('@') {
        Some((usuario, dominio)) => match usuario.chars().next() {
            Some(primeira) => format!("{primeira}***@{dominio}"),
            None => format!("***@{dominio}"),
        },
        None => "***@***.***".to_string(),
    }
}

/// Mantém DDD e os quatro últimos dígitos
pub fn mascarar_telefone(telefone: &str) -> String {
    if telefone.is_empty() {
        return String::new();
    }
    let digitos: String = telefone.chars().filter(char::is_ascii_digit).collect();
    if digitos.len() < 10 {
        return "(**) ****-****".to_string();
    }
    format!("({}) ****-{}", &digitos[..2], &digitos[digitos.len() - 4..])
}

/// Troca cada sequência de dígitos por `***`
pub fn mascarar_endereco(endereco: &str) -> String {
    let mut saida = String::with_capacity(endereco.len());
    let mut em_numero = false;
    for c in endereco.chars() {
        if c.is_ascii_digit() {
            if !em_numero {
                saida.push_str("***");
            }
            em_numero = true;
        } else {
            em_numero = false;
            saida.push(c);
        }
    }
    saida
}

/// SHA-256 de valor + sal, truncado em 16 caracteres hexadecimais
pub fn hash_anonimo(valor: &str, sal: &str) -> String {
    if valor.is_empty() {
        return String::new();
    }
    let mut hasher = Sha256::new();
    hasher.update(valor.as_bytes());
    hasher.update(sal.as_bytes());
    let mut hash = hex::encode(hasher.finalize());
    hash.truncate(16);
    hash
}

/// Faixa etária usada nos dados anonimizados e no contexto da IA
pub fn faixa_etaria(idade: u32) -> &'static str {
    match idade {
        0..=17 => "menor_18",
        18..=29 => "18_29",
        30..=49 => "30_49",
        50..=64 => "50_64",
        _ => "65_mais",
    }
}

/// Mantém só os três primeiros dígitos do CEP: `XXX00-000`
pub fn regiao_cep(cep: &str) -> String {
    let prefixo: String = cep.chars().filter(char::is_ascii_digit).take(3).collect();
    format!("{prefixo}00-000")
}

// Pseudônimos

const NOMES_MASCULINOS: &[&str] = &[
    "Alberto", "Bruno", "Carlos", "Daniel", "Eduardo", "Fernando", "Gabriel", "Henrique", "Igor",
    "João", "Lucas", "Marcos", "Nicolas", "Pedro", "Rafael", "Sérgio", "Thiago", "Vinícius",
];

const NOMES_FEMININOS: &[&str] = &[
    "Ana", "Beatriz", "Carla", "Daniela", "Elena", "Fernanda", "Gabriela", "Helena", "Isabela",
    "Juliana", "Larissa", "Mariana", "Natália", "Paula", "Rafaela", "Sofia", "Tatiana", "Vanessa",
];

const SOBRENOMES: &[&str] = &[
    "Silva", "Santos", "Oliveira", "Souza", "Rodrigues", "Ferreira", "Alves", "Pereira", "Lima",
    "Gomes", "Costa", "Ribeiro", "Martins", "Carvalho", "Barbosa", "Rocha", "Dias", "Monteiro",
];

const DDDS: &[&str] = &["11", "21", "31", "41", "51", "61", "71", "81", "85"];

pub fn nome_pseudonimo<R: Rng + ?Sized>(sexo: Sexo, rng: &mut R) -> String {
    let nomes = match sexo {
        Sexo::Feminino => NOMES_FEMININOS,
        _ => NOMES_MASCULINOS,
    };
    let nome = nomes.choose(rng).copied().unwrap_or("Cidadão");
    let sobrenome = SOBRENOMES.choose(rng).copied().unwrap_or("Anônimo");
    format!("{nome} {sobrenome}")
}

/// CPF com formato válido e dígitos aleatórios (não passa na verificação)
pub fn cpf_pseudonimo<R: Rng + ?Sized>(rng: &mut R) -> String {
    let d: String = (0..11).map(|_| char::from(b'0' + rng.gen_range(0..10))).collect();
    format!("{}.{}.{}-{}", &d[..3], &d[3..6], &d[6..9], &d[9..])
}

pub fn telefone_pseudonimo<R: Rng + ?Sized>(rng: &mut R) -> String {
    let ddd = DDDS.choose(rng).copied().unwrap_or("11");
    let n: String = (0..8).map(|_| char::from(b'0' + rng.gen_range(0..10))).collect();
    format!("({ddd}) 9{}-{}", &n[..4], &n[4..])
}

// Consentimento

/// Token aleatório seguro para URL
pub fn gerar_token_consentimento() -> String {
    let mut bytes = [0u8; BYTES_TOKEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Consentimento de um cidadão para uma finalidade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consentimento {
    pub id: Uuid,
    pub cidadao_id: Uuid,
    pub finalidade: Finalidade,
    pub consentido: bool,
    pub token_consentimento: String,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub data_consentimento: DateTime<Utc>,
    pub valido_ate: DateTime<Utc>,
    pub data_revogacao: Option<DateTime<Utc>>,
}

impl Consentimento {
    pub fn conceder(
        cidadao_id: Uuid,
        finalidade: Finalidade,
        agora: DateTime<Utc>,
        ip_address: Option<String>,
        user_agent: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            cidadao_id,
            finalidade,
            consentido: true,
            token_consentimento: gerar_token_consentimento(),
            ip_address,
            user_agent,
            data_consentimento: agora,
            valido_ate: agora + Duration::days(VALIDADE_CONSENTIMENTO_DIAS),
            data_revogacao: None,
        }
    }

    /// Consentido, não revogado e dentro da validade
    pub fn ativo(&self, agora: DateTime<Utc>) -> bool {
        self.consentido && self.data_revogacao.is_none() && agora < self.valido_ate
    }

    pub fn revogar(&mut self, agora: DateTime<Utc>) {
        self.consentido = false;
        self.data_revogacao = Some(agora);
    }

    /// Renova uma concessão existente, mantendo o mesmo registro
    pub fn renovar(&mut self, agora: DateTime<Utc>) {
        self.consentido = true;
        self.data_revogacao = None;
        self.data_consentimento = agora;
        self.valido_ate = agora + Duration::days(VALIDADE_CONSENTIMENTO_DIAS);
        self.token_consentimento = gerar_token_consentimento();
    }
}

/// Entrada da trilha de auditoria de acesso a dados pessoais
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditoriaAcesso {
    pub id: Uuid,
    /// Identificador livre de quem acessou; "sistema" para tarefas internas
    pub usuario: String,
    pub cidadao_id: Uuid,
    pub tipo_acao: TipoAcao,
    pub detalhes: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub url_acessada: String,
    pub timestamp: DateTime<Utc>,
}

/// Violação ou incidente de segurança
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolacaoDados {
    pub id: Uuid,
    pub tipo_violacao: TipoViolacao,
    pub severidade: Severidade,
    pub descricao: String,
    pub cidadaos_afetados: Vec<Uuid>,
    pub tipos_dados_afetados: Vec<String>,
    pub data_deteccao: DateTime<Utc>,
    pub data_ocorrencia_estimada: Option<DateTime<Utc>>,
    pub detectado_por: Option<String>,
    pub acoes_corretivas: String,
    pub anpd_notificada: bool,
    pub data_notificacao_anpd: Option<DateTime<Utc>>,
    pub cidadaos_notificados: bool,
    pub data_notificacao_cidadaos: Option<DateTime<Utc>>,
    pub resolvida: bool,
    pub data_resolucao: Option<DateTime<Utc>>,
}

impl ViolacaoDados {
    /// Alta ou crítica, ANPD ainda não notificada e dentro de 72 horas
    pub fn deve_notificar_anpd(&self, agora: DateTime<Utc>) -> bool {
        matches!(self.severidade, Severidade::Alta | Severidade::Critica)
            && !self.anpd_notificada
            && agora < self.data_deteccao + Duration::hours(PRAZO_NOTIFICACAO_ANPD_HORAS)
    }

    /// Horas restantes para a notificação; `None` fora do prazo
    pub fn horas_restantes_anpd(&self, agora: DateTime<Utc>) -> Option<i64> {
        self.deve_notificar_anpd(agora).then(|| {
            (self.data_deteccao + Duration::hours(PRAZO_NOTIFICACAO_ANPD_HORAS) - agora)
                .num_hours()
        })
    }
}

/// Registro estatístico sem identificação direta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DadosAnonimizados {
    pub id: Uuid,
    pub hash_cidadao: String,
    pub faixa_etaria: String,
    pub sexo: Sexo,
    /// Apenas cidade e UF
    pub regiao_residencia: String,
    pub tem_doenca_cronica: bool,
    pub categoria_imc: String,
    pub nivel_risco_geral: Option<NivelRisco>,
    pub data_anonimizacao: DateTime<Utc>,
    pub finalidade: String,
}

impl DadosAnonimizados {
    pub fn gerar(
        cidadao: &Cidadao,
        ultimos_dados: Option<&DadosSaude>,
        nivel_risco: Option<NivelRisco>,
        finalidade: &str,
        sal: &str,
        agora: DateTime<Utc>,
    ) -> Self {
        let hoje: NaiveDate = agora.date_naive();
        Self {
            id: Uuid::new_v4(),
            hash_cidadao: hash_anonimo(&cidadao.id.to_string(), sal),
            faixa_etaria: faixa_etaria(calcular_idade(cidadao.data_nascimento, hoje)).to_string(),
            sexo: cidadao.sexo,
            regiao_residencia: format!("{}/{}", cidadao.cidade, cidadao.estado),
            tem_doenca_cronica: cidadao.condicoes.alguma(),
            categoria_imc: ultimos_dados
                .and_then(DadosSaude::classificacao_imc)
                .unwrap_or_default()
                .to_string(),
            nivel_risco_geral: nivel_risco,
            data_anonimizacao: agora,
            finalidade: finalidade.to_string(),
        }
    }
}
