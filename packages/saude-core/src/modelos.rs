//! Modelos de dados compartilhados
//!
//! Este módulo define os registros principais do sistema de saúde pública
//! (cidadão, dados de saúde, anamnese, alertas, localização) e suas
//! propriedades derivadas, como idade e IMC.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Gera um enum persistido como texto, com `as_str`, `Display` e `FromStr`.
macro_rules! enum_textual {
    (
        $(#[$meta:meta])*
        $nome:ident, $campo:literal {
            $($(#[$vmeta:meta])* $var:ident => $txt:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        pub enum $nome {
            $($(#[$vmeta])* #[serde(rename = $txt)] $var),+
        }

        impl $nome {
            /// Todas as variantes, na ordem de declaração
            pub const TODOS: &'static [$nome] = &[$($nome::$var),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($nome::$var => $txt),+
                }
            }
        }

        impl std::fmt::Display for $nome {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $nome {
            type Err = $crate::erro::ErroValidacao;

            fn from_str(valor: &str) -> Result<Self, Self::Err> {
                match valor {
                    $($txt => Ok($nome::$var),)+
                    outro => Err($crate::erro::ErroValidacao::ValorDesconhecido {
                        campo: $campo,
                        valor: outro.to_string(),
                    }),
                }
            }
        }
    };
}

pub(crate) use enum_textual;

enum_textual! {
    /// Nível de risco da triagem, do menor para o maior
    NivelRisco, "nivel_risco" {
        Baixo => "baixo",
        Medio => "medio",
        Alto => "alto",
        Critico => "critico",
    }
}

impl NivelRisco {
    /// Pontuação equivalente usada quando o nível vem de uma anamnese revisada
    pub fn pontuacao_equivalente(&self) -> f64 {
        match self {
            NivelRisco::Baixo => 20.0,
            NivelRisco::Medio => 50.0,
            NivelRisco::Alto => 80.0,
            NivelRisco::Critico => 95.0,
        }
    }

    /// Cor do marcador no mapa de risco
    pub fn cor_marcador(&self) -> &'static str {
        match self {
            NivelRisco::Baixo => "#28a745",
            NivelRisco::Medio => "#ffc107",
            NivelRisco::Alto => "#dc3545",
            NivelRisco::Critico => "#a71d2a",
        }
    }

    pub fn rotulo(&self) -> &'static str {
        match self {
            NivelRisco::Baixo => "Risco Baixo",
            NivelRisco::Medio => "Risco Médio",
            NivelRisco::Alto => "Risco Alto",
            NivelRisco::Critico => "Risco Crítico",
        }
    }

    /// Alto ou crítico
    pub fn exige_prioridade(&self) -> bool {
        matches!(self, NivelRisco::Alto | NivelRisco::Critico)
    }
}

enum_textual! {
    Sexo, "sexo" {
        Masculino => "M",
        Feminino => "F",
        Outro => "O",
    }
}

impl Sexo {
    pub fn rotulo(&self) -> &'static str {
        match self {
            Sexo::Masculino => "Masculino",
            Sexo::Feminino => "Feminino",
            Sexo::Outro => "Outro",
        }
    }
}

enum_textual! {
    EstadoCivil, "estado_civil" {
        Solteiro => "S",
        Casado => "C",
        Divorciado => "D",
        Viuvo => "V",
        UniaoEstavel => "U",
    }
}

enum_textual! {
    /// Nível de atividade física declarado na coleta
    NivelAtividade, "nivel_atividade_fisica" {
        Sedentario => "sedentario",
        Leve => "leve",
        Moderada => "moderada",
        Intensa => "intensa",
        MuitoIntensa => "muito_intensa",
    }
}

enum_textual! {
    /// Status de revisão humana de uma anamnese
    StatusAnamnese, "status_anamnese" {
        Pendente => "pendente",
        Aprovada => "aprovada",
        Rejeitada => "rejeitada",
        Revisao => "revisao",
    }
}

impl StatusAnamnese {
    /// Aprovada e rejeitada são estados finais.
    pub fn pode_transitar_para(&self, novo: StatusAnamnese) -> bool {
        matches!(
            (self, novo),
            (StatusAnamnese::Pendente, StatusAnamnese::Aprovada)
                | (StatusAnamnese::Pendente, StatusAnamnese::Rejeitada)
                | (StatusAnamnese::Pendente, StatusAnamnese::Revisao)
                | (StatusAnamnese::Revisao, StatusAnamnese::Aprovada)
                | (StatusAnamnese::Revisao, StatusAnamnese::Rejeitada)
        )
    }
}

enum_textual! {
    TipoAlerta, "tipo_alerta" {
        RiscoAlto => "risco_alto",
        SintomaGrave => "sintoma_grave",
        Medicacao => "medicacao",
        Acompanhamento => "acompanhamento",
    }
}

enum_textual! {
    PrioridadeAlerta, "prioridade_alerta" {
        Baixa => "baixa",
        Media => "media",
        Alta => "alta",
        Urgente => "urgente",
    }
}

enum_textual! {
    /// Tipo de operação registrada no log de auditoria de IA
    TipoOperacaoIa, "tipo_operacao" {
        Anamnese => "anamnese",
        Triagem => "triagem",
        Extracao => "extracao",
        Agregacao => "agregacao",
    }
}

/// Idade em anos completos na data de referência
pub fn calcular_idade(nascimento: NaiveDate, hoje: NaiveDate) -> u32 {
    let mut idade = hoje.year() - nascimento.year();
    if (hoje.month(), hoje.day()) < (nascimento.month(), nascimento.day()) {
        idade -= 1;
    }
    idade.max(0) as u32
}

/// Condições crônicas declaradas no cadastro do cidadão
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CondicoesCronicas {
    pub hipertensao: bool,
    pub diabetes: bool,
    pub doenca_cardiaca: bool,
    pub doenca_renal: bool,
    pub asma: bool,
    /// Depressão ou ansiedade
    pub depressao: bool,
}

impl CondicoesCronicas {
    /// Rótulos das condições presentes
    pub fn rotulos(&self) -> Vec<&'static str> {
        [
            (self.hipertensao, "Hipertensão"),
            (self.diabetes, "Diabetes"),
            (self.doenca_cardiaca, "Doença Cardíaca"),
            (self.doenca_renal, "Doença Renal"),
            (self.asma, "Asma"),
            (self.depressao, "Depressão/Ansiedade"),
        ]
        .into_iter()
        .filter_map(|(presente, rotulo)| presente.then_some(rotulo))
        .collect()
    }

    pub fn alguma(&self) -> bool {
        !self.rotulos().is_empty()
    }
}

/// Cidadão cadastrado no sistema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cidadao {
    pub id: Uuid,
    pub nome: String,
    /// CPF no formato 000.000.000-00
    pub cpf: String,
    pub data_nascimento: NaiveDate,
    pub sexo: Sexo,
    pub estado_civil: EstadoCivil,
    /// Telefone no formato (00) 00000-0000
    pub telefone: String,
    pub email: Option<String>,
    pub endereco: String,
    /// CEP no formato 00000-000
    pub cep: String,
    pub bairro: String,
    pub cidade: String,
    /// UF com duas letras
    pub estado: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Endereço obtido via geolocalização automática
    pub endereco_capturado_automaticamente: bool,
    pub profissao: String,
    /// Renda familiar em reais
    pub renda_familiar: Option<f64>,
    pub possui_plano_saude: bool,
    #[serde(flatten)]
    pub condicoes: CondicoesCronicas,
    pub medicamentos_continuo: String,
    pub alergias_conhecidas: String,
    pub cirurgias_anteriores: String,
    pub criado_em: DateTime<Utc>,
    pub atualizado_em: DateTime<Utc>,
    pub ativo: bool,
}

impl Cidadao {
    pub fn idade(&self, hoje: NaiveDate) -> u32 {
        calcular_idade(self.data_nascimento, hoje)
    }

    pub fn tem_localizacao(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    pub fn coordenadas(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

/// Dados de saúde coletados por um agente
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DadosSaude {
    pub id: Uuid,
    pub cidadao_id: Uuid,
    /// Identificador do agente que realizou a coleta
    pub agente_coleta: Option<String>,
    /// mmHg
    pub pressao_sistolica: u32,
    /// mmHg
    pub pressao_diastolica: u32,
    /// bpm
    pub frequencia_cardiaca: u32,
    /// °C
    pub temperatura: f64,
    /// kg
    pub peso: f64,
    /// metros
    pub altura: f64,
    pub sintomas_principais: String,
    /// Escala de 0 a 10
    pub nivel_dor: u8,
    pub duracao_sintomas: String,
    pub historico_doencas: String,
    pub medicamentos_uso: String,
    pub alergias: String,
    pub fumante: bool,
    pub etilista: bool,
    pub nivel_atividade_fisica: NivelAtividade,
    pub horas_sono: u32,
    pub alimentacao_balanceada: bool,
    /// Litros por dia
    pub consumo_agua_litros: f64,
    pub dados_extras: Option<serde_json::Value>,
    pub criado_em: DateTime<Utc>,
    /// Marcado após o processamento assíncrono
    pub sincronizado: bool,
}

impl DadosSaude {
    /// IMC arredondado em duas casas
    pub fn imc(&self) -> Option<f64> {
        crate::clinico::calcular_imc(self.peso, self.altura).map(|imc| (imc * 100.0).round() / 100.0)
    }

    pub fn classificacao_imc(&self) -> Option<&'static str> {
        self.imc().map(crate::clinico::classificar_imc)
    }

    pub fn pressao_arterial(&self) -> String {
        format!("{}/{}", self.pressao_sistolica, self.pressao_diastolica)
    }
}

/// Anamnese gerada pela IA e sujeita à revisão humana
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anamnese {
    pub id: Uuid,
    pub cidadao_id: Uuid,
    pub dados_saude_id: Uuid,
    pub resumo_anamnese: String,
    pub diagnostico_clinico: String,
    pub hipoteses_diagnosticas: Vec<String>,
    pub diagnostico_diferencial: Vec<String>,
    pub triagem_risco: NivelRisco,
    pub recomendacoes: String,
    pub exames_complementares: Vec<String>,
    pub modelo_ia: String,
    /// 0 a 100
    pub confianca_ia: Option<f64>,
    /// Dados anonimizados enviados à IA
    pub dados_entrada_ia: serde_json::Value,
    pub resposta_completa_ia: serde_json::Value,
    pub status: StatusAnamnese,
    pub revisado_por: Option<String>,
    pub data_revisao: Option<DateTime<Utc>>,
    pub comentarios_revisao: String,
    pub resumo_final: String,
    pub diagnostico_final: String,
    pub recomendacoes_finais: String,
    pub criado_em: DateTime<Utc>,
}

impl Anamnese {
    /// Resumo após revisão, ou o gerado pela IA
    pub fn resumo_vigente(&self) -> &str {
        if self.resumo_final.is_empty() {
            &self.resumo_anamnese
        } else {
            &self.resumo_final
        }
    }

    pub fn recomendacoes_vigentes(&self) -> &str {
        if self.recomendacoes_finais.is_empty() {
            &self.recomendacoes
        } else {
            &self.recomendacoes_finais
        }
    }

    pub fn revisada(&self) -> bool {
        self.status != StatusAnamnese::Pendente
    }
}

/// Alerta de saúde derivado da triagem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertaSaude {
    pub id: Uuid,
    pub cidadao_id: Uuid,
    /// Ausente quando o alerta nasce da coleta, antes de qualquer anamnese
    pub anamnese_id: Option<Uuid>,
    pub dados_saude_id: Option<Uuid>,
    pub tipo: TipoAlerta,
    pub prioridade: PrioridadeAlerta,
    pub titulo: String,
    pub descricao: String,
    pub acao_recomendada: String,
    pub prazo_acao: Option<DateTime<Utc>>,
    pub visualizado: bool,
    pub resolvido: bool,
    pub resolvido_por: Option<String>,
    pub data_resolucao: Option<DateTime<Utc>>,
    pub criado_em: DateTime<Utc>,
}

/// Ponto do mapa de risco associado a um cidadão
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizacaoSaude {
    pub id: Uuid,
    pub cidadao_id: Uuid,
    pub dados_saude_id: Option<Uuid>,
    pub anamnese_id: Option<Uuid>,
    pub latitude: f64,
    pub longitude: f64,
    pub endereco_completo: String,
    pub bairro: String,
    pub cidade: String,
    pub estado: String,
    pub cep: String,
    pub nivel_risco: NivelRisco,
    pub pontuacao_risco: i64,
    pub criado_em: DateTime<Utc>,
    pub atualizado_em: DateTime<Utc>,
    pub ativo: bool,
}

impl LocalizacaoSaude {
    pub fn cor_marcador(&self) -> &'static str {
        self.nivel_risco.cor_marcador()
    }
}

/// Registro de auditoria de uma chamada à IA
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistroAuditoriaIa {
    pub id: Uuid,
    pub tipo_operacao: TipoOperacaoIa,
    pub cidadao_id: Option<Uuid>,
    pub anamnese_id: Option<Uuid>,
    pub modelo_ia: String,
    pub prompt_enviado: String,
    pub dados_entrada: serde_json::Value,
    pub resposta_ia: serde_json::Value,
    pub tempo_processamento_ms: i64,
    pub sucesso: bool,
    pub erro_detalhes: String,
    pub tokens_utilizados: Option<i64>,
    pub custo_estimado: Option<f64>,
    pub dados_anonimizados: bool,
    pub criado_em: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(a: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(a, m, d).unwrap()
    }

    #[test]
    fn idade_considera_aniversario() {
        let nascimento = data(1980, 6, 15);
        assert_eq!(calcular_idade(nascimento, data(2024, 6, 14)), 43);
        assert_eq!(calcular_idade(nascimento, data(2024, 6, 15)), 44);
        assert_eq!(calcular_idade(nascimento, data(2024, 12, 1)), 44);
    }

    #[test]
    fn enums_textuais_aceitam_apenas_valores_conhecidos() {
        assert_eq!("critico".parse::<NivelRisco>().unwrap(), NivelRisco::Critico);
        assert_eq!(NivelAtividade::MuitoIntensa.to_string(), "muito_intensa");
        assert!("CRITICO".parse::<NivelRisco>().is_err());
        assert_eq!(
            serde_json::to_string(&Sexo::Feminino).unwrap(),
            "\"F\""
        );
    }

    #[test]
    fn niveis_sao_ordenados_por_gravidade() {
        assert!(NivelRisco::Baixo < NivelRisco::Medio);
        assert!(NivelRisco::Alto < NivelRisco::Critico);
        assert!(NivelRisco::Alto.exige_prioridade());
        assert!(!NivelRisco::Medio.exige_prioridade());
    }

    #[test]
    fn status_final_nao_muda() {
        assert!(StatusAnamnese::Pendente.pode_transitar_para(StatusAnamnese::Aprovada));
        assert!(StatusAnamnese::Revisao.pode_transitar_para(StatusAnamnese::Rejeitada));
        assert!(!StatusAnamnese::Aprovada.pode_transitar_para(StatusAnamnese::Revisao));
        assert!(!StatusAnamnese::Rejeitada.pode_transitar_para(StatusAnamnese::Aprovada));
    }

    #[test]
    fn condicoes_listam_rotulos() {
        let condicoes = CondicoesCronicas {
            diabetes: true,
            asma: true,
            ..Default::default()
        };
        assert_eq!(condicoes.rotulos(), vec!["Diabetes", "Asma"]);
        assert!(!CondicoesCronicas::default().alguma());
    }
}
