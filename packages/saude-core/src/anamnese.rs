//! Anamnese assistida por IA: contexto anonimizado, prompt e interpretação
//!
//! Este módulo não faz chamadas HTTP. Ele prepara o que é enviado ao modelo
//! de linguagem e transforma a resposta em campos da anamnese, tolerando
//! respostas fora do formato pedido.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clinico::{self, AlertaClinico};
use crate::lgpd::{faixa_etaria, regiao_cep};
use crate::modelos::{calcular_idade, Anamnese, Cidadao, DadosSaude, NivelRisco};
use crate::normalizador::{extrair_sintomas, remover_acentos};
use crate::risco::ResultadoRisco;

pub const MODELO_PADRAO: &str = "gpt-3.5-turbo";
pub const MAX_TOKENS: u32 = 1500;
pub const TEMPERATURA: f32 = 0.3;

/// Quantidade de anamneses anteriores incluídas no contexto
pub const ANAMNESES_NO_HISTORICO: usize = 3;

/// Tamanho do resumo usado quando a resposta não é JSON
const LIMITE_RESUMO_FALLBACK: usize = 200;

const RECOMENDACAO_FALLBACK: &str = "Avaliação médica recomendada";
const NAO_INFORMADO: &str = "Não informado";

/// Preço por 1K tokens em dólares
const PRECOS_POR_MIL_TOKENS: &[(&str, f64)] = &[
    ("gpt-3.5-turbo", 0.002),
    ("gpt-4", 0.03),
    ("gpt-4-turbo", 0.01),
];

const PROMPT_SISTEMA: &str = "Você apoia equipes de atenção primária do SUS na triagem de \
pacientes atendidos em visitas domiciliares. Com base exclusivamente nos dados anonimizados \
recebidos, produza uma anamnese estruturada em português do Brasil. Não invente dados que \
não foram informados. Classifique o risco em exatamente um dos valores: baixo, medio, alto, \
critico. Responda apenas com um objeto JSON, sem texto adicional.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinaisVitaisContexto {
    pub pressao_arterial: String,
    pub frequencia_cardiaca: u32,
    pub temperatura: f64,
    pub peso: f64,
    pub altura: f64,
    pub imc: Option<f64>,
    pub classificacao_imc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitosContexto {
    pub fumante: bool,
    pub etilista: bool,
    pub atividade_fisica: String,
    pub horas_sono: u32,
    pub alimentacao_balanceada: bool,
    pub consumo_agua_litros: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnamneseAnterior {
    pub data: String,
    pub triagem_risco: NivelRisco,
    pub resumo: String,
    pub principais_hipoteses: Vec<String>,
}

/// Dados enviados à IA. Não contém nome, CPF, telefone, e-mail nem endereço.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextoAnonimizado {
    pub faixa_etaria: String,
    pub idade: u32,
    pub sexo: String,
    pub regiao_cep: String,
    pub cidade: String,
    pub estado: String,
    pub condicoes_cronicas: Vec<String>,
    pub medicamentos_continuo: String,
    pub alergias_conhecidas: String,
    pub sinais_vitais: SinaisVitaisContexto,
    pub sintomas_principais: String,
    pub sintomas_identificados: Vec<String>,
    pub nivel_dor: u8,
    pub duracao_sintomas: String,
    pub historico_doencas: String,
    pub medicamentos_uso: String,
    pub alergias: String,
    pub habitos: HabitosContexto,
    pub alertas_clinicos: Vec<String>,
    pub risco_calculado: NivelRisco,
    pub pontuacao_risco: f64,
    pub anamneses_anteriores: Vec<AnamneseAnterior>,
}

fn truncar(texto: &str, limite: usize) -> String {
    if texto.chars().count() > limite {
        let mut curto: String = texto.chars().take(limite).collect();
        curto.push_str("...");
        curto
    } else {
        texto.to_string()
    }
}

impl ContextoAnonimizado {
    /// `anteriores` deve vir da mais recente para a mais antiga
    pub fn montar(
        cidadao: &Cidadao,
        dados: &DadosSaude,
        anteriores: &[Anamnese],
        risco: &ResultadoRisco,
        hoje: NaiveDate,
    ) -> Self {
        let idade = calcular_idade(cidadao.data_nascimento, hoje);
        let alertas_clinicos = clinico::avaliar_coleta(dados)
            .into_iter()
            .map(|achado| AlertaClinico::from(achado).descricao)
            .collect();

        Self {
            faixa_etaria: faixa_etaria(idade).to_string(),
            idade,
            sexo: cidadao.sexo.rotulo().to_string(),
            regiao_cep: regiao_cep(&cidadao.cep),
            cidade: cidadao.cidade.clone(),
            estado: cidadao.estado.clone(),
            condicoes_cronicas: cidadao
                .condicoes
                .rotulos()
                .into_iter()
                .map(String::from)
                .collect(),
            medicamentos_continuo: cidadao.medicamentos_continuo.clone(),
            alergias_conhecidas: cidadao.alergias_conhecidas.clone(),
            sinais_vitais: SinaisVitaisContexto {
                pressao_arterial: dados.pressao_arterial(),
                frequencia_cardiaca: dados.frequencia_cardiaca,
                temperatura: dados.temperatura,
                peso: dados.peso,
                altura: dados.altura,
                imc: dados.imc(),
                classificacao_imc: dados.classificacao_imc().map(String::from),
            },
            sintomas_principais: dados.sintomas_principais.clone(),
            sintomas_identificados: extrair_sintomas(&dados.sintomas_principais)
                .into_iter()
                .map(String::from)
                .collect(),
            nivel_dor: dados.nivel_dor,
            duracao_sintomas: dados.duracao_sintomas.clone(),
            historico_doencas: dados.historico_doencas.clone(),
            medicamentos_uso: dados.medicamentos_uso.clone(),
            alergias: dados.alergias.clone(),
            habitos: HabitosContexto {
                fumante: dados.fumante,
                etilista: dados.etilista,
                atividade_fisica: dados.nivel_atividade_fisica.to_string(),
                horas_sono: dados.horas_sono,
                alimentacao_balanceada: dados.alimentacao_balanceada,
                consumo_agua_litros: dados.consumo_agua_litros,
            },
            alertas_clinicos,
            risco_calculado: risco.nivel,
            pontuacao_risco: (risco.pontuacao * 10.0).round() / 10.0,
            anamneses_anteriores: anteriores
                .iter()
                .take(ANAMNESES_NO_HISTORICO)
                .map(|a| AnamneseAnterior {
                    data: a.criado_em.format("%d/%m/%Y").to_string(),
                    triagem_risco: a.triagem_risco,
                    resumo: truncar(a.resumo_vigente(), 200),
                    principais_hipoteses: a.hipoteses_diagnosticas.iter().take(2).cloned().collect(),
                })
                .collect(),
        }
    }
}

pub fn prompt_sistema() -> &'static str {
    PROMPT_SISTEMA
}

/// Mensagem do usuário com os dados e o formato de resposta esperado
pub fn montar_prompt(contexto: &ContextoAnonimizado) -> String {
    let dados = serde_json::to_string_pretty(contexto).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Dados do paciente (anonimizados):\n{dados}\n\n\
         Responda com um JSON contendo as chaves:\n\
         - \"resumo_anamnese\": texto corrido com a história clínica\n\
         - \"diagnostico_clinico\": impressão clínica principal\n\
         - \"hipoteses_diagnosticas\": lista de hipóteses, da mais provável para a menos provável\n\
         - \"diagnostico_diferencial\": lista de diagnósticos a descartar\n\
         - \"triagem_risco\": baixo, medio, alto ou critico\n\
         - \"recomendacoes\": condutas para a equipe de saúde\n\
         - \"exames_complementares\": lista de exames sugeridos\n\
         - \"sinais_alerta\": lista de sinais que exigem retorno imediato"
    )
}

/// Campos da anamnese extraídos da resposta do modelo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespostaAnamnese {
    pub resumo_anamnese: String,
    pub diagnostico_clinico: String,
    pub hipoteses_diagnosticas: Vec<String>,
    pub diagnostico_diferencial: Vec<String>,
    pub triagem_risco: NivelRisco,
    pub recomendacoes: String,
    pub exames_complementares: Vec<String>,
    pub sinais_alerta: Vec<String>,
    /// `false` quando a resposta não era JSON e o texto livre foi aproveitado
    pub estruturada: bool,
}

/// Interpreta o nível de risco ignorando caixa, acentos e espaços
pub fn interpretar_nivel(valor: &str) -> Option<NivelRisco> {
    remover_acentos(valor.trim())
        .to_lowercase()
        .parse::<NivelRisco>()
        .ok()
}

/// Recorta o objeto JSON da resposta, com ou sem bloco de código markdown
fn extrair_json(texto: &str) -> Option<&str> {
    let inicio = texto.find('{')?;
    let fim = texto.rfind('}')?;
    (fim > inicio).then(|| &texto[inicio..=fim])
}

fn item_texto(item: &Value) -> Option<String> {
    match item {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Object(mapa) => ["diagnostico", "hipotese", "nome", "exame", "descricao"]
            .iter()
            .find_map(|chave| mapa.get(*chave).and_then(Value::as_str))
            .map(|s| s.trim().to_string()),
        Value::Null => None,
        outro => Some(outro.to_string()),
    }
}

/// Aceita lista ou texto separado por vírgulas/quebras de linha. Itens com
/// até um caractere são descartados.
fn lista_flexivel(valor: Option<&Value>) -> Vec<String> {
    let itens: Vec<String> = match valor {
        Some(Value::Array(lista)) => lista.iter().filter_map(item_texto).collect(),
        Some(Value::String(texto)) => texto
            .split(|c: char| c == ',' || c == '\n')
            .map(|parte| {
                parte
                    .trim()
                    .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•')
                    .trim()
                    .to_string()
            })
            .collect(),
        _ => Vec::new(),
    };
    itens.into_iter().filter(|item| item.chars().count() > 1).collect()
}

fn texto_flexivel(valor: Option<&Value>) -> Option<String> {
    match valor? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Array(lista) => Some(
            lista
                .iter()
                .filter_map(item_texto)
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        Value::Null => None,
        outro => Some(outro.to_string()),
    }
}

impl RespostaAnamnese {
    fn fallback(texto: &str) -> Self {
        Self {
            resumo_anamnese: truncar(texto.trim(), LIMITE_RESUMO_FALLBACK),
            diagnostico_clinico: String::new(),
            hipoteses_diagnosticas: Vec::new(),
            diagnostico_diferencial: Vec::new(),
            triagem_risco: NivelRisco::Medio,
            recomendacoes: RECOMENDACAO_FALLBACK.to_string(),
            exames_complementares: Vec::new(),
            sinais_alerta: Vec::new(),
            estruturada: false,
        }
    }

    /// Nunca falha: respostas fora do formato viram o fallback com risco médio
    pub fn interpretar(texto: &str) -> Self {
        let objeto = extrair_json(texto)
            .and_then(|json| serde_json::from_str::<Value>(json).ok())
            .and_then(|valor| match valor {
                Value::Object(mapa) => Some(mapa),
                _ => None,
            });
        let Some(mapa) = objeto else {
            return Self::fallback(texto);
        };

        let triagem_risco = mapa
            .get("triagem_risco")
            .and_then(Value::as_str)
            .and_then(interpretar_nivel)
            .unwrap_or(NivelRisco::Medio);

        let exames = match mapa.get("exames_complementares") {
            Some(valor) => lista_flexivel(Some(valor)),
            None => lista_flexivel(mapa.get("exames_sugeridos")),
        };

        Self {
            resumo_anamnese: texto_flexivel(mapa.get("resumo_anamnese"))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| NAO_INFORMADO.to_string()),
            diagnostico_clinico: texto_flexivel(mapa.get("diagnostico_clinico")).unwrap_or_default(),
            hipoteses_diagnosticas: lista_flexivel(mapa.get("hipoteses_diagnosticas")),
            diagnostico_diferencial: lista_flexivel(mapa.get("diagnostico_diferencial")),
            triagem_risco,
            recomendacoes: texto_flexivel(mapa.get("recomendacoes"))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| NAO_INFORMADO.to_string()),
            exames_complementares: exames,
            sinais_alerta: lista_flexivel(mapa.get("sinais_alerta")),
            estruturada: true,
        }
    }

    /// Heurística de confiança entre 0,5 e 0,95
    pub fn confianca(&self) -> f64 {
        let mut confianca: f64 = 0.5;
        if !self.hipoteses_diagnosticas.is_empty() {
            confianca += 0.2;
        }
        if self.recomendacoes.chars().count() > 50 {
            confianca += 0.1;
        }
        if !self.exames_complementares.is_empty() {
            confianca += 0.1;
        }
        confianca.min(0.95)
    }
}

/// Custo estimado em dólares; modelos desconhecidos usam o preço do padrão
pub fn estimar_custo(tokens: u32, modelo: &str) -> f64 {
    let preco = PRECOS_POR_MIL_TOKENS
        .iter()
        .find(|(nome, _)| *nome == modelo)
        .or_else(|| PRECOS_POR_MIL_TOKENS.iter().find(|(nome, _)| *nome == MODELO_PADRAO))
        .map(|(_, preco)| *preco)
        .unwrap_or(0.0);
    f64::from(tokens) * preco / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resposta_json_completa() {
        let texto = r#"{
            "resumo_anamnese": "Paciente com cefaleia há 3 dias.",
            "diagnostico_clinico": "Cefaleia tensional",
            "hipoteses_diagnosticas": ["Cefaleia tensional", "Enxaqueca", "-"],
            "diagnostico_diferencial": "Sinusite, Hipertensão",
            "triagem_risco": "Médio",
            "recomendacoes": "Analgesia simples e retorno se piora.",
            "exames_complementares": [{"exame": "Hemograma"}]
        }"#;
        let resposta = RespostaAnamnese::interpretar(texto);
        assert!(resposta.estruturada);
        assert_eq!(resposta.triagem_risco, NivelRisco::Medio);
        assert_eq!(resposta.hipoteses_diagnosticas, vec!["Cefaleia tensional", "Enxaqueca"]);
        assert_eq!(resposta.diagnostico_diferencial, vec!["Sinusite", "Hipertensão"]);
        assert_eq!(resposta.exames_complementares, vec!["Hemograma"]);
    }

    #[test]
    fn test_resposta_em_bloco_markdown() {
        let texto = "Segue a anamnese:\n```json\n{\"resumo_anamnese\": \"Dispneia aos esforços\", \
                     \"hipoteses_diagnosticas\": [], \"triagem_risco\": \"CRÍTICO\", \
                     \"recomendacoes\": \"Encaminhar\"}\n```";
        let resposta = RespostaAnamnese::interpretar(texto);
        assert!(resposta.estruturada);
        assert_eq!(resposta.triagem_risco, NivelRisco::Critico);
        assert_eq!(resposta.resumo_anamnese, "Dispneia aos esforços");
    }

    #[test]
    fn test_nivel_desconhecido_vira_medio() {
        let texto = r#"{"resumo_anamnese": "x", "hipoteses_diagnosticas": [],
                        "triagem_risco": "grave", "recomendacoes": "y"}"#;
        assert_eq!(RespostaAnamnese::interpretar(texto).triagem_risco, NivelRisco::Medio);
    }

    #[test]
    fn test_texto_livre_usa_fallback() {
        let texto = "a".repeat(300);
        let resposta = RespostaAnamnese::interpretar(&texto);
        assert!(!resposta.estruturada);
        assert_eq!(resposta.triagem_risco, NivelRisco::Medio);
        assert_eq!(resposta.resumo_anamnese.chars().count(), 203);
        assert_eq!(resposta.recomendacoes, "Avaliação médica recomendada");
    }

    #[test]
    fn test_campos_obrigatorios_ausentes() {
        let resposta = RespostaAnamnese::interpretar(r#"{"triagem_risco": "alto"}"#);
        assert!(resposta.estruturada);
        assert_eq!(resposta.triagem_risco, NivelRisco::Alto);
        assert_eq!(resposta.resumo_anamnese, "Não informado");
        assert!(resposta.hipoteses_diagnosticas.is_empty());
    }

    #[test]
    fn test_confianca() {
        let mut resposta = RespostaAnamnese::fallback("texto");
        assert_eq!(resposta.confianca(), 0.5);
        resposta.hipoteses_diagnosticas = vec!["Gripe".to_string()];
        resposta.recomendacoes = "r".repeat(60);
        resposta.exames_complementares = vec!["Hemograma".to_string()];
        assert!((resposta.confianca() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_custo() {
        assert!((estimar_custo(1000, "gpt-4") - 0.03).abs() < 1e-12);
        assert!((estimar_custo(1000, "modelo-local") - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_contexto_sem_identificadores() {
        use crate::modelos::{CondicoesCronicas, EstadoCivil, NivelAtividade, Sexo};
        use crate::risco::{CalculadorRisco, EntradaRisco};
        use chrono::Utc;
        use uuid::Uuid;

        let agora = Utc::now();
        let hoje = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let cidadao = Cidadao {
            id: Uuid::new_v4(),
            nome: "Josefa Aparecida Lima".to_string(),
            cpf: "529.982.247-25".to_string(),
            data_nascimento: NaiveDate::from_ymd_opt(1950, 1, 20).unwrap(),
            sexo: Sexo::Feminino,
            estado_civil: EstadoCivil::Viuvo,
            telefone: "(85) 98888-7777".to_string(),
            email: Some("josefa@exemplo.com".to_string()),
            endereco: "Rua do Sol, 45".to_string(),
            cep: "60150-160".to_string(),
            bairro: "Aldeota".to_string(),
            cidade: "Fortaleza".to_string(),
            estado: "CE".to_string(),
            latitude: None,
            longitude: None,
            endereco_capturado_automaticamente: false,
            profissao: "Aposentada".to_string(),
            renda_familiar: None,
            possui_plano_saude: false,
            condicoes: CondicoesCronicas {
                hipertensao: true,
                ..Default::default()
            },
            medicamentos_continuo: "Losartana".to_string(),
            alergias_conhecidas: String::new(),
            cirurgias_anteriores: String::new(),
            criado_em: agora,
            atualizado_em: agora,
            ativo: true,
        };
        let dados = DadosSaude {
            id: Uuid::new_v4(),
            cidadao_id: cidadao.id,
            agente_coleta: None,
            pressao_sistolica: 165,
            pressao_diastolica: 95,
            frequencia_cardiaca: 88,
            temperatura: 36.7,
            peso: 68.0,
            altura: 1.58,
            sintomas_principais: "tontura e dor de cabeça".to_string(),
            nivel_dor: 5,
            duracao_sintomas: "2 dias".to_string(),
            historico_doencas: String::new(),
            medicamentos_uso: "Losartana 50mg".to_string(),
            alergias: String::new(),
            fumante: false,
            etilista: false,
            nivel_atividade_fisica: NivelAtividade::Leve,
            horas_sono: 7,
            alimentacao_balanceada: true,
            consumo_agua_litros: 1.5,
            dados_extras: None,
            criado_em: agora,
            sincronizado: false,
        };
        let entrada = EntradaRisco::a_partir_de(&cidadao, Some(&dados), None, hoje);
        let risco = CalculadorRisco::new().calcular(&entrada);

        let contexto = ContextoAnonimizado::montar(&cidadao, &dados, &[], &risco, hoje);
        assert_eq!(contexto.faixa_etaria, "65_mais");
        assert_eq!(contexto.regiao_cep, "60100-000");
        assert_eq!(contexto.sintomas_identificados, vec!["dor de cabeça", "tontura"]);

        let prompt = montar_prompt(&contexto);
        for identificador in ["Josefa", "529.982.247-25", "98888", "josefa@", "Rua do Sol"] {
            assert!(!prompt.contains(identificador), "{identificador} vazou no prompt");
        }
        assert!(prompt.contains("triagem_risco"));
    }

    #[test]
    fn test_interpretar_nivel() {
        assert_eq!(interpretar_nivel(" Alto "), Some(NivelRisco::Alto));
        assert_eq!(interpretar_nivel("crítico"), Some(NivelRisco::Critico));
        assert_eq!(interpretar_nivel("urgente"), None);
    }
}
