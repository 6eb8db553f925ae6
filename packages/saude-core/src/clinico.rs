//! Regras clínicas aplicadas às coletas
//!
//! Classificação de IMC e pressão, alertas por sinais vitais, sintomas
//! graves e medicamentos controlados, e recomendações por nível de risco.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::modelos::{DadosSaude, NivelAtividade, NivelRisco, PrioridadeAlerta, TipoAlerta};
use crate::normalizador::{normalizar_texto, remover_acentos};

/// Prazo padrão para a ação recomendada de um alerta
pub const PRAZO_ACAO_HORAS: i64 = 24;

/// Medicamentos que exigem monitoramento (sem acentos)
pub const MEDICAMENTOS_CONTROLADOS: &[&str] = &[
    "warfarina",
    "insulina",
    "digoxina",
    "litio",
    "fenitoina",
    "carbamazepina",
    "amiodarona",
];

/// Sintomas graves e o nível de gravidade associado
const SINTOMAS_GRAVES: &[(&str, NivelRisco)] = &[
    ("dor no peito", NivelRisco::Alto),
    ("falta de ar severa", NivelRisco::Alto),
    ("perda de consciencia", NivelRisco::Alto),
    ("sangramento intenso", NivelRisco::Alto),
    ("dor abdominal intensa", NivelRisco::Alto),
    ("febre muito alta", NivelRisco::Medio),
    ("vomitos persistentes", NivelRisco::Medio),
    ("dor de cabeca severa", NivelRisco::Medio),
];

/// IMC em kg/m²; `None` para peso ou altura não positivos
pub fn calcular_imc(peso: f64, altura: f64) -> Option<f64> {
    if peso <= 0.0 || altura <= 0.0 || !peso.is_finite() || !altura.is_finite() {
        return None;
    }
    Some(peso / (altura * altura))
}

pub fn classificar_imc(imc: f64) -> &'static str {
    if imc < 16.0 {
        "Muito abaixo do peso"
    } else if imc < 18.5 {
        "Abaixo do peso"
    } else if imc < 25.0 {
        "Peso normal"
    } else if imc < 30.0 {
        "Sobrepeso"
    } else if imc < 35.0 {
        "Obesidade grau I"
    } else if imc < 40.0 {
        "Obesidade grau II"
    } else {
        "Obesidade grau III"
    }
}

/// Estágio da pressão arterial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificacaoPressao {
    Normal,
    PreHipertensao,
    HipertensaoEstagio1,
    HipertensaoEstagio2,
    CriseHipertensiva,
}

pub fn classificar_pressao(sistolica: u32, diastolica: u32) -> ClassificacaoPressao {
    if sistolica >= 180 || diastolica >= 120 {
        ClassificacaoPressao::CriseHipertensiva
    } else if sistolica >= 160 || diastolica >= 100 {
        ClassificacaoPressao::HipertensaoEstagio2
    } else if sistolica >= 140 || diastolica >= 90 {
        ClassificacaoPressao::HipertensaoEstagio1
    } else if sistolica >= 120 || diastolica >= 80 {
        ClassificacaoPressao::PreHipertensao
    } else {
        ClassificacaoPressao::Normal
    }
}

/// Achado clínico que gera um alerta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "achado", rename_all = "snake_case")]
pub enum AchadoClinico {
    CriseHipertensiva { sistolica: u32, diastolica: u32 },
    Hipertensao { sistolica: u32, diastolica: u32 },
    Hipotensao { sistolica: u32, diastolica: u32 },
    Taquicardia { frequencia: u32 },
    Bradicardia { frequencia: u32 },
    FebreAlta { temperatura: f64 },
    Febre { temperatura: f64 },
    Hipotermia { temperatura: f64 },
    SintomaGrave { sintoma: String, gravidade: NivelRisco },
    MedicamentoControlado { medicamentos: Vec<String> },
}

impl AchadoClinico {
    pub fn descricao(&self) -> String {
        match self {
            AchadoClinico::CriseHipertensiva { sistolica, diastolica } => format!(
                "Crise hipertensiva ({sistolica}/{diastolica} mmHg) - procurar atendimento imediato"
            ),
            AchadoClinico::Hipertensao { sistolica, diastolica } => {
                format!("Hipertensão detectada ({sistolica}/{diastolica} mmHg)")
            }
            AchadoClinico::Hipotensao { sistolica, diastolica } => {
                format!("Hipotensão detectada ({sistolica}/{diastolica} mmHg)")
            }
            AchadoClinico::Taquicardia { frequencia } => {
                format!("Taquicardia detectada ({frequencia} bpm)")
            }
            AchadoClinico::Bradicardia { frequencia } => {
                format!("Bradicardia detectada ({frequencia} bpm)")
            }
            AchadoClinico::FebreAlta { temperatura } => {
                format!("Febre alta detectada: {temperatura:.1}°C")
            }
            AchadoClinico::Febre { temperatura } => {
                format!("Febre detectada: {temperatura:.1}°C")
            }
            AchadoClinico::Hipotermia { temperatura } => {
                format!("Hipotermia detectada: {temperatura:.1}°C")
            }
            AchadoClinico::SintomaGrave { sintoma, gravidade } => {
                format!("Sintoma de risco {gravidade}: {sintoma}")
            }
            AchadoClinico::MedicamentoControlado { medicamentos } => format!(
                "Paciente usa medicamentos controlados ({}) - monitoramento necessário",
                medicamentos.join(", ")
            ),
        }
    }

    /// Tipo e prioridade do alerta gerado pelo achado
    pub fn classificacao(&self) -> (TipoAlerta, PrioridadeAlerta) {
        match self {
            AchadoClinico::CriseHipertensiva { .. } => {
                (TipoAlerta::RiscoAlto, PrioridadeAlerta::Urgente)
            }
            AchadoClinico::FebreAlta { .. } => (TipoAlerta::SintomaGrave, PrioridadeAlerta::Alta),
            AchadoClinico::SintomaGrave { gravidade, .. } if gravidade.exige_prioridade() => {
                (TipoAlerta::SintomaGrave, PrioridadeAlerta::Alta)
            }
            AchadoClinico::SintomaGrave { .. } => {
                (TipoAlerta::SintomaGrave, PrioridadeAlerta::Media)
            }
            AchadoClinico::MedicamentoControlado { .. } => {
                (TipoAlerta::Medicacao, PrioridadeAlerta::Media)
            }
            _ => (TipoAlerta::Acompanhamento, PrioridadeAlerta::Baixa),
        }
    }
}

/// Alerta pronto para persistência
#[derive(Debug, Clone, PartialEq)]
pub struct AlertaClinico {
    pub tipo: TipoAlerta,
    pub prioridade: PrioridadeAlerta,
    pub titulo: String,
    pub descricao: String,
    pub acao_recomendada: String,
    pub prazo: Duration,
}

impl From<AchadoClinico> for AlertaClinico {
    fn from(achado: AchadoClinico) -> Self {
        let (tipo, prioridade) = achado.classificacao();
        let descricao = achado.descricao();
        let titulo = format!("Alerta: {}", descricao.chars().take(50).collect::<String>());
        let acao_recomendada = match prioridade {
            PrioridadeAlerta::Urgente => "Encaminhar imediatamente para atendimento de urgência",
            PrioridadeAlerta::Alta => "Avaliação médica nas próximas 24 horas",
            _ => "Avaliar paciente e tomar ação apropriada",
        }
        .to_string();

        Self {
            tipo,
            prioridade,
            titulo,
            descricao,
            acao_recomendada,
            prazo: Duration::hours(PRAZO_ACAO_HORAS),
        }
    }
}

/// Alertas de sinais vitais. Febre alta é verificada antes de febre.
pub fn avaliar_sinais_vitais(
    sistolica: u32,
    diastolica: u32,
    frequencia: u32,
    temperatura: f64,
) -> Vec<AchadoClinico> {
    let mut achados = Vec::new();

    if sistolica >= 180 || diastolica >= 120 {
        achados.push(AchadoClinico::CriseHipertensiva { sistolica, diastolica });
    } else if sistolica >= 140 || diastolica >= 90 {
        achados.push(AchadoClinico::Hipertensao { sistolica, diastolica });
    } else if sistolica < 90 || diastolica < 60 {
        achados.push(AchadoClinico::Hipotensao { sistolica, diastolica });
    }

    if frequencia > 100 {
        achados.push(AchadoClinico::Taquicardia { frequencia });
    } else if frequencia < 60 {
        achados.push(AchadoClinico::Bradicardia { frequencia });
    }

    if temperatura >= 39.0 {
        achados.push(AchadoClinico::FebreAlta { temperatura });
    } else if temperatura >= 38.0 {
        achados.push(AchadoClinico::Febre { temperatura });
    } else if temperatura < 35.0 {
        achados.push(AchadoClinico::Hipotermia { temperatura });
    }

    achados
}

/// Medicamentos controlados citados no texto
pub fn medicamentos_controlados(texto: &str) -> Vec<&'static str> {
    let texto = remover_acentos(&texto.to_lowercase());
    MEDICAMENTOS_CONTROLADOS
        .iter()
        .copied()
        .filter(|med| texto.contains(med))
        .collect()
}

pub fn sintomas_graves(texto: &str) -> Vec<(&'static str, NivelRisco)> {
    let texto = normalizar_texto(texto);
    SINTOMAS_GRAVES
        .iter()
        .copied()
        .filter(|(sintoma, _)| texto.contains(sintoma))
        .collect()
}

/// Todos os achados de uma coleta
pub fn avaliar_coleta(dados: &DadosSaude) -> Vec<AchadoClinico> {
    let mut achados = avaliar_sinais_vitais(
        dados.pressao_sistolica,
        dados.pressao_diastolica,
        dados.frequencia_cardiaca,
        dados.temperatura,
    );

    achados.extend(sintomas_graves(&dados.sintomas_principais).into_iter().map(
        |(sintoma, gravidade)| AchadoClinico::SintomaGrave {
            sintoma: sintoma.to_string(),
            gravidade,
        },
    ));

    let medicamentos = medicamentos_controlados(&dados.medicamentos_uso);
    if !medicamentos.is_empty() {
        achados.push(AchadoClinico::MedicamentoControlado {
            medicamentos: medicamentos.into_iter().map(String::from).collect(),
        });
    }

    achados
}

/// Alerta para anamnese com triagem alta ou crítica
pub fn alerta_de_risco(nivel: NivelRisco, resumo: &str) -> Option<AlertaClinico> {
    let (prioridade, acao, prazo_horas) = match nivel {
        NivelRisco::Critico => (
            PrioridadeAlerta::Urgente,
            "Encaminhamento imediato para atendimento médico especializado",
            2,
        ),
        NivelRisco::Alto => (
            PrioridadeAlerta::Alta,
            "Consulta médica prioritária nas próximas 24h",
            PRAZO_ACAO_HORAS,
        ),
        _ => return None,
    };

    Some(AlertaClinico {
        tipo: TipoAlerta::RiscoAlto,
        prioridade,
        titulo: format!("Triagem com {}", nivel.rotulo().to_lowercase()),
        descricao: resumo.chars().take(500).collect(),
        acao_recomendada: acao.to_string(),
        prazo: Duration::hours(prazo_horas),
    })
}

/// Recomendações por nível de risco e hábitos da coleta
pub fn recomendacoes(nivel: NivelRisco, dados: Option<&DadosSaude>) -> Vec<String> {
    let mut lista: Vec<&str> = Vec::new();

    match nivel {
        NivelRisco::Critico => {
            lista.push("Encaminhamento imediato para atendimento médico especializado")
        }
        NivelRisco::Alto => lista.push("Consulta médica prioritária nas próximas 24h"),
        NivelRisco::Medio => lista.push("Agendamento de consulta médica em até 7 dias"),
        NivelRisco::Baixo => {}
    }

    if let Some(dados) = dados {
        if matches!(
            classificar_pressao(dados.pressao_sistolica, dados.pressao_diastolica),
            ClassificacaoPressao::HipertensaoEstagio1 | ClassificacaoPressao::HipertensaoEstagio2
        ) {
            lista.push("Monitoramento regular da pressão arterial");
            lista.push("Redução do consumo de sal e atividade física regular");
        }
        if dados.fumante {
            lista.push("Cessação do tabagismo com suporte médico");
        }
        if dados.nivel_atividade_fisica == NivelAtividade::Sedentario {
            lista.push("Iniciar programa de atividade física gradual");
        }
        if !dados.alimentacao_balanceada {
            lista.push("Orientação nutricional para dieta balanceada");
        }
    }

    lista.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn coleta() -> DadosSaude {
        DadosSaude {
            id: Uuid::new_v4(),
            cidadao_id: Uuid::new_v4(),
            agente_coleta: Some("agente01".to_string()),
            pressao_sistolica: 120,
            pressao_diastolica: 80,
            frequencia_cardiaca: 72,
            temperatura: 36.5,
            peso: 70.0,
            altura: 1.75,
            sintomas_principais: String::new(),
            nivel_dor: 0,
            duracao_sintomas: String::new(),
            historico_doencas: String::new(),
            medicamentos_uso: String::new(),
            alergias: String::new(),
            fumante: false,
            etilista: false,
            nivel_atividade_fisica: NivelAtividade::Moderada,
            horas_sono: 8,
            alimentacao_balanceada: true,
            consumo_agua_litros: 2.0,
            dados_extras: None,
            criado_em: Utc::now(),
            sincronizado: false,
        }
    }

    #[test]
    fn test_imc() {
        assert!((calcular_imc(70.0, 1.75).unwrap() - 22.857).abs() < 0.001);
        assert_eq!(calcular_imc(70.0, 0.0), None);
        assert_eq!(calcular_imc(-1.0, 1.7), None);

        let dados = coleta();
        assert_eq!(dados.imc(), Some(22.86));
        assert_eq!(dados.classificacao_imc(), Some("Peso normal"));
    }

    #[test]
    fn test_faixas_imc() {
        assert_eq!(classificar_imc(15.9), "Muito abaixo do peso");
        assert_eq!(classificar_imc(18.5), "Peso normal");
        assert_eq!(classificar_imc(30.0), "Obesidade grau I");
        assert_eq!(classificar_imc(40.0), "Obesidade grau III");
    }

    #[test]
    fn test_febre_alta_antes_de_febre() {
        let achados = avaliar_sinais_vitais(120, 80, 72, 39.5);
        assert_eq!(achados, vec![AchadoClinico::FebreAlta { temperatura: 39.5 }]);

        let achados = avaliar_sinais_vitais(120, 80, 72, 38.2);
        assert_eq!(achados, vec![AchadoClinico::Febre { temperatura: 38.2 }]);
    }

    #[test]
    fn test_sinais_vitais_combinados() {
        let achados = avaliar_sinais_vitais(185, 100, 110, 34.5);
        assert_eq!(achados.len(), 3);
        assert_eq!(
            achados[0].classificacao(),
            (TipoAlerta::RiscoAlto, PrioridadeAlerta::Urgente)
        );
        assert!(matches!(achados[1], AchadoClinico::Taquicardia { .. }));
        assert!(matches!(achados[2], AchadoClinico::Hipotermia { .. }));

        assert!(avaliar_sinais_vitais(120, 80, 72, 36.5).is_empty());
        assert!(matches!(
            avaliar_sinais_vitais(85, 55, 72, 36.5)[0],
            AchadoClinico::Hipotensao { .. }
        ));
    }

    #[test]
    fn test_medicamentos_controlados_sem_acento() {
        assert_eq!(
            medicamentos_controlados("Usa Lítio 300mg e Insulina NPH"),
            vec!["insulina", "litio"]
        );
        assert!(medicamentos_controlados("dipirona").is_empty());
    }

    #[test]
    fn test_avaliar_coleta() {
        let mut dados = coleta();
        dados.sintomas_principais = "Dor no peito desde ontem".to_string();
        dados.medicamentos_uso = "warfarina 5mg".to_string();

        let alertas: Vec<AlertaClinico> =
            avaliar_coleta(&dados).into_iter().map(AlertaClinico::from).collect();
        assert_eq!(alertas.len(), 2);
        assert_eq!(alertas[0].tipo, TipoAlerta::SintomaGrave);
        assert_eq!(alertas[0].prioridade, PrioridadeAlerta::Alta);
        assert_eq!(alertas[1].tipo, TipoAlerta::Medicacao);
        assert_eq!(alertas[1].prioridade, PrioridadeAlerta::Media);
        assert!(alertas[1].titulo.starts_with("Alerta: Paciente usa"));
    }

    #[test]
    fn test_alerta_de_risco() {
        let alerta = alerta_de_risco(NivelRisco::Critico, "Resumo").unwrap();
        assert_eq!(alerta.prioridade, PrioridadeAlerta::Urgente);
        assert_eq!(alerta.tipo, TipoAlerta::RiscoAlto);
        assert!(alerta_de_risco(NivelRisco::Medio, "Resumo").is_none());
    }

    #[test]
    fn test_recomendacoes() {
        let mut dados = coleta();
        dados.pressao_sistolica = 150;
        dados.fumante = true;
        dados.nivel_atividade_fisica = NivelAtividade::Sedentario;
        dados.alimentacao_balanceada = false;

        let lista = recomendacoes(NivelRisco::Alto, Some(&dados));
        assert_eq!(lista.len(), 6);
        assert_eq!(lista[0], "Consulta médica prioritária nas próximas 24h");

        assert!(recomendacoes(NivelRisco::Baixo, Some(&coleta())).is_empty());
    }
}
