//! Cálculo de risco de saúde
//!
//! Combina fatores demográficos, clínicos e de hábitos de vida em uma
//! pontuação de 0 a 100 e em um dos quatro níveis de triagem.
//!
//! Regras garantidas:
//! - A pontuação final está sempre em [0, 100]
//! - Medições ausentes contribuem com zero
//! - Uma triagem revisada (anamnese) tem precedência sobre o cálculo

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::modelos::{Cidadao, CondicoesCronicas, DadosSaude, NivelAtividade, NivelRisco};
use crate::normalizador::remover_acentos;

/// Pontuação mínima (inclusiva) para risco crítico
pub const LIMIAR_CRITICO: f64 = 70.0;
/// Pontuação mínima (inclusiva) para risco alto
pub const LIMIAR_ALTO: f64 = 50.0;
/// Pontuação mínima (inclusiva) para risco médio
pub const LIMIAR_MEDIO: f64 = 25.0;

/// Teto de cada fator
const TETO_FATOR: f64 = 100.0;

/// Pontuação de idade quando a data de nascimento é desconhecida
const PONTUACAO_IDADE_DESCONHECIDA: f64 = 10.0;

/// Sintomas que somam pontuação quando aparecem no relato (sem acentos)
pub const SINTOMAS_CRITICOS: &[&str] = &[
    "dor no peito",
    "falta de ar",
    "tontura severa",
    "desmaio",
    "convulsao",
    "sangramento",
    "vomito",
    "dor abdominal intensa",
];

/// Pontos somados por sintoma crítico encontrado
const PONTOS_SINTOMA_CRITICO: f64 = 15.0;

/// Pesos de cada fator na pontuação final
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PesosRisco {
    pub idade: f64,
    pub condicoes_cronicas: f64,
    pub sinais_vitais: f64,
    pub sintomas: f64,
    pub habitos: f64,
}

impl Default for PesosRisco {
    fn default() -> Self {
        Self {
            idade: 0.25,
            condicoes_cronicas: 0.30,
            sinais_vitais: 0.20,
            sintomas: 0.15,
            habitos: 0.10,
        }
    }
}

/// Últimos sinais vitais medidos; qualquer campo pode estar ausente
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SinaisVitais {
    pub pressao_sistolica: Option<u32>,
    pub pressao_diastolica: Option<u32>,
    pub frequencia_cardiaca: Option<u32>,
    /// °C
    pub temperatura: Option<f64>,
    /// kg
    pub peso: Option<f64>,
    /// metros
    pub altura: Option<f64>,
}

/// Último relato de sintomas
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatoSintomas {
    pub sintomas: String,
    /// 0 a 10
    pub nivel_dor: u8,
}

/// Hábitos de vida declarados na coleta
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Habitos {
    pub fumante: bool,
    pub etilista: bool,
    pub nivel_atividade: Option<NivelAtividade>,
    pub horas_sono: Option<u32>,
}

/// Nível de risco já registrado por uma anamnese
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriagemPrevia {
    pub nivel: NivelRisco,
    pub anamnese_id: Uuid,
    pub registrada_em: DateTime<Utc>,
}

/// Todos os dados considerados no cálculo
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntradaRisco {
    /// Idade em anos; `None` quando desconhecida
    pub idade: Option<u32>,
    pub condicoes: CondicoesCronicas,
    pub sinais_vitais: Option<SinaisVitais>,
    pub sintomas: Option<RelatoSintomas>,
    pub habitos: Option<Habitos>,
    pub triagem_previa: Option<TriagemPrevia>,
}

impl EntradaRisco {
    /// Monta a entrada a partir do cadastro e da coleta mais recente
    pub fn a_partir_de(
        cidadao: &Cidadao,
        ultimos_dados: Option<&DadosSaude>,
        triagem_previa: Option<TriagemPrevia>,
        hoje: NaiveDate,
    ) -> Self {
        Self {
            idade: Some(cidadao.idade(hoje)),
            condicoes: cidadao.condicoes,
            sinais_vitais: ultimos_dados.map(|d| SinaisVitais {
                pressao_sistolica: Some(d.pressao_sistolica),
                pressao_diastolica: Some(d.pressao_diastolica),
                frequencia_cardiaca: Some(d.frequencia_cardiaca),
                temperatura: Some(d.temperatura),
                peso: Some(d.peso),
                altura: Some(d.altura),
            }),
            sintomas: ultimos_dados.map(|d| RelatoSintomas {
                sintomas: d.sintomas_principais.clone(),
                nivel_dor: d.nivel_dor,
            }),
            habitos: ultimos_dados.map(|d| Habitos {
                fumante: d.fumante,
                etilista: d.etilista,
                nivel_atividade: Some(d.nivel_atividade_fisica),
                horas_sono: Some(d.horas_sono),
            }),
            triagem_previa,
        }
    }
}

/// Origem do nível de risco
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FonteRisco {
    /// Nível copiado da anamnese mais recente
    AnamneseIa,
    CalculoAutomatico,
}

impl std::fmt::Display for FonteRisco {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FonteRisco::AnamneseIa => write!(f, "anamnese_ia"),
            FonteRisco::CalculoAutomatico => write!(f, "calculo_automatico"),
        }
    }
}

/// Pontuação de cada fator antes da aplicação dos pesos
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DetalhesRisco {
    pub idade: f64,
    pub condicoes_cronicas: f64,
    pub sinais_vitais: f64,
    pub sintomas: f64,
    pub habitos: f64,
}

/// Resultado do cálculo de risco
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultadoRisco {
    pub nivel: NivelRisco,
    /// 0 a 100
    pub pontuacao: f64,
    /// Ausente quando o nível vem da anamnese
    pub detalhes: Option<DetalhesRisco>,
    pub fonte: FonteRisco,
    pub anamnese_id: Option<Uuid>,
    pub data_anamnese: Option<DateTime<Utc>>,
}

impl ResultadoRisco {
    /// Pontuação arredondada, usada no mapa
    pub fn pontuacao_inteira(&self) -> i64 {
        self.pontuacao.round() as i64
    }
}

/// Calculador de risco com pesos configuráveis
#[derive(Debug, Clone, Default)]
pub struct CalculadorRisco {
    pesos: PesosRisco,
}

impl CalculadorRisco {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn com_pesos(pesos: PesosRisco) -> Self {
        Self { pesos }
    }

    pub fn pesos(&self) -> &PesosRisco {
        &self.pesos
    }

    /// Calcula o risco. Uma triagem prévia encerra o cálculo imediatamente.
    pub fn calcular(&self, entrada: &EntradaRisco) -> ResultadoRisco {
        if let Some(triagem) = entrada.triagem_previa {
            debug!(
                nivel = %triagem.nivel,
                anamnese_id = %triagem.anamnese_id,
                "Usando risco registrado na anamnese"
            );
            return ResultadoRisco {
                nivel: triagem.nivel,
                pontuacao: triagem.nivel.pontuacao_equivalente(),
                detalhes: None,
                fonte: FonteRisco::AnamneseIa,
                anamnese_id: Some(triagem.anamnese_id),
                data_anamnese: Some(triagem.registrada_em),
            };
        }

        let detalhes = DetalhesRisco {
            idade: Self::risco_idade(entrada.idade),
            condicoes_cronicas: Self::risco_condicoes_cronicas(&entrada.condicoes),
            sinais_vitais: entrada
                .sinais_vitais
                .as_ref()
                .map(Self::risco_sinais_vitais)
                .unwrap_or(0.0),
            sintomas: entrada
                .sintomas
                .as_ref()
                .map(Self::risco_sintomas)
                .unwrap_or(0.0),
            habitos: entrada
                .habitos
                .as_ref()
                .map(Self::risco_habitos)
                .unwrap_or(0.0),
        };

        let total = detalhes.idade * self.pesos.idade
            + detalhes.condicoes_cronicas * self.pesos.condicoes_cronicas
            + detalhes.sinais_vitais * self.pesos.sinais_vitais
            + detalhes.sintomas * self.pesos.sintomas
            + detalhes.habitos * self.pesos.habitos;
        let pontuacao = total.clamp(0.0, TETO_FATOR);
        let nivel = Self::classificar(pontuacao);

        debug!(%nivel, pontuacao, "Risco calculado automaticamente");

        ResultadoRisco {
            nivel,
            pontuacao,
            detalhes: Some(detalhes),
            fonte: FonteRisco::CalculoAutomatico,
            anamnese_id: None,
            data_anamnese: None,
        }
    }

    /// Converte a pontuação em nível; os limiares são inclusivos
    pub fn classificar(pontuacao: f64) -> NivelRisco {
        if pontuacao >= LIMIAR_CRITICO {
            NivelRisco::Critico
        } else if pontuacao >= LIMIAR_ALTO {
            NivelRisco::Alto
        } else if pontuacao >= LIMIAR_MEDIO {
            NivelRisco::Medio
        } else {
            NivelRisco::Baixo
        }
    }

    /// Faixas de idade (0-75)
    pub fn risco_idade(idade: Option<u32>) -> f64 {
        match idade {
            None => PONTUACAO_IDADE_DESCONHECIDA,
            Some(i) if i < 18 => 5.0,
            Some(i) if i < 30 => 10.0,
            Some(i) if i < 45 => 20.0,
            Some(i) if i < 60 => 35.0,
            Some(i) if i < 75 => 55.0,
            Some(_) => 75.0,
        }
    }

    pub fn risco_condicoes_cronicas(condicoes: &CondicoesCronicas) -> f64 {
        let pontos = [
            (condicoes.diabetes, 25.0),
            (condicoes.hipertensao, 20.0),
            (condicoes.doenca_cardiaca, 30.0),
            (condicoes.doenca_renal, 25.0),
            (condicoes.asma, 15.0),
            (condicoes.depressao, 10.0),
        ]
        .into_iter()
        .filter(|(presente, _)| *presente)
        .map(|(_, pontos)| pontos)
        .sum::<f64>();

        pontos.min(TETO_FATOR)
    }

    pub fn risco_sinais_vitais(sinais: &SinaisVitais) -> f64 {
        let mut pontos = 0.0;

        let sistolica = sinais.pressao_sistolica.unwrap_or(0);
        let diastolica = sinais.pressao_diastolica.unwrap_or(0);
        if sistolica >= 180 || diastolica >= 110 {
            pontos += 40.0;
        } else if sistolica >= 140 || diastolica >= 90 {
            pontos += 25.0;
        } else if sistolica >= 130 || diastolica >= 80 {
            pontos += 10.0;
        }

        if let Some(fc) = sinais.frequencia_cardiaca {
            if !(50..=100).contains(&fc) {
                pontos += 20.0;
            } else if !(60..=90).contains(&fc) {
                pontos += 10.0;
            }
        }

        if let Some(temperatura) = sinais.temperatura {
            if temperatura >= 39.0 {
                pontos += 25.0;
            } else if temperatura >= 37.5 {
                pontos += 15.0;
            } else if temperatura <= 35.0 {
                pontos += 20.0;
            }
        }

        if let Some(imc) = sinais
            .peso
            .zip(sinais.altura)
            .and_then(|(peso, altura)| crate::clinico::calcular_imc(peso, altura))
        {
            if imc >= 35.0 {
                pontos += 20.0;
            } else if imc >= 30.0 {
                pontos += 15.0;
            } else if imc >= 25.0 {
                pontos += 5.0;
            } else if imc < 18.5 {
                pontos += 10.0;
            }
        }

        f64::min(pontos, TETO_FATOR)
    }

    pub fn risco_sintomas(relato: &RelatoSintomas) -> f64 {
        let mut pontos = match relato.nivel_dor {
            8.. => 30.0,
            6..=7 => 20.0,
            4..=5 => 10.0,
            _ => 0.0,
        };

        let texto = remover_acentos(&relato.sintomas.to_lowercase());
        pontos += SINTOMAS_CRITICOS
            .iter()
            .filter(|sintoma| texto.contains(*sintoma))
            .count() as f64
            * PONTOS_SINTOMA_CRITICO;

        f64::min(pontos, TETO_FATOR)
    }

    pub fn risco_habitos(habitos: &Habitos) -> f64 {
        let mut pontos = 0.0;
        if habitos.fumante {
            pontos += 25.0;
        }
        if habitos.etilista {
            pontos += 20.0;
        }
        match habitos.nivel_atividade {
            Some(NivelAtividade::Sedentario) => pontos += 15.0,
            Some(NivelAtividade::Leve) => pontos += 5.0,
            _ => {}
        }
        f64::min(pontos, TETO_FATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entrada_completa() -> EntradaRisco {
        EntradaRisco {
            idade: Some(67),
            condicoes: CondicoesCronicas {
                hipertensao: true,
                diabetes: true,
                ..Default::default()
            },
            sinais_vitais: Some(SinaisVitais {
                pressao_sistolica: Some(150),
                pressao_diastolica: Some(95),
                frequencia_cardiaca: Some(95),
                temperatura: Some(36.8),
                peso: Some(92.0),
                altura: Some(1.70),
            }),
            sintomas: Some(RelatoSintomas {
                sintomas: "Dor no peito e falta de ar ao subir escadas".to_string(),
                nivel_dor: 6,
            }),
            habitos: Some(Habitos {
                fumante: true,
                etilista: false,
                nivel_atividade: Some(NivelAtividade::Sedentario),
                horas_sono: Some(6),
            }),
            triagem_previa: None,
        }
    }

    #[test]
    fn test_calculo_ponderado() {
        let resultado = CalculadorRisco::new().calcular(&entrada_completa());
        let detalhes = resultado.detalhes.unwrap();

        assert_eq!(detalhes.idade, 55.0);
        assert_eq!(detalhes.condicoes_cronicas, 45.0);
        // PA 25 + FC 10 + IMC 31.8 -> 15
        assert_eq!(detalhes.sinais_vitais, 50.0);
        // dor 20 + dois sintomas críticos
        assert_eq!(detalhes.sintomas, 50.0);
        assert_eq!(detalhes.habitos, 40.0);

        let esperado = 55.0 * 0.25 + 45.0 * 0.30 + 50.0 * 0.20 + 50.0 * 0.15 + 40.0 * 0.10;
        assert!((resultado.pontuacao - esperado).abs() < 1e-9);
        assert_eq!(resultado.nivel, NivelRisco::Medio);
        assert_eq!(resultado.fonte, FonteRisco::CalculoAutomatico);
    }

    #[test]
    fn test_triagem_previa_tem_precedencia() {
        let mut entrada = entrada_completa();
        let anamnese_id = Uuid::new_v4();
        entrada.triagem_previa = Some(TriagemPrevia {
            nivel: NivelRisco::Baixo,
            anamnese_id,
            registrada_em: Utc::now(),
        });

        let resultado = CalculadorRisco::new().calcular(&entrada);
        assert_eq!(resultado.nivel, NivelRisco::Baixo);
        assert_eq!(resultado.pontuacao, 20.0);
        assert_eq!(resultado.fonte, FonteRisco::AnamneseIa);
        assert_eq!(resultado.anamnese_id, Some(anamnese_id));
        assert!(resultado.detalhes.is_none());
    }

    #[test]
    fn test_pontuacao_equivalente_da_triagem() {
        for (nivel, pontos) in [
            (NivelRisco::Baixo, 20.0),
            (NivelRisco::Medio, 50.0),
            (NivelRisco::Alto, 80.0),
            (NivelRisco::Critico, 95.0),
        ] {
            let entrada = EntradaRisco {
                triagem_previa: Some(TriagemPrevia {
                    nivel,
                    anamnese_id: Uuid::nil(),
                    registrada_em: Utc::now(),
                }),
                ..Default::default()
            };
            let resultado = CalculadorRisco::new().calcular(&entrada);
            assert_eq!(resultado.pontuacao, pontos);
            assert_eq!(resultado.nivel, nivel);
        }
    }

    #[test]
    fn test_limiares_inclusivos() {
        assert_eq!(CalculadorRisco::classificar(70.0), NivelRisco::Critico);
        assert_eq!(CalculadorRisco::classificar(69.999), NivelRisco::Alto);
        assert_eq!(CalculadorRisco::classificar(50.0), NivelRisco::Alto);
        assert_eq!(CalculadorRisco::classificar(49.99), NivelRisco::Medio);
        assert_eq!(CalculadorRisco::classificar(25.0), NivelRisco::Medio);
        assert_eq!(CalculadorRisco::classificar(24.99), NivelRisco::Baixo);
        assert_eq!(CalculadorRisco::classificar(0.0), NivelRisco::Baixo);
    }

    #[test]
    fn test_sem_dados_de_saude() {
        let entrada = EntradaRisco {
            idade: Some(40),
            ..Default::default()
        };
        let resultado = CalculadorRisco::new().calcular(&entrada);
        let detalhes = resultado.detalhes.unwrap();
        assert_eq!(detalhes.sinais_vitais, 0.0);
        assert_eq!(detalhes.sintomas, 0.0);
        assert_eq!(detalhes.habitos, 0.0);
        assert_eq!(resultado.pontuacao, 5.0);
        assert_eq!(resultado.nivel, NivelRisco::Baixo);
    }

    #[test]
    fn test_idade_desconhecida() {
        assert_eq!(CalculadorRisco::risco_idade(None), 10.0);
        assert_eq!(CalculadorRisco::risco_idade(Some(17)), 5.0);
        assert_eq!(CalculadorRisco::risco_idade(Some(18)), 10.0);
        assert_eq!(CalculadorRisco::risco_idade(Some(75)), 75.0);
    }

    #[test]
    fn test_medicoes_ausentes_valem_zero() {
        assert_eq!(CalculadorRisco::risco_sinais_vitais(&SinaisVitais::default()), 0.0);

        let so_temperatura = SinaisVitais {
            temperatura: Some(39.2),
            ..Default::default()
        };
        assert_eq!(CalculadorRisco::risco_sinais_vitais(&so_temperatura), 25.0);

        let sem_altura = SinaisVitais {
            peso: Some(140.0),
            ..Default::default()
        };
        assert_eq!(CalculadorRisco::risco_sinais_vitais(&sem_altura), 0.0);
    }

    #[test]
    fn test_sintomas_sem_acento_e_teto() {
        let relato = RelatoSintomas {
            sintomas: "VÔMITO, convulsão, desmaio, sangramento, dor no peito, falta de ar, \
                       tontura severa e dor abdominal intensa"
                .to_string(),
            nivel_dor: 10,
        };
        // 30 + 8 * 15 = 150, limitado a 100
        assert_eq!(CalculadorRisco::risco_sintomas(&relato), 100.0);

        let leve = RelatoSintomas {
            sintomas: "vômitos desde ontem".to_string(),
            nivel_dor: 3,
        };
        assert_eq!(CalculadorRisco::risco_sintomas(&leve), 15.0);
    }

    #[test]
    fn test_condicoes_limitadas_a_cem() {
        let todas = CondicoesCronicas {
            hipertensao: true,
            diabetes: true,
            doenca_cardiaca: true,
            doenca_renal: true,
            asma: true,
            depressao: true,
        };
        assert_eq!(CalculadorRisco::risco_condicoes_cronicas(&todas), 100.0);
    }

    #[test]
    fn test_pesos_configuraveis() {
        let pesos = PesosRisco {
            idade: 1.0,
            condicoes_cronicas: 0.0,
            sinais_vitais: 0.0,
            sintomas: 0.0,
            habitos: 0.0,
        };
        let entrada = EntradaRisco {
            idade: Some(80),
            ..Default::default()
        };
        let resultado = CalculadorRisco::com_pesos(pesos).calcular(&entrada);
        assert_eq!(resultado.pontuacao, 75.0);
        assert_eq!(resultado.nivel, NivelRisco::Critico);
    }

    fn estrategia_entrada() -> impl Strategy<Value = EntradaRisco> {
        (
            proptest::option::of(0u32..120),
            proptest::array::uniform6(any::<bool>()),
            proptest::option::of((70u32..250, 40u32..150, 30u32..220, 30.0f64..45.0)),
            proptest::option::of((0u8..=10, "[a-z ]{0,40}")),
            proptest::option::of((any::<bool>(), any::<bool>())),
        )
            .prop_map(|(idade, c, vitais, sintomas, habitos)| EntradaRisco {
                idade,
                condicoes: CondicoesCronicas {
                    hipertensao: c[0],
                    diabetes: c[1],
                    doenca_cardiaca: c[2],
                    doenca_renal: c[3],
                    asma: c[4],
                    depressao: c[5],
                },
                sinais_vitais: vitais.map(|(s, d, fc, t)| SinaisVitais {
                    pressao_sistolica: Some(s),
                    pressao_diastolica: Some(d),
                    frequencia_cardiaca: Some(fc),
                    temperatura: Some(t),
                    peso: Some(70.0),
                    altura: Some(1.70),
                }),
                sintomas: sintomas.map(|(nivel_dor, sintomas)| RelatoSintomas {
                    sintomas,
                    nivel_dor,
                }),
                habitos: habitos.map(|(fumante, etilista)| Habitos {
                    fumante,
                    etilista,
                    nivel_atividade: Some(NivelAtividade::Sedentario),
                    horas_sono: None,
                }),
                triagem_previa: None,
            })
    }

    proptest! {
        #[test]
        fn pontuacao_sempre_entre_zero_e_cem(entrada in estrategia_entrada()) {
            let resultado = CalculadorRisco::new().calcular(&entrada);
            prop_assert!((0.0..=100.0).contains(&resultado.pontuacao));
            prop_assert_eq!(resultado.nivel, CalculadorRisco::classificar(resultado.pontuacao));
        }

        #[test]
        fn calculo_idempotente(entrada in estrategia_entrada()) {
            let calculador = CalculadorRisco::new();
            prop_assert_eq!(calculador.calcular(&entrada), calculador.calcular(&entrada));
        }

        #[test]
        fn sistolica_maior_nunca_reduz_sinais_vitais(
            sistolica in 70u32..249,
            incremento in 1u32..100,
            diastolica in 40u32..150,
            fc in 30u32..220,
        ) {
            let base = SinaisVitais {
                pressao_sistolica: Some(sistolica),
                pressao_diastolica: Some(diastolica),
                frequencia_cardiaca: Some(fc),
                temperatura: Some(36.5),
                peso: Some(70.0),
                altura: Some(1.75),
            };
            let maior = SinaisVitais {
                pressao_sistolica: Some(sistolica + incremento),
                ..base
            };
            prop_assert!(
                CalculadorRisco::risco_sinais_vitais(&maior)
                    >= CalculadorRisco::risco_sinais_vitais(&base)
            );
        }
    }
}
