//! Utilitários de teste: banco temporário e registros de exemplo

use chrono::{NaiveDate, Utc};
use saude_core::modelos::{
    Anamnese, Cidadao, CondicoesCronicas, DadosSaude, EstadoCivil, NivelAtividade, NivelRisco,
    Sexo, StatusAnamnese,
};
use serde_json::json;
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

use crate::{conectar, Cofre, DbConfig};

/// Banco em diretório temporário, removido quando sai de escopo
pub struct BancoTemporario {
    pub pool: SqlitePool,
    pub cofre: Cofre,
    _dir: TempDir,
}

pub async fn banco_temporario() -> anyhow::Result<BancoTemporario> {
    let dir = tempfile::tempdir()?;
    let config = DbConfig {
        db_path: dir.path().join("teste.db").to_string_lossy().to_string(),
        key_phrase: "frase-de-teste".to_string(),
        max_connections: 2,
        trace_level: 0,
    };
    let (pool, cofre) = conectar(&config).await?;
    Ok(BancoTemporario {
        pool,
        cofre,
        _dir: dir,
    })
}

pub fn cidadao_exemplo(cpf: &str) -> Cidadao {
    let agora = Utc::now();
    Cidadao {
        id: Uuid::new_v4(),
        nome: "Maria da Silva".to_string(),
        cpf: cpf.to_string(),
        data_nascimento: NaiveDate::from_ymd_opt(1958, 3, 14).unwrap_or_default(),
        sexo: Sexo::Feminino,
        estado_civil: EstadoCivil::Casado,
        telefone: "(85) 98888-7777".to_string(),
        email: Some("maria@exemplo.com".to_string()),
        endereco: "Rua das Flores, 123".to_string(),
        cep: "60110-000".to_string(),
        bairro: "Centro".to_string(),
        cidade: "Fortaleza".to_string(),
        estado: "CE".to_string(),
        latitude: None,
        longitude: None,
        endereco_capturado_automaticamente: false,
        profissao: "Costureira".to_string(),
        renda_familiar: Some(2400.0),
        possui_plano_saude: false,
        condicoes: CondicoesCronicas {
            hipertensao: true,
            diabetes: true,
            ..Default::default()
        },
        medicamentos_continuo: "Losartana 50mg".to_string(),
        alergias_conhecidas: String::new(),
        cirurgias_anteriores: String::new(),
        criado_em: agora,
        atualizado_em: agora,
        ativo: true,
    }
}

pub fn dados_exemplo(cidadao_id: Uuid) -> DadosSaude {
    DadosSaude {
        id: Uuid::new_v4(),
        cidadao_id,
        agente_coleta: Some("agente01".to_string()),
        pressao_sistolica: 165,
        pressao_diastolica: 95,
        frequencia_cardiaca: 88,
        temperatura: 36.8,
        peso: 82.0,
        altura: 1.60,
        sintomas_principais: "dor de cabeça e tontura".to_string(),
        nivel_dor: 5,
        duracao_sintomas: "3 dias".to_string(),
        historico_doencas: String::new(),
        medicamentos_uso: "Losartana".to_string(),
        alergias: String::new(),
        fumante: false,
        etilista: false,
        nivel_atividade_fisica: NivelAtividade::Sedentario,
        horas_sono: 6,
        alimentacao_balanceada: false,
        consumo_agua_litros: 1.5,
        dados_extras: None,
        criado_em: Utc::now(),
        sincronizado: false,
    }
}

pub fn anamnese_exemplo(dados: &DadosSaude, nivel: NivelRisco) -> Anamnese {
    Anamnese {
        id: Uuid::new_v4(),
        cidadao_id: dados.cidadao_id,
        dados_saude_id: dados.id,
        resumo_anamnese: "Paciente hipertensa com cefaleia".to_string(),
        diagnostico_clinico: "Hipertensão descompensada".to_string(),
        hipoteses_diagnosticas: vec!["Crise hipertensiva".to_string()],
        diagnostico_diferencial: vec!["Enxaqueca".to_string()],
        triagem_risco: nivel,
        recomendacoes: "Avaliação médica".to_string(),
        exames_complementares: vec!["Hemograma".to_string()],
        modelo_ia: "gpt-3.5-turbo".to_string(),
        confianca_ia: Some(70.0),
        dados_entrada_ia: json!({"faixa_etaria": "65_mais"}),
        resposta_completa_ia: json!({"triagem_risco": nivel.as_str()}),
        status: StatusAnamnese::Pendente,
        revisado_por: None,
        data_revisao: None,
        comentarios_revisao: String::new(),
        resumo_final: String::new(),
        diagnostico_final: String::new(),
        recomendacoes_finais: String::new(),
        criado_em: Utc::now(),
    }
}
