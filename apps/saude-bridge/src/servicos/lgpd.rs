//! Operações de conformidade com a LGPD que envolvem mais de um repositório

use chrono::{DateTime, Duration, Utc};
use saude_core::lgpd::{
    mascarar_cpf, mascarar_email, mascarar_endereco, mascarar_nome, mascarar_telefone,
    AuditoriaAcesso, Consentimento, DadosAnonimizados, Finalidade, TipoAcao,
    PRAZO_NOTIFICACAO_ANPD_HORAS, VALIDADE_CONSENTIMENTO_DIAS,
};
use saude_core::modelos::{Anamnese, Cidadao, DadosSaude};
use saude_db::repositorio::anamneses::FiltroAnamneses;
use saude_db::repositorio::{anamneses, cidadaos, dados_saude, lgpd, localizacoes, Paginacao};
use saude_db::DbError;
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::servicos::ErroServico;
use crate::state::AppState;

/// Quem está acessando os dados, como aparece na trilha de auditoria
#[derive(Debug, Clone, PartialEq)]
pub struct Solicitante {
    pub usuario: String,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub url: String,
}

impl Solicitante {
    /// Tarefas internas, sem requisição HTTP
    pub fn sistema() -> Self {
        Self {
            usuario: "sistema".to_string(),
            ip_address: None,
            user_agent: String::new(),
            url: String::new(),
        }
    }
}

pub async fn auditar(
    pool: &SqlitePool,
    solicitante: &Solicitante,
    cidadao_id: Uuid,
    tipo_acao: TipoAcao,
    detalhes: Value,
    agora: DateTime<Utc>,
) -> Result<(), DbError> {
    let acesso = AuditoriaAcesso {
        id: Uuid::new_v4(),
        usuario: solicitante.usuario.clone(),
        cidadao_id,
        tipo_acao,
        detalhes,
        ip_address: solicitante.ip_address.clone(),
        user_agent: solicitante.user_agent.clone(),
        url_acessada: solicitante.url.clone(),
        timestamp: agora,
    };
    lgpd::registrar_acesso(pool, &acesso).await
}

/// Concede o consentimento ou renova o existente para o mesmo par
/// (cidadão, finalidade), que continua sendo um único registro.
pub async fn conceder_consentimento(
    pool: &SqlitePool,
    cidadao_id: Uuid,
    finalidade: Finalidade,
    solicitante: &Solicitante,
    agora: DateTime<Utc>,
) -> Result<Consentimento, DbError> {
    if !cidadaos::existe(pool, cidadao_id).await? {
        return Err(DbError::nao_encontrado("cidadão", cidadao_id));
    }

    let consentimento = match lgpd::consentimento(pool, cidadao_id, finalidade).await? {
        Some(mut existente) => {
            existente.renovar(agora);
            existente.ip_address = solicitante.ip_address.clone();
            existente.user_agent = solicitante.user_agent.clone();
            existente
        }
        None => Consentimento::conceder(
            cidadao_id,
            finalidade,
            agora,
            solicitante.ip_address.clone(),
            solicitante.user_agent.clone(),
        ),
    };
    lgpd::gravar_consentimento(pool, &consentimento).await?;

    auditar(
        pool,
        solicitante,
        cidadao_id,
        TipoAcao::ConsentimentoDado,
        json!({ "finalidade": finalidade, "valido_ate": consentimento.valido_ate }),
        agora,
    )
    .await?;
    info!(%cidadao_id, %finalidade, "Consentimento concedido");
    Ok(consentimento)
}

/// Revoga o consentimento; `None` quando nunca houve concessão
pub async fn revogar_consentimento(
    pool: &SqlitePool,
    cidadao_id: Uuid,
    finalidade: Finalidade,
    solicitante: &Solicitante,
    agora: DateTime<Utc>,
) -> Result<Option<Consentimento>, DbError> {
    let Some(mut consentimento) = lgpd::consentimento(pool, cidadao_id, finalidade).await? else {
        return Ok(None);
    };
    consentimento.revogar(agora);
    lgpd::gravar_consentimento(pool, &consentimento).await?;

    auditar(
        pool,
        solicitante,
        cidadao_id,
        TipoAcao::ConsentimentoRevogado,
        json!({ "finalidade": finalidade }),
        agora,
    )
    .await?;
    info!(%cidadao_id, %finalidade, "Consentimento revogado");
    Ok(Some(consentimento))
}

/// Cadastro com todos os identificadores pessoais mascarados
pub fn mascarar_cidadao(cidadao: &Cidadao) -> Cidadao {
    Cidadao {
        nome: mascarar_nome(&cidadao.nome),
        cpf: mascarar_cpf(&cidadao.cpf),
        telefone: mascarar_telefone(&cidadao.telefone),
        email: cidadao.email.as_deref().map(mascarar_email),
        endereco: mascarar_endereco(&cidadao.endereco),
        ..cidadao.clone()
    }
}

/// Gera o registro estatístico e substitui o cadastro pela versão
/// mascarada. Não há volta: os identificadores originais deixam de existir.
pub async fn anonimizar_cidadao(
    estado: &AppState,
    cidadao_id: Uuid,
    solicitante: &Solicitante,
    agora: DateTime<Utc>,
) -> Result<DadosAnonimizados, ErroServico> {
    let pool = &estado.pool;
    let cidadao = cidadaos::buscar(pool, &estado.cofre, cidadao_id).await?;
    let ultimos_dados = dados_saude::ultima_do_cidadao(pool, cidadao_id).await?;
    let nivel = localizacoes::do_cidadao(pool, cidadao_id)
        .await?
        .map(|localizacao| localizacao.nivel_risco);

    let anonimizado = DadosAnonimizados::gerar(
        &cidadao,
        ultimos_dados.as_ref(),
        nivel,
        Finalidade::EstatisticasPublicas.as_str(),
        &estado.config.lgpd_salt,
        agora,
    );
    lgpd::inserir_anonimizado(pool, &anonimizado).await?;

    let mut mascarado = mascarar_cidadao(&cidadao);
    mascarado.atualizado_em = agora;
    cidadaos::gravar_anonimizado(pool, &estado.cofre, &mascarado).await?;

    auditar(
        pool,
        solicitante,
        cidadao_id,
        TipoAcao::AnonimizacaoDados,
        json!({ "hash_cidadao": anonimizado.hash_cidadao }),
        agora,
    )
    .await?;
    warn!(%cidadao_id, "Cadastro anonimizado de forma irreversível");
    Ok(anonimizado)
}

/// Janela do histórico de acessos incluída no relatório do titular
const DIAS_HISTORICO_RELATORIO: i64 = 365;

/// Relatório dos dados do titular, com identificadores mascarados
#[derive(Debug, Clone, Serialize)]
pub struct RelatorioCidadao {
    pub cidadao: Cidadao,
    pub dados_saude: Vec<DadosSaude>,
    pub anamneses: Vec<Anamnese>,
    pub consentimentos: Vec<Consentimento>,
    pub historico_acessos: Vec<AuditoriaAcesso>,
    pub gerado_em: DateTime<Utc>,
}

pub async fn relatorio_cidadao(
    estado: &AppState,
    cidadao_id: Uuid,
    solicitante: &Solicitante,
    agora: DateTime<Utc>,
) -> Result<RelatorioCidadao, ErroServico> {
    let pool = &estado.pool;
    let cidadao = cidadaos::buscar(pool, &estado.cofre, cidadao_id).await?;

    let relatorio = RelatorioCidadao {
        cidadao: mascarar_cidadao(&cidadao),
        dados_saude: dados_saude::listar_do_cidadao(pool, cidadao_id).await?,
        anamneses: anamneses::listar(
            pool,
            &FiltroAnamneses {
                cidadao_id: Some(cidadao_id),
                paginacao: Paginacao {
                    pagina: 1,
                    por_pagina: saude_db::repositorio::POR_PAGINA_MAXIMO,
                },
                ..Default::default()
            },
        )
        .await?,
        consentimentos: lgpd::consentimentos_do_cidadao(pool, cidadao_id).await?,
        historico_acessos: lgpd::historico_acessos(
            pool,
            cidadao_id,
            agora - Duration::days(DIAS_HISTORICO_RELATORIO),
        )
        .await?,
        gerado_em: agora,
    };

    // a exportação entra na trilha depois da leitura do histórico
    auditar(
        pool,
        solicitante,
        cidadao_id,
        TipoAcao::ExportacaoDados,
        json!({ "relatorio": "dados_titular" }),
        agora,
    )
    .await?;
    Ok(relatorio)
}

#[derive(Debug, Clone, Serialize)]
pub struct ResumoViolacoes {
    pub total: usize,
    pub em_aberto: usize,
    /// Exigem notificação à ANPD e ainda estão no prazo
    pub pendentes_anpd: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelatorioConformidade {
    pub total_cidadaos: i64,
    pub cidadaos_com_consentimento: i64,
    pub acessos_ultimos_30_dias: i64,
    pub violacoes: ResumoViolacoes,
    pub registros_anonimizados: i64,
    pub politicas_vigentes: Vec<String>,
    pub gerado_em: DateTime<Utc>,
}

fn politicas_vigentes() -> Vec<String> {
    vec![
        format!("Consentimento por finalidade com validade de {VALIDADE_CONSENTIMENTO_DIAS} dias"),
        "CPF, telefone, e-mail e endereço cifrados em repouso".to_string(),
        "Dados enviados à IA sem identificadores pessoais".to_string(),
        format!(
            "Violações de severidade alta ou crítica notificadas à ANPD em até {PRAZO_NOTIFICACAO_ANPD_HORAS} horas"
        ),
        "Todo acesso a dados pessoais registrado na trilha de auditoria".to_string(),
    ]
}

pub async fn relatorio_conformidade(
    pool: &SqlitePool,
    agora: DateTime<Utc>,
) -> Result<RelatorioConformidade, DbError> {
    let violacoes = lgpd::listar_violacoes(pool).await?;
    let resumo = ResumoViolacoes {
        total: violacoes.len(),
        em_aberto: violacoes.iter().filter(|v| !v.resolvida).count(),
        pendentes_anpd: violacoes.iter().filter(|v| v.deve_notificar_anpd(agora)).count(),
    };

    Ok(RelatorioConformidade {
        total_cidadaos: cidadaos::contar_ativos(pool).await?,
        cidadaos_com_consentimento: lgpd::contar_cidadaos_com_consentimento(pool, agora).await?,
        acessos_ultimos_30_dias: lgpd::contar_acessos_desde(pool, agora - Duration::days(30)).await?,
        violacoes: resumo,
        registros_anonimizados: lgpd::contar_anonimizados(pool).await?,
        politicas_vigentes: politicas_vigentes(),
        gerado_em: agora,
    })
}
