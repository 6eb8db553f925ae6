use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use saude_core::clinico::recomendacoes;
use saude_core::lgpd::TipoAcao;
use saude_core::modelos::{Cidadao, CondicoesCronicas, DadosSaude, EstadoCivil, Sexo};
use saude_core::validadores::{
    validar_cep, validar_cpf, validar_data_nascimento, validar_telefone, validar_uf,
};
use saude_core::ResultadoRisco;
use saude_db::models::ResumoCidadao;
use saude_db::repositorio::cidadaos::{self, FiltroCidadaos};
use saude_db::repositorio::dados_saude;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::api::paginacao;
use crate::error::{ApiError, ApiResult};
use crate::servicos::lgpd::{auditar, Solicitante};
use crate::servicos::risco::{self, ResumoRecalculo};
use crate::state::AppState;
use crate::tarefas;

/// Cadastro enviado pelo aplicativo de campo; CPF, telefone e CEP são
/// aceitos com ou sem pontuação.
#[derive(Debug, Deserialize, Validate)]
pub struct DadosCidadao {
    #[validate(length(min = 2, max = 200))]
    pub nome: String,
    pub cpf: String,
    /// `AAAA-MM-DD` ou `DD/MM/AAAA`
    pub data_nascimento: String,
    pub sexo: Sexo,
    pub estado_civil: EstadoCivil,
    pub telefone: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 3, max = 300))]
    pub endereco: String,
    pub cep: String,
    #[serde(default)]
    pub bairro: String,
    #[validate(length(min = 2, max = 100))]
    pub cidade: String,
    pub estado: String,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub profissao: String,
    #[validate(range(min = 0.0))]
    pub renda_familiar: Option<f64>,
    #[serde(default)]
    pub possui_plano_saude: bool,
    #[serde(default)]
    pub hipertensao: bool,
    #[serde(default)]
    pub diabetes: bool,
    #[serde(default)]
    pub doenca_cardiaca: bool,
    #[serde(default)]
    pub doenca_renal: bool,
    #[serde(default)]
    pub asma: bool,
    #[serde(default)]
    pub depressao: bool,
    #[serde(default)]
    pub medicamentos_continuo: String,
    #[serde(default)]
    pub alergias_conhecidas: String,
    #[serde(default)]
    pub cirurgias_anteriores: String,
}

impl DadosCidadao {
    /// Valida e normaliza os campos, preenchendo `base` (um cadastro novo ou
    /// o existente, na atualização).
    fn aplicar(self, mut base: Cidadao) -> ApiResult<Cidadao> {
        self.validate()?;
        let hoje = Utc::now().date_naive();

        let estado = self.estado.trim().to_uppercase();
        if !validar_uf(&estado) {
            return Err(ApiError::RequisicaoInvalida(format!("UF inválida: {}", self.estado)));
        }
        if self.latitude.is_some() != self.longitude.is_some() {
            return Err(ApiError::RequisicaoInvalida(
                "Latitude e longitude devem ser informadas juntas".to_string(),
            ));
        }

        base.nome = self.nome.trim().to_string();
        base.cpf = validar_cpf(&self.cpf)?;
        base.data_nascimento = validar_data_nascimento(&self.data_nascimento, hoje)?;
        base.sexo = self.sexo;
        base.estado_civil = self.estado_civil;
        base.telefone = validar_telefone(&self.telefone)?;
        base.email = self.email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty());
        base.endereco = self.endereco.trim().to_string();
        base.cep = validar_cep(&self.cep)?;
        base.bairro = self.bairro.trim().to_string();
        base.cidade = self.cidade.trim().to_string();
        base.estado = estado;
        if self.latitude.is_some() {
            base.latitude = self.latitude;
            base.longitude = self.longitude;
            base.endereco_capturado_automaticamente = false;
        }
        base.profissao = self.profissao;
        base.renda_familiar = self.renda_familiar;
        base.possui_plano_saude = self.possui_plano_saude;
        base.condicoes = CondicoesCronicas {
            hipertensao: self.hipertensao,
            diabetes: self.diabetes,
            doenca_cardiaca: self.doenca_cardiaca,
            doenca_renal: self.doenca_renal,
            asma: self.asma,
            depressao: self.depressao,
        };
        base.medicamentos_continuo = self.medicamentos_continuo;
        base.alergias_conhecidas = self.alergias_conhecidas;
        base.cirurgias_anteriores = self.cirurgias_anteriores;
        Ok(base)
    }
}

fn cadastro_vazio() -> Cidadao {
    let agora = Utc::now();
    Cidadao {
        id: Uuid::new_v4(),
        nome: String::new(),
        cpf: String::new(),
        data_nascimento: agora.date_naive(),
        sexo: Sexo::Outro,
        estado_civil: EstadoCivil::Solteiro,
        telefone: String::new(),
        email: None,
        endereco: String::new(),
        cep: String::new(),
        bairro: String::new(),
        cidade: String::new(),
        estado: String::new(),
        latitude: None,
        longitude: None,
        endereco_capturado_automaticamente: false,
        profissao: String::new(),
        renda_familiar: None,
        possui_plano_saude: false,
        condicoes: CondicoesCronicas::default(),
        medicamentos_continuo: String::new(),
        alergias_conhecidas: String::new(),
        cirurgias_anteriores: String::new(),
        criado_em: agora,
        atualizado_em: agora,
        ativo: true,
    }
}

async fn criar_cidadao(
    State(state): State<Arc<AppState>>,
    solicitante: Solicitante,
    Json(payload): Json<DadosCidadao>,
) -> ApiResult<(StatusCode, Json<Cidadao>)> {
    let cidadao = payload.aplicar(cadastro_vazio())?;
    cidadaos::inserir(&state.pool, &state.cofre, &cidadao).await?;
    auditar(
        &state.pool,
        &solicitante,
        cidadao.id,
        TipoAcao::ModificacaoDados,
        json!({ "operacao": "cadastro" }),
        Utc::now(),
    )
    .await?;

    tarefas::agendar_geocodificacao(state.clone(), cidadao.id);
    Ok((StatusCode::CREATED, Json(cidadao)))
}

#[derive(Debug, Deserialize)]
struct ListagemQuery {
    nome: Option<String>,
    cidade: Option<String>,
    pagina: Option<u32>,
    por_pagina: Option<u32>,
}

async fn listar_cidadaos(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListagemQuery>,
) -> ApiResult<Json<Vec<ResumoCidadao>>> {
    let filtro = FiltroCidadaos {
        nome: query.nome.filter(|n| !n.trim().is_empty()),
        cidade: query.cidade.filter(|c| !c.trim().is_empty()),
        paginacao: paginacao(query.pagina, query.por_pagina),
    };
    Ok(Json(cidadaos::listar(&state.pool, &filtro).await?))
}

async fn obter_cidadao(
    State(state): State<Arc<AppState>>,
    solicitante: Solicitante,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Cidadao>> {
    let cidadao = cidadaos::buscar(&state.pool, &state.cofre, id).await?;
    auditar(
        &state.pool,
        &solicitante,
        id,
        TipoAcao::AcessoDados,
        json!({ "recurso": "cadastro" }),
        Utc::now(),
    )
    .await?;
    Ok(Json(cidadao))
}

async fn atualizar_cidadao(
    State(state): State<Arc<AppState>>,
    solicitante: Solicitante,
    Path(id): Path<Uuid>,
    Json(payload): Json<DadosCidadao>,
) -> ApiResult<Json<Cidadao>> {
    let existente = cidadaos::buscar(&state.pool, &state.cofre, id).await?;
    let mut cidadao = payload.aplicar(existente)?;
    cidadao.atualizado_em = Utc::now();
    cidadaos::atualizar(&state.pool, &state.cofre, &cidadao).await?;
    auditar(
        &state.pool,
        &solicitante,
        id,
        TipoAcao::ModificacaoDados,
        json!({ "operacao": "atualizacao" }),
        cidadao.atualizado_em,
    )
    .await?;

    // condições crônicas e idade entram no risco
    risco::atualizar_no_mapa(&state.pool, &state.calculador, &cidadao, cidadao.atualizado_em).await?;
    tarefas::agendar_geocodificacao(state.clone(), id);
    Ok(Json(cidadao))
}

async fn desativar_cidadao(
    State(state): State<Arc<AppState>>,
    solicitante: Solicitante,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let agora = Utc::now();
    cidadaos::desativar(&state.pool, id, agora).await?;
    auditar(
        &state.pool,
        &solicitante,
        id,
        TipoAcao::ExclusaoDados,
        json!({ "operacao": "desativacao" }),
        agora,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct RiscoCidadao {
    cidadao_id: Uuid,
    #[serde(flatten)]
    resultado: ResultadoRisco,
    rotulo: &'static str,
    cor: &'static str,
    recomendacoes: Vec<String>,
}

async fn risco_cidadao(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RiscoCidadao>> {
    let cidadao = cidadaos::buscar(&state.pool, &state.cofre, id).await?;
    let hoje = Utc::now().date_naive();
    let resultado = risco::calcular_risco_cidadao(&state.pool, &state.calculador, &cidadao, hoje).await?;
    let ultimos = dados_saude::ultima_do_cidadao(&state.pool, id).await?;

    Ok(Json(RiscoCidadao {
        cidadao_id: id,
        rotulo: resultado.nivel.rotulo(),
        cor: resultado.nivel.cor_marcador(),
        recomendacoes: recomendacoes(resultado.nivel, ultimos.as_ref()),
        resultado,
    }))
}

async fn coletas_do_cidadao(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<DadosSaude>>> {
    if !cidadaos::existe(&state.pool, id).await? {
        return Err(ApiError::NaoEncontrado(format!("Cidadão {} não encontrado", id)));
    }
    Ok(Json(dados_saude::listar_do_cidadao(&state.pool, id).await?))
}

async fn recalcular_riscos(State(state): State<Arc<AppState>>) -> ApiResult<Json<ResumoRecalculo>> {
    let resumo =
        risco::recalcular_todos(&state.pool, &state.cofre, &state.calculador, Utc::now()).await?;
    Ok(Json(resumo))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cidadaos", post(criar_cidadao).get(listar_cidadaos))
        .route(
            "/cidadaos/:id",
            get(obter_cidadao).put(atualizar_cidadao).delete(desativar_cidadao),
        )
        .route("/cidadaos/:id/risco", get(risco_cidadao))
        .route("/cidadaos/:id/coletas", get(coletas_do_cidadao))
        .route("/risco/recalcular", post(recalcular_riscos))
}
