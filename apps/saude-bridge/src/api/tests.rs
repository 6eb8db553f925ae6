use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use saude_db::repositorio::{cidadaos, dados_saude};
use saude_db::testes::{cidadao_exemplo, dados_exemplo};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::api::{app_router, CABECALHO_USUARIO};
use crate::servicos::ia::MockProvedorIa;
use crate::testes::{ambiente_de_teste, AmbienteTeste};

async fn ambiente() -> anyhow::Result<(AmbienteTeste, Router)> {
    let mut ia = MockProvedorIa::new();
    ia.expect_completar().times(0);
    let ambiente = ambiente_de_teste(Arc::new(ia), None).await?;
    let app = app_router(ambiente.estado.clone());
    Ok((ambiente, app))
}

async fn requisitar(
    app: &Router,
    metodo: Method,
    uri: &str,
    corpo: Option<Value>,
) -> anyhow::Result<(StatusCode, Value)> {
    let builder = Request::builder()
        .method(metodo)
        .uri(uri)
        .header(CABECALHO_USUARIO, "agente01");
    let requisicao = match corpo {
        Some(corpo) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&corpo)?))?,
        None => builder.body(Body::empty())?,
    };

    let resposta = app.clone().oneshot(requisicao).await?;
    let status = resposta.status();
    let bytes = hyper::body::to_bytes(resposta.into_body()).await?;
    let valor = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, valor))
}

fn cadastro(cpf: &str) -> Value {
    json!({
        "nome": "João Pereira",
        "cpf": cpf,
        "data_nascimento": "12/05/1950",
        "sexo": "M",
        "estado_civil": "C",
        "telefone": "85988887777",
        "email": "Joao@Exemplo.com",
        "endereco": "Av. Beira Mar, 500",
        "cep": "60165121",
        "bairro": "Meireles",
        "cidade": "Fortaleza",
        "estado": "ce",
        "hipertensao": true
    })
}

/// 11:00 em Brasília, dois dias à frente
fn horario_valido() -> DateTime<Utc> {
    let dia = (Utc::now() + Duration::days(2)).date_naive();
    Utc.from_utc_datetime(&dia.and_hms_opt(14, 0, 0).unwrap())
}

#[tokio::test]
async fn test_saude() -> anyhow::Result<()> {
    let (_ambiente, app) = ambiente().await?;
    let (status, corpo) = requisitar(&app, Method::GET, "/api/v1/saude", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(corpo["status"], "ok");
    assert_eq!(corpo["banco_de_dados"], true);
    assert_eq!(corpo["ia_habilitada"], true);
    Ok(())
}

#[tokio::test]
async fn test_request_id_propagado() -> anyhow::Result<()> {
    let (_ambiente, app) = ambiente().await?;
    let resposta = app
        .oneshot(Request::builder().uri("/api/v1/saude").body(Body::empty())?)
        .await?;
    assert!(resposta.headers().contains_key("x-request-id"));
    Ok(())
}

#[tokio::test]
async fn test_cadastro_de_cidadao() -> anyhow::Result<()> {
    let (_ambiente, app) = ambiente().await?;

    let (status, criado) =
        requisitar(&app, Method::POST, "/api/v1/cidadaos", Some(cadastro("52998224725"))).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(criado["cpf"], "529.982.247-25");
    assert_eq!(criado["telefone"], "(85) 98888-7777");
    assert_eq!(criado["cep"], "60165-121");
    assert_eq!(criado["estado"], "CE");
    assert_eq!(criado["email"], "joao@exemplo.com");
    assert_eq!(criado["data_nascimento"], "1950-05-12");

    let id = criado["id"].as_str().unwrap_or_default().to_string();
    let (status, lido) = requisitar(&app, Method::GET, &format!("/api/v1/cidadaos/{id}"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lido["nome"], "João Pereira");

    // leitura do cadastro entra na trilha de auditoria
    let (_, acessos) =
        requisitar(&app, Method::GET, &format!("/api/v1/lgpd/cidadaos/{id}/acessos"), None).await?;
    let acessos = acessos.as_array().cloned().unwrap_or_default();
    assert!(acessos
        .iter()
        .any(|a| a["tipo_acao"] == "ACESSO_DADOS" && a["usuario"] == "agente01"));

    let (status, _) =
        requisitar(&app, Method::POST, "/api/v1/cidadaos", Some(cadastro("529.982.247-25"))).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn test_cadastro_invalido() -> anyhow::Result<()> {
    let (_ambiente, app) = ambiente().await?;

    let (status, corpo) =
        requisitar(&app, Method::POST, "/api/v1/cidadaos", Some(cadastro("111.111.111-11"))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(corpo["codigo"], 400);

    let mut email_ruim = cadastro("52998224725");
    email_ruim["email"] = json!("sem-arroba");
    let (status, _) = requisitar(&app, Method::POST, "/api/v1/cidadaos", Some(email_ruim)).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let mut uf_ruim = cadastro("52998224725");
    uf_ruim["estado"] = json!("XX");
    let (status, _) = requisitar(&app, Method::POST, "/api/v1/cidadaos", Some(uf_ruim)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = requisitar(
        &app,
        Method::GET,
        &format!("/api/v1/cidadaos/{}", uuid::Uuid::new_v4()),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_coleta_de_dados() -> anyhow::Result<()> {
    let (ambiente, app) = ambiente().await?;
    let estado = &ambiente.estado;
    let cidadao = cidadao_exemplo("529.982.247-25");
    cidadaos::inserir(&estado.pool, &estado.cofre, &cidadao).await?;

    let coleta = json!({
        "cidadao_id": cidadao.id,
        "pressao_arterial": "130x85",
        "frequencia_cardiaca": 78,
        "temperatura": 36.5,
        "peso": 70.0,
        "altura": 1.60,
        "sintomas_principais": "Dor de cabeça leve"
    });
    let (status, corpo) =
        requisitar(&app, Method::POST, "/api/v1/coleta-dados", Some(coleta.clone())).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(corpo["pressao_arterial"], "130/85");
    assert_eq!(corpo["classificacao_imc"], "Sobrepeso");

    let mut pressao_ruim = coleta.clone();
    pressao_ruim["pressao_arterial"] = json!("alta");
    let (status, _) = requisitar(&app, Method::POST, "/api/v1/coleta-dados", Some(pressao_ruim)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut febre_impossivel = coleta.clone();
    febre_impossivel["temperatura"] = json!(50.0);
    let (status, _) =
        requisitar(&app, Method::POST, "/api/v1/coleta-dados", Some(febre_impossivel)).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let mut sem_cadastro = coleta;
    sem_cadastro["cidadao_id"] = json!(uuid::Uuid::new_v4());
    let (status, _) = requisitar(&app, Method::POST, "/api/v1/coleta-dados", Some(sem_cadastro)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_anamnese_sem_consentimento_e_proibida() -> anyhow::Result<()> {
    let (ambiente, app) = ambiente().await?;
    let estado = &ambiente.estado;
    let cidadao = cidadao_exemplo("529.982.247-25");
    cidadaos::inserir(&estado.pool, &estado.cofre, &cidadao).await?;
    let dados = dados_exemplo(cidadao.id);
    dados_saude::inserir(&estado.pool, &dados).await?;

    for assincrono in [false, true] {
        let (status, corpo) = requisitar(
            &app,
            Method::POST,
            "/api/v1/anamneses",
            Some(json!({ "dados_saude_id": dados.id, "assincrono": assincrono })),
        )
        .await?;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(corpo["codigo"], 403);
    }
    Ok(())
}

#[tokio::test]
async fn test_agenda_de_visitas() -> anyhow::Result<()> {
    let (ambiente, app) = ambiente().await?;
    let estado = &ambiente.estado;
    let cidadao = cidadao_exemplo("529.982.247-25");
    cidadaos::inserir(&estado.pool, &estado.cofre, &cidadao).await?;
    let data = horario_valido();

    let visita = |quando: DateTime<Utc>| {
        json!({
            "cidadao_id": cidadao.id,
            "agente": "agente01",
            "data_visita": quando,
            "motivo": "acompanhamento_comorbidades"
        })
    };

    let (status, criada) = requisitar(&app, Method::POST, "/api/v1/visitas", Some(visita(data))).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(criada["status"], "agendada");
    let id = criada["id"].as_str().unwrap_or_default().to_string();

    let (status, _) = requisitar(
        &app,
        Method::POST,
        "/api/v1/visitas",
        Some(visita(data + Duration::minutes(20))),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    // 20:00 em Brasília
    let (status, _) = requisitar(
        &app,
        Method::POST,
        "/api/v1/visitas",
        Some(visita(data + Duration::hours(9))),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, confirmada) =
        requisitar(&app, Method::POST, &format!("/api/v1/visitas/{id}/confirmar"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmada["status"], "confirmada");

    // uma hora depois: sem conflito com a própria visita
    let (status, nova) = requisitar(
        &app,
        Method::POST,
        &format!("/api/v1/visitas/{id}/reagendar"),
        Some(json!({ "nova_data": data + Duration::hours(1) })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(nova["status"], "agendada");

    let (_, antiga) = requisitar(&app, Method::GET, &format!("/api/v1/visitas/{id}"), None).await?;
    assert_eq!(antiga["status"], "reagendada");

    let (status, _) =
        requisitar(&app, Method::POST, &format!("/api/v1/visitas/{id}/confirmar"), None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let nova_id = nova["id"].as_str().unwrap_or_default().to_string();
    let (status, cancelada) = requisitar(
        &app,
        Method::POST,
        &format!("/api/v1/visitas/{nova_id}/cancelar"),
        Some(json!({ "motivo": "Cidadão viajando" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelada["status"], "cancelada");
    assert!(cancelada["observacoes"]
        .as_str()
        .unwrap_or_default()
        .contains("Cidadão viajando"));
    Ok(())
}

#[tokio::test]
async fn test_consentimentos() -> anyhow::Result<()> {
    let (ambiente, app) = ambiente().await?;
    let estado = &ambiente.estado;
    let cidadao = cidadao_exemplo("529.982.247-25");
    cidadaos::inserir(&estado.pool, &estado.cofre, &cidadao).await?;
    let pedido = json!({ "cidadao_id": cidadao.id, "finalidade": "INTELIGENCIA_ARTIFICIAL" });

    let (status, _) = requisitar(
        &app,
        Method::POST,
        "/api/v1/lgpd/consentimentos/revogar",
        Some(pedido.clone()),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, concedido) =
        requisitar(&app, Method::POST, "/api/v1/lgpd/consentimentos", Some(pedido.clone())).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(concedido["consentido"], true);

    let (_, situacao) = requisitar(
        &app,
        Method::POST,
        "/api/v1/lgpd/consentimentos/verificar",
        Some(pedido.clone()),
    )
    .await?;
    assert_eq!(situacao["ativo"], true);

    let (status, _) = requisitar(
        &app,
        Method::POST,
        "/api/v1/lgpd/consentimentos/revogar",
        Some(pedido.clone()),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (_, situacao) =
        requisitar(&app, Method::POST, "/api/v1/lgpd/consentimentos/verificar", Some(pedido)).await?;
    assert_eq!(situacao["ativo"], false);

    let (_, lista) = requisitar(
        &app,
        Method::GET,
        &format!("/api/v1/lgpd/cidadaos/{}/consentimentos", cidadao.id),
        None,
    )
    .await?;
    assert_eq!(lista.as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn test_violacao_e_notificacao_anpd() -> anyhow::Result<()> {
    let (ambiente, app) = ambiente().await?;
    let estado = &ambiente.estado;
    let cidadao = cidadao_exemplo("529.982.247-25");
    cidadaos::inserir(&estado.pool, &estado.cofre, &cidadao).await?;

    let (status, violacao) = requisitar(
        &app,
        Method::POST,
        "/api/v1/lgpd/violacoes",
        Some(json!({
            "tipo_violacao": "VAZAMENTO_DADOS",
            "severidade": "ALTA",
            "descricao": "Planilha de atendimentos enviada por e-mail externo",
            "cidadaos_afetados": [cidadao.id],
            "tipos_dados_afetados": ["cpf", "telefone"]
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(violacao["deve_notificar_anpd"], true);
    assert!(violacao["horas_restantes_anpd"].as_i64().unwrap_or_default() >= 71);

    let (_, conformidade) = requisitar(&app, Method::GET, "/api/v1/lgpd/conformidade", None).await?;
    assert_eq!(conformidade["violacoes"]["pendentes_anpd"], 1);

    let id = violacao["id"].as_str().unwrap_or_default().to_string();
    let (status, notificada) = requisitar(
        &app,
        Method::POST,
        &format!("/api/v1/lgpd/violacoes/{id}/notificar-anpd"),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(notificada["anpd_notificada"], true);
    assert_eq!(notificada["deve_notificar_anpd"], false);

    let (_, acessos) = requisitar(
        &app,
        Method::GET,
        &format!("/api/v1/lgpd/cidadaos/{}/acessos", cidadao.id),
        None,
    )
    .await?;
    assert!(acessos
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .any(|a| a["tipo_acao"] == "VIOLACAO_DADOS"));
    Ok(())
}

#[tokio::test]
async fn test_relatorio_do_titular_mascarado() -> anyhow::Result<()> {
    let (ambiente, app) = ambiente().await?;
    let estado = &ambiente.estado;
    let cidadao = cidadao_exemplo("529.982.247-25");
    cidadaos::inserir(&estado.pool, &estado.cofre, &cidadao).await?;

    let (status, relatorio) = requisitar(
        &app,
        Method::GET,
        &format!("/api/v1/lgpd/cidadaos/{}/relatorio", cidadao.id),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(relatorio["cidadao"]["cpf"], "529.982.247-25");
    assert_ne!(relatorio["cidadao"]["nome"], "Maria da Silva");
    Ok(())
}

#[tokio::test]
async fn test_dashboard() -> anyhow::Result<()> {
    let (ambiente, app) = ambiente().await?;
    let estado = &ambiente.estado;
    let cidadao = cidadao_exemplo("529.982.247-25");
    cidadaos::inserir(&estado.pool, &estado.cofre, &cidadao).await?;
    dados_saude::inserir(&estado.pool, &dados_exemplo(cidadao.id)).await?;

    let (status, painel) = requisitar(&app, Method::GET, "/api/v1/dashboard", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(painel["cidadaos_ativos"], 1);
    assert_eq!(painel["cidadaos_com_coleta"], 1);
    assert_eq!(painel["anamneses_por_status"]["pendente"], 0);
    assert_eq!(painel["mapa_por_risco"]["critico"], 0);
    assert_eq!(painel["uso_ia_30_dias"]["chamadas"], 0);
    Ok(())
}
