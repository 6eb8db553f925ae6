//! Geocodificação por CEP: ViaCEP para o endereço, Nominatim para as
//! coordenadas e dispersão aleatória para não sobrepor marcadores.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use saude_core::geo::{
    adicionar_jitter, Coordenadas, RAIO_JITTER_CEP_METROS, RAIO_JITTER_CIDADE_METROS,
};
use saude_core::modelos::{Cidadao, LocalizacaoSaude};
use saude_core::CalculadorRisco;
use serde::Deserialize;
use serde_json::Value;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ConfigGeo;
use crate::servicos::{risco, ErroServico};
use saude_db::repositorio::{cidadaos, localizacoes};

#[derive(Error, Debug)]
pub enum ErroGeocodificacao {
    #[error("Falha na requisição de geocodificação: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Resposta de geocodificação inválida: {0}")]
    RespostaInvalida(String),
}

impl ErroGeocodificacao {
    /// Falhas de rede, 5xx e 429; os demais status e respostas malformadas
    /// se repetiriam numa nova tentativa
    pub fn transitorio(&self) -> bool {
        match self {
            ErroGeocodificacao::Http(erro) => match erro.status() {
                Some(status) => status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
                None => !erro.is_decode(),
            },
            ErroGeocodificacao::RespostaInvalida(_) => false,
        }
    }
}

/// Endereço devolvido pelo ViaCEP
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnderecoCep {
    pub cep: String,
    pub logradouro: String,
    pub complemento: String,
    pub bairro: String,
    #[serde(rename = "localidade")]
    pub cidade: String,
    #[serde(rename = "uf")]
    pub estado: String,
    pub ibge: String,
}

impl EnderecoCep {
    /// Consultas do mais específico ao mais genérico, sem repetições
    pub fn consultas(&self) -> Vec<String> {
        let montar = |partes: &[&str]| {
            partes
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .chain(std::iter::once("Brasil"))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut consultas = Vec::with_capacity(3);
        for consulta in [
            montar(&[&self.logradouro, &self.bairro, &self.cidade, &self.estado]),
            montar(&[&self.bairro, &self.cidade, &self.estado]),
            montar(&[&self.cidade, &self.estado]),
        ] {
            if consulta != "Brasil" && !consultas.contains(&consulta) {
                consultas.push(consulta);
            }
        }
        consultas
    }

    pub fn endereco_completo(&self) -> String {
        let local = [self.logradouro.as_str(), self.bairro.as_str()]
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        if local.is_empty() {
            format!("{}/{}", self.cidade, self.estado)
        } else {
            format!("{}, {}/{}", local, self.cidade, self.estado)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResultadoNominatim {
    lat: String,
    lon: String,
}

/// Resultado completo de `geocodificar_por_cep`
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodificacaoCep {
    pub endereco: EnderecoCep,
    /// Já com a dispersão aplicada
    pub coordenadas: Coordenadas,
    pub original: Coordenadas,
}

pub struct ServicoGeocodificacao {
    cliente: Client,
    viacep_url: String,
    nominatim_url: String,
    pausa: Duration,
    user_agent: String,
}

impl ServicoGeocodificacao {
    pub fn new(cliente: Client, config: &ConfigGeo) -> Self {
        Self {
            cliente,
            viacep_url: config.viacep_url.clone(),
            nominatim_url: config.nominatim_url.clone(),
            pausa: config.pausa,
            user_agent: config.user_agent.clone(),
        }
    }

    /// `Ok(None)` para CEP inválido (sem requisição) ou inexistente
    pub async fn buscar_endereco_por_cep(
        &self,
        cep: &str,
    ) -> Result<Option<EnderecoCep>, ErroGeocodificacao> {
        let digitos: String = cep.chars().filter(char::is_ascii_digit).collect();
        if digitos.len() != 8 || cep.chars().any(|c| !c.is_ascii_digit() && !"-. ".contains(c)) {
            warn!(cep, "CEP inválido; geocodificação ignorada");
            return Ok(None);
        }

        let url = format!("{}/ws/{}/json/", self.viacep_url, digitos);
        debug!(%url, "Consultando ViaCEP");
        let corpo: Value = self
            .cliente
            .get(&url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // o ViaCEP responde {"erro": true} (às vezes "true") para CEP inexistente
        let inexistente = match corpo.get("erro") {
            Some(Value::Bool(erro)) => *erro,
            Some(Value::String(erro)) => erro == "true",
            _ => false,
        };
        if inexistente {
            warn!(cep = %digitos, "CEP não encontrado");
            return Ok(None);
        }

        let endereco: EnderecoCep = serde_json::from_value(corpo)
            .map_err(|e| ErroGeocodificacao::RespostaInvalida(e.to_string()))?;
        info!(cep = %digitos, cidade = %endereco.cidade, uf = %endereco.estado, "Endereço encontrado");
        Ok(Some(endereco))
    }

    /// Tenta as consultas em ordem, com pausa entre elas
    pub async fn geocodificar_endereco(
        &self,
        endereco: &EnderecoCep,
    ) -> Result<Option<Coordenadas>, ErroGeocodificacao> {
        let url = format!("{}/search", self.nominatim_url);

        for (tentativa, consulta) in endereco.consultas().iter().enumerate() {
            if tentativa > 0 && !self.pausa.is_zero() {
                tokio::time::sleep(self.pausa).await;
            }
            debug!(%consulta, "Geocodificando");

            let resultados: Vec<ResultadoNominatim> = self
                .cliente
                .get(&url)
                .query(&[
                    ("q", consulta.as_str()),
                    ("format", "json"),
                    ("limit", "1"),
                    ("countrycodes", "BR"),
                    ("addressdetails", "1"),
                ])
                .header(reqwest::header::USER_AGENT, &self.user_agent)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            if let Some(primeiro) = resultados.first() {
                let latitude: f64 = primeiro
                    .lat
                    .parse()
                    .map_err(|_| ErroGeocodificacao::RespostaInvalida(primeiro.lat.clone()))?;
                let longitude: f64 = primeiro
                    .lon
                    .parse()
                    .map_err(|_| ErroGeocodificacao::RespostaInvalida(primeiro.lon.clone()))?;
                info!(%consulta, latitude, longitude, "Coordenadas encontradas");
                return Ok(Some(Coordenadas::new(latitude, longitude)));
            }
        }

        warn!(cidade = %endereco.cidade, uf = %endereco.estado, "Coordenadas não encontradas");
        Ok(None)
    }

    /// CEP → endereço → coordenadas → dispersão de até 800 m
    pub async fn geocodificar_por_cep(
        &self,
        cep: &str,
    ) -> Result<Option<GeocodificacaoCep>, ErroGeocodificacao> {
        let Some(endereco) = self.buscar_endereco_por_cep(cep).await? else {
            return Ok(None);
        };
        let Some(original) = self.geocodificar_endereco(&endereco).await? else {
            return Ok(None);
        };
        let coordenadas = adicionar_jitter(original, RAIO_JITTER_CEP_METROS, &mut rand::thread_rng());
        Ok(Some(GeocodificacaoCep {
            endereco,
            coordenadas,
            original,
        }))
    }
}

fn ou<'a>(preferido: &'a str, alternativa: &'a str) -> &'a str {
    if preferido.trim().is_empty() {
        alternativa
    } else {
        preferido
    }
}

/// Falha do ViaCEP ou do Nominatim aqui não interrompe o fluxo: a cidade
/// ainda pode localizar o cidadão.
async fn geocodificar_cep_do_cadastro(
    geo: &ServicoGeocodificacao,
    cidadao: &Cidadao,
) -> Option<GeocodificacaoCep> {
    let cep = cidadao.cep.trim();
    if cep.is_empty() {
        return None;
    }
    match geo.geocodificar_por_cep(cep).await {
        Ok(resultado) => resultado,
        Err(erro) => {
            warn!(cidadao_id = %cidadao.id, error = %erro, "Falha ao geocodificar por CEP; tentando a cidade");
            None
        }
    }
}

/// Cria o ponto do mapa de um cidadão que ainda não tem um. Usa as
/// coordenadas do cadastro quando existem, senão o CEP e, por último, a
/// cidade.
pub async fn processar_cidadao_sem_localizacao(
    pool: &SqlitePool,
    geo: &ServicoGeocodificacao,
    calculador: &CalculadorRisco,
    cidadao: &Cidadao,
    agora: DateTime<Utc>,
) -> Result<Option<LocalizacaoSaude>, ErroServico> {
    if localizacoes::do_cidadao(pool, cidadao.id).await?.is_some() {
        debug!(cidadao_id = %cidadao.id, "Cidadão já possui localização");
        return Ok(None);
    }

    let resultado = risco::calcular_risco_cidadao(pool, calculador, cidadao, agora.date_naive()).await?;
    info!(
        cidadao_id = %cidadao.id,
        nivel = %resultado.nivel,
        pontuacao = resultado.pontuacao,
        "Risco calculado para o mapa"
    );

    let do_cadastro = EnderecoCep {
        cep: cidadao.cep.clone(),
        logradouro: String::new(),
        bairro: cidadao.bairro.clone(),
        cidade: cidadao.cidade.clone(),
        estado: cidadao.estado.clone(),
        ..Default::default()
    };

    let (endereco, coordenadas, geocodificado) = if let Some((lat, lng)) = cidadao.coordenadas() {
        (do_cadastro, Coordenadas::new(lat, lng), false)
    } else if let Some(por_cep) = geocodificar_cep_do_cadastro(geo, cidadao).await {
        (por_cep.endereco, por_cep.coordenadas, true)
    } else if !cidadao.cidade.is_empty() && !cidadao.estado.is_empty() {
        let Some(centro) = geo.geocodificar_endereco(&do_cadastro).await? else {
            warn!(cidadao_id = %cidadao.id, "Não foi possível geocodificar o cidadão");
            return Ok(None);
        };
        let disperso = adicionar_jitter(centro, RAIO_JITTER_CIDADE_METROS, &mut rand::thread_rng());
        (do_cadastro, disperso, true)
    } else {
        warn!(cidadao_id = %cidadao.id, "Cidadão sem CEP nem cidade para geocodificar");
        return Ok(None);
    };

    let localizacao = LocalizacaoSaude {
        id: Uuid::new_v4(),
        cidadao_id: cidadao.id,
        dados_saude_id: None,
        anamnese_id: resultado.anamnese_id,
        latitude: coordenadas.latitude,
        longitude: coordenadas.longitude,
        endereco_completo: endereco.endereco_completo(),
        bairro: ou(&endereco.bairro, &cidadao.bairro).to_string(),
        cidade: ou(&endereco.cidade, &cidadao.cidade).to_string(),
        estado: ou(&endereco.estado, &cidadao.estado).to_string(),
        cep: ou(&endereco.cep, &cidadao.cep).to_string(),
        nivel_risco: resultado.nivel,
        pontuacao_risco: resultado.pontuacao_inteira(),
        criado_em: agora,
        atualizado_em: agora,
        ativo: true,
    };
    localizacoes::gravar(pool, &localizacao).await?;
    if geocodificado {
        cidadaos::atualizar_coordenadas(pool, cidadao.id, coordenadas.latitude, coordenadas.longitude, agora)
            .await?;
    }

    info!(
        cidadao_id = %cidadao.id,
        localizacao_id = %localizacao.id,
        nivel = %localizacao.nivel_risco,
        "Localização de saúde criada"
    );
    Ok(Some(localizacao))
}

#[cfg(test)]
mod tests {
    use super::*;
    use saude_db::testes::{banco_temporario, cidadao_exemplo};
    use serde_json::json;
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn servico(servidor: &MockServer) -> ServicoGeocodificacao {
        ServicoGeocodificacao::new(
            Client::new(),
            &ConfigGeo {
                viacep_url: servidor.uri(),
                nominatim_url: servidor.uri(),
                pausa: Duration::ZERO,
                user_agent: "teste/1.0".to_string(),
                timeout: Duration::from_secs(5),
            },
        )
    }

    fn viacep_fortaleza() -> Value {
        json!({
            "cep": "60110-000",
            "logradouro": "Avenida Duque de Caxias",
            "complemento": "",
            "bairro": "Centro",
            "localidade": "Fortaleza",
            "uf": "CE",
            "ibge": "2304400"
        })
    }

    #[test]
    fn test_consultas_sem_partes_vazias() {
        let endereco = EnderecoCep {
            cidade: "Fortaleza".to_string(),
            estado: "CE".to_string(),
            ..Default::default()
        };
        assert_eq!(endereco.consultas(), vec!["Fortaleza, CE, Brasil".to_string()]);
        assert_eq!(endereco.endereco_completo(), "Fortaleza/CE");
    }

    #[tokio::test]
    async fn test_cep_invalido_nao_faz_requisicao() {
        let servidor = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&servidor)
            .await;

        let servico = servico(&servidor);
        assert_eq!(servico.buscar_endereco_por_cep("1234").await.unwrap(), None);
        assert_eq!(servico.buscar_endereco_por_cep("60110-00a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cep_inexistente() {
        let servidor = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ws/99999999/json/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"erro": true})))
            .mount(&servidor)
            .await;

        assert_eq!(servico(&servidor).buscar_endereco_por_cep("99999-999").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_geocodificar_por_cep_com_recuo() {
        let servidor = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ws/60110000/json/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(viacep_fortaleza()))
            .mount(&servidor)
            .await;
        // a consulta com logradouro não encontra nada
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Avenida Duque de Caxias, Centro, Fortaleza, CE, Brasil"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&servidor)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Centro, Fortaleza, CE, Brasil"))
            .and(query_param("countrycodes", "BR"))
            .and(query_param("limit", "1"))
            .and(header_exists("user-agent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"lat": "-3.7319", "lon": "-38.5267"}])),
            )
            .expect(1)
            .mount(&servidor)
            .await;

        let resultado = servico(&servidor)
            .geocodificar_por_cep("60110-000")
            .await
            .unwrap()
            .expect("geocodificado");
        assert_eq!(resultado.endereco.cidade, "Fortaleza");
        assert_eq!(resultado.original, Coordenadas::new(-3.7319, -38.5267));
        assert!(resultado.coordenadas.distancia_metros(&resultado.original) <= RAIO_JITTER_CEP_METROS + 1.0);
    }

    #[tokio::test]
    async fn test_erro_http_propagado() {
        let servidor = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&servidor)
            .await;

        let erro = servico(&servidor).buscar_endereco_por_cep("60110000").await;
        assert!(matches!(erro, Err(ErroGeocodificacao::Http(_))));
        assert!(erro.is_err_and(|e| e.transitorio()));
    }

    #[tokio::test]
    async fn test_erros_definitivos_nao_sao_transitorios() {
        let servidor = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ws/60110000/json/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&servidor)
            .await;
        Mock::given(method("GET"))
            .and(path("/ws/60120000/json/"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&servidor)
            .await;

        let servico = servico(&servidor);
        let nao_encontrado = servico.buscar_endereco_por_cep("60110000").await.unwrap_err();
        assert!(!nao_encontrado.transitorio());
        assert!(!ErroServico::from(nao_encontrado).transitorio());

        let limite = servico.buscar_endereco_por_cep("60120000").await.unwrap_err();
        assert!(ErroServico::from(limite).transitorio());

        assert!(!ErroGeocodificacao::RespostaInvalida("abc".to_string()).transitorio());
    }

    #[tokio::test]
    async fn test_processar_cidadao_sem_localizacao() -> anyhow::Result<()> {
        let servidor = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ws/60110000/json/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(viacep_fortaleza()))
            .mount(&servidor)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"lat": "-3.7319", "lon": "-38.5267"}])),
            )
            .mount(&servidor)
            .await;

        let banco = banco_temporario().await?;
        let cidadao = cidadao_exemplo("529.982.247-25");
        cidadaos::inserir(&banco.pool, &banco.cofre, &cidadao).await?;

        let geo = servico(&servidor);
        let calculador = CalculadorRisco::new();
        let criada = processar_cidadao_sem_localizacao(&banco.pool, &geo, &calculador, &cidadao, Utc::now())
            .await?
            .expect("localização criada");
        assert_eq!(criada.cidade, "Fortaleza");
        assert_eq!(criada.endereco_completo, "Avenida Duque de Caxias, Centro, Fortaleza/CE");

        let relido = cidadaos::buscar(&banco.pool, &banco.cofre, cidadao.id).await?;
        assert!(relido.tem_localizacao());
        assert!(relido.endereco_capturado_automaticamente);

        // segunda chamada não recria
        let novamente =
            processar_cidadao_sem_localizacao(&banco.pool, &geo, &calculador, &relido, Utc::now()).await?;
        assert!(novamente.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_viacep_fora_do_ar_usa_a_cidade() -> anyhow::Result<()> {
        let servidor = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ws/60110000/json/"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&servidor)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Fortaleza, CE, Brasil"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"lat": "-3.7319", "lon": "-38.5267"}])),
            )
            .expect(1)
            .mount(&servidor)
            .await;

        let banco = banco_temporario().await?;
        let mut cidadao = cidadao_exemplo("529.982.247-25");
        cidadao.cep = "60110-000".to_string();
        cidadao.bairro = String::new();
        cidadao.cidade = "Fortaleza".to_string();
        cidadao.estado = "CE".to_string();
        cidadaos::inserir(&banco.pool, &banco.cofre, &cidadao).await?;

        let criada = processar_cidadao_sem_localizacao(
            &banco.pool,
            &servico(&servidor),
            &CalculadorRisco::new(),
            &cidadao,
            Utc::now(),
        )
        .await?
        .expect("localização pela cidade");
        assert_eq!(criada.cidade, "Fortaleza");
        assert_eq!(criada.endereco_completo, "Fortaleza/CE");
        let centro = Coordenadas::new(-3.7319, -38.5267);
        let ponto = Coordenadas::new(criada.latitude, criada.longitude);
        assert!(ponto.distancia_metros(&centro) <= RAIO_JITTER_CIDADE_METROS + 1.0);
        assert!(localizacoes::do_cidadao(&banco.pool, cidadao.id).await?.is_some());
        Ok(())
    }
}
