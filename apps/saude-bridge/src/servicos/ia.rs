//! Cliente do modelo de linguagem
//!
//! `ProvedorIa` isola a chamada HTTP para que o fluxo de anamnese possa ser
//! testado sem rede. `ClienteChatCompletions` fala com qualquer servidor
//! compatível com `POST {base}/chat/completions`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::ConfigIa;

#[derive(Error, Debug)]
pub enum ErroIa {
    #[error("Chave da API de IA não configurada")]
    ChaveAusente,

    #[error("Falha na requisição à IA: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IA respondeu com status {status}: {corpo}")]
    Status { status: u16, corpo: String },

    #[error("Resposta da IA sem conteúdo")]
    RespostaVazia,
}

impl ErroIa {
    /// Limite de taxa, indisponibilidade e falhas de rede
    pub fn transitorio(&self) -> bool {
        match self {
            ErroIa::Http(erro) => !erro.is_decode(),
            ErroIa::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            ErroIa::ChaveAusente | ErroIa::RespostaVazia => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequisicaoIa {
    pub modelo: String,
    pub prompt_sistema: String,
    pub prompt_usuario: String,
    pub temperatura: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RespostaIa {
    pub texto: String,
    pub tokens_utilizados: Option<u32>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProvedorIa: Send + Sync {
    /// Modelo usado quando a requisição não pede outro
    fn modelo(&self) -> String;

    async fn completar(&self, requisicao: &RequisicaoIa) -> Result<RespostaIa, ErroIa>;
}

#[derive(Serialize)]
struct Mensagem<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CorpoChat<'a> {
    model: &'a str,
    messages: [Mensagem<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct RespostaChat {
    #[serde(default)]
    choices: Vec<Escolha>,
    usage: Option<Uso>,
}

#[derive(Deserialize)]
struct Escolha {
    message: MensagemResposta,
}

#[derive(Deserialize)]
struct MensagemResposta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Uso {
    total_tokens: Option<u32>,
}

pub struct ClienteChatCompletions {
    cliente: Client,
    base_url: String,
    api_key: Option<String>,
    modelo: String,
}

impl ClienteChatCompletions {
    pub fn new(cliente: Client, config: &ConfigIa) -> Self {
        Self {
            cliente,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            modelo: config.modelo.clone(),
        }
    }
}

#[async_trait]
impl ProvedorIa for ClienteChatCompletions {
    fn modelo(&self) -> String {
        self.modelo.clone()
    }

    async fn completar(&self, requisicao: &RequisicaoIa) -> Result<RespostaIa, ErroIa> {
        let chave = self.api_key.as_deref().ok_or(ErroIa::ChaveAusente)?;
        let corpo = CorpoChat {
            model: &requisicao.modelo,
            messages: [
                Mensagem {
                    role: "system",
                    content: &requisicao.prompt_sistema,
                },
                Mensagem {
                    role: "user",
                    content: &requisicao.prompt_usuario,
                },
            ],
            temperature: requisicao.temperatura,
            max_tokens: requisicao.max_tokens,
        };

        debug!(modelo = %requisicao.modelo, "Enviando requisição à IA");
        let resposta = self
            .cliente
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(chave)
            .json(&corpo)
            .send()
            .await?;

        let status = resposta.status();
        if !status.is_success() {
            let corpo = resposta.text().await.unwrap_or_default();
            return Err(ErroIa::Status {
                status: status.as_u16(),
                corpo: corpo.chars().take(500).collect(),
            });
        }

        let chat: RespostaChat = resposta.json().await?;
        let texto = chat
            .choices
            .into_iter()
            .next()
            .and_then(|escolha| escolha.message.content)
            .filter(|texto| !texto.trim().is_empty())
            .ok_or(ErroIa::RespostaVazia)?;

        Ok(RespostaIa {
            texto,
            tokens_utilizados: chat.usage.and_then(|uso| uso.total_tokens),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cliente(servidor: &MockServer, chave: Option<&str>) -> ClienteChatCompletions {
        ClienteChatCompletions::new(
            Client::new(),
            &ConfigIa {
                api_key: chave.map(str::to_string),
                base_url: servidor.uri(),
                modelo: "gpt-3.5-turbo".to_string(),
                timeout: Duration::from_secs(5),
            },
        )
    }

    fn requisicao() -> RequisicaoIa {
        RequisicaoIa {
            modelo: "gpt-3.5-turbo".to_string(),
            prompt_sistema: "sistema".to_string(),
            prompt_usuario: "usuário".to_string(),
            temperatura: 0.3,
            max_tokens: 1500,
        }
    }

    #[tokio::test]
    async fn test_chat_completions() {
        let servidor = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-teste"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 1500,
                "messages": [{"role": "system"}, {"role": "user", "content": "usuário"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"triagem_risco\": \"alto\"}"}}],
                "usage": {"prompt_tokens": 300, "completion_tokens": 120, "total_tokens": 420}
            })))
            .expect(1)
            .mount(&servidor)
            .await;

        let resposta = cliente(&servidor, Some("sk-teste")).completar(&requisicao()).await.unwrap();
        assert_eq!(resposta.texto, "{\"triagem_risco\": \"alto\"}");
        assert_eq!(resposta.tokens_utilizados, Some(420));
    }

    #[tokio::test]
    async fn test_status_de_erro() {
        let servidor = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limit"))
            .mount(&servidor)
            .await;

        let erro = cliente(&servidor, Some("sk")).completar(&requisicao()).await.unwrap_err();
        assert!(matches!(erro, ErroIa::Status { status: 429, .. }));
        assert!(erro.transitorio());
    }

    #[tokio::test]
    async fn test_sem_chave_nao_chama() {
        let servidor = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&servidor)
            .await;

        let erro = cliente(&servidor, None).completar(&requisicao()).await.unwrap_err();
        assert!(matches!(erro, ErroIa::ChaveAusente));
        assert!(!erro.transitorio());
    }

    #[tokio::test]
    async fn test_resposta_sem_conteudo() {
        let servidor = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&servidor)
            .await;

        let erro = cliente(&servidor, Some("sk")).completar(&requisicao()).await.unwrap_err();
        assert!(matches!(erro, ErroIa::RespostaVazia));
    }
}
