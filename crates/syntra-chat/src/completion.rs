use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use syntra_types::models::Role;
use tracing::debug;

use crate::session::{HistoryEntry, MAX_HISTORY, Sender};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: String,
    pub content: String,
}

impl CompletionMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// A chat-completion service.
///
/// `Ok(None)` means the service answered without any choices.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, messages: Vec<CompletionMessage>) -> Result<Option<String>>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [CompletionMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

/// OpenAI-compatible `chat/completions` client.
pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn complete(&self, messages: Vec<CompletionMessage>) -> Result<Option<String>> {
        let body = CompletionRequest {
            model: &self.model,
            messages: &messages,
        };

        let resp: CompletionResponse = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("completion request failed")?
            .error_for_status()?
            .json()
            .await
            .context("malformed completion response")?;

        debug!("Completion returned {} choices", resp.choices.len());
        Ok(resp
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string()))
    }
}

fn persona(role: Role) -> &'static str {
    match role {
        Role::Citizen => {
            "Eres SyntraBot, un asistente amable que ayuda a los ciudadanos a reportar fallas en semáforos, consultar el mapa y revisar sus reportes."
        }
        Role::Agent => {
            "Eres SyntraBot, un asistente experto en apoyo al personal de tránsito. Ayudas a revisar reportes, actualizar estados y consultar estadísticas."
        }
    }
}

const APP_CONTEXT: &[&str] = &[
    "Contexto de la app: Syntra es un proyecto universitario para reportes de semáforos.",
    "Pantallas clave: Reportes, Historial, Mapa, Perfil, Feedback (solo usuario), Estadísticas (solo tránsito).",
    "Reglas: Usuario y Agente pueden crear/ver reportes. Usuario NO edita/borra/actualiza estado; Tránsito sí.",
    "Guía de estilo: respuestas cortas, claras, accionables y en español neutro.",
];

/// Build the request for an unmatched message: a system prompt carrying the
/// role persona, the app context and the most recent history, then the
/// user's text.
pub fn build_prompt(role: Role, history: &[HistoryEntry], user_text: &str) -> Vec<CompletionMessage> {
    let mut system = String::from(persona(role));
    system.push('\n');
    for line in APP_CONTEXT {
        system.push_str(line);
        system.push('\n');
    }

    let recent = &history[history.len().saturating_sub(MAX_HISTORY)..];
    if !recent.is_empty() {
        system.push_str("\nHistorial reciente:\n");
        for entry in recent {
            let speaker = match entry.sender {
                Sender::User => "Usuario",
                Sender::Bot => "SyntraBot",
            };
            system.push_str(&format!("{}: {}\n", speaker, entry.message));
        }
    }
    system.push_str("\nResponde como SyntraBot.");

    vec![
        CompletionMessage::system(system),
        CompletionMessage::user(user_text),
    ]
}
