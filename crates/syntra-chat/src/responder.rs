use std::sync::Arc;

use syntra_types::models::{ChatMessage, Role};
use tracing::{debug, warn};

use crate::completion::{CompletionBackend, build_prompt};
use crate::rules::{match_rule, normalize};
use crate::session::{Sender, SessionStore};

pub const NOT_UNDERSTOOD: &str = "No entendí tu mensaje 😅, ¿podrías reformularlo?";
pub const BACKEND_UNAVAILABLE: &str =
    "No pude conectar con el servidor de IA 🤖. Intentémoslo de nuevo más tarde.";

/// Answers chat messages: rules first, completion backend otherwise.
pub struct ChatResponder {
    sessions: Arc<dyn SessionStore>,
    completion: Option<Arc<dyn CompletionBackend>>,
}

impl ChatResponder {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        completion: Option<Arc<dyn CompletionBackend>>,
    ) -> Self {
        Self {
            sessions,
            completion,
        }
    }

    pub fn welcome(role: Role) -> ChatMessage {
        match role {
            Role::Citizen => ChatMessage::bot(
                "👋 ¡Hola! Soy SyntraBot. Puedo ayudarte a **reportar fallas**, **consultar el mapa**, **ver tu historial** o dejar un **feedback**.",
            ),
            Role::Agent => ChatMessage::bot(
                "👮 ¡Hola, agente! Soy SyntraBot. Puedo asistirte en **revisar reportes**, **actualizar estados** o consultar **estadísticas**.",
            ),
        }
    }

    pub async fn respond(&self, key: &str, role: Role, text: &str) -> ChatMessage {
        let normalized = normalize(text);
        self.sessions.append(key, Sender::User, &normalized);

        if let Some(rule) = match_rule(&normalized) {
            debug!("Chat rule {} matched for {}", rule.name, key);
            return rule.respond(role);
        }

        let Some(backend) = &self.completion else {
            debug!("No completion backend configured");
            return ChatMessage::bot(BACKEND_UNAVAILABLE);
        };

        // History already ends with the message being answered
        let history = self.sessions.history(key);
        match backend.complete(build_prompt(role, &history, text)).await {
            Ok(Some(reply)) if !reply.is_empty() => {
                self.sessions.append(key, Sender::Bot, &reply);
                ChatMessage::bot(reply)
            }
            Ok(_) => {
                self.sessions.append(key, Sender::Bot, NOT_UNDERSTOOD);
                ChatMessage::bot(NOT_UNDERSTOOD)
            }
            Err(e) => {
                warn!("Completion failed: {:#}", e);
                ChatMessage::bot(BACKEND_UNAVAILABLE)
            }
        }
    }

    pub fn history(&self, key: &str) -> Vec<crate::session::HistoryEntry> {
        self.sessions.history(key)
    }

    pub fn clear(&self, key: &str) {
        self.sessions.clear(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionMessage;
    use crate::session::MemorySessionStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeBackend {
        reply: Option<String>,
        seen: Mutex<Vec<Vec<CompletionMessage>>>,
    }

    #[async_trait]
    impl CompletionBackend for FakeBackend {
        async fn complete(&self, messages: Vec<CompletionMessage>) -> anyhow::Result<Option<String>> {
            self.seen.lock().unwrap().push(messages);
            Ok(self.reply.clone())
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl CompletionBackend for FailingBackend {
        async fn complete(&self, _: Vec<CompletionMessage>) -> anyhow::Result<Option<String>> {
            anyhow::bail!("connection refused")
        }
    }

    fn responder(backend: Option<Arc<dyn CompletionBackend>>) -> ChatResponder {
        ChatResponder::new(Arc::new(MemorySessionStore::new()), backend)
    }

    #[tokio::test]
    async fn rule_reply_skips_the_backend() {
        let fake = Arc::new(FakeBackend {
            reply: Some("nunca".into()),
            seen: Mutex::new(Vec::new()),
        });
        let bot = responder(Some(fake.clone() as Arc<dyn CompletionBackend>));

        let reply = bot.respond("u1", Role::Citizen, "Quiero hacer un reporte").await;
        assert_eq!(reply.actions.len(), 2);
        assert!(fake.seen.lock().unwrap().is_empty());

        let history = bot.history("u1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message, "quiero hacer un reporte");
    }

    #[tokio::test]
    async fn unmatched_message_goes_to_the_backend() {
        let fake = Arc::new(FakeBackend {
            reply: Some("Respuesta generada".into()),
            seen: Mutex::new(Vec::new()),
        });
        let bot = responder(Some(fake.clone() as Arc<dyn CompletionBackend>));

        bot.respond("u1", Role::Citizen, "hola").await;
        let reply = bot.respond("u1", Role::Citizen, "cuál es el clima").await;
        assert_eq!(reply.text, "Respuesta generada");
        assert!(reply.actions.is_empty());

        let seen = fake.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0][0].content.contains("Usuario: hola"));
        assert!(seen[0][0].content.ends_with("Usuario: cuál es el clima\n\nResponde como SyntraBot."));
        assert_eq!(seen[0][1].content, "cuál es el clima");

        let history = bot.history("u1");
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].sender, Sender::Bot);
    }

    #[tokio::test]
    async fn empty_choices_ask_to_rephrase() {
        let bot = responder(Some(Arc::new(FakeBackend {
            reply: None,
            seen: Mutex::new(Vec::new()),
        })));
        let reply = bot.respond("u1", Role::Agent, "xyz").await;
        assert_eq!(reply.text, NOT_UNDERSTOOD);
    }

    #[tokio::test]
    async fn failures_and_missing_backend_apologise() {
        let bot = responder(Some(Arc::new(FailingBackend)));
        assert_eq!(bot.respond("u1", Role::Agent, "xyz").await.text, BACKEND_UNAVAILABLE);

        let bot = responder(None);
        assert_eq!(bot.respond("u1", Role::Agent, "xyz").await.text, BACKEND_UNAVAILABLE);
    }

    #[tokio::test]
    async fn history_is_capped_and_clearable() {
        let bot = responder(None);
        for _ in 0..15 {
            bot.respond("u1", Role::Citizen, "hola").await;
        }
        assert_eq!(bot.history("u1").len(), crate::MAX_HISTORY);

        bot.clear("u1");
        assert!(bot.history("u1").is_empty());
    }

    #[test]
    fn welcome_depends_on_role() {
        assert!(ChatResponder::welcome(Role::Agent).text.contains("agente"));
        assert!(ChatResponder::welcome(Role::Citizen).text.contains("feedback"));
    }
}
