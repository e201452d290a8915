use async_trait::async_trait;
use reqwest::Client;
use seva_config::Config;
use seva_contracts::{
    AssistantRequest, ClassifierReply, HistoryEntry, Language, SchemeDetails, TranslationReply,
};
use seva_kernel::intent::{parse_reply, parse_scheme_details};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("assistant endpoint is not configured")]
    Unconfigured,
    #[error("assistant request failed: {0}")]
    Transport(String),
    #[error("assistant returned HTTP {0}")]
    Status(u16),
    #[error("assistant reply could not be decoded: {0}")]
    Decode(String),
}

/// The external text service: intent classification, translation of fixed
/// prompts and scheme detail enrichment.
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn classify(
        &self,
        history: &[HistoryEntry],
        message: &str,
        language: Language,
    ) -> Result<ClassifierReply, AssistantError>;

    async fn translate(&self, text: &str, language: Language) -> Result<String, AssistantError>;

    async fn scheme_details(
        &self,
        scheme_name: &str,
        language: Language,
    ) -> Result<Option<SchemeDetails>, AssistantError>;
}

pub fn from_config(cfg: &Config) -> Result<Box<dyn Assistant>, AssistantError> {
    match cfg.assistant.mode.as_str() {
        "http" => {
            let endpoint = cfg
                .assistant
                .endpoint
                .clone()
                .filter(|e| !e.trim().is_empty())
                .ok_or(AssistantError::Unconfigured)?;
            let api_key = cfg
                .assistant
                .api_key_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok())
                .filter(|key| !key.is_empty());
            Ok(Box::new(HttpAssistant::new(endpoint, api_key)))
        }
        _ => Ok(Box::new(BuiltinAssistant)),
    }
}

/// Offline keyword classifier. Translation is the identity and no scheme
/// enrichment is available, so reports use the static content.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinAssistant;

impl BuiltinAssistant {
    pub fn classify_text(message: &str) -> ClassifierReply {
        let lower = message.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        let (intent, response, scheme_name) = if has(&["complaint", "grievance"]) {
            ("file_complaint", "I can help you file a grievance.".to_string(), None)
        } else if has(&["status", "track"]) {
            (
                "track_status",
                "Let me check the status of your applications.".to_string(),
                None,
            )
        } else if has(&["certificate", "apply"]) {
            (
                "apply_certificate",
                "I can help you apply for a certificate.".to_string(),
                None,
            )
        } else if has(&["scheme", "yojana"]) {
            let name = scheme_name_from(message);
            (
                "scheme_info",
                format!(
                    "Here is what I know about {}.",
                    name.as_deref().unwrap_or("this scheme")
                ),
                name,
            )
        } else if has(&["help"]) {
            (
                "help",
                "I can help you apply for income and birth certificates, file grievances, track your applications and learn about government schemes.".to_string(),
                None,
            )
        } else {
            (
                "general_chat",
                "I am here to assist you with government services. How can I help you today?"
                    .to_string(),
                None,
            )
        };
        ClassifierReply {
            intent: intent.to_string(),
            response,
            scheme_name,
            action_required: intent != "general_chat" && intent != "help",
        }
    }
}

/// "Tell me about PMAY scheme" gives "PMAY".
fn scheme_name_from(message: &str) -> Option<String> {
    let lower = message.to_ascii_lowercase();
    let start = lower.find("about ").map(|i| i + "about ".len())?;
    let mut name = message[start..]
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim_end();
    for suffix in [" scheme", " yojana"] {
        if name.to_ascii_lowercase().ends_with(suffix) {
            name = &name[..name.len() - suffix.len()];
        }
    }
    let name = name.trim();
    if name.is_empty() || name.eq_ignore_ascii_case("scheme") || name.eq_ignore_ascii_case("yojana")
    {
        None
    } else {
        Some(name.to_string())
    }
}

#[async_trait]
impl Assistant for BuiltinAssistant {
    async fn classify(
        &self,
        _history: &[HistoryEntry],
        message: &str,
        _language: Language,
    ) -> Result<ClassifierReply, AssistantError> {
        Ok(Self::classify_text(message))
    }

    async fn translate(&self, text: &str, _language: Language) -> Result<String, AssistantError> {
        Ok(text.to_string())
    }

    async fn scheme_details(
        &self,
        _scheme_name: &str,
        _language: Language,
    ) -> Result<Option<SchemeDetails>, AssistantError> {
        Ok(None)
    }
}

/// JSON over HTTP. Every call posts an [`AssistantRequest`] to one endpoint;
/// the `task` tag selects the operation.
pub struct HttpAssistant {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpAssistant {
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self {
            endpoint,
            api_key,
            client: Client::new(),
        }
    }

    async fn post(&self, request: &AssistantRequest) -> Result<String, AssistantError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| AssistantError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AssistantError::Status(response.status().as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| AssistantError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Assistant for HttpAssistant {
    async fn classify(
        &self,
        history: &[HistoryEntry],
        message: &str,
        language: Language,
    ) -> Result<ClassifierReply, AssistantError> {
        let body = self
            .post(&AssistantRequest::Classify {
                history: history.to_vec(),
                message: message.to_string(),
                language,
            })
            .await?;
        Ok(parse_reply(&body))
    }

    async fn translate(&self, text: &str, language: Language) -> Result<String, AssistantError> {
        if language.is_english() {
            return Ok(text.to_string());
        }
        let body = self
            .post(&AssistantRequest::Translate {
                text: text.to_string(),
                language,
            })
            .await?;
        let reply: TranslationReply =
            serde_json::from_str(&body).map_err(|e| AssistantError::Decode(e.to_string()))?;
        Ok(reply.text)
    }

    async fn scheme_details(
        &self,
        scheme_name: &str,
        language: Language,
    ) -> Result<Option<SchemeDetails>, AssistantError> {
        let body = self
            .post(&AssistantRequest::SchemeDetails {
                scheme_name: scheme_name.to_string(),
                language,
            })
            .await?;
        Ok(parse_scheme_details(&body))
    }
}
