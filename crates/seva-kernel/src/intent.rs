//! Maps a classifier reply on an idle session to the next move: start a flow,
//! run the status lookup, produce a scheme report, or relay the reply text.

use seva_contracts::{Attachments, ClassifierReply, QuickAction, SchemeDetails, WorkflowState};
use serde_json::Value;

use crate::workflow::WorkflowData;
use crate::{Effect, Reply, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    ApplyCertificate,
    FileComplaint,
    TrackStatus,
    SchemeInfo,
    SwitchLanguage,
    Help,
    GeneralChat,
    CollectInfo,
    Unknown,
}

impl Intent {
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "apply_certificate" => Intent::ApplyCertificate,
            "file_complaint" => Intent::FileComplaint,
            "track_status" => Intent::TrackStatus,
            "scheme_info" => Intent::SchemeInfo,
            "switch_language" => Intent::SwitchLanguage,
            "help" => Intent::Help,
            "general_chat" => Intent::GeneralChat,
            "collect_info" => Intent::CollectInfo,
            _ => Intent::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Certificate { intro: String },
    BirthCertificate,
    Grievance,
    TrackStatus { intro: String },
    SchemeReport { scheme_name: String, intro: String },
    Relay(String),
}

pub fn route_intent(reply: &ClassifierReply, utterance: &str) -> Entry {
    match Intent::from_label(&reply.intent) {
        Intent::ApplyCertificate if utterance.to_lowercase().contains("birth") => {
            Entry::BirthCertificate
        }
        Intent::ApplyCertificate => Entry::Certificate {
            intro: reply.response.clone(),
        },
        Intent::FileComplaint => Entry::Grievance,
        Intent::TrackStatus => Entry::TrackStatus {
            intro: reply.response.clone(),
        },
        Intent::SchemeInfo => Entry::SchemeReport {
            scheme_name: reply
                .scheme_name
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(utterance)
                .to_string(),
            intro: reply.response.clone(),
        },
        Intent::SwitchLanguage
        | Intent::Help
        | Intent::GeneralChat
        | Intent::CollectInfo
        | Intent::Unknown => Entry::Relay(reply.response.clone()),
    }
}

/// Applies an entry to an idle session. Starting a flow drops any stale form
/// fields but keeps the escalation handles.
pub fn begin(entry: Entry, data: &WorkflowData) -> Transition {
    match entry {
        Entry::Certificate { intro } => Transition {
            state: WorkflowState::CertType,
            data: data.fresh_form(),
            effects: vec![Effect::Reply(Reply::localized(format!(
                "{intro}\n\nStep 1 — Which certificate do you need?\n\n• Income Certificate\n• Birth Certificate\n• Caste Certificate\n• Residence Certificate\n\nPlease type the certificate name."
            )))],
        },
        Entry::BirthCertificate => Transition {
            state: WorkflowState::BirthChildName,
            data: data.fresh_form(),
            effects: vec![Effect::Reply(Reply::localized(
                "Sure, I will assist you with the **Birth Certificate** application.\n\nStep 1 of 6 — Please provide the **child's full name**.",
            ))],
        },
        Entry::Grievance => Transition {
            state: WorkflowState::GrievDept,
            data: data.fresh_form(),
            effects: vec![Effect::Reply(Reply::localized(
                "I understand you'd like to file a grievance. I'm here to help.\n\nStep 1 of 2 — Please tell me which **government department** your grievance is against:\n\n• Water Supply Department\n• Road & Infrastructure\n• Electricity Board\n• Municipal Corporation\n• Ration / PDS Office\n• Revenue Department\n• Other (please specify)",
            ))],
        },
        Entry::TrackStatus { intro } => Transition {
            state: WorkflowState::TrackStatus,
            data: data.clone(),
            effects: vec![Effect::Reply(Reply::verbatim(format!(
                "{intro}\n\nI will fetch all your applications and grievances."
            )))],
        },
        Entry::SchemeReport { scheme_name, intro } => Transition {
            state: WorkflowState::Idle,
            data: data.clone(),
            effects: vec![
                Effect::Reply(Reply::verbatim(format!(
                    "{intro}\n\n⏳ Generating a detailed report for **{scheme_name}**..."
                ))),
                Effect::GenerateReport { scheme_name },
            ],
        },
        Entry::Relay(text) => Transition {
            state: WorkflowState::Idle,
            data: data.clone(),
            effects: vec![Effect::Reply(Reply::verbatim(text))],
        },
    }
}

/// Reply for a finished scheme report. `document_url` is `None` if generation failed.
pub fn report_reply(scheme_name: &str, document_url: Option<&str>) -> Reply {
    match document_url {
        Some(url) => Reply::verbatim(format!(
            "✅ **{scheme_name}** report generated!\n\nIncludes: Overview · Benefits · Eligibility · Documents · Application steps · Official links\n\nUse the link below to download it."
        ))
        .with_attachments(Attachments {
            document_url: Some(url.to_string()),
            scheme_name: Some(scheme_name.to_string()),
            record_id: None,
        }),
        None => Reply::verbatim("⚠️ Could not generate the scheme report. Please try again later."),
    }
}

pub fn connection_issue(detail: &str) -> Reply {
    Reply::verbatim(format!(
        "⚠️ Connection issue: {detail}\n\nPlease try again in a moment."
    ))
}

const DEFAULT_RESPONSE: &str = "I am here to help you with government services.";
const FALLBACK_RESPONSE: &str =
    "I am here to assist you with government services. How can I help you today?";

/// Reads the classifier's JSON reply. Accepts a fenced code block, and falls
/// back to `general_chat` carrying the raw text when no JSON object is found.
pub fn parse_reply(raw: &str) -> ClassifierReply {
    let body = fenced_body(raw).unwrap_or(raw).trim();
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => ClassifierReply {
            intent: non_empty_str(map.get("intent"))
                .unwrap_or("general_chat")
                .to_string(),
            response: non_empty_str(map.get("response"))
                .unwrap_or(DEFAULT_RESPONSE)
                .to_string(),
            scheme_name: non_empty_str(map.get("scheme_name")).map(str::to_string),
            action_required: map
                .get("action_required")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
        _ => {
            let text = strip_fences(raw);
            ClassifierReply {
                intent: "general_chat".to_string(),
                response: if text.is_empty() {
                    FALLBACK_RESPONSE.to_string()
                } else {
                    text
                },
                scheme_name: None,
                action_required: false,
            }
        }
    }
}

/// Accepts either a bare details object or one wrapped as `{"scheme_details": {...}}`.
pub fn parse_scheme_details(raw: &str) -> Option<SchemeDetails> {
    let body = fenced_body(raw).unwrap_or(raw).trim();
    let value: Value = serde_json::from_str(body).ok()?;
    let details = value.get("scheme_details").cloned().unwrap_or(value);
    serde_json::from_value(details).ok()
}

fn fenced_body(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let rest = &text[start + 3..];
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

fn strip_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

const QUICK_ACTIONS: &[(&str, &str, &str)] = &[
    (
        "income_certificate",
        "📋 Income Certificate",
        "I want to apply for an income certificate",
    ),
    ("birth_certificate", "👶 Birth Certificate", "Apply birth certificate"),
    ("file_grievance", "🗣️ File Grievance", "I want to file a complaint"),
    ("track_status", "🔍 Track Status", "Check my status"),
    ("pmay_scheme", "🏠 PMAY Scheme", "Tell me about PMAY scheme"),
    (
        "ayushman_bharat",
        "🏥 Ayushman Bharat",
        "Tell me about Ayushman Bharat scheme",
    ),
];

pub fn quick_actions() -> Vec<QuickAction> {
    QUICK_ACTIONS
        .iter()
        .map(|(key, label, prompt)| QuickAction {
            key: key.to_string(),
            label: label.to_string(),
            prompt: prompt.to_string(),
        })
        .collect()
}

pub fn quick_action(key: &str) -> Option<QuickAction> {
    quick_actions().into_iter().find(|a| a.key == key)
}
