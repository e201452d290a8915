use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const API_VERSION: &str = "1.0.0";

#[derive(Debug, Clone)]
pub struct SchemaManifest {
    pub name: &'static str,
    pub sha256: &'static str,
    pub body: &'static str,
}

#[derive(Debug, Clone)]
pub struct ContractsManifest {
    pub openapi_sha256: &'static str,
    pub schema_set_sha256: &'static str,
    pub built_at: &'static str,
    pub schemas: Vec<SchemaManifest>,
}

include!(concat!(env!("OUT_DIR"), "/schemas.rs"));

pub fn contracts_manifest() -> ContractsManifest {
    ContractsManifest {
        openapi_sha256: OPENAPI_SHA256,
        schema_set_sha256: SCHEMA_SET_SHA256,
        built_at: BUILT_AT,
        schemas: SCHEMA_FILES
            .iter()
            .map(|(name, sha256, body)| SchemaManifest { name, sha256, body })
            .collect(),
    }
}

/// Position of a session inside one of the multi-turn flows.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    Idle,
    CertType,
    CertName,
    CertNationalId,
    CertAddress,
    CertIncome,
    BirthChildName,
    BirthDob,
    BirthPlace,
    BirthFather,
    BirthMother,
    BirthAddress,
    GrievDept,
    GrievComplaint,
    TrackStatus,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 15] = [
        WorkflowState::Idle,
        WorkflowState::CertType,
        WorkflowState::CertName,
        WorkflowState::CertNationalId,
        WorkflowState::CertAddress,
        WorkflowState::CertIncome,
        WorkflowState::BirthChildName,
        WorkflowState::BirthDob,
        WorkflowState::BirthPlace,
        WorkflowState::BirthFather,
        WorkflowState::BirthMother,
        WorkflowState::BirthAddress,
        WorkflowState::GrievDept,
        WorkflowState::GrievComplaint,
        WorkflowState::TrackStatus,
    ];

    pub fn is_idle(self) -> bool {
        self == WorkflowState::Idle
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::CertType => "cert_type",
            WorkflowState::CertName => "cert_name",
            WorkflowState::CertNationalId => "cert_national_id",
            WorkflowState::CertAddress => "cert_address",
            WorkflowState::CertIncome => "cert_income",
            WorkflowState::BirthChildName => "birth_child_name",
            WorkflowState::BirthDob => "birth_dob",
            WorkflowState::BirthPlace => "birth_place",
            WorkflowState::BirthFather => "birth_father",
            WorkflowState::BirthMother => "birth_mother",
            WorkflowState::BirthAddress => "birth_address",
            WorkflowState::GrievDept => "griev_dept",
            WorkflowState::GrievComplaint => "griev_complaint",
            WorkflowState::TrackStatus => "track_status",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Hi,
    Mr,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hi => "hi",
            Language::Mr => "mr",
        }
    }

    pub fn is_english(self) -> bool {
        self == Language::En
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme_name: Option<String>,
}

impl Attachments {
    pub fn record(id: impl Into<String>) -> Self {
        Self {
            record_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.document_url.is_none() && self.record_id.is_none() && self.scheme_name.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Attachments::is_empty")]
    pub attachments: Attachments,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RecordStatus {
    Pending,
    Approved,
    Rejected,
    Submitted,
    Escalated,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Pending => "Pending",
            RecordStatus::Approved => "Approved",
            RecordStatus::Rejected => "Rejected",
            RecordStatus::Submitted => "Submitted",
            RecordStatus::Escalated => "Escalated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Pending" => Some(RecordStatus::Pending),
            "Approved" => Some(RecordStatus::Approved),
            "Rejected" => Some(RecordStatus::Rejected),
            "Submitted" => Some(RecordStatus::Submitted),
            "Escalated" => Some(RecordStatus::Escalated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicantDetails {
    pub name: String,
    pub national_id: String,
    pub address: String,
    pub income: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateApplication {
    pub app_id: String,
    pub user_id: String,
    pub cert_type: String,
    pub status: RecordStatus,
    pub details: ApplicantDetails,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BirthCertificate {
    pub id: String,
    pub user_id: String,
    pub child_name: String,
    pub dob: String,
    pub place_of_birth: String,
    pub father_name: String,
    pub mother_name: String,
    pub address: String,
    pub status: RecordStatus,
    pub escalated: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Grievance {
    pub id: String,
    pub user_id: String,
    pub department: String,
    pub complaint: String,
    pub status: RecordStatus,
    pub escalated: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusReport {
    pub applications: Vec<CertificateApplication>,
    pub birth_certificates: Vec<BirthCertificate>,
    pub grievances: Vec<Grievance>,
}

impl StatusReport {
    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
            && self.birth_certificates.is_empty()
            && self.grievances.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemeDetails {
    pub name: String,
    #[serde(default)]
    pub launch_year: Option<String>,
    #[serde(default)]
    pub ministry: Option<String>,
    pub description: String,
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(default)]
    pub eligibility: Vec<String>,
    #[serde(default)]
    pub documents_required: Vec<String>,
    #[serde(default)]
    pub application_process: Vec<String>,
    #[serde(default)]
    pub official_link: Option<String>,
    #[serde(default)]
    pub budget_allocation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemeReport {
    pub id: String,
    pub user_id: String,
    pub scheme_name: String,
    pub body: String,
    pub created_at: String,
}

/// Listing entry for a generated report; the body is fetched from `document_url`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentSummary {
    pub id: String,
    pub scheme_name: String,
    pub document_url: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
}

/// Body posted to the remote assistant. The `task` tag selects the operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum AssistantRequest {
    Classify {
        history: Vec<HistoryEntry>,
        message: String,
        language: Language,
    },
    Translate {
        text: String,
        language: Language,
    },
    SchemeDetails {
        scheme_name: String,
        language: Language,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifierReply {
    pub intent: String,
    pub response: String,
    #[serde(default)]
    pub scheme_name: Option<String>,
    #[serde(default)]
    pub action_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationReply {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSessionRequest {
    pub user_id: String,
    #[serde(default)]
    pub language: Option<Language>,
    #[serde(default)]
    pub citizen_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TurnRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LanguageRequest {
    pub language: Language,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub user_id: String,
    pub language: Language,
    pub state: WorkflowState,
    pub transcript: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub session_id: String,
    pub state: WorkflowState,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuickAction {
    pub key: String,
    pub label: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsMetadata {
    pub api_version: String,
    pub openapi_sha256: String,
    pub schema_set_sha256: String,
    pub built_at: String,
    pub schemas: BTreeMap<String, String>,
}
