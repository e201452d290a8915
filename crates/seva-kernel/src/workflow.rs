//! Step table and pure transition function for the multi-turn flows.
//!
//! Every non-idle [`WorkflowState`] has exactly one [`StepRule`]. [`rule`] is an
//! exhaustive match, so a state added to the contract does not compile until
//! its field, validator and successor are spelled out here.

use seva_contracts::{
    Attachments, BirthCertificate, CertificateApplication, Grievance, RecordStatus, StatusReport,
    WorkflowState,
};
use serde::{Deserialize, Serialize};

use crate::format::{
    display_id, format_inr, mask_national_id, normalize_national_id, parse_income, truncate_chars,
};
use crate::{Effect, KernelConfig, Reply, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Certificate,
    BirthCertificate,
    Grievance,
    TrackStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    CertType,
    Name,
    NationalId,
    Address,
    Income,
    ChildName,
    Dob,
    PlaceOfBirth,
    FatherName,
    MotherName,
    BirthAddress,
    Department,
    Complaint,
}

/// Record kinds a flow persists on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    Certificate,
    BirthCertificate,
    Grievance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Ask(WorkflowState),
    Submit(Form),
    FetchStatus,
}

/// Normalizes an answer, or rejects it with `None`.
pub type Validator = fn(&str) -> Option<String>;

#[derive(Debug, Clone, Copy)]
pub struct StepRule {
    pub field: Option<Field>,
    pub validate: Option<Validator>,
    pub next: Next,
}

pub fn rule(state: WorkflowState) -> Option<StepRule> {
    use WorkflowState as S;
    let (field, validate, next): (Option<Field>, Option<Validator>, Next) = match state {
        S::Idle => return None,
        S::CertType => (Some(Field::CertType), None, Next::Ask(S::CertName)),
        S::CertName => (Some(Field::Name), None, Next::Ask(S::CertNationalId)),
        S::CertNationalId => (
            Some(Field::NationalId),
            Some(normalize_national_id as Validator),
            Next::Ask(S::CertAddress),
        ),
        S::CertAddress => (Some(Field::Address), None, Next::Ask(S::CertIncome)),
        S::CertIncome => (Some(Field::Income), None, Next::Submit(Form::Certificate)),
        S::BirthChildName => (Some(Field::ChildName), None, Next::Ask(S::BirthDob)),
        S::BirthDob => (Some(Field::Dob), None, Next::Ask(S::BirthPlace)),
        S::BirthPlace => (Some(Field::PlaceOfBirth), None, Next::Ask(S::BirthFather)),
        S::BirthFather => (Some(Field::FatherName), None, Next::Ask(S::BirthMother)),
        S::BirthMother => (Some(Field::MotherName), None, Next::Ask(S::BirthAddress)),
        S::BirthAddress => (
            Some(Field::BirthAddress),
            None,
            Next::Submit(Form::BirthCertificate),
        ),
        S::GrievDept => (Some(Field::Department), None, Next::Ask(S::GrievComplaint)),
        S::GrievComplaint => (Some(Field::Complaint), None, Next::Submit(Form::Grievance)),
        S::TrackStatus => (None, None, Next::FetchStatus),
    };
    Some(StepRule {
        field,
        validate,
        next,
    })
}

impl Flow {
    pub fn as_str(self) -> &'static str {
        match self {
            Flow::Certificate => "certificate",
            Flow::BirthCertificate => "birth_certificate",
            Flow::Grievance => "grievance",
            Flow::TrackStatus => "track_status",
        }
    }
}

/// The flow a state belongs to; `None` while idle.
pub fn flow_of(state: WorkflowState) -> Option<Flow> {
    use WorkflowState as S;
    match state {
        S::Idle => None,
        S::CertType | S::CertName | S::CertNationalId | S::CertAddress | S::CertIncome => {
            Some(Flow::Certificate)
        }
        S::BirthChildName
        | S::BirthDob
        | S::BirthPlace
        | S::BirthFather
        | S::BirthMother
        | S::BirthAddress => Some(Flow::BirthCertificate),
        S::GrievDept | S::GrievComplaint => Some(Flow::Grievance),
        S::TrackStatus => Some(Flow::TrackStatus),
    }
}

/// Partial form accumulated across a flow, plus the identifiers of the most
/// recent records that escalation acts on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowData {
    pub cert_type: Option<String>,
    pub name: Option<String>,
    pub national_id: Option<String>,
    pub address: Option<String>,
    pub income: Option<String>,
    pub child_name: Option<String>,
    pub dob: Option<String>,
    pub place_of_birth: Option<String>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub birth_address: Option<String>,
    pub department: Option<String>,
    pub complaint: Option<String>,
    pub last_application_id: Option<String>,
    pub last_grievance_id: Option<String>,
}

impl WorkflowData {
    pub fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::CertType => &mut self.cert_type,
            Field::Name => &mut self.name,
            Field::NationalId => &mut self.national_id,
            Field::Address => &mut self.address,
            Field::Income => &mut self.income,
            Field::ChildName => &mut self.child_name,
            Field::Dob => &mut self.dob,
            Field::PlaceOfBirth => &mut self.place_of_birth,
            Field::FatherName => &mut self.father_name,
            Field::MotherName => &mut self.mother_name,
            Field::BirthAddress => &mut self.birth_address,
            Field::Department => &mut self.department,
            Field::Complaint => &mut self.complaint,
        };
        *slot = Some(value);
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::CertType => self.cert_type.as_deref(),
            Field::Name => self.name.as_deref(),
            Field::NationalId => self.national_id.as_deref(),
            Field::Address => self.address.as_deref(),
            Field::Income => self.income.as_deref(),
            Field::ChildName => self.child_name.as_deref(),
            Field::Dob => self.dob.as_deref(),
            Field::PlaceOfBirth => self.place_of_birth.as_deref(),
            Field::FatherName => self.father_name.as_deref(),
            Field::MotherName => self.mother_name.as_deref(),
            Field::BirthAddress => self.birth_address.as_deref(),
            Field::Department => self.department.as_deref(),
            Field::Complaint => self.complaint.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == WorkflowData::default()
    }

    /// Form fields dropped, escalation handles kept. Used when a new flow starts.
    pub fn fresh_form(&self) -> WorkflowData {
        WorkflowData {
            last_application_id: self.last_application_id.clone(),
            last_grievance_id: self.last_grievance_id.clone(),
            ..WorkflowData::default()
        }
    }

    fn text(&self, field: Field) -> String {
        self.get(field).unwrap_or_default().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDraft {
    pub cert_type: String,
    pub name: String,
    pub national_id: String,
    pub address: String,
    pub income: String,
    pub declared_income: u64,
    pub threshold: u64,
}

impl CertificateDraft {
    pub fn approved(&self) -> bool {
        self.declared_income < self.threshold
    }

    pub fn status(&self) -> RecordStatus {
        if self.approved() {
            RecordStatus::Approved
        } else {
            RecordStatus::Rejected
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BirthDraft {
    pub child_name: String,
    pub dob: String,
    pub place_of_birth: String,
    pub father_name: String,
    pub mother_name: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrievanceDraft {
    pub department: String,
    pub complaint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Certificate(CertificateDraft),
    BirthCertificate(BirthDraft),
    Grievance(GrievanceDraft),
}

impl Submission {
    pub fn kind(&self) -> &'static str {
        match self {
            Submission::Certificate(_) => "certificate_application",
            Submission::BirthCertificate(_) => "birth_certificate",
            Submission::Grievance(_) => "grievance",
        }
    }
}

/// Consumes one answer for the current step. `None` means the session is idle
/// and the caller should classify the utterance instead.
pub fn advance(
    state: WorkflowState,
    data: &WorkflowData,
    input: &str,
    cfg: &KernelConfig,
) -> Option<Transition> {
    let rule = rule(state)?;

    let value = match rule.validate {
        Some(validate) => match validate(input) {
            Some(normalized) => normalized,
            None => {
                return Some(Transition {
                    state,
                    data: data.clone(),
                    effects: vec![Effect::Reply(Reply::localized(reprompt(state)))],
                });
            }
        },
        None => input.to_string(),
    };

    let mut next_data = data.clone();
    if let Some(field) = rule.field {
        next_data.set(field, value.clone());
    }

    Some(match rule.next {
        Next::Ask(next) => Transition {
            state: next,
            data: next_data,
            effects: vec![Effect::Reply(Reply::localized(question(next, &value)))],
        },
        Next::FetchStatus => Transition {
            state: WorkflowState::Idle,
            data: next_data,
            effects: vec![Effect::FetchStatus],
        },
        Next::Submit(form) => Transition {
            state: WorkflowState::Idle,
            data: WorkflowData::default(),
            effects: vec![Effect::Submit(submission(form, &next_data, cfg))],
        },
    })
}

fn submission(form: Form, data: &WorkflowData, cfg: &KernelConfig) -> Submission {
    match form {
        Form::Certificate => {
            let cert_type = data.text(Field::CertType);
            let income = data.text(Field::Income);
            Submission::Certificate(CertificateDraft {
                cert_type: if cert_type.trim().is_empty() {
                    "Income Certificate".to_string()
                } else {
                    cert_type
                },
                name: data.text(Field::Name),
                national_id: data.text(Field::NationalId),
                address: data.text(Field::Address),
                declared_income: parse_income(&income),
                income,
                threshold: cfg.income_threshold,
            })
        }
        Form::BirthCertificate => Submission::BirthCertificate(BirthDraft {
            child_name: data.text(Field::ChildName),
            dob: data.text(Field::Dob),
            place_of_birth: data.text(Field::PlaceOfBirth),
            father_name: data.text(Field::FatherName),
            mother_name: data.text(Field::MotherName),
            address: data.text(Field::BirthAddress),
        }),
        Form::Grievance => {
            let department = data.text(Field::Department);
            Submission::Grievance(GrievanceDraft {
                department: if department.trim().is_empty() {
                    "General".to_string()
                } else {
                    department
                },
                complaint: data.text(Field::Complaint),
            })
        }
    }
}

fn reprompt(state: WorkflowState) -> String {
    match state {
        WorkflowState::CertNationalId => "⚠️ I'm sorry, that doesn't appear to be a valid Aadhaar number. Please enter all 12 digits without spaces or dashes.".to_string(),
        _ => "⚠️ I couldn't use that answer. Please try again.".to_string(),
    }
}

/// The question asked on entering `state`, given the answer that led there.
fn question(state: WorkflowState, previous_answer: &str) -> String {
    use WorkflowState as S;
    match state {
        S::CertName => format!(
            "Sure, I will assist you with your **{previous_answer}** application.\n\nStep 1 of 4 — Please provide your **full name** as per government records."
        ),
        S::CertNationalId => format!(
            "Thank you, {previous_answer}.\n\nStep 2 of 4 — Please provide your **12-digit Aadhaar number**."
        ),
        S::CertAddress => "Step 3 of 4 — Please provide your **complete residential address** including district and PIN code.".to_string(),
        S::CertIncome => "Step 4 of 4 — Please provide your **total annual household income** (in INR).".to_string(),
        S::BirthDob => "Thank you. Step 2 of 6 — Please provide the **Date of Birth** (DD/MM/YYYY or YYYY-MM-DD).".to_string(),
        S::BirthPlace => "Step 3 of 6 — Please provide the **Place of Birth** (hospital name and city).".to_string(),
        S::BirthFather => "Step 4 of 6 — Please provide the **Father's full name**.".to_string(),
        S::BirthMother => "Step 5 of 6 — Please provide the **Mother's full name**.".to_string(),
        S::BirthAddress => "Step 6 of 6 — Please provide the **family's current residential address**.".to_string(),
        S::GrievComplaint => "I understand. Step 2 of 2 — Please describe your **grievance in detail**: what happened, when it occurred, and what resolution you seek.".to_string(),
        S::Idle
        | S::CertType
        | S::BirthChildName
        | S::GrievDept
        | S::TrackStatus => String::new(),
    }
}

/// Completion message and post-flow data for a submission. `stored_id` is the
/// identifier the store assigned, or `None` if persisting failed.
pub fn complete_submission(submission: &Submission, stored_id: Option<&str>) -> Transition {
    let Some(id) = stored_id else {
        let apology = match submission {
            Submission::Certificate(_) => {
                "⚠️ There was a technical issue saving your application. Please try again."
            }
            Submission::BirthCertificate(_) => "⚠️ Could not save the application. Please try again.",
            Submission::Grievance(_) => "⚠️ Failed to file grievance. Please try again.",
        };
        return Transition {
            state: WorkflowState::Idle,
            data: WorkflowData::default(),
            effects: vec![Effect::Reply(Reply::verbatim(apology))],
        };
    };

    let mut data = WorkflowData::default();
    let reply = match submission {
        Submission::Certificate(draft) => {
            data.last_application_id = Some(id.to_string());
            Reply::localized(certificate_summary(draft)).with_attachments(Attachments::record(id))
        }
        Submission::BirthCertificate(draft) => {
            Reply::verbatim(birth_summary(draft)).with_attachments(Attachments::record(display_id(id)))
        }
        Submission::Grievance(draft) => {
            data.last_grievance_id = Some(id.to_string());
            Reply::verbatim(grievance_summary(draft))
                .with_attachments(Attachments::record(display_id(id)))
        }
    };

    Transition {
        state: WorkflowState::Idle,
        data,
        effects: vec![Effect::Reply(reply)],
    }
}

fn certificate_summary(draft: &CertificateDraft) -> String {
    let income = format_inr(draft.declared_income);
    let threshold = format_inr(draft.threshold);
    let (status, explanation) = if draft.approved() {
        (
            "Approved ✅",
            format!(
                "📌 **Approval Reason:** Your {} is approved because your declared annual income (₹{income}) is below the ₹{threshold} threshold.",
                draft.cert_type
            ),
        )
    } else {
        (
            "Rejected ❌",
            format!(
                "📌 **Rejection Reason:** Your declared income (₹{income}) exceeds the ₹{threshold} eligibility limit for this certificate. You may appeal this decision by typing **\"I disagree\"**."
            ),
        )
    };
    format!(
        "✅ **Application Submitted!**\n\nDetails registered:\n• Name: {}\n• Aadhaar: {}\n• Address: {}\n• Annual Income: ₹{}\n• Status: **{status}**\n\n{explanation}",
        draft.name,
        mask_national_id(&draft.national_id),
        draft.address,
        draft.income,
    )
}

fn birth_summary(draft: &BirthDraft) -> String {
    format!(
        "✅ **Birth Certificate Application — Approved!**\n\nYour Birth Certificate application has been submitted and approved.\n\n• Child Name: {}\n• Date of Birth: {}\n• Place of Birth: {}\n• Father: {}\n• Mother: {}\n• Address: {}\n\nThe Birth Certificate has been registered in the government database.",
        draft.child_name,
        draft.dob,
        draft.place_of_birth,
        draft.father_name,
        draft.mother_name,
        draft.address,
    )
}

fn grievance_summary(draft: &GrievanceDraft) -> String {
    format!(
        "✅ **Grievance Registered Successfully!**\n\nYour grievance has been filed with the concerned department.\n\n• Department: {}\n• Complaint: {}\n• Status: **Submitted**\n\nYour complaint will be reviewed within 5–7 working days. You may escalate by typing **\"Talk to officer\"** if needed.",
        draft.department,
        truncate_chars(&draft.complaint, 100),
    )
}

pub fn status_summary(report: &StatusReport) -> Reply {
    if report.is_empty() {
        return Reply::localized(
            "📂 No applications found for your account yet.\n\nYou can apply for:\n• Income Certificate\n• Birth Certificate\n• File a Grievance\n\nType any of the above to get started!",
        );
    }

    let mut text = String::from("📊 **Your Application Status Summary**\n\n");
    for app in &report.applications {
        text.push_str(&application_line(app));
    }
    for birth in &report.birth_certificates {
        text.push_str(&birth_line(birth));
    }
    for grievance in &report.grievances {
        text.push_str(&grievance_line(grievance));
    }
    Reply::verbatim(text.trim_end())
}

pub fn status_unavailable() -> Reply {
    Reply::verbatim("⚠️ Unable to retrieve status. Please try again.")
}

fn application_line(app: &CertificateApplication) -> String {
    let mark = match app.status {
        RecordStatus::Approved => "✅",
        RecordStatus::Escalated => "🚨",
        RecordStatus::Rejected => "❌",
        _ => "⏳",
    };
    format!(
        "{mark} **{}** — {}\n   ID: {}\n\n",
        app.cert_type,
        app.status.as_str(),
        app.app_id
    )
}

fn birth_line(birth: &BirthCertificate) -> String {
    let mark = if birth.status == RecordStatus::Escalated {
        "🚨"
    } else {
        "✅"
    };
    format!(
        "{mark} **Birth Certificate** ({}) — {}\n   ID: {}\n\n",
        birth.child_name,
        birth.status.as_str(),
        display_id(&birth.id)
    )
}

fn grievance_line(grievance: &Grievance) -> String {
    let mark = if grievance.status == RecordStatus::Escalated {
        "🚨"
    } else {
        "📋"
    };
    format!(
        "{mark} **Grievance** ({}) — {}\n   ID: {}\n\n",
        grievance.department,
        grievance.status.as_str(),
        display_id(&grievance.id)
    )
}
