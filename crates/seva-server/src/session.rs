//! Sessions and the turn driver that interprets kernel effects.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use seva_config::Config;
use seva_contracts::{Language, Message, RecordStatus, Role, SessionView, WorkflowState};
use seva_kernel::intent::{connection_issue, report_reply};
use seva_kernel::workflow::{flow_of, status_unavailable, Flow, Submission};
use seva_kernel::{
    advance, status_summary, Conversation, Effect, EscalationTarget, Kernel, KernelConfig, Reply,
    Step,
};
use tokio::sync::{Mutex, RwLock};

use crate::assistant::Assistant;
use crate::documents::{document_url, generate_report, ReportRequest};
use crate::store::{RecordService, StoreError};

fn now() -> String {
    Utc::now().to_rfc3339()
}

pub struct Session {
    pub id: String,
    pub user_id: String,
    pub citizen_email: Option<String>,
    pub language: Language,
    pub conversation: Conversation,
}

impl Session {
    pub fn new(user_id: &str, language: Language, citizen_email: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            citizen_email,
            language,
            conversation: Conversation::new(&now()),
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            session_id: self.id.clone(),
            user_id: self.user_id.clone(),
            language: self.language,
            state: self.conversation.state,
            transcript: self.conversation.transcript.messages().to_vec(),
        }
    }

    pub fn clear(&mut self) {
        self.conversation.clear(&now());
    }

    fn citizen(&self) -> &str {
        self.citizen_email.as_deref().unwrap_or(&self.user_id)
    }
}

/// In-memory session registry. Each session has its own lock, held for a whole turn.
#[derive(Default)]
pub struct Sessions {
    inner: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl Sessions {
    pub async fn insert(&self, session: Session) -> Arc<Mutex<Session>> {
        let id = session.id.clone();
        let handle = Arc::new(Mutex::new(session));
        self.inner.write().await.insert(id, handle.clone());
        handle
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        self.inner.read().await.get(id).cloned()
    }

    /// Drops the session from the registry. A turn already holding its lock finishes normally.
    pub async fn remove(&self, id: &str) -> bool {
        self.inner.write().await.remove(id).is_some()
    }
}

pub struct Driver {
    kernel: Kernel,
    store: Arc<dyn RecordService>,
    assistant: Arc<dyn Assistant>,
    escalation_delay: Duration,
    enrichment_timeout: Duration,
}

impl Driver {
    pub fn new(
        kernel: Kernel,
        store: Arc<dyn RecordService>,
        assistant: Arc<dyn Assistant>,
        escalation_delay: Duration,
        enrichment_timeout: Duration,
    ) -> Self {
        Self {
            kernel,
            store,
            assistant,
            escalation_delay,
            enrichment_timeout,
        }
    }

    pub fn from_config(
        cfg: &Config,
        store: Arc<dyn RecordService>,
        assistant: Arc<dyn Assistant>,
    ) -> Self {
        Self::new(
            Kernel::new(KernelConfig {
                income_threshold: cfg.workflow.income_threshold,
                escalation_phrases: cfg.workflow.escalation_phrases.clone(),
            }),
            store,
            assistant,
            Duration::from_millis(cfg.workflow.escalation_delay_ms),
            Duration::from_millis(cfg.documents.enrichment_timeout_ms),
        )
    }

    pub fn store(&self) -> &dyn RecordService {
        self.store.as_ref()
    }

    /// Runs one user turn and returns the messages it appended, user message first.
    pub async fn handle_turn(&self, session: &mut Session, text: &str) -> Vec<Message> {
        let start = session.conversation.transcript.len();
        let history = session.conversation.transcript.history();
        let before = session.conversation.state;
        session
            .conversation
            .transcript
            .append(Role::User, text, Default::default(), &now());

        let step = self.kernel.on_utterance(
            session.conversation.state,
            &session.conversation.data,
            text,
        );
        match step {
            Step::Intercepted { by, transition } => {
                tracing::info!(session_id = %session.id, interceptor = by, "turn intercepted");
                session.conversation.enter(&transition);
                self.run_effects(session, transition.effects).await;
            }
            Step::Advanced(transition) => {
                session.conversation.enter(&transition);
                self.run_effects(session, transition.effects).await;
            }
            Step::Classify => self.classify_and_begin(session, &history, text).await,
        }

        let after = session.conversation.state;
        tracing::info!(
            session_id = %session.id,
            flow = flow_of(before).or(flow_of(after)).map_or("none", Flow::as_str),
            from = before.as_str(),
            to = after.as_str(),
            "turn handled"
        );
        session.conversation.transcript.since(start).to_vec()
    }

    async fn classify_and_begin(
        &self,
        session: &mut Session,
        history: &[seva_contracts::HistoryEntry],
        text: &str,
    ) {
        let reply = match self.assistant.classify(history, text, session.language).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(session_id = %session.id, error = %err, "classification failed");
                self.emit(session, connection_issue(&err.to_string())).await;
                return;
            }
        };
        tracing::debug!(session_id = %session.id, intent = %reply.intent, "classified");

        let transition = self
            .kernel
            .on_classified(&reply, text, &session.conversation.data);
        session.conversation.enter(&transition);
        self.run_effects(session, transition.effects).await;

        // Track-status has no question to answer; its step runs in the same turn.
        if session.conversation.state == WorkflowState::TrackStatus {
            if let Some(next) = advance(
                WorkflowState::TrackStatus,
                &session.conversation.data,
                text,
                self.kernel.config(),
            ) {
                session.conversation.enter(&next);
                self.run_effects(session, next.effects).await;
            }
        }
    }

    async fn run_effects(&self, session: &mut Session, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Reply(reply) => self.emit(session, reply).await,
                Effect::Submit(submission) => {
                    let stored = self.persist(&session.user_id, &submission).await;
                    let stored_id = match stored {
                        Ok(id) => {
                            tracing::info!(
                                session_id = %session.id,
                                kind = submission.kind(),
                                record_id = %id,
                                "record persisted"
                            );
                            Some(id)
                        }
                        Err(err) => {
                            tracing::error!(
                                session_id = %session.id,
                                kind = submission.kind(),
                                error = %err,
                                "record persistence failed"
                            );
                            None
                        }
                    };
                    let done = self.kernel.on_submitted(&submission, stored_id.as_deref());
                    session.conversation.enter(&done);
                    for follow_up in done.effects.into_iter().rev() {
                        queue.push_front(follow_up);
                    }
                }
                Effect::FetchStatus => {
                    let reply = match self.store.status_report(&session.user_id).await {
                        Ok(report) => status_summary(&report),
                        Err(err) => {
                            tracing::warn!(session_id = %session.id, error = %err, "status lookup failed");
                            status_unavailable()
                        }
                    };
                    self.emit(session, reply).await;
                }
                Effect::Escalate(target) => {
                    self.escalate(&session.id, &target).await;
                    tokio::time::sleep(self.escalation_delay).await;
                }
                Effect::GenerateReport { scheme_name } => {
                    let generated = generate_report(
                        self.store.as_ref(),
                        self.assistant.as_ref(),
                        ReportRequest {
                            user_id: &session.user_id,
                            citizen: session.citizen(),
                            scheme_name: &scheme_name,
                            language: session.language,
                        },
                        self.enrichment_timeout,
                    )
                    .await;
                    let reply = match generated {
                        Ok(report) => report_reply(&scheme_name, Some(&document_url(&report.id))),
                        Err(err) => {
                            tracing::warn!(session_id = %session.id, scheme = %scheme_name, error = %err, "report generation failed");
                            report_reply(&scheme_name, None)
                        }
                    };
                    self.emit(session, reply).await;
                }
            }
        }
    }

    async fn persist(&self, user_id: &str, submission: &Submission) -> Result<String, StoreError> {
        match submission {
            Submission::Certificate(draft) => self
                .store
                .create_application(user_id, draft)
                .await
                .map(|app| app.app_id),
            Submission::BirthCertificate(draft) => self
                .store
                .create_birth_certificate(user_id, draft)
                .await
                .map(|record| record.id),
            Submission::Grievance(draft) => self
                .store
                .file_grievance(user_id, draft)
                .await
                .map(|record| record.id),
        }
    }

    /// Failures are logged only; the confirmation is shown regardless.
    async fn escalate(&self, session_id: &str, target: &EscalationTarget) {
        if let Some(app_id) = &target.application_id {
            if let Err(err) = self
                .store
                .update_application_status(app_id, RecordStatus::Escalated)
                .await
            {
                tracing::warn!(session_id, app_id = %app_id, error = %err, "application escalation failed");
            }
        }
        if let Some(grievance_id) = &target.grievance_id {
            if let Err(err) = self.store.escalate_grievance(grievance_id).await {
                tracing::warn!(session_id, grievance_id = %grievance_id, error = %err, "grievance escalation failed");
            }
        }
    }

    async fn emit(&self, session: &mut Session, reply: Reply) {
        let text = if reply.localize && !session.language.is_english() {
            match self.assistant.translate(&reply.text, session.language).await {
                Ok(translated) => translated,
                Err(err) => {
                    tracing::warn!(
                        session_id = %session.id,
                        language = session.language.code(),
                        error = %err,
                        "translation failed, using English"
                    );
                    reply.text
                }
            }
        } else {
            reply.text
        };
        session
            .conversation
            .transcript
            .append(Role::Assistant, &text, reply.attachments, &now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{AssistantError, BuiltinAssistant};
    use crate::store::RecordStore;
    use async_trait::async_trait;
    use seva_contracts::{
        BirthCertificate, CertificateApplication, ClassifierReply, Grievance, HistoryEntry,
        SchemeDetails, SchemeReport,
    };
    use seva_kernel::workflow::{BirthDraft, CertificateDraft, GrievanceDraft};
    use seva_kernel::ESCALATION_CONFIRMATION;

    /// Every call fails.
    struct BrokenStore;

    fn down() -> StoreError {
        StoreError::Backend("connection refused".to_string())
    }

    #[async_trait]
    impl RecordService for BrokenStore {
        async fn create_application(
            &self,
            _user_id: &str,
            _draft: &CertificateDraft,
        ) -> Result<CertificateApplication, StoreError> {
            Err(down())
        }
        async fn list_applications(
            &self,
            _user_id: &str,
        ) -> Result<Vec<CertificateApplication>, StoreError> {
            Err(down())
        }
        async fn update_application_status(
            &self,
            _app_id: &str,
            _status: RecordStatus,
        ) -> Result<(), StoreError> {
            Err(down())
        }
        async fn create_birth_certificate(
            &self,
            _user_id: &str,
            _draft: &BirthDraft,
        ) -> Result<BirthCertificate, StoreError> {
            Err(down())
        }
        async fn list_birth_certificates(
            &self,
            _user_id: &str,
        ) -> Result<Vec<BirthCertificate>, StoreError> {
            Err(down())
        }
        async fn file_grievance(
            &self,
            _user_id: &str,
            _draft: &GrievanceDraft,
        ) -> Result<Grievance, StoreError> {
            Err(down())
        }
        async fn list_grievances(&self, _user_id: &str) -> Result<Vec<Grievance>, StoreError> {
            Err(down())
        }
        async fn escalate_grievance(&self, _id: &str) -> Result<(), StoreError> {
            Err(down())
        }
        async fn save_document(&self, _report: &SchemeReport) -> Result<(), StoreError> {
            Err(down())
        }
        async fn get_document(&self, _id: &str) -> Result<Option<SchemeReport>, StoreError> {
            Err(down())
        }
        async fn list_documents(&self, _user_id: &str) -> Result<Vec<SchemeReport>, StoreError> {
            Err(down())
        }
    }

    /// In-memory store whose birth-certificate listing is down.
    struct BirthListDown(RecordStore);

    #[async_trait]
    impl RecordService for BirthListDown {
        async fn create_application(
            &self,
            user_id: &str,
            draft: &CertificateDraft,
        ) -> Result<CertificateApplication, StoreError> {
            self.0.create_application(user_id, draft).await
        }
        async fn list_applications(
            &self,
            user_id: &str,
        ) -> Result<Vec<CertificateApplication>, StoreError> {
            self.0.list_applications(user_id).await
        }
        async fn update_application_status(
            &self,
            app_id: &str,
            status: RecordStatus,
        ) -> Result<(), StoreError> {
            self.0.update_application_status(app_id, status).await
        }
        async fn create_birth_certificate(
            &self,
            user_id: &str,
            draft: &BirthDraft,
        ) -> Result<BirthCertificate, StoreError> {
            self.0.create_birth_certificate(user_id, draft).await
        }
        async fn list_birth_certificates(
            &self,
            _user_id: &str,
        ) -> Result<Vec<BirthCertificate>, StoreError> {
            Err(down())
        }
        async fn file_grievance(
            &self,
            user_id: &str,
            draft: &GrievanceDraft,
        ) -> Result<Grievance, StoreError> {
            self.0.file_grievance(user_id, draft).await
        }
        async fn list_grievances(&self, user_id: &str) -> Result<Vec<Grievance>, StoreError> {
            self.0.list_grievances(user_id).await
        }
        async fn escalate_grievance(&self, id: &str) -> Result<(), StoreError> {
            self.0.escalate_grievance(id).await
        }
        async fn save_document(&self, report: &SchemeReport) -> Result<(), StoreError> {
            self.0.save_document(report).await
        }
        async fn get_document(&self, id: &str) -> Result<Option<SchemeReport>, StoreError> {
            self.0.get_document(id).await
        }
        async fn list_documents(&self, user_id: &str) -> Result<Vec<SchemeReport>, StoreError> {
            self.0.list_documents(user_id).await
        }
    }

    /// Classifier offline; translation tags the text.
    struct OfflineAssistant;

    #[async_trait]
    impl Assistant for OfflineAssistant {
        async fn classify(
            &self,
            _history: &[HistoryEntry],
            _message: &str,
            _language: Language,
        ) -> Result<ClassifierReply, AssistantError> {
            Err(AssistantError::Status(503))
        }
        async fn translate(&self, text: &str, language: Language) -> Result<String, AssistantError> {
            Ok(format!("[{}] {text}", language.code()))
        }
        async fn scheme_details(
            &self,
            _scheme_name: &str,
            _language: Language,
        ) -> Result<Option<SchemeDetails>, AssistantError> {
            Ok(None)
        }
    }

    fn driver(store: Arc<dyn RecordService>, assistant: Arc<dyn Assistant>) -> Driver {
        Driver::new(
            Kernel::default(),
            store,
            assistant,
            Duration::ZERO,
            Duration::from_millis(50),
        )
    }

    fn texts(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.text.as_str()).collect()
    }

    #[tokio::test]
    async fn persistence_failure_apologizes_and_returns_to_idle() {
        let driver = driver(Arc::new(BrokenStore), Arc::new(BuiltinAssistant));
        let mut session = Session::new("u1", Language::En, None);
        driver.handle_turn(&mut session, "I want to file a complaint").await;
        assert_eq!(session.conversation.state, WorkflowState::GrievDept);
        driver.handle_turn(&mut session, "Water Supply Department").await;
        let out = driver.handle_turn(&mut session, "No water for a week").await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[1].text, "⚠️ Failed to file grievance. Please try again.");
        assert_eq!(session.conversation.state, WorkflowState::Idle);
        assert!(session.conversation.data.is_empty());
    }

    #[tokio::test]
    async fn status_lookup_failure_is_reported() {
        let driver = driver(Arc::new(BrokenStore), Arc::new(BuiltinAssistant));
        let mut session = Session::new("u1", Language::En, None);
        let out = driver.handle_turn(&mut session, "Check my status").await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].text, "⚠️ Unable to retrieve status. Please try again.");
        assert!(session.conversation.state.is_idle());
    }

    #[tokio::test]
    async fn status_survives_one_failing_record_list() {
        let driver = driver(
            Arc::new(BirthListDown(RecordStore::memory())),
            Arc::new(BuiltinAssistant),
        );
        let mut session = Session::new("u1", Language::En, None);
        driver
            .handle_turn(&mut session, "I want to apply for an income certificate")
            .await;
        for answer in ["Income Certificate", "Asha Patil", "123456789012", "Nashik", "180000"] {
            driver.handle_turn(&mut session, answer).await;
        }
        let app_id = session
            .conversation
            .data
            .last_application_id
            .clone()
            .expect("application stored");

        let out = driver
            .handle_turn(&mut session, "track my application status")
            .await;
        let summary = &out.last().expect("status reply").text;
        assert!(summary.contains("Your Application Status Summary"), "{summary}");
        assert!(summary.contains(&format!("ID: {app_id}")));
        assert!(!summary.contains("Unable to retrieve status"));
    }

    #[tokio::test]
    async fn escalation_failure_still_confirms() {
        let driver = driver(Arc::new(BrokenStore), Arc::new(BuiltinAssistant));
        let mut session = Session::new("u1", Language::En, None);
        session.conversation.data.last_application_id = Some("SB-2026-1234".to_string());
        let out = driver.handle_turn(&mut session, "I disagree").await;
        assert_eq!(texts(&out), vec!["I disagree", ESCALATION_CONFIRMATION]);
    }

    #[tokio::test]
    async fn classifier_failure_is_a_connection_issue() {
        let driver = driver(Arc::new(RecordStore::memory()), Arc::new(OfflineAssistant));
        let mut session = Session::new("u1", Language::En, None);
        let out = driver.handle_turn(&mut session, "hello").await;
        assert_eq!(out.len(), 2);
        assert!(out[1].text.starts_with("⚠️ Connection issue: assistant returned HTTP 503"));
        assert!(session.conversation.state.is_idle());
    }

    #[tokio::test]
    async fn localized_prompts_are_translated_for_other_languages() {
        let driver = driver(Arc::new(RecordStore::memory()), Arc::new(OfflineAssistant));
        let mut session = Session::new("u1", Language::Hi, None);
        session.conversation.state = WorkflowState::CertName;
        let out = driver.handle_turn(&mut session, "Asha").await;
        assert!(out[1].text.starts_with("[hi] Thank you, Asha."));
        assert_eq!(out[0].text, "Asha");
    }

    #[tokio::test]
    async fn scheme_report_attaches_a_document_link() {
        let store = Arc::new(RecordStore::memory());
        let driver = driver(store.clone(), Arc::new(BuiltinAssistant));
        let mut session = Session::new("u1", Language::En, Some("asha@example.in".to_string()));
        let out = driver
            .handle_turn(&mut session, "Tell me about PMAY scheme")
            .await;
        assert_eq!(out.len(), 3);
        let url = out[2]
            .attachments
            .document_url
            .clone()
            .expect("document link");
        let id = url.trim_start_matches("/v1/documents/");
        let report = store.get_document(id).await.unwrap().expect("stored report");
        assert!(report.body.contains("Citizen: asha@example.in"));
        assert_eq!(out[2].attachments.scheme_name.as_deref(), Some("PMAY"));
        assert!(session.conversation.state.is_idle());
    }

    #[tokio::test]
    async fn report_storage_failure_is_reported() {
        let driver = driver(Arc::new(BrokenStore), Arc::new(BuiltinAssistant));
        let mut session = Session::new("u1", Language::En, None);
        let out = driver
            .handle_turn(&mut session, "Tell me about PMAY scheme")
            .await;
        assert!(out[2].text.starts_with("⚠️ Could not generate the scheme report"));
    }

    #[tokio::test]
    async fn registry_hands_out_shared_sessions() {
        let sessions = Sessions::default();
        let handle = sessions.insert(Session::new("u1", Language::En, None)).await;
        let id = handle.lock().await.id.clone();
        let again = sessions.get(&id).await.expect("session");
        assert!(Arc::ptr_eq(&handle, &again));
        assert!(sessions.get("missing").await.is_none());

        assert!(sessions.remove(&id).await);
        assert!(sessions.get(&id).await.is_none());
        assert!(!sessions.remove(&id).await);
    }
}
