//! Conversation state machine for the citizen assistant.
//!
//! The kernel is pure: it maps `(state, data, utterance)` to a [`Transition`]
//! carrying the next state, the next form data and a list of [`Effect`]s. The
//! server interprets effects (persistence, status lookup, escalation, report
//! generation) and feeds the outcome back through [`Kernel::on_submitted`].

pub mod escalation;
pub mod format;
pub mod intent;
pub mod transcript;
pub mod workflow;

use seva_contracts::{Attachments, ClassifierReply, WorkflowState};

pub use escalation::{EscalationTarget, Interceptors, TurnInterceptor, ESCALATION_CONFIRMATION};
pub use intent::{begin, route_intent, Entry, Intent};
pub use transcript::{Transcript, GREETING};
pub use workflow::{advance, complete_submission, status_summary, Submission, WorkflowData};

pub const DEFAULT_INCOME_THRESHOLD: u64 = 250_000;

pub fn default_escalation_phrases() -> Vec<String> {
    ["disagree", "talk to officer", "escalate", "speak to officer"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// Declared income strictly below this is approved.
    pub income_threshold: u64,
    pub escalation_phrases: Vec<String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            income_threshold: DEFAULT_INCOME_THRESHOLD,
            escalation_phrases: default_escalation_phrases(),
        }
    }
}

/// Assistant text to append to the transcript. `localize` marks text written
/// in English that should go through translation for non-English sessions;
/// relayed classifier text is already in the session language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub attachments: Attachments,
    pub localize: bool,
}

impl Reply {
    pub fn localized(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Attachments::default(),
            localize: true,
        }
    }

    pub fn verbatim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Attachments::default(),
            localize: false,
        }
    }

    pub fn with_attachments(mut self, attachments: Attachments) -> Self {
        self.attachments = attachments;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Reply(Reply),
    Submit(Submission),
    FetchStatus,
    Escalate(EscalationTarget),
    GenerateReport { scheme_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: WorkflowState,
    pub data: WorkflowData,
    pub effects: Vec<Effect>,
}

/// What the kernel decided for one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Intercepted {
        by: &'static str,
        transition: Transition,
    },
    Advanced(Transition),
    /// Session is idle; the utterance needs an intent.
    Classify,
}

/// Mutable per-session view the kernel operates on.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub state: WorkflowState,
    pub data: WorkflowData,
    pub transcript: Transcript,
}

impl Conversation {
    pub fn new(timestamp: &str) -> Self {
        Self {
            state: WorkflowState::Idle,
            data: WorkflowData::default(),
            transcript: Transcript::new(timestamp),
        }
    }

    pub fn clear(&mut self, timestamp: &str) {
        self.state = WorkflowState::Idle;
        self.data = WorkflowData::default();
        self.transcript.clear(timestamp);
    }

    pub fn enter(&mut self, transition: &Transition) {
        self.state = transition.state;
        self.data = transition.data.clone();
    }
}

pub struct Kernel {
    cfg: KernelConfig,
    interceptors: Interceptors,
}

impl Kernel {
    pub fn new(cfg: KernelConfig) -> Self {
        let interceptors = Interceptors::standard(&cfg);
        Self { cfg, interceptors }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.cfg
    }

    pub fn on_utterance(&self, state: WorkflowState, data: &WorkflowData, input: &str) -> Step {
        if let Some((by, transition)) = self.interceptors.intercept(state, data, input) {
            return Step::Intercepted { by, transition };
        }
        match advance(state, data, input, &self.cfg) {
            Some(transition) => Step::Advanced(transition),
            None => Step::Classify,
        }
    }

    pub fn on_classified(
        &self,
        reply: &ClassifierReply,
        utterance: &str,
        data: &WorkflowData,
    ) -> Transition {
        begin(route_intent(reply, utterance), data)
    }

    pub fn on_submitted(&self, submission: &Submission, stored_id: Option<&str>) -> Transition {
        complete_submission(submission, stored_id)
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}
