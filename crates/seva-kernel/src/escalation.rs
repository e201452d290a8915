//! Turn interceptors run before the workflow step. The first match owns the turn.

use seva_contracts::WorkflowState;

use crate::workflow::WorkflowData;
use crate::{Effect, KernelConfig, Reply, Transition};

pub const ESCALATION_CONFIRMATION: &str = "🚨 **Case Escalated to Government Officer**\n\nYour case has been escalated to a senior government officer for review.\n\n• Assigned Department: District Revenue Office\n• Expected Response: Within 48 hours\n• You will be contacted directly by the officer\n\nYou may also visit your nearest government office with your Application ID for in-person follow-up.";

/// Records the escalation effect should mark. Either may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscalationTarget {
    pub application_id: Option<String>,
    pub grievance_id: Option<String>,
}

pub trait TurnInterceptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn intercept(
        &self,
        state: WorkflowState,
        data: &WorkflowData,
        input: &str,
    ) -> Option<Transition>;
}

/// Case-insensitive substring match against a fixed phrase list. A match
/// leaves the flow where it was; the utterance is not consumed as an answer.
pub struct Escalation {
    phrases: Vec<String>,
}

impl Escalation {
    pub fn new(phrases: &[String]) -> Self {
        Self {
            phrases: phrases
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, input: &str) -> bool {
        let lower = input.to_lowercase();
        self.phrases.iter().any(|p| lower.contains(p.as_str()))
    }
}

impl TurnInterceptor for Escalation {
    fn name(&self) -> &'static str {
        "escalation"
    }

    fn intercept(
        &self,
        state: WorkflowState,
        data: &WorkflowData,
        input: &str,
    ) -> Option<Transition> {
        if !self.matches(input) {
            return None;
        }
        Some(Transition {
            state,
            data: data.clone(),
            effects: vec![
                Effect::Escalate(EscalationTarget {
                    application_id: data.last_application_id.clone(),
                    grievance_id: data.last_grievance_id.clone(),
                }),
                Effect::Reply(Reply::localized(ESCALATION_CONFIRMATION)),
            ],
        })
    }
}

pub struct Interceptors {
    chain: Vec<Box<dyn TurnInterceptor>>,
}

impl Interceptors {
    pub fn new(chain: Vec<Box<dyn TurnInterceptor>>) -> Self {
        Self { chain }
    }

    pub fn standard(cfg: &KernelConfig) -> Self {
        Self::new(vec![Box::new(Escalation::new(&cfg.escalation_phrases))])
    }

    pub fn intercept(
        &self,
        state: WorkflowState,
        data: &WorkflowData,
        input: &str,
    ) -> Option<(&'static str, Transition)> {
        self.chain
            .iter()
            .find_map(|i| i.intercept(state, data, input).map(|t| (i.name(), t)))
    }
}
