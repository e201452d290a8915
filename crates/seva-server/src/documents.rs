//! Markdown scheme reports.

use std::time::Duration;

use chrono::Utc;
use seva_contracts::{Language, SchemeDetails, SchemeReport};

use crate::assistant::Assistant;
use crate::store::{RecordService, StoreError};

struct Labels {
    ministry: &'static str,
    launched: &'static str,
    benefits: &'static str,
    eligibility: &'static str,
    documents: &'static str,
    process: &'static str,
    official: &'static str,
    budget: &'static str,
    citizen: &'static str,
    generated: &'static str,
}

fn labels(language: Language) -> Labels {
    match language {
        Language::En => Labels {
            ministry: "Ministry",
            launched: "Launched",
            benefits: "Benefits",
            eligibility: "Eligibility Criteria",
            documents: "Documents Required",
            process: "Application Process",
            official: "Official Website",
            budget: "Budget / Financial Outlay",
            citizen: "Citizen",
            generated: "Generated",
        },
        Language::Hi => Labels {
            ministry: "मंत्रालय",
            launched: "शुरू",
            benefits: "लाभ",
            eligibility: "पात्रता मानदंड",
            documents: "आवश्यक दस्तावेज़",
            process: "आवेदन प्रक्रिया",
            official: "आधिकारिक वेबसाइट",
            budget: "बजट / वित्तीय आवंटन",
            citizen: "नागरिक",
            generated: "उत्पन्न",
        },
        Language::Mr => Labels {
            ministry: "मंत्रालय",
            launched: "सुरू",
            benefits: "फायदे",
            eligibility: "पात्रता निकष",
            documents: "आवश्यक कागदपत्रे",
            process: "अर्ज प्रक्रिया",
            official: "अधिकृत संकेतस्थळ",
            budget: "अर्थसंकल्प / आर्थिक तरतूद",
            citizen: "नागरिक",
            generated: "तयार केले",
        },
    }
}

/// Static content used when enrichment is unavailable or too slow.
pub fn fallback_details(scheme_name: &str) -> SchemeDetails {
    let list = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
    SchemeDetails {
        name: scheme_name.to_string(),
        launch_year: None,
        ministry: None,
        description: format!(
            "{scheme_name} is an Indian government scheme aimed at improving citizen welfare and providing financial assistance."
        ),
        benefits: list(&[
            "Direct benefit transfer",
            "Subsidized services",
            "Improved access to government resources",
        ]),
        eligibility: list(&[
            "Indian citizen",
            "Meet income criteria",
            "Valid government ID required",
        ]),
        documents_required: list(&[
            "Aadhaar Card",
            "PAN Card",
            "Bank Account Details",
            "Income Certificate",
        ]),
        application_process: list(&[
            "Visit official portal",
            "Register with Aadhaar",
            "Fill application form",
            "Upload documents",
            "Submit and track",
        ]),
        official_link: Some("https://india.gov.in".to_string()),
        budget_allocation: None,
    }
}

pub fn render_markdown(
    details: &SchemeDetails,
    language: Language,
    citizen: &str,
    generated_on: &str,
) -> String {
    let l = labels(language);
    let mut out = format!("# {}\n\n", details.name);

    let mut meta = Vec::new();
    if let Some(ministry) = details.ministry.as_deref().filter(|s| !s.is_empty()) {
        meta.push(format!("**{}:** {ministry}", l.ministry));
    }
    if let Some(year) = details.launch_year.as_deref().filter(|s| !s.is_empty()) {
        meta.push(format!("**{}:** {year}", l.launched));
    }
    if !meta.is_empty() {
        out.push_str(&meta.join(" · "));
        out.push_str("\n\n");
    }
    out.push_str(details.description.trim());
    out.push_str("\n\n");

    push_list(&mut out, l.benefits, &details.benefits, false);
    push_list(&mut out, l.eligibility, &details.eligibility, false);
    push_list(&mut out, l.documents, &details.documents_required, false);
    push_list(&mut out, l.process, &details.application_process, true);

    if let Some(link) = details.official_link.as_deref().filter(|s| !s.is_empty()) {
        out.push_str(&format!("## {}\n\n<{link}>\n\n", l.official));
    }
    if let Some(budget) = details.budget_allocation.as_deref().filter(|s| !s.is_empty()) {
        out.push_str(&format!("## {}\n\n{budget}\n\n", l.budget));
    }

    out.push_str(&format!(
        "---\n\n{}: {citizen}  \n{}: {generated_on}\n",
        l.citizen, l.generated
    ));
    out
}

fn push_list(out: &mut String, title: &str, items: &[String], numbered: bool) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("## {title}\n\n"));
    for (i, item) in items.iter().enumerate() {
        if numbered {
            out.push_str(&format!("{}. {item}\n", i + 1));
        } else {
            out.push_str(&format!("- {item}\n"));
        }
    }
    out.push('\n');
}

pub fn document_url(id: &str) -> String {
    format!("/v1/documents/{id}")
}

pub struct ReportRequest<'a> {
    pub user_id: &'a str,
    pub citizen: &'a str,
    pub scheme_name: &'a str,
    pub language: Language,
}

/// Enriches, renders and stores one report. Enrichment is bounded by
/// `enrichment_timeout`; on timeout or failure the static content is used.
pub async fn generate_report(
    store: &dyn RecordService,
    assistant: &dyn Assistant,
    request: ReportRequest<'_>,
    enrichment_timeout: Duration,
) -> Result<SchemeReport, StoreError> {
    let enriched = match tokio::time::timeout(
        enrichment_timeout,
        assistant.scheme_details(request.scheme_name, request.language),
    )
    .await
    {
        Ok(Ok(details)) => details,
        Ok(Err(err)) => {
            tracing::warn!(scheme = request.scheme_name, error = %err, "scheme enrichment failed");
            None
        }
        Err(_) => {
            tracing::warn!(
                scheme = request.scheme_name,
                timeout_ms = enrichment_timeout.as_millis() as u64,
                "scheme enrichment timed out"
            );
            None
        }
    };
    let details = enriched.unwrap_or_else(|| fallback_details(request.scheme_name));

    let now = Utc::now();
    let report = SchemeReport {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: request.user_id.to_string(),
        scheme_name: request.scheme_name.to_string(),
        body: render_markdown(
            &details,
            request.language,
            request.citizen,
            &now.format("%Y-%m-%d").to_string(),
        ),
        created_at: now.to_rfc3339(),
    };
    store.save_document(&report).await?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{AssistantError, BuiltinAssistant};
    use crate::store::RecordStore;
    use async_trait::async_trait;
    use seva_contracts::{ClassifierReply, HistoryEntry};

    struct SlowAssistant;

    #[async_trait]
    impl Assistant for SlowAssistant {
        async fn classify(
            &self,
            _history: &[HistoryEntry],
            _message: &str,
            _language: Language,
        ) -> Result<ClassifierReply, AssistantError> {
            Err(AssistantError::Unconfigured)
        }

        async fn translate(&self, text: &str, _language: Language) -> Result<String, AssistantError> {
            Ok(text.to_string())
        }

        async fn scheme_details(
            &self,
            scheme_name: &str,
            _language: Language,
        ) -> Result<Option<SchemeDetails>, AssistantError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            let mut details = fallback_details(scheme_name);
            details.description = "enriched".to_string();
            Ok(Some(details))
        }
    }

    #[test]
    fn markdown_has_every_section() {
        let mut details = fallback_details("PMAY");
        details.ministry = Some("Ministry of Housing".to_string());
        details.budget_allocation = Some("₹48,000 crore".to_string());
        let md = render_markdown(&details, Language::En, "asha@example.in", "2026-10-19");
        assert!(md.starts_with("# PMAY\n"));
        assert!(md.contains("**Ministry:** Ministry of Housing"));
        assert!(md.contains("## Benefits\n\n- Direct benefit transfer"));
        assert!(md.contains("## Application Process\n\n1. Visit official portal\n2. Register"));
        assert!(md.contains("<https://india.gov.in>"));
        assert!(md.contains("₹48,000 crore"));
        assert!(md.contains("Citizen: asha@example.in"));
        assert!(md.contains("Generated: 2026-10-19"));
    }

    #[test]
    fn headings_follow_language() {
        let md = render_markdown(&fallback_details("PMAY"), Language::Hi, "u1", "2026-10-19");
        assert!(md.contains("## लाभ"));
        assert!(!md.contains("## Benefits"));
    }

    #[tokio::test]
    async fn report_is_stored_with_fallback_content() {
        let store = RecordStore::memory();
        let report = generate_report(
            &store,
            &BuiltinAssistant,
            ReportRequest {
                user_id: "u1",
                citizen: "u1",
                scheme_name: "Ayushman Bharat",
                language: Language::En,
            },
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert!(report.body.contains("Ayushman Bharat is an Indian government scheme"));
        assert_eq!(store.get_document(&report.id).await.unwrap(), Some(report.clone()));
        assert_eq!(document_url(&report.id), format!("/v1/documents/{}", report.id));
    }

    #[tokio::test]
    async fn slow_enrichment_falls_back() {
        let store = RecordStore::memory();
        let report = generate_report(
            &store,
            &SlowAssistant,
            ReportRequest {
                user_id: "u1",
                citizen: "u1",
                scheme_name: "PMAY",
                language: Language::En,
            },
            Duration::from_millis(20),
        )
        .await
        .unwrap();
        assert!(!report.body.contains("enriched"));
        assert!(report.body.contains("PMAY is an Indian government scheme"));
    }
}
