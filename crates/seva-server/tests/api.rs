use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Datelike, Utc};
use serde_json::{json, Value};
use seva_config::{Assistant, Config, Documents, Server, Store, Workflow};
use seva_contracts::API_VERSION;
use seva_kernel::format::is_application_id;
use seva_kernel::{ESCALATION_CONFIRMATION, GREETING};
use seva_server::build_app;
use tower::util::ServiceExt;

fn test_config() -> Config {
    Config {
        server: Server {
            listen_addr: "127.0.0.1:0".to_string(),
        },
        store: Store {
            kind: "memory".to_string(),
            sqlite_path: None,
        },
        assistant: Assistant {
            mode: "builtin".to_string(),
            endpoint: None,
            api_key_env: None,
        },
        workflow: Workflow {
            escalation_delay_ms: 0,
            ..Workflow::default()
        },
        documents: Documents::default(),
    }
}

fn test_config_sqlite(db_path: &str) -> Config {
    let mut cfg = test_config();
    cfg.store.kind = "sqlite".to_string();
    cfg.store.sqlite_path = Some(db_path.to_string());
    cfg
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn new_session(app: &Router, user_id: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/v1/sessions",
        Some(json!({"user_id": user_id})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["session_id"].as_str().unwrap().to_string()
}

async fn say(app: &Router, session_id: &str, text: &str) -> Value {
    let (status, body) = send(
        app,
        "POST",
        &format!("/v1/sessions/{session_id}/turns"),
        Some(json!({"text": text})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "turn {text:?} failed: {body}");
    body
}

fn last_text(turn: &Value) -> String {
    turn["messages"].as_array().unwrap().last().unwrap()["text"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn certificate_until_income(app: &Router, session_id: &str) {
    let turn = say(app, session_id, "I want to apply for an income certificate").await;
    assert_eq!(turn["state"], "cert_type");
    for (answer, state) in [
        ("Income Certificate", "cert_name"),
        ("Asha Patil", "cert_national_id"),
        ("1234 5678 9012", "cert_address"),
        ("Ward 4, Nashik 422001", "cert_income"),
    ] {
        let turn = say(app, session_id, answer).await;
        assert_eq!(turn["state"], state, "after {answer:?}");
    }
}

#[tokio::test]
async fn healthz_ok() {
    let app = build_app(test_config()).await.unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn contracts_endpoint_reports_digests() {
    let app = build_app(test_config()).await.unwrap();
    let (status, payload) = send(&app, "GET", "/v1/contracts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["api_version"], API_VERSION);
    assert_eq!(payload["openapi_sha256"].as_str().unwrap().len(), 64);
    assert_eq!(payload["schema_set_sha256"].as_str().unwrap().len(), 64);
    assert!(payload["schemas"]["message.schema.json"].is_string());
}

#[tokio::test]
async fn new_session_starts_idle_with_greeting() {
    let app = build_app(test_config()).await.unwrap();
    let session_id = new_session(&app, "citizen-1").await;
    let (status, view) = send(&app, "GET", &format!("/v1/sessions/{session_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["state"], "idle");
    assert_eq!(view["language"], "en");
    let transcript = view["transcript"].as_array().unwrap();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0]["role"], "assistant");
    assert_eq!(transcript[0]["text"], GREETING);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let app = build_app(test_config()).await.unwrap();
    let (status, body) = send(&app, "POST", "/v1/sessions", Some(json!({"user_id": " "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");

    let (status, _) = send(
        &app,
        "POST",
        "/v1/sessions",
        Some(json!({"user_id": "u1", "role": "admin"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let session_id = new_session(&app, "u1").await;
    let (status, _) = send(
        &app,
        "POST",
        &format!("/v1/sessions/{session_id}/turns"),
        Some(json!({"text": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/sessions/nope/turns",
        Some(json!({"text": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn certificate_flow_end_to_end_is_approved() {
    let app = build_app(test_config()).await.unwrap();
    let session_id = new_session(&app, "citizen-1").await;
    certificate_until_income(&app, &session_id).await;

    let turn = say(&app, &session_id, "200000").await;
    assert_eq!(turn["state"], "idle");
    let messages = turn["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    let summary = &messages[1];
    assert!(summary["text"].as_str().unwrap().contains("Approved"));
    let app_id = summary["attachments"]["record_id"].as_str().unwrap();
    assert!(is_application_id(app_id), "{app_id}");
    assert!(app_id.starts_with(&format!("SB-{}-", Utc::now().year())));

    let (status, records) = send(&app, "GET", "/v1/users/citizen-1/records", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(records["applications"][0]["app_id"], app_id);
    assert_eq!(records["applications"][0]["status"], "Approved");
    assert_eq!(records["applications"][0]["details"]["national_id"], "123456789012");
}

#[tokio::test]
async fn income_threshold_boundary() {
    let app = build_app(test_config()).await.unwrap();

    let below = new_session(&app, "u-below").await;
    certificate_until_income(&app, &below).await;
    let turn = say(&app, &below, "249999").await;
    assert!(last_text(&turn).contains("Approved"));

    let at = new_session(&app, "u-at").await;
    certificate_until_income(&app, &at).await;
    let turn = say(&app, &at, "250000").await;
    let text = last_text(&turn);
    assert!(text.contains("Rejected"));
    assert!(text.contains("I disagree"));
    assert_eq!(turn["state"], "idle");
}

#[tokio::test]
async fn bad_national_id_reprompts_same_step() {
    let app = build_app(test_config()).await.unwrap();
    let session_id = new_session(&app, "u1").await;
    say(&app, &session_id, "I want to apply for an income certificate").await;
    say(&app, &session_id, "Income Certificate").await;
    say(&app, &session_id, "Asha").await;

    for bad in ["12345", "1234567890123", "1234-5678-9012"] {
        let turn = say(&app, &session_id, bad).await;
        assert_eq!(turn["state"], "cert_national_id");
        assert!(last_text(&turn).contains("valid Aadhaar"));
    }
    let turn = say(&app, &session_id, "123456789012").await;
    assert_eq!(turn["state"], "cert_address");
}

#[tokio::test]
async fn escalation_while_idle_confirms_once_and_starts_nothing() {
    let app = build_app(test_config()).await.unwrap();
    let session_id = new_session(&app, "u1").await;
    for phrase in ["I disagree", "talk to officer", "escalate", "speak to officer"] {
        let turn = say(&app, &session_id, phrase).await;
        assert_eq!(turn["state"], "idle");
        let confirmations = turn["messages"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|m| m["text"] == ESCALATION_CONFIRMATION)
            .count();
        assert_eq!(confirmations, 1, "{phrase}");
        assert_eq!(turn["messages"].as_array().unwrap().len(), 2);
    }
}

#[tokio::test]
async fn escalation_marks_last_application() {
    let app = build_app(test_config()).await.unwrap();
    let session_id = new_session(&app, "citizen-2").await;
    certificate_until_income(&app, &session_id).await;
    say(&app, &session_id, "300000").await;

    let turn = say(&app, &session_id, "I DISAGREE with this decision").await;
    assert_eq!(last_text(&turn), ESCALATION_CONFIRMATION);

    let (_, records) = send(&app, "GET", "/v1/users/citizen-2/records", None).await;
    assert_eq!(records["applications"][0]["status"], "Escalated");

    let turn = say(&app, &session_id, "Check my status").await;
    assert!(last_text(&turn).contains("🚨 **Income Certificate** — Escalated"));
}

#[tokio::test]
async fn escalation_mid_flow_keeps_the_step() {
    let app = build_app(test_config()).await.unwrap();
    let session_id = new_session(&app, "u1").await;
    say(&app, &session_id, "I want to file a complaint").await;
    let turn = say(&app, &session_id, "I want to talk to officer").await;
    assert_eq!(turn["state"], "griev_dept");
    assert_eq!(last_text(&turn), ESCALATION_CONFIRMATION);
    let turn = say(&app, &session_id, "Electricity Board").await;
    assert_eq!(turn["state"], "griev_complaint");
}

#[tokio::test]
async fn clear_resets_to_greeting() {
    let app = build_app(test_config()).await.unwrap();
    let session_id = new_session(&app, "u1").await;
    say(&app, &session_id, "I want to apply for an income certificate").await;
    say(&app, &session_id, "Income Certificate").await;

    let (status, view) = send(
        &app,
        "POST",
        &format!("/v1/sessions/{session_id}/clear"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["state"], "idle");
    let transcript = view["transcript"].as_array().unwrap();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0]["text"], GREETING);

    let turn = say(&app, &session_id, "Asha").await;
    assert_eq!(turn["state"], "idle");
}

#[tokio::test]
async fn birth_certificate_flow() {
    let app = build_app(test_config()).await.unwrap();
    let session_id = new_session(&app, "parent-1").await;
    let turn = say(&app, &session_id, "Apply birth certificate").await;
    assert_eq!(turn["state"], "birth_child_name");
    for (answer, state) in [
        ("Ananya", "birth_dob"),
        ("2026-01-15", "birth_place"),
        ("City Hospital, Pune", "birth_father"),
        ("Amit", "birth_mother"),
        ("Priya", "birth_address"),
    ] {
        assert_eq!(say(&app, &session_id, answer).await["state"], state);
    }
    let turn = say(&app, &session_id, "MG Road, Pune").await;
    assert_eq!(turn["state"], "idle");
    let summary = turn["messages"].as_array().unwrap().last().unwrap().clone();
    assert!(summary["text"].as_str().unwrap().contains("Ananya"));
    let shown = summary["attachments"]["record_id"].as_str().unwrap();
    assert_eq!(shown.len(), 8);
    assert_eq!(shown, shown.to_uppercase());

    let (_, records) = send(&app, "GET", "/v1/users/parent-1/records", None).await;
    assert_eq!(records["birth_certificates"][0]["status"], "Approved");
}

#[tokio::test]
async fn grievance_flow_and_escalation() {
    let app = build_app(test_config()).await.unwrap();
    let session_id = new_session(&app, "u-griev").await;
    assert_eq!(
        say(&app, &session_id, "I want to file a complaint").await["state"],
        "griev_dept"
    );
    assert_eq!(
        say(&app, &session_id, "Water Supply Department").await["state"],
        "griev_complaint"
    );
    let turn = say(&app, &session_id, "No water supply in Ward 7 for a week").await;
    assert_eq!(turn["state"], "idle");
    assert!(last_text(&turn).contains("Grievance Registered"));

    say(&app, &session_id, "escalate").await;
    let (_, records) = send(&app, "GET", "/v1/users/u-griev/records", None).await;
    assert_eq!(records["grievances"][0]["status"], "Escalated");
    assert_eq!(records["grievances"][0]["escalated"], true);
}

#[tokio::test]
async fn track_status_runs_in_one_turn() {
    let app = build_app(test_config()).await.unwrap();
    let session_id = new_session(&app, "u-empty").await;
    let turn = say(&app, &session_id, "Check my status").await;
    assert_eq!(turn["state"], "idle");
    let messages = turn["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert!(messages[1]["text"]
        .as_str()
        .unwrap()
        .contains("I will fetch all your applications"));
    assert!(messages[2]["text"]
        .as_str()
        .unwrap()
        .contains("No applications found"));
}

#[tokio::test]
async fn quick_actions_drive_normal_turns() {
    let app = build_app(test_config()).await.unwrap();
    let (status, actions) = send(&app, "GET", "/v1/quick-actions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(actions.as_array().unwrap().len(), 6);

    let session_id = new_session(&app, "u1").await;
    let (status, turn) = send(
        &app,
        "POST",
        &format!("/v1/sessions/{session_id}/quick-actions/income_certificate"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(turn["state"], "cert_type");
    assert_eq!(
        turn["messages"][0]["text"],
        "I want to apply for an income certificate"
    );

    let (status, _) = send(
        &app,
        "POST",
        &format!("/v1/sessions/{session_id}/quick-actions/unknown"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn scheme_report_is_downloadable() {
    let app = build_app(test_config()).await.unwrap();
    let session_id = new_session(&app, "u1").await;
    let turn = say(&app, &session_id, "Tell me about PMAY scheme").await;
    assert_eq!(turn["state"], "idle");
    let url = turn["messages"].as_array().unwrap().last().unwrap()["attachments"]
        ["document_url"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(Request::builder().uri(&url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/markdown"));
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.starts_with("# PMAY"));

    let (status, _) = send(&app, "GET", "/v1/documents/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn generated_reports_are_listed_per_user() {
    let app = build_app(test_config()).await.unwrap();
    let session_id = new_session(&app, "u-docs").await;
    say(&app, &session_id, "Tell me about PMAY scheme").await;
    let turn = say(&app, &session_id, "Tell me about Ayushman Bharat scheme").await;
    let latest_url = turn["messages"].as_array().unwrap().last().unwrap()["attachments"]
        ["document_url"]
        .clone();

    let (status, listed) = send(&app, "GET", "/v1/users/u-docs/documents", None).await;
    assert_eq!(status, StatusCode::OK);
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["scheme_name"], "Ayushman Bharat");
    assert_eq!(listed[0]["document_url"], latest_url);
    assert_eq!(listed[1]["scheme_name"], "PMAY");

    let (status, none) = send(&app, "GET", "/v1/users/someone-else/documents", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(none, json!([]));
}

#[tokio::test]
async fn deleted_sessions_are_gone() {
    let app = build_app(test_config()).await.unwrap();
    let session_id = new_session(&app, "u1").await;
    let uri = format!("/v1/sessions/{session_id}");

    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn language_can_be_switched() {
    let app = build_app(test_config()).await.unwrap();
    let session_id = new_session(&app, "u1").await;
    let (status, view) = send(
        &app,
        "PUT",
        &format!("/v1/sessions/{session_id}/language"),
        Some(json!({"language": "mr"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["language"], "mr");

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/v1/sessions/{session_id}/language"),
        Some(json!({"language": "fr"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sqlite_store_keeps_records() {
    let db_path = std::env::temp_dir()
        .join(format!("seva-api-{}.db", uuid_like()))
        .to_string_lossy()
        .to_string();
    let app = build_app(test_config_sqlite(&db_path)).await.unwrap();
    let session_id = new_session(&app, "citizen-sql").await;
    certificate_until_income(&app, &session_id).await;
    say(&app, &session_id, "100000").await;

    let app = build_app(test_config_sqlite(&db_path)).await.unwrap();
    let (_, records) = send(&app, "GET", "/v1/users/citizen-sql/records", None).await;
    assert_eq!(records["applications"].as_array().unwrap().len(), 1);
    let _ = std::fs::remove_file(db_path);
}

fn uuid_like() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time before unix epoch")
        .as_nanos()
}

fn schema(name: &str) -> Value {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../contracts/v1")
        .join(name);
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn turn_responses_match_published_schemas() {
    let turn_schema = schema("turn_response.schema.json");
    let message_schema = schema("message.schema.json");
    let turn_validator = jsonschema::validator_for(&turn_schema).unwrap();
    let message_validator = jsonschema::validator_for(&message_schema).unwrap();

    let app = build_app(test_config()).await.unwrap();
    let session_id = new_session(&app, "u1").await;
    certificate_until_income(&app, &session_id).await;
    let turn = say(&app, &session_id, "180000").await;

    assert!(turn_validator.is_valid(&turn), "{turn}");
    for message in turn["messages"].as_array().unwrap() {
        assert!(message_validator.is_valid(message), "{message}");
    }
}
