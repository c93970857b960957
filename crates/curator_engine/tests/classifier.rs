use std::collections::BTreeMap;
use std::time::Duration;

use curator_core::{FailureKind, ItemId, Verdict};
use curator_engine::{
    Classifier, ClassifierSettings, ClassifyRequest, HttpClassifier, KeywordClassifier,
    WireDecision, WireItem,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_logging() {
    curator_logging::initialize_for_tests();
}

fn item(id: &str, title: &str) -> WireItem {
    WireItem {
        id: ItemId::new(id),
        title: title.to_string(),
        metadata: BTreeMap::new(),
    }
}

fn request() -> ClassifyRequest {
    ClassifyRequest {
        items: vec![item("a", "Election night"), item("b", "Bread at home")],
        active_filters: vec!["politics".to_string()],
    }
}

fn settings(server: &MockServer) -> ClassifierSettings {
    let endpoint = Url::parse(&format!("{}/classify", server.uri())).expect("mock url");
    ClassifierSettings {
        request_timeout: Duration::from_millis(300),
        ..ClassifierSettings::new(endpoint)
    }
}

#[tokio::test]
async fn posts_camel_case_body_and_parses_decisions() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/classify"))
        .and(header("authorization", "Bearer secret"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({
            "items": [
                {"id": "a", "title": "Election night", "metadata": {}},
                {"id": "b", "title": "Bread at home", "metadata": {}}
            ],
            "activeFilters": ["politics"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "decisions": [
                {"id": "a", "verdict": "deny"},
                {"id": "b", "verdict": "allow"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let classifier = HttpClassifier::new(ClassifierSettings {
        bearer_token: Some("secret".to_string()),
        ..settings(&server)
    })
    .expect("classifier");
    let response = classifier.classify(&request()).await.expect("classified");

    assert_eq!(
        response.decisions,
        vec![
            WireDecision {
                id: ItemId::new("a"),
                verdict: Verdict::Deny
            },
            WireDecision {
                id: ItemId::new("b"),
                verdict: Verdict::Allow
            },
        ]
    );
}

#[tokio::test]
async fn non_success_status_is_a_service_error() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let classifier = HttpClassifier::new(settings(&server)).expect("classifier");
    let err = classifier.classify(&request()).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::ServiceError);
    assert!(err.message.contains("503"));
}

#[tokio::test]
async fn undecodable_body_is_malformed() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let classifier = HttpClassifier::new(settings(&server)).expect("classifier");
    let err = classifier.classify(&request()).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::MalformedResponse);
}

#[tokio::test]
async fn slow_service_times_out() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"decisions": []}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let classifier = HttpClassifier::new(settings(&server)).expect("classifier");
    let err = classifier.classify(&request()).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
}

#[test]
fn non_http_endpoint_is_rejected() {
    let endpoint = Url::parse("file:///tmp/classify").expect("url");
    let err = HttpClassifier::new(ClassifierSettings::new(endpoint)).unwrap_err();
    assert_eq!(err.kind, FailureKind::ServiceError);
}

#[tokio::test]
async fn keyword_classifier_denies_matching_titles_and_metadata() {
    let mut from_channel = item("c", "Weekly roundup");
    from_channel
        .metadata
        .insert("channel".to_string(), "Politics Daily".to_string());
    let request = ClassifyRequest {
        items: vec![
            item("a", "POLITICS tonight"),
            item("b", "Bread at home"),
            from_channel,
        ],
        active_filters: vec![" politics ".to_string(), String::new()],
    };

    let response = KeywordClassifier::new()
        .classify(&request)
        .await
        .expect("offline classifier never fails");
    let verdicts: Vec<Verdict> = response.decisions.iter().map(|d| d.verdict).collect();
    assert_eq!(verdicts, vec![Verdict::Deny, Verdict::Allow, Verdict::Deny]);
}
