//! End-to-end session behaviour against a mock assistant server.

use std::sync::Arc;

use kiki_chat::{ConversationSession, Selector, CONNECTION_ERROR_TEXT};
use kiki_client::HttpBackend;
use kiki_core::config::KikiConfig;
use kiki_core::events::EventBus;
use kiki_core::types::{ChatMode, RequestOutcome};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn session_for(server: &MockServer) -> ConversationSession {
    let backend = HttpBackend::new(format!("{}/api", server.uri()), None).unwrap();
    ConversationSession::new(Arc::new(backend), EventBus::default(), &KikiConfig::default())
}

#[tokio::test]
async fn test_capital_question_in_chat_mode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_json(json!({"message": "What is the capital?", "use_rag": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Accra.",
            "error": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = session_for(&server).await;
    session.set_mode(Selector::Welcome, ChatMode::Chat);
    let exchange = session
        .send("What is the capital?")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exchange.outcome, RequestOutcome::Success);
    assert_eq!(exchange.reply.text, "Accra.");
    assert_eq!(exchange.reply.label, "Chat Kiki");
    assert_eq!(session.messages().len(), 2);
    assert_eq!(session.conversations()[0].title, "What is the capital?");
}

#[tokio::test]
async fn test_server_down_yields_connection_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let session = session_for(&server).await;
    let exchange = session.send("hello").await.unwrap().unwrap();

    assert_eq!(exchange.outcome, RequestOutcome::TransportError);
    assert_eq!(exchange.reply.text, CONNECTION_ERROR_TEXT);
    assert!(session.is_input_enabled());
}

#[tokio::test]
async fn test_new_session_posts_clear() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/clear"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let session = session_for(&server).await;
    session.new_session().await;
    assert!(session.messages().is_empty());
}
