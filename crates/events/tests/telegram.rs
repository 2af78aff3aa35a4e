//! Telegram delivery against a mock Bot API.

use std::time::Duration;

use assert_matches::assert_matches;
use rxwatch_core::notify::Notifier;
use rxwatch_events::{DeliveryError, TelegramConfig, TelegramDelivery};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "123456:TEST-token";

fn delivery_for(server: &MockServer) -> TelegramDelivery {
    let config = TelegramConfig::new(TOKEN, "-1001234").api_base(server.uri());
    TelegramDelivery::new(&config).unwrap()
}

#[tokio::test]
async fn posts_html_message_to_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .and(body_json(serde_json::json!({
            "chat_id": "-1001234",
            "text": "⚠️ <b>update</b>",
            "parse_mode": "HTML",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    delivery_for(&server).send("⚠️ <b>update</b>").await.unwrap();
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "ok": false,
            "description": "Bad Request: can't parse entities",
        })))
        .mount(&server)
        .await;

    let result = delivery_for(&server).send("<b>broken").await;
    assert_matches!(result, Err(DeliveryError::HttpStatus(400)));
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let config = TelegramConfig::new(TOKEN, "-1001234")
        .api_base(server.uri())
        .timeout(Duration::from_millis(200));
    let delivery = TelegramDelivery::new(&config).unwrap();

    let result = delivery.send("late").await;
    assert_matches!(result, Err(DeliveryError::Request(e)) if e.is_timeout());
}

#[tokio::test]
async fn request_errors_do_not_leak_the_token() {
    let config = TelegramConfig::new(TOKEN, "-1001234")
        .api_base("http://127.0.0.1:1")
        .timeout(Duration::from_secs(2));
    let delivery = TelegramDelivery::new(&config).unwrap();

    let err = delivery.send("unreachable").await.unwrap_err();
    assert!(!err.to_string().contains("TEST-token"));
}
