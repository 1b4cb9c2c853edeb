//! Signed cookie sessions across requests.

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{quiet_config, scenario_app};
use dispatchr::testing::TestClient;
use dispatchr::AppConfig;

fn stored_value(client: &TestClient) -> Value {
    let body: Value = client.get("/session/get").unwrap().json().unwrap();
    body["value"].clone()
}

#[test]
fn test_session_round_trip() {
    let client = TestClient::new(scenario_app(quiet_config()));
    let response = client.get("/session/set/blue").unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.header("set-cookie").unwrap().starts_with("session="));
    assert!(response.header("set-cookie").unwrap().contains("HttpOnly"));

    assert_eq!(stored_value(&client), json!("blue"));
}

#[test]
fn test_reading_the_session_adds_vary_cookie() {
    let client = TestClient::new(scenario_app(quiet_config()));
    let response = client.get("/session/get").unwrap();
    assert_eq!(response.header("vary"), Some("Cookie"));

    let response = client.get("/echo").unwrap();
    assert_eq!(response.header("vary"), None);
}

#[test]
fn test_tampered_cookie_gives_empty_session() {
    let client = TestClient::new(scenario_app(quiet_config()));
    client.get("/session/set/blue").unwrap();
    let cookie = client.cookie("session").unwrap();
    client.set_cookie("session", format!("{cookie}x"));

    let response = client.get("/session/get").unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().unwrap();
    assert_eq!(body["value"], Value::Null);
}

#[test]
fn test_rotated_key_still_accepted_from_fallbacks() {
    let app = scenario_app(quiet_config().with_secret_key("old-key"));
    let client = TestClient::new(app.clone());
    client.get("/session/set/kept").unwrap();

    app.replace_config(AppConfig {
        secret_key_fallbacks: vec!["old-key".to_string()],
        ..quiet_config().with_secret_key("new-key")
    });
    assert_eq!(stored_value(&client), json!("kept"));

    // The read above re-signed the cookie with the new primary key.
    app.replace_config(quiet_config().with_secret_key("new-key"));
    assert_eq!(stored_value(&client), json!("kept"));
}

#[test]
fn test_dropped_fallback_discards_session() {
    let app = scenario_app(quiet_config().with_secret_key("old-key"));
    let client = TestClient::new(app.clone());
    client.get("/session/set/lost").unwrap();

    app.replace_config(AppConfig {
        session_refresh_each_request: false,
        ..quiet_config().with_secret_key("new-key")
    });
    assert_eq!(stored_value(&client), Value::Null);
}

#[test]
fn test_without_secret_key_sessions_are_null() {
    let config = AppConfig {
        secret_key: None,
        ..quiet_config()
    };
    let client = TestClient::new(scenario_app(config));
    let response = client.get("/session/set/blue").unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.header("set-cookie").is_none());
    assert_eq!(stored_value(&client), Value::Null);
}
