//! The real HTTP server, driven over a socket.

mod common;

use std::time::Duration;

use common::{quiet_config, scenario_app, spawn_server};
use serde_json::{json, Value};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scenarios_over_http() {
    let (addr, shutdown, handle) = spawn_server(scenario_app(quiet_config())).await;
    let base = format!("http://{addr}");
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    let response = client.get(format!("{base}/echo")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), r#"{"msg": "hi"}"#);

    let response = client.get(format!("{base}/simple")).send().await.unwrap();
    assert_eq!(response.status(), 500);

    let response = client.get(format!("{base}/nope")).send().await.unwrap();
    assert_eq!(response.status(), 404);

    let response = client.get(format!("{base}/submit")).send().await.unwrap();
    assert_eq!(response.status(), 405);
    assert!(response.headers()["allow"].to_str().unwrap().contains("POST"));

    let response = client
        .post(format!("{base}/submit"))
        .form(&[("name", "grace")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "got grace");

    let response = client.get(format!("{base}/collection")).send().await.unwrap();
    assert_eq!(response.status(), 308);

    let body: Value = client
        .get(format!("{base}/user/5"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"id": 5}));

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not shut down")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_session_cookie_over_http() {
    let (addr, shutdown, handle) = spawn_server(scenario_app(quiet_config())).await;
    let base = format!("http://{addr}");
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{base}/session/set/green"))
        .send()
        .await
        .unwrap();
    let cookie = response.headers()["set-cookie"]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let body: Value = client
        .get(format!("{base}/session/get"))
        .header("cookie", cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"value": "green"}));

    shutdown.trigger();
    handle.await.unwrap();
}
