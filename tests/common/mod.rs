//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use dispatchr::routing::methods::{GET, POST};
use dispatchr::routing::RouteRegistry;
use dispatchr::{web, App, AppConfig, HandlerResult, HttpServer, Shutdown};

/// Config with exceptions turned into responses and sessions enabled.
pub fn quiet_config() -> AppConfig {
    AppConfig {
        debug: false,
        testing: false,
        propagate_exceptions: Some(false),
        ..AppConfig::default().with_secret_key("integration-secret")
    }
}

/// Routes used by the end-to-end scenarios.
pub fn declare_scenarios(r: &mut RouteRegistry) -> Result<(), dispatchr::routing::RouteError> {
    web!("/simple").register(r, |_, _| Ok(HandlerResult::None))?;
    web!("/echo", GET).register(r, |_, _| Ok(json!({"msg": "hi"}).into()))?;
    web!("/submit", POST).register(r, |req, _| {
        Ok(format!("got {}", req.form().get("name").unwrap_or("nobody")).into())
    })?;
    web!("/user/<int:id>", GET).register(r, |_, params| {
        Ok(json!({"id": params.get_int("id")}).into())
    })?;
    web!("/collection/", GET, POST).register(r, |_, _| Ok("collection".into()))?;
    web!("/session/set/<value>", GET).register(r, |req, params| {
        req.session().insert("value", params.get_str("value"))?;
        Ok("stored".into())
    })?;
    web!("/session/get", GET).register(r, |req, _| {
        Ok(json!({"value": req.session().get("value")}).into())
    })?;
    web!("/whoami/<int:n>", GET).register(r, |req, params| {
        let current = dispatchr::current_request()?;
        Ok(json!({
            "n": params.get_int("n"),
            "path": current.path(),
            "same": std::ptr::eq(current.as_ref(), req),
        })
        .into())
    })?;
    Ok(())
}

pub fn scenario_app(config: AppConfig) -> App {
    let app = App::builder("scenarios").config(config).build();
    app.mount("scenarios", "/", declare_scenarios);
    app
}

/// A shared, ordered record of hook invocations.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Serve `app` on an ephemeral local port.
pub async fn spawn_server(app: App) -> (SocketAddr, Shutdown, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move {
        HttpServer::new(app)
            .run(listener, server_shutdown)
            .await
            .unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown, handle)
}
