//! Built-in demo site served by the `dispatchr` binary.
//!
//! Routes:
//! - `GET /` plain HTML index
//! - `GET|POST /echo` echoes `msg` from the query or the JSON body
//! - `GET /hello/<name>` rendered through the `hello.html` template
//! - `GET /visits` counts visits in the signed session cookie
//! - `GET /static/<path:file>` files under `<root>/static`

use std::path::PathBuf;

use axum::http::header::HeaderValue;
use serde_json::json;

use crate::config::AppConfig;
use crate::dispatch::{App, HandlerResult};
use crate::render::{FsResolver, PlaceholderRenderer};
use crate::routing::methods::{GET, POST};
use crate::routing::{RouteError, RouteRegistry};
use crate::web;

pub const HELLO_TEMPLATE: &str = "<!doctype html>\n<title>Hello</title>\n\
<h1>Hello, {{ name }}!</h1>\n<p>{{ request.method }} {{ request.path }}</p>\n";

const INDEX: &str = "<!doctype html>\n<title>dispatchr</title>\n<ul>\n\
<li><a href=\"/echo?msg=hi\">/echo</a></li>\n\
<li><a href=\"/hello/world\">/hello/&lt;name&gt;</a></li>\n\
<li><a href=\"/visits\">/visits</a></li>\n</ul>\n";

/// Declare the demo routes.
pub fn declare(r: &mut RouteRegistry) -> Result<(), RouteError> {
    web!("/", GET).endpoint("index").register(r, |_, _| Ok(INDEX.into()))?;

    web!("/echo", GET, POST).endpoint("echo").register(r, |req, _| {
        let from_body = req
            .json()?
            .and_then(|body| body.get("msg"))
            .and_then(|msg| msg.as_str())
            .map(str::to_string);
        let msg = from_body
            .or_else(|| req.args().get("msg").map(str::to_string))
            .unwrap_or_else(|| "hi".to_string());
        Ok(json!({ "msg": msg }).into())
    })?;

    web!("/hello/<name>", "hello.html", GET)
        .endpoint("hello")
        .register(r, |_, params| Ok(json!({ "name": params.get_str("name") }).into()))?;

    web!("/visits", GET).endpoint("visits").register(r, |req, _| {
        let session = req.session();
        if session.is_null() {
            return Ok("Sessions are disabled: set SECRET_KEY to count visits.".into());
        }
        let visits = session.get_as::<u64>("visits").unwrap_or(0) + 1;
        session.insert("visits", visits)?;
        Ok(json!({ "visits": visits }).into())
    })?;

    web!("/static/<path:file>", GET)
        .endpoint("static")
        .file(true)
        .register(r, |_, params| {
            let file = params.get_str("file").unwrap_or_default();
            Ok(HandlerResult::file(format!("static/{file}")))
        })?;
    Ok(())
}

/// Build the demo application rooted at `root` (defaults to the working
/// directory).
pub fn build(config: AppConfig, root: Option<PathBuf>) -> App {
    let mut builder = App::builder("dispatchr-demo")
        .config(config)
        .template_renderer(PlaceholderRenderer::new().with_template("hello.html", HELLO_TEMPLATE))
        .file_resolver(
            FsResolver::new()
                .with_mimetype("html", "text/html")
                .with_mimetype("css", "text/css")
                .with_mimetype("js", "text/javascript")
                .with_mimetype("txt", "text/plain")
                .with_mimetype("json", "application/json")
                .with_mimetype("png", "image/png")
                .with_mimetype("svg", "image/svg+xml"),
        );
    if let Some(root) = root {
        builder = builder.root(root);
    }

    let app = builder.build();
    app.mount("demo", "/", declare);
    app.after_request(|_, response| {
        response.set_header(
            axum::http::header::SERVER,
            HeaderValue::from_static(concat!("dispatchr/", env!("CARGO_PKG_VERSION"))),
        );
        Ok(())
    });
    app.teardown_request(|req, err| {
        if let Some(err) = err {
            tracing::warn!(path = %req.path(), error = %err, "Demo request ended with an error");
        }
        Ok(())
    });
    app
}
