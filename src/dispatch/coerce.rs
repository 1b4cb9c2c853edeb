//! Handler result coercion.
//!
//! # Responsibilities
//! - Turn a [`HandlerResult`] into a [`Response`] using the matched route's
//!   hints (template, file mode, mimetype)
//! - Stamp the route's CORS headers on whatever comes out
//!
//! # Design Decisions
//! - Explicit responses and responders always win over route hints
//! - A template route renders any context-like result; file mode serves a
//!   file named by the result, or the request path when there is none
//! - Files are streamed; only `text/*` types get a charset appended

use std::path::Path;

use axum::http::header::{self, HeaderValue};
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};

use crate::dispatch::{App, DispatchError, HandlerResult};
use crate::http::request::Request;
use crate::http::response::{Body, Response};

/// Browser cache lifetime for files served by file-mode routes.
pub const FILE_CACHE_CONTROL: &str = "public, max-age=10800";

const DEFAULT_FILE_MIMETYPE: &str = "application/octet-stream";

/// Coerce `rv` into the response for `request`.
pub fn make_response(
    app: &App,
    request: &Request,
    rv: HandlerResult,
) -> Result<Response, DispatchError> {
    let route = request.route();
    let template = route.and_then(|r| r.template());
    let file_mode = route.is_some_and(|r| r.is_file());

    let mut response = match rv {
        HandlerResult::None if template.is_none() && !file_mode => {
            return Err(DispatchError::Contract(format!(
                "The view function for {:?} did not return a valid response. The function \
                 either returned None or ended without a return statement.",
                endpoint_name(request)
            )));
        }
        HandlerResult::Response(response) => response,
        HandlerResult::Responder(responder) => responder.respond(request)?,
        HandlerResult::File(path) => file_response(app, request, &path.to_string_lossy())?,
        rv if template.is_some() => {
            let name = template.unwrap_or_default();
            template_response(app, request, name, rv)?
        }
        rv if file_mode => {
            let target = file_target(request, rv)?;
            file_response(app, request, &target)?
        }
        HandlerResult::Json(value) => Response::json(&value)?,
        HandlerResult::Raw(body) => Response::with_body(body),
        other => {
            return Err(DispatchError::Contract(format!(
                "The view function for {:?} returned a {} result, which its route cannot \
                 turn into a response.",
                endpoint_name(request),
                other.kind()
            )));
        }
    };

    if let Some(cors) = route.and_then(|r| r.cors()) {
        cors.apply(&mut response)?;
    }
    Ok(response)
}

fn endpoint_name(request: &Request) -> String {
    request
        .endpoint()
        .map(ToString::to_string)
        .unwrap_or_else(|| request.path().to_string())
}

fn template_response(
    app: &App,
    request: &Request,
    name: &str,
    rv: HandlerResult,
) -> Result<Response, DispatchError> {
    let mut context = match rv {
        HandlerResult::None | HandlerResult::Json(Value::Null) => Map::new(),
        HandlerResult::Json(Value::Object(map)) | HandlerResult::Template(Value::Object(map)) => {
            map
        }
        HandlerResult::Template(Value::Null) => Map::new(),
        other => {
            return Err(DispatchError::Contract(format!(
                "Template route {:?} needs an object context, got a {} result",
                name,
                other.kind()
            )));
        }
    };
    let current = request_context(request);
    context.insert("result".to_string(), current.clone());
    context.insert("request".to_string(), current);

    let html = app
        .templates()
        .render(name, &Value::Object(context), request.cwd())?;
    tracing::debug!(template = %name, path = %request.path(), "Template rendered");
    Ok(Response::html(html))
}

/// What templates see as `result` and its alias `request`.
pub fn request_context(request: &Request) -> Value {
    let args: Map<String, Value> = request
        .args()
        .iter()
        .fold(Map::new(), |mut args, (key, value)| {
            args.entry(key.to_string())
                .or_insert_with(|| Value::String(value.to_string()));
            args
        });
    let view_args = request
        .view_args()
        .and_then(|params| serde_json::to_value(params).ok())
        .unwrap_or_else(|| Value::Object(Map::new()));

    serde_json::json!({
        "method": request.method().as_str(),
        "path": request.path(),
        "url": request.url(),
        "args": args,
        "endpoint": request.endpoint().map(ToString::to_string),
        "view_args": view_args,
    })
}

fn file_target(request: &Request, rv: HandlerResult) -> Result<String, DispatchError> {
    match rv {
        HandlerResult::None => Ok(percent_decode_str(request.path())
            .decode_utf8_lossy()
            .into_owned()),
        HandlerResult::Json(Value::String(name)) => Ok(name),
        HandlerResult::Raw(Body::Bytes(bytes)) => String::from_utf8(bytes.to_vec())
            .map_err(|_| DispatchError::Contract("file name is not valid UTF-8".to_string())),
        other => Err(DispatchError::Contract(format!(
            "File route {:?} needs a file name, got a {} result",
            endpoint_name(request),
            other.kind()
        ))),
    }
}

fn file_response(app: &App, request: &Request, relative: &str) -> Result<Response, DispatchError> {
    let cwd = request.cwd().unwrap_or_else(|| Path::new("."));
    let file = app.files().resolve(cwd, relative)?;

    let mimetype = request
        .route()
        .and_then(|r| r.mimetype())
        .map(str::to_string)
        .or(file.mimetype)
        .unwrap_or_else(|| DEFAULT_FILE_MIMETYPE.to_string());
    let content_type = with_charset(&mimetype);

    let mut response = Response::with_body(Body::Stream(file.body));
    response.set_content_type(&content_type)?;
    if let Some(len) = file.len {
        response.set_header(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    response.set_header(
        header::CACHE_CONTROL,
        HeaderValue::from_static(FILE_CACHE_CONTROL),
    );
    tracing::debug!(file = %relative, mimetype = %content_type, "Serving file");
    Ok(response)
}

fn with_charset(mimetype: &str) -> String {
    if mimetype.starts_with("text/") && !mimetype.contains("charset") {
        format!("{mimetype}; charset=utf-8")
    } else {
        mimetype.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::transport::Envelope;
    use crate::routing::RouteRegistry;
    use crate::web;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    fn body_string(response: Response) -> String {
        let (_, _, body) = response.into_parts();
        match body {
            Body::Empty => String::new(),
            Body::Bytes(bytes) => String::from_utf8(bytes.to_vec()).unwrap(),
            Body::Stream(stream) => {
                let bytes: Vec<u8> = stream.flat_map(|chunk| chunk.unwrap().to_vec()).collect();
                String::from_utf8(bytes).unwrap()
            }
        }
    }

    #[test]
    fn test_with_charset_only_for_text() {
        assert_eq!(with_charset("text/css"), "text/css; charset=utf-8");
        assert_eq!(with_charset("text/html; charset=latin-1"), "text/html; charset=latin-1");
        assert_eq!(with_charset("image/png"), "image/png");
    }

    #[test]
    fn test_template_route_renders_context() {
        let app = App::builder("tpl")
            .template_renderer(
                crate::render::PlaceholderRenderer::new()
                    .with_template("hello.html", "<p>{{ name }} {{ request.method }} {{ request.args.q }}</p>"),
            )
            .build();
        app.mount("root", "/", |r: &mut RouteRegistry| {
            web!("/hello", "hello.html").register(r, |_, _| Ok(json!({"name": "<b>"}).into()))?;
            Ok(())
        });

        let response = app.handle(Envelope::new(Method::GET, "/hello?q=x")).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response), "<p>&lt;b&gt; GET x</p>");
    }

    #[test]
    fn test_template_route_with_no_result() {
        let app = App::builder("tpl-none")
            .template_renderer(
                crate::render::PlaceholderRenderer::new().with_template("p.html", "{{ request.path }}"),
            )
            .build();
        app.mount("root", "/", |r: &mut RouteRegistry| {
            web!("/p", "p.html").register(r, |_, _| Ok(HandlerResult::None))?;
            Ok(())
        });

        let response = app.handle(Envelope::new(Method::GET, "/p")).unwrap();
        assert_eq!(body_string(response), "/p");
    }

    #[test]
    fn test_file_mode_serves_request_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("static")).unwrap();
        std::fs::write(dir.path().join("static/site.css"), "body{}").unwrap();

        let app = App::builder("files")
            .root(dir.path())
            .file_resolver(crate::render::FsResolver::new().with_mimetype("css", "text/css"))
            .build();
        app.mount("root", "/", |r: &mut RouteRegistry| {
            web!("/static/<path:name>").file(true).register(r, |_, _| Ok(HandlerResult::None))?;
            Ok(())
        });

        let response = app.handle(Envelope::new(Method::GET, "/static/site.css")).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.header("content-type"), Some("text/css; charset=utf-8"));
        assert_eq!(response.header("cache-control"), Some(FILE_CACHE_CONTROL));
        assert_eq!(response.header("content-length"), Some("6"));
        assert_eq!(body_string(response), "body{}");
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::builder("files-missing").root(dir.path()).build();
        app.mount("root", "/", |r: &mut RouteRegistry| {
            web!("/dl").file(true).register(r, |_, _| Ok("report.pdf".into()))?;
            Ok(())
        });

        let response = app.handle(Envelope::new(Method::GET, "/dl")).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_route_mimetype_overrides_guess() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("feed"), "<rss/>").unwrap();
        let app = App::builder("mime").root(dir.path()).build();
        app.mount("root", "/", |r: &mut RouteRegistry| {
            web!("/feed")
                .file(true)
                .mimetype("application/rss+xml")
                .register(r, |_, _| Ok(HandlerResult::None))?;
            Ok(())
        });

        let response = app.handle(Envelope::new(Method::GET, "/feed")).unwrap();
        assert_eq!(response.header("content-type"), Some("application/rss+xml"));
    }

    #[test]
    fn test_cors_applied_to_plain_result() {
        let app = App::builder("cors").build();
        app.mount("root", "/", |r: &mut RouteRegistry| {
            web!("/api")
                .cors(crate::http::cors::Cors::new())
                .register(r, |_, _| Ok(json!({"ok": true}).into()))?;
            Ok(())
        });

        let response = app.handle(Envelope::new(Method::GET, "/api")).unwrap();
        assert_eq!(response.header("access-control-allow-origin"), Some("*"));
        assert_eq!(response.header("content-type"), Some("application/json"));
    }
}
