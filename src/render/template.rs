//! Template rendering collaborator.
//!
//! The dispatcher only needs `render(name, context)`. [`PlaceholderRenderer`]
//! is the built-in implementation: `{{ path.to.value }}` substitution with
//! HTML escaping and a small filter chain (`{{ name | upper }}`). Richer
//! engines plug in through [`TemplateRenderer`].

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::http::response::escape_html;

pub type Filter = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template {0:?} not found")]
    NotFound(String),

    #[error("template {name:?} could not be read: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("template {name:?}: {reason}")]
    Syntax { name: String, reason: String },

    #[error("template {name:?} uses unknown filter {filter:?}")]
    UnknownFilter { name: String, filter: String },
}

/// Renders a named template with a JSON context.
pub trait TemplateRenderer: Send + Sync {
    /// `dir` is the working directory of the request, used to locate files.
    fn render(&self, name: &str, context: &Value, dir: Option<&Path>) -> Result<String, TemplateError>;
}

/// `{{ ... }}` substitution over templates loaded from disk or memory.
#[derive(Clone, Default)]
pub struct PlaceholderRenderer {
    sources: HashMap<String, String>,
    filters: HashMap<String, Filter>,
}

impl fmt::Debug for PlaceholderRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaceholderRenderer")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PlaceholderRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-memory template; it shadows files with the same name.
    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.sources.insert(name.into(), source.into());
        self
    }

    /// Register a filter usable as `{{ value | name }}`.
    pub fn with_filter<F>(mut self, name: impl Into<String>, filter: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
        self
    }

    fn load(&self, name: &str, dir: Option<&Path>) -> Result<String, TemplateError> {
        if let Some(source) = self.sources.get(name) {
            return Ok(source.clone());
        }
        let Some(dir) = dir else {
            return Err(TemplateError::NotFound(name.to_string()));
        };
        let path = dir.join(name.trim_start_matches('/'));
        std::fs::read_to_string(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => TemplateError::NotFound(name.to_string()),
            _ => TemplateError::Io {
                name: name.to_string(),
                source,
            },
        })
    }

    fn render_source(&self, name: &str, source: &str, context: &Value) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(source.len());
        let mut rest = source;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| TemplateError::Syntax {
                name: name.to_string(),
                reason: "unclosed '{{'".to_string(),
            })?;
            out.push_str(&self.eval(name, after[..end].trim(), context)?);
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }

    fn eval(&self, name: &str, expr: &str, context: &Value) -> Result<String, TemplateError> {
        let mut parts = expr.split('|').map(str::trim);
        let path = parts.next().unwrap_or_default();
        if path.is_empty() {
            return Err(TemplateError::Syntax {
                name: name.to_string(),
                reason: "empty expression".to_string(),
            });
        }

        let mut value = lookup(context, path).cloned().unwrap_or(Value::Null);
        let mut escape = true;
        for filter in parts {
            if filter == "safe" {
                escape = false;
                continue;
            }
            value = match (builtin_filter(filter, &value), self.filters.get(filter)) {
                (_, Some(custom)) => custom(&value),
                (Some(result), None) => result,
                (None, None) => {
                    return Err(TemplateError::UnknownFilter {
                        name: name.to_string(),
                        filter: filter.to_string(),
                    })
                }
            };
        }

        let text = match value {
            Value::Null => String::new(),
            Value::String(s) => s,
            other => other.to_string(),
        };
        Ok(if escape { escape_html(&text) } else { text })
    }
}

impl TemplateRenderer for PlaceholderRenderer {
    fn render(&self, name: &str, context: &Value, dir: Option<&Path>) -> Result<String, TemplateError> {
        let source = self.load(name, dir)?;
        self.render_source(name, &source, context)
    }
}

fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(context, |value, key| match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn builtin_filter(filter: &str, value: &Value) -> Option<Value> {
    let result = match filter {
        "upper" => Value::String(display(value).to_uppercase()),
        "lower" => Value::String(display(value).to_lowercase()),
        "length" => Value::from(match value {
            Value::String(s) => s.chars().count(),
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            _ => 0,
        }),
        "tojson" => Value::String(value.to_string()),
        _ => return None,
    };
    Some(result)
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_substitution_escapes_html() {
        let renderer = PlaceholderRenderer::new()
            .with_template("page.html", "<h1>{{ title }}</h1><p>{{ user.name | upper }}</p>{{ raw | safe }}");
        let out = renderer
            .render(
                "page.html",
                &json!({"title": "a < b", "user": {"name": "ada"}, "raw": "<br>"}),
                None,
            )
            .unwrap();
        assert_eq!(out, "<h1>a &lt; b</h1><p>ADA</p><br>");
    }

    #[test]
    fn test_missing_values_render_empty() {
        let renderer = PlaceholderRenderer::new().with_template("t", "[{{ nope.deeper }}]{{ items.1 }}");
        let out = renderer.render("t", &json!({"items": [1, 2]}), None).unwrap();
        assert_eq!(out, "[]2");
    }

    #[test]
    fn test_custom_filter_and_errors() {
        let renderer = PlaceholderRenderer::new()
            .with_filter("double", |v| json!(v.as_i64().unwrap_or(0) * 2))
            .with_template("ok", "{{ n | double }}")
            .with_template("bad", "{{ n | nope }}")
            .with_template("open", "{{ n");

        assert_eq!(renderer.render("ok", &json!({"n": 21}), None).unwrap(), "42");
        assert!(matches!(
            renderer.render("bad", &json!({}), None),
            Err(TemplateError::UnknownFilter { .. })
        ));
        assert!(matches!(
            renderer.render("open", &json!({}), None),
            Err(TemplateError::Syntax { .. })
        ));
        assert!(matches!(
            renderer.render("missing", &json!({}), None),
            Err(TemplateError::NotFound(_))
        ));
    }

    #[test]
    fn test_loads_relative_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("templates")).unwrap();
        std::fs::write(dir.path().join("templates/home.html"), "hi {{ name }}").unwrap();

        let out = PlaceholderRenderer::new()
            .render("/templates/home.html", &json!({"name": "bob"}), Some(dir.path()))
            .unwrap();
        assert_eq!(out, "hi bob");
    }
}
