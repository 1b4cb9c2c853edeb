//! Route pattern parsing and typed path converters.
//!
//! # Responsibilities
//! - Parse `/user/<int:id>/` style patterns into segments
//! - Convert raw path segments into typed parameters
//! - Rank patterns by specificity
//! - Build URLs back from parameters
//!
//! # Design Decisions
//! - A placeholder always spans a whole segment
//! - Only the last segment may use the `path` converter
//! - Matching works on already percent-decoded segments

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use uuid::Uuid;

use crate::routing::RouteError;

/// Bytes left unescaped in built path segments and query components.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn encode(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

/// A typed path parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Path(String),
    Uuid(Uuid),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) | ParamValue::Path(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            ParamValue::Uuid(u) => Some(*u),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) | ParamValue::Path(s) => f.write_str(s),
            ParamValue::Int(n) => write!(f, "{n}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Uuid(u) => write!(f, "{}", u.hyphenated()),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        ParamValue::Int(n)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<Uuid> for ParamValue {
    fn from(u: Uuid) -> Self {
        ParamValue::Uuid(u)
    }
}

/// Named parameters extracted from a matched path, in pattern order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathParams {
    items: Vec<(String, ParamValue)>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        let name = name.into();
        let value = value.into();
        match self.items.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.items.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.items.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_int)
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_float)
    }

    pub fn get_uuid(&self, name: &str) -> Option<Uuid> {
        self.get(name).and_then(ParamValue::as_uuid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Serialize for PathParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.items.len()))?;
        for (name, value) in &self.items {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Converts one raw path segment into a typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Converter {
    String {
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
    Int {
        min: Option<i64>,
        max: Option<i64>,
    },
    Float,
    Path,
    Uuid,
    Any(Vec<String>),
}

impl Converter {
    fn parse(pattern: &str, name: &str, args: Option<&str>) -> Result<Self, RouteError> {
        let args = parse_args(args.unwrap_or(""));
        let invalid = |reason: String| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        match name {
            "string" | "default" => {
                let (mut min_length, mut max_length) = (None, None);
                for (key, value) in args {
                    let n = value
                        .parse::<usize>()
                        .map_err(|_| invalid(format!("{value:?} is not a length")))?;
                    match key.as_deref() {
                        Some("minlength") => min_length = Some(n),
                        Some("maxlength") => max_length = Some(n),
                        Some("length") => {
                            min_length = Some(n);
                            max_length = Some(n);
                        }
                        _ => return Err(invalid(format!("unexpected string argument {value:?}"))),
                    }
                }
                Ok(Converter::String {
                    min_length,
                    max_length,
                })
            }
            "int" => {
                let (mut min, mut max) = (None, None);
                for (key, value) in args {
                    let n = value
                        .parse::<i64>()
                        .map_err(|_| invalid(format!("{value:?} is not an integer")))?;
                    match key.as_deref() {
                        Some("min") => min = Some(n),
                        Some("max") => max = Some(n),
                        _ => return Err(invalid(format!("unexpected int argument {value:?}"))),
                    }
                }
                Ok(Converter::Int { min, max })
            }
            "float" => Ok(Converter::Float),
            "path" => Ok(Converter::Path),
            "uuid" => Ok(Converter::Uuid),
            "any" => {
                let values: Vec<String> = args.into_iter().map(|(_, v)| v).collect();
                if values.is_empty() {
                    return Err(invalid("any() needs at least one value".to_string()));
                }
                Ok(Converter::Any(values))
            }
            other => Err(RouteError::UnknownConverter {
                pattern: pattern.to_string(),
                converter: other.to_string(),
            }),
        }
    }

    /// Lower ranks are more specific.
    pub fn rank(&self) -> u8 {
        match self {
            Converter::Any(_) => 1,
            Converter::Int { .. } | Converter::Float | Converter::Uuid => 2,
            Converter::String { .. } => 3,
            Converter::Path => 4,
        }
    }

    pub fn convert(&self, raw: &str) -> Option<ParamValue> {
        match self {
            Converter::String {
                min_length,
                max_length,
            } => {
                let len = raw.chars().count();
                if len == 0
                    || min_length.is_some_and(|min| len < min)
                    || max_length.is_some_and(|max| len > max)
                {
                    return None;
                }
                Some(ParamValue::Str(raw.to_string()))
            }
            Converter::Int { min, max } => {
                if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                let n = raw.parse::<i64>().ok()?;
                if min.is_some_and(|min| n < min) || max.is_some_and(|max| n > max) {
                    return None;
                }
                Some(ParamValue::Int(n))
            }
            Converter::Float => {
                let (whole, frac) = raw.split_once('.')?;
                let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
                if !digits(whole) || !digits(frac) {
                    return None;
                }
                raw.parse::<f64>().ok().map(ParamValue::Float)
            }
            Converter::Path => (!raw.is_empty()).then(|| ParamValue::Path(raw.to_string())),
            Converter::Uuid => {
                if raw.len() != 36 {
                    return None;
                }
                Uuid::parse_str(raw).ok().map(ParamValue::Uuid)
            }
            Converter::Any(values) => values
                .iter()
                .any(|v| v == raw)
                .then(|| ParamValue::Str(raw.to_string())),
        }
    }

    fn to_url(&self, value: &ParamValue) -> Option<String> {
        let raw = value.to_string();
        self.convert(&raw)?;
        Some(match self {
            Converter::Path => raw.split('/').map(encode).collect::<Vec<_>>().join("/"),
            _ => encode(&raw),
        })
    }
}

/// Split `a=1, b="x", c` into optional-key/value pairs.
fn parse_args(args: &str) -> Vec<(Option<String>, String)> {
    args.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(|arg| {
            let (key, value) = match arg.split_once('=') {
                Some((k, v)) => (Some(k.trim().to_string()), v.trim()),
                None => (None, arg),
            };
            let value = value.trim_matches(|c| c == '"' || c == '\'');
            (key, value.to_string())
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Static(String),
    Param { name: String, converter: Converter },
}

impl Segment {
    fn rank(&self) -> u8 {
        match self {
            Segment::Static(_) => 0,
            Segment::Param { converter, .. } => converter.rank(),
        }
    }
}

/// Outcome of matching a path against one pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternMatch {
    Exact(PathParams),
    /// The pattern ends in `/` and the path does not.
    MissingSlash(PathParams),
}

/// A request path split into decoded segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPath {
    pub segments: Vec<String>,
    pub trailing_slash: bool,
}

impl SplitPath {
    pub fn new(path: &str) -> Self {
        let body = path.strip_prefix('/').unwrap_or(path);
        let (body, trailing_slash) = match body.strip_suffix('/') {
            Some(rest) => (rest, true),
            None => (body, false),
        };
        let segments = if body.is_empty() {
            Vec::new()
        } else {
            body.split('/')
                .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
                .collect()
        };
        Self {
            segments,
            trailing_slash,
        }
    }
}

/// A compiled route pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
    trailing_slash: bool,
}

impl Pattern {
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::InvalidPattern {
            pattern: raw.to_string(),
            reason: reason.to_string(),
        };

        let body = raw
            .strip_prefix('/')
            .ok_or_else(|| invalid("must start with '/'"))?;
        let (body, trailing_slash) = match body.strip_suffix('/') {
            Some(rest) => (rest, true),
            None => (body, false),
        };

        let mut segments = Vec::new();
        if !body.is_empty() {
            for part in body.split('/') {
                segments.push(parse_segment(raw, part)?);
            }
        }

        let mut names = HashSet::new();
        let last = segments.len().saturating_sub(1);
        for (idx, segment) in segments.iter().enumerate() {
            if let Segment::Param { name, converter } = segment {
                if !names.insert(name.as_str()) {
                    return Err(invalid("duplicate parameter name"));
                }
                if *converter == Converter::Path && idx != last {
                    return Err(invalid("path converter must be the last segment"));
                }
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
            trailing_slash,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn has_trailing_slash(&self) -> bool {
        self.trailing_slash
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn matches(&self, path: &SplitPath, strict_slashes: bool) -> Option<PatternMatch> {
        let parts = &path.segments;
        let mut params = PathParams::new();
        let mut i = 0;

        for segment in &self.segments {
            match segment {
                Segment::Static(expected) => {
                    if parts.get(i)? != expected {
                        return None;
                    }
                    i += 1;
                }
                Segment::Param {
                    name,
                    converter: Converter::Path,
                } => {
                    if i >= parts.len() {
                        return None;
                    }
                    let joined = parts[i..].join("/");
                    params.insert(name.clone(), Converter::Path.convert(&joined)?);
                    i = parts.len();
                }
                Segment::Param { name, converter } => {
                    let value = converter.convert(parts.get(i)?)?;
                    params.insert(name.clone(), value);
                    i += 1;
                }
            }
        }

        if i != parts.len() {
            return None;
        }

        if self.trailing_slash == path.trailing_slash || !strict_slashes {
            Some(PatternMatch::Exact(params))
        } else if self.trailing_slash {
            Some(PatternMatch::MissingSlash(params))
        } else {
            None
        }
    }

    /// Compare two patterns; `Less` means `self` is tried first.
    pub fn cmp_specificity(&self, other: &Pattern) -> Ordering {
        for (a, b) in self.segments.iter().zip(&other.segments) {
            match a.rank().cmp(&b.rank()) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        other.segments.len().cmp(&self.segments.len())
    }

    /// Build a path from parameters. Unused parameters become the query string.
    pub fn build(&self, params: &PathParams) -> Option<String> {
        let mut used = HashSet::new();
        let mut path = String::new();

        for segment in &self.segments {
            path.push('/');
            match segment {
                Segment::Static(s) => path.push_str(&encode(s)),
                Segment::Param { name, converter } => {
                    let value = params.get(name)?;
                    path.push_str(&converter.to_url(value)?);
                    used.insert(name.as_str());
                }
            }
        }
        if self.trailing_slash || path.is_empty() {
            path.push('/');
        }

        let query: Vec<String> = params
            .iter()
            .filter(|(name, _)| !used.contains(name))
            .map(|(name, value)| {
                format!("{}={}", encode(name), encode(&value.to_string()))
            })
            .collect();
        if !query.is_empty() {
            path.push('?');
            path.push_str(&query.join("&"));
        }
        Some(path)
    }
}

fn parse_segment(pattern: &str, part: &str) -> Result<Segment, RouteError> {
    let invalid = |reason: &str| RouteError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if part.is_empty() {
        return Err(invalid("empty segment"));
    }

    let Some(inner) = part.strip_prefix('<').and_then(|p| p.strip_suffix('>')) else {
        if part.contains('<') || part.contains('>') {
            return Err(invalid("a placeholder must span a whole segment"));
        }
        return Ok(Segment::Static(part.to_string()));
    };

    let (converter_def, name) = match inner.rsplit_once(':') {
        Some((converter_def, name)) => (Some(converter_def.trim()), name.trim()),
        None => (None, inner.trim()),
    };

    let valid_name = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_name {
        return Err(invalid("placeholder name must be an identifier"));
    }

    let converter = match converter_def {
        None => Converter::String {
            min_length: None,
            max_length: None,
        },
        Some(converter_def) => match converter_def.split_once('(') {
            Some((conv, args)) => {
                let args = args
                    .strip_suffix(')')
                    .ok_or_else(|| invalid("unclosed converter arguments"))?;
                Converter::parse(pattern, conv.trim(), Some(args))?
            }
            None => Converter::parse(pattern, converter_def, None)?,
        },
    };

    Ok(Segment::Param {
        name: name.to_string(),
        converter,
    })
}
