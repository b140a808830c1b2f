//! `{{variable}}` template resolution.
//!
//! Substitution is a single pass: produced values are inserted verbatim and
//! never rescanned, so a variable whose value contains `{{...}}` cannot
//! recurse. Unknown tokens are left exactly as written.

mod dynamic;

pub use dynamic::dynamic_value;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value as JsonValue;

use crate::models::{
    apply_updates, AuthSpec, BodyKind, DataRow, Pair, RequestConfig, UrlEncodedPayload, Variable,
    VariableUpdates,
};

static TEMPLATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*(\$?[A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}").unwrap()
});

/// Variable scopes loaded for one execution. Lookup precedence is
/// environment, then collection, then workspace globals; the iteration
/// data row only fills names every scope missed. Dynamic `$` generators
/// are checked before any of these.
#[derive(Debug, Clone, Default)]
pub struct ScopeSet {
    pub environment: Vec<Variable>,
    pub collection: Vec<Variable>,
    pub globals: Vec<Variable>,
    pub data_row: Option<DataRow>,
}

impl ScopeSet {
    /// Stored-variable lookup. Disabled variables never resolve.
    pub fn lookup(&self, name: &str) -> Option<String> {
        for scope in [&self.environment, &self.collection, &self.globals] {
            if let Some(var) = scope.iter().find(|v| v.enabled && v.key == name) {
                return Some(var.value.clone());
            }
        }
        if let Some(row) = &self.data_row {
            if let Some(value) = row.get(name) {
                return Some(json_leaf_to_string(value));
            }
        }
        None
    }

    pub fn apply_environment_updates(&mut self, updates: &VariableUpdates) {
        apply_updates(&mut self.environment, updates);
    }

    pub fn apply_collection_updates(&mut self, updates: &VariableUpdates) {
        apply_updates(&mut self.collection, updates);
    }

    pub fn environment_snapshot(&self) -> IndexMap<String, String> {
        snapshot(&self.environment)
    }

    pub fn collection_snapshot(&self) -> IndexMap<String, String> {
        snapshot(&self.collection)
    }

    pub fn globals_snapshot(&self) -> IndexMap<String, String> {
        snapshot(&self.globals)
    }
}

fn snapshot(vars: &[Variable]) -> IndexMap<String, String> {
    vars.iter()
        .filter(|v| v.enabled)
        .map(|v| (v.key.clone(), v.value.clone()))
        .collect()
}

fn json_leaf_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replaces every `{{name}}` token in one pass. Dynamic `$` generators
/// win over stored variables of the same name; names nothing resolves
/// are left verbatim.
pub fn resolve_text(input: &str, scopes: &ScopeSet) -> String {
    if !input.contains("{{") {
        return input.to_string();
    }
    TEMPLATE_RE
        .replace_all(input, |caps: &Captures<'_>| {
            let name = &caps[1];
            dynamic_value(name)
                .or_else(|| scopes.lookup(name))
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Walks a JSON tree and substitutes templates in every string, keys
/// included. Non-string leaves pass through untouched.
pub fn resolve_json(value: &JsonValue, scopes: &ScopeSet) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(resolve_text(s, scopes)),
        JsonValue::Array(items) => {
            JsonValue::Array(items.iter().map(|item| resolve_json(item, scopes)).collect())
        }
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(key, item)| (resolve_text(key, scopes), resolve_json(item, scopes)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_pairs(pairs: &[Pair], scopes: &ScopeSet) -> Vec<Pair> {
    pairs
        .iter()
        .map(|pair| Pair {
            name: resolve_text(&pair.name, scopes),
            value: resolve_text(&pair.value, scopes),
            enabled: pair.enabled,
        })
        .collect()
}

fn resolve_opt(text: &Option<String>, scopes: &ScopeSet) -> Option<String> {
    text.as_ref().map(|t| resolve_text(t, scopes))
}

fn resolve_body(body: &BodyKind, scopes: &ScopeSet) -> BodyKind {
    match body {
        BodyKind::None => BodyKind::None,
        BodyKind::Json { text } => BodyKind::Json {
            text: resolve_text(text, scopes),
        },
        BodyKind::Form { fields } => BodyKind::Form {
            fields: fields
                .iter()
                .map(|field| {
                    let mut resolved = field.clone();
                    resolved.name = resolve_text(&field.name, scopes);
                    resolved.value = resolve_opt(&field.value, scopes);
                    resolved.file_path = resolve_opt(&field.file_path, scopes);
                    resolved
                })
                .collect(),
        },
        BodyKind::UrlEncoded { payload } => BodyKind::UrlEncoded {
            payload: match payload {
                UrlEncodedPayload::Pairs(pairs) => {
                    UrlEncodedPayload::Pairs(resolve_pairs(pairs, scopes))
                }
                UrlEncodedPayload::Text(text) => {
                    UrlEncodedPayload::Text(resolve_text(text, scopes))
                }
            },
        },
        BodyKind::Xml { text } => BodyKind::Xml {
            text: resolve_text(text, scopes),
        },
        BodyKind::Raw { text, content_type } => BodyKind::Raw {
            text: resolve_text(text, scopes),
            content_type: resolve_opt(content_type, scopes),
        },
        // Base64 payload data is opaque; only the content type can be templated
        BodyKind::Binary { data, content_type } => BodyKind::Binary {
            data: data.clone(),
            content_type: resolve_opt(content_type, scopes),
        },
        BodyKind::GraphQl {
            query,
            variables,
            operation_name,
        } => BodyKind::GraphQl {
            query: resolve_text(query, scopes),
            variables: resolve_opt(variables, scopes),
            operation_name: resolve_opt(operation_name, scopes),
        },
    }
}

fn resolve_auth(auth: &AuthSpec, scopes: &ScopeSet) -> AuthSpec {
    match auth {
        AuthSpec::None => AuthSpec::None,
        AuthSpec::Bearer { token } => AuthSpec::Bearer {
            token: resolve_text(token, scopes),
        },
        AuthSpec::Basic { username, password } => AuthSpec::Basic {
            username: resolve_text(username, scopes),
            password: resolve_text(password, scopes),
        },
        AuthSpec::ApiKey {
            key,
            value,
            placement,
        } => AuthSpec::ApiKey {
            key: resolve_text(key, scopes),
            value: resolve_text(value, scopes),
            placement: *placement,
        },
    }
}

/// Returns a copy of the config with every templated string substituted:
/// method, URL, headers, query parameters, body fields, and auth
/// credentials. Script sources are code, not templates, and pass through.
pub fn resolve_config(config: &RequestConfig, scopes: &ScopeSet) -> RequestConfig {
    let mut resolved = config.clone();
    resolved.method = resolve_text(&config.method, scopes);
    resolved.url = resolve_text(&config.url, scopes);
    resolved.headers = resolve_pairs(&config.headers, scopes);
    resolved.params = resolve_pairs(&config.params, scopes);
    resolved.body = resolve_body(&config.body, scopes);
    resolved.auth = resolve_auth(&config.auth, scopes);
    resolved
}
