//! The input document injected into a script realm.
//!
//! Scripts see copies only. Everything here is serialized to JSON once
//! per execution and handed to the realm as plain data; no live engine
//! object ever crosses the boundary.

use indexmap::IndexMap;
use serde::Serialize;
use url::Url;

use crate::models::{
    BodyKind, CookieInfo, DataRow, RequestConfig, RequestError, ResolvedRequest, ResponseInfo,
    ScriptPhase, UrlEncodedPayload,
};
use crate::resolver::ScopeSet;

/// Request data as a script sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub method: String,
    pub url: String,
    /// Header map, last value winning for repeated names
    pub headers: IndexMap<String, String>,
    pub query: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl RequestView {
    /// Pre-request view, built from the resolved config before auth
    /// injection and body encoding.
    pub fn preview(config: &RequestConfig) -> Self {
        let headers = config
            .headers
            .iter()
            .filter(|p| p.enabled)
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect();
        let query = config
            .params
            .iter()
            .filter(|p| p.enabled)
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect();
        RequestView {
            method: config.method.trim().to_uppercase(),
            url: config.url.clone(),
            headers,
            query,
            body: body_preview(&config.body),
        }
    }

    /// Post-send view, built from the snapshot of what actually went out.
    pub fn from_resolved(resolved: &ResolvedRequest) -> Self {
        let headers = resolved
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let query = Url::parse(&resolved.url)
            .map(|url| {
                url.query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        RequestView {
            method: resolved.method.clone(),
            url: resolved.url.clone(),
            headers,
            query,
            body: resolved.body.clone(),
        }
    }
}

fn body_preview(body: &BodyKind) -> Option<String> {
    match body {
        BodyKind::None | BodyKind::Form { .. } | BodyKind::Binary { .. } => None,
        BodyKind::Json { text } | BodyKind::Xml { text } | BodyKind::Raw { text, .. } => {
            Some(text.clone())
        }
        BodyKind::UrlEncoded { payload } => match payload {
            UrlEncodedPayload::Pairs(pairs) => {
                let enabled: Vec<(String, String)> = pairs
                    .iter()
                    .filter(|p| p.enabled)
                    .map(|p| (p.name.clone(), p.value.clone()))
                    .collect();
                serde_urlencoded::to_string(enabled).ok()
            }
            UrlEncodedPayload::Text(text) => Some(text.clone()),
        },
        BodyKind::GraphQl { query, .. } => Some(query.clone()),
    }
}

/// Response data as a script sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseView {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Header map with lowercased names, last value winning
    pub headers: IndexMap<String, String>,
    pub body: String,
    pub time_ms: u64,
    pub size_bytes: u64,
    pub cookies: Vec<CookieInfo>,
}

impl ResponseView {
    pub fn from_response(response: &ResponseInfo) -> Self {
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| (name.to_lowercase(), value.clone()))
            .collect();
        ResponseView {
            status: response.status,
            reason: response.reason.clone(),
            headers,
            body: response.body.clone(),
            time_ms: response.timing.total_ms,
            size_bytes: response.size.total_bytes,
            cookies: response.cookies.clone(),
        }
    }
}

/// Everything one script phase can see.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptInput {
    pub phase: ScriptPhase,
    /// Absent for collection-level scripts, which run outside any request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseView>,
    /// Set when the call settled without a response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RequestError>,
    pub environment: IndexMap<String, String>,
    pub collection_variables: IndexMap<String, String>,
    pub globals: IndexMap<String, String>,
    /// Zero-based iteration index during collection runs
    pub iteration: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<DataRow>,
}

impl ScriptInput {
    /// Input with variable snapshots taken from the loaded scopes and
    /// everything else empty.
    pub fn for_phase(phase: ScriptPhase, scopes: &ScopeSet) -> Self {
        ScriptInput {
            phase,
            request: None,
            response: None,
            error: None,
            environment: scopes.environment_snapshot(),
            collection_variables: scopes.collection_snapshot(),
            globals: scopes.globals_snapshot(),
            iteration: 0,
            data: scopes.data_row.clone(),
        }
    }
}
