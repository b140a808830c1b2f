//! Request assembly.
//!
//! Turns a resolved config into a dispatchable reqwest request plus the
//! `ResolvedRequest` snapshot recorded on the result. Configuration
//! problems surface here, before any network activity.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use url::Url;

use crate::errors::{Result, WaypostError};
use crate::graphql::GraphQLRequest;
use crate::models::{
    ApiKeyPlacement, AuthSpec, BodyKind, Pair, RequestConfig, ResolvedRequest, UrlEncodedPayload,
};

/// A request ready to send, with the snapshot of what goes on the wire.
#[derive(Debug)]
pub struct BuiltRequest {
    pub builder: reqwest::RequestBuilder,
    pub snapshot: ResolvedRequest,
}

enum Payload {
    Empty,
    Text { text: String, content_type: &'static str },
    TextCustom { text: String, content_type: String },
    Bytes { bytes: Vec<u8>, content_type: String },
    Multipart(reqwest::multipart::Form),
}

/// Validates and assembles a resolved config against a client. The URL
/// must already be parseable; the executor triages unresolved-template
/// URLs before calling in.
pub fn build_request(client: &Client, config: &RequestConfig) -> Result<BuiltRequest> {
    let method = parse_method(config)?;
    let mut url = parse_url(&config.url)?;

    // Query parameters merge into the URL, then query-placed api keys.
    // Entering query_pairs_mut on a query-less URL appends a bare `?`,
    // so only touch it when there is something to add.
    let query_auth = matches!(
        &config.auth,
        AuthSpec::ApiKey {
            placement: ApiKeyPlacement::Query,
            ..
        }
    );
    if query_auth || enabled(&config.params).next().is_some() {
        let mut pairs = url.query_pairs_mut();
        for param in enabled(&config.params) {
            pairs.append_pair(&param.name, &param.value);
        }
        if let AuthSpec::ApiKey {
            key,
            value,
            placement: ApiKeyPlacement::Query,
        } = &config.auth
        {
            pairs.append_pair(key, value);
        }
    }

    let payload = build_payload(&config.body)?;

    let mut headers: Vec<(String, String)> = enabled(&config.headers)
        .map(|pair| (pair.name.clone(), pair.value.clone()))
        .collect();

    let user_set_content_type = headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
    if !user_set_content_type {
        match &payload {
            Payload::Text { content_type, .. } => {
                headers.push(("Content-Type".to_string(), content_type.to_string()));
            }
            Payload::TextCustom { content_type, .. } | Payload::Bytes { content_type, .. } => {
                headers.push(("Content-Type".to_string(), content_type.clone()));
            }
            // Multipart content type carries the boundary and is set by
            // the transport
            Payload::Empty | Payload::Multipart(_) => {}
        }
    }

    match &config.auth {
        AuthSpec::None
        | AuthSpec::ApiKey {
            placement: ApiKeyPlacement::Query,
            ..
        } => {}
        AuthSpec::Bearer { token } => {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }
        AuthSpec::Basic { username, password } => {
            let credentials = STANDARD.encode(format!("{}:{}", username, password));
            headers.push(("Authorization".to_string(), format!("Basic {}", credentials)));
        }
        AuthSpec::ApiKey {
            key,
            value,
            placement: ApiKeyPlacement::Header,
        } => {
            headers.push((key.clone(), value.clone()));
        }
    }

    let mut header_map = HeaderMap::new();
    for (name, value) in &headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| WaypostError::Config(format!("invalid header name: {}", name)))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| WaypostError::Config(format!("invalid value for header {}", name)))?;
        header_map.append(header_name, header_value);
    }

    let snapshot_body = match &payload {
        Payload::Empty | Payload::Bytes { .. } | Payload::Multipart(_) => None,
        Payload::Text { text, .. } | Payload::TextCustom { text, .. } => Some(text.clone()),
    };

    let snapshot = ResolvedRequest {
        method: method.to_string(),
        url: url.to_string(),
        headers,
        body: snapshot_body,
    };

    let mut builder = client
        .request(method, url)
        .timeout(Duration::from_millis(config.options.timeout_ms))
        .headers(header_map);

    builder = match payload {
        Payload::Empty => builder,
        Payload::Text { text, .. } => builder.body(text),
        Payload::TextCustom { text, .. } => builder.body(text),
        Payload::Bytes { bytes, .. } => builder.body(bytes),
        Payload::Multipart(form) => builder.multipart(form),
    };

    Ok(BuiltRequest { builder, snapshot })
}

fn parse_method(config: &RequestConfig) -> Result<Method> {
    let text = config.method.trim();
    if text.is_empty() {
        return Err(WaypostError::Config("request method is empty".to_string()));
    }
    // GraphQL operations always post their envelope
    if matches!(config.body, BodyKind::GraphQl { .. }) {
        return Ok(Method::POST);
    }
    text.to_uppercase()
        .parse::<Method>()
        .map_err(|_| WaypostError::Config(format!("invalid HTTP method: {}", config.method)))
}

fn parse_url(url: &str) -> Result<Url> {
    let text = url.trim();
    if text.is_empty() {
        return Err(WaypostError::Config("request URL is empty".to_string()));
    }
    Url::parse(text).map_err(|e| WaypostError::Config(format!("invalid URL {}: {}", text, e)))
}

fn enabled(pairs: &[Pair]) -> impl Iterator<Item = &Pair> {
    pairs.iter().filter(|pair| pair.enabled)
}

fn build_payload(body: &BodyKind) -> Result<Payload> {
    match body {
        BodyKind::None => Ok(Payload::Empty),
        BodyKind::Json { text } => {
            if text.trim().is_empty() {
                return Ok(Payload::Empty);
            }
            serde_json::from_str::<serde_json::Value>(text)
                .map_err(|e| WaypostError::Config(format!("request body is not valid JSON: {}", e)))?;
            // Send the user's text as written, not a re-serialization
            Ok(Payload::Text {
                text: text.clone(),
                content_type: "application/json",
            })
        }
        BodyKind::UrlEncoded { payload } => {
            let text = match payload {
                UrlEncodedPayload::Pairs(pairs) => {
                    let fields: Vec<(String, String)> = pairs
                        .iter()
                        .filter(|p| p.enabled)
                        .map(|p| (p.name.clone(), p.value.clone()))
                        .collect();
                    serde_urlencoded::to_string(fields).map_err(|e| {
                        WaypostError::Config(format!("failed to encode form body: {}", e))
                    })?
                }
                UrlEncodedPayload::Text(text) => text.clone(),
            };
            Ok(Payload::Text {
                text,
                content_type: "application/x-www-form-urlencoded",
            })
        }
        BodyKind::Xml { text } => Ok(Payload::Text {
            text: text.clone(),
            content_type: "application/xml",
        }),
        BodyKind::Raw { text, content_type } => Ok(Payload::TextCustom {
            text: text.clone(),
            content_type: content_type
                .clone()
                .unwrap_or_else(|| "text/plain".to_string()),
        }),
        BodyKind::Binary { data, content_type } => {
            let bytes = STANDARD
                .decode(data.trim())
                .map_err(|e| WaypostError::Config(format!("binary body is not valid base64: {}", e)))?;
            Ok(Payload::Bytes {
                bytes,
                content_type: content_type
                    .clone()
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
            })
        }
        BodyKind::Form { fields } => {
            let mut form = reqwest::multipart::Form::new();
            for field in fields.iter().filter(|f| f.enabled) {
                if let Some(path) = &field.file_path {
                    let bytes = std::fs::read(path).map_err(|e| {
                        WaypostError::Config(format!("cannot read form file {}: {}", path, e))
                    })?;
                    let file_name = std::path::Path::new(path)
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "file".to_string());
                    let mut part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
                    if let Some(content_type) = &field.content_type {
                        part = part.mime_str(content_type).map_err(|e| {
                            WaypostError::Config(format!(
                                "invalid content type for form field {}: {}",
                                field.name, e
                            ))
                        })?;
                    }
                    form = form.part(field.name.clone(), part);
                } else {
                    form = form.text(field.name.clone(), field.value.clone().unwrap_or_default());
                }
            }
            Ok(Payload::Multipart(form))
        }
        BodyKind::GraphQl {
            query,
            variables,
            operation_name,
        } => {
            let envelope = GraphQLRequest::from_parts(
                query,
                variables.as_deref(),
                operation_name.as_deref(),
            )?;
            Ok(Payload::Text {
                text: envelope.to_json_string(),
                content_type: "application/json",
            })
        }
    }
}
