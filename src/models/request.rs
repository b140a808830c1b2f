//! Request configuration: what a stored request looks like before resolution,
//! and the `ResolvedRequest` snapshot of what was actually sent.

use serde::{Deserialize, Serialize};

/// A name/value pair with an enabled toggle, used for headers, query
/// parameters, and url-encoded form fields. Disabled pairs are skipped
/// at build time but kept in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Pair {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Pair {
            name: name.into(),
            value: value.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// One multipart form field, either a text value or a file attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    /// Text value; ignored when `file_path` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Path of a file to attach as this part
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Explicit MIME type for the part
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl FormField {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        FormField {
            name: name.into(),
            value: Some(value.into()),
            file_path: None,
            content_type: None,
            enabled: true,
        }
    }

    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        FormField {
            name: name.into(),
            value: None,
            file_path: Some(path.into()),
            content_type: None,
            enabled: true,
        }
    }
}

/// Url-encoded payload: structured pairs or an already-encoded string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlEncodedPayload {
    Pairs(Vec<Pair>),
    Text(String),
}

/// Request body variants as stored on a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyKind {
    #[default]
    None,
    /// Raw JSON text; must parse as valid JSON before sending
    Json { text: String },
    /// Multipart form assembled by the transport
    Form { fields: Vec<FormField> },
    /// application/x-www-form-urlencoded
    UrlEncoded { payload: UrlEncodedPayload },
    Xml { text: String },
    /// Arbitrary text with an optional explicit content type
    Raw {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
    },
    /// Base64-encoded bytes sent verbatim
    Binary {
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
    },
    /// GraphQL operation posted as a JSON envelope
    #[serde(rename = "graphql")]
    GraphQl {
        query: String,
        /// JSON text of the variables object
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variables: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operation_name: Option<String>,
    },
}

/// Where an api-key credential is injected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyPlacement {
    #[default]
    Header,
    Query,
}

/// Authentication applied at build time, after variable resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthSpec {
    #[default]
    None,
    /// `Authorization: Bearer <token>`
    Bearer { token: String },
    /// `Authorization: Basic base64(user:pass)`
    Basic {
        username: String,
        #[serde(default)]
        password: String,
    },
    /// Named credential placed as a header or a query parameter
    ApiKey {
        key: String,
        value: String,
        #[serde(default)]
        placement: ApiKeyPlacement,
    },
}

/// Per-request transport options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Follow 3xx redirects
    pub follow_redirects: bool,
    /// Redirect hop limit when following
    pub max_redirects: u32,
    /// Verify TLS certificates
    pub verify_tls: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        TransportOptions {
            timeout_ms: 30_000,
            follow_redirects: true,
            max_redirects: 10,
            verify_tls: true,
        }
    }
}

/// A stored request as the engine receives it. Every string field may
/// contain `{{variable}}` tokens until resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// HTTP method, uppercased at build time
    pub method: String,
    /// Target URL, possibly templated
    pub url: String,
    pub headers: Vec<Pair>,
    /// Query parameters merged into the URL at build time
    pub params: Vec<Pair>,
    pub body: BodyKind,
    pub auth: AuthSpec,
    /// JavaScript run before the request is sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_request_script: Option<String>,
    /// JavaScript run after the call settles
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_script: Option<String>,
    pub options: TransportOptions,
}

impl Default for RequestConfig {
    fn default() -> Self {
        RequestConfig {
            method: "GET".to_string(),
            url: String::new(),
            headers: Vec::new(),
            params: Vec::new(),
            body: BodyKind::None,
            auth: AuthSpec::None,
            pre_request_script: None,
            test_script: None,
            options: TransportOptions::default(),
        }
    }
}

impl RequestConfig {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        RequestConfig {
            method: method.into(),
            url: url.into(),
            ..RequestConfig::default()
        }
    }
}

/// The request as actually dispatched, recorded on every execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRequest {
    pub method: String,
    /// Final URL including merged query parameters
    pub url: String,
    /// Headers the engine set, including injected auth and content type
    pub headers: Vec<(String, String)>,
    /// Textual body as sent; None for multipart and binary payloads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}
