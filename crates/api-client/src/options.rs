//! Per-request options and body shapes
//!
//! Bodies are kept in a replayable form because a request that hits 401 is
//! sent a second time after the session refresh. Multipart forms are stored
//! as parts and rebuilt into a `reqwest::multipart::Form` on every send.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Request payload.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    /// Sent verbatim, e.g. JSON the caller already serialized.
    Text(String),
    /// Sent verbatim.
    Bytes(Bytes),
    /// Serialized with `serde_json`.
    Json(serde_json::Value),
    /// `multipart/form-data`, e.g. avatar or intro video uploads. reqwest
    /// sets the Content-Type with the part boundary.
    Multipart(MultipartForm),
}

impl Body {
    /// Serialize any value into a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Body::Json)
            .map_err(|e| Error::InvalidRequest(format!("body is not serializable: {e}")))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    pub(crate) fn apply(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        Ok(match self {
            Body::Empty => builder,
            Body::Text(text) => builder.body(text.clone()),
            Body::Bytes(bytes) => builder.body(bytes.clone()),
            Body::Json(value) => {
                let encoded = serde_json::to_vec(value)
                    .map_err(|e| Error::InvalidRequest(format!("encoding JSON body: {e}")))?;
                builder.body(encoded)
            }
            Body::Multipart(form) => builder.multipart(form.build()?),
        })
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Body::Text(value)
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Body::Text(value.to_owned())
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(value))
    }
}

impl From<Bytes> for Body {
    fn from(value: Bytes) -> Self {
        Body::Bytes(value)
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(value)
    }
}

impl From<MultipartForm> for Body {
    fn from(value: MultipartForm) -> Self {
        Body::Multipart(value)
    }
}

#[derive(Debug, Clone)]
enum FormPart {
    Text(String),
    File {
        bytes: Bytes,
        file_name: Option<String>,
        mime: Option<String>,
    },
}

/// Replayable description of a multipart form.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    parts: Vec<(String, FormPart)>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push((name.into(), FormPart::Text(value.into())));
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        bytes: impl Into<Bytes>,
        file_name: Option<String>,
        mime: Option<String>,
    ) -> Self {
        self.parts.push((
            name.into(),
            FormPart::File {
                bytes: bytes.into(),
                file_name,
                mime,
            },
        ));
        self
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    fn build(&self) -> Result<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for (name, part) in &self.parts {
            form = match part {
                FormPart::Text(value) => form.text(name.clone(), value.clone()),
                FormPart::File {
                    bytes,
                    file_name,
                    mime,
                } => {
                    let mut part = reqwest::multipart::Part::bytes(bytes.to_vec());
                    if let Some(file_name) = file_name {
                        part = part.file_name(file_name.clone());
                    }
                    if let Some(mime) = mime {
                        part = part.mime_str(mime).map_err(|e| {
                            Error::InvalidRequest(format!("invalid MIME type {mime:?}: {e}"))
                        })?;
                    }
                    form.part(name.clone(), part)
                }
            };
        }
        Ok(form)
    }
}

/// Options for a single request.
///
/// `timeout` bounds each HTTP call this request makes (the first attempt and
/// the retry) and its wait for a session refresh. Like `cancel`, it only stops
/// this caller from waiting; a refresh other requests depend on keeps running.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Body,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: Body::Empty,
            timeout: None,
            cancel: None,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Attach a body the way the verb helpers do. Text, bytes and JSON bodies
    /// default to `Content-Type: application/json`; a Content-Type the caller
    /// already set is kept, and multipart bodies are left to reqwest.
    pub fn with_shaped_body(mut self, body: Body) -> Self {
        let needs_default = matches!(body, Body::Text(_) | Body::Bytes(_) | Body::Json(_));
        if needs_default && !self.headers.contains_key(CONTENT_TYPE) {
            self.headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        self.body = body;
        self
    }
}
