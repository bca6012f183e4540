//! Response value produced by the middleware chain

use bytes::Bytes;
use serde::Serialize;

use crate::middleware::pipeline::DispatchId;

/// A response produced by a stage or the terminal handler.
///
/// The status is stored as a raw code so that a stage can hand back a value
/// that is not a valid response; the pipeline checks
/// [`Response::is_well_formed`] after every layer.
///
/// ```rust
/// use gantry_middleware::Response;
///
/// let response = Response::ok().header("x-served-by", "gantry").text("hello");
/// assert_eq!(response.status_code(), 200);
/// assert!(response.is_well_formed());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
    dispatches: Vec<DispatchId>,
}

impl Response {
    /// Create response with specific status code
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
            dispatches: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::with_status(200)
    }

    pub fn unauthorized() -> Self {
        Self::with_status(401)
    }

    pub fn not_found() -> Self {
        Self::with_status(404)
    }

    pub fn internal_server_error() -> Self {
        Self::with_status(500)
    }

    /// Add a header (consuming)
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Replace every header with this name, or append it.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    /// Set a plain-text body (`text/plain; charset=utf-8`)
    pub fn text(self, body: impl Into<String>) -> Self {
        self.body_with_type("text/plain; charset=utf-8", body.into())
    }

    /// Set a JSON body from a `serde_json::Value`
    pub fn json_value(self, value: serde_json::Value) -> Self {
        self.body_with_type("application/json", value.to_string())
    }

    /// Serialize `data` as the JSON body
    pub fn json<T: Serialize>(self, data: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(data)?;
        Ok(self.body_with_type("application/json", body))
    }

    fn body_with_type(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.set_header("content-type", content_type);
        self.body = body.into();
        self
    }

    /// Get response status code
    pub fn status_code(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8 text, lossy
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Pipeline runs this response passed out of, innermost first
    pub fn dispatches(&self) -> &[DispatchId] {
        &self.dispatches
    }

    pub(crate) fn stamp(&mut self, dispatch: DispatchId) {
        if !self.dispatches.contains(&dispatch) {
            self.dispatches.push(dispatch);
        }
    }

    /// Whether this value satisfies the response contract of the pipeline:
    /// a status code in `100..=599`.
    pub fn is_well_formed(&self) -> bool {
        (100..=599).contains(&self.status)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::ok()
    }
}
