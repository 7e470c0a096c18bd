// Minimal HTTP/1.x surface for the live test server: enough to read one
// request off a connection and render one response back, nothing more.

use std::io::{self, BufRead};

use thiserror::Error;

const MAX_HEADER_COUNT: usize = 128;
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Simple HTTP request representation handed to request handlers.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method (GET, POST, ...)
    pub method: String,
    /// Request target as sent by the client (e.g. "/static/app.css?v=2")
    pub path: String,
    /// HTTP version token (e.g. "HTTP/1.1")
    pub version: String,
    /// Request headers in arrival order
    pub headers: Vec<(String, String)>,
    /// Request body, empty unless a Content-Length was supplied
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Looks a header up case-insensitively, returning the first match.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Simple HTTP response representation returned by request handlers.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code (e.g. 200)
    pub status: u16,
    /// Status text (e.g. "OK")
    pub status_text: String,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create a 200 OK text response with the given body.
    #[must_use]
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::asset("text/plain", body)
    }

    /// Create a 200 OK response carrying an asset body verbatim.
    #[must_use]
    pub fn asset(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        let body_bytes = body.into();
        Self {
            status: 200,
            status_text: "OK".to_string(),
            headers: vec![
                ("Content-Type".to_string(), content_type.to_string()),
                ("Content-Length".to_string(), body_bytes.len().to_string()),
            ],
            body: body_bytes,
        }
    }

    /// Create an empty response with a custom status.
    #[must_use]
    pub fn status(code: u16, text: &str) -> Self {
        Self {
            status: code,
            status_text: text.to_string(),
            headers: vec![("Content-Length".to_string(), "0".to_string())],
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self::status(404, "Not Found")
    }

    #[must_use]
    pub fn bad_request() -> Self {
        Self::status(400, "Bad Request")
    }

    /// Render the response to HTTP/1.1 wire format.
    #[must_use]
    pub fn render(&self) -> Vec<u8> {
        let mut response = format!("HTTP/1.1 {} {}\r\n", self.status, self.status_text);

        for (key, value) in &self.headers {
            response.push_str(&format!("{key}: {value}\r\n"));
        }
        response.push_str("Connection: close\r\n\r\n");

        let mut bytes = response.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

#[derive(Debug, Error)]
pub enum RequestReadError {
    #[error("malformed http request: {0}")]
    Malformed(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reads a single HTTP/1.x request off `reader`.
///
/// Bodies are consumed only when a Content-Length header is present; the
/// server speaks `Connection: close`, so there is never a second request
/// behind the first.
pub(crate) fn read_request<R: BufRead>(reader: &mut R) -> Result<HttpRequest, RequestReadError> {
    let request_line = read_crlf_line(reader)?;
    let mut parts = request_line.split_whitespace();

    let method = parts
        .next()
        .ok_or(RequestReadError::Malformed("empty request line"))?
        .to_string();
    let path = parts
        .next()
        .ok_or(RequestReadError::Malformed("request line has no target"))?
        .to_string();
    let version = parts
        .next()
        .ok_or(RequestReadError::Malformed("request line has no version"))?
        .to_string();
    if parts.next().is_some() || !version.starts_with("HTTP/") {
        return Err(RequestReadError::Malformed("bad request line"));
    }

    let mut headers = Vec::new();
    loop {
        let line = read_crlf_line(reader)?;
        if line.is_empty() {
            break;
        }
        if headers.len() == MAX_HEADER_COUNT {
            return Err(RequestReadError::Malformed("too many headers"));
        }
        let (key, value) = line
            .split_once(':')
            .ok_or(RequestReadError::Malformed("header line has no colon"))?;
        // only optional whitespace is trimmed from values
        headers.push((
            key.trim().to_string(),
            value.trim_matches([' ', '\t']).to_string(),
        ));
    }

    let content_length = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("Content-Length"))
        .map(|(_, value)| value.parse::<usize>())
        .transpose()
        .map_err(|_| RequestReadError::Malformed("bad content-length"))?;

    let body = match content_length {
        Some(length) if length > MAX_BODY_BYTES => {
            return Err(RequestReadError::Malformed("body too large"));
        }
        Some(length) => {
            let mut body = vec![0u8; length];
            reader.read_exact(&mut body)?;
            body
        }
        None => Vec::new(),
    };

    Ok(HttpRequest {
        method,
        path,
        version,
        headers,
        body,
    })
}

fn read_crlf_line<R: BufRead>(reader: &mut R) -> Result<String, RequestReadError> {
    let mut buffer = Vec::new();
    let read = reader.read_until(b'\n', &mut buffer)?;
    if read == 0 {
        return Err(RequestReadError::Malformed("connection closed mid-request"));
    }
    // strip exactly one line terminator; anything before it is payload
    if buffer.last() == Some(&b'\n') {
        buffer.pop();
        if buffer.last() == Some(&b'\r') {
            buffer.pop();
        }
    }
    String::from_utf8(buffer)
        .map_err(|_| RequestReadError::Malformed("request is not valid utf-8"))
}
