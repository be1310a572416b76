//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Every podlab endpoint answers in plain text, so a [`Response`] is a status
//! plus a UTF-8 body. Build one in your handler and return it.

use bytes::Bytes;
use http_body_util::Full;

use crate::status::Status;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use podlab::{Response, Status};
///
/// Response::text("ALIVE\n");
/// Response::status(Status::NotFound);
/// Response::builder()
///     .status(Status::InternalServerError)
///     .text("NOT ALIVE\n");
/// ```
pub struct Response {
    body: Bytes,
    content_type: Option<&'static str>,
    status: Status,
}

impl Response {
    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: Status) -> Self {
        Self::builder().status(code).no_body()
    }

    /// Builder for responses that need a custom status.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { status: Status::Ok }
    }

    pub fn status_code(&self) -> Status { self.status }
    pub fn body(&self) -> &[u8] { &self.body }

    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status.into();
        if let Some(content_type) = self.content_type {
            res.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static(content_type),
            );
        }
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Builder for non-200 text responses.
///
/// Obtain via [`Response::builder()`]. Defaults to `Status::Ok` (200).
pub struct ResponseBuilder {
    status: Status,
}

impl ResponseBuilder {
    pub fn status(mut self, code: Status) -> Self {
        self.status = code;
        self
    }

    /// Terminate with a plain-text body.
    pub fn text(self, body: impl Into<String>) -> Response {
        Response {
            body: Bytes::from(body.into()),
            content_type: Some(TEXT_PLAIN),
            status: self.status,
        }
    }

    /// Terminate with no body.
    pub fn no_body(self) -> Response {
        Response { body: Bytes::new(), content_type: None, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a [`Status`] directly from a handler: `return Status::NotFound`
impl IntoResponse for Status {
    fn into_response(self) -> Response { Response::status(self) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_sets_content_type() {
        let res = Response::text("READY\n").into_inner();
        assert_eq!(res.status(), http::StatusCode::OK);
        assert_eq!(res.headers()["content-type"], TEXT_PLAIN);
    }

    #[test]
    fn builder_carries_status() {
        let res = Response::builder()
            .status(Status::ServiceUnavailable)
            .text("NOT READY\n");
        assert_eq!(res.status_code(), Status::ServiceUnavailable);
        assert_eq!(res.body(), b"NOT READY\n");

        let res = res.into_inner();
        assert_eq!(res.status(), http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn bare_status_has_no_body() {
        let res = Status::NotFound.into_response();
        assert_eq!(res.status_code(), Status::NotFound);
        assert!(res.body().is_empty());
    }
}
