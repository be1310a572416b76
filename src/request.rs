//! Incoming HTTP request type.

use std::net::SocketAddr;

use crate::method::Method;

/// An incoming request, reduced to what the handlers look at.
///
/// Bodies are never read: every endpoint is driven by path and query.
pub struct Request {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    peer: SocketAddr,
}

impl Request {
    pub(crate) fn new(method: Method, uri: &http::Uri, peer: SocketAddr) -> Self {
        Self {
            method,
            path: uri.path().to_owned(),
            query: uri.query().map(parse_query).unwrap_or_default(),
            peer,
        }
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn peer(&self) -> SocketAddr { self.peer }

    /// First value of a query parameter. `?mb=` yields `Some("")`.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

// No percent-decoding: the only parameter podlab reads is a plain integer.
fn parse_query(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_owned(), v.to_owned()),
            None => (pair.to_owned(), String::new()),
        })
        .collect()
}
