//! Request and response types shared by the router, the strategies and storage.

use clap::ValueEnum;
use reqwest::Method;
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// How the page issued a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum RequestMode {
  /// Top-level navigation to a document
  Navigate,
  SameOrigin,
  /// Cross-origin load whose response the page may not inspect
  NoCors,
  #[default]
  Cors,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub mode: RequestMode,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      mode: RequestMode::default(),
      headers: Vec::new(),
      body: None,
    }
  }

  /// A plain GET, as issued for manifest entries and subresources.
  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  /// A top-level document navigation.
  pub fn navigate(url: Url) -> Self {
    Self::get(url).with_mode(RequestMode::Navigate)
  }

  pub fn with_mode(mut self, mode: RequestMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn with_body(mut self, body: Vec<u8>) -> Self {
    self.body = Some(body);
    self
  }

  /// Identity of this request inside a cache generation.
  pub fn cache_key(&self) -> RequestKey {
    RequestKey::new(&self.method, &self.url)
  }
}

/// Cache identity of a request: method plus URL without its fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  method: String,
  url: String,
}

impl RequestKey {
  pub fn new(method: &Method, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: method.as_str().to_string(),
      url: url.into(),
    }
  }

  /// Rebuild a key from its stored parts.
  pub fn from_parts(method: impl Into<String>, url: impl Into<String>) -> Self {
    Self {
      method: method.into(),
      url: url.into(),
    }
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// SHA256 hash for stable, fixed-length storage keys.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// Response type as observed by the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseKind {
  /// Same-origin response
  #[default]
  Basic,
  /// Cross-origin response with CORS access
  Cors,
  /// Cross-origin response whose status and headers are hidden
  Opaque,
}

impl ResponseKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResponseKind::Basic => "basic",
      ResponseKind::Cors => "cors",
      ResponseKind::Opaque => "opaque",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "basic" => Some(ResponseKind::Basic),
      "cors" => Some(ResponseKind::Cors),
      "opaque" => Some(ResponseKind::Opaque),
      _ => None,
    }
  }
}

/// A response snapshot. Cloning produces an independent copy of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  /// Final URL the response was served from
  pub url: String,
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub kind: ResponseKind,
}

impl Response {
  pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      url: url.into(),
      status,
      headers: Vec::new(),
      body: body.into(),
      kind: ResponseKind::Basic,
    }
  }

  /// Opaque responses report status 0 and carry no headers.
  pub fn opaque(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
    Self {
      kind: ResponseKind::Opaque,
      ..Self::new(url, 0, body)
    }
  }

  #[cfg(test)]
  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn is_opaque(&self) -> bool {
    self.kind == ResponseKind::Opaque
  }

  /// Only status-200 and opaque responses may be written to a generation.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200 || self.is_opaque()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_cache_key_ignores_fragment() {
    let a = Request::get(url("https://app.test/index.html#board")).cache_key();
    let b = Request::get(url("https://app.test/index.html")).cache_key();
    assert_eq!(a, b);
    assert_eq!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn test_cache_key_includes_method() {
    let get = Request::get(url("https://app.test/api")).cache_key();
    let head = Request::new(Method::HEAD, url("https://app.test/api")).cache_key();
    assert_ne!(get.cache_hash(), head.cache_hash());
    assert_eq!(get.to_string(), "GET https://app.test/api");
  }

  #[test]
  fn test_cacheable_statuses() {
    assert!(Response::new("https://app.test/", 200, "ok").is_cacheable());
    assert!(Response::opaque("https://cdn.test/bg.png", vec![1u8, 2]).is_cacheable());
    assert!(!Response::new("https://app.test/", 404, "").is_cacheable());
    assert!(!Response::new("https://app.test/", 204, "").is_cacheable());
  }

  #[test]
  fn test_header_lookup_is_case_insensitive() {
    let response =
      Response::new("https://app.test/", 200, "").with_header("Content-Type", "text/html");
    assert_eq!(response.header("content-type"), Some("text/html"));
    assert_eq!(response.header("etag"), None);
  }

  #[test]
  fn test_response_kind_names() {
    for kind in [ResponseKind::Basic, ResponseKind::Cors, ResponseKind::Opaque] {
      assert_eq!(ResponseKind::parse(kind.as_str()), Some(kind));
    }
    assert_eq!(ResponseKind::parse("error"), None);
  }
}
