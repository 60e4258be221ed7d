use reqwest::Method;

use crate::net::{Request, RequestMode};

/// How an intercepted request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  /// Not intercepted; the request goes to the network untouched
  Passthrough,
  /// The application document: stale-while-revalidate
  Document,
  /// Everything else: cache-first
  Asset,
}

/// Classifies requests by method, mode and path.
#[derive(Debug, Clone)]
pub struct Router {
  entry_document: String,
}

impl Router {
  pub fn new(entry_document: impl Into<String>) -> Self {
    Self {
      entry_document: entry_document.into(),
    }
  }

  pub fn classify(&self, request: &Request) -> Route {
    // Mutating requests must always reach the network
    if request.method != Method::GET {
      return Route::Passthrough;
    }

    let path = request.url.path();
    if request.mode == RequestMode::Navigate
      || path.ends_with(&self.entry_document)
      || path.ends_with('/')
    {
      Route::Document
    } else {
      Route::Asset
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  fn classify(method: Method, url: &str, mode: RequestMode) -> Route {
    let request = Request::new(method, Url::parse(url).unwrap()).with_mode(mode);
    Router::new("index.html").classify(&request)
  }

  #[test]
  fn test_non_get_passes_through() {
    for method in [Method::POST, Method::PUT, Method::DELETE, Method::PATCH, Method::HEAD] {
      assert_eq!(
        classify(method, "https://app.test/index.html", RequestMode::Navigate),
        Route::Passthrough
      );
    }
  }

  #[test]
  fn test_navigation_is_document() {
    assert_eq!(
      classify(Method::GET, "https://app.test/game?id=3", RequestMode::Navigate),
      Route::Document
    );
  }

  #[test]
  fn test_entry_document_and_directory_paths() {
    assert_eq!(
      classify(Method::GET, "https://app.test/chess/index.html", RequestMode::Cors),
      Route::Document
    );
    assert_eq!(
      classify(Method::GET, "https://app.test/chess/", RequestMode::Cors),
      Route::Document
    );
    assert_eq!(
      classify(Method::GET, "https://app.test/", RequestMode::NoCors),
      Route::Document
    );
  }

  #[test]
  fn test_query_does_not_affect_path() {
    assert_eq!(
      classify(Method::GET, "https://app.test/index.html?v=2", RequestMode::Cors),
      Route::Document
    );
    assert_eq!(
      classify(Method::GET, "https://app.test/app.js?dir=/", RequestMode::Cors),
      Route::Asset
    );
  }

  #[test]
  fn test_other_gets_are_assets() {
    assert_eq!(
      classify(Method::GET, "https://app.test/icon.png", RequestMode::NoCors),
      Route::Asset
    );
    assert_eq!(
      classify(Method::GET, "https://unpkg.test/react.min.js", RequestMode::Cors),
      Route::Asset
    );
  }
}
