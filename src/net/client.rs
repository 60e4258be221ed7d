use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::NetworkConfig;

use super::{Network, Request, RequestMode, Response, ResponseKind};

/// HTTP client used for every fetch the worker performs.
#[derive(Clone)]
pub struct HttpClient {
  client: reqwest::Client,
  /// Origin the application is served from
  scope: Url,
}

impl HttpClient {
  pub fn new(config: &NetworkConfig, scope: Url) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(&config.user_agent)
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, scope })
  }

  fn response_kind(&self, request: &Request) -> ResponseKind {
    if request.url.origin() == self.scope.origin() {
      ResponseKind::Basic
    } else if request.mode == RequestMode::NoCors {
      ResponseKind::Opaque
    } else {
      ResponseKind::Cors
    }
  }
}

impl Network for HttpClient {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let url = response.url().to_string();
    let headers: Vec<(String, String)> = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?
      .to_vec();

    debug!(url = %request.url, status, bytes = body.len(), "fetched");

    let response = match self.response_kind(request) {
      // Status and headers of opaque responses are not observable
      ResponseKind::Opaque => Response::opaque(url, body),
      kind => Response {
        url,
        status,
        headers,
        body,
        kind,
      },
    };

    Ok(response)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client() -> HttpClient {
    let scope = Url::parse("https://app.test/chess/").unwrap();
    HttpClient::new(&NetworkConfig::default(), scope).unwrap()
  }

  #[test]
  fn test_same_origin_is_basic() {
    let request = Request::get(Url::parse("https://app.test/chess/index.html").unwrap());
    assert_eq!(client().response_kind(&request), ResponseKind::Basic);
  }

  #[test]
  fn test_cross_origin_kinds() {
    let url = Url::parse("https://cdn.test/react.js").unwrap();
    let cors = Request::get(url.clone());
    let no_cors = Request::get(url).with_mode(RequestMode::NoCors);
    assert_eq!(client().response_kind(&cors), ResponseKind::Cors);
    assert_eq!(client().response_kind(&no_cors), ResponseKind::Opaque);
  }
}
