//! In-process network for tests: canned responses per URL and call counting.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::net::{Network, Request, Response};

#[derive(Clone)]
enum Script {
  Respond(Response),
  Fail,
}

#[derive(Default)]
pub struct ScriptedNetwork {
  scripts: Mutex<HashMap<String, Script>>,
  calls: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(self, url: &str, status: u16, body: &str) -> Self {
    self.respond_with(url, Response::new(url, status, body))
  }

  pub fn respond_with(self, url: &str, response: Response) -> Self {
    self.set(url, Script::Respond(response));
    self
  }

  pub fn fail(self, url: &str) -> Self {
    self.set(url, Script::Fail);
    self
  }

  /// Change the script for `url` after construction.
  pub fn set_response(&self, url: &str, status: u16, body: &str) {
    self.set(url, Script::Respond(Response::new(url, status, body)));
  }

  pub fn set_offline(&self, url: &str) {
    self.set(url, Script::Fail);
  }

  fn set(&self, url: &str, script: Script) {
    self.scripts.lock().unwrap().insert(url.to_string(), script);
  }

  pub fn calls(&self, url: &str) -> usize {
    self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
  }

  pub fn total_calls(&self) -> usize {
    self.calls.lock().unwrap().len()
  }
}

impl Network for ScriptedNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let url = request.url.to_string();
    self.calls.lock().unwrap().push(url.clone());

    let script = self.scripts.lock().unwrap().get(&url).cloned();
    match script {
      Some(Script::Respond(response)) => Ok(response),
      Some(Script::Fail) => Err(eyre!("Failed to fetch {}: network unreachable", url)),
      None => Err(eyre!("Failed to fetch {}: no scripted response", url)),
    }
  }
}
