use anyhow::{Result, bail};
use std::collections::HashMap;
use std::sync::Mutex;

use super::Transport;

enum Route {
    Body(String),
    Status(u16),
}

/// Canned responses keyed by exact URL. Unknown URLs fail like a refused
/// connection. Every requested URL is recorded in order.
#[derive(Default)]
pub struct FakeTransport {
    routes: HashMap<String, Route>,
    calls: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: &str, body: &str) -> Self {
        self.routes
            .insert(url.to_string(), Route::Body(body.to_string()));
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.routes.insert(url.to_string(), Route::Status(status));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Transport for FakeTransport {
    fn get_text(&self, url: &str) -> Result<String> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.routes.get(url) {
            Some(Route::Body(body)) => Ok(body.clone()),
            Some(Route::Status(status)) => bail!("HTTP {status}"),
            None => bail!("connection refused"),
        }
    }
}
