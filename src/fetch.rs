use log::{debug, warn};
use reqwest::blocking::Client;
use serde_yaml::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Blocking HTTP fetcher. A missing document (any non-2xx status) is an
/// expected outcome and comes back as `None`; only transport failures
/// surface as errors.
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder().build()?;
        Ok(Fetcher { client })
    }

    pub fn fetch_text(&self, url: &str) -> Result<Option<String>, FetchError> {
        let response = self.client.get(url).send()?;
        if !response.status().is_success() {
            debug!("GET {} returned {}", url, response.status());
            return Ok(None);
        }
        Ok(Some(response.text()?))
    }

    pub fn fetch_yaml(&self, url: &str) -> Result<Option<Value>, FetchError> {
        Ok(self.fetch_text(url)?.and_then(|body| parse_yaml_body(&body)))
    }
}

/// Parse a response body as YAML. Unparseable or empty documents count as
/// no data, same as a missing document.
pub(crate) fn parse_yaml_body(body: &str) -> Option<Value> {
    match serde_yaml::from_str::<Value>(body) {
        Ok(Value::Null) => None,
        Ok(Value::Mapping(mapping)) if mapping.is_empty() => None,
        Ok(Value::Sequence(sequence)) if sequence.is_empty() => None,
        Ok(value) => Some(value),
        Err(err) => {
            warn!("Response body is not valid YAML: {err}");
            None
        }
    }
}
