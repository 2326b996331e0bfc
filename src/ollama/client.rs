/// Ollama HTTP client implementation.
///
/// This module provides `OllamaClient` for making synchronous HTTP requests to the Ollama API,
/// along with error types and builder patterns for configuration.
use std::thread;
use std::time::Duration;

use thiserror::Error;

/// Default request timeout. Tagging a full batch on a local model can take a while.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors that can occur when interacting with the Ollama API.
#[derive(Debug, Error)]
pub enum OllamaError {
    /// Network-related errors (connection failures, DNS resolution, etc.)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Request or response timeout errors
    #[error("Request timed out")]
    Timeout(#[source] reqwest::Error),

    /// HTTP errors with status code
    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    /// Ollama API-specific errors
    #[error("Ollama API error: {message}")]
    Api { message: String },

    /// Invalid URL configuration error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for OllamaError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            OllamaError::Timeout(e)
        } else {
            OllamaError::Network(e)
        }
    }
}

/// Builder for constructing `OllamaClient` instances.
///
/// # Examples
///
/// ```
/// use ankitag::ollama::OllamaClientBuilder;
///
/// let client = OllamaClientBuilder::new()
///     .base_url("http://localhost:11434")
///     .build()
///     .expect("Failed to create client");
/// ```
#[derive(Debug, Default)]
pub struct OllamaClientBuilder {
    base_url: Option<String>,
    model: Option<String>,
    timeout: Option<Duration>,
}

impl OllamaClientBuilder {
    /// Creates a new `OllamaClientBuilder` with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL for the Ollama API (e.g., "http://localhost:11434").
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the model name for Ollama API calls (e.g., "gemma3:4b").
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the per-request timeout. Defaults to [`DEFAULT_TIMEOUT`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the `OllamaClient` with the configured settings.
    ///
    /// # Environment Variables
    ///
    /// If `base_url()` was not called, this method will check the `OLLAMA_HOST`
    /// environment variable. If not set, it defaults to `http://localhost:11434`.
    ///
    /// If `model()` was not called, this method will check the `OLLAMA_MODEL`
    /// environment variable. If not set, it defaults to an empty string.
    ///
    /// # Errors
    ///
    /// Returns `OllamaError::InvalidUrl` if the base URL does not parse.
    pub fn build(self) -> Result<OllamaClient, OllamaError> {
        let base_url = match self.base_url {
            Some(url) => url,
            None => std::env::var("OLLAMA_HOST")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
        };

        let model = match self.model {
            Some(m) => m,
            None => std::env::var("OLLAMA_MODEL").unwrap_or_default(),
        };

        reqwest::Url::parse(&base_url)
            .map_err(|e| OllamaError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        // A bounded timeout guarantees every call returns, so the batch loop cannot hang
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(OllamaError::Network)?;

        Ok(OllamaClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }
}

/// Synchronous HTTP client for interacting with the Ollama API.
///
/// It should be constructed using `OllamaClientBuilder`.
pub struct OllamaClient {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
}

/// Trait for Ollama API client operations.
///
/// This trait enables mocking in unit tests.
pub trait OllamaClientTrait: Send + Sync {
    /// Generates a completion for `prompt` under the `system` instructions.
    ///
    /// Returns the generated text, or an error if the request fails.
    fn generate(&self, model: &str, system: &str, prompt: &str) -> Result<String, OllamaError>;
}

impl OllamaClient {
    /// Returns the base URL configured for this client.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the model name configured for this client.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Lists available models from the Ollama API, sorted by size (largest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the `/api/tags` endpoint cannot be reached.
    pub fn list_models(&self) -> Result<Vec<String>, OllamaError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send()?;

        if !response.status().is_success() {
            return Err(OllamaError::Http {
                status: response.status().as_u16(),
            });
        }

        let json: serde_json::Value = response.json()?;

        let mut models: Vec<(String, u64)> = json
            .get("models")
            .and_then(|m| m.as_array())
            .map(|models| {
                models
                    .iter()
                    .filter_map(|model| {
                        let name = model.get("name").and_then(|n| n.as_str())?;
                        let size = model.get("size").and_then(|s| s.as_u64()).unwrap_or(0);
                        Some((name.to_string(), size))
                    })
                    .collect()
            })
            .unwrap_or_default();

        models.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(models.into_iter().map(|(name, _)| name).collect())
    }

    fn generate_internal(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
    ) -> Result<String, OllamaError> {
        let url = format!("{}/api/generate", self.base_url);
        let request_body = request_body(model, system, prompt);

        retry_with_backoff(|| {
            let response = self.client.post(&url).json(&request_body).send()?;

            let status = response.status();
            if !status.is_success() {
                return Err(OllamaError::Http {
                    status: status.as_u16(),
                });
            }

            let json: serde_json::Value = response.json()?;
            extract_response(&json)
        })
    }
}

impl OllamaClientTrait for OllamaClient {
    fn generate(&self, model: &str, system: &str, prompt: &str) -> Result<String, OllamaError> {
        self.generate_internal(model, system, prompt)
    }
}

fn request_body(model: &str, system: &str, prompt: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "system": system,
        "prompt": prompt,
        "stream": false
    })
}

fn extract_response(json: &serde_json::Value) -> Result<String, OllamaError> {
    if let Some(message) = json.get("error").and_then(|v| v.as_str()) {
        return Err(OllamaError::Api {
            message: message.to_string(),
        });
    }

    json.get("response")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| OllamaError::Api {
            message: "Missing 'response' field in API response".to_string(),
        })
}

/// Retries an operation with exponential backoff.
///
/// This function will retry the operation up to 3 times with delays of 1s, 2s, and 4s.
/// It only retries on transient errors (HTTP 5xx and network errors), not on client errors (HTTP 4xx).
pub fn retry_with_backoff<F, T>(mut f: F) -> Result<T, OllamaError>
where
    F: FnMut() -> Result<T, OllamaError>,
{
    const DELAYS: [u64; 3] = [1, 2, 4]; // seconds

    let mut last_error = match f() {
        Ok(result) => return Ok(result),
        Err(e) if !should_retry(&e) => return Err(e),
        Err(e) => e,
    };

    for &delay_secs in &DELAYS {
        tracing::debug!("Retrying Ollama request in {delay_secs}s after: {last_error}");
        thread::sleep(Duration::from_secs(delay_secs));

        match f() {
            Ok(result) => return Ok(result),
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) => last_error = e,
        }
    }

    Err(last_error)
}

/// Returns `true` for transient errors (HTTP 5xx, network errors, timeouts).
fn should_retry(error: &OllamaError) -> bool {
    match error {
        OllamaError::Network(_) | OllamaError::Timeout(_) => true,
        OllamaError::Http { status } => (500..600).contains(status),
        OllamaError::Api { .. } | OllamaError::InvalidUrl(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn network_error() -> OllamaError {
        OllamaError::Network(
            reqwest::blocking::Client::new()
                .get("not-a-valid-url")
                .build()
                .unwrap_err(),
        )
    }

    #[test]
    fn http_error_variant_with_status_code() {
        let error_msg = format!("{}", OllamaError::Http { status: 404 });
        assert!(error_msg.contains("HTTP error"));
        assert!(error_msg.contains("404"));
    }

    #[test]
    fn builder_timeout_is_recorded() {
        let builder = OllamaClientBuilder::new().timeout(Duration::from_secs(9));
        assert_eq!(builder.timeout, Some(Duration::from_secs(9)));
    }

    #[test]
    #[serial]
    fn build_uses_default_url_when_base_url_not_called() {
        unsafe {
            std::env::remove_var("OLLAMA_HOST");
        }

        let client = OllamaClientBuilder::new().build().unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    #[serial]
    fn build_reads_ollama_host_environment_variable_if_set() {
        unsafe {
            std::env::set_var("OLLAMA_HOST", "http://custom-host:11434");
        }

        let client = OllamaClientBuilder::new().build().unwrap();
        assert_eq!(client.base_url(), "http://custom-host:11434");

        unsafe {
            std::env::remove_var("OLLAMA_HOST");
        }
    }

    #[test]
    #[serial]
    fn builder_values_take_precedence_over_environment() {
        unsafe {
            std::env::set_var("OLLAMA_HOST", "http://env-var-host:11434");
            std::env::set_var("OLLAMA_MODEL", "env-model");
        }

        let client = OllamaClientBuilder::new()
            .base_url("http://builder-host:11434/")
            .model("builder-model")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://builder-host:11434");
        assert_eq!(client.model(), "builder-model");

        unsafe {
            std::env::remove_var("OLLAMA_HOST");
            std::env::remove_var("OLLAMA_MODEL");
        }
    }

    #[test]
    fn build_returns_error_if_invalid_url_provided() {
        let result = OllamaClientBuilder::new()
            .base_url("not-a-valid-url")
            .build();
        assert!(matches!(result, Err(OllamaError::InvalidUrl(_))));
    }

    #[test]
    fn request_body_carries_system_and_prompt() {
        let body = request_body("gemma3:4b", "be terse", "FRONT: a BACK: b");
        assert_eq!(body["model"], "gemma3:4b");
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["prompt"], "FRONT: a BACK: b");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn extract_response_reads_response_field() {
        let json = serde_json::json!({ "response": "FRONT: a <tags>ml</tags>" });
        assert_eq!(extract_response(&json).unwrap(), "FRONT: a <tags>ml</tags>");
    }

    #[test]
    fn extract_response_surfaces_api_error() {
        let json = serde_json::json!({ "error": "model 'x' not found" });
        let err = extract_response(&json).unwrap_err();
        assert!(err.to_string().contains("model 'x' not found"));
    }

    #[test]
    fn retry_succeeds_after_transient_network_error() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let result: Result<&str, OllamaError> = retry_with_backoff(move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 1 {
                Err(network_error())
            } else {
                Ok("success")
            }
        });

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn retry_does_not_occur_on_http_4xx_errors() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let result: Result<&str, OllamaError> = retry_with_backoff(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(OllamaError::Http { status: 404 })
        });

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retry_does_not_occur_on_api_errors() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let result: Result<&str, OllamaError> = retry_with_backoff(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(OllamaError::Api {
                message: "bad model".to_string(),
            })
        });

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retry_occurs_on_http_5xx_errors() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let result: Result<&str, OllamaError> = retry_with_backoff(move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 1 {
                Err(OllamaError::Http { status: 500 })
            } else {
                Ok("success")
            }
        });

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn trait_can_be_implemented_by_mock_struct() {
        struct MockClient {
            response: String,
        }

        impl OllamaClientTrait for MockClient {
            fn generate(&self, _: &str, _: &str, _: &str) -> Result<String, OllamaError> {
                Ok(self.response.clone())
            }
        }

        let mock = MockClient {
            response: "test response".to_string(),
        };
        assert_eq!(mock.generate("m", "s", "p").unwrap(), "test response");
    }
}
