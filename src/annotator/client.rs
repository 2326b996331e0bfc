use std::sync::Arc;

use thiserror::Error;

use crate::ollama::{OllamaClientTrait, OllamaError};

use super::prompt::{DEFAULT_TAGS_INSTRUCTIONS, batch_message, system_instructions};
use super::ResponseMarkers;

/// Failures of the annotation service. Both abort the current run.
#[derive(Debug, Error)]
pub enum AnnotationError {
    /// The service could not be reached or refused the request
    #[error("Annotation service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The service did not answer in time
    #[error("Annotation service timed out")]
    ServiceTimeout,
}

impl From<OllamaError> for AnnotationError {
    fn from(e: OllamaError) -> Self {
        match e {
            OllamaError::Timeout(_) => AnnotationError::ServiceTimeout,
            other => AnnotationError::ServiceUnavailable(other.to_string()),
        }
    }
}

/// The front and back text of one card, as sent to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardText<'a> {
    pub front: &'a str,
    pub back: &'a str,
}

/// Anything that can annotate a batch of cards with free-form reply text.
///
/// Implementations must always return; retries and timeouts are their own
/// business, the pipeline calls each batch exactly once.
pub trait Annotator: Send + Sync {
    fn annotate(&self, cards: &[CardText<'_>]) -> Result<String, AnnotationError>;
}

/// Builder for constructing `LlmAnnotator` instances.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use ankitag::annotator::LlmAnnotatorBuilder;
/// use ankitag::ollama::OllamaClientBuilder;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = OllamaClientBuilder::new().build()?;
/// let annotator = LlmAnnotatorBuilder::new()
///     .client(Arc::new(client))
///     .model("gemma3:4b")
///     .build();
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct LlmAnnotatorBuilder {
    client: Option<Arc<dyn OllamaClientTrait>>,
    model: Option<String>,
    tags_instructions: Option<String>,
    markers: Option<ResponseMarkers>,
}

impl LlmAnnotatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Ollama client used to send requests.
    pub fn client(mut self, client: Arc<dyn OllamaClientTrait>) -> Self {
        self.client = Some(client);
        self
    }

    /// Sets the model name passed on every request.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the tag vocabulary instructions appended to the system prompt.
    pub fn tags_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.tags_instructions = Some(instructions.into());
        self
    }

    /// Sets the markers the service is told to use in its reply.
    pub fn markers(mut self, markers: ResponseMarkers) -> Self {
        self.markers = Some(markers);
        self
    }

    /// Builds the `LlmAnnotator`.
    ///
    /// # Panics
    ///
    /// Panics if `client()` was not called before `build()`.
    #[must_use]
    pub fn build(self) -> LlmAnnotator {
        let markers = self.markers.unwrap_or_default();
        let instructions = self
            .tags_instructions
            .unwrap_or_else(|| DEFAULT_TAGS_INSTRUCTIONS.to_string());

        LlmAnnotator {
            client: self.client.expect("client must be set via client() method"),
            model: self.model.unwrap_or_default(),
            system: system_instructions(&instructions, &markers),
            markers,
        }
    }
}

/// Annotates batches by prompting an LLM through an Ollama-compatible API.
pub struct LlmAnnotator {
    client: Arc<dyn OllamaClientTrait>,
    model: String,
    system: String,
    markers: ResponseMarkers,
}

impl LlmAnnotator {
    /// Returns the system instructions sent with every batch.
    pub fn system(&self) -> &str {
        &self.system
    }
}

impl Annotator for LlmAnnotator {
    fn annotate(&self, cards: &[CardText<'_>]) -> Result<String, AnnotationError> {
        let message = batch_message(cards, &self.markers);
        let reply = self.client.generate(&self.model, &self.system, &message)?;
        tracing::debug!(cards = cards.len(), "Raw annotation reply:\n{reply}");
        Ok(reply)
    }
}
