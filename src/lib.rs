pub mod annotator;
pub mod batcher;
pub mod models;
pub mod ollama;
pub mod pipeline;
pub mod store;
pub mod writer;

pub use annotator::{AnnotationError, Annotator, LlmAnnotator, LlmAnnotatorBuilder};
pub use models::{FieldSchema, Record};
pub use ollama::{OllamaClient, OllamaClientBuilder, OllamaClientTrait};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineConfig, PipelineError, RunSummary};
pub use store::{Deck, MalformedPolicy, StoreError};
pub use writer::{IncrementalWriter, RecordSink};
