//! Turning a batch of cards into per-card tags.
//!
//! The annotation service is a black box that answers a transcript of
//! `FRONT: ... BACK: ...` lines with a transcript of `FRONT: ... <tags>...</tags>`
//! lines. Nothing guarantees that the reply has one line per card, in order,
//! or at all, so the pieces here are kept separate:
//!
//! - [`Annotator`] sends one batch and returns the raw reply text.
//! - [`ResponseParser`] pulls `(front, tags)` pairs out of the reply.
//! - [`align`] matches those pairs back to the batch by front text.
//! - [`merge_tags`] unions new tags with whatever the card already had.

mod aligner;
mod client;
mod merger;
mod parser;
mod prompt;

pub use aligner::{Alignment, align};
pub use client::{AnnotationError, Annotator, CardText, LlmAnnotator, LlmAnnotatorBuilder};
pub use merger::{merge_into, merge_tags};
pub use parser::{ParsedAnnotation, ResponseMarkers, ResponseParser};
pub use prompt::{DEFAULT_TAGS_INSTRUCTIONS, batch_message, system_instructions};
