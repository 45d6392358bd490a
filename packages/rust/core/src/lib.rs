//! Core pipeline orchestration and domain logic for goalforge.
//!
//! Bulk export → trimmer → extractor (classifier + identifier recognizer)
//! → per-product aggregates → goal synthesizer → goal sheet.

pub mod asin;
pub mod classify;
pub mod extractor;
pub mod generator;
pub mod listing;
pub mod pipeline;
pub mod trimmer;

#[cfg(test)]
mod test_support;
