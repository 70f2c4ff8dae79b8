//! Text processing: HTML-to-prose extraction and document segmentation.
//!
//! This crate provides:
//! - [`extract`] — strips markup, script/style, and navigation chrome from a
//!   fetched page, keeping prose content blocks with collapsed whitespace
//! - [`segment`] — splits document text into overlapping chunks sized for
//!   embedding

pub mod extract;
pub mod segment;

pub use extract::extract_text;
pub use segment::Segmenter;
