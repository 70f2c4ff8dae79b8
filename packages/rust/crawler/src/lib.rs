//! Concurrent, scope-aware help-center crawler.
//!
//! This crate provides [`Crawler`], a breadth-first crawler bounded by depth
//! and domain that reduces each fetched page to a prose [`Document`] ready
//! for segmentation.
//!
//! [`Document`]: deskbot_shared::Document

pub mod engine;

pub use engine::{CrawlOutcome, Crawler, normalize_url};
