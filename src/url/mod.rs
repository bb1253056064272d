//! URL handling module for Shelf-Scout
//!
//! This module provides product URL normalization and the per-seller extraction
//! rules that turn rendered page content into a set of product URLs.

mod extractor;
mod normalize;

pub use extractor::{ProductUrlRule, UrlExtractor};
pub use normalize::normalize_url;
