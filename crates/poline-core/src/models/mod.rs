//! Data models: configuration, upstream documents, line items.

pub mod config;
pub mod document;
pub mod line_item;
