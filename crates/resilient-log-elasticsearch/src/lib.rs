//! Elasticsearch delivery target.
//!
//! Each entry is written with `PUT /{index}/_create/{hash}`, where `hash` is
//! the content hash of the entry document. A second delivery of the same
//! document answers 409, which counts as delivered.

mod error;
mod target;

pub use error::{EsError, EsResult};
pub use target::{register, ElasticsearchOptions, ElasticsearchTarget, ELASTICSEARCH_TARGET};
