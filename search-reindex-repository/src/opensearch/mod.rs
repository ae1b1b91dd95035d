//! OpenSearch implementation of the search index writer.

mod client;
mod index_settings;

pub use client::OpenSearchClient;
pub use index_settings::index_settings;
