//! Collaborators outside the relational store and the search engine.

mod consortium;
pub(crate) mod source_of_record;

pub use consortium::{ConsortiumTenantProvider, StaticConsortiumProvider};
pub use source_of_record::{HttpRecordSourceClient, RecordSourceClient};
