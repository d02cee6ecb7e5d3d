//! oncolit-ingestion — Literature-source boundary.
//! Defines the bibliographic `Article` record, the `LiteratureSource` trait
//! and the PubMed E-utilities client.

pub mod models;
pub mod sources;

pub use models::{Article, SearchQuery, SortOrder};
pub use sources::LiteratureSource;
