//! Domain types for fiscal document processing

pub mod document;
pub mod issuer;
pub mod status;

pub use document::{DocumentKind, ExtractedDocument};
pub use issuer::canonical_issuer_name;
pub use status::ProcessingStatus;
