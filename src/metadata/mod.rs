//! Metadata layer.
//!
//! [`MetadataService`] answers every metadata request against the active
//! session; the submodules hold the pure rules it applies to adapter output.

pub mod lineage;
pub mod normalize;
pub mod service;
pub mod similarity;

pub use service::MetadataService;
