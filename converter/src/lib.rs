//! Turns an upstream proxy subscription document into a complete client
//! configuration: region classification, proxy filtering, policy groups,
//! routing rules and DNS behaviour tuned to the requesting client.

pub mod dns;
pub mod errors;
pub mod filter;
pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod region;
pub mod rules;
pub mod topology;
pub mod variant;

pub use dns::GeoxUrls;
pub use errors::ConvertError;
pub use filter::FilterCriteria;
pub use pipeline::{ConvertOptions, convert_document, convert_yaml};
pub use variant::ClientVariant;
