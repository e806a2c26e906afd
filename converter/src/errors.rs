use thiserror::Error;

/// Errors that abort a conversion. A failed conversion never yields a
/// partially rewritten document.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("subscription is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("subscription has no proxy list")]
    MissingProxies,

    #[error("invalid exclude pattern {pattern:?}: {source}")]
    FilterPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
