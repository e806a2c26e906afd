use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum StoreConfig {
    Memory,
    Filesystem { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_store_types() {
        let fs: StoreConfig = serde_yaml::from_str("type: filesystem\npath: /var/lib/subgate").unwrap();
        assert_eq!(
            fs,
            StoreConfig::Filesystem {
                path: "/var/lib/subgate".into()
            }
        );

        let memory: StoreConfig = serde_yaml::from_str("type: memory").unwrap();
        assert_eq!(memory, StoreConfig::Memory);

        assert!(serde_yaml::from_str::<StoreConfig>("type: gcs").is_err());
    }
}
