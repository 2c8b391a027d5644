use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Settings shared by the credential suppliers and the LFS client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AuthConfig {
    pub cache_credentials_in_memory: bool,
    #[serde(deserialize_with = "optional_u64_or_string")]
    pub prompt_timeout_secs: Option<u64>,
    pub lfs_max_prompt_attempts: Option<usize>,
    pub lfs_transfer_adapters: Vec<String>,
    pub lfs_hash_algo: String,
    pub http_connect_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cache_credentials_in_memory: true,
            prompt_timeout_secs: None,
            lfs_max_prompt_attempts: None,
            lfs_transfer_adapters: vec![
                "basic".to_string(),
                "lfs-standalone-file".to_string(),
                "ssh".to_string(),
            ],
            lfs_hash_algo: "sha256".to_string(),
            http_connect_timeout_secs: 30,
        }
    }
}

impl AuthConfig {
    pub fn prompt_timeout(&self) -> Option<Duration> {
        self.prompt_timeout_secs.map(Duration::from_secs)
    }

    pub fn http_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.http_connect_timeout_secs)
    }
}

fn optional_u64_or_string<'deserialize, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'deserialize>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrU64 {
        String(String),
        U64(u64),
    }

    match Option::<StringOrU64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(StringOrU64::U64(v)) => Ok(Some(v)),
        Some(StringOrU64::String(v)) => v
            .trim()
            .trim_end_matches('s')
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
