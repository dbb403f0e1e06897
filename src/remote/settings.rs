use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{QuotaOracle, RemoteError, StorageLimits, TwirpEndpoint};

const SETTINGS_PREFIX: &str = "regional/general/%";
const TOTAL_LIMIT_PATH: &str = "regional/general/total_user_files_storage_limit_mb";
const FILE_SIZE_LIMIT_PATH: &str = "regional/general/user_file_size_limit_mb";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// System settings client; the source of per-user storage limits.
pub struct HttpSettingsService {
    endpoint: TwirpEndpoint,
}

#[derive(Serialize)]
struct ListRequest<'a> {
    path: &'a str,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    settings: Vec<Setting>,
}

#[derive(Deserialize)]
struct Setting {
    path: String,
    value: String,
}

impl HttpSettingsService {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            endpoint: TwirpEndpoint::new(client, base_url, "settings.SettingsHandler"),
        }
    }
}

#[async_trait]
impl QuotaOracle for HttpSettingsService {
    async fn storage_limits(&self) -> Result<StorageLimits, RemoteError> {
        let resp: ListResponse = self
            .endpoint
            .call(
                "List",
                &ListRequest {
                    path: SETTINGS_PREFIX,
                },
            )
            .await?;

        Ok(StorageLimits {
            total_limit_bytes: parse_megabytes(
                TOTAL_LIMIT_PATH,
                setting_value(&resp.settings, TOTAL_LIMIT_PATH),
            )?,
            file_size_limit_bytes: parse_megabytes(
                FILE_SIZE_LIMIT_PATH,
                setting_value(&resp.settings, FILE_SIZE_LIMIT_PATH),
            )?,
        })
    }
}

fn setting_value<'a>(settings: &'a [Setting], path: &str) -> &'a str {
    settings
        .iter()
        .find(|s| s.path == path)
        .map(|s| s.value.as_str())
        .unwrap_or("")
}

/// Convert a whole number of (base-2) megabytes to bytes. A missing or
/// malformed setting is an error, not a zero limit.
pub fn parse_megabytes(path: &str, value: &str) -> Result<u64, RemoteError> {
    let invalid = || RemoteError::InvalidSetting {
        path: path.to_string(),
        value: value.to_string(),
    };

    value
        .trim()
        .parse::<u64>()
        .map_err(|_| invalid())?
        .checked_mul(BYTES_PER_MB)
        .ok_or_else(invalid)
}
