use axum::Json;
use serde::Serialize;

use crate::api::response::JSend;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct BuildInfo {
    pub commit: Option<&'static str>,
    pub date: Option<&'static str>,
    pub version: &'static str,
}

/// Build metadata. `BUILD_COMMIT` and `BUILD_DATE` are read at compile time.
pub async fn build_info() -> Json<JSend<BuildInfo>> {
    JSend::success(BuildInfo {
        commit: option_env!("BUILD_COMMIT"),
        date: option_env!("BUILD_DATE"),
        version: env!("CARGO_PKG_VERSION"),
    })
}
