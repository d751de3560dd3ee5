use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub accelerator_available: bool,
    pub model_loaded: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub endpoints: BTreeMap<String, String>,
}

impl ServiceInfo {
    pub fn current() -> Self {
        let endpoints = [
            ("/generate", "POST - Generate 3D model from text"),
            ("/health", "GET - Health check"),
            ("/files/{job_id}/{filename}", "GET - Download generated files"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            name: "forge3d text-to-3D API".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Generate 3D assets from text descriptions".to_string(),
            endpoints,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}
