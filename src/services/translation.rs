use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::*;
use serde::{Deserialize, Serialize};

use crate::storage::LocalStore;
use crate::GenericError;

pub const API_URL_KEY: &str = "translation_api_url";
pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const SERVER_FAILURE: &str = "Dịch thất bại. Vui lòng kiểm tra kết nối server.";
pub const URL_FAILURE: &str = "Dịch thất bại. Vui lòng kiểm tra URL backend.";

#[async_trait]
pub trait TranslationService: Send + Sync {
    /// English to Vietnamese. Never fails; problems come back as a readable message.
    async fn translate(&self, text: &str) -> String;
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    translated_text: Option<String>,
}

/// Calls the translation backend whose base URL lives in local storage.
pub struct BackendTranslator {
    client: reqwest::Client,
    store: Arc<LocalStore>,
}

impl BackendTranslator {
    pub fn new(store: Arc<LocalStore>) -> Result<Self, GenericError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(BackendTranslator { client, store })
    }

    pub fn api_url(&self) -> String {
        self.store
            .get(API_URL_KEY)
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn set_api_url(&self, url: &str) -> Result<(), GenericError> {
        self.store.set(API_URL_KEY, url.trim())
    }

    pub fn endpoint(&self) -> String {
        endpoint_for(&self.api_url())
    }
}

pub fn endpoint_for(base_url: &str) -> String {
    let base = base_url.trim();
    let base = base.strip_suffix('/').unwrap_or(base);
    format!("{}/api/translate", base)
}

#[async_trait]
impl TranslationService for BackendTranslator {
    async fn translate(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }
        let endpoint = self.endpoint();

        let response = match self
            .client
            .post(&endpoint)
            .json(&TranslateRequest { text })
            .send()
            .await
        {
            Ok(response) => response,
            Err(why) => {
                error!("Failed to reach translation backend {}: {}", endpoint, why);
                return URL_FAILURE.to_string();
            }
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!("Translation backend error: {} {}", status, detail);
            return SERVER_FAILURE.to_string();
        }

        match response.json::<TranslateResponse>().await {
            Ok(body) => body.translated_text.unwrap_or_default(),
            Err(why) => {
                error!("Unreadable translation response: {}", why);
                URL_FAILURE.to_string()
            }
        }
    }
}
