//! `file` and `file_contents` resolvers: read a local file or remote URL.
//!
//! `file` classifies content by the trailing extension (case-insensitive):
//! `.json` parses as JSON, `.yaml`/`.yml` parses as YAML, anything else is
//! returned as raw decoded text. `file_contents` is the deprecated
//! predecessor that always returns raw text of a local file; it stays
//! supported for existing configs.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use crate::core::{Result, StackctlError};

use super::{ResolutionContext, Resolver, expect_string_argument};

/// How the fetched bytes are interpreted, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentFormat {
    Json,
    Yaml,
    Text,
}

impl ContentFormat {
    fn classify(location: &str) -> Self {
        // For URLs only the path component carries the extension.
        let path = match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url.path().to_string(),
            _ => location.to_string(),
        };
        match Path::new(&path).extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Self::Yaml
            }
            _ => Self::Text,
        }
    }
}

/// Resolves to the contents of a local file or http(s) URL.
pub struct FileResolver {
    location: String,
    /// `file_contents` mode: local only, never parsed.
    raw_only: bool,
    project_root: PathBuf,
}

impl FileResolver {
    /// Factory registered under `file`.
    pub fn create(
        argument: serde_yaml::Value,
        context: ResolutionContext,
    ) -> Result<Arc<dyn Resolver>> {
        let location = expect_string_argument("file", &argument)?;
        Ok(Arc::new(Self { location, raw_only: false, project_root: context.project_root }))
    }

    /// Factory registered under the deprecated `file_contents` alias.
    pub fn create_raw(
        argument: serde_yaml::Value,
        context: ResolutionContext,
    ) -> Result<Arc<dyn Resolver>> {
        let location = expect_string_argument("file_contents", &argument)?;
        Ok(Arc::new(Self { location, raw_only: true, project_root: context.project_root }))
    }

    fn io_error(&self, reason: impl ToString) -> StackctlError {
        StackctlError::ResolutionIo {
            source_path: self.location.clone(),
            reason: reason.to_string(),
        }
    }

    async fn fetch(&self) -> Result<String> {
        if !self.raw_only
            && let Ok(url) = Url::parse(&self.location)
            && matches!(url.scheme(), "http" | "https")
        {
            let response = reqwest::get(url.clone()).await.map_err(|e| self.io_error(e))?;
            // Non-2xx remote status is an I/O failure, same as a missing
            // local file.
            let response = response.error_for_status().map_err(|e| self.io_error(e))?;
            return response.text().await.map_err(|e| self.io_error(e));
        }

        let path = Path::new(&self.location);
        let path =
            if path.is_absolute() { path.to_path_buf() } else { self.project_root.join(path) };
        tokio::fs::read_to_string(&path).await.map_err(|e| self.io_error(e))
    }

    fn parse(&self, text: String) -> Result<serde_yaml::Value> {
        if self.raw_only {
            return Ok(serde_yaml::Value::String(text));
        }
        match ContentFormat::classify(&self.location) {
            ContentFormat::Json => {
                let json: serde_json::Value = serde_json::from_str(&text)
                    .map_err(|e| self.io_error(format!("invalid JSON: {e}")))?;
                serde_yaml::to_value(json).map_err(|e| self.io_error(e))
            }
            ContentFormat::Yaml => serde_yaml::from_str(&text)
                .map_err(|e| self.io_error(format!("invalid YAML: {e}"))),
            ContentFormat::Text => Ok(serde_yaml::Value::String(text)),
        }
    }
}

#[async_trait]
impl Resolver for FileResolver {
    fn name(&self) -> &str {
        if self.raw_only { "file_contents" } else { "file" }
    }

    async fn resolve(&self) -> Result<serde_yaml::Value> {
        let text = self.fetch().await?;
        self.parse(text)
    }
}
