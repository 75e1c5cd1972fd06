//! Request and input types for consumer-facing operations

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppError;
use crate::orchestrator::CheckOptions;
use crate::service::platform::Platform;
use crate::service::platform_version::PlatformVersion;
use crate::service::service::{Service, ServicePatch, slugify};
use crate::version::semver::SemanticVersion;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckRequest {
    /// Services to check; all registered services when `None`
    pub service_ids: Option<Vec<String>>,
    pub options: CheckOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompareRequest {
    pub service_ids: Vec<String>,
    /// Platforms to compare; web/ios/android when `None`
    pub platforms: Option<Vec<Platform>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateVersionRequest {
    pub service_id: String,
    pub platform: String,
    pub new_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformVersionInput {
    pub current: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceInput {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub documentation_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    pub platforms: IndexMap<Platform, PlatformVersionInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateServiceInput {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub documentation_url: Option<String>,
    pub logo_url: Option<String>,
    pub platforms: Option<IndexMap<Platform, PlatformVersionInput>>,
}

/// One rejected input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Collects field errors so a caller sees all of them at once
#[derive(Debug, Default)]
struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    fn reject(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    fn require_text(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.reject(field, "must not be empty");
        }
    }

    fn require_url(&mut self, field: &str, value: &str) {
        match Url::parse(value.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => self.reject(field, format!("unsupported scheme '{}'", url.scheme())),
            Err(e) => self.reject(field, format!("invalid URL: {}", e)),
        }
    }

    fn version(&mut self, field: String, value: &str) -> Option<SemanticVersion> {
        match SemanticVersion::parse(value.trim()) {
            Ok(version) => Some(version),
            Err(e) => {
                self.reject(field, e.to_string());
                None
            }
        }
    }

    fn platforms(
        &mut self,
        platforms: &IndexMap<Platform, PlatformVersionInput>,
    ) -> Vec<PlatformVersion> {
        platforms
            .iter()
            .filter_map(|(platform, input)| {
                let current = self.version(format!("platforms.{}.current", platform), &input.current);
                let latest = match &input.latest {
                    Some(latest) => {
                        Some(self.version(format!("platforms.{}.latest", platform), latest)?)
                    }
                    None => None,
                };
                Some(PlatformVersion::with_latest(platform.clone(), current?, latest))
            })
            .collect()
    }

    fn finish(self, message: &str) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::validation_with(
                message,
                json!({ "fields": self.errors }),
            ))
        }
    }
}

impl CreateServiceInput {
    /// Validate every field and build the new service; the id is the
    /// slug of the name.
    pub fn into_service(self, now: DateTime<Utc>) -> Result<Service, AppError> {
        let mut validator = Validator::default();
        validator.require_text("name", &self.name);
        validator.require_text("category", &self.category);
        validator.require_url("documentationUrl", &self.documentation_url);
        if let Some(logo_url) = &self.logo_url {
            validator.require_url("logoUrl", logo_url);
        }
        if self.platforms.is_empty() {
            validator.reject("platforms", "at least one platform is required");
        }
        let id = slugify(&self.name);
        if id.is_empty() && !self.name.trim().is_empty() {
            validator.reject("name", "must contain letters or digits");
        }
        let platforms = validator.platforms(&self.platforms);
        validator.finish("Invalid service")?;

        let service = Service::new(id, self.name.trim(), self.category.trim(), now)
            .with_description(self.description.trim())
            .with_documentation_url(self.documentation_url.trim());
        let service = match self.logo_url {
            Some(url) => service.with_logo_url(url.trim()),
            None => service,
        };

        Ok(platforms
            .into_iter()
            .fold(service, |service, version| service.with_platform(version)))
    }
}

impl UpdateServiceInput {
    pub fn into_patch(self) -> Result<ServicePatch, AppError> {
        let mut validator = Validator::default();
        if let Some(name) = &self.name {
            validator.require_text("name", name);
        }
        if let Some(category) = &self.category {
            validator.require_text("category", category);
        }
        if let Some(url) = &self.documentation_url {
            validator.require_url("documentationUrl", url);
        }
        if let Some(url) = &self.logo_url {
            validator.require_url("logoUrl", url);
        }
        let platforms = self
            .platforms
            .as_ref()
            .map(|platforms| validator.platforms(platforms))
            .unwrap_or_default();
        validator.finish("Invalid service update")?;

        let patch = ServicePatch {
            name: self.name.map(|name| name.trim().to_string()),
            category: self.category.map(|category| category.trim().to_string()),
            description: self.description,
            documentation_url: self.documentation_url.map(|url| url.trim().to_string()),
            logo_url: self.logo_url.map(|url| url.trim().to_string()),
            platforms,
        };

        if patch.is_empty() {
            return Err(AppError::validation("No fields to update"));
        }
        Ok(patch)
    }
}
