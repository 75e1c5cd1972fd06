//! Read-side filters over registry services

use crate::service::platform::Platform;
use crate::service::service::Service;
use crate::version::status::DriftStatus;

/// Conjunction of optional criteria; an empty filter matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceFilter {
    /// Case-insensitive category equality
    pub category: Option<String>,
    /// Service configures this platform
    pub platform: Option<Platform>,
    /// Overall (most critical) status equals this
    pub status: Option<DriftStatus>,
    /// Case-insensitive substring over name, description and category
    pub search: Option<String>,
}

impl ServiceFilter {
    pub fn with_category(self, category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..self
        }
    }

    pub fn with_platform(self, platform: Platform) -> Self {
        Self {
            platform: Some(platform),
            ..self
        }
    }

    pub fn with_status(self, status: DriftStatus) -> Self {
        Self {
            status: Some(status),
            ..self
        }
    }

    pub fn with_search(self, search: impl Into<String>) -> Self {
        Self {
            search: Some(search.into()),
            ..self
        }
    }

    pub fn matches(&self, service: &Service) -> bool {
        if let Some(category) = &self.category
            && !service.category.eq_ignore_ascii_case(category)
        {
            return false;
        }

        if let Some(platform) = &self.platform
            && !service.has_platform(platform)
        {
            return false;
        }

        if let Some(status) = self.status
            && service.overall_status() != status
        {
            return false;
        }

        if let Some(search) = &self.search {
            let needle = search.trim().to_lowercase();
            if !needle.is_empty() {
                let haystack = format!(
                    "{} {} {}",
                    service.name, service.description, service.category
                )
                .to_lowercase();
                if !haystack.contains(&needle) {
                    return false;
                }
            }
        }

        true
    }

    pub fn apply<'a>(&self, services: impl IntoIterator<Item = &'a Service>) -> Vec<Service> {
        services
            .into_iter()
            .filter(|service| self.matches(service))
            .cloned()
            .collect()
    }
}
