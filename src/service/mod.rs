pub mod check;
pub mod platform;
pub mod platform_version;
#[allow(clippy::module_inception)]
pub mod service;

pub use check::{CheckSummary, VersionCheckResult};
pub use platform::Platform;
pub use platform_version::{PlatformVersion, ReleaseMetadata};
pub use service::{Service, ServicePatch, slugify};
