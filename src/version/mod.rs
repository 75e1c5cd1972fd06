//! Version model and drift classification
//!
//! ```text
//! ┌──────────────────┐  classify(current, latest)  ┌──────────────┐
//! │ SemanticVersion  │────────────────────────────▶│ DriftStatus  │
//! │ (parse, compare) │                             │ (severity)   │
//! └──────────────────┘                             └──────────────┘
//! ```
//!
//! - [`semver`]: `MAJOR.MINOR.PATCH[-pre][+build]` value type
//! - [`status`]: severity tiers and the pure classification function

pub mod semver;
pub mod status;

pub use self::semver::SemanticVersion;
pub use self::status::{DriftStatus, classify};
