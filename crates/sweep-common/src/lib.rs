// Shared types for the container sweep: records read from the runtime,
// the run configuration, and the runtime seam the runner drives.

use std::time::Duration;

use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request timeout applied to every call against the runtime endpoint.
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Environment variable overriding [`DEFAULT_TIMEOUT_SECS`].
pub const TIMEOUT_ENV: &str = "SWEEP_DOCKER_TIMEOUT_SECS";

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Runtime endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Image in use: {0}")]
    ImageInUse(String),

    #[error("Runtime API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Malformed image id: {0}")]
    MalformedImageId(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

// Define the primary Result type for sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// A container as reported by the runtime's listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: String,
    pub names: Vec<String>,
    pub status: String,
    pub size_rw: Option<i64>,
    pub size_root_fs: Option<i64>,
}

impl ContainerRecord {
    /// First recorded name with a single leading `/` removed.
    ///
    /// Docker always reports at least one name; the id is used if it ever doesn't.
    pub fn display_name(&self) -> &str {
        match self.names.first() {
            Some(name) => name.strip_prefix('/').unwrap_or(name),
            None => &self.id,
        }
    }
}

/// An image as reported by the runtime's listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Compound id, `<algorithm>:<hexdigest>`.
    pub id: String,
    pub dangling: bool,
}

impl ImageRecord {
    pub fn short_id(&self) -> Result<&str> {
        image_short_id(&self.id)
    }
}

/// Returns the digest part of a compound image id (everything after the first colon).
pub fn image_short_id(compound: &str) -> Result<&str> {
    compound
        .split_once(':')
        .map(|(_, digest)| digest)
        .ok_or_else(|| SweepError::MalformedImageId(compound.to_string()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerQuery {
    pub status: Option<String>,
    pub include_all: bool,
    pub with_size: bool,
}

impl ContainerQuery {
    pub fn exited(include_all: bool) -> Self {
        Self {
            status: Some("exited".to_string()),
            include_all,
            with_size: true,
        }
    }

    pub fn all() -> Self {
        Self {
            status: None,
            include_all: true,
            with_size: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageQuery {
    pub include_all: bool,
    pub dangling_only: bool,
}

impl ImageQuery {
    pub fn all() -> Self {
        Self {
            include_all: true,
            dangling_only: false,
        }
    }

    pub fn dangling() -> Self {
        Self {
            include_all: false,
            dangling_only: true,
        }
    }
}

/// Configuration for a single cleanup run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Narrate progress to the output writer.
    pub verbose: bool,
    /// Target every image instead of only dangling ones.
    pub aggressive: bool,
    pub timeout: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            aggressive: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl SweepConfig {
    /// Builds a config from the process environment. Only the timeout is
    /// read from it; the flags keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_timeout_var(std::env::var(TIMEOUT_ENV).ok().as_deref())
    }

    fn from_timeout_var(raw: Option<&str>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = raw {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| SweepError::Config(format!("{TIMEOUT_ENV} must be whole seconds, got {raw:?}")))?;
            if secs == 0 {
                return Err(SweepError::Config(format!("{TIMEOUT_ENV} must be positive")));
            }
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_aggressive(mut self, aggressive: bool) -> Self {
        self.aggressive = aggressive;
        self
    }
}

/// What a run did, in the order it did it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub containers_removed: Vec<String>,
    pub images_removed: Vec<String>,
    pub images_in_use: Vec<String>,
    /// Images listed in aggressive mode; these are never removed.
    pub images_announced: Vec<String>,
    pub containers_remaining: Option<usize>,
    pub images_remaining: Option<usize>,
}

/// Management API of a container runtime, reduced to what a sweep needs.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn version(&self) -> Result<String>;
    async fn list_containers(&self, query: ContainerQuery) -> Result<Vec<ContainerRecord>>;
    async fn remove_container(&self, name: &str) -> Result<()>;
    async fn list_images(&self, query: ImageQuery) -> Result<Vec<ImageRecord>>;
    /// Fails with [`SweepError::ImageInUse`] when the image is still referenced.
    async fn remove_image(&self, id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(names: &[&str]) -> ContainerRecord {
        ContainerRecord {
            id: "c0ffee".to_string(),
            names: names.iter().map(|n| n.to_string()).collect(),
            status: "Exited (0) 2 minutes ago".to_string(),
            size_rw: None,
            size_root_fs: None,
        }
    }

    #[test]
    fn test_display_name_strips_one_leading_slash() {
        assert_eq!(container(&["/web"]).display_name(), "web");
        assert_eq!(container(&["/web", "/alias"]).display_name(), "web");
        assert_eq!(container(&["db"]).display_name(), "db");
        assert_eq!(container(&["//odd"]).display_name(), "/odd");
    }

    #[test]
    fn test_display_name_without_names_uses_id() {
        assert_eq!(container(&[]).display_name(), "c0ffee");
    }

    #[test]
    fn test_image_short_id() {
        assert_eq!(image_short_id("sha256:deadbeef").unwrap(), "deadbeef");
        // Only the first colon splits.
        assert_eq!(image_short_id("a:b:c").unwrap(), "b:c");
        assert_eq!(image_short_id("sha256:").unwrap(), "");
    }

    #[test]
    fn test_image_short_id_without_colon_fails() {
        let err = image_short_id("12345").unwrap_err();
        assert!(matches!(err, SweepError::MalformedImageId(ref id) if id == "12345"));
    }

    #[test]
    fn test_queries() {
        let exited = ContainerQuery::exited(false);
        assert_eq!(exited.status.as_deref(), Some("exited"));
        assert!(exited.with_size);
        assert!(!exited.include_all);
        assert!(ContainerQuery::exited(true).include_all);

        assert!(ContainerQuery::all().status.is_none());
        assert!(ImageQuery::dangling().dangling_only);
        assert!(ImageQuery::all().include_all);
    }

    #[test]
    fn test_config_timeout() {
        let config = SweepConfig::from_timeout_var(None).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(20));
        assert!(!config.verbose);
        assert!(!config.aggressive);

        let config = SweepConfig::from_timeout_var(Some(" 45 ")).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(45));

        assert!(matches!(
            SweepConfig::from_timeout_var(Some("soon")),
            Err(SweepError::Config(_))
        ));
        assert!(matches!(
            SweepConfig::from_timeout_var(Some("0")),
            Err(SweepError::Config(_))
        ));
    }

    #[test]
    fn test_report_serialization() {
        let report = CleanupReport {
            containers_removed: vec!["a".to_string()],
            images_in_use: vec!["deadbeef".to_string()],
            ..Default::default()
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("deadbeef"));
    }
}
