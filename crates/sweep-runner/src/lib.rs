use async_trait::async_trait;
use bollard::container::{ListContainersOptions, RemoveContainerOptions};
use bollard::errors::Error as BollardError;
use bollard::image::{ListImagesOptions, RemoveImageOptions};
use bollard::models::{ContainerSummary, ImageSummary};
use bollard::Docker;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, instrument};

use sweep_common::{
    ContainerQuery, ContainerRecord, ContainerRuntime, ImageQuery, ImageRecord,
    Result as CommonResult, SweepConfig, SweepError,
};

// Re-export dependencies potentially needed by consumers
pub use bollard;
pub use sweep_common as common;

pub mod cleanup;

pub use cleanup::CleanupRunner;

/// Status code the daemon answers with when an image is still referenced.
const CONFLICT: u16 = 409;

// --- Custom Error Type ---
#[derive(Error, Debug)]
pub enum DockerError {
    #[error("Docker client setup failed: {0}")]
    Connect(#[source] BollardError),
    #[error("Docker daemon did not answer ping: {0}")]
    Ping(#[source] BollardError),
    #[error("Docker API error: {0}")]
    DockerApi(#[from] BollardError),
}

// Implement conversion from DockerError to the common SweepError
impl From<DockerError> for SweepError {
    fn from(err: DockerError) -> Self {
        match err {
            DockerError::Connect(_) | DockerError::Ping(_) => SweepError::Unreachable(err.to_string()),
            DockerError::DockerApi(BollardError::DockerResponseServerError {
                status_code,
                message,
            }) => SweepError::Api {
                status: status_code,
                message,
            },
            DockerError::DockerApi(other) => SweepError::Transport(other.to_string()),
        }
    }
}

fn api(err: BollardError) -> SweepError {
    DockerError::DockerApi(err).into()
}

// --- DockerRuntime Implementation ---

#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to the local daemon (honouring `DOCKER_HOST`) with the
    /// configured request timeout, and checks that it answers.
    ///
    /// The timeout is `config.timeout` (20 seconds unless
    /// `SWEEP_DOCKER_TIMEOUT_SECS` overrides it), not a constant of the client.
    #[instrument(skip(config), fields(timeout_secs = config.timeout.as_secs()))]
    pub async fn connect(config: &SweepConfig) -> CommonResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(DockerError::Connect)?
            .with_timeout(config.timeout);
        docker.ping().await.map_err(DockerError::Ping)?;
        info!("Connected to Docker daemon");
        Ok(Self { docker })
    }

    /// Wraps an already configured client without checking it.
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn container_record(summary: ContainerSummary) -> ContainerRecord {
    ContainerRecord {
        id: summary.id.unwrap_or_default(),
        names: summary.names.unwrap_or_default(),
        status: summary.state.or(summary.status).unwrap_or_default(),
        size_rw: summary.size_rw,
        size_root_fs: summary.size_root_fs,
    }
}

fn image_record(summary: ImageSummary) -> ImageRecord {
    let dangling = summary
        .repo_tags
        .iter()
        .all(|tag| tag == "<none>:<none>");
    ImageRecord {
        id: summary.id,
        dangling,
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn version(&self) -> CommonResult<String> {
        let version = self.docker.version().await.map_err(api)?;
        Ok(version.version.unwrap_or_else(|| "unknown".to_string()))
    }

    #[instrument(skip(self))]
    async fn list_containers(&self, query: ContainerQuery) -> CommonResult<Vec<ContainerRecord>> {
        let mut filters = HashMap::new();
        if let Some(status) = query.status {
            filters.insert("status".to_string(), vec![status]);
        }
        let options = ListContainersOptions::<String> {
            all: query.include_all,
            size: query.with_size,
            filters,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(api)?;
        debug!(count = containers.len(), "Listed containers");
        Ok(containers.into_iter().map(container_record).collect())
    }

    #[instrument(skip(self))]
    async fn remove_container(&self, name: &str) -> CommonResult<()> {
        self.docker
            .remove_container(name, None::<RemoveContainerOptions>)
            .await
            .map_err(api)
    }

    #[instrument(skip(self))]
    async fn list_images(&self, query: ImageQuery) -> CommonResult<Vec<ImageRecord>> {
        let mut filters = HashMap::new();
        if query.dangling_only {
            filters.insert("dangling".to_string(), vec!["true".to_string()]);
        }
        let options = ListImagesOptions::<String> {
            all: query.include_all,
            filters,
            ..Default::default()
        };
        let images = self.docker.list_images(Some(options)).await.map_err(api)?;
        debug!(count = images.len(), "Listed images");
        Ok(images.into_iter().map(image_record).collect())
    }

    #[instrument(skip(self))]
    async fn remove_image(&self, id: &str) -> CommonResult<()> {
        match self
            .docker
            .remove_image(id, None::<RemoveImageOptions>, None)
            .await
        {
            Ok(deleted) => {
                debug!(layers = deleted.len(), "Removed image");
                Ok(())
            }
            Err(BollardError::DockerResponseServerError {
                status_code: CONFLICT,
                ..
            }) => Err(SweepError::ImageInUse(id.to_string())),
            Err(err) => Err(api(err)),
        }
    }
}
