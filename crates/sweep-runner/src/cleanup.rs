//! Removal of exited containers and unused images, one pass over the
//! runtime's current state.

use std::io::Write;

use sweep_common::{
    CleanupReport, ContainerQuery, ContainerRuntime, ImageQuery, Result, SweepConfig, SweepError,
};
use tracing::{debug, info, instrument, warn};

/// Drives a single cleanup pass against a [`ContainerRuntime`].
///
/// Every call is awaited before the next one is issued. The listings are a
/// snapshot; anything that changes in the runtime meanwhile is not noticed.
pub struct CleanupRunner<R> {
    runtime: R,
    config: SweepConfig,
}

impl<R: ContainerRuntime> CleanupRunner<R> {
    pub fn new(runtime: R, config: SweepConfig) -> Self {
        Self { runtime, config }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Runs the pass, narrating to `out` when verbose.
    ///
    /// The only error absorbed is [`SweepError::ImageInUse`] while removing
    /// dangling images. Anything else stops the pass where it happened;
    /// removals already issued stay applied.
    #[instrument(skip(self, out), fields(verbose = self.config.verbose, aggressive = self.config.aggressive))]
    pub async fn run<W: Write>(&self, out: &mut W) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        let verbose = self.config.verbose;

        if verbose {
            let version = self.runtime.version().await?;
            writeln!(out, "\tdocker client version {version}")?;
            writeln!(out, "\tlooking for exited containers to remove")?;
        }

        let exited = self
            .runtime
            .list_containers(ContainerQuery::exited(self.config.aggressive))
            .await?;
        info!(count = exited.len(), "Found exited containers");

        for container in &exited {
            let name = container.display_name();
            if verbose {
                writeln!(out, "\tremoving exited container {name}")?;
            }
            self.runtime.remove_container(name).await?;
            debug!(%name, "Removed container");
            report.containers_removed.push(name.to_string());
        }

        if verbose {
            let remaining = self.runtime.list_containers(ContainerQuery::all()).await?.len();
            writeln!(out, "\t{remaining} active containers remain")?;
            writeln!(out, "\tlooking for dangling images to remove")?;
            report.containers_remaining = Some(remaining);
        }

        if self.config.aggressive {
            self.announce_all_images(out, &mut report).await?;
        } else {
            self.remove_dangling_images(out, &mut report).await?;
        }

        if verbose {
            let remaining = self.runtime.list_images(ImageQuery::all()).await?.len();
            writeln!(out, "\t{remaining} non-dangling images remain")?;
            report.images_remaining = Some(remaining);
        }

        info!(
            containers = report.containers_removed.len(),
            images = report.images_removed.len(),
            in_use = report.images_in_use.len(),
            "Cleanup finished"
        );
        Ok(report)
    }

    // Aggressive mode names every image but never removes any.
    async fn announce_all_images<W: Write>(&self, out: &mut W, report: &mut CleanupReport) -> Result<()> {
        let images = self.runtime.list_images(ImageQuery::all()).await?;
        warn!(count = images.len(), "Aggressive mode lists images without removing them");
        for image in images {
            let id = image.short_id()?;
            if self.config.verbose {
                writeln!(out, "\tremoving any image {id}")?;
            }
            report.images_announced.push(id.to_string());
        }
        Ok(())
    }

    async fn remove_dangling_images<W: Write>(&self, out: &mut W, report: &mut CleanupReport) -> Result<()> {
        for image in self.runtime.list_images(ImageQuery::dangling()).await? {
            let id = image.short_id()?;
            if self.config.verbose {
                writeln!(out, "\tremoving dangling image {id}")?;
            }
            match self.runtime.remove_image(id).await {
                Ok(()) => {
                    debug!(%id, "Removed image");
                    report.images_removed.push(id.to_string());
                }
                Err(SweepError::ImageInUse(_)) => {
                    if self.config.verbose {
                        writeln!(out, "\tignoring in use image {id}")?;
                    }
                    debug!(%id, "Image in use, skipped");
                    report.images_in_use.push(id.to_string());
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}
