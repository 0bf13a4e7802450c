use clap::Parser;
use color_eyre::eyre;
use sweep_common::SweepConfig;
use sweep_runner::{CleanupRunner, DockerRuntime};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sweep", about = "Remove exited containers and dangling images")]
struct Cli {
    /// Display the name of each container and image before deleting it
    #[arg(long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    // Aggressive mode stays off: only the library exposes it.
    let config = SweepConfig::from_env()?.with_verbose(cli.verbose);

    let runtime = DockerRuntime::connect(&config).await?;
    let runner = CleanupRunner::new(runtime, config);

    let mut stdout = std::io::stdout().lock();
    let report = runner.run(&mut stdout).await?;
    info!(
        containers = report.containers_removed.len(),
        images = report.images_removed.len(),
        "Sweep complete"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_defaults_off() {
        let cli = Cli::try_parse_from(["sweep"]).unwrap();
        assert!(!cli.verbose);
        let cli = Cli::try_parse_from(["sweep", "--verbose"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn test_no_aggressive_flag() {
        assert!(Cli::try_parse_from(["sweep", "--all"]).is_err());
    }
}
