mod config;
mod demo;

use std::path::PathBuf;

use anyhow::{Context, Result};
use curator_logging::curator_info;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let first = args.next();

    if first.as_deref() == Some("--write-default") {
        let path = args
            .next()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_FILE));
        return config::write_default(&path);
    }

    let path = first
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_FILE));
    let config = config::load(&path)?;
    curator_logging::initialize(config.log.destination.into(), config.log.level_filter()?);
    curator_info!("configuration: {}", path.display());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the tokio runtime")?;
    let summary = runtime.block_on(demo::run(config))?;
    println!("{summary}");
    Ok(())
}
