mod app;
mod config;
mod model_download;
mod pipeline;
mod types;

use anyhow::Result;
use config::Config;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::default();
    match app::run(&config) {
        Ok(stats) => {
            log::info!(
                "stopped after {} frames ({} empty reads, {} detection failures)",
                stats.frames,
                stats.empty_frames,
                stats.detector_failures
            );
            Ok(())
        }
        Err(err) => {
            log::error!("{err:#}");
            Err(err)
        }
    }
}
