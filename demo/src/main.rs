use std::env;
use log::{info, LevelFilter};
use fluff::Result;
use fluff::config::Config;

fn main() -> Result {
  env_logger::builder()
    .filter_level(LevelFilter::Info)
    .filter(Some("wgpu_core"), LevelFilter::Warn)
    .filter(Some("wgpu_hal"), LevelFilter::Warn)
    .parse_default_env()
    .init();
  let path = env::args().nth(1).unwrap_or_else(|| "fur.json".into());
  let config = Config::load(&path)?;
  info!("{} mesh(es), {} fur layers", config.meshes.len(), config.fur.layer_count);
  fluff::app::run(config)
}
