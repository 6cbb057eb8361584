mod bodies;
mod camera;
mod config;
mod error;
mod gpu;
mod math;
mod physics;
mod scene;
mod simulation;
mod wgpu_stuff;

use clap::Parser;
use wgpu_stuff::framework;
use wgpu_stuff::sim;

pub fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = config::SimConfig::parse();
    log::debug!("{config:?}");

    framework::run::<sim::Sim>("nbody", config)
}
