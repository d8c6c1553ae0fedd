mod config;
mod distribution;
mod gui;
mod input;
mod report;
mod store;
mod structs;

use crate::config::AppConfig;
use crate::gui::PsaApp;
use tracing_subscriber::EnvFilter;

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = AppConfig::load();
    tracing::info!(data_dir = %config.data_dir.display(), "starting NanoLab PSA");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1500.0, 1000.0])
            .with_min_inner_size([1200.0, 800.0]),
        ..Default::default()
    };

    eframe::run_native(
        "NanoLab PSA",
        options,
        Box::new(|cc| Ok(Box::new(PsaApp::new(cc, config)))),
    )
}
