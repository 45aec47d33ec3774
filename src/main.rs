use std::io::Read;
use std::path::Path;
use std::time::Duration;

use clap::Parser;

use touch_grid::color::ColorTable;
use touch_grid::config::{Cli, Command, Config, BLOCK_SIZE};
use touch_grid::replay;
use touch_grid::surface::{MemorySurface, PIXEL_FORMAT_RGBA_8888};
use touch_grid::view::TouchGridView;

fn read_script(path: Option<&Path>) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e).into()),
        None => {
            let mut script = String::new();
            std::io::stdin().read_to_string(&mut script)?;
            Ok(script)
        }
    }
}

fn print_colors() {
    for (slot, color) in ColorTable::default().iter() {
        println!("{}  {}", slot, color);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let script_path = match &cli.command {
        Some(Command::Colors) => {
            print_colors();
            return Ok(());
        }
        Some(Command::Replay { script }) => script.clone(),
        None => None,
    };

    let config = Config::load(&cli);
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    log::info!(
        "touch-grid starting ({}x{}, strategy={}, release={}, background={})",
        config.width,
        config.height,
        config.strategy,
        config.release_policy,
        config.background
    );

    let steps = replay::parse_script(&read_script(script_path.as_deref())?)?;
    log::info!("Replaying {} script steps", steps.len());

    let mut view = TouchGridView::new(MemorySurface::new(config.width, config.height), config.view_settings());
    view.on_surface_available(config.width, config.height)?;
    view.on_surface_size_changed(config.width, config.height, PIXEL_FORMAT_RGBA_8888);

    replay::run(&mut view, &steps, Duration::from_millis(config.settle_ms));

    // Post the final state from here so the printout does not depend on render timing.
    view.redraw();
    let stats = view.render_stats();
    view.on_surface_lost();

    log::info!(
        "Render thread: {} frames posted, {} skipped, {} failed",
        stats.presented,
        stats.skipped,
        stats.failed
    );

    let frame = view.host().snapshot();
    print!(
        "{}",
        replay::frame_to_text(&frame, BLOCK_SIZE, &ColorTable::default(), config.background)
    );

    Ok(())
}
