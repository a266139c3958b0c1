//! Replay entry point.

use snapdraw_replay::{Player, ReplayError, ReplayResult, Scenario};
use std::path::PathBuf;

fn run() -> ReplayResult<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or_else(|| ReplayError::Usage("snapdraw-replay <scenario.json>".to_string()))?;
    let scenario = Scenario::load(&path)?;
    log::info!("Replaying {} steps from {}", scenario.steps.len(), path.display());

    let player = Player::new(&scenario)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let written = player.run(&scenario.steps, &mut out)?;
    log::info!("Replay finished with {} notifications", written);
    Ok(())
}

fn main() {
    env_logger::init();
    log::info!("Starting snapdraw replay");

    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
