//! Cycle-driven emulator core for the original DMG handheld, with an SDL2 presentation
//! layer (window, audio playback, keyboard input).
//!
//! The core is organized around a per-frame cycle budget: the frame driver executes CPU
//! instructions and forwards each instruction's elapsed cycles to the timer, the pixel
//! unit, and the sound unit, so interrupt flags and register effects become visible at
//! instruction boundaries.

mod apu;
mod audio;
mod config;
mod cpu;
mod eventloop;
mod graphics;
mod input;
mod memory;
mod ppu;
mod serialize;
mod startup;
mod timer;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;

pub use config::{ColorScheme, HotkeyConfig, InputConfig, RunConfig};
pub use eventloop::RunError;
pub use graphics::GraphicsError;
pub use input::KeyMapError;
pub use memory::CartridgeLoadError;
pub use serialize::SaveStateError;
pub use startup::StartupError;

#[derive(Error, Debug)]
pub enum EmulationError {
    #[error("startup error: {source}")]
    Startup {
        #[from]
        source: StartupError,
    },
    #[error("runtime error: {source}")]
    Runtime {
        #[from]
        source: RunError,
    },
}

/// Load the configured cartridge and run the emulator until the window is closed or the
/// exit hotkey is pressed.
pub fn run(run_config: &RunConfig) -> Result<(), EmulationError> {
    let quit_signal = Arc::new(AtomicBool::new(false));
    run_with_quit_signal(run_config, quit_signal)
}

/// As [`run`], but with an externally owned quit signal; setting it stops the emulator at
/// the next frame boundary.
pub fn run_with_quit_signal(
    run_config: &RunConfig,
    quit_signal: Arc<AtomicBool>,
) -> Result<(), EmulationError> {
    let emulation_state = startup::init_emulation_state(run_config)?;

    let (sample_producer, sample_consumer) = audio::stereo_sample_ring(audio::RING_CAPACITY_FRAMES);
    let apu_state = apu::ApuState::new(sample_producer);

    let sdl_state = startup::init_sdl_state(run_config, sample_consumer)?;

    eventloop::run(emulation_state, apu_state, sdl_state, run_config, quit_signal)?;

    Ok(())
}
