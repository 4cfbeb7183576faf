use crate::audio::{AudioBufferConsumer, RingPlayback};
use crate::config::RunConfig;
use crate::cpu::CpuRegisters;
use crate::graphics::GraphicsError;
use crate::memory::{AddressSpace, Cartridge, CartridgeLoadError};
use crate::ppu::PpuState;
use crate::timer::TimerCounter;
use crate::{audio, graphics};
use sdl2::audio::AudioDevice;
use sdl2::render::{TextureCreator, WindowCanvas};
use sdl2::video::{WindowBuildError, WindowContext};
use sdl2::{EventPump, Sdl};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("error loading cartridge from {file_path}: {source}")]
    CartridgeLoad {
        file_path: String,
        #[source]
        source: CartridgeLoadError,
    },
    #[error("SDL2 error: {sdl_error}")]
    GenericSdl { sdl_error: String },
    #[error("error building SDL2 window: {source}")]
    SdlWindowBuild {
        #[from]
        source: WindowBuildError,
    },
    #[error("error building SDL2 canvas: {source}")]
    SdlCanvasBuild {
        #[from]
        source: GraphicsError,
    },
    #[error("SDL2 audio initialization error: {msg}")]
    SdlAudioInit { msg: String },
}

impl From<String> for StartupError {
    fn from(value: String) -> Self {
        Self::GenericSdl { sdl_error: value }
    }
}

/// Everything the save-state snapshot captures: the full address space (including bank
/// controller and cartridge RAM state), CPU registers, pixel unit state, and the timer's
/// internal counter.
#[derive(Clone, Serialize, Deserialize)]
pub struct EmulationState {
    pub address_space: AddressSpace,
    pub cpu_registers: CpuRegisters,
    pub ppu_state: PpuState,
    pub timer_counter: TimerCounter,
}

pub struct SdlState {
    pub sdl: Sdl,
    pub audio_device: Option<AudioDevice<RingPlayback>>,
    pub canvas: WindowCanvas,
    pub texture_creator: TextureCreator<WindowContext>,
    pub event_pump: EventPump,
}

pub fn init_emulation_state(run_config: &RunConfig) -> Result<EmulationState, StartupError> {
    let cartridge = Cartridge::from_file(&run_config.rom_file_path).map_err(|err| {
        StartupError::CartridgeLoad {
            file_path: run_config.rom_file_path.clone(),
            source: err,
        }
    })?;

    Ok(EmulationState {
        address_space: AddressSpace::new(cartridge),
        cpu_registers: CpuRegisters::new(),
        ppu_state: PpuState::new(),
        timer_counter: TimerCounter::new(),
    })
}

pub fn init_sdl_state(
    run_config: &RunConfig,
    audio_consumer: AudioBufferConsumer,
) -> Result<SdlState, StartupError> {
    let sdl = sdl2::init()?;
    let video = sdl.video()?;

    let window = video
        .window(
            &window_title(&run_config.rom_file_path),
            run_config.window_width,
            run_config.window_height,
        )
        .resizable()
        .build()?;

    let canvas = graphics::create_renderer(window, run_config)?;
    let texture_creator = canvas.texture_creator();

    let event_pump = sdl.event_pump()?;

    let audio_device = if run_config.audio_enabled {
        let audio_subsystem = sdl.audio()?;
        let device = audio::initialize(&audio_subsystem, audio_consumer)
            .map_err(|msg| StartupError::SdlAudioInit { msg })?;
        Some(device)
    } else {
        None
    };

    Ok(SdlState { sdl, audio_device, canvas, texture_creator, event_pump })
}

fn window_title(rom_file_path: &str) -> String {
    let file_name = std::path::Path::new(rom_file_path)
        .file_name()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("<unknown>");
    format!("dotmatrix - {file_name}")
}
