use clap::Parser;
use dotmatrix_core::{ColorScheme, HotkeyConfig, InputConfig, RunConfig};
use std::error::Error;

#[derive(Parser)]
#[command(about = "A DMG handheld console emulator")]
struct Cli {
    /// Path to the ROM file to run
    #[arg(short = 'f', long = "rom-file-path")]
    rom_file_path: String,

    /// Disable audio output
    #[arg(long = "no-audio", default_value_t = true, action = clap::ArgAction::SetFalse)]
    audio_enabled: bool,

    /// Do not sync emulation speed to audio playback
    #[arg(long = "no-audio-sync", default_value_t = true, action = clap::ArgAction::SetFalse)]
    sync_to_audio: bool,

    /// Disable VSync
    #[arg(long = "no-vsync", default_value_t = true, action = clap::ArgAction::SetFalse)]
    vsync_enabled: bool,

    /// Launch in fullscreen
    #[arg(long = "fullscreen", default_value_t = false)]
    launch_fullscreen: bool,

    #[arg(short = 'w', long = "window-width", default_value_t = 640)]
    window_width: u32,

    #[arg(short = 'l', long = "window-height", default_value_t = 576)]
    window_height: u32,

    /// Display palette: grayscale or green
    #[arg(long = "color-scheme", default_value = "green")]
    color_scheme: ColorScheme,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Cli::parse();

    let run_config = RunConfig {
        rom_file_path: args.rom_file_path,
        audio_enabled: args.audio_enabled,
        sync_to_audio: args.sync_to_audio,
        vsync_enabled: args.vsync_enabled,
        launch_fullscreen: args.launch_fullscreen,
        window_width: args.window_width,
        window_height: args.window_height,
        color_scheme: args.color_scheme,
        input_config: InputConfig::default(),
        hotkey_config: HotkeyConfig::default(),
    };

    dotmatrix_core::run(&run_config)?;

    Ok(())
}
