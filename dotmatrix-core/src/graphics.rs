use crate::config::ColorScheme;
use crate::ppu::{self, PpuState};
use crate::RunConfig;
use sdl2::pixels::{Color, PixelFormatEnum};
use sdl2::render::{Texture, TextureCreator, TextureValueError, WindowCanvas};
use sdl2::video::{FullscreenType, Window, WindowContext};
use sdl2::IntegerOrSdlError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphicsError {
    #[error("error setting fullscreen mode: {msg}")]
    Fullscreen { msg: String },
    #[error("error creating renderer: {source}")]
    CreateRenderer {
        #[from]
        source: IntegerOrSdlError,
    },
    #[error("error creating frame texture: {source}")]
    CreateTexture {
        #[from]
        source: TextureValueError,
    },
    #[error("error updating frame texture: {msg}")]
    Texture { msg: String },
    #[error("error copying frame texture to renderer: {msg}")]
    CopyToCanvas { msg: String },
}

// Color indices range from 0-3 with 0 being "white" and 3 being "black"

const PALETTE_GRAYSCALE: [[u8; 3]; 4] =
    [[255, 255, 255], [170, 170, 170], [85, 85, 85], [0, 0, 0]];

// A lime-green tint that mimics the original LCD screen
const PALETTE_GREEN: [[u8; 3]; 4] = [
    [0x80, 0xA6, 0x08],
    [0x5D, 0x7F, 0x07],
    [0x25, 0x5C, 0x1A],
    [0x00, 0x32, 0x00],
];

fn palette_for(color_scheme: ColorScheme) -> [[u8; 3]; 4] {
    match color_scheme {
        ColorScheme::Grayscale => PALETTE_GRAYSCALE,
        ColorScheme::GreenTint => PALETTE_GREEN,
    }
}

/// Create an SDL2 renderer from the given SDL2 window, optionally with VSync, with the
/// display area initialized to the palette's "white".
pub fn create_renderer(
    mut window: Window,
    run_config: &RunConfig,
) -> Result<WindowCanvas, GraphicsError> {
    if run_config.launch_fullscreen {
        window
            .set_fullscreen(FullscreenType::Desktop)
            .map_err(|msg| GraphicsError::Fullscreen { msg })?;
    }

    let mut canvas_builder = window.into_canvas();
    if run_config.vsync_enabled {
        canvas_builder = canvas_builder.present_vsync();
    }

    let mut canvas = canvas_builder.build()?;

    let [r, g, b] = palette_for(run_config.color_scheme)[0];
    canvas.set_draw_color(Color::RGB(r, g, b));
    canvas.clear();
    canvas.present();

    Ok(canvas)
}

/// Create the streaming texture that frames are uploaded into.
pub fn create_frame_texture(
    texture_creator: &TextureCreator<WindowContext>,
) -> Result<Texture<'_>, GraphicsError> {
    let texture = texture_creator.create_texture_streaming(
        PixelFormatEnum::RGB24,
        ppu::SCREEN_WIDTH as u32,
        ppu::SCREEN_HEIGHT as u32,
    )?;

    Ok(texture)
}

/// Render the current frame to the SDL2 window, resolving color indices through the active
/// palette. With VSync enabled this function will block until the next screen refresh.
pub fn render_frame(
    ppu_state: &PpuState,
    canvas: &mut WindowCanvas,
    texture: &mut Texture<'_>,
    run_config: &RunConfig,
) -> Result<(), GraphicsError> {
    let palette = palette_for(run_config.color_scheme);
    let frame_buffer = ppu_state.frame_buffer();

    texture
        .with_lock(None, |pixels: &mut [u8], pitch: usize| {
            for (row, scanline) in frame_buffer.iter().enumerate() {
                for (col, color_index) in scanline.iter().copied().enumerate() {
                    let start = row * pitch + 3 * col;
                    pixels[start..start + 3].copy_from_slice(&palette[usize::from(color_index)]);
                }
            }
        })
        .map_err(|msg| GraphicsError::Texture { msg })?;

    canvas.set_draw_color(Color::RGB(0, 0, 0));
    canvas.clear();
    canvas.copy(texture, None, None).map_err(|msg| GraphicsError::CopyToCanvas { msg })?;
    canvas.present();

    Ok(())
}

pub fn toggle_fullscreen(canvas: &mut WindowCanvas) -> Result<(), GraphicsError> {
    let new_fullscreen = match canvas.window().fullscreen_state() {
        FullscreenType::Off => FullscreenType::Desktop,
        FullscreenType::True | FullscreenType::Desktop => FullscreenType::Off,
    };
    canvas
        .window_mut()
        .set_fullscreen(new_fullscreen)
        .map_err(|msg| GraphicsError::Fullscreen { msg })
}
