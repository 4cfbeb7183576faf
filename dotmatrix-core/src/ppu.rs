use crate::cpu::InterruptType;
use crate::memory::address;
use crate::memory::ioregisters::{IoRegister, IoRegisters};
use crate::memory::AddressSpace;
use serde::{Deserialize, Serialize};

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

/// One frame of BGP/OBP-mapped color indices (0-3), row-major.
pub type FrameBuffer = [[u8; SCREEN_WIDTH]; SCREEN_HEIGHT];

const OAM_SCAN_DOTS: u32 = 80;
const RENDERING_DOTS: u32 = 172;
const HBLANK_DOTS: u32 = 204;
const VBLANK_LINE_DOTS: u32 = 456;

const LAST_VISIBLE_SCANLINE: u8 = 143;
const LAST_VBLANK_SCANLINE: u8 = 153;

const MAX_SPRITES_PER_LINE: usize = 10;

// STAT interrupt source enable bits
const STAT_LYC_SOURCE: u8 = 1 << 6;
const STAT_OAM_SOURCE: u8 = 1 << 5;
const STAT_VBLANK_SOURCE: u8 = 1 << 4;
const STAT_HBLANK_SOURCE: u8 = 1 << 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PpuMode {
    HBlank,
    VBlank,
    ScanningOam,
    RenderingScanline,
}

impl PpuMode {
    fn stat_bits(self) -> u8 {
        match self {
            Self::HBlank => 0x00,
            Self::VBlank => 0x01,
            Self::ScanningOam => 0x02,
            Self::RenderingScanline => 0x03,
        }
    }

    fn interrupt_source_bit(self) -> Option<u8> {
        match self {
            Self::HBlank => Some(STAT_HBLANK_SOURCE),
            Self::VBlank => Some(STAT_VBLANK_SOURCE),
            Self::ScanningOam => Some(STAT_OAM_SOURCE),
            Self::RenderingScanline => None,
        }
    }

    fn dots(self) -> u32 {
        match self {
            Self::HBlank => HBLANK_DOTS,
            Self::VBlank => VBLANK_LINE_DOTS,
            Self::ScanningOam => OAM_SCAN_DOTS,
            Self::RenderingScanline => RENDERING_DOTS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PpuState {
    enabled: bool,
    mode: PpuMode,
    // Dots elapsed within the current mode (or the current line while in VBlank)
    dot_counter: u32,
    scanline: u8,
    window_line: u8,
    #[serde(
        serialize_with = "crate::serialize::serialize_2d_array",
        deserialize_with = "crate::serialize::deserialize_2d_array"
    )]
    frame_buffer: FrameBuffer,
}

impl PpuState {
    pub fn new() -> Self {
        Self {
            enabled: true,
            mode: PpuMode::ScanningOam,
            dot_counter: 0,
            scanline: 0,
            window_line: 0,
            frame_buffer: [[0; SCREEN_WIDTH]; SCREEN_HEIGHT],
        }
    }

    #[cfg(test)]
    pub(crate) fn new_disabled_for_test() -> Self {
        Self { enabled: false, mode: PpuMode::HBlank, ..Self::new() }
    }

    #[cfg(test)]
    pub(crate) fn new_in_mode_for_test(mode: PpuMode) -> Self {
        Self { mode, ..Self::new() }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn mode(&self) -> PpuMode {
        self.mode
    }

    pub fn scanline(&self) -> u8 {
        self.scanline
    }

    pub fn frame_buffer(&self) -> &FrameBuffer {
        &self.frame_buffer
    }
}

/// Advance the pixel unit by the given number of dots (1 dot per CPU cycle).
///
/// Scanlines render atomically when pixel transfer completes, and the VBlank/STAT interrupt
/// flags are raised at the corresponding mode and line transitions.
pub fn tick(ppu_state: &mut PpuState, address_space: &mut AddressSpace, cycles: u32) {
    let lcdc = address_space.get_io_registers().read_register(IoRegister::LCDC);
    if lcdc & 0x80 == 0 {
        if ppu_state.enabled {
            // Display switched off: force mode 0 / line 0 and blank the output
            ppu_state.enabled = false;
            ppu_state.mode = PpuMode::HBlank;
            ppu_state.dot_counter = 0;
            ppu_state.scanline = 0;
            ppu_state.window_line = 0;
            ppu_state.frame_buffer = [[0; SCREEN_WIDTH]; SCREEN_HEIGHT];

            let io_registers = address_space.get_io_registers_mut();
            io_registers.privileged_set_ly(0);
            sync_stat(ppu_state, io_registers);
        }
        return;
    }

    if !ppu_state.enabled {
        // Display switched back on: restart from OAM scan of line 0
        ppu_state.enabled = true;
        ppu_state.dot_counter = 0;
        ppu_state.window_line = 0;
        set_scanline(ppu_state, address_space, 0);
        enter_mode(ppu_state, address_space, PpuMode::ScanningOam);
    }

    ppu_state.dot_counter += cycles;

    while ppu_state.dot_counter >= ppu_state.mode.dots() {
        ppu_state.dot_counter -= ppu_state.mode.dots();

        match ppu_state.mode {
            PpuMode::ScanningOam => {
                enter_mode(ppu_state, address_space, PpuMode::RenderingScanline);
            }
            PpuMode::RenderingScanline => {
                render_scanline(ppu_state, address_space);
                enter_mode(ppu_state, address_space, PpuMode::HBlank);
            }
            PpuMode::HBlank => {
                let next_scanline = ppu_state.scanline + 1;
                set_scanline(ppu_state, address_space, next_scanline);
                if ppu_state.scanline > LAST_VISIBLE_SCANLINE {
                    address_space
                        .get_io_registers_mut()
                        .interrupt_flags()
                        .set(InterruptType::VBlank);
                    enter_mode(ppu_state, address_space, PpuMode::VBlank);
                } else {
                    enter_mode(ppu_state, address_space, PpuMode::ScanningOam);
                }
            }
            PpuMode::VBlank => {
                if ppu_state.scanline == LAST_VBLANK_SCANLINE {
                    // End of frame; the window line counter resets here
                    ppu_state.window_line = 0;
                    set_scanline(ppu_state, address_space, 0);
                    enter_mode(ppu_state, address_space, PpuMode::ScanningOam);
                } else {
                    let next_scanline = ppu_state.scanline + 1;
                    set_scanline(ppu_state, address_space, next_scanline);
                }
            }
        }
    }
}

fn sync_stat(ppu_state: &PpuState, io_registers: &mut IoRegisters) {
    let lyc_match = ppu_state.scanline == io_registers.read_register(IoRegister::LYC);
    io_registers.privileged_set_stat(ppu_state.mode.stat_bits(), lyc_match);
}

// LYC equality is evaluated on every line counter change, including the wrap back to line 0
// at the end of VBlank.
fn set_scanline(ppu_state: &mut PpuState, address_space: &mut AddressSpace, scanline: u8) {
    ppu_state.scanline = scanline;

    let io_registers = address_space.get_io_registers_mut();
    io_registers.privileged_set_ly(scanline);

    let lyc_match = scanline == io_registers.read_register(IoRegister::LYC);
    sync_stat(ppu_state, io_registers);

    if lyc_match && io_registers.read_register(IoRegister::STAT) & STAT_LYC_SOURCE != 0 {
        io_registers.interrupt_flags().set(InterruptType::LcdStatus);
    }
}

// Mode-entry STAT interrupts fire when the corresponding source enable bit is already set.
fn enter_mode(ppu_state: &mut PpuState, address_space: &mut AddressSpace, mode: PpuMode) {
    ppu_state.mode = mode;

    let io_registers = address_space.get_io_registers_mut();
    sync_stat(ppu_state, io_registers);

    if let Some(source_bit) = mode.interrupt_source_bit() {
        if io_registers.read_register(IoRegister::STAT) & source_bit != 0 {
            io_registers.interrupt_flags().set(InterruptType::LcdStatus);
        }
    }
}

// Read the 2-bit color ID of one pixel out of the two bit planes of a tile.
fn tile_pixel(
    address_space: &AddressSpace,
    unsigned_tile_data: bool,
    tile: u8,
    tile_row: u8,
    tile_col: u8,
) -> u8 {
    let tile_addr = if unsigned_tile_data {
        address::TILE_DATA_UNSIGNED + 16 * u16::from(tile)
    } else {
        (i32::from(address::TILE_DATA_SIGNED) + 16 * i32::from(tile as i8)) as u16
    };

    let plane_0 = address_space.ppu_read_address_u8(tile_addr + 2 * u16::from(tile_row));
    let plane_1 = address_space.ppu_read_address_u8(tile_addr + 2 * u16::from(tile_row) + 1);

    let shift = 7 - tile_col;
    ((plane_0 >> shift) & 0x01) | (((plane_1 >> shift) & 0x01) << 1)
}

#[derive(Debug, Clone, Copy)]
struct SpriteAttributes {
    y: u8,
    x: u8,
    tile: u8,
    flags: u8,
    oam_index: u8,
}

// Scan the 40 OAM entries and keep the first ten that overlap the given scanline.
fn scan_oam(address_space: &AddressSpace, scanline: u8, sprite_height: u8) -> Vec<SpriteAttributes> {
    let mut sprites = Vec::with_capacity(MAX_SPRITES_PER_LINE);

    for oam_index in 0..40 {
        let entry_addr = address::OAM_START + 4 * oam_index;
        let y = address_space.ppu_read_address_u8(entry_addr);

        let top = i16::from(y) - 16;
        if (top..top + i16::from(sprite_height)).contains(&i16::from(scanline)) {
            sprites.push(SpriteAttributes {
                y,
                x: address_space.ppu_read_address_u8(entry_addr + 1),
                tile: address_space.ppu_read_address_u8(entry_addr + 2),
                flags: address_space.ppu_read_address_u8(entry_addr + 3),
                oam_index: oam_index as u8,
            });
            if sprites.len() == MAX_SPRITES_PER_LINE {
                break;
            }
        }
    }

    sprites
}

fn render_scanline(ppu_state: &mut PpuState, address_space: &AddressSpace) {
    let io_registers = address_space.get_io_registers();

    let lcdc = io_registers.read_register(IoRegister::LCDC);
    let bgp = io_registers.read_register(IoRegister::BGP);
    let scanline = ppu_state.scanline;

    // The effective background color: palette entry 0 after BGP mapping. Pixels not covered
    // by the background/window keep this color, and it is what behind-background sprites
    // test against.
    let bg_color_0 = bgp & 0x03;
    let mut line_buffer = [bg_color_0; SCREEN_WIDTH];

    let unsigned_tile_data = lcdc & 0x10 != 0;

    if lcdc & 0x01 != 0 {
        let scx = io_registers.read_register(IoRegister::SCX);
        let scy = io_registers.read_register(IoRegister::SCY);
        let tile_map = if lcdc & 0x08 != 0 { address::TILE_MAP_1 } else { address::TILE_MAP_0 };

        let bg_y = scanline.wrapping_add(scy);
        for (x, pixel) in line_buffer.iter_mut().enumerate() {
            let bg_x = (x as u8).wrapping_add(scx);
            let tile = address_space.ppu_read_address_u8(
                tile_map + 32 * u16::from(bg_y / 8) + u16::from(bg_x / 8),
            );
            let color_id =
                tile_pixel(address_space, unsigned_tile_data, tile, bg_y & 0x07, bg_x & 0x07);
            *pixel = (bgp >> (color_id * 2)) & 0x03;
        }
    }

    // The window renders over the background starting at WX-7, using its own line counter
    // that only advances on scanlines where window pixels were actually drawn
    if lcdc & 0x01 != 0 && lcdc & 0x20 != 0 {
        let wy = io_registers.read_register(IoRegister::WY);
        let wx = io_registers.read_register(IoRegister::WX);

        if scanline >= wy && wx <= 166 {
            let tile_map = if lcdc & 0x40 != 0 { address::TILE_MAP_1 } else { address::TILE_MAP_0 };
            let window_line = ppu_state.window_line;

            let start_x = i32::from(wx) - 7;
            let mut window_drawn = false;
            for x in start_x.max(0)..SCREEN_WIDTH as i32 {
                let window_col = (x - start_x) as u16;
                let tile = address_space.ppu_read_address_u8(
                    tile_map + 32 * u16::from(window_line / 8) + window_col / 8,
                );
                let color_id = tile_pixel(
                    address_space,
                    unsigned_tile_data,
                    tile,
                    window_line & 0x07,
                    (window_col & 0x07) as u8,
                );
                line_buffer[x as usize] = (bgp >> (color_id * 2)) & 0x03;
                window_drawn = true;
            }

            if window_drawn {
                ppu_state.window_line += 1;
            }
        }
    }

    if lcdc & 0x02 != 0 {
        render_sprites(address_space, scanline, lcdc, bg_color_0, &mut line_buffer);
    }

    ppu_state.frame_buffer[scanline as usize] = line_buffer;
}

fn render_sprites(
    address_space: &AddressSpace,
    scanline: u8,
    lcdc: u8,
    bg_color_0: u8,
    line_buffer: &mut [u8; SCREEN_WIDTH],
) {
    let io_registers = address_space.get_io_registers();
    let sprite_height: u8 = if lcdc & 0x04 != 0 { 16 } else { 8 };

    let mut sprites = scan_oam(address_space, scanline, sprite_height);

    // Lower X has priority, with OAM index breaking ties; drawing in reverse order lets the
    // winner overwrite
    sprites.sort_by_key(|sprite| (sprite.x, sprite.oam_index));

    for sprite in sprites.iter().rev() {
        let palette = if sprite.flags & 0x10 != 0 {
            io_registers.read_register(IoRegister::OBP1)
        } else {
            io_registers.read_register(IoRegister::OBP0)
        };
        let behind_background = sprite.flags & 0x80 != 0;
        let flip_x = sprite.flags & 0x20 != 0;
        let flip_y = sprite.flags & 0x40 != 0;

        let mut sprite_row = (i16::from(scanline) - (i16::from(sprite.y) - 16)) as u8;
        if flip_y {
            sprite_row = sprite_height - 1 - sprite_row;
        }

        // Tall sprites are a tile pair: even tile on top, odd tile below
        let mut tile = sprite.tile;
        if sprite_height == 16 {
            tile &= 0xFE;
        }
        if sprite_row >= 8 {
            tile += 1;
            sprite_row -= 8;
        }

        for pixel_x in 0..8 {
            let screen_x = i16::from(sprite.x) - 8 + i16::from(pixel_x);
            if !(0..SCREEN_WIDTH as i16).contains(&screen_x) {
                continue;
            }

            let tile_col = if flip_x { 7 - pixel_x } else { pixel_x };
            let color_id = tile_pixel(address_space, true, tile, sprite_row, tile_col);

            // Color 0 is transparent
            if color_id == 0 {
                continue;
            }

            if behind_background && line_buffer[screen_x as usize] != bg_color_0 {
                continue;
            }

            line_buffer[screen_x as usize] = (palette >> (color_id * 2)) & 0x03;
        }
    }
}
