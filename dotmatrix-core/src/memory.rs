pub mod address;
pub mod ioregisters;
mod mapper;

use crate::memory::ioregisters::{IoRegister, IoRegisters};
use crate::memory::mapper::{Mapper, RamMapResult, RealTimeClock};
use crate::ppu::{PpuMode, PpuState};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CartridgeLoadError {
    #[error("header should be at least 336 bytes, was {header_len} bytes")]
    HeaderTooShort { header_len: usize },
    #[error("invalid or unsupported bank controller byte in cartridge header: {mapper_byte:02X}")]
    InvalidMapper { mapper_byte: u8 },
    #[error("invalid RAM size code, expected 0-5: {ram_size_code}")]
    InvalidRamSize { ram_size_code: u8 },
    #[error("error reading data from {file_path}: {source}")]
    FileReadError {
        file_path: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FsRamBattery {
    dirty: bool,
    sav_path: PathBuf,
}

impl FsRamBattery {
    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn persist_ram(&mut self, ram: &[u8]) -> Result<(), io::Error> {
        if !self.dirty {
            return Ok(());
        }

        let tmp_file = self.sav_path.with_extension("sav.tmp");
        fs::write(&tmp_file, ram)?;
        fs::rename(&tmp_file, &self.sav_path)?;

        self.dirty = false;

        Ok(())
    }
}

fn load_sav_file<P>(sav_file: P) -> Result<Option<Vec<u8>>, CartridgeLoadError>
where
    P: AsRef<Path>,
{
    let ram = if fs::metadata(sav_file.as_ref()).map(|metadata| metadata.is_file()).unwrap_or(false)
    {
        Some(fs::read(sav_file.as_ref()).map_err(|err| CartridgeLoadError::FileReadError {
            file_path: sav_file.as_ref().to_str().unwrap_or("").into(),
            source: err,
        })?)
    } else {
        None
    };

    if ram.is_some() {
        log::info!("Loaded external RAM from {}", sav_file.as_ref().display());
    }

    Ok(ram)
}

fn load_rtc<P>(rtc_file: P) -> Result<RealTimeClock, String>
where
    P: AsRef<Path>,
{
    let rtc_bytes = match fs::read(rtc_file.as_ref()) {
        Ok(rtc_bytes) => rtc_bytes,
        Err(err) => {
            return Err(format!("error reading RTC file {}: {err}", rtc_file.as_ref().display()));
        }
    };

    let rtc = match bincode::deserialize(&rtc_bytes) {
        Ok(rtc) => rtc,
        Err(err) => {
            return Err(format!(
                "error deserializing RTC bytes from {}: {err}",
                rtc_file.as_ref().display()
            ));
        }
    };

    log::info!("Successfully loaded real-time clock state from {}", rtc_file.as_ref().display());

    Ok(rtc)
}

fn parse_title(rom: &[u8]) -> String {
    rom[address::TITLE_START as usize..=address::TITLE_END as usize]
        .iter()
        .copied()
        .take_while(|&byte| byte != 0)
        .filter(|byte| byte.is_ascii_graphic() || *byte == b' ')
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cartridge {
    #[serde(skip)]
    rom: Vec<u8>,
    title: String,
    mapper: Mapper,
    ram: Vec<u8>,
    ram_battery: Option<FsRamBattery>,
}

impl Cartridge {
    /// Create a new Cartridge value from the given ROM.
    ///
    /// # `CartridgeLoadError`
    ///
    /// This function will return an error in the following scenarios:
    /// * The ROM is too short to contain a full header (must be at least 0x150 bytes)
    /// * The bank controller byte in the cartridge header is invalid or unsupported
    /// * The RAM size byte in the cartridge header is invalid
    pub fn new(rom: Vec<u8>, sav_path: Option<PathBuf>) -> Result<Self, CartridgeLoadError> {
        log::info!("Initializing cartridge using {} bytes of data", rom.len());

        if rom.len() < 0x0150 {
            return Err(CartridgeLoadError::HeaderTooShort { header_len: rom.len() });
        }

        let mapper_byte = rom[address::MAPPER as usize];
        let Some((mapper_type, mapper_features)) = mapper::parse_byte(mapper_byte) else {
            return Err(CartridgeLoadError::InvalidMapper { mapper_byte });
        };

        let title = parse_title(&rom);

        log::info!("Cartridge title: '{title}'");
        log::info!("Detected bank controller type {mapper_type:?} (byte: {mapper_byte:02X})");
        log::info!("Bank controller features: {mapper_features}");

        let rom_size_code = rom[address::ROM_SIZE as usize];
        let declared_rom_len = if rom_size_code <= 8 {
            0x4000_usize << (rom_size_code + 1)
        } else {
            log::warn!("ROM size code {rom_size_code:02X} is out of range, using the image size");
            rom.len()
        };
        if rom.len() < declared_rom_len {
            // Reads past the end of the image will return 0xFF
            log::warn!("ROM is {} bytes but the header declares {declared_rom_len}", rom.len());
        }

        let ram = if let Some(sav_path) = &sav_path { load_sav_file(sav_path)? } else { None };

        let rtc = match (mapper_features.has_rtc, &sav_path) {
            (true, Some(sav_path)) => {
                let rtc_path = sav_path.with_extension("rtc");
                match load_rtc(rtc_path) {
                    Ok(rtc) => Some(rtc),
                    Err(err) => {
                        log::warn!("error attempting to load previous RTC, resetting: {err}");
                        None
                    }
                }
            }
            _ => None,
        };

        let ram = match (mapper_features.has_ram, mapper_features.has_battery, ram) {
            (true, true, Some(ram)) => ram,
            (true, _, _) => {
                let ram_size_code = rom[address::RAM_SIZE as usize];
                let ram_size: usize = match ram_size_code {
                    0x00 | 0x01 => 0,
                    0x02 => 8192,   // 8 KB
                    0x03 => 32768,  // 32 KB
                    0x04 => 131072, // 128 KB
                    0x05 => 65536,  // 64 KB
                    _ => return Err(CartridgeLoadError::InvalidRamSize { ram_size_code }),
                };
                vec![0; ram_size]
            }
            _ => Vec::new(),
        };

        let ram_battery = match (mapper_features.has_battery, sav_path) {
            (true, Some(sav_path)) => Some(FsRamBattery { dirty: false, sav_path }),
            _ => None,
        };

        if let Some(ram_battery) = &ram_battery {
            log::info!("Persisting external RAM to {}", ram_battery.sav_path.display());
        }

        let mapper =
            Mapper::new(mapper_type, mapper_features, rtc, declared_rom_len as u32, ram.len() as u32);

        log::info!("Cartridge has {} bytes of external RAM", ram.len());

        Ok(Self { rom, title, mapper, ram, ram_battery })
    }

    pub fn from_file(file_path: &str) -> Result<Self, CartridgeLoadError> {
        log::info!("Loading cartridge from '{file_path}'");

        let rom =
            fs::read(Path::new(file_path)).map_err(|err| CartridgeLoadError::FileReadError {
                file_path: file_path.into(),
                source: err,
            })?;

        let sav_file = Path::new(file_path).with_extension("sav");

        Self::new(rom, Some(sav_file))
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Read a value from the given ROM address. Reads past the end of the ROM image return
    /// 0xFF.
    ///
    /// # Panics
    ///
    /// This method will panic if the ROM address is not in the range \[0x0000, 0x7FFF\].
    pub fn read_rom_address(&self, address: u16) -> u8 {
        let mapped_address = self.mapper.map_rom_address(address);
        self.rom.get(mapped_address as usize).copied().unwrap_or(0xFF)
    }

    /// Write a value to the given ROM address (or in reality, set a bank controller register).
    ///
    /// # Panics
    ///
    /// This method will panic if the ROM address is not in the range \[0x0000, 0x7FFF\].
    pub fn write_rom_address(&mut self, address: u16, value: u8) {
        self.mapper.write_rom_address(address, value);
    }

    /// Read a value from the given cartridge RAM address. Returns 0xFF if the address is not
    /// currently mapped.
    pub fn read_ram_address(&self, address: u16) -> u8 {
        match self.mapper.map_ram_address(address) {
            RamMapResult::RamAddress(mapped_address) => {
                self.ram.get(mapped_address as usize).copied().unwrap_or(0xFF)
            }
            RamMapResult::MapperRegister => {
                self.mapper.read_ram_addressed_register().unwrap_or(0xFF)
            }
            RamMapResult::None => 0xFF,
        }
    }

    /// Write a value to the given cartridge RAM address. Does nothing if the address is not
    /// currently mapped.
    pub fn write_ram_address(&mut self, address: u16, value: u8) {
        match self.mapper.map_ram_address(address) {
            RamMapResult::RamAddress(mapped_address) => {
                if let Some(ram_value) = self.ram.get_mut(mapped_address as usize) {
                    *ram_value = value;
                    if let Some(ram_battery) = &mut self.ram_battery {
                        ram_battery.mark_dirty();
                    }
                }
            }
            RamMapResult::MapperRegister => {
                self.mapper.write_ram_addressed_register(value);
            }
            RamMapResult::None => {}
        }
    }

    /// If this cartridge has battery-backed external RAM, save it to disk if it has been
    /// modified since the last time this method was called.
    pub fn persist_external_ram(&mut self) -> Result<(), io::Error> {
        if let Some(ram_battery) = &mut self.ram_battery {
            ram_battery.persist_ram(&self.ram)
        } else {
            Ok(())
        }
    }

    /// Save the current state of the real-time clock, if this cartridge has one.
    pub fn persist_rtc(&self) -> Result<(), io::Error> {
        if let (Some(rtc), Some(battery)) = (self.mapper.get_clock(), self.ram_battery.as_ref()) {
            let rtc_bytes = bincode::serialize(rtc)
                .expect("RTC value-to-bytes serialization should never fail");

            let rtc_path = battery.sav_path.with_extension("rtc");
            fs::write(rtc_path, rtc_bytes)?;
        }

        Ok(())
    }

    /// Update the current state of the real-time clock based on the current time, if this
    /// cartridge has one.
    pub fn update_rtc(&mut self) {
        self.mapper.update_rtc();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressSpace {
    cartridge: Cartridge,
    #[serde(
        serialize_with = "crate::serialize::serialize_array",
        deserialize_with = "crate::serialize::deserialize_array"
    )]
    vram: [u8; 8192],
    #[serde(
        serialize_with = "crate::serialize::serialize_array",
        deserialize_with = "crate::serialize::deserialize_array"
    )]
    working_ram: [u8; 8192],
    #[serde(
        serialize_with = "crate::serialize::serialize_array",
        deserialize_with = "crate::serialize::deserialize_array"
    )]
    oam: [u8; 160],
    io_registers: IoRegisters,
    #[serde(
        serialize_with = "crate::serialize::serialize_array",
        deserialize_with = "crate::serialize::deserialize_array"
    )]
    hram: [u8; 127],
    ie_register: u8,
}

impl AddressSpace {
    pub fn new(cartridge: Cartridge) -> Self {
        Self {
            cartridge,
            vram: [0; 8192],
            working_ram: [0; 8192],
            oam: [0; 160],
            io_registers: IoRegisters::new(),
            hram: [0; 127],
            ie_register: 0,
        }
    }

    fn is_cpu_access_allowed(address: u16, ppu_state: &PpuState) -> bool {
        // OAM access not allowed while the pixel unit is scanning OAM or rendering a scanline
        if ppu_state.enabled()
            && matches!(ppu_state.mode(), PpuMode::ScanningOam | PpuMode::RenderingScanline)
            && (address::OAM_START..=address::OAM_END).contains(&address)
        {
            return false;
        }

        // VRAM access not allowed while the pixel unit is rendering a scanline
        !(ppu_state.enabled()
            && ppu_state.mode() == PpuMode::RenderingScanline
            && (address::VRAM_START..=address::VRAM_END).contains(&address))
    }

    /// Read the value at the given address from the perspective of the CPU. Returns 0xFF if
    /// the CPU is not able to access the given address because of pixel unit state.
    pub fn read_address_u8(&self, address: u16, ppu_state: &PpuState) -> u8 {
        if !Self::is_cpu_access_allowed(address, ppu_state) {
            return 0xFF;
        }

        self.read_address_u8_no_access_check(address)
    }

    fn read_address_u8_no_access_check(&self, address: u16) -> u8 {
        match address {
            address @ address::ROM_START..=address::ROM_END => {
                self.cartridge.read_rom_address(address)
            }
            address @ address::VRAM_START..=address::VRAM_END => {
                self.vram[(address - address::VRAM_START) as usize]
            }
            address @ address::EXTERNAL_RAM_START..=address::EXTERNAL_RAM_END => {
                self.cartridge.read_ram_address(address)
            }
            address @ address::WORKING_RAM_START..=address::WORKING_RAM_END => {
                self.working_ram[(address - address::WORKING_RAM_START) as usize]
            }
            address @ address::ECHO_RAM_START..=address::ECHO_RAM_END => {
                self.working_ram[(address - address::ECHO_RAM_START) as usize]
            }
            address @ address::OAM_START..=address::OAM_END => {
                self.oam[(address - address::OAM_START) as usize]
            }
            _address @ address::UNUSABLE_START..=address::UNUSABLE_END => 0xFF,
            address @ address::IO_REGISTERS_START..=address::IO_REGISTERS_END => {
                self.io_registers.read_address(address)
            }
            address @ address::HRAM_START..=address::HRAM_END => {
                self.hram[(address - address::HRAM_START) as usize]
            }
            address::IE_REGISTER => self.ie_register,
        }
    }

    /// Read the value at the given address and the following address as a little-endian
    /// 16-bit value.
    pub fn read_address_u16(&self, address: u16, ppu_state: &PpuState) -> u16 {
        let lsb = self.read_address_u8(address, ppu_state);
        let msb = self.read_address_u8(address.wrapping_add(1), ppu_state);
        u16::from_le_bytes([lsb, msb])
    }

    /// Assign a value to the given address from the perspective of the CPU. The write is
    /// ignored if the CPU is not allowed to access the given address due to pixel unit state.
    pub fn write_address_u8(&mut self, address: u16, value: u8, ppu_state: &PpuState) {
        if !Self::is_cpu_access_allowed(address, ppu_state) {
            return;
        }

        self.write_address_u8_no_access_check(address, value);
    }

    fn write_address_u8_no_access_check(&mut self, address: u16, value: u8) {
        match address {
            address @ address::ROM_START..=address::ROM_END => {
                self.cartridge.write_rom_address(address, value);
            }
            address @ address::VRAM_START..=address::VRAM_END => {
                self.vram[(address - address::VRAM_START) as usize] = value;
            }
            address @ address::EXTERNAL_RAM_START..=address::EXTERNAL_RAM_END => {
                self.cartridge.write_ram_address(address, value);
            }
            address @ address::WORKING_RAM_START..=address::WORKING_RAM_END => {
                self.working_ram[(address - address::WORKING_RAM_START) as usize] = value;
            }
            address @ address::ECHO_RAM_START..=address::ECHO_RAM_END => {
                self.working_ram[(address - address::ECHO_RAM_START) as usize] = value;
            }
            address @ address::OAM_START..=address::OAM_END => {
                self.oam[(address - address::OAM_START) as usize] = value;
            }
            _address @ address::UNUSABLE_START..=address::UNUSABLE_END => {}
            address @ address::IO_REGISTERS_START..=address::IO_REGISTERS_END => {
                self.io_registers.write_address(address, value);
                if address == IoRegister::DMA.to_address() {
                    self.run_oam_dma(value);
                }
            }
            address @ address::HRAM_START..=address::HRAM_END => {
                self.hram[(address - address::HRAM_START) as usize] = value;
            }
            address::IE_REGISTER => {
                self.ie_register = value;
            }
        }
    }

    /// Assign a 16-bit value to the given address and the following address, using
    /// little-endian.
    pub fn write_address_u16(&mut self, address: u16, value: u16, ppu_state: &PpuState) {
        let [lsb, msb] = value.to_le_bytes();
        self.write_address_u8(address, lsb, ppu_state);
        self.write_address_u8(address.wrapping_add(1), msb, ppu_state);
    }

    // Copy 160 bytes from (source_page << 8) into OAM. Real hardware takes 160 machine cycles
    // to do this; the copy here is atomic within the triggering instruction.
    fn run_oam_dma(&mut self, source_page: u8) {
        log::trace!("Running OAM DMA transfer from page {source_page:02X}");
        for offset in 0..0xA0 {
            let byte = self.read_address_u8_no_access_check((u16::from(source_page) << 8) + offset);
            self.oam[offset as usize] = byte;
        }
    }

    /// Read the OAM/VRAM value at the given address from the perspective of the pixel unit,
    /// bypassing the CPU access check.
    ///
    /// # Panics
    ///
    /// This method will panic if the address is not an OAM or VRAM address.
    pub fn ppu_read_address_u8(&self, address: u16) -> u8 {
        match address {
            address @ address::OAM_START..=address::OAM_END => {
                self.oam[(address - address::OAM_START) as usize]
            }
            address @ address::VRAM_START..=address::VRAM_END => {
                self.vram[(address - address::VRAM_START) as usize]
            }
            _ => panic!("pixel unit read method is only allowed to read OAM and VRAM"),
        }
    }

    pub fn get_io_registers(&self) -> &IoRegisters {
        &self.io_registers
    }

    pub fn get_io_registers_mut(&mut self) -> &mut IoRegisters {
        &mut self.io_registers
    }

    /// Retrieve the current value of the IE register (interrupts enabled).
    pub fn get_ie_register(&self) -> u8 {
        self.ie_register
    }

    pub fn cartridge_title(&self) -> &str {
        self.cartridge.title()
    }

    pub fn persist_cartridge_ram(&mut self) -> Result<(), io::Error> {
        self.cartridge.persist_external_ram()
    }

    pub fn persist_rtc(&mut self) -> Result<(), io::Error> {
        self.cartridge.persist_rtc()
    }

    pub fn update_rtc(&mut self) {
        self.cartridge.update_rtc();
    }

    /// Move the ROM image out of another address space into this one. The ROM is not part of
    /// serialized state, so a freshly deserialized address space needs the running instance's
    /// ROM re-attached.
    pub fn move_rom_from(&mut self, other: &mut Self) {
        self.cartridge.rom = std::mem::take(&mut other.cartridge.rom);
    }
}
