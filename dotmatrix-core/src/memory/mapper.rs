mod rtc;

use crate::memory::address;
use serde::{Deserialize, Serialize};
use std::fmt::Formatter;
use std::time::SystemTime;

pub(crate) use rtc::RealTimeClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MapperType {
    None,
    Mbc1,
    Mbc3,
    Mbc5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamMapResult {
    // Relative address into the full external RAM array
    RamAddress(u32),
    // The RAM address is currently mapped to a cartridge-internal register (MBC3 RTC)
    MapperRegister,
    // The RAM address is invalid or RAM access is disabled
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Mapper {
    None,
    Mbc1 {
        rom_bank_bit_mask: u8,
        ram_bank_bit_mask: u8,
        ram_enabled: bool,
        rom_bank_number: u8,
        ram_bank_number: u8,
        banking_mode_select: u8,
    },
    Mbc3 {
        rom_bank_bit_mask: u8,
        ram_enabled: bool,
        rom_bank_number: u8,
        ram_bank_number: u8,
        real_time_clock: Option<RealTimeClock>,
    },
    Mbc5 {
        rom_bank_bit_mask: u16,
        ram_bank_bit_mask: u8,
        ram_enabled: bool,
        rom_bank_low: u8,
        rom_bank_high: u8,
        ram_bank_number: u8,
    },
}

impl Mapper {
    pub(crate) fn new(
        mapper_type: MapperType,
        mapper_features: MapperFeatures,
        rtc: Option<RealTimeClock>,
        rom_size: u32,
        ram_size: u32,
    ) -> Self {
        let rom_bank_bit_mask = if rom_size >= 1 << 14 { ((rom_size >> 14) - 1) as u16 } else { 0 };
        let ram_bank_bit_mask = if ram_size >= 1 << 13 { ((ram_size >> 13) - 1) as u8 } else { 0 };

        log::debug!("setting ROM bank bit mask to {rom_bank_bit_mask:02X} for size {rom_size}");
        log::debug!("setting RAM bank bit mask to {ram_bank_bit_mask:02X} for size {ram_size}");

        match mapper_type {
            MapperType::None => Self::None,
            MapperType::Mbc1 => Self::Mbc1 {
                rom_bank_bit_mask: rom_bank_bit_mask as u8,
                ram_bank_bit_mask,
                ram_enabled: false,
                rom_bank_number: 0x01,
                ram_bank_number: 0x00,
                banking_mode_select: 0x00,
            },
            MapperType::Mbc3 => {
                let real_time_clock = mapper_features.has_rtc.then(|| match rtc {
                    Some(mut rtc) => {
                        rtc.update(SystemTime::now());
                        rtc
                    }
                    None => RealTimeClock::new(SystemTime::now()),
                });
                Self::Mbc3 {
                    rom_bank_bit_mask: rom_bank_bit_mask as u8,
                    ram_enabled: false,
                    rom_bank_number: 0x01,
                    ram_bank_number: 0x00,
                    real_time_clock,
                }
            }
            MapperType::Mbc5 => Self::Mbc5 {
                rom_bank_bit_mask,
                ram_bank_bit_mask,
                ram_enabled: false,
                rom_bank_low: 0x01,
                rom_bank_high: 0x00,
                ram_bank_number: 0x00,
            },
        }
    }

    pub(crate) fn map_rom_address(&self, address: u16) -> u32 {
        match self {
            Self::None => u32::from(address),
            &Self::Mbc1 {
                rom_bank_bit_mask,
                rom_bank_number,
                ram_bank_number,
                banking_mode_select,
                ..
            } => match address {
                address @ 0x0000..=0x3FFF => {
                    if banking_mode_select == 0x00 {
                        u32::from(address)
                    } else {
                        // In banking mode 1 the fixed region maps through the upper bank bits
                        let bank_number = (ram_bank_number << 5) & rom_bank_bit_mask;
                        u32::from(address) + (u32::from(bank_number) << 14)
                    }
                }
                address @ 0x4000..=0x7FFF => {
                    let bank_number =
                        ((ram_bank_number << 5) | rom_bank_number) & rom_bank_bit_mask;
                    u32::from(address - 0x4000) + (u32::from(bank_number) << 14)
                }
                _ => panic!("mapper called for address outside of cartridge range: {address:04X}"),
            },
            &Self::Mbc3 { rom_bank_bit_mask, rom_bank_number, .. } => match address {
                address @ 0x0000..=0x3FFF => u32::from(address),
                address @ 0x4000..=0x7FFF => {
                    let bank_number = rom_bank_number & rom_bank_bit_mask;
                    u32::from(address - 0x4000) + (u32::from(bank_number) << 14)
                }
                _ => panic!("mapper called for address outside of cartridge range: {address:04X}"),
            },
            &Self::Mbc5 { rom_bank_bit_mask, rom_bank_low, rom_bank_high, .. } => match address {
                address @ 0x0000..=0x3FFF => u32::from(address),
                address @ 0x4000..=0x7FFF => {
                    // Bank 0 in the switchable window is legal on MBC5
                    let bank_number = ((u16::from(rom_bank_high) << 8) | u16::from(rom_bank_low))
                        & rom_bank_bit_mask;
                    u32::from(address - 0x4000) + (u32::from(bank_number) << 14)
                }
                _ => panic!("mapper called for address outside of cartridge range: {address:04X}"),
            },
        }
    }

    // ROM writes don't actually modify the ROM (it is read-only after all) but they do modify
    // cartridge registers
    pub(crate) fn write_rom_address(&mut self, address: u16, value: u8) {
        match self {
            Self::None => {}
            Self::Mbc1 {
                ram_enabled,
                rom_bank_number,
                ram_bank_number,
                banking_mode_select,
                ..
            } => match address {
                _address @ 0x0000..=0x1FFF => {
                    *ram_enabled = value & 0x0F == 0x0A;
                }
                _address @ 0x2000..=0x3FFF => {
                    // Bank register value 0 selects bank 1
                    *rom_bank_number = (value & 0x1F).max(0x01);
                }
                _address @ 0x4000..=0x5FFF => {
                    *ram_bank_number = value & 0x03;
                }
                _address @ 0x6000..=0x7FFF => {
                    *banking_mode_select = value & 0x01;
                }
                _ => panic!("invalid ROM write address in MBC1 mapper: {address:04X}"),
            },
            Self::Mbc3 {
                ram_enabled,
                rom_bank_number,
                ram_bank_number,
                real_time_clock,
                ..
            } => match address {
                _address @ 0x0000..=0x1FFF => {
                    *ram_enabled = value & 0x0F == 0x0A;
                }
                _address @ 0x2000..=0x3FFF => {
                    *rom_bank_number = (value & 0x7F).max(0x01);
                }
                _address @ 0x4000..=0x5FFF => {
                    *ram_bank_number = value;
                }
                _address @ 0x6000..=0x7FFF => {
                    if let Some(real_time_clock) = real_time_clock {
                        real_time_clock.process_latch_write(value);
                    }
                }
                _ => panic!("invalid ROM write address in MBC3 mapper: {address:04X}"),
            },
            Self::Mbc5 {
                ram_enabled,
                rom_bank_low,
                rom_bank_high,
                ram_bank_number,
                ..
            } => match address {
                _address @ 0x0000..=0x1FFF => {
                    *ram_enabled = value & 0x0F == 0x0A;
                }
                _address @ 0x2000..=0x2FFF => {
                    *rom_bank_low = value;
                }
                _address @ 0x3000..=0x3FFF => {
                    *rom_bank_high = value & 0x01;
                }
                _address @ 0x4000..=0x5FFF => {
                    *ram_bank_number = value & 0x0F;
                }
                _address @ 0x6000..=0x7FFF => {}
                _ => panic!("invalid ROM write address in MBC5 mapper: {address:04X}"),
            },
        }
    }

    pub(crate) fn map_ram_address(&self, address: u16) -> RamMapResult {
        let relative_address = address - address::EXTERNAL_RAM_START;

        match self {
            Self::None => RamMapResult::RamAddress(u32::from(relative_address)),
            &Self::Mbc1 {
                ram_bank_bit_mask,
                ram_enabled,
                ram_bank_number,
                banking_mode_select,
                ..
            } => {
                if !ram_enabled {
                    return RamMapResult::None;
                }

                if banking_mode_select == 0x00 {
                    RamMapResult::RamAddress(u32::from(relative_address))
                } else {
                    let bank_number = ram_bank_number & ram_bank_bit_mask;
                    RamMapResult::RamAddress(
                        u32::from(relative_address) + (u32::from(bank_number) << 13),
                    )
                }
            }
            &Self::Mbc3 { ram_enabled, ram_bank_number, .. } => {
                if !ram_enabled {
                    return RamMapResult::None;
                }

                match ram_bank_number {
                    ram_bank_number @ 0x00..=0x03 => RamMapResult::RamAddress(
                        u32::from(relative_address) + (u32::from(ram_bank_number) << 13),
                    ),
                    // 0x08-0x0C map the RTC register view over the whole window
                    _ram_bank_number @ 0x08..=0x0C => RamMapResult::MapperRegister,
                    _ => RamMapResult::None,
                }
            }
            &Self::Mbc5 { ram_bank_bit_mask, ram_enabled, ram_bank_number, .. } => {
                if !ram_enabled {
                    return RamMapResult::None;
                }

                let bank_number = ram_bank_number & ram_bank_bit_mask;
                RamMapResult::RamAddress(
                    u32::from(relative_address) + (u32::from(bank_number) << 13),
                )
            }
        }
    }

    pub(crate) fn read_ram_addressed_register(&self) -> Option<u8> {
        match self {
            Self::Mbc3 {
                ram_bank_number,
                real_time_clock: Some(real_time_clock),
                ..
            } => real_time_clock.handle_ram_read(*ram_bank_number),
            _ => None,
        }
    }

    pub(crate) fn write_ram_addressed_register(&mut self, value: u8) {
        if let Self::Mbc3 {
            ram_bank_number,
            real_time_clock: Some(real_time_clock),
            ..
        } = self
        {
            real_time_clock.handle_ram_write(*ram_bank_number, value);
        }
    }

    pub(crate) fn update_rtc(&mut self) {
        let Self::Mbc3 { real_time_clock: Some(real_time_clock), .. } = self else { return };
        real_time_clock.update(SystemTime::now());
    }

    pub(crate) fn get_clock(&self) -> Option<&RealTimeClock> {
        match self {
            Self::Mbc3 { real_time_clock, .. } => real_time_clock.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MapperFeatures {
    pub(crate) has_ram: bool,
    pub(crate) has_battery: bool,
    pub(crate) has_rtc: bool,
}

impl std::fmt::Display for MapperFeatures {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "has_ram={}, has_battery={}, has_rtc={}",
            self.has_ram, self.has_battery, self.has_rtc
        )
    }
}

pub(crate) fn parse_byte(mapper_byte: u8) -> Option<(MapperType, MapperFeatures)> {
    let (mapper_type, has_ram, has_battery) = match mapper_byte {
        0x00 => (MapperType::None, false, false),
        0x01 => (MapperType::Mbc1, false, false),
        0x02 => (MapperType::Mbc1, true, false),
        0x03 => (MapperType::Mbc1, true, true),
        0x0F => (MapperType::Mbc3, false, true),
        // 0x10 is w/ RTC, 0x13 is w/o RTC
        0x10 | 0x13 => (MapperType::Mbc3, true, true),
        0x11 => (MapperType::Mbc3, false, false),
        0x12 => (MapperType::Mbc3, true, false),
        // 0x19 is w/o rumble, 0x1C is w/ rumble
        0x19 | 0x1C => (MapperType::Mbc5, false, false),
        // 0x1A is w/o rumble, 0x1D is w/ rumble
        0x1A | 0x1D => (MapperType::Mbc5, true, false),
        // 0x1B is w/o rumble, 0x1E is w/ rumble
        0x1B | 0x1E => (MapperType::Mbc5, true, true),
        _ => return None,
    };

    let has_rtc = mapper_byte == 0x0F || mapper_byte == 0x10;

    let features = MapperFeatures { has_ram, has_battery, has_rtc };
    Some((mapper_type, features))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper_features() -> MapperFeatures {
        MapperFeatures { has_ram: false, has_battery: false, has_rtc: false }
    }

    #[test]
    fn mbc1_rom_banking() {
        // 256KB ROM (16 banks)
        let mut mapper = Mapper::new(MapperType::Mbc1, mapper_features(), None, 1 << 18, 0);

        assert_eq!(0x0000, mapper.map_rom_address(0x0000));
        assert_eq!(0x4000, mapper.map_rom_address(0x4000));
        assert_eq!(0x7FFF, mapper.map_rom_address(0x7FFF));

        mapper.write_rom_address(0x2000, 0x05);

        assert_eq!(0x0000, mapper.map_rom_address(0x0000));
        assert_eq!(0x14000, mapper.map_rom_address(0x4000));
        assert_eq!(0x15324, mapper.map_rom_address(0x5324));
        assert_eq!(0x17FFF, mapper.map_rom_address(0x7FFF));

        // Bank number higher than the highest bank masks down to 0x05
        mapper.write_rom_address(0x2000, 0x15);
        assert_eq!(0x14000, mapper.map_rom_address(0x4000));
    }

    #[test]
    fn mbc1_bank_zero_promotion() {
        let mut mapper = Mapper::new(MapperType::Mbc1, mapper_features(), None, 1 << 17, 0);

        mapper.write_rom_address(0x2000, 0x03);
        assert_eq!(3 << 14, mapper.map_rom_address(0x4000));

        mapper.write_rom_address(0x2000, 0x00);
        assert_eq!(1 << 14, mapper.map_rom_address(0x4000));
    }

    #[test]
    fn mbc1_mode_1_fixed_region_remap() {
        // 2MB ROM (128 banks)
        let mut mapper = Mapper::new(MapperType::Mbc1, mapper_features(), None, 1 << 21, 0);

        mapper.write_rom_address(0x6000, 0x01);
        mapper.write_rom_address(0x2000, 0x05);
        mapper.write_rom_address(0x4000, 0x02);

        // Fixed region reads bank ram_bank << 5 = 0x40
        assert_eq!(0x40 << 14, mapper.map_rom_address(0x0000));
        assert_eq!((0x40 << 14) + 0x3FFF, mapper.map_rom_address(0x3FFF));
        // Switchable region reads bank 0x45
        assert_eq!(0x45 << 14, mapper.map_rom_address(0x4000));

        // Mode 0 restores the identity mapping for the fixed region
        mapper.write_rom_address(0x6000, 0x00);
        assert_eq!(0x0000, mapper.map_rom_address(0x0000));
    }

    #[test]
    fn mbc1_ram_enable_and_banking() {
        // 256KB ROM, 32KB RAM
        let mut mapper = Mapper::new(MapperType::Mbc1, mapper_features(), None, 1 << 18, 1 << 15);

        assert_eq!(RamMapResult::None, mapper.map_ram_address(0xA000));

        // Only values with low nibble 0xA enable RAM
        mapper.write_rom_address(0x0000, 0x01);
        assert_eq!(RamMapResult::None, mapper.map_ram_address(0xA000));
        mapper.write_rom_address(0x0000, 0x1A);
        assert_eq!(RamMapResult::RamAddress(0x0000), mapper.map_ram_address(0xA000));
        assert_eq!(RamMapResult::RamAddress(0x1234), mapper.map_ram_address(0xB234));

        // RAM banking only applies in mode 1
        mapper.write_rom_address(0x4000, 0x02);
        assert_eq!(RamMapResult::RamAddress(0x0000), mapper.map_ram_address(0xA000));
        mapper.write_rom_address(0x6000, 0x01);
        assert_eq!(RamMapResult::RamAddress(2 << 13), mapper.map_ram_address(0xA000));
    }

    #[test]
    fn mbc3_rtc_register_view() {
        let features = MapperFeatures { has_ram: true, has_battery: true, has_rtc: true };
        let mut mapper = Mapper::new(MapperType::Mbc3, features, None, 1 << 16, 1 << 15);

        mapper.write_rom_address(0x0000, 0x0A);

        mapper.write_rom_address(0x4000, 0x02);
        assert_eq!(RamMapResult::RamAddress(2 << 13), mapper.map_ram_address(0xA000));

        mapper.write_rom_address(0x4000, 0x08);
        assert_eq!(RamMapResult::MapperRegister, mapper.map_ram_address(0xA000));
        assert_eq!(Some(0), mapper.read_ram_addressed_register());

        // Selector values outside both ranges map nothing
        mapper.write_rom_address(0x4000, 0x05);
        assert_eq!(RamMapResult::None, mapper.map_ram_address(0xA000));
    }

    #[test]
    fn mbc5_nine_bit_bank_and_bank_zero() {
        // 8MB ROM (512 banks)
        let mut mapper = Mapper::new(MapperType::Mbc5, mapper_features(), None, 1 << 23, 0);

        mapper.write_rom_address(0x2000, 0x34);
        mapper.write_rom_address(0x3000, 0x01);
        assert_eq!(0x134 << 14, mapper.map_rom_address(0x4000));

        // Unlike MBC1/MBC3, bank 0 is addressable through the switchable window
        mapper.write_rom_address(0x2000, 0x00);
        mapper.write_rom_address(0x3000, 0x00);
        assert_eq!(0x0000, mapper.map_rom_address(0x4000));
    }
}
