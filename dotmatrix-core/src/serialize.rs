use crate::startup::EmulationState;
use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Formatter;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error;

/// Bumped whenever the serialized layout changes; files with any other version are refused.
pub const SAVE_STATE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SaveStateError {
    #[error("unsupported save state version: {version}")]
    UnsupportedVersion { version: u32 },
    #[error("save state is for '{found}', current ROM is '{expected}'")]
    RomTitleMismatch { expected: String, found: String },
    #[error("error serializing/deserializing state: {source}")]
    Serialization {
        #[from]
        source: bincode::Error,
    },
    #[error("error reading/writing state: {source}")]
    FileSystem {
        #[from]
        source: io::Error,
    },
}

#[derive(Serialize, Deserialize)]
struct SaveState {
    version: u32,
    rom_title: String,
    state: EmulationState,
}

pub fn serialize_array<S, T, const N: usize>(
    array: &[T; N],
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    let mut state = serializer.serialize_tuple(N)?;
    for value in array {
        state.serialize_element(value)?;
    }
    state.end()
}

struct DeserializeArrayVisitor<T, const N: usize> {
    marker: PhantomData<T>,
}

impl<'de, T, const N: usize> Visitor<'de> for DeserializeArrayVisitor<T, N>
where
    T: Deserialize<'de> + Default + Copy,
{
    type Value = [T; N];

    fn expecting(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "an array of size {N}")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut array = [T::default(); N];

        for (i, value) in array.iter_mut().enumerate() {
            let Some(elem) = seq.next_element()? else {
                return Err(de::Error::custom(format!(
                    "expected array to have {N} elements, only got {i}",
                )));
            };

            *value = elem;
        }

        if seq.next_element::<T>()?.is_some() {
            return Err(de::Error::custom(format!("array has more than {N} elements")));
        }

        Ok(array)
    }
}

pub fn deserialize_array<'de, D, T, const N: usize>(deserializer: D) -> Result<[T; N], D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default + Copy,
{
    deserializer.deserialize_tuple(N, DeserializeArrayVisitor { marker: PhantomData })
}

pub fn serialize_2d_array<S, T, const N: usize, const M: usize>(
    value: &[[T; M]; N],
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    let mut state = serializer.serialize_tuple(M * N)?;
    for row in value {
        for value in row {
            state.serialize_element(value)?;
        }
    }
    state.end()
}

struct Deserialize2dArrayVisitor<T, const N: usize, const M: usize> {
    marker: PhantomData<T>,
}

impl<'de, T, const N: usize, const M: usize> Visitor<'de> for Deserialize2dArrayVisitor<T, N, M>
where
    T: Deserialize<'de> + Default + Copy,
{
    type Value = [[T; M]; N];

    fn expecting(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "a 2D array with {N} rows and {M} cols")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut array = [[T::default(); M]; N];

        for row in &mut array {
            for value in row {
                let Some(elem) = seq.next_element()? else {
                    return Err(de::Error::custom(format!(
                        "array has fewer than {M}*{N} elements"
                    )));
                };
                *value = elem;
            }
        }

        if seq.next_element::<T>()?.is_some() {
            return Err(de::Error::custom(format!("array has more than {M}*{N} elements")));
        }

        Ok(array)
    }
}

pub fn deserialize_2d_array<'de, D, T, const N: usize, const M: usize>(
    deserializer: D,
) -> Result<[[T; M]; N], D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default + Copy,
{
    deserializer.deserialize_tuple(M * N, Deserialize2dArrayVisitor { marker: PhantomData })
}

pub fn determine_save_state_path(rom_file_path: &str) -> PathBuf {
    Path::new(rom_file_path).with_extension("ss0")
}

pub(crate) fn encode_state(state: &EmulationState) -> Result<Vec<u8>, SaveStateError> {
    let save_state = SaveState {
        version: SAVE_STATE_VERSION,
        rom_title: state.address_space.cartridge_title().into(),
        state: state.clone(),
    };

    Ok(bincode::serialize(&save_state)?)
}

// The ROM image is not part of the serialized state; callers re-attach it from the running
// instance after version and title checks pass.
pub(crate) fn decode_state(
    bytes: &[u8],
    expected_title: &str,
) -> Result<EmulationState, SaveStateError> {
    let save_state: SaveState = bincode::deserialize(bytes)?;

    if save_state.version != SAVE_STATE_VERSION {
        return Err(SaveStateError::UnsupportedVersion { version: save_state.version });
    }

    if save_state.rom_title != expected_title {
        return Err(SaveStateError::RomTitleMismatch {
            expected: expected_title.into(),
            found: save_state.rom_title,
        });
    }

    Ok(save_state.state)
}

/// Write a versioned snapshot of the given emulation state to the given path.
pub fn save_state<P>(state: &EmulationState, path: P) -> Result<(), SaveStateError>
where
    P: AsRef<Path>,
{
    let serialized_state = encode_state(state)?;
    fs::write(path.as_ref(), serialized_state)?;

    log::info!("Successfully wrote save state to '{}'", path.as_ref().display());

    Ok(())
}

/// Load an emulation state snapshot from the given path, refusing files with an unknown
/// version or a ROM title that does not match the running cartridge.
///
/// On failure the running state is returned unchanged inside the error.
pub fn load_state<P>(
    path: P,
    mut current: EmulationState,
) -> Result<EmulationState, (SaveStateError, Box<EmulationState>)>
where
    P: AsRef<Path>,
{
    let serialized_state = match fs::read(path.as_ref()) {
        Ok(serialized_state) => serialized_state,
        Err(err) => {
            return Err((err.into(), Box::new(current)));
        }
    };

    let mut state =
        match decode_state(&serialized_state, current.address_space.cartridge_title()) {
            Ok(state) => state,
            Err(err) => {
                return Err((err, Box::new(current)));
            }
        };

    state.address_space.move_rom_from(&mut current.address_space);

    log::info!("Successfully loaded save state from '{}'", path.as_ref().display());

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuRegisters;
    use crate::memory::{AddressSpace, Cartridge};
    use crate::ppu::PpuState;
    use crate::timer::TimerCounter;

    fn test_state(title: &[u8]) -> EmulationState {
        let mut rom = vec![0x00; 0x8000];
        rom[0x0134..0x0134 + title.len()].copy_from_slice(title);
        let cartridge = Cartridge::new(rom, None).expect("synthesized test ROM should be valid");

        EmulationState {
            address_space: AddressSpace::new(cartridge),
            cpu_registers: CpuRegisters::new(),
            ppu_state: PpuState::new(),
            timer_counter: TimerCounter::new(),
        }
    }

    #[test]
    fn round_trip_preserves_state() {
        let mut state = test_state(b"ROUNDTRIP");

        state.cpu_registers.pc = 0x1234;
        state.cpu_registers.sp = 0xC0DE;
        let ppu_view = state.ppu_state.clone();
        state.address_space.write_address_u8(0xC123, 0x77, &ppu_view);
        state.address_space.write_address_u8(0xFF80, 0x42, &ppu_view);

        let bytes = encode_state(&state).expect("state should serialize");
        let restored = decode_state(&bytes, "ROUNDTRIP").expect("state should deserialize");

        assert_eq!(0x1234, restored.cpu_registers.pc);
        assert_eq!(0xC0DE, restored.cpu_registers.sp);
        assert_eq!(0x77, restored.address_space.read_address_u8(0xC123, &ppu_view));
        assert_eq!(0x42, restored.address_space.read_address_u8(0xFF80, &ppu_view));
    }

    #[test]
    fn title_mismatch_is_rejected() {
        let state = test_state(b"GAME A");
        let bytes = encode_state(&state).expect("state should serialize");

        assert!(matches!(
            decode_state(&bytes, "GAME B"),
            Err(SaveStateError::RomTitleMismatch { .. })
        ));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let state = test_state(b"VERSIONED");
        let save_state = SaveState {
            version: SAVE_STATE_VERSION + 1,
            rom_title: "VERSIONED".into(),
            state,
        };
        let bytes = bincode::serialize(&save_state).expect("state should serialize");

        assert!(matches!(
            decode_state(&bytes, "VERSIONED"),
            Err(SaveStateError::UnsupportedVersion { .. })
        ));
    }
}
