use crate::config::{HotkeyConfig, InputConfig};
use crate::cpu::InterruptType;
use crate::memory::ioregisters::{IoRegister, IoRegisters};
use sdl2::keyboard::Keycode;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Button {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    Start,
    Select,
}

#[derive(Error, Debug)]
pub enum KeyMapError {
    #[error("invalid keycode in input config: {keycode}")]
    InvalidKeycode { keycode: String },
    #[error("keycode used for multiple buttons: {keycode}")]
    DuplicateKeycode { keycode: String },
}

fn try_parse_keycode(s: &str) -> Result<Keycode, KeyMapError> {
    Keycode::from_name(s).ok_or_else(|| KeyMapError::InvalidKeycode { keycode: s.into() })
}

macro_rules! build_key_map {
    ($($config_field:expr => $button:expr),+$(,)?) => {
        {
            let mut map = HashMap::new();

            $(
                let keycode = try_parse_keycode(&$config_field)?;
                if map.insert(keycode, $button).is_some() {
                    return Err(KeyMapError::DuplicateKeycode { keycode: keycode.name() });
                }
            )*

            map
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyMap(HashMap<Keycode, Button>);

impl KeyMap {
    pub fn from_config(input_config: &InputConfig) -> Result<Self, KeyMapError> {
        let map = build_key_map!(
            input_config.up => Button::Up,
            input_config.down => Button::Down,
            input_config.left => Button::Left,
            input_config.right => Button::Right,
            input_config.a => Button::A,
            input_config.b => Button::B,
            input_config.start => Button::Start,
            input_config.select => Button::Select,
        );

        Ok(Self(map))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hotkey {
    Exit,
    ToggleFullscreen,
    SaveState,
    LoadState,
}

macro_rules! build_hotkey_map {
    ($($config_field:expr => $hotkey:expr),+$(,)?) => {
        {
            let mut map = HashMap::new();

            $(
                if let Some(keycode) = $config_field.as_ref() {
                    let keycode = try_parse_keycode(keycode)?;
                    if map.insert(keycode, $hotkey).is_some() {
                        return Err(KeyMapError::DuplicateKeycode { keycode: keycode.name() });
                    }
                }
            )*

            map
        }
    }
}

#[derive(Debug, Clone)]
pub struct HotkeyMap(HashMap<Keycode, Hotkey>);

impl HotkeyMap {
    pub fn from_config(hotkey_config: &HotkeyConfig) -> Result<Self, KeyMapError> {
        let map = build_hotkey_map!(
            hotkey_config.exit => Hotkey::Exit,
            hotkey_config.toggle_fullscreen => Hotkey::ToggleFullscreen,
            hotkey_config.save_state => Hotkey::SaveState,
            hotkey_config.load_state => Hotkey::LoadState,
        );

        Ok(Self(map))
    }
}

#[must_use]
pub fn check_for_hotkey(key_down: Keycode, hotkey_map: &HotkeyMap) -> Option<Hotkey> {
    hotkey_map.0.get(&key_down).copied()
}

/// Pressed state of the eight buttons (true = held down).
#[derive(Debug, Clone, Default)]
pub struct JoypadState {
    up: bool,
    down: bool,
    left: bool,
    right: bool,
    a: bool,
    b: bool,
    start: bool,
    select: bool,
}

impl JoypadState {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_field_mut(&mut self, button: Option<Button>) -> Option<&mut bool> {
        match button {
            Some(Button::Up) => Some(&mut self.up),
            Some(Button::Down) => Some(&mut self.down),
            Some(Button::Left) => Some(&mut self.left),
            Some(Button::Right) => Some(&mut self.right),
            Some(Button::A) => Some(&mut self.a),
            Some(Button::B) => Some(&mut self.b),
            Some(Button::Start) => Some(&mut self.start),
            Some(Button::Select) => Some(&mut self.select),
            None => None,
        }
    }

    pub fn key_down(&mut self, keycode: Keycode, key_map: &KeyMap) {
        if let Some(field) = self.get_field_mut(key_map.0.get(&keycode).copied()) {
            *field = true;
            log::debug!("Key pressed: {keycode}, current state: {self:?}");
        }
    }

    pub fn key_up(&mut self, keycode: Keycode, key_map: &KeyMap) {
        if let Some(field) = self.get_field_mut(key_map.0.get(&keycode).copied()) {
            *field = false;
            log::debug!("Key released: {keycode}, current state: {self:?}");
        }
    }
}

// A press is visible as a selected low-nibble bit going from released (1) to pressed (0)
fn should_flag_interrupt(old_joyp: u8, new_joyp: u8) -> bool {
    [0x01, 0x02, 0x04, 0x08]
        .into_iter()
        .any(|bit| old_joyp & bit != 0 && new_joyp & bit == 0)
}

/// Update the contents of the JOYP hardware register based on the current joypad state, and
/// request a joypad interrupt if any selected buttons have been pressed.
///
/// This needs to be called before every CPU instruction because the CPU can write to the
/// JOYP register to specify whether it wants to read directions or button presses, and the
/// same register bits are used for both.
pub fn update_joyp_register(joypad_state: &JoypadState, io_registers: &mut IoRegisters) {
    let joyp = io_registers.read_register(IoRegister::JOYP);
    let actions_select = joyp & 0x20 == 0;
    let directions_select = joyp & 0x10 == 0;

    let bit_3 =
        !((actions_select && joypad_state.start) || (directions_select && joypad_state.down));
    let bit_2 =
        !((actions_select && joypad_state.select) || (directions_select && joypad_state.up));
    let bit_1 = !((actions_select && joypad_state.b) || (directions_select && joypad_state.left));
    let bit_0 = !((actions_select && joypad_state.a) || (directions_select && joypad_state.right));

    let new_joyp = (joyp & 0x30)
        | (u8::from(bit_3) << 3)
        | (u8::from(bit_2) << 2)
        | (u8::from(bit_1) << 1)
        | u8::from(bit_0);
    io_registers.privileged_set_joyp(new_joyp);

    if should_flag_interrupt(joyp, new_joyp) {
        io_registers.interrupt_flags().set(InterruptType::Joypad);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_io_registers() -> IoRegisters {
        let mut io_registers = IoRegisters::new();
        io_registers.apu_write_register(IoRegister::IF, 0x00);
        io_registers
    }

    #[test]
    fn direction_row_selection() {
        let mut io_registers = fresh_io_registers();
        let mut joypad_state = JoypadState::new();
        joypad_state.right = true;
        joypad_state.up = true;

        // Bit 4 clear selects the direction nibble
        io_registers.write_register(IoRegister::JOYP, 0x20);
        update_joyp_register(&joypad_state, &mut io_registers);

        // Active-low: right (bit 0) and up (bit 2) read 0
        assert_eq!(0x0A, io_registers.read_register(IoRegister::JOYP) & 0x0F);
    }

    #[test]
    fn action_row_selection() {
        let mut io_registers = fresh_io_registers();
        let mut joypad_state = JoypadState::new();
        joypad_state.a = true;
        joypad_state.start = true;

        io_registers.write_register(IoRegister::JOYP, 0x10);
        update_joyp_register(&joypad_state, &mut io_registers);

        assert_eq!(0x06, io_registers.read_register(IoRegister::JOYP) & 0x0F);
    }

    #[test]
    fn both_rows_selected_reads_the_and() {
        let mut io_registers = fresh_io_registers();
        let mut joypad_state = JoypadState::new();
        joypad_state.a = true;
        joypad_state.down = true;

        io_registers.write_register(IoRegister::JOYP, 0x00);
        update_joyp_register(&joypad_state, &mut io_registers);

        // A (bit 0) and down (bit 3) both read pressed
        assert_eq!(0x06, io_registers.read_register(IoRegister::JOYP) & 0x0F);
    }

    #[test]
    fn unselected_rows_read_released() {
        let mut io_registers = fresh_io_registers();
        let mut joypad_state = JoypadState::new();
        joypad_state.a = true;
        joypad_state.down = true;

        io_registers.write_register(IoRegister::JOYP, 0x30);
        update_joyp_register(&joypad_state, &mut io_registers);

        assert_eq!(0x0F, io_registers.read_register(IoRegister::JOYP) & 0x0F);
        // Bits 6-7 always read 1
        assert_eq!(0xC0, io_registers.read_register(IoRegister::JOYP) & 0xC0);
    }

    #[test]
    fn fresh_press_requests_joypad_interrupt() {
        let mut io_registers = fresh_io_registers();
        let mut joypad_state = JoypadState::new();

        io_registers.write_register(IoRegister::JOYP, 0x20);
        update_joyp_register(&joypad_state, &mut io_registers);
        assert!(!io_registers.interrupt_flags().get(InterruptType::Joypad));

        joypad_state.left = true;
        update_joyp_register(&joypad_state, &mut io_registers);
        assert!(io_registers.interrupt_flags().get(InterruptType::Joypad));

        // Holding the button does not re-request
        io_registers.interrupt_flags().clear(InterruptType::Joypad);
        update_joyp_register(&joypad_state, &mut io_registers);
        assert!(!io_registers.interrupt_flags().get(InterruptType::Joypad));
    }
}
