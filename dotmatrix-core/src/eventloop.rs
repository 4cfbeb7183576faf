use crate::apu::ApuState;
use crate::cpu::{instructions, CpuRegisters};
use crate::graphics::GraphicsError;
use crate::input::{Hotkey, HotkeyMap, JoypadState, KeyMap, KeyMapError};
use crate::memory::AddressSpace;
use crate::ppu::PpuState;
use crate::serialize::SaveStateError;
use crate::startup::{EmulationState, SdlState};
use crate::{apu, audio, cpu, graphics, input, ppu, serialize, timer, RunConfig};
use sdl2::event::Event;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("rendering error: {source}")]
    Rendering {
        #[from]
        source: GraphicsError,
    },
    #[error("error processing input config: {source}")]
    InputConfig {
        #[from]
        source: KeyMapError,
    },
    #[error("error saving save state: {source}")]
    SaveState {
        #[from]
        source: SaveStateError,
    },
    #[error("error writing cartridge RAM to sav file: {source}")]
    RamPersist {
        #[source]
        source: io::Error,
    },
    #[error("error writing real-time clock to rtc file: {source}")]
    RtcPersist {
        #[source]
        source: io::Error,
    },
}

/// Cycles per frame: 154 scanlines of 456 dots each.
pub const CYCLES_PER_FRAME: u64 = 70224;

// Execute one CPU step: an interrupt dispatch, an instruction, or an idle HALT M-cycle.
// Returns the number of cycles consumed.
fn tick_cpu(
    address_space: &mut AddressSpace,
    cpu_registers: &mut CpuRegisters,
    ppu_state: &PpuState,
) -> u32 {
    if cpu::interrupt_triggered(cpu_registers, address_space) {
        cpu::execute_interrupt_service_routine(cpu_registers, address_space, ppu_state);
        return cpu::ISR_CYCLES_REQUIRED;
    }

    if cpu_registers.halted && !cpu::interrupt_pending(address_space) {
        // Nothing to do; let the other units run for 1 M-cycle
        return 4;
    }
    cpu_registers.halted = false;

    let (instruction, pc) =
        instructions::parse_next_instruction(address_space, cpu_registers.pc, ppu_state);

    log::trace!("Updating PC from {:04X} to {pc:04X}", cpu_registers.pc);
    cpu_registers.pc = pc;

    // Conditional control flow charges based on pre-execution flags
    let cycles_required = instruction.cycles_required(cpu_registers);

    log::trace!("Executing instruction {instruction:02X?}, takes {cycles_required} cycles");
    instruction.execute(address_space, cpu_registers, ppu_state);

    cycles_required
}

/// Run one frame's worth of emulation: execute CPU steps until the frame's cycle budget is
/// spent, forwarding each step's cycles to the timer, the pixel unit, and the sound unit in
/// that order.
///
/// `leftover_cycles` carries the overshoot of the previous frame; the return value is the
/// overshoot of this one.
pub(crate) fn run_frame(
    emulation_state: &mut EmulationState,
    apu_state: &mut ApuState,
    joypad_state: &JoypadState,
    leftover_cycles: u64,
) -> u64 {
    let EmulationState { address_space, cpu_registers, ppu_state, timer_counter } =
        emulation_state;

    let mut frame_cycles = leftover_cycles;
    while frame_cycles < CYCLES_PER_FRAME {
        input::update_joyp_register(joypad_state, address_space.get_io_registers_mut());

        // Sample TMA before executing in case the instruction writes it
        let timer_modulo = timer::read_timer_modulo(address_space.get_io_registers());

        let cycles = tick_cpu(address_space, cpu_registers, ppu_state);

        timer::update_timer_registers(
            address_space.get_io_registers_mut(),
            timer_counter,
            timer_modulo,
            cycles.into(),
        );
        ppu::tick(ppu_state, address_space, cycles);
        apu::tick(apu_state, address_space.get_io_registers_mut(), cycles);

        frame_cycles += u64::from(cycles);
    }

    frame_cycles - CYCLES_PER_FRAME
}

/// Drive the emulation until the window is closed, the exit hotkey is pressed, or the quit
/// signal is set. Wall-clock pacing comes from VSync and/or audio sync.
pub fn run(
    mut emulation_state: EmulationState,
    mut apu_state: ApuState,
    sdl_state: SdlState,
    run_config: &RunConfig,
    quit_signal: Arc<AtomicBool>,
) -> Result<(), RunError> {
    log::info!("Running with config:\n{run_config}");

    let SdlState {
        audio_device: _audio_device,
        mut canvas,
        texture_creator,
        mut event_pump,
        ..
    } = sdl_state;

    let mut texture = graphics::create_frame_texture(&texture_creator)?;

    let key_map = KeyMap::from_config(&run_config.input_config)?;
    let hotkey_map = HotkeyMap::from_config(&run_config.hotkey_config)?;
    let mut joypad_state = JoypadState::new();

    let save_state_path = serialize::determine_save_state_path(&run_config.rom_file_path);

    let mut leftover_cycles = 0;
    let mut total_frames = 0_u64;
    loop {
        leftover_cycles =
            run_frame(&mut emulation_state, &mut apu_state, &joypad_state, leftover_cycles);

        graphics::render_frame(&emulation_state.ppu_state, &mut canvas, &mut texture, run_config)?;

        // When syncing to audio, stall while the ring is better than half full; the audio
        // callback drains it at the device rate
        if run_config.audio_enabled && run_config.sync_to_audio {
            while apu_state.sample_producer().len() > audio::RING_CAPACITY_FRAMES / 2 {
                thread::sleep(Duration::from_micros(250));
            }
        }

        emulation_state.address_space.update_rtc();

        // Write out dirty cartridge RAM and the RTC roughly once per second
        total_frames += 1;
        if total_frames % 60 == 0 {
            emulation_state
                .address_space
                .persist_cartridge_ram()
                .map_err(|err| RunError::RamPersist { source: err })?;
            emulation_state
                .address_space
                .persist_rtc()
                .map_err(|err| RunError::RtcPersist { source: err })?;
        }

        if quit_signal.load(Ordering::Relaxed) {
            log::info!("Quit signal received, exiting main loop");
            return Ok(());
        }

        for event in event_pump.poll_iter() {
            log::debug!("Received SDL event: {event:?}");
            match event {
                Event::Quit { .. } => {
                    return Ok(());
                }
                Event::KeyDown { keycode: Some(keycode), .. } => {
                    joypad_state.key_down(keycode, &key_map);

                    match input::check_for_hotkey(keycode, &hotkey_map) {
                        Some(Hotkey::Exit) => {
                            return Ok(());
                        }
                        Some(Hotkey::ToggleFullscreen) => {
                            graphics::toggle_fullscreen(&mut canvas)?;
                        }
                        Some(Hotkey::SaveState) => {
                            serialize::save_state(&emulation_state, &save_state_path)?;
                        }
                        Some(Hotkey::LoadState) => {
                            match serialize::load_state(&save_state_path, emulation_state) {
                                Ok(state) => {
                                    emulation_state = state;
                                }
                                Err((err, old_state)) => {
                                    log::error!("error loading save state: {err}");
                                    emulation_state = *old_state;
                                }
                            }
                        }
                        None => {}
                    }
                }
                Event::KeyUp { keycode: Some(keycode), .. } => {
                    joypad_state.key_up(keycode, &key_map);
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Cartridge;
    use crate::memory::ioregisters::IoRegister;
    use crate::ppu::PpuMode;
    use crate::timer::TimerCounter;

    fn state_from_rom(rom: Vec<u8>) -> EmulationState {
        let cartridge = Cartridge::new(rom, None).expect("synthesized test ROM should be valid");
        EmulationState {
            address_space: AddressSpace::new(cartridge),
            cpu_registers: CpuRegisters::new(),
            ppu_state: PpuState::new(),
            timer_counter: TimerCounter::new(),
        }
    }

    fn test_apu_state() -> ApuState {
        let (producer, _consumer) = audio::stereo_sample_ring(1024);
        ApuState::new(producer)
    }

    // ROM that executes NOPs from the entry point and then spins on a JR -2
    fn nop_loop_rom() -> Vec<u8> {
        let mut rom = vec![0x00; 0x8000];
        rom[0x0134..0x0138].copy_from_slice(b"TEST");
        rom[0x0150] = 0x18; // JR -2
        rom[0x0151] = 0xFE;
        rom
    }

    // Run a single CPU step and forward its cycles to the other units
    fn step(emulation_state: &mut EmulationState, apu_state: &mut ApuState) -> u32 {
        let EmulationState { address_space, cpu_registers, ppu_state, timer_counter } =
            emulation_state;

        let timer_modulo = timer::read_timer_modulo(address_space.get_io_registers());
        let cycles = tick_cpu(address_space, cpu_registers, ppu_state);
        timer::update_timer_registers(
            address_space.get_io_registers_mut(),
            timer_counter,
            timer_modulo,
            cycles.into(),
        );
        ppu::tick(ppu_state, address_space, cycles);
        apu::tick(apu_state, address_space.get_io_registers_mut(), cycles);

        cycles
    }

    #[test]
    fn nop_loop_frame() {
        let mut emulation_state = state_from_rom(nop_loop_rom());
        let mut apu_state = test_apu_state();
        let joypad_state = JoypadState::new();

        let io_registers = emulation_state.address_space.get_io_registers_mut();
        io_registers.apu_write_register(IoRegister::IF, 0x00);

        let leftover = run_frame(&mut emulation_state, &mut apu_state, &joypad_state, 0);

        // The CPU is spinning on the JR at 0x0150
        assert!((0x0150..=0x0152).contains(&emulation_state.cpu_registers.pc));
        assert!(leftover < 24);

        // One full frame elapsed: back at line 0 in OAM scan
        assert_eq!(0, emulation_state.ppu_state.scanline());
        assert_eq!(PpuMode::ScanningOam, emulation_state.ppu_state.mode());

        let io_registers = emulation_state.address_space.get_io_registers();
        // TIMA never ran (TAC disabled), and VBlank was requested but not serviced (IME off)
        assert_eq!(0x00, io_registers.read_register(IoRegister::TIMA));
        assert_ne!(0, io_registers.read_register(IoRegister::IF) & 0x01);
    }

    #[test]
    fn timer_overflow_reloads_and_requests_interrupt() {
        let mut emulation_state = state_from_rom(nop_loop_rom());
        let mut apu_state = test_apu_state();

        let ppu_view = emulation_state.ppu_state.clone();
        emulation_state.address_space.write_address_u8(0xFF0F, 0x00, &ppu_view);
        emulation_state.address_space.write_address_u8(0xFF07, 0x05, &ppu_view);
        emulation_state.address_space.write_address_u8(0xFF06, 0xFE, &ppu_view);
        emulation_state.address_space.write_address_u8(0xFF05, 0xFE, &ppu_view);

        // TIMA ticks every 16 cycles; two ticks overflow it from 0xFE
        let mut cycles = 0;
        while cycles < 32 {
            cycles += step(&mut emulation_state, &mut apu_state);
        }

        let io_registers = emulation_state.address_space.get_io_registers();
        assert_eq!(0xFE, io_registers.read_register(IoRegister::TIMA));
        assert_ne!(0, io_registers.read_register(IoRegister::IF) & 0x04);

        // A second overflow happens 2 ticks later and reloads again
        emulation_state
            .address_space
            .get_io_registers_mut()
            .apu_write_register(IoRegister::IF, 0x00);
        let mut cycles = 0;
        while cycles < 32 {
            cycles += step(&mut emulation_state, &mut apu_state);
        }

        let io_registers = emulation_state.address_space.get_io_registers();
        assert_eq!(0xFE, io_registers.read_register(IoRegister::TIMA));
        assert_ne!(0, io_registers.read_register(IoRegister::IF) & 0x04);
    }

    #[test]
    fn halt_wakes_and_vectors_on_timer_interrupt() {
        let mut rom = vec![0x00; 0x8000];
        rom[0x0100] = 0x76; // HALT
        let mut emulation_state = state_from_rom(rom);
        let mut apu_state = test_apu_state();

        emulation_state.cpu_registers.ime = true;

        let ppu_view = emulation_state.ppu_state.clone();
        emulation_state.address_space.write_address_u8(0xFFFF, 0x04, &ppu_view);
        emulation_state.address_space.write_address_u8(0xFF0F, 0x00, &ppu_view);
        emulation_state.address_space.write_address_u8(0xFF07, 0x05, &ppu_view);

        // Run until the TIMA overflow fires and the CPU vectors to the timer handler
        let mut vectored = false;
        for _ in 0..10_000 {
            step(&mut emulation_state, &mut apu_state);
            if (0x0050..0x0060).contains(&emulation_state.cpu_registers.pc) {
                vectored = true;
                break;
            }
            assert!(
                emulation_state.cpu_registers.halted
                    || emulation_state.cpu_registers.pc <= 0x0101
            );
        }

        assert!(vectored, "CPU never vectored to the timer interrupt handler");
        assert!(!emulation_state.cpu_registers.ime);
    }

    #[test]
    fn save_state_round_trip_preserves_frame() {
        let mut emulation_state = state_from_rom(nop_loop_rom());
        let mut apu_state = test_apu_state();
        let joypad_state = JoypadState::new();

        for _ in 0..3 {
            run_frame(&mut emulation_state, &mut apu_state, &joypad_state, 0);
        }

        let bytes = serialize::encode_state(&emulation_state).expect("state should serialize");
        let mut restored =
            serialize::decode_state(&bytes, "TEST").expect("state should deserialize");
        restored.address_space.move_rom_from(&mut emulation_state.address_space);

        assert_eq!(emulation_state.cpu_registers, restored.cpu_registers);
        assert_eq!(
            emulation_state.ppu_state.frame_buffer(),
            restored.ppu_state.frame_buffer()
        );

        // The restored state keeps running identically
        let frame_before = *restored.ppu_state.frame_buffer();
        run_frame(&mut restored, &mut apu_state, &joypad_state, 0);
        assert_eq!(frame_before, *restored.ppu_state.frame_buffer());
    }

    #[test]
    fn undocumented_opcode_is_a_four_cycle_noop() {
        let mut rom = vec![0x00; 0x8000];
        rom[0x0100] = 0xD3;
        let mut emulation_state = state_from_rom(rom);
        let mut apu_state = test_apu_state();

        let cycles = step(&mut emulation_state, &mut apu_state);

        assert_eq!(4, cycles);
        assert_eq!(0x0101, emulation_state.cpu_registers.pc);
    }
}
