use crate::cpu::InterruptType;
use crate::memory::ioregisters::{IoRegister, IoRegisters};
use serde::{Deserialize, Serialize};

// DIV increments at 16384Hz (every 256 cycles)
const DIV_UPDATE_FREQUENCY: u64 = 256;

/// Free-running cycle counter that DIV and TIMA updates are derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerCounter(u64);

impl TimerCounter {
    pub fn new() -> Self {
        Self(0)
    }
}

/// Read the TMA register.
///
/// The frame driver samples TMA before executing each instruction so that a TIMA overflow
/// during the instruction reloads from the value TMA held when the instruction started.
pub fn read_timer_modulo(io_registers: &IoRegisters) -> u8 {
    io_registers.read_register(IoRegister::TMA)
}

/// Advance the timer by the given number of cycles, updating DIV and TIMA and requesting a
/// timer interrupt on TIMA overflow.
///
/// # Panics
///
/// Panics if `cycles` is greater than 256; the frame driver forwards at most one
/// instruction's worth of cycles at a time.
pub fn update_timer_registers(
    io_registers: &mut IoRegisters,
    counter: &mut TimerCounter,
    timer_modulo: u8,
    cycles: u64,
) {
    if cycles > DIV_UPDATE_FREQUENCY {
        panic!("cycles must be <= {DIV_UPDATE_FREQUENCY}, was {cycles}");
    }

    let old_cycles = counter.0;
    let new_cycles = old_cycles + cycles;
    counter.0 = new_cycles;

    if old_cycles / DIV_UPDATE_FREQUENCY != new_cycles / DIV_UPDATE_FREQUENCY {
        let old_div = io_registers.read_register(IoRegister::DIV);
        io_registers.privileged_set_div(old_div.wrapping_add(1));
    }

    let timer_control = io_registers.read_register(IoRegister::TAC);
    if timer_control & 0x04 == 0 {
        // TIMA updates are disabled
        return;
    }

    let tima_update_frequency_bits = match timer_control & 0x03 {
        0x00 => 10, // 1024
        0x01 => 4,  // 16
        0x02 => 6,  // 64
        0x03 => 8,  // 256
        _ => unreachable!("{timer_control} & 0x03 produced a value greater than 3"),
    };

    let tima_ticks =
        (new_cycles >> tima_update_frequency_bits) - (old_cycles >> tima_update_frequency_bits);

    // This loop runs at most twice given the cycle limit above
    for _ in 0..tima_ticks {
        let old_tima = io_registers.read_register(IoRegister::TIMA);
        match old_tima.overflowing_add(1) {
            (new_tima, false) => {
                io_registers.write_register(IoRegister::TIMA, new_tima);
            }
            (_, true) => {
                io_registers.write_register(IoRegister::TIMA, timer_modulo);

                io_registers.interrupt_flags().set(InterruptType::Timer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_io_registers() -> IoRegisters {
        let mut io_registers = IoRegisters::new();
        io_registers.apu_write_register(IoRegister::IF, 0x00);
        io_registers.write_register(IoRegister::TAC, 0x00);
        io_registers.write_register(IoRegister::DIV, 0x00);
        io_registers
    }

    #[test]
    fn read_timer_modulo_fn() {
        let mut io_registers = fresh_io_registers();

        io_registers.write_register(IoRegister::TMA, 0x3D);
        assert_eq!(0x3D, read_timer_modulo(&io_registers));
    }

    #[test]
    fn divider_register() {
        let mut io_registers = fresh_io_registers();
        let mut timer_counter = TimerCounter::new();

        update_timer_registers(&mut io_registers, &mut timer_counter, 0, 20);
        assert_eq!(0x00, io_registers.read_register(IoRegister::DIV));
        assert_eq!(20, timer_counter.0);

        update_timer_registers(&mut io_registers, &mut timer_counter, 0, 235);
        assert_eq!(0x00, io_registers.read_register(IoRegister::DIV));
        assert_eq!(255, timer_counter.0);

        update_timer_registers(&mut io_registers, &mut timer_counter, 0, 1);
        assert_eq!(0x01, io_registers.read_register(IoRegister::DIV));
        assert_eq!(256, timer_counter.0);

        for _ in 0..254 {
            update_timer_registers(&mut io_registers, &mut timer_counter, 0, 256);
        }

        assert_eq!(0xFF, io_registers.read_register(IoRegister::DIV));

        update_timer_registers(&mut io_registers, &mut timer_counter, 0, 256);
        assert_eq!(0x00, io_registers.read_register(IoRegister::DIV));

        // All DIV writes reset the register regardless of value
        update_timer_registers(&mut io_registers, &mut timer_counter, 0, 256);
        assert_eq!(0x01, io_registers.read_register(IoRegister::DIV));
        io_registers.write_register(IoRegister::DIV, 0x46);
        assert_eq!(0x00, io_registers.read_register(IoRegister::DIV));
    }

    #[test]
    fn tima_register() {
        let mut io_registers = fresh_io_registers();
        let mut timer_counter = TimerCounter::new();

        let timer_modulo = 0x78;

        // Timer enabled, TIMA update frequency 16
        io_registers.write_register(IoRegister::TAC, 0x05);

        io_registers.write_register(IoRegister::TIMA, 0xE0);

        update_timer_registers(&mut io_registers, &mut timer_counter, timer_modulo, 15);
        assert_eq!(0xE0, io_registers.read_register(IoRegister::TIMA));

        update_timer_registers(&mut io_registers, &mut timer_counter, timer_modulo, 1);
        assert_eq!(0xE1, io_registers.read_register(IoRegister::TIMA));

        update_timer_registers(&mut io_registers, &mut timer_counter, timer_modulo, 40);
        assert_eq!(0xE3, io_registers.read_register(IoRegister::TIMA));
        assert_eq!(56, timer_counter.0);

        update_timer_registers(&mut io_registers, &mut timer_counter, timer_modulo, 40);
        assert_eq!(0xE6, io_registers.read_register(IoRegister::TIMA));
        assert_eq!(96, timer_counter.0);

        for _ in 0..(0xFF - 0xE6) {
            update_timer_registers(&mut io_registers, &mut timer_counter, timer_modulo, 16);
        }

        assert_eq!(0xFF, io_registers.read_register(IoRegister::TIMA));
        assert!(!io_registers.interrupt_flags().get(InterruptType::Timer));

        // Overflow: reload from TMA and request the interrupt
        update_timer_registers(&mut io_registers, &mut timer_counter, timer_modulo, 16);
        assert_eq!(0x78, io_registers.read_register(IoRegister::TIMA));
        assert!(io_registers.interrupt_flags().get(InterruptType::Timer));

        // Change update frequency to 64
        io_registers.write_register(IoRegister::TAC, 0x06);

        update_timer_registers(&mut io_registers, &mut timer_counter, timer_modulo, 256);
        assert_eq!(0x7C, io_registers.read_register(IoRegister::TIMA));

        // Disable the timer; TIMA freezes
        io_registers.write_register(IoRegister::TAC, 0x02);

        update_timer_registers(&mut io_registers, &mut timer_counter, timer_modulo, 256);
        assert_eq!(0x7C, io_registers.read_register(IoRegister::TIMA));
    }

    #[test]
    #[should_panic(expected = "cycles must be <= 256")]
    fn cycle_limit() {
        let mut io_registers = fresh_io_registers();
        let mut timer_counter = TimerCounter::new();

        update_timer_registers(&mut io_registers, &mut timer_counter, 0, 257);
    }
}
