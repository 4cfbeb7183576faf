use crate::apu::channels::{dac_enabled, Envelope, FrequencyTimer, LengthCounter};
use crate::memory::ioregisters::{IoRegister, IoRegisters};

const DIVISORS: [u32; 8] = [8, 16, 32, 48, 64, 80, 96, 112];

const LFSR_SEED: u16 = 0x7FFF;

// Pseudo-random noise channel (channel 4), built around a 15-bit linear-feedback shift
// register that optionally collapses to 7 bits in width mode.
#[derive(Debug, Clone)]
pub(crate) struct NoiseChannel {
    channel_on: bool,
    dac_on: bool,
    length: LengthCounter,
    envelope: Envelope,
    clock_shift: u8,
    width_mode_7bit: bool,
    divisor_code: u8,
    lfsr: u16,
    timer: FrequencyTimer,
}

impl NoiseChannel {
    pub(crate) fn new() -> Self {
        Self {
            channel_on: false,
            dac_on: false,
            length: LengthCounter::new(64),
            envelope: Envelope::new(),
            clock_shift: 0,
            width_mode_7bit: false,
            divisor_code: 0,
            lfsr: LFSR_SEED,
            timer: FrequencyTimer::new(),
        }
    }

    fn timer_reload(&self) -> u32 {
        DIVISORS[self.divisor_code as usize] << self.clock_shift
    }

    pub(crate) fn process_register_updates(&mut self, io_registers: &mut IoRegisters) {
        let nr41_value = io_registers.apu_read_register(IoRegister::NR41);
        let nr42_value = io_registers.apu_read_register(IoRegister::NR42);
        let nr43_value = io_registers.apu_read_register(IoRegister::NR43);
        let nr44_value = io_registers.apu_read_register(IoRegister::NR44);

        if io_registers.get_dirty_bit(IoRegister::NR41) {
            io_registers.clear_dirty_bit(IoRegister::NR41);
            self.length.load(u16::from(64 - (nr41_value & 0x3F)));
        }

        self.clock_shift = nr43_value >> 4;
        self.width_mode_7bit = nr43_value & 0x08 != 0;
        self.divisor_code = nr43_value & 0x07;

        self.length.enabled = nr44_value & 0x40 != 0;

        self.dac_on = dac_enabled(nr42_value);
        if !self.dac_on {
            self.channel_on = false;
        }

        if nr44_value & 0x80 != 0 {
            io_registers.apu_write_register(IoRegister::NR44, nr44_value & 0x7F);

            if self.dac_on {
                self.channel_on = true;
            }

            self.length.trigger();
            self.envelope = Envelope::from_register(nr42_value);
            self.timer.reset(self.timer_reload());
            self.lfsr = LFSR_SEED;
        }
    }

    pub(crate) fn clock_length(&mut self) {
        if self.length.clock() {
            self.channel_on = false;
        }
    }

    pub(crate) fn clock_envelope(&mut self) {
        self.envelope.clock();
    }

    fn step_lfsr(&mut self) {
        let feedback = (self.lfsr ^ (self.lfsr >> 1)) & 0x01;
        self.lfsr = (self.lfsr >> 1) | (feedback << 14);
        if self.width_mode_7bit {
            self.lfsr = (self.lfsr & !0x40) | (feedback << 6);
        }
    }

    pub(crate) fn tick_cycles(&mut self, cycles: u32) {
        let expiries = self.timer.tick(cycles, self.timer_reload());
        for _ in 0..expiries {
            self.step_lfsr();
        }
    }

    pub(crate) fn channel_enabled(&self) -> bool {
        self.channel_on
    }

    /// Digital output sample in the range [0, 15]: the envelope volume while LFSR bit 0 is
    /// clear, 0 otherwise.
    pub(crate) fn output(&self) -> u8 {
        if !self.channel_on {
            return 0;
        }

        if self.lfsr & 0x01 == 0 {
            self.envelope.volume()
        } else {
            0
        }
    }
}
