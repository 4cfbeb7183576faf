use crate::apu::channels::{
    dac_enabled, read_frequency, Envelope, FrequencyTimer, LengthCounter,
};
use crate::memory::ioregisters::{IoRegister, IoRegisters};

const DUTY_WAVEFORMS: [[u8; 8]; 4] = [
    [0, 0, 0, 0, 0, 0, 0, 1], // 12.5%
    [1, 0, 0, 0, 0, 0, 0, 1], // 25%
    [1, 0, 0, 0, 0, 1, 1, 1], // 50%
    [0, 1, 1, 1, 1, 1, 1, 0], // 75%
];

// Frequency sweep unit (channel 1 only). Operates on a shadow copy of the frequency that is
// reloaded on trigger.
#[derive(Debug, Clone)]
struct Sweep {
    enabled: bool,
    period: u8,
    negate: bool,
    shift: u8,
    shadow: u16,
    timer: u8,
}

// Outcome of one 128Hz sweep clock
struct SweepTick {
    new_frequency: Option<u16>,
    overflowed: bool,
}

impl Sweep {
    fn new() -> Self {
        Self { enabled: false, period: 0, negate: false, shift: 0, shadow: 0, timer: 0 }
    }

    fn set_params(&mut self, nr10_value: u8) {
        self.period = (nr10_value >> 4) & 0x07;
        self.negate = nr10_value & 0x08 != 0;
        self.shift = nr10_value & 0x07;
    }

    fn calculate(&self) -> u16 {
        let delta = self.shadow >> self.shift;
        if self.negate {
            self.shadow - delta
        } else {
            self.shadow + delta
        }
    }

    // Returns true if the initial overflow check already kills the channel
    fn trigger(&mut self, frequency: u16) -> bool {
        self.shadow = frequency;
        self.timer = if self.period == 0 { 8 } else { self.period };
        self.enabled = self.period > 0 || self.shift > 0;

        self.shift > 0 && self.calculate() > 0x07FF
    }

    fn clock(&mut self) -> SweepTick {
        let no_change = SweepTick { new_frequency: None, overflowed: false };

        if self.timer > 0 {
            self.timer -= 1;
        }
        if self.timer != 0 {
            return no_change;
        }

        self.timer = if self.period == 0 { 8 } else { self.period };
        if !self.enabled || self.period == 0 {
            return no_change;
        }

        let new_frequency = self.calculate();
        if new_frequency > 0x07FF {
            return SweepTick { new_frequency: None, overflowed: true };
        }

        if self.shift == 0 {
            return no_change;
        }

        // The new frequency takes effect, then a second calculation runs purely as another
        // overflow check
        self.shadow = new_frequency;
        SweepTick {
            new_frequency: Some(new_frequency),
            overflowed: self.calculate() > 0x07FF,
        }
    }
}

// Square wave generator (channels 1 and 2); channel 1 additionally has the frequency sweep.
#[derive(Debug, Clone)]
pub(crate) struct PulseChannel {
    channel_on: bool,
    dac_on: bool,
    duty_cycle: u8,
    duty_position: u8,
    frequency: u16,
    timer: FrequencyTimer,
    length: LengthCounter,
    envelope: Envelope,
    sweep: Option<Sweep>,
    nr1: IoRegister,
    nr2: IoRegister,
    nr3: IoRegister,
    nr4: IoRegister,
}

impl PulseChannel {
    pub(crate) fn new_channel_1() -> Self {
        Self::new(
            Some(Sweep::new()),
            IoRegister::NR11,
            IoRegister::NR12,
            IoRegister::NR13,
            IoRegister::NR14,
        )
    }

    pub(crate) fn new_channel_2() -> Self {
        Self::new(None, IoRegister::NR21, IoRegister::NR22, IoRegister::NR23, IoRegister::NR24)
    }

    fn new(
        sweep: Option<Sweep>,
        nr1: IoRegister,
        nr2: IoRegister,
        nr3: IoRegister,
        nr4: IoRegister,
    ) -> Self {
        Self {
            channel_on: false,
            dac_on: false,
            duty_cycle: 0,
            duty_position: 0,
            frequency: 0,
            timer: FrequencyTimer::new(),
            length: LengthCounter::new(64),
            envelope: Envelope::new(),
            sweep,
            nr1,
            nr2,
            nr3,
            nr4,
        }
    }

    fn timer_reload(&self) -> u32 {
        4 * (2048 - u32::from(self.frequency))
    }

    /// Update the channel's internal state from audio register contents and any writes that
    /// landed since the previous step.
    pub(crate) fn process_register_updates(&mut self, io_registers: &mut IoRegisters) {
        let nr1_value = io_registers.apu_read_register(self.nr1);
        let nr2_value = io_registers.apu_read_register(self.nr2);
        let nr4_value = io_registers.apu_read_register(self.nr4);

        self.duty_cycle = nr1_value >> 6;

        if io_registers.get_dirty_bit(self.nr1) {
            io_registers.clear_dirty_bit(self.nr1);
            self.length.load(u16::from(64 - (nr1_value & 0x3F)));
        }

        self.length.enabled = nr4_value & 0x40 != 0;
        self.frequency = read_frequency(io_registers, self.nr3, self.nr4);

        if let Some(sweep) = &mut self.sweep {
            sweep.set_params(io_registers.apu_read_register(IoRegister::NR10));
        }

        // Writing all zeros to the DAC control bits silences the channel immediately
        self.dac_on = dac_enabled(nr2_value);
        if !self.dac_on {
            self.channel_on = false;
        }

        if nr4_value & 0x80 != 0 {
            // Clear the trigger flag
            io_registers.apu_write_register(self.nr4, nr4_value & 0x7F);

            if self.dac_on {
                self.channel_on = true;
            }

            self.length.trigger();
            self.envelope = Envelope::from_register(nr2_value);
            self.timer.reset(self.timer_reload());
            self.duty_position = 0;

            if let Some(sweep) = &mut self.sweep {
                if sweep.trigger(self.frequency) {
                    self.channel_on = false;
                }
            }
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

    /// Clock the sweep unit (128Hz, channel 1 only). A successful sweep writes the new
    /// frequency back to the frequency registers.
    pub(crate) fn clock_sweep(&mut self, io_registers: &mut IoRegisters) {
        let Some(sweep) = &mut self.sweep else {
            return;
        };

        let tick = sweep.clock();

        if let Some(new_frequency) = tick.new_frequency {
            self.frequency = new_frequency;

            io_registers.apu_write_register(self.nr3, (new_frequency & 0xFF) as u8);
            let nr4_value = io_registers.apu_read_register(self.nr4);
            io_registers.apu_write_register(
                self.nr4,
                (nr4_value & 0xF8) | (new_frequency >> 8) as u8,
            );
        }

        if tick.overflowed {
            self.channel_on = false;
        }
    }

    pub(crate) fn tick_cycles(&mut self, cycles: u32) {
        let expiries = self.timer.tick(cycles, self.timer_reload());
        self.duty_position = ((u32::from(self.duty_position) + expiries) % 8) as u8;
    }

    pub(crate) fn channel_enabled(&self) -> bool {
        self.channel_on
    }

    /// Digital output sample in the range [0, 15].
    pub(crate) fn output(&self) -> u8 {
        if !self.channel_on {
            return 0;
        }

        DUTY_WAVEFORMS[self.duty_cycle as usize][self.duty_position as usize]
            * self.envelope.volume()
    }
}
