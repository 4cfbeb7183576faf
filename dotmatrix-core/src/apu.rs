mod channels;

use crate::apu::channels::{NoiseChannel, PulseChannel, WaveChannel};
use crate::audio::AudioBufferProducer;
use crate::memory::ioregisters::{IoRegister, IoRegisters};

/// Output sample rate of the mixer.
pub const OUTPUT_FREQUENCY: u32 = 44100;

const CLOCK_SPEED: u32 = 4_194_304;

// The frame sequencer steps at 512Hz, driving length/sweep/envelope clocks
const FRAME_SEQUENCER_PERIOD: u32 = 8192;

const CYCLES_PER_SAMPLE: f64 = CLOCK_SPEED as f64 / OUTPUT_FREQUENCY as f64;

// Sum of four channels (max 60) normalizes to roughly [0, 1] per side
const MIXER_DIVISOR: f32 = 60.0;

pub struct ApuState {
    enabled: bool,
    frame_sequencer_counter: u32,
    frame_sequencer_step: u8,
    sample_counter: f64,
    channel_1: PulseChannel,
    channel_2: PulseChannel,
    channel_3: WaveChannel,
    channel_4: NoiseChannel,
    sample_producer: AudioBufferProducer,
}

impl ApuState {
    pub fn new(sample_producer: AudioBufferProducer) -> Self {
        Self {
            enabled: true,
            frame_sequencer_counter: 0,
            frame_sequencer_step: 0,
            sample_counter: 0.0,
            channel_1: PulseChannel::new_channel_1(),
            channel_2: PulseChannel::new_channel_2(),
            channel_3: WaveChannel::new(),
            channel_4: NoiseChannel::new(),
            sample_producer,
        }
    }

    fn disable(&mut self) {
        self.enabled = false;
        self.frame_sequencer_counter = 0;
        self.frame_sequencer_step = 0;
        self.channel_1 = PulseChannel::new_channel_1();
        self.channel_2 = PulseChannel::new_channel_2();
        self.channel_3 = WaveChannel::new();
        self.channel_4 = NoiseChannel::new();
    }

    fn process_register_updates(&mut self, io_registers: &mut IoRegisters) {
        self.channel_1.process_register_updates(io_registers);
        self.channel_2.process_register_updates(io_registers);
        self.channel_3.process_register_updates(io_registers);
        self.channel_4.process_register_updates(io_registers);
    }

    // One 512Hz frame sequencer step: length counters clock on even steps, the sweep on
    // steps 2 and 6, envelopes on step 7.
    fn clock_frame_sequencer(&mut self, io_registers: &mut IoRegisters) {
        let step = self.frame_sequencer_step;

        if step % 2 == 0 {
            self.channel_1.clock_length();
            self.channel_2.clock_length();
            self.channel_3.clock_length();
            self.channel_4.clock_length();
        }

        if step == 2 || step == 6 {
            self.channel_1.clock_sweep(io_registers);
        }

        if step == 7 {
            self.channel_1.clock_envelope();
            self.channel_2.clock_envelope();
            self.channel_4.clock_envelope();
        }

        self.frame_sequencer_step = (step + 1) % 8;
    }

    fn tick_channel_timers(&mut self, cycles: u32) {
        self.channel_1.tick_cycles(cycles);
        self.channel_2.tick_cycles(cycles);
        self.channel_3.tick_cycles(cycles);
        self.channel_4.tick_cycles(cycles);
    }

    // Mix the four channel outputs into one stereo sample in [-1, 1] per side, applying the
    // NR51 routing masks and the NR50 master volumes.
    fn sample(&self, io_registers: &IoRegisters) -> (f32, f32) {
        let nr50_value = io_registers.apu_read_register(IoRegister::NR50);
        let nr51_value = io_registers.apu_read_register(IoRegister::NR51);

        let channel_outputs = [
            self.channel_1.output(),
            self.channel_2.output(),
            self.channel_3.output(io_registers),
            self.channel_4.output(),
        ];

        let mut sample_l = 0.0_f32;
        let mut sample_r = 0.0_f32;
        for (channel_index, output) in channel_outputs.into_iter().enumerate() {
            if nr51_value & (0x10 << channel_index) != 0 {
                sample_l += f32::from(output);
            }
            if nr51_value & (0x01 << channel_index) != 0 {
                sample_r += f32::from(output);
            }
        }

        let l_volume = f32::from(((nr50_value >> 4) & 0x07) + 1) / 8.0;
        let r_volume = f32::from((nr50_value & 0x07) + 1) / 8.0;

        (sample_l / MIXER_DIVISOR * l_volume, sample_r / MIXER_DIVISOR * r_volume)
    }

    // Emit samples at the output rate; the fractional remainder carries across calls. The
    // ring drops samples when the consumer falls behind.
    fn generate_samples(&mut self, cycles: u32, io_registers: &IoRegisters) {
        self.sample_counter += f64::from(cycles);
        while self.sample_counter >= CYCLES_PER_SAMPLE {
            self.sample_counter -= CYCLES_PER_SAMPLE;

            let (sample_l, sample_r) =
                if self.enabled { self.sample(io_registers) } else { (0.0, 0.0) };
            self.sample_producer.push_stereo(sample_l, sample_r);
        }
    }

    pub fn sample_producer(&self) -> &AudioBufferProducer {
        &self.sample_producer
    }
}

/// Advance the sound unit by the given number of cycles: apply pending register writes,
/// clock the frame sequencer and channel timers, publish channel status to NR52, and mix
/// output samples into the audio ring.
pub fn tick(apu_state: &mut ApuState, io_registers: &mut IoRegisters, cycles: u32) {
    if !io_registers.audio_master_enabled() {
        if apu_state.enabled {
            // Master enable cleared: all channels shut down and the channel registers clear
            for register_address in 0xFF10..=0xFF25 {
                if let Some(register) = IoRegister::from_address(register_address) {
                    io_registers.apu_write_register(register, 0x00);
                }
            }
            io_registers.apu_write_register(IoRegister::NR52, 0x00);
            apu_state.disable();
        }

        // The output stream keeps its cadence, producing silence
        apu_state.generate_samples(cycles, io_registers);
        return;
    }
    apu_state.enabled = true;

    apu_state.process_register_updates(io_registers);

    apu_state.frame_sequencer_counter += cycles;
    while apu_state.frame_sequencer_counter >= FRAME_SEQUENCER_PERIOD {
        apu_state.frame_sequencer_counter -= FRAME_SEQUENCER_PERIOD;
        apu_state.clock_frame_sequencer(io_registers);
    }

    apu_state.tick_channel_timers(cycles);

    let nr52_value = io_registers.apu_read_register(IoRegister::NR52);
    let new_nr52_value = (nr52_value & 0x80)
        | (u8::from(apu_state.channel_4.channel_enabled()) << 3)
        | (u8::from(apu_state.channel_3.channel_enabled()) << 2)
        | (u8::from(apu_state.channel_2.channel_enabled()) << 1)
        | u8::from(apu_state.channel_1.channel_enabled());
    io_registers.apu_write_register(IoRegister::NR52, new_nr52_value);

    apu_state.generate_samples(cycles, io_registers);
}
