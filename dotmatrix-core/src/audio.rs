use crate::apu;
use sdl2::audio::{AudioCallback, AudioDevice, AudioSpecDesired};
use sdl2::AudioSubsystem;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const AUDIO_CALLBACK_SAMPLES: u16 = 1024;

/// Number of stereo frames the sample ring holds (power of two).
pub const RING_CAPACITY_FRAMES: usize = 16384;

struct RingInner {
    frames: Box<[UnsafeCell<[f32; 2]>]>,
    mask: usize,
    write_index: AtomicUsize,
    read_index: AtomicUsize,
}

// Only the producer writes `frames[write_index]` and only the consumer reads
// `frames[read_index]`; all coordination happens through the atomic indices.
unsafe impl Send for RingInner {}
unsafe impl Sync for RingInner {}

impl RingInner {
    fn len(&self) -> usize {
        let write_index = self.write_index.load(Ordering::Acquire);
        let read_index = self.read_index.load(Ordering::Acquire);
        write_index.wrapping_sub(read_index) & self.mask
    }
}

/// Producer half of the sample ring; owned by the sound unit.
pub struct AudioBufferProducer {
    inner: Arc<RingInner>,
}

/// Consumer half of the sample ring; owned by the audio callback thread.
pub struct AudioBufferConsumer {
    inner: Arc<RingInner>,
}

/// Create a bounded single-producer/single-consumer ring of interleaved stereo samples.
///
/// `capacity_frames` is rounded up to a power of two. The ring is lossy on both ends: the
/// producer drops new frames when full, and the consumer substitutes silence when empty.
pub fn stereo_sample_ring(capacity_frames: usize) -> (AudioBufferProducer, AudioBufferConsumer) {
    let capacity = capacity_frames.next_power_of_two().max(2);

    let frames: Box<[UnsafeCell<[f32; 2]>]> =
        (0..capacity).map(|_| UnsafeCell::new([0.0, 0.0])).collect();

    let inner = Arc::new(RingInner {
        frames,
        mask: capacity - 1,
        write_index: AtomicUsize::new(0),
        read_index: AtomicUsize::new(0),
    });

    (AudioBufferProducer { inner: Arc::clone(&inner) }, AudioBufferConsumer { inner })
}

impl AudioBufferProducer {
    /// Append one stereo frame. Returns false (dropping the frame) if the ring is full.
    pub fn push_stereo(&self, sample_l: f32, sample_r: f32) -> bool {
        let write_index = self.inner.write_index.load(Ordering::Relaxed);
        let next_index = (write_index + 1) & self.inner.mask;
        if next_index == self.inner.read_index.load(Ordering::Acquire) {
            return false;
        }

        unsafe {
            *self.inner.frames[write_index].get() = [sample_l, sample_r];
        }
        self.inner.write_index.store(next_index, Ordering::Release);
        true
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AudioBufferConsumer {
    /// Remove and return the oldest stereo frame, or None if the ring is empty.
    pub fn pop_stereo(&self) -> Option<(f32, f32)> {
        let read_index = self.inner.read_index.load(Ordering::Relaxed);
        if read_index == self.inner.write_index.load(Ordering::Acquire) {
            return None;
        }

        let [sample_l, sample_r] = unsafe { *self.inner.frames[read_index].get() };
        self.inner.read_index.store((read_index + 1) & self.inner.mask, Ordering::Release);
        Some((sample_l, sample_r))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// SDL2 audio callback that drains the sample ring, substituting silence on underrun.
pub struct RingPlayback {
    consumer: AudioBufferConsumer,
}

impl AudioCallback for RingPlayback {
    type Channel = f32;

    fn callback(&mut self, out: &mut [f32]) {
        for frame in out.chunks_exact_mut(2) {
            let (sample_l, sample_r) = self.consumer.pop_stereo().unwrap_or((0.0, 0.0));
            frame[0] = sample_l;
            frame[1] = sample_r;
        }
    }
}

/// Open the SDL2 playback device, wiring its callback thread to the consumer half of the
/// sample ring.
pub fn initialize(
    audio_subsystem: &AudioSubsystem,
    consumer: AudioBufferConsumer,
) -> Result<AudioDevice<RingPlayback>, String> {
    let device = audio_subsystem.open_playback(
        None,
        &AudioSpecDesired {
            freq: Some(apu::OUTPUT_FREQUENCY as i32),
            channels: Some(2),
            samples: Some(AUDIO_CALLBACK_SAMPLES),
        },
        |_spec| RingPlayback { consumer },
    )?;
    device.resume();

    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_round_trip_preserves_order() {
        let (producer, consumer) = stereo_sample_ring(8);

        assert!(producer.push_stereo(0.1, -0.1));
        assert!(producer.push_stereo(0.2, -0.2));

        assert_eq!(Some((0.1, -0.1)), consumer.pop_stereo());
        assert_eq!(Some((0.2, -0.2)), consumer.pop_stereo());
        assert_eq!(None, consumer.pop_stereo());
    }

    #[test]
    fn full_ring_drops_new_frames() {
        let (producer, consumer) = stereo_sample_ring(4);

        // Capacity 4 leaves room for 3 frames (one slot distinguishes full from empty)
        assert!(producer.push_stereo(1.0, 1.0));
        assert!(producer.push_stereo(2.0, 2.0));
        assert!(producer.push_stereo(3.0, 3.0));
        assert!(!producer.push_stereo(4.0, 4.0));
        assert_eq!(3, producer.len());

        // The oldest frame survives the overrun
        assert_eq!(Some((1.0, 1.0)), consumer.pop_stereo());
    }

    #[test]
    fn wraparound_indexing() {
        let (producer, consumer) = stereo_sample_ring(4);

        for round in 0..10 {
            let value = round as f32;
            assert!(producer.push_stereo(value, -value));
            assert_eq!(Some((value, -value)), consumer.pop_stereo());
        }
        assert!(consumer.is_empty());
    }

    #[test]
    fn consumer_never_passes_producer() {
        let (producer, consumer) = stereo_sample_ring(8);

        producer.push_stereo(1.0, 1.0);
        assert_eq!(1, consumer.len());
        assert!(consumer.pop_stereo().is_some());
        assert!(consumer.pop_stereo().is_none());
        assert_eq!(0, consumer.len());
    }
}
