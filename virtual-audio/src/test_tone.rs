//! Metronome tone used to check channel routing by ear.
//!
//! Every beat restarts a decaying sine; the first beat of each bar is
//! accented with double amplitude.

const BPM: u32 = 140;
const GAIN: f32 = 0.5;
const SIGNATURE_HI: u32 = 4;
const SIGNATURE_LO: u32 = 4;

#[derive(Debug, Clone)]
pub struct TestTone {
    samples_per_tick: i64,
    next_tick: i64,
    amp: f32,
    phase: f32,
    accent: u32,
}

impl TestTone {
    pub fn new(sample_rate: u32) -> Self {
        let samples_per_tick = (sample_rate as i64 * 60 / BPM as i64 * 4 / SIGNATURE_LO as i64).max(1);
        Self {
            samples_per_tick,
            next_tick: samples_per_tick,
            amp: 0.0,
            phase: 0.0,
            accent: SIGNATURE_HI,
        }
    }

    pub fn samples_per_tick(&self) -> usize {
        self.samples_per_tick as usize
    }

    /// Restarts the pattern as if freshly created.
    pub fn reset(&mut self) {
        self.next_tick = self.samples_per_tick;
        self.amp = 0.0;
        self.phase = 0.0;
        self.accent = SIGNATURE_HI;
    }

    /// Overwrites `destination` with the next samples of the tone.
    pub fn generate(&mut self, destination: &mut [f32]) {
        for out in destination.iter_mut() {
            *out = GAIN * self.amp * self.phase.sin();

            self.next_tick -= 1;
            if self.next_tick <= 0 {
                self.next_tick = self.samples_per_tick;
                self.amp = 1.0;
                self.accent += 1;
                if self.accent > SIGNATURE_HI {
                    self.accent = 1;
                    self.amp *= 2.0;
                    self.phase = 0.0;
                }
            }

            self.phase += self.amp * 0.3;
            self.amp *= 0.993;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_per_tick() {
        // 48000 * 60 / 140 = 20571 (integer division)
        assert_eq!(TestTone::new(48000).samples_per_tick(), 20571);
    }

    #[test]
    fn test_silent_until_first_beat() {
        let mut tone = TestTone::new(48000);
        let mut buffer = vec![1.0; 1024];
        tone.generate(&mut buffer);
        assert!(buffer.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_first_beat_is_accented() {
        let mut tone = TestTone::new(1400);
        let spt = tone.samples_per_tick();
        let mut buffer = vec![0.0; spt + 64];
        tone.generate(&mut buffer);
        let peak = crate::dsp::peak_level(&buffer[spt..]);
        assert!(peak > 0.5, "accented beat should exceed gain, got {}", peak);
        assert!(peak <= 1.0);
    }

    #[test]
    fn test_deterministic_across_instances() {
        let mut a = TestTone::new(44100);
        let mut b = TestTone::new(44100);
        let mut buf_a = vec![0.0; 50000];
        let mut buf_b = vec![0.0; 50000];
        a.generate(&mut buf_a);
        b.generate(&mut buf_b[..25000]);
        b.generate(&mut buf_b[25000..]);
        assert_eq!(buf_a, buf_b);

        a.reset();
        let mut again = vec![0.0; 50000];
        a.generate(&mut again);
        assert_eq!(again, buf_a);
    }
}
