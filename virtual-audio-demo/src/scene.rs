use virtual_audio::math::Vec3;
use virtual_audio::{AudioSourceSettings, DspTick, MixerContext, RolloffMode, SourceId};

const RADIUS: f32 = 3.0;

struct OrbitingTone {
    id: SourceId,
    settings: AudioSourceSettings,
    frequency: f32,
    phase: f32,
    /// Radians per second
    speed: f32,
    angle: f32,
}

/// Sine tones circling the origin at different speeds.
pub struct OrbitScene {
    tones: Vec<OrbitingTone>,
    block: Vec<f32>,
    sample_rate: f32,
}

impl OrbitScene {
    pub fn new(context: &MixerContext, count: usize, sample_rate: u32, block_size: usize) -> Self {
        let tones = (0..count)
            .map(|i| {
                let angle = i as f32 * std::f32::consts::TAU / count.max(1) as f32;
                let settings = AudioSourceSettings::spatial(position(angle))
                    .with_volume(0.5)
                    .with_rolloff(RolloffMode::Logarithmic, 1.0, 20.0);
                OrbitingTone {
                    id: context.register_source(settings.clone()),
                    settings,
                    frequency: 220.0 * (i + 1) as f32,
                    phase: 0.0,
                    speed: 0.5 + 0.25 * i as f32,
                    angle,
                }
            })
            .collect();

        Self {
            tones,
            block: vec![0.0; block_size],
            sample_rate: sample_rate as f32,
        }
    }

    pub fn advance(&mut self, context: &MixerContext, dt: f32) {
        for tone in &mut self.tones {
            tone.angle = (tone.angle + tone.speed * dt) % std::f32::consts::TAU;
            tone.settings.position = position(tone.angle);
            context.update_source_settings(tone.id, tone.settings.clone());
        }
    }

    pub fn render(&mut self, context: &MixerContext, tick: DspTick) {
        for tone in &mut self.tones {
            let step = std::f32::consts::TAU * tone.frequency / self.sample_rate;
            for sample in self.block.iter_mut() {
                *sample = tone.phase.sin();
                tone.phase = (tone.phase + step) % std::f32::consts::TAU;
            }
            context.mix_source(tone.id, &mut self.block, 1, tick);
        }
    }
}

fn position(angle: f32) -> Vec3 {
    Vec3::new(angle.sin() * RADIUS, 0.0, angle.cos() * RADIUS)
}
