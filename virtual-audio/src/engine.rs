//! Output to the default audio device.

use crate::error::{Result, VirtualAudioError};
use crate::ingest::OutputFormat;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Fills an interleaved f32 device buffer.
///
/// Receives the buffer, the device sample rate and channel count. Returns the
/// number of frames written; the rest of the buffer is left silent.
pub type OutputFillCallback = dyn FnMut(&mut [f32], u32, u16) -> usize + Send;

pub struct OutputEngine {
    format: OutputFormat,
    block_size: usize,
    stream: Option<cpal::Stream>,
    is_running: Arc<AtomicBool>,
    frames_processed: Arc<AtomicUsize>,
    fill_callback: Option<Box<OutputFillCallback>>,
}

impl OutputEngine {
    pub fn new(format: OutputFormat, block_size: usize) -> Result<Self> {
        if format.channels == 0 || format.sample_rate == 0 {
            return Err(VirtualAudioError::Configuration(
                "Output format needs a sample rate and at least one channel".into(),
            ));
        }
        Ok(Self {
            format,
            block_size,
            stream: None,
            is_running: Arc::new(AtomicBool::new(false)),
            frames_processed: Arc::new(AtomicUsize::new(0)),
            fill_callback: None,
        })
    }

    /// Format of the default output device, for sizing a receiver before
    /// the engine is started.
    pub fn default_device_format() -> Result<OutputFormat> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| VirtualAudioError::AudioDevice("No default output device available".into()))?;
        let config = device
            .default_output_config()
            .map_err(|e| VirtualAudioError::AudioDevice(format!("Failed to get default config: {}", e)))?;
        Ok(OutputFormat {
            sample_rate: config.sample_rate().0,
            channels: config.channels() as usize,
        })
    }

    pub fn set_fill_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&mut [f32], u32, u16) -> usize + Send + 'static,
    {
        self.fill_callback = Some(Box::new(callback));
    }

    /// Opens the default device and starts calling the fill callback.
    ///
    /// The callback is moved into the stream; set a new one before starting
    /// again after [`stop`](Self::stop).
    pub fn start(&mut self) -> Result<()> {
        if self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }

        let fill_callback = self
            .fill_callback
            .take()
            .ok_or_else(|| VirtualAudioError::Engine("No fill callback set".into()))?;

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| VirtualAudioError::AudioDevice("No default output device available".into()))?;

        let channels = self.format.channels as u16;
        let config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(self.format.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.block_size as u32),
        };

        let default_config = device
            .default_output_config()
            .map_err(|e| VirtualAudioError::AudioDevice(format!("Failed to get default config: {}", e)))?;

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => self.create_stream::<f32>(&device, &config, fill_callback)?,
            cpal::SampleFormat::I16 => self.create_stream::<i16>(&device, &config, fill_callback)?,
            cpal::SampleFormat::U16 => self.create_stream::<u16>(&device, &config, fill_callback)?,
            other => {
                return Err(VirtualAudioError::AudioFormat(format!(
                    "Unsupported sample format {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| VirtualAudioError::AudioDevice(format!("Failed to start stream: {}", e)))?;

        log::info!(
            "Output started: {} Hz, {} channels, block {}",
            self.format.sample_rate,
            channels,
            self.block_size
        );
        self.stream = Some(stream);
        self.is_running.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.is_running.store(false, Ordering::Relaxed);
            drop(stream);
            log::info!("Output stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    pub fn frames_processed(&self) -> usize {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn create_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut fill_callback: Box<OutputFillCallback>,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let is_running = self.is_running.clone();
        let frames_processed = self.frames_processed.clone();
        let sample_rate = self.format.sample_rate;
        let channels = config.channels;
        let mut scratch = vec![0.0f32; self.block_size * channels as usize];

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if !is_running.load(Ordering::Relaxed) {
                        data.iter_mut().for_each(|s| *s = T::from_sample(0.0f32));
                        return;
                    }

                    // Only grows when the host hands over a larger block than requested
                    if scratch.len() < data.len() {
                        scratch.resize(data.len(), 0.0);
                    }
                    let scratch = &mut scratch[..data.len()];
                    scratch.iter_mut().for_each(|s| *s = 0.0);

                    let frames_filled = fill_callback(scratch, sample_rate, channels);

                    for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                        *out = T::from_sample(*sample);
                    }
                    frames_processed.fetch_add(frames_filled, Ordering::Relaxed);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| VirtualAudioError::AudioDevice(format!("Failed to build stream: {}", e)))
    }
}

impl Drop for OutputEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
