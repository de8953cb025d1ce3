//! Framing of captured audio into realtime media chunks.

use gemini_live_types::MediaChunk;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::warn;

/// Sample rate the live endpoint expects for PCM input.
pub const LIVE_INPUT_SAMPLE_RATE: u32 = 16_000;
/// Sample rate of the PCM audio the live endpoint produces.
pub const LIVE_OUTPUT_SAMPLE_RATE: u32 = 24_000;
/// 128 ms of audio at the input rate.
pub const DEFAULT_CHUNK_SAMPLES: usize = 2048;

const RESAMPLER_BLOCK: usize = 1024;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1, // mono
    )?;
    Ok(resampler)
}

/// Converts f32 samples in [-1.0, 1.0] to i16, clamping out-of-range input.
pub fn convert_f32_to_i16(pcm32: &[f32]) -> Vec<i16> {
    pcm32
        .iter()
        .map(|&sample| (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16.iter().map(|&sample| sample as f32 / 32768.0).collect()
}

/// Serializes samples as little-endian PCM16 bytes.
pub fn pcm16_le_bytes(pcm16: &[i16]) -> Vec<u8> {
    pcm16.iter().flat_map(|sample| sample.to_le_bytes()).collect()
}

/// Parses little-endian PCM16 bytes, e.g. the payload of an audio event.
/// A trailing odd byte is ignored.
pub fn pcm16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Turns a stream of captured samples into fixed-size PCM16 chunks at the
/// endpoint's input rate.
///
/// Capture callbacks deliver buffers of arbitrary length; the framer carries
/// partial resampler blocks and partial chunks over to the next `push`.
pub struct AudioFramer {
    resampler: Option<FastFixedIn<f32>>,
    pending_input: Vec<f32>,
    pending_output: Vec<i16>,
    chunk_samples: usize,
}

impl AudioFramer {
    /// `input_rate` is the capture device rate; resampling is skipped when it
    /// already matches [`LIVE_INPUT_SAMPLE_RATE`].
    pub fn new(input_rate: u32, chunk_samples: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(chunk_samples > 0, "chunk size must be positive");
        anyhow::ensure!(input_rate > 0, "input sample rate must be positive");

        let resampler = if input_rate == LIVE_INPUT_SAMPLE_RATE {
            None
        } else {
            Some(create_resampler(
                input_rate as f64,
                LIVE_INPUT_SAMPLE_RATE as f64,
                RESAMPLER_BLOCK,
            )?)
        };
        Ok(Self {
            resampler,
            pending_input: Vec::new(),
            pending_output: Vec::new(),
            chunk_samples,
        })
    }

    /// Feeds captured samples and returns every chunk that is now complete.
    pub fn push(&mut self, samples: &[f32]) -> Vec<MediaChunk> {
        match self.resampler.as_mut() {
            Some(resampler) => {
                self.pending_input.extend_from_slice(samples);
                loop {
                    let needed = resampler.input_frames_next();
                    if self.pending_input.len() < needed {
                        break;
                    }
                    let block: Vec<f32> = self.pending_input.drain(..needed).collect();
                    match resampler.process(&[block], None) {
                        Ok(out) => self.pending_output.extend(convert_f32_to_i16(&out[0])),
                        Err(e) => warn!(error = %e, "Dropping audio block that failed to resample"),
                    }
                }
            }
            None => self.pending_output.extend(convert_f32_to_i16(samples)),
        }

        let mut chunks = Vec::new();
        while self.pending_output.len() >= self.chunk_samples {
            let chunk: Vec<i16> = self.pending_output.drain(..self.chunk_samples).collect();
            chunks.push(MediaChunk::pcm16(pcm16_le_bytes(&chunk), LIVE_INPUT_SAMPLE_RATE));
        }
        chunks
    }

    /// Drains everything buffered into one final, possibly short, chunk.
    pub fn flush(&mut self) -> Option<MediaChunk> {
        if let Some(resampler) = self.resampler.as_mut() {
            if !self.pending_input.is_empty() {
                let tail = std::mem::take(&mut self.pending_input);
                match resampler.process_partial(Some(&[tail]), None) {
                    Ok(out) => self.pending_output.extend(convert_f32_to_i16(&out[0])),
                    Err(e) => warn!(error = %e, "Dropping audio tail that failed to resample"),
                }
            }
        }
        if self.pending_output.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending_output);
        Some(MediaChunk::pcm16(pcm16_le_bytes(&rest), LIVE_INPUT_SAMPLE_RATE))
    }
}
