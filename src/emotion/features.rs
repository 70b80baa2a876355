//! # Audio Decoding and Log-Mel Features
//!
//! Turns a staged audio file into the fixed-size spectrogram the audio
//! classifier expects.
//!
//! ## Pipeline:
//! 1. **Decode** any container/codec symphonia understands, downmix to mono
//! 2. **Resample** linearly to the configured sample rate
//! 3. **STFT** with a Hann window (rustfft), power spectrum
//! 4. **Mel filterbank** (HTK mel scale), natural log with a small floor
//! 5. **Pad or truncate** to `max_frames` columns

use crate::config::AudioConfig;
use anyhow::{anyhow, Context, Result};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use std::sync::OnceLock;
use symphonia::core::codecs::{CodecRegistry, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Floor applied before taking the log (about -80 dB of power)
const LOG_FLOOR: f32 = 1e-8;

/// Mono PCM samples at a known rate.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// symphonia's built-in codecs plus Opus, which browser recordings
/// (`audio/webm`, `audio/ogg`) almost always use.
fn codec_registry() -> &'static CodecRegistry {
    static REGISTRY: OnceLock<CodecRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut registry = CodecRegistry::new();
        registry.register_all::<symphonia_adapter_libopus::OpusDecoder>();
        symphonia::default::register_enabled_codecs(&mut registry);
        registry
    })
}

/// Decode an audio file to mono `f32` samples.
pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Unsupported or corrupt audio container")?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("No audio track found"))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;

    let mut decoder = codec_registry()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Unsupported audio codec")?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(anyhow!("Error reading audio packet: {}", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!("Skipping undecodable audio packet: {}", e);
                continue;
            }
            Err(e) => return Err(anyhow!("Audio decode failed: {}", e)),
        };

        let spec = *decoded.spec();
        let buf = sample_buf.get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
        if buf.capacity() < decoded.capacity() * spec.channels.count() {
            *buf = SampleBuffer::new(decoded.capacity() as u64, spec);
        }
        buf.copy_interleaved_ref(decoded);

        let channels = spec.channels.count().max(1);
        samples.extend(
            buf.samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    if samples.is_empty() {
        return Err(anyhow!("Audio file contains no samples"));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Linear-interpolation resampler. Good enough for spectrogram features.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor().max(1.0) as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] * (1.0 - frac) + samples[next] * frac
        })
        .collect()
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank, row-major `[n_mels][n_fft / 2 + 1]`.
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<f32>> {
    let n_bins = n_fft / 2 + 1;
    let max_mel = hz_to_mel(sample_rate as f32 / 2.0);

    // n_mels + 2 equally spaced points on the mel scale, mapped to FFT bins
    let bin_points: Vec<f32> = (0..n_mels + 2)
        .map(|i| {
            let hz = mel_to_hz(max_mel * i as f32 / (n_mels + 1) as f32);
            hz * n_fft as f32 / sample_rate as f32
        })
        .collect();

    (0..n_mels)
        .map(|m| {
            let (left, center, right) = (bin_points[m], bin_points[m + 1], bin_points[m + 2]);
            (0..n_bins)
                .map(|bin| {
                    let b = bin as f32;
                    if b <= left || b >= right {
                        0.0
                    } else if b <= center {
                        (b - left) / (center - left).max(f32::EPSILON)
                    } else {
                        (right - b) / (right - center).max(f32::EPSILON)
                    }
                })
                .collect()
        })
        .collect()
}

fn hann_window(len: usize) -> Vec<f32> {
    if len == 1 {
        return vec![1.0];
    }
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / len as f32).cos())
        .collect()
}

/// Log-mel spectrogram extractor for a fixed set of parameters.
pub struct LogMelExtractor {
    config: AudioConfig,
    window: Vec<f32>,
    filters: Vec<Vec<f32>>,
}

impl LogMelExtractor {
    pub fn new(config: AudioConfig) -> Self {
        let window = hann_window(config.n_fft);
        let filters = mel_filterbank(config.sample_rate, config.n_fft, config.n_mels);
        Self {
            config,
            window,
            filters,
        }
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Decode, resample and extract features from a file.
    pub fn extract_file(&self, path: &Path) -> Result<Vec<f32>> {
        let audio = decode_file(path)?;
        let samples = resample(&audio.samples, audio.sample_rate, self.config.sample_rate);
        tracing::debug!(
            input_rate = audio.sample_rate,
            seconds = samples.len() as f64 / self.config.sample_rate as f64,
            "Decoded audio for emotion analysis"
        );
        Ok(self.extract(&samples))
    }

    /// Row-major `[n_mels][max_frames]` log-mel matrix.
    pub fn extract(&self, samples: &[f32]) -> Vec<f32> {
        let AudioConfig {
            n_fft,
            hop_length,
            n_mels,
            max_frames,
            ..
        } = self.config;

        let mut fft_planner = FftPlanner::<f32>::new();
        let fft = fft_planner.plan_fft_forward(n_fft);
        let n_bins = n_fft / 2 + 1;

        // Silence-level value used for padding
        let floor = LOG_FLOOR.ln();
        let mut mel = vec![floor; n_mels * max_frames];
        let mut frame_buf = vec![Complex::new(0.0f32, 0.0); n_fft];

        for frame in 0..max_frames {
            let start = frame * hop_length;
            if start >= samples.len() {
                break;
            }

            for (i, slot) in frame_buf.iter_mut().enumerate() {
                let sample = samples.get(start + i).copied().unwrap_or(0.0);
                *slot = Complex::new(sample * self.window[i], 0.0);
            }
            fft.process(&mut frame_buf);

            let power: Vec<f32> = frame_buf[..n_bins].iter().map(|c| c.norm_sqr()).collect();
            for (m, filter) in self.filters.iter().enumerate() {
                let energy: f32 = filter.iter().zip(&power).map(|(w, p)| w * p).sum();
                mel[m * max_frames + frame] = energy.max(LOG_FLOOR).ln();
            }
        }

        mel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn audio_config() -> AudioConfig {
        AppConfig::default().audio
    }

    fn sine(freq: f32, rate: u32, seconds: f32) -> Vec<f32> {
        let n = (rate as f32 * seconds) as usize;
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_mel_scale_roundtrip() {
        for hz in [0.0f32, 440.0, 1000.0, 8000.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 0.5);
        }
    }

    #[test]
    fn test_filterbank_shape() {
        let filters = mel_filterbank(16000, 512, 64);
        assert_eq!(filters.len(), 64);
        assert!(filters.iter().all(|row| row.len() == 257));
        assert!(filters.iter().flatten().all(|w| (0.0..=1.0).contains(w)));
    }

    #[test]
    fn test_resample_lengths() {
        let samples = vec![0.0f32; 44100];
        assert_eq!(resample(&samples, 44100, 16000).len(), 16000);
        assert_eq!(resample(&samples, 16000, 16000).len(), 44100);
        assert!(resample(&[], 44100, 16000).is_empty());
    }

    #[test]
    fn test_extract_is_fixed_size() {
        let config = audio_config();
        let extractor = LogMelExtractor::new(config.clone());

        let short = extractor.extract(&sine(440.0, config.sample_rate, 0.1));
        let long = extractor.extract(&sine(440.0, config.sample_rate, 10.0));
        assert_eq!(short.len(), config.n_mels * config.max_frames);
        assert_eq!(long.len(), config.n_mels * config.max_frames);
        assert!(long.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_tone_energy_lands_in_low_bands() {
        let config = audio_config();
        let extractor = LogMelExtractor::new(config.clone());
        let mel = extractor.extract(&sine(300.0, config.sample_rate, 2.0));

        let band_energy = |m: usize| -> f32 {
            mel[m * config.max_frames..(m + 1) * config.max_frames].iter().sum()
        };
        let low = (0..config.n_mels / 4).map(band_energy).fold(f32::MIN, f32::max);
        let high = band_energy(config.n_mels - 1);
        assert!(low > high);
    }

    #[test]
    fn test_decode_wav_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for sample in sine(440.0, 22050, 0.5) {
            let s = (sample * 32767.0) as i16;
            writer.write_sample(s).unwrap();
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = decode_file(&path).unwrap();
        assert_eq!(decoded.sample_rate, 22050);
        // Stereo frames are downmixed to one sample each
        assert_eq!(decoded.samples.len(), 11025);
    }

    #[test]
    fn test_codec_registry_includes_opus() {
        use symphonia::core::codecs::{CODEC_TYPE_OPUS, CODEC_TYPE_PCM_S16LE, CODEC_TYPE_VORBIS};

        let registry = codec_registry();
        assert!(registry.get_codec(CODEC_TYPE_OPUS).is_some());
        assert!(registry.get_codec(CODEC_TYPE_PCM_S16LE).is_some());
        assert!(registry.get_codec(CODEC_TYPE_VORBIS).is_some());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.webm");
        std::fs::write(&path, b"definitely not audio").unwrap();
        assert!(decode_file(&path).is_err());
    }
}
