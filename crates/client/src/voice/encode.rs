use super::VoiceError;
use advisory_core::VoicePayload;
use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::io::Cursor;

/// Sample rate of every outbound voice clip.
pub const VOICE_SAMPLE_RATE: u32 = 16_000;
pub const VOICE_FORMAT: &str = "wav";

const RESAMPLE_CHUNK: usize = 1024;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> Result<FastFixedIn<f32>, VoiceError> {
    FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1, // mono
    )
    .map_err(|e| VoiceError::Encode(format!("resampler: {e}")))
}

/// Resamples a whole mono clip. Returns the input untouched when the rates match.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>, VoiceError> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let mut resampler = create_resampler(from as f64, to as f64, RESAMPLE_CHUNK)?;
    let expected = (samples.len() as f64 * to as f64 / from as f64).round() as usize;
    let mut out = Vec::with_capacity(expected + RESAMPLE_CHUNK);

    let mut chunks = samples.chunks_exact(RESAMPLE_CHUNK);
    for chunk in chunks.by_ref() {
        let frames = resampler
            .process(&[chunk], None)
            .map_err(|e| VoiceError::Encode(format!("resample: {e}")))?;
        out.extend_from_slice(&frames[0]);
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        let frames = resampler
            .process_partial(Some(&[rest]), None)
            .map_err(|e| VoiceError::Encode(format!("resample: {e}")))?;
        out.extend_from_slice(&frames[0]);
    }
    out.resize(expected, 0.0);
    Ok(out)
}

/// Converts a slice of f32 samples to a vector of i16 samples.
pub fn convert_f32_to_i16(pcm32: &[f32]) -> Vec<i16> {
    pcm32
        .iter()
        .map(|&sample| (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Packs mono f32 samples into an in-memory 16-bit PCM WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, VoiceError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| VoiceError::Encode(format!("wav header: {e}")))?;
        for sample in convert_f32_to_i16(samples) {
            writer
                .write_sample(sample)
                .map_err(|e| VoiceError::Encode(format!("wav sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| VoiceError::Encode(format!("wav finalize: {e}")))?;
    }
    Ok(cursor.into_inner())
}

/// Turns a finished recording into the `voice_data` payload.
pub fn encode_clip(samples: &[f32], input_rate: u32) -> Result<VoicePayload, VoiceError> {
    let resampled = resample(samples, input_rate, VOICE_SAMPLE_RATE)?;
    let wav = encode_wav(&resampled, VOICE_SAMPLE_RATE)?;
    let duration_ms = resampled.len() as u64 * 1000 / VOICE_SAMPLE_RATE as u64;
    Ok(VoicePayload {
        audio: base64::engine::general_purpose::STANDARD.encode(wav),
        format: VOICE_FORMAT.to_string(),
        sample_rate: VOICE_SAMPLE_RATE,
        duration_ms,
    })
}
