use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::AppError;

/// Encode mono float samples in [-1.0, 1.0] as 16-bit PCM WAV.
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AppError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut buffer = Vec::new();
    {
        let cursor = Cursor::new(&mut buffer);
        let mut writer = WavWriter::new(cursor, spec)
            .map_err(|e| AppError::TtsError(format!("Failed to create WAV writer: {}", e)))?;

        for sample in samples {
            let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(scaled)
                .map_err(|e| AppError::TtsError(format!("Failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| AppError::TtsError(format!("Failed to finalize WAV: {}", e)))?;
    }

    tracing::debug!(
        "Encoded {:.2}s of audio ({} bytes)",
        duration_secs(samples.len(), sample_rate),
        buffer.len()
    );

    Ok(buffer)
}

pub fn duration_secs(sample_count: usize, sample_rate: u32) -> f32 {
    if sample_rate == 0 {
        return 0.0;
    }
    sample_count as f32 / sample_rate as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_to_wav_empty() {
        let wav = samples_to_wav(&[], 16000).unwrap();
        assert!(wav.starts_with(b"RIFF"));
        assert_eq!(wav.len(), 44);
    }

    #[test]
    fn test_duration_secs() {
        assert_eq!(duration_secs(16_000, 16_000), 1.0);
        assert_eq!(duration_secs(8_000, 16_000), 0.5);
        assert_eq!(duration_secs(10, 0), 0.0);
    }

    #[test]
    fn test_samples_to_wav_header_and_clipping() {
        let samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0, 2.0, -2.0];
        let wav = samples_to_wav(&samples, 16000).unwrap();

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.bits_per_sample, 16);

        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![0, 16383, -16383, 32767, -32767, 32767, -32768]);
    }
}
