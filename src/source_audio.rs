use std::sync::Arc;

#[cfg(feature = "wav")]
use std::path::Path;

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Immutable, shared mono sample data which grains are cut from.
///
/// Cloning a `SourceAudio` only clones a reference to the sample data, so sources can be
/// handed to the audio thread and read by many voices at once without any synchronization.
#[derive(Debug, Clone)]
pub struct SourceAudio {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl SourceAudio {
    /// Create a new source from the given mono samples, recorded at `sample_rate`.
    pub fn new<S: Into<Arc<[f32]>>>(samples: S, sample_rate: u32) -> Result<Self, Error> {
        if sample_rate == 0 {
            return Err(Error::SourceError("Sample rate must be > 0".to_string()));
        }
        let samples = samples.into();
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(Error::SourceError(
                "Sample data contains non finite values".to_string(),
            ));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Create a new mono source from interleaved, multi-channel sample data by averaging
    /// all channels of each frame.
    pub fn from_interleaved(
        samples: &[f32],
        channel_count: usize,
        sample_rate: u32,
    ) -> Result<Self, Error> {
        if channel_count == 0 {
            return Err(Error::SourceError("Channel count must be > 0".to_string()));
        }
        if samples.len() % channel_count != 0 {
            return Err(Error::SourceError(format!(
                "Sample buffer length {} is not a multiple of the channel count {}",
                samples.len(),
                channel_count
            )));
        }
        let mono = if channel_count == 1 {
            samples.to_vec()
        } else {
            samples
                .chunks_exact(channel_count)
                .map(|frame| frame.iter().sum::<f32>() / channel_count as f32)
                .collect()
        };
        Self::new(mono, sample_rate)
    }

    /// Load a WAV file, mixing all channels down to mono.
    #[cfg(feature = "wav")]
    pub fn from_wav_file<P: AsRef<Path>>(file_path: P) -> Result<Self, Error> {
        let file_path = file_path.as_ref();
        let mut reader = hound::WavReader::open(file_path)?;
        let spec = reader.spec();
        log::debug!(
            "loading source audio '{}': {} channels, {} Hz, {} bit {:?}",
            file_path.display(),
            spec.channels,
            spec.sample_rate,
            spec.bits_per_sample,
            spec.sample_format
        );
        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 * scale))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Self::from_interleaved(&samples, spec.channels as usize, spec.sample_rate)
    }

    /// The source's mono sample data.
    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of mono samples in the source.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the source has no sample data.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The sample rate the source's samples were recorded at.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The source's duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

// -------------------------------------------------------------------------------------------------
