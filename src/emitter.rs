//! Host-agnostic granular cloud parameters and grain generation.

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{utils::time::SampleTime, Error, GrainData, SourceAudio};

// -------------------------------------------------------------------------------------------------

/// Playhead mode for grain position tracking.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
)]
pub enum GrainPlayheadMode {
    /// Grains spawn at a fixed manual position. Spray adds randomness around this position.
    #[default]
    Manual,
    /// Grains spawn at a position that advances through the source over time.
    /// Spray still adds randomness.
    PlayThrough,
}

// -------------------------------------------------------------------------------------------------

/// Parameters of a granular cloud.
#[derive(Clone, Debug, PartialEq)]
pub struct GranularParameters {
    /// Size of each grain in milliseconds (1.0 - 1000.0).
    pub size: f32,
    /// Number of new grains triggered per second in Hz (0.1 - 1000.0).
    pub density: f32,
    /// Grain variation (0.0 = no variation, 1.0 = full variation of size and volume).
    /// At 1.0, grain size varies 25%-300% and volume varies 0.0-1.0.
    pub variation: f32,
    /// Random variation of the grain start position (0.0 - 1.0).
    /// Each grain's position is varied by ±2.0 seconds at maximum spray.
    pub spray: f32,
    /// Playback speed of all grains (0.0625 - 16.0).
    pub pitch: f32,
    /// Linear volume of all grains (0.0 - 1.0).
    pub volume: f32,
    /// Playhead mode for grain position tracking.
    pub playhead_mode: GrainPlayheadMode,
    /// Normalized position in the source (0.0 - 1.0) when playhead_mode is Manual.
    pub manual_position: f32,
    /// Playhead speed multiplier for PlayThrough mode (0.001 - 4.0).
    pub playhead_speed: f32,
}

impl Default for GranularParameters {
    fn default() -> Self {
        Self {
            size: 100.0,
            density: 10.0,
            variation: 0.0,
            spray: 0.0,
            pitch: 1.0,
            volume: 1.0,
            playhead_mode: GrainPlayheadMode::Manual,
            manual_position: 0.5,
            playhead_speed: 1.0,
        }
    }
}

impl GranularParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate all parameters.
    pub fn validate(&self) -> Result<(), Error> {
        if !(1.0..=1000.0).contains(&self.size) {
            return Err(Error::ParameterError(
                "Grain size must be between 1 and 1000 ms".to_string(),
            ));
        }
        if !(0.1..=1000.0).contains(&self.density) {
            return Err(Error::ParameterError(
                "Grain density must be between 0.1 and 1000.0 Hz".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.variation) {
            return Err(Error::ParameterError(
                "Grain variation must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.spray) {
            return Err(Error::ParameterError(
                "Grain spray must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0625..=16.0).contains(&self.pitch) {
            return Err(Error::ParameterError(
                "Grain pitch must be between 0.0625 and 16.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(Error::ParameterError(
                "Grain volume must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.manual_position) {
            return Err(Error::ParameterError(
                "Manual position must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.001..=4.0).contains(&self.playhead_speed) {
            return Err(Error::ParameterError(
                "Playhead speed must be between 0.001 and 4.0".to_string(),
            ));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// Generates grains for a granular cloud from [`GranularParameters`].
///
/// The emitter does not own a clock: time gets injected by the caller, which processes the
/// emitter in blocks of frames, usually ahead of the engine's current time. Each emitted grain
/// is tagged with the exact sample time of the frame that triggered it, so the engine keeps
/// future grains pending until they are due, regardless of the emitter's block size.
pub struct GrainEmitter {
    parameters: GranularParameters,
    sample_rate: u32,
    source_frames: usize,
    source_sample_rate: u32,
    rng: SmallRng,
    trigger_phase: f64,
    playhead: f64,
    current_time: SampleTime,
}

impl GrainEmitter {
    /// Longest grain an emitter creates, in milliseconds.
    pub const MAX_GRAIN_SIZE: f32 = 1000.0;
    /// Position spray range in seconds at full spray.
    const SPRAY_SECONDS: f64 = 4.0;

    /// Create a new emitter which generates grains for the given source, playing at the given
    /// output sample rate.
    pub fn new(
        parameters: GranularParameters,
        source: &SourceAudio,
        sample_rate: u32,
    ) -> Result<Self, Error> {
        Self::with_rng(parameters, source, sample_rate, SmallRng::from_os_rng())
    }

    /// Create a new emitter with a seeded, thus deterministic, random number generator.
    pub fn with_seed(
        parameters: GranularParameters,
        source: &SourceAudio,
        sample_rate: u32,
        seed: u64,
    ) -> Result<Self, Error> {
        Self::with_rng(parameters, source, sample_rate, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(
        parameters: GranularParameters,
        source: &SourceAudio,
        sample_rate: u32,
        rng: SmallRng,
    ) -> Result<Self, Error> {
        parameters.validate()?;
        if source.is_empty() {
            return Err(Error::SourceError("Source audio is empty".to_string()));
        }
        if sample_rate == 0 {
            return Err(Error::ParameterError(
                "Emitter sample rate must be > 0".to_string(),
            ));
        }
        // trigger the first grain right away
        let trigger_phase = 1.0;
        let playhead = 0.0;
        let current_time = 0;
        Ok(Self {
            parameters,
            sample_rate,
            source_frames: source.len(),
            source_sample_rate: source.sample_rate(),
            rng,
            trigger_phase,
            playhead,
            current_time,
        })
    }

    pub fn parameters(&self) -> &GranularParameters {
        &self.parameters
    }

    /// Apply new parameters. Invalid parameters are rejected and the old ones are kept.
    pub fn set_parameters(&mut self, parameters: GranularParameters) -> Result<(), Error> {
        parameters.validate()?;
        self.parameters = parameters;
        Ok(())
    }

    /// Current normalized PlayThrough playhead position.
    pub fn playhead(&self) -> f32 {
        self.playhead as f32
    }

    /// Sample time of the next block which will be processed.
    pub fn current_time(&self) -> SampleTime {
        self.current_time
    }

    /// Move the emitter to the given sample time, e.g. the engine's current time.
    pub fn set_current_time(&mut self, time: SampleTime) {
        self.current_time = time;
    }

    /// Rewind the playhead and trigger phase, keeping the current time.
    pub fn reset(&mut self) {
        self.trigger_phase = 1.0;
        self.playhead = 0.0;
    }

    /// Generate grains for the next `frame_count` frames, passing each grain along with its
    /// start time to `consumer`, then advance the emitter's time.
    pub fn process<F>(&mut self, frame_count: usize, mut consumer: F)
    where
        F: FnMut(SampleTime, GrainData),
    {
        let block_start = self.current_time;
        for frame in 0..frame_count {
            if self.update_trigger_phase() {
                consumer(block_start + frame as SampleTime, self.create_grain());
            }
            self.advance_playhead();
        }
        self.current_time += frame_count as SampleTime;
    }

    /// Generate grains for the next `frame_count` frames as a list of `(start_time, grain)`.
    pub fn process_to_vec(&mut self, frame_count: usize) -> Vec<(SampleTime, GrainData)> {
        let mut grains = Vec::new();
        self.process(frame_count, |start_time, grain| {
            grains.push((start_time, grain))
        });
        grains
    }

    /// Returns true if a grain should be triggered in the current frame.
    fn update_trigger_phase(&mut self) -> bool {
        let triggered = self.trigger_phase >= 1.0;
        if triggered {
            self.trigger_phase -= 1.0;
        }
        self.trigger_phase += self.parameters.density as f64 / self.sample_rate as f64;
        triggered
    }

    /// Advance the PlayThrough playhead by one output frame.
    fn advance_playhead(&mut self) {
        if self.parameters.playhead_mode != GrainPlayheadMode::PlayThrough {
            return;
        }
        // speed 1.0 moves through the source in real time
        let source_frames_per_output_frame =
            self.source_sample_rate as f64 / self.sample_rate as f64;
        self.playhead += self.parameters.playhead_speed as f64 * source_frames_per_output_frame
            / self.source_frames as f64;
        if self.playhead >= 1.0 {
            self.playhead -= 1.0;
        }
    }

    fn playback_position(&mut self) -> f32 {
        let base_position = match self.parameters.playhead_mode {
            GrainPlayheadMode::Manual => self.parameters.manual_position as f64,
            GrainPlayheadMode::PlayThrough => self.playhead,
        };
        let spray_variation = if self.parameters.spray > 0.0 {
            let source_duration = self.source_frames as f64 / self.source_sample_rate as f64;
            let spray_seconds = self.parameters.spray as f64
                * Self::SPRAY_SECONDS
                * (self.rng.random::<f64>() - 0.5);
            spray_seconds / source_duration
        } else {
            0.0
        };
        if spray_variation == 0.0 && self.parameters.playhead_mode == GrainPlayheadMode::Manual {
            // keep 1.0 as is
            return base_position as f32;
        }
        ((base_position + spray_variation).rem_euclid(1.0) as f32).clamp(0.0, 1.0)
    }

    fn create_grain(&mut self) -> GrainData {
        let position = self.playback_position();
        let variation = self.parameters.variation;

        // volume variation: 1.0 -> 0..1, 0.0 -> 1.0
        let volume_scale = 1.0 - variation * self.rng.random::<f32>();
        let volume = self.parameters.volume * volume_scale;

        // size variation: 1.0 -> 25%..300%
        let min_scale = 1.0 - 0.75 * variation;
        let max_scale = 1.0 + 2.0 * variation;
        let size_scale = min_scale + (max_scale - min_scale) * self.rng.random::<f32>();
        let size = (self.parameters.size * size_scale).clamp(1.0, Self::MAX_GRAIN_SIZE);

        GrainData::new(position, size, self.parameters.pitch, volume)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn source(sample_rate: u32, seconds: usize) -> SourceAudio {
        SourceAudio::new(vec![0.5; sample_rate as usize * seconds], sample_rate).unwrap()
    }

    #[test]
    fn parameter_validation() {
        assert!(GranularParameters::default().validate().is_ok());
        let invalid = [
            GranularParameters {
                size: 0.5,
                ..Default::default()
            },
            GranularParameters {
                density: 0.0,
                ..Default::default()
            },
            GranularParameters {
                spray: 1.5,
                ..Default::default()
            },
            GranularParameters {
                pitch: 0.0,
                ..Default::default()
            },
            GranularParameters {
                manual_position: f32::NAN,
                ..Default::default()
            },
        ];
        for parameters in invalid {
            assert!(parameters.validate().is_err(), "{parameters:?}");
        }

        let source = source(1024, 1);
        let mut emitter =
            GrainEmitter::with_seed(GranularParameters::default(), &source, 1024, 0).unwrap();
        assert!(emitter
            .set_parameters(GranularParameters {
                volume: 2.0,
                ..Default::default()
            })
            .is_err());
        assert_eq!(emitter.parameters(), &GranularParameters::default());
        assert!("PlayThrough".parse::<GrainPlayheadMode>().is_ok());
    }

    #[test]
    fn density() {
        let source = source(1024, 1);
        let parameters = GranularParameters {
            density: 8.0,
            size: 50.0,
            manual_position: 0.25,
            volume: 0.5,
            ..Default::default()
        };
        let mut emitter = GrainEmitter::with_seed(parameters, &source, 1024, 0).unwrap();
        let grains = emitter.process_to_vec(1024);
        assert_eq!(grains.len(), 8);
        for (index, (start_time, grain)) in grains.iter().enumerate() {
            assert_eq!(*start_time as usize, index * 128);
            assert_eq!(grain.sample_offset, 0);
            assert_eq!(grain.playhead_pos, 0.25);
            assert_eq!(grain.duration, 50.0);
            assert_eq!(grain.volume, 0.5);
            assert_eq!(grain.pitch, 1.0);
        }
        assert_eq!(emitter.current_time(), 1024);
    }

    #[test]
    fn block_sizes() {
        let source = source(1024, 1);
        let parameters = GranularParameters {
            density: 32.0,
            ..Default::default()
        };
        let mut emitter = GrainEmitter::with_seed(parameters.clone(), &source, 1024, 0).unwrap();
        let single_block = emitter
            .process_to_vec(2048)
            .into_iter()
            .map(|(time, _)| time)
            .collect::<Vec<_>>();

        let mut emitter = GrainEmitter::with_seed(parameters, &source, 1024, 0).unwrap();
        let mut small_blocks = Vec::new();
        for block in 0..(2048 / 64) {
            let block_start = block * 64;
            emitter.process(64, |time, grain| {
                assert!((block_start..block_start + 64).contains(&time));
                assert_eq!(grain.sample_offset, 0);
                small_blocks.push(time)
            });
        }
        assert_eq!(single_block, small_blocks);
        assert_eq!(single_block.len(), 64);
    }

    #[test]
    fn play_through() {
        let source = source(1024, 1);
        let parameters = GranularParameters {
            playhead_mode: GrainPlayheadMode::PlayThrough,
            density: 4.0,
            ..Default::default()
        };
        let mut emitter = GrainEmitter::with_seed(parameters, &source, 1024, 0).unwrap();
        let grains = emitter.process_to_vec(512);
        assert_eq!(emitter.playhead(), 0.5);
        let positions = grains.iter().map(|(_, g)| g.playhead_pos).collect::<Vec<_>>();
        assert_eq!(positions, vec![0.0, 0.25]);

        // wraps around at the source end
        emitter.process(1024, |_, _| ());
        assert_eq!(emitter.playhead(), 0.5);

        emitter.reset();
        assert_eq!(emitter.playhead(), 0.0);
    }

    #[test]
    fn spray_and_variation() {
        let source = source(1000, 10);
        let parameters = GranularParameters {
            density: 125.0,
            spray: 1.0,
            variation: 1.0,
            size: 100.0,
            ..Default::default()
        };
        let mut emitter = GrainEmitter::with_seed(parameters.clone(), &source, 1000, 42).unwrap();
        let grains = emitter.process_to_vec(10000);
        assert_eq!(grains.len(), 1250);
        for (_, grain) in &grains {
            // ±2 seconds of a 10 second source
            assert!((grain.playhead_pos - 0.5).abs() <= 0.2 + 1e-6);
            assert!((25.0..=300.0).contains(&grain.duration));
            assert!((0.0..=1.0).contains(&grain.volume));
            assert!(grain.validate().is_ok());
        }
        assert!(grains.iter().any(|(_, g)| g.duration > 100.0));
        assert!(grains.iter().any(|(_, g)| g.duration < 100.0));

        // seeded emitters are deterministic
        let mut other = GrainEmitter::with_seed(parameters, &source, 1000, 42).unwrap();
        assert_eq!(other.process_to_vec(10000), grains);
    }

    #[test]
    fn injected_time() {
        let source = source(1024, 1);
        let mut emitter =
            GrainEmitter::with_seed(GranularParameters::default(), &source, 1024, 0).unwrap();
        emitter.set_current_time(4096);
        let grains = emitter.process_to_vec(16);
        assert_eq!(grains.len(), 1);
        assert_eq!(grains[0].0, 4096);
        assert_eq!(emitter.current_time(), 4096 + 16);

        let empty = SourceAudio::new(Vec::<f32>::new(), 1024).unwrap();
        assert!(GrainEmitter::new(GranularParameters::default(), &empty, 1024).is_err());
    }
}
