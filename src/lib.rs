#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod config;
mod emitter;
mod engine;
mod error;
mod player;
mod source;
mod source_audio;

// public, flat re-exports
pub use config::EngineConfig;
pub use emitter::{GrainEmitter, GrainPlayheadMode, GranularParameters};
pub use engine::{EngineStatistics, GrainEngine, GrainEngineHandle};
pub use error::Error;
pub use grain::{
    builder::{GrainBuilder, Interpolation, WrapMode},
    voice::{GrainVoice, VoiceState},
    window::{GrainWindowMode, WindowTable},
    GrainData,
};
pub use mixer::{GrainMixer, VoicePool};
pub use player::GrainPlayer;
pub use scheduler::{GrainEvent, GrainScheduler, SchedulerStatistics};
pub use source::{Source, SourceTime};
pub use source_audio::SourceAudio;
pub use utils::time::{DspClock, SampleTime};

#[cfg(feature = "cpal-output")]
pub use output::{cpal::CpalOutput, AudioHostId, DefaultOutputDevice, DefaultOutputSink};
#[cfg(feature = "wav-output")]
pub use output::wav::WavOutput;
pub use output::{OutputDevice, OutputSink};

// public mods
pub mod grain;
pub mod mixer;
pub mod output;
pub mod scheduler;
pub mod utils;
