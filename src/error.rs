use std::{error, fmt, io};

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by granulator.
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Grain parameters are out of range or can't produce any samples (e.g. zero duration or
    /// an empty source). The affected grain stays silent.
    InvalidGrainParameters(String),
    /// No free voice was available for a grain. The grain got dropped.
    VoicePoolExhausted,
    /// An engine or emitter configuration value is out of range.
    ParameterError(String),
    /// Source audio could not be created from the given data.
    SourceError(String),
    AudioDecodingError(Box<dyn error::Error + Send + Sync>),
    OutputDeviceError(Box<dyn error::Error + Send + Sync>),
    SendError(String),
    IoError(io::Error),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGrainParameters(str) => write!(f, "Invalid grain parameters: {str}"),
            Self::VoicePoolExhausted => write!(f, "No free grain voice available"),
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
            Self::SourceError(str) => write!(f, "Invalid source audio: {str}"),
            Self::AudioDecodingError(err) | Self::OutputDeviceError(err) => err.fmt(f),
            Self::SendError(str) => write!(f, "Failed to send engine message: {str}"),
            Self::IoError(err) => err.fmt(f),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

#[cfg(any(feature = "wav", feature = "wav-output"))]
impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Error {
        match err {
            hound::Error::IoError(err) => Error::IoError(err),
            err => Error::AudioDecodingError(Box::new(err)),
        }
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    fn from(err: crossbeam_channel::SendError<T>) -> Self {
        Error::SendError(err.to_string())
    }
}
