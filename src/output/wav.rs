use std::{
    fs::File,
    io::BufWriter,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::{Duration, Instant},
};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::{
    error::Error,
    output::{check_source_specs, OutputDevice, OutputSink},
    source::{empty::EmptySource, Source, SourceTime},
    utils::buffer::scale_buffer,
};

// -------------------------------------------------------------------------------------------------

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNEL_COUNT: usize = 2;
const DEFAULT_DURATION: Duration = Duration::from_secs(60);

const BUFFER_SIZE_FRAMES: usize = 1024;

// -------------------------------------------------------------------------------------------------

/// Audio output device, which renders audio into a wav file instead of playing it back.
///
/// The file is written in a background thread as fast as possible. Rendering stops and the
/// file gets finalized when the given duration is reached, the source gets exhausted or the
/// output gets closed.
///
/// NOTE: Unlike real-time output devices, the wav writer device is initially paused, so it
/// must be resumed manually after everything that should be written got set up.
pub struct WavOutput {
    sink: WavSink,
}

impl WavOutput {
    /// Open a wav output device to write at the given file path using default specs and
    /// a duration of one minute.
    pub fn open<P: AsRef<Path>>(file_path: P) -> Result<Self, Error> {
        Self::open_with_specs(
            file_path,
            DEFAULT_SAMPLE_RATE,
            DEFAULT_CHANNEL_COUNT,
            DEFAULT_DURATION,
        )
    }

    /// Create a new wav output device with the given parameters.
    ///
    /// * `file_path`: Target file path. Should end with ".wav" extension.
    /// * `sample_rate`: The wav file's sample rate.
    /// * `channel_count`: The wav file's channel layout.
    /// * `duration`: Max length of the written content.
    ///
    /// Wav file contents are always saved as 32bit floats.
    pub fn open_with_specs<P: AsRef<Path>>(
        file_path: P,
        sample_rate: u32,
        channel_count: usize,
        duration: Duration,
    ) -> Result<Self, Error> {
        if sample_rate == 0 || channel_count == 0 || channel_count > u16::MAX as usize {
            return Err(Error::ParameterError(format!(
                "invalid wav output specs: {channel_count} channels, {sample_rate} Hz"
            )));
        }
        let spec = WavSpec {
            channels: channel_count as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::create(file_path, spec)
            .map_err(|err| Error::OutputDeviceError(Box::new(err)))?;

        let max_frames = (duration.as_secs_f64() * sample_rate as f64) as u64;
        let stream = Arc::new(Mutex::new(WavStream {
            writer: Some(writer),
            channel_count,
            sample_rate,
            source: Box::new(EmptySource),
            volume: 1.0,
            buffer: vec![0.0; BUFFER_SIZE_FRAMES * channel_count],
            running: false,
            finished: false,
            playback_pos: 0,
            max_frames,
        }));

        thread::Builder::new().name("wav_output".to_string()).spawn({
            let stream = Arc::clone(&stream);
            move || {
                loop {
                    {
                        let mut stream = lock_stream(&stream);
                        if let Err(err) = stream.process() {
                            log::error!("failed to write wav output: {err}");
                            stream.finished = true;
                        }
                        if stream.finished {
                            stream.running = false;
                            break;
                        }
                    }
                    // avoid busy waiting
                    thread::sleep(Duration::from_millis(1));
                }
                lock_stream(&stream).finalize();
            }
        })?;

        let sink = WavSink { stream };
        Ok(Self { sink })
    }
}

impl OutputDevice for WavOutput {
    type Sink = WavSink;

    fn sink(&self) -> Self::Sink {
        self.sink.clone()
    }
}

// -------------------------------------------------------------------------------------------------

/// [`OutputSink`] of a [`WavOutput`].
#[derive(Clone)]
pub struct WavSink {
    stream: Arc<Mutex<WavStream>>,
}

impl WavSink {
    /// True when rendering stopped and the wav file got finalized.
    pub fn is_finished(&self) -> bool {
        let stream = self.lock();
        stream.finished && stream.writer.is_none()
    }

    /// Block the calling thread until the wav file got finalized or the given timeout elapsed.
    /// Returns true when the file is finished.
    pub fn wait_until_finished(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        while !self.is_finished() {
            if start.elapsed() >= timeout {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, WavStream> {
        lock_stream(&self.stream)
    }
}

impl OutputSink for WavSink {
    fn channel_count(&self) -> usize {
        self.lock().channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.lock().sample_rate
    }

    fn sample_position(&self) -> u64 {
        self.lock().playback_pos
    }

    fn volume(&self) -> f32 {
        self.lock().volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.lock().volume = volume;
    }

    fn is_running(&self) -> bool {
        self.lock().running
    }

    fn play(&mut self, source: Box<dyn Source>) -> Result<(), Error> {
        let mut stream = self.lock();
        check_source_specs(source.as_ref(), stream.channel_count, stream.sample_rate)?;
        stream.source = source;
        Ok(())
    }

    fn stop(&mut self) {
        self.lock().source = Box::new(EmptySource);
    }

    fn pause(&mut self) {
        self.lock().running = false;
    }

    fn resume(&mut self) {
        let mut stream = self.lock();
        if !stream.finished {
            stream.running = true;
        }
    }

    fn close(&mut self) {
        self.lock().finished = true;
    }
}

// -------------------------------------------------------------------------------------------------

fn lock_stream(stream: &Mutex<WavStream>) -> MutexGuard<'_, WavStream> {
    // a panicking source must not prevent finalizing the file
    stream
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct WavStream {
    writer: Option<WavWriter<BufWriter<File>>>,
    channel_count: usize,
    sample_rate: u32,
    source: Box<dyn Source>,
    volume: f32,
    buffer: Vec<f32>,
    running: bool,
    finished: bool,
    playback_pos: u64,
    max_frames: u64,
}

impl WavStream {
    fn process(&mut self) -> Result<(), Error> {
        if !self.running || self.finished {
            return Ok(());
        }
        let pos_in_frames = self.playback_pos / self.channel_count as u64;
        if pos_in_frames >= self.max_frames || self.source.is_exhausted() {
            self.finished = true;
            return Ok(());
        }
        let time = SourceTime {
            pos_in_frames,
            pos_instant: Instant::now(),
        };

        // Don't write past the max duration
        let frame_count = (self.max_frames - pos_in_frames).min(BUFFER_SIZE_FRAMES as u64);
        let buffer = &mut self.buffer[..frame_count as usize * self.channel_count];

        let written = self.source.write(buffer, &time);
        if written == 0 {
            self.finished = true;
            return Ok(());
        }
        scale_buffer(&mut buffer[..written], self.volume);

        if let Some(writer) = self.writer.as_mut() {
            for sample in &buffer[..written] {
                writer.write_sample(*sample)?;
            }
        }
        self.playback_pos += written as u64;
        Ok(())
    }

    fn finalize(&mut self) {
        self.finished = true;
        self.running = false;
        if let Some(writer) = self.writer.take() {
            match writer.finalize() {
                Ok(()) => log::debug!("finalized wav output after {} samples", self.playback_pos),
                Err(err) => log::error!("failed to finalize wav file: {err}"),
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineConfig, GrainData, GrainEngine, SourceAudio};

    #[test]
    fn render_grains() {
        let path = std::env::temp_dir().join("granulator_wav_output_test.wav");
        let output = WavOutput::open_with_specs(&path, 8000, 2, Duration::from_millis(500))
            .unwrap();
        let mut sink = output.sink();

        let engine = GrainEngine::new(2, 8000, EngineConfig::default()).unwrap();
        let handle = engine.handle();
        let source = SourceAudio::new(vec![0.5; 8000], 8000).unwrap();
        for index in 0..4 {
            let grain = GrainData::new(0.25, 50.0, 1.0, 1.0);
            handle.schedule_at(grain, &source, index * 1000).unwrap();
        }
        let mono_engine = GrainEngine::new(1, 8000, EngineConfig::default()).unwrap();
        assert!(sink.play(Box::new(mono_engine)).is_err());
        sink.play(Box::new(engine)).unwrap();
        assert!(!sink.is_running());
        sink.resume();
        assert!(sink.wait_until_finished(Duration::from_secs(10)));
        assert_eq!(sink.sample_position(), 4000 * 2);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 8000);
        let samples = reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(samples.len(), 4000 * 2);
        assert!(samples.iter().all(|s| s.abs() <= 0.5));
        // grains start at 0, 1000, 2000 and 3000 and last 400 frames
        assert!(samples[..800].iter().any(|s| *s > 0.0));
        assert!(samples[1000..2000].iter().all(|s| *s == 0.0));
        assert!(samples[3000 * 2..3400 * 2].iter().any(|s| *s > 0.0));
        assert!(samples[3400 * 2..].iter().all(|s| *s == 0.0));
        assert_eq!(handle.update().spawned_grains, 4);

        let _ = std::fs::remove_file(path);
    }
}
