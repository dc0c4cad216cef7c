//! A granular cloud, played on the default audio device or rendered into a wav file.

use std::{f32::consts::PI, thread, time::Duration};

use granulator::{
    EngineConfig, Error, GrainEmitter, GrainPlayer, GrainPlayheadMode, GrainWindowMode,
    GranularParameters, OutputDevice, OutputSink, SourceAudio, WavOutput,
};

// -------------------------------------------------------------------------------------------------

// Common demo code
#[path = "./common/arguments.rs"]
mod arguments;

// -------------------------------------------------------------------------------------------------

#[cfg(all(debug_assertions, feature = "assert-allocs"))]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

// -------------------------------------------------------------------------------------------------

// Granular parameter consts (tweak as needed!)

const GRAIN_WINDOW: GrainWindowMode = GrainWindowMode::Hann;
const GRAIN_SIZE: f32 = 80.0; // 1ms - 1000ms
const GRAIN_DENSITY: f32 = 40.0; // 0.1hz - 1000hz
const GRAIN_VARIATION: f32 = 0.25; // 0.0 = no variation, 1.0 = full variation
const GRAIN_SPRAY: f32 = 0.2; // 0.0 = no randomness, 1.0 = full random
const GRAIN_PITCH: f32 = 1.0;
const GRAIN_VOLUME: f32 = 0.3;
const GRAIN_PLAYHEAD_MODE: GrainPlayheadMode = GrainPlayheadMode::PlayThrough;
const GRAIN_PLAYHEAD_SPEED: f32 = 0.5; // speed for PlayThrough mode (0.001 - 4.0)

/// How far ahead of the engine's clock grains get scheduled.
const LOOKAHEAD: Duration = Duration::from_millis(100);

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), Error> {
    // Parse optional arguments
    let args = arguments::parse();
    let duration = Duration::from_secs(args.duration.unwrap_or(10));

    let source = match &args.source_path {
        Some(path) => SourceAudio::from_wav_file(path)?,
        None => synthesized_chord(44100)?,
    };

    let mut parameters = GranularParameters::new();
    parameters.size = GRAIN_SIZE;
    parameters.density = GRAIN_DENSITY;
    parameters.variation = GRAIN_VARIATION;
    parameters.spray = GRAIN_SPRAY;
    parameters.pitch = GRAIN_PITCH;
    parameters.volume = GRAIN_VOLUME;
    parameters.playhead_mode = GRAIN_PLAYHEAD_MODE;
    parameters.playhead_speed = GRAIN_PLAYHEAD_SPEED;

    let config = EngineConfig::default().window_mode(GRAIN_WINDOW);

    if let Some(output_path) = &args.output_path {
        // Render offline: schedule the whole cloud upfront, then let the output run
        let output = WavOutput::open_with_specs(output_path, 44100, 2, duration)?;
        let sink = output.sink();
        let config = config.pending_capacity(65536).message_queue_size(65536);
        let mut player = GrainPlayer::new(output.sink(), config)?;
        player.stop();
        let mut emitter = GrainEmitter::new(parameters, &source, player.sample_rate())?;
        let grain_count = player.play_emitter(&mut emitter, &source, duration);
        println!("Rendering {grain_count} grains into '{}'...", output_path.display());
        player.start();
        if !sink.wait_until_finished(duration * 10) {
            log::warn!("timeout while rendering the wav file");
        }
        player.update();
    } else {
        let player = GrainPlayer::open_default(config)?;
        let emitter = GrainEmitter::new(parameters, &source, player.sample_rate())?;
        println!("Playing grains for {} seconds...", duration.as_secs());
        play_realtime(player, emitter, &source, duration);
    }
    Ok(())
}

/// Keep the grain cloud's schedule ahead of the engine's clock until the duration elapsed.
fn play_realtime<S: OutputSink>(
    player: GrainPlayer<S>,
    mut emitter: GrainEmitter,
    source: &SourceAudio,
    duration: Duration,
) {
    let sample_rate = player.sample_rate() as u64;
    let lookahead_frames = LOOKAHEAD.as_millis() as u64 * sample_rate / 1000;
    let end_time = player.current_time() + duration.as_secs() * sample_rate;
    while player.current_time() < end_time {
        let target_time = player.current_time() + lookahead_frames;
        if emitter.current_time() < target_time {
            let frame_count = target_time - emitter.current_time().max(player.current_time());
            player
                .handle()
                .schedule_emitter(&mut emitter, source, frame_count as usize);
        }
        let statistics = player.update();
        log::debug!(
            "{} active voices, {} pending grains",
            statistics.active_voices,
            statistics.pending_grains
        );
        thread::sleep(Duration::from_millis(20));
    }
    player.close();
}

/// A few seconds of a slowly beating A minor chord.
fn synthesized_chord(sample_rate: u32) -> Result<SourceAudio, Error> {
    let frequencies = [220.0, 261.63, 329.63, 440.0];
    let samples = (0..sample_rate as usize * 4)
        .map(|index| {
            let time = index as f32 / sample_rate as f32;
            let sum = frequencies
                .iter()
                .map(|frequency| (2.0 * PI * frequency * time).sin())
                .sum::<f32>();
            let beating = 0.75 + 0.25 * (2.0 * PI * 0.5 * time).sin();
            sum * beating / frequencies.len() as f32
        })
        .collect::<Vec<_>>();
    SourceAudio::new(samples, sample_rate)
}
