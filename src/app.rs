use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;

use crate::core::conductor::{Conductor, PlaybackReport};
use crate::core::sink::{BoxedSink, DeviceSink, WavSink};
use crate::core::song::{distinct_pitches, load_song};
use crate::core::tone::ToneSource;
use crate::settings::PlayerSettings;
use crate::utils::helpers::format_time;

/// Where the rendered song goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Device,
    Wav(PathBuf),
}

/// One invocation of the player
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub song: PathBuf,
    pub config: Option<PathBuf>,
    pub output: Output,
}

/// Load settings and song, then play it to the requested output
///
/// The song is fully parsed before any tone is built or any device opened.
pub fn run(request: &PlayRequest) -> Result<PlaybackReport> {
    let settings = PlayerSettings::load(request.config.as_deref())?;
    let song = load_song(&request.song)
        .with_context(|| format!("Failed to load song {}", request.song.display()))?;
    info!("Loaded {} notes from {}", song.len(), request.song.display());

    let tones = ToneSource::for_pitches(
        settings.sample_rate,
        settings.measure_length_ms,
        settings.amplitude,
        distinct_pitches(&song),
    );
    info!(
        "Prepared {} tones ({} KiB)",
        tones.pitch_count(),
        tones.memory_footprint() / 1024
    );

    let sink: BoxedSink = match &request.output {
        Output::Device => Box::new(DeviceSink::new(settings.sample_rate, settings.device_buffer_ms)),
        Output::Wav(path) => Box::new(WavSink::new(path, settings.sample_rate)),
    };

    let mut conductor = Conductor::new(tones, settings.render_settings());
    let report = conductor.play_song(&song, sink).context("Playback failed")?;

    let seconds = report.samples_written as f32 / settings.sample_rate as f32;
    info!(
        "Played {} notes with {} workers ({})",
        report.notes_played,
        report.workers_spawned,
        format_time(seconds)
    );
    Ok(report)
}
