use std::{
    f32::consts::TAU,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, OnceLock,
    },
    time::Duration,
};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{AudioConfig, GreetingError, Result};

const POP_DURATION: Duration = Duration::from_millis(100);
const POP_END_HZ: f32 = 80.0;
const POP_START_GAIN: f32 = 0.1;
const POP_END_GAIN: f32 = 0.01;

static AUDIO_CONTEXT: OnceLock<AudioContext> = OnceLock::new();

/// Process-wide audio context, created on the first user gesture and kept
/// until the process exits.
#[derive(Debug)]
pub struct AudioContext {
    sample_rate: u32,
}

impl AudioContext {
    /// Returns the shared context, creating it with `sample_rate` if this is
    /// the first call. Later calls keep the original rate.
    pub fn get_or_init(sample_rate: u32) -> &'static AudioContext {
        AUDIO_CONTEXT.get_or_init(|| {
            tracing::debug!(sample_rate, "audio context created");
            AudioContext {
                sample_rate: sample_rate.max(1),
            }
        })
    }

    pub fn get() -> Option<&'static AudioContext> {
        AUDIO_CONTEXT.get()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// A short synthesized "pop": a decaying sine sweep rendered to PCM.
#[derive(Debug, Clone)]
pub struct PopClip {
    pub start_hz: f32,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl PopClip {
    /// Renders a 100 ms sine whose pitch and gain both decay exponentially,
    /// pitch from `start_hz` down to 80 Hz and gain from 0.1 to 0.01.
    pub fn synthesize(start_hz: f32, sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1);
        let len = (POP_DURATION.as_secs_f32() * sample_rate as f32).round() as usize;
        let span = POP_DURATION.as_secs_f32();
        let mut phase = 0.0_f32;
        let mut samples = Vec::with_capacity(len);

        for i in 0..len {
            let progress = (i as f32 / sample_rate as f32) / span;
            let freq = start_hz * (POP_END_HZ / start_hz).powf(progress);
            let gain = POP_START_GAIN * (POP_END_GAIN / POP_START_GAIN).powf(progress);
            samples.push(phase.sin() * gain);
            phase = (phase + TAU * freq / sample_rate as f32) % TAU;
        }

        Self {
            start_hz,
            sample_rate,
            samples,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f32(self.samples.len() as f32 / self.sample_rate as f32)
    }
}

/// Looping background track started when the cake appears.
#[derive(Debug, Clone, PartialEq)]
pub struct SongTrack {
    pub url: String,
    pub volume: f32,
    pub looping: bool,
}

/// Sink for synthesized clips and the background song.
pub trait AudioOutput: Send + Sync {
    fn play_clip(&self, clip: &PopClip) -> Result<()>;
    fn start_song(&self, song: &SongTrack) -> Result<()>;
}

/// Output that only reports what would be played.
#[derive(Debug, Default)]
pub struct TracingOutput;

impl AudioOutput for TracingOutput {
    fn play_clip(&self, clip: &PopClip) -> Result<()> {
        tracing::info!(
            start_hz = clip.start_hz,
            samples = clip.samples.len(),
            "pop"
        );
        Ok(())
    }

    fn start_song(&self, song: &SongTrack) -> Result<()> {
        tracing::info!(url = %song.url, volume = song.volume, looping = song.looping, "song started");
        Ok(())
    }
}

/// Session audio façade.
///
/// Nothing plays until [`AudioEngine::enable`] has been called, which happens
/// on the start gesture. The flag is never cleared afterwards.
pub struct AudioEngine {
    output: Arc<dyn AudioOutput>,
    sample_rate: u32,
    song: SongTrack,
    enabled: AtomicBool,
    song_playing: AtomicBool,
    rng: Mutex<StdRng>,
}

impl AudioEngine {
    pub fn new(config: &AudioConfig, output: Arc<dyn AudioOutput>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            output,
            sample_rate: config.sample_rate,
            song: SongTrack {
                url: config.song_url.clone(),
                volume: config.song_volume,
                looping: true,
            },
            enabled: AtomicBool::new(false),
            song_playing: AtomicBool::new(false),
            rng: Mutex::new(rng),
        }
    }

    /// Enables sound for the rest of the session and makes sure the shared
    /// audio context exists.
    pub fn enable(&self) {
        AudioContext::get_or_init(self.sample_rate);
        if !self.enabled.swap(true, Ordering::SeqCst) {
            tracing::debug!("audio enabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_song_playing(&self) -> bool {
        self.song_playing.load(Ordering::SeqCst)
    }

    /// Plays one pop with a random starting pitch in `[300, 450)` Hz.
    pub fn play_pop(&self) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let Some(context) = AudioContext::get() else {
            return Ok(());
        };

        let start_hz = 300.0 + self.lock_rng()?.gen::<f32>() * 150.0;
        let clip = PopClip::synthesize(start_hz, context.sample_rate());
        self.output.play_clip(&clip)
    }

    /// Starts the background song unless it is already playing.
    pub fn play_song(&self) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        if self.song_playing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(err) = self.output.start_song(&self.song) {
            self.song_playing.store(false, Ordering::SeqCst);
            return Err(err);
        }
        Ok(())
    }

    fn lock_rng(&self) -> Result<MutexGuard<'_, StdRng>> {
        self.rng
            .lock()
            .map_err(|_| GreetingError::msg("audio rng has been poisoned"))
    }
}

impl std::fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEngine")
            .field("enabled", &self.is_enabled())
            .field("song_playing", &self.is_song_playing())
            .finish()
    }
}
