//! Confetti and fireworks descriptions.
//!
//! The types here only describe bursts. Drawing them is left to whatever
//! implements [`ParticleEmitter`].

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{EffectConfig, Result};

/// Blue, gold and white.
pub const PALETTE: [&str; 3] = ["#3b82f6", "#fbbf24", "#ffffff"];

/// Normalised launch point, `(0, 0)` is the top-left of the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    pub x: f32,
    pub y: f32,
}

/// One confetti burst.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Burst {
    pub particle_count: u32,
    pub spread: f32,
    pub start_velocity: f32,
    pub ticks: u32,
    pub origin: Origin,
    pub colors: Vec<String>,
}

impl Burst {
    /// The single burst fired when the card opens.
    pub fn card_open(particle_count: u32) -> Self {
        Self {
            particle_count,
            spread: 100.0,
            start_velocity: 45.0,
            ticks: 200,
            origin: Origin { x: 0.5, y: 0.7 },
            colors: palette(),
        }
    }

    fn firework(particle_count: u32, origin: Origin) -> Self {
        Self {
            particle_count,
            spread: 360.0,
            start_velocity: 30.0,
            ticks: 60,
            origin,
            colors: palette(),
        }
    }
}

fn palette() -> Vec<String> {
    PALETTE.iter().map(|c| c.to_string()).collect()
}

/// Anything that can put a burst on screen.
pub trait ParticleEmitter: Send + Sync {
    fn emit(&self, burst: &Burst) -> Result<()>;
}

/// Emitter that only logs each burst.
#[derive(Debug, Default)]
pub struct TracingEmitter;

impl ParticleEmitter for TracingEmitter {
    fn emit(&self, burst: &Burst) -> Result<()> {
        tracing::debug!(
            particles = burst.particle_count,
            x = burst.origin.x,
            y = burst.origin.y,
            "burst"
        );
        Ok(())
    }
}

/// A train of paired bursts whose size decays linearly to zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FireworksShow {
    pub window: Duration,
    pub period: Duration,
    pub peak_particles: f32,
}

impl FireworksShow {
    pub fn from_config(config: &EffectConfig) -> Self {
        Self {
            window: config.fireworks_window(),
            period: config.fireworks_period(),
            peak_particles: config.fireworks_peak_particles,
        }
    }

    /// The pair of bursts due `elapsed` after launch. One comes from the left
    /// zone and one from the right. Returns `None` once the window has closed.
    pub fn bursts_at<R: Rng + ?Sized>(&self, elapsed: Duration, rng: &mut R) -> Option<[Burst; 2]> {
        let remaining = self.window.checked_sub(elapsed)?;
        if remaining.is_zero() {
            return None;
        }

        let fraction = remaining.as_secs_f32() / self.window.as_secs_f32();
        let count = (self.peak_particles * fraction).round() as u32;

        let left = Origin {
            x: rng.gen_range(0.1..0.3),
            y: rng.gen::<f32>() - 0.2,
        };
        let right = Origin {
            x: rng.gen_range(0.7..0.9),
            y: rng.gen::<f32>() - 0.2,
        };
        Some([Burst::firework(count, left), Burst::firework(count, right)])
    }
}
