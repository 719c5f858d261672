use std::{sync::Arc, time::Duration};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

use crate::{
    particles::{Burst, FireworksShow, ParticleEmitter},
    AppConfig, AudioEngine, EffectConfig, Scene, SceneTimings,
};

/// A timer-driven transition request. `from` is the scene that armed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    pub from: Scene,
    pub to: Scene,
}

/// Callback invoked when an auto-advance timer fires.
pub type AdvanceFn = Arc<dyn Fn(Advance) + Send + Sync>;

/// Effects a scene arms on entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectKind {
    /// Every tick independently plays a pop with the given probability.
    PopInterval { tick_ms: u64, probability: f64 },
    PopOnce,
    StartSong,
    Fireworks { window_ms: u64, period_ms: u64 },
    CardBurst { particles: u32 },
    /// Handled by the stage, which owns the wish cache.
    RequestWish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AutoAdvance {
    pub after_ms: u64,
    pub next: Scene,
}

impl AutoAdvance {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.after_ms)
    }
}

/// Everything the scheduler arms for one scene.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenePolicy {
    pub scene: Scene,
    pub effects: Vec<EffectKind>,
    pub auto_advance: Option<AutoAdvance>,
}

impl ScenePolicy {
    pub fn for_scene(scene: Scene, timings: &SceneTimings, effects: &EffectConfig) -> Self {
        let after = |after_ms: u64| {
            scene.next().map(|next| AutoAdvance { after_ms, next })
        };
        let fireworks = EffectKind::Fireworks {
            window_ms: effects.fireworks_window_ms,
            period_ms: effects.fireworks_period_ms,
        };

        let (kinds, auto_advance) = match scene {
            Scene::Intro | Scene::CardReveal => (Vec::new(), None),
            Scene::Balloons => (
                vec![EffectKind::PopInterval {
                    tick_ms: effects.pop_tick().as_millis() as u64,
                    probability: effects.pop_chance(),
                }],
                after(timings.balloons_ms),
            ),
            Scene::CakeDrop => (
                vec![EffectKind::PopOnce, EffectKind::StartSong],
                after(timings.cake_drop_ms),
            ),
            Scene::Candles => (Vec::new(), after(timings.candles_ms)),
            Scene::WishTime => (vec![fireworks], after(timings.wish_time_ms)),
            Scene::CardOpen => (
                vec![
                    EffectKind::CardBurst {
                        particles: effects.card_burst_particles,
                    },
                    fireworks,
                    EffectKind::RequestWish,
                ],
                None,
            ),
        };

        Self {
            scene,
            effects: kinds,
            auto_advance,
        }
    }

    pub fn requests_wish(&self) -> bool {
        self.effects.contains(&EffectKind::RequestWish)
    }
}

/// The policy of every scene, in playback order.
pub fn timeline(config: &AppConfig) -> Vec<ScenePolicy> {
    Scene::ALL
        .into_iter()
        .map(|scene| ScenePolicy::for_scene(scene, &config.timings, &config.effects))
        .collect()
}

/// Cleanup handle for the tasks armed by one scene. Dropping it aborts them.
#[derive(Debug)]
pub struct ArmedEffects {
    scene: Scene,
    tasks: Vec<JoinHandle<()>>,
}

impl ArmedEffects {
    fn new(scene: Scene) -> Self {
        Self {
            scene,
            tasks: Vec::new(),
        }
    }

    pub fn scene(&self) -> Scene {
        self.scene
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Drop for ArmedEffects {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        tracing::debug!(scene = %self.scene, tasks = self.tasks.len(), "armed effects cancelled");
    }
}

/// Arms and cancels the timers of the active scene.
///
/// At most one [`ArmedEffects`] set is alive. [`EffectScheduler::enter`]
/// releases the previous set before arming the next, so auto-advances and
/// sound triggers can never double up.
pub struct EffectScheduler {
    timings: SceneTimings,
    effects: EffectConfig,
    audio: Arc<AudioEngine>,
    particles: Arc<dyn ParticleEmitter>,
    on_advance: AdvanceFn,
    rng: StdRng,
    armed: Option<ArmedEffects>,
}

impl EffectScheduler {
    pub fn new(
        config: &AppConfig,
        audio: Arc<AudioEngine>,
        particles: Arc<dyn ParticleEmitter>,
        on_advance: AdvanceFn,
    ) -> Self {
        let rng = match config.effects.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            timings: config.timings.clone(),
            effects: config.effects.clone(),
            audio,
            particles,
            on_advance,
            rng,
            armed: None,
        }
    }

    /// Cancels the previous scene's effects, then arms `scene`'s policy.
    /// Must be called from inside a tokio runtime.
    pub fn enter(&mut self, scene: Scene) -> ScenePolicy {
        self.cancel_all();

        let policy = ScenePolicy::for_scene(scene, &self.timings, &self.effects);
        let mut armed = ArmedEffects::new(scene);

        for effect in &policy.effects {
            match effect {
                EffectKind::PopInterval { .. } => {
                    let task = pop_interval(
                        self.audio.clone(),
                        self.effects.pop_tick(),
                        self.effects.pop_chance(),
                        self.task_rng(),
                    );
                    armed.tasks.push(tokio::spawn(task));
                }
                EffectKind::PopOnce => {
                    if let Err(err) = self.audio.play_pop() {
                        tracing::warn!(error = %err, scene = %scene, "pop failed");
                    }
                }
                EffectKind::StartSong => {
                    if let Err(err) = self.audio.play_song() {
                        tracing::warn!(error = %err, "audio play failed");
                    }
                }
                EffectKind::Fireworks { .. } => {
                    let show = FireworksShow::from_config(&self.effects);
                    let task = fireworks(show, self.particles.clone(), self.task_rng());
                    armed.tasks.push(tokio::spawn(task));
                }
                EffectKind::CardBurst { particles } => {
                    if let Err(err) = self.particles.emit(&Burst::card_open(*particles)) {
                        tracing::warn!(error = %err, "card burst failed");
                    }
                }
                EffectKind::RequestWish => {}
            }
        }

        if let Some(auto) = policy.auto_advance {
            let on_advance = self.on_advance.clone();
            let advance = Advance {
                from: scene,
                to: auto.next,
            };
            armed.tasks.push(tokio::spawn(async move {
                tokio::time::sleep(auto.delay()).await;
                on_advance(advance);
            }));
            tracing::debug!(scene = %scene, delay_ms = auto.after_ms, next = %auto.next, "auto-advance armed");
        }

        self.armed = Some(armed);
        policy
    }

    /// Cancels whatever is armed. Safe to call repeatedly.
    pub fn cancel_all(&mut self) {
        self.armed.take();
    }

    /// Scene whose effects are currently armed.
    pub fn armed_scene(&self) -> Option<Scene> {
        self.armed.as_ref().map(ArmedEffects::scene)
    }

    fn task_rng(&mut self) -> StdRng {
        StdRng::seed_from_u64(self.rng.gen())
    }
}

impl std::fmt::Debug for EffectScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectScheduler")
            .field("armed", &self.armed)
            .finish()
    }
}

async fn pop_interval(audio: Arc<AudioEngine>, tick: Duration, probability: f64, mut rng: StdRng) {
    let mut ticker = interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if rng.gen_bool(probability) {
            if let Err(err) = audio.play_pop() {
                tracing::warn!(error = %err, "pop failed");
            }
        }
    }
}

async fn fireworks(show: FireworksShow, particles: Arc<dyn ParticleEmitter>, mut rng: StdRng) {
    let start = Instant::now();
    let mut ticker = interval_at(start + show.period, show.period);
    loop {
        ticker.tick().await;
        let Some(bursts) = show.bursts_at(start.elapsed(), &mut rng) else {
            break;
        };
        for burst in &bursts {
            if let Err(err) = particles.emit(burst) {
                tracing::warn!(error = %err, "firework burst failed");
            }
        }
    }
}
