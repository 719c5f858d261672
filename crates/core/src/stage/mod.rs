//! The single-owner event loop that plays one greeting session.
//!
//! [`Stage`] owns the sequencer, the scheduler and the card state. Timers,
//! the generation task and the front end only ever talk to it through
//! [`StageCommand`]s, so every transition is applied in order on one task.

use std::{ops::ControlFlow, sync::Arc};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    audio::AudioOutput,
    generation::WishService,
    particles::ParticleEmitter,
    render::{self, CardState, RenderDescriptor},
    timeline::{Advance, AdvanceFn},
    AppConfig, AudioEngine, EffectScheduler, GreetingConfig, Scene, SceneSequencer,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageCommand {
    /// User pressed start. Only honoured in [`Scene::Intro`].
    Start,
    /// User clicked the card. Only honoured in [`Scene::CardReveal`].
    OpenCard,
    AutoAdvance(Advance),
    WishReady(String),
    Unmount,
}

/// External side-effect sinks the stage drives.
#[derive(Clone)]
pub struct Collaborators {
    pub audio: Arc<dyn AudioOutput>,
    pub particles: Arc<dyn ParticleEmitter>,
    pub wishes: WishService,
}

pub struct Stage {
    sequencer: SceneSequencer,
    scheduler: EffectScheduler,
    audio: Arc<AudioEngine>,
    wishes: WishService,
    card: watch::Sender<CardState>,
    commands: mpsc::UnboundedReceiver<StageCommand>,
    sender: mpsc::UnboundedSender<StageCommand>,
}

impl Stage {
    /// Builds a stage mounted at [`Scene::Intro`] together with the handle
    /// the front end uses to drive it.
    pub fn new(config: &AppConfig, collaborators: Collaborators) -> (Self, StageHandle) {
        let (sender, commands) = mpsc::unbounded_channel();
        let audio = Arc::new(AudioEngine::new(
            &config.audio,
            collaborators.audio,
            config.effects.seed,
        ));

        let advance_tx = sender.clone();
        let on_advance: AdvanceFn = Arc::new(move |advance| {
            let _ = advance_tx.send(StageCommand::AutoAdvance(advance));
        });
        let scheduler = EffectScheduler::new(
            config,
            audio.clone(),
            collaborators.particles,
            on_advance,
        );

        let sequencer = SceneSequencer::new();
        let (card, card_rx) = watch::channel(CardState::Sealed);

        let handle = StageHandle {
            commands: sender.clone(),
            scene: sequencer.subscribe(),
            card: card_rx,
            audio: audio.clone(),
            greeting: config.greeting.clone(),
            sky_seed: config.effects.seed.unwrap_or_default(),
        };
        let stage = Self {
            sequencer,
            scheduler,
            audio,
            wishes: collaborators.wishes,
            card,
            commands,
            sender,
        };
        (stage, handle)
    }

    /// Spawns [`Stage::run`] on the current runtime.
    pub fn spawn(config: &AppConfig, collaborators: Collaborators) -> (StageHandle, JoinHandle<()>) {
        let (stage, handle) = Self::new(config, collaborators);
        (handle, tokio::spawn(stage.run()))
    }

    /// Processes commands until unmounted, then cancels everything armed.
    pub async fn run(mut self) {
        let initial = self.sequencer.current();
        self.scheduler.enter(initial);
        tracing::info!(scene = %initial, "stage mounted");

        while let Some(command) = self.commands.recv().await {
            if self.handle(command).is_break() {
                break;
            }
        }

        self.scheduler.cancel_all();
        tracing::info!(scene = %self.sequencer.current(), "stage unmounted");
    }

    fn handle(&mut self, command: StageCommand) -> ControlFlow<()> {
        let current = self.sequencer.current();
        match command {
            StageCommand::Start if current == Scene::Intro => {
                self.audio.enable();
                self.transition(Scene::Balloons);
            }
            StageCommand::OpenCard if current == Scene::CardReveal => {
                self.transition(Scene::CardOpen);
            }
            StageCommand::AutoAdvance(advance) if advance.from == current => {
                self.transition(advance.to);
            }
            StageCommand::WishReady(text) => {
                tracing::info!(chars = text.len(), "wish ready");
                self.card.send_replace(CardState::Ready(text));
            }
            StageCommand::Unmount => return ControlFlow::Break(()),
            ignored => {
                tracing::debug!(?ignored, scene = %current, "command ignored");
            }
        }
        ControlFlow::Continue(())
    }

    fn transition(&mut self, next: Scene) {
        self.scheduler.cancel_all();
        self.sequencer.advance(next);
        let policy = self.scheduler.enter(next);
        if policy.requests_wish() {
            self.request_wish();
        }
    }

    /// Issues the generation request unless a wish is cached or in flight.
    fn request_wish(&mut self) {
        if *self.card.borrow() != CardState::Sealed {
            return;
        }
        self.card.send_replace(CardState::Loading);

        let wishes = self.wishes.clone();
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let text = wishes.generate().await;
            if sender.send(StageCommand::WishReady(text)).is_err() {
                tracing::debug!("stage gone before wish arrived");
            }
        });
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("scene", &self.sequencer.current())
            .field("scheduler", &self.scheduler)
            .field("card", &*self.card.borrow())
            .finish()
    }
}

/// Front-end side of a running [`Stage`]. Dropping it unmounts the stage.
#[derive(Debug)]
pub struct StageHandle {
    commands: mpsc::UnboundedSender<StageCommand>,
    scene: watch::Receiver<Scene>,
    card: watch::Receiver<CardState>,
    audio: Arc<AudioEngine>,
    greeting: GreetingConfig,
    sky_seed: u64,
}

impl StageHandle {
    pub fn start(&self) {
        self.send(StageCommand::Start);
    }

    pub fn open_card(&self) {
        self.send(StageCommand::OpenCard);
    }

    pub fn unmount(&self) {
        self.send(StageCommand::Unmount);
    }

    pub fn scene(&self) -> Scene {
        *self.scene.borrow()
    }

    pub fn card(&self) -> CardState {
        self.card.borrow().clone()
    }

    pub fn subscribe_scene(&self) -> watch::Receiver<Scene> {
        self.scene.clone()
    }

    pub fn subscribe_card(&self) -> watch::Receiver<CardState> {
        self.card.clone()
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio.is_enabled()
    }

    /// Render descriptor for the current state.
    pub fn view(&self) -> RenderDescriptor {
        render::describe(
            self.scene(),
            &self.card.borrow(),
            &self.greeting,
            self.sky_seed,
        )
    }

    fn send(&self, command: StageCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!("stage already unmounted");
        }
    }
}

impl Drop for StageHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(StageCommand::Unmount);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::{
        audio::tests::RecordingOutput,
        generation::{tests::ScriptedGenerator, WishPrompt},
        particles::tests::RecordingEmitter,
        GreetingError, Result,
    };

    struct Fixture {
        config: AppConfig,
        collaborators: Collaborators,
        generator: Arc<ScriptedGenerator>,
        output: Arc<RecordingOutput>,
    }

    fn fixture(reply: fn() -> Result<String>) -> Fixture {
        let mut config = AppConfig::default();
        config.effects.seed = Some(5);
        config.effects.pop_probability = 1.0;

        let generator = Arc::new(ScriptedGenerator::with_delay(reply, Duration::from_secs(3)));
        let output = Arc::new(RecordingOutput::default());
        let collaborators = Collaborators {
            audio: output.clone(),
            particles: Arc::new(RecordingEmitter::default()),
            wishes: WishService::new(
                generator.clone(),
                WishPrompt::for_greeting(&config.greeting),
            ),
        };
        Fixture {
            config,
            collaborators,
            generator,
            output,
        }
    }

    async fn next_scene(rx: &mut watch::Receiver<Scene>) -> (Scene, Instant) {
        rx.changed().await.unwrap();
        let scene = *rx.borrow_and_update();
        (scene, Instant::now())
    }

    #[tokio::test(start_paused = true)]
    async fn plays_full_sequence_with_exact_timings() {
        let f = fixture(|| Ok("Happy birthday, legend!".to_string()));
        let (handle, task) = Stage::spawn(&f.config, f.collaborators.clone());
        let mut scenes = handle.subscribe_scene();
        assert_eq!(handle.scene(), Scene::Intro);
        assert!(!handle.audio_enabled());

        handle.start();
        let (scene, mut entered) = next_scene(&mut scenes).await;
        assert_eq!(scene, Scene::Balloons);
        assert!(handle.audio_enabled());

        for (expected, delay) in [
            (Scene::CakeDrop, 8_000),
            (Scene::Candles, 2_000),
            (Scene::WishTime, 2_500),
            (Scene::CardReveal, 4_500),
        ] {
            let (scene, at) = next_scene(&mut scenes).await;
            assert_eq!(scene, expected);
            assert_eq!(at - entered, Duration::from_millis(delay), "{expected}");
            entered = at;
        }

        // Nothing happens until the card is clicked.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(handle.scene(), Scene::CardReveal);
        assert_eq!(handle.card(), CardState::Sealed);

        handle.open_card();
        let (scene, _) = next_scene(&mut scenes).await;
        assert_eq!(scene, Scene::CardOpen);
        assert_eq!(handle.card(), CardState::Loading);

        let mut card = handle.subscribe_card();
        card.wait_for(|state| matches!(state, CardState::Ready(_)))
            .await
            .unwrap();
        assert_eq!(
            handle.card(),
            CardState::Ready("Happy birthday, legend!".to_string())
        );
        assert_eq!(f.generator.calls(), 1);
        assert_eq!(f.output.song_count(), 1);

        handle.unmount();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_generation_shows_fallback_and_clears_loading() {
        let f = fixture(|| Err(GreetingError::msg("503 from upstream")));
        let expected = f.collaborators.wishes.prompt().error_fallback.clone();
        let (mut stage, _handle) = Stage::new(&f.config, f.collaborators.clone());

        stage.transition(Scene::CardReveal);
        let _ = stage.handle(StageCommand::OpenCard);
        assert!(stage.card.borrow().is_loading());

        let command = stage.commands.recv().await.unwrap();
        assert_eq!(command, StageCommand::WishReady(expected.clone()));
        let _ = stage.handle(command);

        assert_eq!(stage.card.borrow().wish(), Some(expected.as_str()));
        assert!(!stage.card.borrow().is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn cached_wish_is_never_requested_again() {
        let f = fixture(|| Ok("once".to_string()));
        let (mut stage, _handle) = Stage::new(&f.config, f.collaborators.clone());

        stage.transition(Scene::CardOpen);
        stage.transition(Scene::CardOpen);
        let command = stage.commands.recv().await.unwrap();
        let _ = stage.handle(command);

        stage.transition(Scene::CardOpen);
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(f.generator.calls(), 1);
        assert_eq!(stage.card.borrow().wish(), Some("once"));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_and_out_of_place_commands_are_ignored() {
        let f = fixture(|| Ok("unused".to_string()));
        let (mut stage, _handle) = Stage::new(&f.config, f.collaborators.clone());

        let _ = stage.handle(StageCommand::OpenCard);
        assert_eq!(stage.sequencer.current(), Scene::Intro);

        let _ = stage.handle(StageCommand::Start);
        assert_eq!(stage.sequencer.current(), Scene::Balloons);

        let _ = stage.handle(StageCommand::Start);
        let _ = stage.handle(StageCommand::AutoAdvance(Advance {
            from: Scene::Candles,
            to: Scene::WishTime,
        }));
        assert_eq!(stage.sequencer.current(), Scene::Balloons);
        assert_eq!(stage.scheduler.armed_scene(), Some(Scene::Balloons));

        assert!(stage.handle(StageCommand::Unmount).is_break());
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_during_balloons_silences_pops() {
        let f = fixture(|| Ok("unused".to_string()));
        let (handle, task) = Stage::spawn(&f.config, f.collaborators.clone());

        handle.start();
        tokio::time::sleep(Duration::from_millis(1_200)).await;
        let pops = f.output.pop_count();
        assert_eq!(pops, 2);

        drop(handle);
        task.await.unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert_eq!(f.output.pop_count(), pops);
    }

    #[tokio::test(start_paused = true)]
    async fn wish_arriving_after_unmount_is_dropped() {
        let f = fixture(|| Ok("too late".to_string()));
        let (handle, task) = Stage::spawn(&f.config, f.collaborators.clone());
        let mut scenes = handle.subscribe_scene();
        let mut card = handle.subscribe_card();

        handle.start();
        scenes
            .wait_for(|scene| *scene == Scene::CardReveal)
            .await
            .unwrap();
        handle.open_card();
        card.wait_for(CardState::is_loading).await.unwrap();
        assert_eq!(f.generator.calls(), 1);

        // The backend is still sleeping when the stage goes away.
        handle.unmount();
        task.await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(*card.borrow(), CardState::Loading);
        assert!(card.has_changed().is_err());
        assert_eq!(f.generator.calls(), 1);
    }
}
