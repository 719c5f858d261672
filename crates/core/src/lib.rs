//! Core library for the animated birthday greeting.
//!
//! A greeting is a fixed chain of scenes. The [`SceneSequencer`] holds the
//! current one, the [`EffectScheduler`] arms each scene's timers and
//! decorative effects, and the [`Stage`] ties both to the user actions and the
//! wish generation request. Rendering is a pure mapping in [`render`].

pub mod audio;
pub mod config;
pub mod error;
pub mod generation;
pub mod particles;
pub mod render;
pub mod scene;
pub mod stage;
pub mod timeline;

pub use audio::{AudioContext, AudioEngine, AudioOutput, PopClip, SongTrack, TracingOutput};
pub use config::{AppConfig, AudioConfig, EffectConfig, GenerationConfig, GreetingConfig, SceneTimings};
pub use error::{GreetingError, Result};
pub use generation::{GeminiClient, TextGenerator, WishPrompt, WishService};
pub use particles::{Burst, FireworksShow, ParticleEmitter, TracingEmitter};
pub use render::{CardState, FaultView, RenderDescriptor};
pub use scene::{Scene, SceneSequencer, Trigger};
pub use stage::{Collaborators, Stage, StageCommand, StageHandle};
pub use timeline::{timeline, Advance, ArmedEffects, EffectKind, EffectScheduler, ScenePolicy};
