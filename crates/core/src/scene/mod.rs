use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// One discrete stage of the greeting, in playback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scene {
    Intro,
    Balloons,
    CakeDrop,
    Candles,
    WishTime,
    CardReveal,
    CardOpen,
}

/// What moves a scene on to its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// The front end has to deliver an explicit user action.
    User,
    /// The scheduler advances after the scene's configured delay.
    Timer,
    /// No outgoing transition.
    Terminal,
}

impl Scene {
    pub const ALL: [Scene; 7] = [
        Scene::Intro,
        Scene::Balloons,
        Scene::CakeDrop,
        Scene::Candles,
        Scene::WishTime,
        Scene::CardReveal,
        Scene::CardOpen,
    ];

    /// The successor in the forward chain, `None` for the terminal scene.
    pub fn next(self) -> Option<Scene> {
        match self {
            Scene::Intro => Some(Scene::Balloons),
            Scene::Balloons => Some(Scene::CakeDrop),
            Scene::CakeDrop => Some(Scene::Candles),
            Scene::Candles => Some(Scene::WishTime),
            Scene::WishTime => Some(Scene::CardReveal),
            Scene::CardReveal => Some(Scene::CardOpen),
            Scene::CardOpen => None,
        }
    }

    /// What moves the sequence out of this scene.
    pub fn trigger(self) -> Trigger {
        match self {
            Scene::Intro | Scene::CardReveal => Trigger::User,
            Scene::Balloons | Scene::CakeDrop | Scene::Candles | Scene::WishTime => {
                Trigger::Timer
            }
            Scene::CardOpen => Trigger::Terminal,
        }
    }

    /// True for the last scene, which has no successor.
    pub fn is_terminal(self) -> bool {
        self.trigger() == Trigger::Terminal
    }

    /// Upper-case name, the same as the serialized form. Used by `Display`.
    pub fn name(self) -> &'static str {
        match self {
            Scene::Intro => "INTRO",
            Scene::Balloons => "BALLOONS",
            Scene::CakeDrop => "CAKE_DROP",
            Scene::Candles => "CANDLES",
            Scene::WishTime => "WISH_TIME",
            Scene::CardReveal => "CARD_REVEAL",
            Scene::CardOpen => "CARD_OPEN",
        }
    }
}

impl fmt::Display for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Holds the current scene and broadcasts every replacement to observers.
///
/// [`SceneSequencer::advance`] performs no legality check. Callers follow the
/// transition table exposed by [`Scene::next`] and [`Scene::trigger`].
#[derive(Debug)]
pub struct SceneSequencer {
    current: watch::Sender<Scene>,
}

impl SceneSequencer {
    /// Creates a sequencer mounted at [`Scene::Intro`].
    pub fn new() -> Self {
        let (current, _) = watch::channel(Scene::Intro);
        Self { current }
    }

    /// The scene currently shown.
    pub fn current(&self) -> Scene {
        *self.current.borrow()
    }

    /// Replaces the current scene with `next` and notifies observers.
    pub fn advance(&self, next: Scene) {
        let previous = self.current.send_replace(next);
        tracing::info!(from = %previous, to = %next, "scene advanced");
    }

    /// A receiver that observes every later [`SceneSequencer::advance`].
    pub fn subscribe(&self) -> watch::Receiver<Scene> {
        self.current.subscribe()
    }
}

impl Default for SceneSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_visits_every_scene_once() {
        let mut visited = vec![Scene::Intro];
        let mut scene = Scene::Intro;
        while let Some(next) = scene.next() {
            visited.push(next);
            scene = next;
        }
        assert_eq!(visited, Scene::ALL.to_vec());
    }

    #[test]
    fn only_card_open_is_terminal() {
        for scene in Scene::ALL {
            assert_eq!(scene.is_terminal(), scene.next().is_none(), "{scene}");
        }
    }

    #[test]
    fn user_driven_scenes_are_intro_and_card_reveal() {
        let user: Vec<_> = Scene::ALL
            .into_iter()
            .filter(|scene| scene.trigger() == Trigger::User)
            .collect();
        assert_eq!(user, vec![Scene::Intro, Scene::CardReveal]);
    }

    #[test]
    fn advance_notifies_observers() {
        let sequencer = SceneSequencer::new();
        let mut observer = sequencer.subscribe();
        assert_eq!(sequencer.current(), Scene::Intro);

        sequencer.advance(Scene::Balloons);

        assert!(observer.has_changed().unwrap());
        assert_eq!(*observer.borrow_and_update(), Scene::Balloons);
        assert_eq!(sequencer.current(), Scene::Balloons);
    }

    #[test]
    fn scene_names_serialize_in_screaming_case() {
        let json = serde_json::to_string(&Scene::CardReveal).unwrap();
        assert_eq!(json, "\"CARD_REVEAL\"");
    }
}
