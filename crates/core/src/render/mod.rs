//! Pure mapping from the sequencing state to what should be on screen.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{GreetingConfig, GreetingError, Scene};

const DECORATIVE_BALLOONS: usize = 20;
const CANDLES: u8 = 5;
const BALLOON_COLORS: [&str; 6] = [
    "#3b82f6", "#60a5fa", "#f59e0b", "#10b981", "#6366f1", "#94a3b8",
];

/// What the card shows, owned by the stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "text", rename_all = "snake_case")]
pub enum CardState {
    /// Not opened yet.
    #[default]
    Sealed,
    /// Waiting for the generation request.
    Loading,
    /// Wish text cached for the rest of the session.
    Ready(String),
}

impl CardState {
    pub fn wish(&self) -> Option<&str> {
        match self {
            CardState::Ready(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, CardState::Loading)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LetterBalloon {
    pub letter: char,
    pub delay_secs: f32,
    pub x_offset_vw: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Balloon {
    pub x_vw: f32,
    pub delay_secs: f32,
    pub color: &'static str,
    pub scale: f32,
    pub rise_secs: f32,
    pub sway: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CakePhase {
    Dropping,
    CandlesLit,
    Wish,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum CardMessage {
    ClickHint(&'static str),
    Loading(&'static str),
    Wish(String),
}

/// Everything a front end needs to draw one scene.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum RenderDescriptor {
    Intro {
        title: String,
        tagline: &'static str,
        start_label: &'static str,
        sound_hint: &'static str,
    },
    Balloons {
        letters: Vec<LetterBalloon>,
        background: Vec<Balloon>,
    },
    Cake {
        phase: CakePhase,
        candles: u8,
        /// Seconds after the scene starts at which candle `i` lights.
        light_delays: Vec<f32>,
        overlay: Option<&'static str>,
    },
    Card {
        open: bool,
        cover: String,
        heading: String,
        message: CardMessage,
        signature: String,
    },
}

/// Maps the current scene and card state to a render descriptor.
///
/// `sky_seed` picks the background balloons, so every frame of one session
/// shows the same sky.
pub fn describe(
    scene: Scene,
    card: &CardState,
    greeting: &GreetingConfig,
    sky_seed: u64,
) -> RenderDescriptor {
    match scene {
        Scene::Intro => RenderDescriptor::Intro {
            title: format!("For {}", greeting.recipient),
            tagline: "Something wonderful awaits...",
            start_label: "Start Experience",
            sound_hint: "Sound Effects Included",
        },
        Scene::Balloons => RenderDescriptor::Balloons {
            letters: letter_balloons(&greeting.recipient),
            background: decorative_balloons(sky_seed),
        },
        Scene::CakeDrop => cake(CakePhase::Dropping),
        Scene::Candles => cake(CakePhase::CandlesLit),
        Scene::WishTime => cake(CakePhase::Wish),
        Scene::CardReveal | Scene::CardOpen => {
            let open = scene == Scene::CardOpen;
            let message = match (open, card) {
                (false, _) => CardMessage::ClickHint("Click Me!"),
                (true, CardState::Ready(text)) => CardMessage::Wish(text.clone()),
                (true, _) => CardMessage::Loading("Writing something epic..."),
            };
            RenderDescriptor::Card {
                open,
                cover: format!("To {}", greeting.recipient),
                heading: format!("HAPPY BIRTHDAY {}!", greeting.recipient.to_uppercase()),
                message,
                signature: format!("Your friend, {}", greeting.sender),
            }
        }
    }
}

fn cake(phase: CakePhase) -> RenderDescriptor {
    let lit = phase != CakePhase::Dropping;
    RenderDescriptor::Cake {
        phase,
        candles: CANDLES,
        light_delays: if lit {
            (0..CANDLES).map(|i| f32::from(i) * 0.2 + 0.5).collect()
        } else {
            Vec::new()
        },
        overlay: (phase == CakePhase::Wish).then_some("Make a Wish!"),
    }
}

/// One balloon per letter of `name`, staggered and centred on the viewport.
pub fn letter_balloons(name: &str) -> Vec<LetterBalloon> {
    let letters: Vec<char> = name
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect();
    let centre = letters.len().saturating_sub(1) as f32 / 2.0;

    letters
        .into_iter()
        .enumerate()
        .map(|(i, letter)| LetterBalloon {
            letter,
            delay_secs: 2.0 + i as f32 * 0.3,
            x_offset_vw: (i as f32 - centre) * 12.0,
        })
        .collect()
}

/// The background balloons floating behind the name. Same seed, same sky.
pub fn decorative_balloons(seed: u64) -> Vec<Balloon> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..DECORATIVE_BALLOONS)
        .map(|_| Balloon {
            x_vw: rng.gen_range(0.0..100.0),
            delay_secs: rng.gen_range(0.0..2.0),
            color: BALLOON_COLORS[rng.gen_range(0..BALLOON_COLORS.len())],
            scale: rng.gen_range(0.6..1.0),
            rise_secs: rng.gen_range(7.0..12.0),
            sway: rng.gen_range(-15.0..15.0),
        })
        .collect()
}

/// Full-screen fallback shown when a frame cannot be drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaultView {
    pub title: &'static str,
    pub detail: &'static str,
    pub error: String,
    pub action: &'static str,
}

impl FaultView {
    pub fn from_error(err: &GreetingError) -> Self {
        Self {
            title: "Oops! Something went wrong.",
            detail: "The app encountered an error while rendering.",
            error: err.to_string(),
            action: "Reload App",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greeting() -> GreetingConfig {
        GreetingConfig::default()
    }

    #[test]
    fn every_scene_has_a_view() {
        for scene in Scene::ALL {
            let view = describe(scene, &CardState::Sealed, &greeting(), 0);
            let expected_cake = matches!(scene, Scene::CakeDrop | Scene::Candles | Scene::WishTime);
            assert_eq!(matches!(view, RenderDescriptor::Cake { .. }), expected_cake, "{scene}");
        }
    }

    #[test]
    fn name_balloons_are_centred_and_staggered() {
        let letters = letter_balloons("Tosin");
        let rendered: String = letters.iter().map(|b| b.letter).collect();
        assert_eq!(rendered, "TOSIN");

        let offsets: Vec<f32> = letters.iter().map(|b| b.x_offset_vw).collect();
        assert_eq!(offsets, vec![-24.0, -12.0, 0.0, 12.0, 24.0]);
        assert!((letters[4].delay_secs - 3.2).abs() < 1e-5);
    }

    #[test]
    fn wish_overlay_only_in_wish_time() {
        let overlay = |scene| match describe(scene, &CardState::Sealed, &greeting(), 0) {
            RenderDescriptor::Cake { overlay, .. } => overlay,
            _ => None,
        };
        assert_eq!(overlay(Scene::CakeDrop), None);
        assert_eq!(overlay(Scene::Candles), None);
        assert_eq!(overlay(Scene::WishTime), Some("Make a Wish!"));
    }

    #[test]
    fn open_card_shows_loading_until_ready() {
        let message = |card: &CardState| match describe(Scene::CardOpen, card, &greeting(), 0) {
            RenderDescriptor::Card { message, .. } => message,
            other => panic!("unexpected view {other:?}"),
        };

        assert!(matches!(message(&CardState::Loading), CardMessage::Loading(_)));
        assert_eq!(
            message(&CardState::Ready("hi".to_string())),
            CardMessage::Wish("hi".to_string())
        );
    }

    #[test]
    fn closed_card_invites_a_click() {
        match describe(Scene::CardReveal, &CardState::Sealed, &greeting(), 0) {
            RenderDescriptor::Card { open, message, cover, .. } => {
                assert!(!open);
                assert_eq!(cover, "To Tosin");
                assert_eq!(message, CardMessage::ClickHint("Click Me!"));
            }
            other => panic!("unexpected view {other:?}"),
        }
    }

    #[test]
    fn balloons_view_carries_the_seeded_sky() {
        match describe(Scene::Balloons, &CardState::Sealed, &greeting(), 9) {
            RenderDescriptor::Balloons { letters, background } => {
                assert_eq!(letters.len(), 5);
                assert_eq!(background.len(), DECORATIVE_BALLOONS);
                assert_eq!(background, decorative_balloons(9));
            }
            other => panic!("unexpected view {other:?}"),
        }
    }

    #[test]
    fn decorative_balloons_are_reproducible() {
        let a = decorative_balloons(9);
        assert_eq!(a.len(), 20);
        assert_eq!(a, decorative_balloons(9));
        assert!(a.iter().all(|b| (0.6..1.0).contains(&b.scale)));
    }

    #[test]
    fn fault_view_carries_error_text() {
        let view = FaultView::from_error(&GreetingError::Render("terminal closed".into()));
        assert_eq!(view.action, "Reload App");
        assert!(view.error.contains("terminal closed"));
    }
}
