//! Render state machine.
//!
//! Pure transitions only: [`RenderState::apply`] consumes an event and
//! returns the window passes to emit, in order. The async scheduler
//! turns those passes into frame writes.
//!
//! ```text
//!            MessageArrived                 RollTick
//!  Idle ─────────────────────► Intro ─────────────────► Loop ──┐
//!                                ▲                        ▲     │ RollTick
//!                                │ MessageArrived         └─────┘
//!                                └──────── (from any state)
//! ```

use std::ops::Range;

use crate::message::ScrollMessage;

/// Sub-phase of a displayed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPhase {
    /// The one-time lead-in has been shown; the body has not.
    Intro,
    /// The body has been shown at least once.
    Loop,
}

/// Inputs to the state machine.
#[derive(Debug)]
pub enum RenderEvent {
    /// A new message replaces whatever is on screen.
    MessageArrived(ScrollMessage),
    /// Continue rolling the current message.
    RollTick,
}

/// The scheduler's view of what is on screen.
#[derive(Debug, Default)]
pub enum RenderState {
    /// Nothing received yet.
    #[default]
    Idle,
    /// A message owns the display.
    Displaying {
        message: ScrollMessage,
        phase: DisplayPhase,
    },
}

impl std::fmt::Display for RenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Displaying {
                phase: DisplayPhase::Intro,
                ..
            } => write!(f, "Displaying(Intro)"),
            Self::Displaying {
                phase: DisplayPhase::Loop,
                ..
            } => write!(f, "Displaying(Loop)"),
        }
    }
}

impl RenderState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// The message currently on screen.
    pub fn message(&self) -> Option<&ScrollMessage> {
        match self {
            Self::Displaying { message, .. } => Some(message),
            Self::Idle => None,
        }
    }

    pub fn phase(&self) -> Option<DisplayPhase> {
        match self {
            Self::Displaying { phase, .. } => Some(*phase),
            Self::Idle => None,
        }
    }

    /// Whether rolling the current message would emit any frame.
    pub fn has_body(&self) -> bool {
        self.message()
            .is_some_and(|m| m.body().iter().any(|pass| !pass.is_empty()))
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Apply `event` and return the window passes it produces.
    ///
    /// A new message always restarts at its intro. A tick while idle
    /// produces nothing.
    pub fn apply(&mut self, event: RenderEvent) -> Vec<Range<usize>> {
        match event {
            RenderEvent::MessageArrived(message) => {
                let intro = message.intro();
                *self = Self::Displaying {
                    message,
                    phase: DisplayPhase::Intro,
                };
                vec![intro]
            }
            RenderEvent::RollTick => match self {
                Self::Idle => Vec::new(),
                Self::Displaying { message, phase } => {
                    *phase = DisplayPhase::Loop;
                    message.body().to_vec()
                }
            },
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;
    use crate::message::{BitmapMessage, DisplayGeometry};

    fn message(columns: usize, preamble: usize, checkpoint: usize) -> ScrollMessage {
        let raw = BitmapMessage {
            matrix: Matrix::new(8, columns, vec![0; 8 * columns]),
            preamble,
            checkpoint,
        };
        ScrollMessage::prepare(raw, DisplayGeometry::new(8, 5)).unwrap()
    }

    #[test]
    fn first_message_plays_intro() {
        let mut state = RenderState::default();
        assert!(state.is_idle());

        let passes = state.apply(RenderEvent::MessageArrived(message(40, 0, 10)));
        assert_eq!(passes, vec![0..10]);
        assert_eq!(state.phase(), Some(DisplayPhase::Intro));
    }

    #[test]
    fn tick_rolls_body() {
        let mut state = RenderState::default();
        state.apply(RenderEvent::MessageArrived(message(40, 2, 10)));

        for _ in 0..3 {
            let passes = state.apply(RenderEvent::RollTick);
            assert_eq!(passes, vec![10..35, 2..10]);
            assert_eq!(state.phase(), Some(DisplayPhase::Loop));
        }
    }

    #[test]
    fn new_message_restarts_intro() {
        let mut state = RenderState::default();
        state.apply(RenderEvent::MessageArrived(message(40, 0, 10)));
        state.apply(RenderEvent::RollTick);

        let passes = state.apply(RenderEvent::MessageArrived(message(20, 0, 4)));
        assert_eq!(passes, vec![0..4]);
        assert_eq!(state.phase(), Some(DisplayPhase::Intro));
        assert_eq!(state.message().unwrap().width(), 15);
    }

    #[test]
    fn tick_while_idle_is_ignored() {
        let mut state = RenderState::Idle;
        assert!(state.apply(RenderEvent::RollTick).is_empty());
        assert!(state.is_idle());
    }

    #[test]
    fn static_message_has_no_body() {
        let mut state = RenderState::default();
        state.apply(RenderEvent::MessageArrived(message(5, 0, 0)));
        assert!(!state.has_body());

        state.apply(RenderEvent::MessageArrived(message(6, 0, 0)));
        assert!(state.has_body());
    }

    #[test]
    fn display_format() {
        let mut state = RenderState::Idle;
        assert_eq!(state.to_string(), "Idle");
        state.apply(RenderEvent::MessageArrived(message(40, 0, 10)));
        assert_eq!(state.to_string(), "Displaying(Intro)");
        state.apply(RenderEvent::RollTick);
        assert_eq!(state.to_string(), "Displaying(Loop)");
    }
}
