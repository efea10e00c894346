//! Card stack interaction controller.
//!
//! A full-screen viewer over a list of posts fixed when the stack opens.
//! Horizontal swipes move between cards, wrapping at both ends, and each
//! card can be flipped to show its comments. Closing is terminal.

use std::collections::HashSet;

use geofeed_common::config::CardStackConfig;
use geofeed_common::{AppError, AppResult};
use geofeed_db::entities::post;

use crate::services::feed::FeedRow;

/// Something that can be shown as a card.
pub trait StackCard {
    /// Stable id used to track the card's flip state.
    fn card_id(&self) -> &str;
}

impl StackCard for post::Model {
    fn card_id(&self) -> &str {
        &self.id
    }
}

impl StackCard for FeedRow {
    fn card_id(&self) -> &str {
        &self.post.id
    }
}

/// Result of releasing a drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeOutcome {
    /// The drag went past the threshold and focus moved.
    Advanced { from: usize, to: usize },
    /// The drag was too short; focus stays put.
    SnappedBack,
}

#[derive(Debug, Clone)]
pub struct CardStack<T> {
    cards: Vec<T>,
    index: usize,
    flipped: HashSet<String>,
    drag_offset: f32,
    swipe_threshold: f32,
    closed: bool,
}

impl<T: StackCard> CardStack<T> {
    /// Open a stack at `initial_index`, clamped into range.
    ///
    /// A stack opened over no cards starts closed.
    #[must_use]
    pub fn open(cards: Vec<T>, initial_index: usize, config: &CardStackConfig) -> Self {
        Self::with_threshold(cards, initial_index, config.swipe_threshold)
    }

    #[must_use]
    pub fn with_threshold(cards: Vec<T>, initial_index: usize, swipe_threshold: f32) -> Self {
        let closed = cards.is_empty();
        let index = initial_index.min(cards.len().saturating_sub(1));
        Self {
            cards,
            index,
            flipped: HashSet::new(),
            drag_offset: 0.0,
            swipe_threshold: swipe_threshold.abs(),
            closed,
        }
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        !self.closed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    #[must_use]
    pub fn cards(&self) -> &[T] {
        &self.cards
    }

    /// Index of the focused card, `None` once closed.
    #[must_use]
    pub const fn current_index(&self) -> Option<usize> {
        if self.closed { None } else { Some(self.index) }
    }

    #[must_use]
    pub fn current(&self) -> Option<&T> {
        if self.closed {
            return None;
        }
        self.cards.get(self.index)
    }

    #[must_use]
    pub const fn drag_offset(&self) -> f32 {
        self.drag_offset
    }

    #[must_use]
    pub fn is_flipped(&self, card_id: &str) -> bool {
        self.flipped.contains(card_id)
    }

    fn ensure_open(&self) -> AppResult<()> {
        if self.closed {
            return Err(AppError::BadRequest("Card stack is closed".to_string()));
        }
        Ok(())
    }

    fn focused_id(&self) -> AppResult<String> {
        self.current()
            .map(|card| card.card_id().to_string())
            .ok_or_else(|| AppError::BadRequest("Card stack is closed".to_string()))
    }

    fn step(&mut self, forward: bool) -> SwipeOutcome {
        let from = self.index;
        let len = self.cards.len();
        self.index = if forward {
            (from + 1) % len
        } else {
            (from + len - 1) % len
        };
        SwipeOutcome::Advanced {
            from,
            to: self.index,
        }
    }

    /// Move the in-flight drag by `dx` points (positive is rightwards).
    pub fn drag_by(&mut self, dx: f32) -> AppResult<()> {
        self.ensure_open()?;
        self.drag_offset += dx;
        Ok(())
    }

    /// Finish the drag. Right goes to the previous card, left to the next.
    pub fn release(&mut self) -> AppResult<SwipeOutcome> {
        self.ensure_open()?;
        let offset = std::mem::take(&mut self.drag_offset);

        let outcome = if offset > self.swipe_threshold {
            self.step(false)
        } else if offset < -self.swipe_threshold {
            self.step(true)
        } else {
            SwipeOutcome::SnappedBack
        };
        tracing::trace!(offset, ?outcome, "Card stack drag released");
        Ok(outcome)
    }

    /// Focus the next card, wrapping to the first.
    pub fn next(&mut self) -> AppResult<SwipeOutcome> {
        self.ensure_open()?;
        Ok(self.step(true))
    }

    /// Focus the previous card, wrapping to the last.
    pub fn previous(&mut self) -> AppResult<SwipeOutcome> {
        self.ensure_open()?;
        Ok(self.step(false))
    }

    /// Flip `card_id` between its photo and comment faces.
    ///
    /// Only the focused card can be flipped. Returns the new flip state.
    pub fn toggle_flip(&mut self, card_id: &str) -> AppResult<bool> {
        let focused = self.focused_id()?;
        if focused != card_id {
            return Err(AppError::BadRequest(format!(
                "Card {card_id} is not the focused card"
            )));
        }

        if self.flipped.remove(card_id) {
            Ok(false)
        } else {
            self.flipped.insert(focused);
            Ok(true)
        }
    }

    /// A tap outside the card flips the focused card back to its photo.
    ///
    /// Returns whether anything changed.
    pub fn backdrop_tap(&mut self) -> AppResult<bool> {
        let focused = self.focused_id()?;
        Ok(self.flipped.remove(&focused))
    }

    /// Remove the focused card after its post was deleted.
    ///
    /// The stack closes when no cards remain.
    pub fn remove_focused(&mut self) -> AppResult<T> {
        self.ensure_open()?;
        let removed = self.cards.remove(self.index);
        self.flipped.remove(removed.card_id());
        self.drag_offset = 0.0;

        if self.cards.is_empty() {
            self.closed = true;
            self.index = 0;
        } else {
            self.index = self.index.min(self.cards.len() - 1);
        }
        Ok(removed)
    }

    pub fn close(&mut self) -> AppResult<()> {
        self.ensure_open()?;
        self.closed = true;
        self.drag_offset = 0.0;
        self.flipped.clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::post_at;
    use proptest::prelude::*;

    fn stack(n: usize, start: usize) -> CardStack<post::Model> {
        let cards = (0..n)
            .map(|i| post_at(&format!("p{i}"), "alice", i64::try_from(i).unwrap()))
            .collect();
        CardStack::with_threshold(cards, start, 120.0)
    }

    #[test]
    fn test_open_clamps_index() {
        let s = stack(3, 10);
        assert_eq!(s.current_index(), Some(2));

        let empty = stack(0, 0);
        assert!(!empty.is_open());
        assert!(empty.current().is_none());
    }

    #[test]
    fn test_open_uses_configured_threshold() {
        let config = CardStackConfig {
            swipe_threshold: 50.0,
        };
        let mut s = CardStack::open(vec![post_at("a", "u", 0), post_at("b", "u", 1)], 0, &config);
        s.drag_by(-60.0).unwrap();
        assert_eq!(s.release().unwrap(), SwipeOutcome::Advanced { from: 0, to: 1 });
    }

    #[test]
    fn test_drag_directions() {
        let mut s = stack(4, 1);

        s.drag_by(-80.0).unwrap();
        s.drag_by(-60.0).unwrap();
        assert_eq!(s.release().unwrap(), SwipeOutcome::Advanced { from: 1, to: 2 });

        s.drag_by(130.0).unwrap();
        assert_eq!(s.release().unwrap(), SwipeOutcome::Advanced { from: 2, to: 1 });
        assert_eq!(s.drag_offset(), 0.0);
    }

    #[test]
    fn test_short_drag_snaps_back() {
        let mut s = stack(3, 0);
        s.drag_by(120.0).unwrap();
        assert_eq!(s.release().unwrap(), SwipeOutcome::SnappedBack);
        s.drag_by(-119.0).unwrap();
        assert_eq!(s.release().unwrap(), SwipeOutcome::SnappedBack);
        assert_eq!(s.current_index(), Some(0));
    }

    #[test]
    fn test_backward_from_first_wraps_to_last() {
        let mut s = stack(5, 0);
        s.drag_by(200.0).unwrap();
        assert_eq!(s.release().unwrap(), SwipeOutcome::Advanced { from: 0, to: 4 });
    }

    #[test]
    fn test_flip_only_focused_card() {
        let mut s = stack(3, 0);

        assert!(s.toggle_flip("p0").unwrap());
        assert!(s.is_flipped("p0"));
        assert!(matches!(s.toggle_flip("p1"), Err(AppError::BadRequest(_))));

        // Flip state survives moving away and back
        s.next().unwrap();
        assert!(s.is_flipped("p0"));
        assert!(!s.backdrop_tap().unwrap());
        s.previous().unwrap();

        assert!(s.backdrop_tap().unwrap());
        assert!(!s.is_flipped("p0"));
        assert!(s.toggle_flip("p0").unwrap());
        assert!(!s.toggle_flip("p0").unwrap());
    }

    #[test]
    fn test_remove_focused_clamps_and_closes() {
        let mut s = stack(2, 1);
        s.toggle_flip("p1").unwrap();

        let removed = s.remove_focused().unwrap();
        assert_eq!(removed.id, "p1");
        assert!(!s.is_flipped("p1"));
        assert_eq!(s.current_index(), Some(0));

        s.remove_focused().unwrap();
        assert!(!s.is_open());
        assert!(s.next().is_err());
    }

    #[test]
    fn test_closed_stack_rejects_events() {
        let mut s = stack(3, 0);
        s.close().unwrap();

        assert!(s.drag_by(10.0).is_err());
        assert!(s.release().is_err());
        assert!(s.toggle_flip("p0").is_err());
        assert!(s.backdrop_tap().is_err());
        assert!(s.remove_focused().is_err());
        assert!(s.close().is_err());
        assert_eq!(s.current_index(), None);
    }

    proptest! {
        #[test]
        fn prop_forward_n_times_returns_home(n in 2usize..30, start in 0usize..30) {
            let mut s = stack(n, start);
            let home = s.current_index();
            for _ in 0..n {
                s.drag_by(-500.0).unwrap();
                s.release().unwrap();
            }
            prop_assert_eq!(s.current_index(), home);
        }

        #[test]
        fn prop_backward_from_zero_is_last(n in 2usize..30) {
            let mut s = stack(n, 0);
            s.previous().unwrap();
            prop_assert_eq!(s.current_index(), Some(n - 1));
        }
    }
}
