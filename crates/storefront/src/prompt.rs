//! Draft recovery prompt lifecycle.
//!
//! The prompt is shown for a fixed time when checkout opens with a saved
//! draft. Hovering pauses the countdown; leaving resumes it with whatever
//! time was left. Expiry hides the prompt but keeps the persisted draft.
//!
//! The prompt is driven by caller-supplied instants, so a UI loop can
//! `sleep_until(prompt.deadline())` and call [`RecoveryPrompt::poll`].

use std::time::Duration;

use tokio::time::Instant;

use crate::draft::CheckoutDraft;

/// Where the prompt is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptState {
    /// Shown, counting down.
    Visible,
    /// Shown, countdown paused by hover.
    Paused,
    /// Timed out. The draft stays persisted.
    Expired,
    /// Closed by the user without a choice. The draft stays persisted.
    Dismissed,
    /// The user chose to restore the draft.
    Restored,
    /// The user chose to discard the draft.
    Discarded,
}

impl PromptState {
    /// Whether the prompt is on screen.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Visible | Self::Paused)
    }
}

/// A recovery offer for one saved draft.
#[derive(Debug, Clone)]
pub struct RecoveryPrompt {
    draft: CheckoutDraft,
    state: PromptState,
    remaining: Duration,
    resumed_at: Instant,
}

impl RecoveryPrompt {
    /// Show the prompt at `now` for `duration`.
    #[must_use]
    pub const fn show(draft: CheckoutDraft, duration: Duration, now: Instant) -> Self {
        Self {
            draft,
            state: PromptState::Visible,
            remaining: duration,
            resumed_at: now,
        }
    }

    /// The draft on offer.
    #[must_use]
    pub const fn draft(&self) -> &CheckoutDraft {
        &self.draft
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> PromptState {
        self.state
    }

    /// Countdown left at `now`.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.state {
            PromptState::Visible => self
                .remaining
                .saturating_sub(now.saturating_duration_since(self.resumed_at)),
            PromptState::Paused => self.remaining,
            _ => Duration::ZERO,
        }
    }

    /// When the prompt expires, if it is counting down.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        (self.state == PromptState::Visible).then(|| self.resumed_at + self.remaining)
    }

    /// Pointer entered the prompt.
    pub fn hover_start(&mut self, now: Instant) -> PromptState {
        if self.state == PromptState::Visible {
            self.remaining = self.remaining(now);
            self.state = if self.remaining.is_zero() {
                PromptState::Expired
            } else {
                PromptState::Paused
            };
        }
        self.state
    }

    /// Pointer left the prompt.
    pub fn hover_end(&mut self, now: Instant) -> PromptState {
        if self.state == PromptState::Paused {
            self.resumed_at = now;
            self.state = PromptState::Visible;
        }
        self.state
    }

    /// Expire the prompt if its countdown ran out by `now`.
    pub fn poll(&mut self, now: Instant) -> PromptState {
        if self.state == PromptState::Visible && self.remaining(now).is_zero() {
            self.state = PromptState::Expired;
        }
        self.state
    }

    /// Close without a choice.
    pub fn dismiss(&mut self) -> PromptState {
        self.settle(PromptState::Dismissed)
    }

    pub(crate) fn mark_restored(&mut self) -> PromptState {
        self.settle(PromptState::Restored)
    }

    pub(crate) fn mark_discarded(&mut self) -> PromptState {
        self.settle(PromptState::Discarded)
    }

    fn settle(&mut self, outcome: PromptState) -> PromptState {
        if self.state.is_open() {
            self.state = outcome;
        }
        self.state
    }
}
