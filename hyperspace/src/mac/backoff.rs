//! Shared-slot contention backoff.
//!
//! Binary exponential: every collision doubles the window and draws a
//! fresh random wait; a success resets the window. The wait is counted in
//! shared-slot occurrences, not slots, so the schedule density does not
//! change the contention behaviour.

use rand_core::RngCore;

/// Exponential backoff state for one outbound frame.
#[derive(Debug, Clone)]
pub struct Backoff {
    w_min: u8,
    w_max: u8,
    window: u8,
    wait: u8,
    retries: u8,
    max_retries: u8,
}

impl Backoff {
    /// Create a fresh backoff with the given window bounds and retry cap.
    pub fn new(w_min: u8, w_max: u8, max_retries: u8) -> Self {
        debug_assert!(w_min >= 1 && w_min <= w_max);
        Self { w_min, w_max, window: w_min, wait: 0, retries: 0, max_retries }
    }

    /// Called at every shared slot. Returns `true` when the frame may be
    /// transmitted in this slot.
    pub fn may_transmit(&mut self) -> bool {
        if self.wait == 0 {
            true
        } else {
            self.wait -= 1;
            false
        }
    }

    /// Record a collision (ACK timeout). Doubles the window, draws the
    /// next wait, and reports whether the retry budget still allows
    /// another attempt.
    pub fn collision<R: RngCore>(&mut self, rng: &mut R) -> bool {
        self.retries += 1;
        if self.retries > self.max_retries {
            return false;
        }
        self.window = (self.window.saturating_mul(2)).min(self.w_max);
        // Uniform in 0..=window.
        self.wait = (rng.next_u32() % (self.window as u32 + 1)) as u8;
        true
    }

    /// Record a successful (acknowledged) transmission.
    pub fn success(&mut self) {
        self.window = self.w_min;
        self.wait = 0;
        self.retries = 0;
    }

    /// The number of collisions recorded so far.
    pub fn retries(&self) -> u8 {
        self.retries
    }
}
