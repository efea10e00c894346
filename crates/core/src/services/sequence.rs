//! Fetch sequencing.
//!
//! Refreshes, pagination and focus-triggered refetches can resolve out of
//! order. Each outstanding fetch carries a [`Ticket`]; only the most recently
//! issued ticket may apply its result.

/// Identifies one outstanding fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

/// Issues tickets and decides which one is current.
#[derive(Debug, Clone, Default)]
pub struct FetchSequence {
    latest: u64,
}

impl FetchSequence {
    /// Create a sequence with no outstanding fetches.
    #[must_use]
    pub const fn new() -> Self {
        Self { latest: 0 }
    }

    /// Issue a ticket for a new fetch, superseding every earlier one.
    pub const fn issue(&mut self) -> Ticket {
        self.latest += 1;
        Ticket(self.latest)
    }

    /// Whether `ticket` is still the latest issued.
    #[must_use]
    pub const fn is_current(&self, ticket: Ticket) -> bool {
        ticket.0 == self.latest
    }

    /// Make every outstanding ticket stale (screen unmounted, signed out).
    pub const fn invalidate_all(&mut self) {
        self.latest += 1;
    }
}
