//! Link credit accounting.
//!
//! The driver runs on a single thread, so balances are plain counters owned
//! by the driver rather than shared atomics.

/// Credit balance for one link.
///
/// On a sender link the engine grants credit and every send consumes one.
/// On a receiver link the driver grants credit to the peer and refills it
/// back to the configured window as deliveries complete.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkCredit {
    credits: u32,
}

impl LinkCredit {
    /// Add credits to the balance.
    ///
    /// Returns the new total.
    pub fn grant(&mut self, amount: u32) -> u32 {
        self.credits = self.credits.saturating_add(amount);
        self.credits
    }

    /// Consume one credit if any is available, ignoring an empty balance.
    ///
    /// Throttled sends are paced by the timer, not by credit, so the balance
    /// only needs to stay non-negative.
    pub fn consume_saturating(&mut self) {
        self.credits = self.credits.saturating_sub(1);
    }

    /// Refill the balance back to `window`.
    ///
    /// Returns the amount added (0 if already at or above the window).
    pub fn replenish_to(&mut self, window: u32) -> u32 {
        let added = window.saturating_sub(self.credits);
        self.credits += added;
        added
    }

    /// Get the current credit count.
    pub fn available(&self) -> u32 {
        self.credits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_starts_at_zero() {
        let balance = LinkCredit::default();
        assert_eq!(balance.available(), 0);
    }

    #[test]
    fn test_grant_credits() {
        let mut balance = LinkCredit::default();
        assert_eq!(balance.grant(5), 5);
        assert_eq!(balance.grant(3), 8);
        assert_eq!(balance.grant(u32::MAX), u32::MAX);
    }

    #[test]
    fn test_consume_saturating_stays_at_zero() {
        let mut balance = LinkCredit::default();
        balance.consume_saturating();
        assert_eq!(balance.available(), 0);
    }

    #[test]
    fn test_replenish_to_window() {
        let mut balance = LinkCredit::default();
        balance.grant(10);
        balance.consume_saturating();
        balance.consume_saturating();
        assert_eq!(balance.replenish_to(10), 2);
        assert_eq!(balance.available(), 10);
        assert_eq!(balance.replenish_to(10), 0);
    }
}
