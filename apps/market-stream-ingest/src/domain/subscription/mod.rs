//! Subscription Tracking
//!
//! Per-channel record of which symbols are subscribed upstream.
//!
//! # Design
//!
//! Requests are diffed against the current set before anything is sent:
//! - `pending_additions` yields only symbols not yet subscribed
//! - `pending_removals` yields only symbols still subscribed
//!
//! The set is committed only after the wire message was sent, so a failed
//! send leaves it untouched and a repeated request emits nothing.

use std::collections::BTreeSet;

/// A ticker symbol.
pub type Symbol = String;

// =============================================================================
// Subscription Set
// =============================================================================

/// Symbols subscribed on one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    symbols: BTreeSet<Symbol>,
}

impl SubscriptionSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical form of a requested symbol: trimmed and uppercased.
    ///
    /// Returns `None` for blank input.
    #[must_use]
    pub fn canonical(symbol: &str) -> Option<Symbol> {
        let trimmed = symbol.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_ascii_uppercase())
    }

    /// Symbols from `requested` that are not yet subscribed.
    ///
    /// Preserves request order and drops duplicates within the request.
    #[must_use]
    pub fn pending_additions<S: AsRef<str>>(&self, requested: &[S]) -> Vec<Symbol> {
        self.diff(requested, |set, s| !set.contains(s))
    }

    /// Symbols from `requested` that are currently subscribed.
    #[must_use]
    pub fn pending_removals<S: AsRef<str>>(&self, requested: &[S]) -> Vec<Symbol> {
        self.diff(requested, |set, s| set.contains(s))
    }

    /// Record symbols as subscribed.
    pub fn commit_additions(&mut self, symbols: &[Symbol]) {
        self.symbols.extend(symbols.iter().cloned());
    }

    /// Record symbols as unsubscribed.
    pub fn commit_removals(&mut self, symbols: &[Symbol]) {
        for symbol in symbols {
            self.symbols.remove(symbol);
        }
    }

    /// Whether a symbol is subscribed.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        Self::canonical(symbol).is_some_and(|s| self.symbols.contains(&s))
    }

    /// All subscribed symbols, sorted.
    #[must_use]
    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.iter().cloned().collect()
    }

    /// Number of subscribed symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Forget every subscription.
    pub fn clear(&mut self) {
        self.symbols.clear();
    }

    fn diff<S, F>(&self, requested: &[S], keep: F) -> Vec<Symbol>
    where
        S: AsRef<str>,
        F: Fn(&BTreeSet<Symbol>, &Symbol) -> bool,
    {
        let mut seen = BTreeSet::new();
        requested
            .iter()
            .filter_map(|s| Self::canonical(s.as_ref()))
            .filter(|s| keep(&self.symbols, s) && seen.insert(s.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(symbols: &[&str]) -> SubscriptionSet {
        let mut set = SubscriptionSet::new();
        let owned: Vec<Symbol> = symbols.iter().map(ToString::to_string).collect();
        set.commit_additions(&owned);
        set
    }

    #[test]
    fn additions_skip_existing_symbols() {
        let set = set_of(&["AAPL"]);
        assert_eq!(set.pending_additions(&["AAPL", "MSFT"]), vec!["MSFT"]);
    }

    #[test]
    fn additions_drop_duplicates_and_blanks() {
        let set = SubscriptionSet::new();
        assert_eq!(
            set.pending_additions(&["aapl", " AAPL ", "", "msft"]),
            vec!["AAPL", "MSFT"]
        );
    }

    #[test]
    fn removals_only_return_subscribed() {
        let set = set_of(&["AAPL", "TSLA"]);
        assert_eq!(set.pending_removals(&["AAPL", "MSFT"]), vec!["AAPL"]);
        assert!(set.pending_removals(&["NVDA"]).is_empty());
    }

    #[test]
    fn commit_cycle() {
        let mut set = SubscriptionSet::new();
        let added = set.pending_additions(&["AAPL", "MSFT"]);
        set.commit_additions(&added);
        assert_eq!(set.len(), 2);
        assert!(set.pending_additions(&["AAPL", "MSFT"]).is_empty());

        let removed = set.pending_removals(&["MSFT"]);
        set.commit_removals(&removed);
        assert_eq!(set.symbols(), vec!["AAPL"]);
        assert!(set.contains("aapl"));
        assert!(!set.contains("MSFT"));
    }

    #[test]
    fn clear_empties_the_set() {
        let mut set = set_of(&["AAPL"]);
        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn symbols_are_sorted() {
        let set = set_of(&["TSLA", "AAPL", "MSFT"]);
        assert_eq!(set.symbols(), vec!["AAPL", "MSFT", "TSLA"]);
    }
}
