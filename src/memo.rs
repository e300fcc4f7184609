//! The packrat memoization table.
//!
//! Every rule evaluation is keyed by `(rule, position, barrier cursor)`. The
//! cursor is part of the key because the same rule at the same text position
//! can come out differently depending on which barriers are still
//! unconsumed. A slot is seeded `Pending` while its rule is being evaluated;
//! looking up a `Pending` slot is the left-recursion cut and fails
//! immediately.

use rustc_hash::FxHashMap;

use crate::element::ParsedElement;
use crate::error::ParsingError;
use crate::grammar::RuleId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct MemoKey {
    pub(crate) rule: RuleId,
    pub(crate) position: usize,
    pub(crate) cursor: u32,
}

/// A finished evaluation, ready to be replayed on a cache hit.
#[derive(Debug, Clone)]
pub(crate) struct CachedResult {
    /// The element on success, `None` on failure. Failures are cached too;
    /// that is the packrat guarantee.
    pub(crate) outcome: Option<ParsedElement>,
    /// How many barriers the evaluation consumed; replayed onto the cursor
    /// on a hit.
    pub(crate) consumed_barriers: u32,
    /// How far past `position` the evaluation looked at the text, whether or
    /// not it matched. Incremental invalidation uses this, so that a failure
    /// or a lookahead that inspected a region is invalidated when that
    /// region changes.
    pub(crate) examined_len: usize,
    /// Errors this evaluation contributed to the farthest-failure set,
    /// replayed into the recorder on a hit so reparses report the same
    /// diagnostics a full parse would.
    pub(crate) errors: Vec<ParsingError>,
}

#[derive(Debug, Clone)]
pub(crate) enum Slot {
    Pending,
    Done(CachedResult),
}

/// Counters the engine keeps about cache behavior. Exposed on
/// [`crate::ParseResult`] so hosts and tests can observe reuse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoStats {
    /// Lookups that found a finished result.
    pub hits: usize,
    /// Lookups that found nothing and triggered an evaluation.
    pub misses: usize,
    /// Lookups that found a `Pending` seed (left-recursion cuts).
    pub recursion_cuts: usize,
    /// Entries dropped by the incremental driver.
    pub invalidated: usize,
    /// Entries the incremental driver shifted to a new position.
    pub rekeyed: usize,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MemoTable {
    slots: FxHashMap<MemoKey, Slot>,
    pub(crate) stats: MemoStats,
}

impl MemoTable {
    pub(crate) fn new() -> Self {
        MemoTable::default()
    }

    pub(crate) fn get(&self, key: &MemoKey) -> Option<&Slot> {
        self.slots.get(key)
    }

    pub(crate) fn seed_pending(&mut self, key: MemoKey) {
        self.slots.insert(key, Slot::Pending);
    }

    pub(crate) fn complete(&mut self, key: MemoKey, result: CachedResult) {
        self.slots.insert(key, Slot::Done(result));
    }

    /// Drop a `Pending` seed without writing a result. Used when evaluation
    /// is abandoned (cancellation, throw-mode halt) and the outcome must not
    /// be cached.
    pub(crate) fn abandon(&mut self, key: &MemoKey) {
        self.slots.remove(key);
    }

    /// Drop any `Pending` seeds left behind by an abandoned parse so they
    /// cannot leak into an incremental reparse.
    pub(crate) fn purge_pending(&mut self) {
        self.slots.retain(|_, slot| matches!(slot, Slot::Done(_)));
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Rebuild the table, passing each finished entry through `f`. The
    /// incremental driver uses this for invalidation and re-keying: `f`
    /// returns `None` to drop an entry, or the (possibly shifted) entry to
    /// keep it.
    pub(crate) fn rebuild(
        &mut self,
        mut f: impl FnMut(MemoKey, CachedResult) -> Option<(MemoKey, CachedResult)>,
    ) {
        let slots = std::mem::take(&mut self.slots);
        let mut rebuilt = FxHashMap::default();
        for (key, slot) in slots {
            let Slot::Done(result) = slot else {
                continue;
            };
            match f(key, result) {
                Some((new_key, new_result)) => {
                    if new_key != key {
                        self.stats.rekeyed += 1;
                    }
                    rebuilt.insert(new_key, Slot::Done(new_result));
                }
                None => self.stats.invalidated += 1,
            }
        }
        self.slots = rebuilt;
    }
}
