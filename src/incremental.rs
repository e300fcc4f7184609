//! Incremental reparsing: text changes and cache surgery.
//!
//! The driver takes the previous parse's memo table and, for each change,
//! drops every entry whose examined span touches the changed region and
//! shifts every entry past it. Barrier cursors baked into the surviving
//! keys are renumbered against the freshly lexed barrier list. The reparse
//! then runs the start rule from the top; untouched regions come straight
//! out of the cache.

use rustc_hash::FxHashMap;

use crate::barriers::BarrierToken;
use crate::element::offset_by;
use crate::memo::{MemoKey, MemoTable};

/// One text edit: `old_length` bytes at `start_index` replaced by
/// `new_length` new ones. `resulting_text` is the full text after the edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChange {
    /// Byte offset of the edit.
    pub start_index: usize,
    /// How many bytes the edit removed.
    pub old_length: usize,
    /// How many bytes the edit inserted.
    pub new_length: usize,
    /// The complete text after the edit.
    pub resulting_text: String,
}

impl TextChange {
    /// Construct from parts already known.
    pub fn new(
        start_index: usize,
        old_length: usize,
        new_length: usize,
        resulting_text: impl Into<String>,
    ) -> Self {
        TextChange {
            start_index,
            old_length,
            new_length,
            resulting_text: resulting_text.into(),
        }
    }

    /// Construct by splicing `replacement` over `old_length` bytes of
    /// `old_text` at `start_index`, computing the resulting text.
    pub fn replacing(
        old_text: &str,
        start_index: usize,
        old_length: usize,
        replacement: &str,
    ) -> Self {
        let mut resulting_text =
            String::with_capacity(old_text.len() - old_length + replacement.len());
        resulting_text.push_str(&old_text[..start_index]);
        resulting_text.push_str(replacement);
        resulting_text.push_str(&old_text[start_index + old_length..]);
        TextChange {
            start_index,
            old_length,
            new_length: replacement.len(),
            resulting_text,
        }
    }

    /// How far positions after the edit move.
    pub fn delta(&self) -> isize {
        self.new_length as isize - self.old_length as isize
    }
}

/// True if a span at `position` of length `span` is affected by replacing
/// `[start, old_end)`. Spans strictly before the region survive; so do
/// spans beginning at or after its end (those get shifted).
fn touches_change(position: usize, span: usize, start: usize, old_end: usize) -> bool {
    (position < old_end && position + span > start) || (position >= start && position < old_end)
}

/// Apply one change to the memo table: invalidate touched entries, shift
/// the rest.
pub(crate) fn shift_cache(memo: &mut MemoTable, change: &TextChange) {
    let start = change.start_index;
    let old_end = start + change.old_length;
    let delta = change.delta();
    memo.rebuild(|key, mut cached| {
        // examined_len covers the matched span as well as lookahead, so a
        // failure or lookahead that inspected the changed region is dropped
        // along with overlapping successes.
        if touches_change(key.position, cached.examined_len, start, old_end) {
            return None;
        }
        if key.position >= old_end {
            let key = MemoKey {
                position: offset_by(key.position, delta),
                ..key
            };
            if let Some(el) = &mut cached.outcome {
                el.shift(delta);
            }
            for err in &mut cached.errors {
                err.shift(delta);
            }
            Some((key, cached))
        } else {
            Some((key, cached))
        }
    });
}

/// Shift the previous barrier list through one change, dropping barriers in
/// the changed region. Entries carry their original list index so cursors
/// can be renumbered later.
pub(crate) fn shift_barriers(
    barriers: Vec<(u32, BarrierToken)>,
    change: &TextChange,
) -> Vec<(u32, BarrierToken)> {
    let start = change.start_index;
    let old_end = start + change.old_length;
    let delta = change.delta();
    barriers
        .into_iter()
        .filter_map(|(index, mut barrier)| {
            if touches_change(barrier.start_index, barrier.length, start, old_end) {
                None
            } else {
                if barrier.start_index >= old_end {
                    barrier.start_index = offset_by(barrier.start_index, delta);
                }
                Some((index, barrier))
            }
        })
        .collect()
}

/// How old barrier-list indices map onto the freshly lexed list.
pub(crate) struct BarrierRemap {
    /// Indexed by old barrier index; `None` for barriers the changes
    /// swallowed.
    old_to_new: Vec<Option<u32>>,
    /// Start positions of new barriers with no old counterpart, sorted.
    /// Entries whose evaluation would have seen one of these are stale.
    unmapped_new_starts: Vec<usize>,
}

/// Match the shifted old barriers against the new list.
///
/// Returns `None` when the barrier lexer turned out not to be stable
/// outside the changed regions; the whole cache must go in that case.
pub(crate) fn compute_remap(
    shifted_old: &[(u32, BarrierToken)],
    new: &[BarrierToken],
    changed_regions: &[(usize, usize)],
    old_count: usize,
) -> Option<BarrierRemap> {
    let mut by_position: FxHashMap<usize, (u32, &BarrierToken)> = FxHashMap::default();
    for (index, barrier) in shifted_old {
        by_position.insert(barrier.start_index, (*index, barrier));
    }

    let mut old_to_new = vec![None; old_count];
    let mut unmapped_new_starts = Vec::new();
    let mut matched = 0;
    for (new_index, barrier) in new.iter().enumerate() {
        match by_position.get(&barrier.start_index) {
            Some((old_index, old_barrier))
                if old_barrier.length == barrier.length
                    && old_barrier.token_alias == barrier.token_alias =>
            {
                old_to_new[*old_index as usize] = Some(new_index as u32);
                matched += 1;
            }
            _ => {
                let in_changed_region = changed_regions
                    .iter()
                    .any(|&(start, end)| barrier.start_index >= start && barrier.start_index <= end);
                if !in_changed_region {
                    return None;
                }
                unmapped_new_starts.push(barrier.start_index);
            }
        }
    }
    if matched != shifted_old.len() {
        // An old barrier outside the changed regions vanished.
        return None;
    }
    Some(BarrierRemap {
        old_to_new,
        unmapped_new_starts,
    })
}

impl BarrierRemap {
    fn map(&self, old_index: usize) -> Option<u32> {
        self.old_to_new.get(old_index).copied().flatten()
    }

    /// Renumber one entry's cursor, or decide the entry is stale.
    ///
    /// The consumed prefix (`cursor` barriers, plus `consumed` more during
    /// the evaluation itself) must map onto consecutive new indices, and no
    /// unknown new barrier may appear anywhere the evaluation looked.
    fn remap_cursor(
        &self,
        cursor: u32,
        consumed: u32,
        position: usize,
        examined_len: usize,
    ) -> Option<u32> {
        let c = cursor as usize;
        let new_cursor = if c == 0 { 0 } else { self.map(c - 1)? + 1 };
        for i in 0..(c + consumed as usize) {
            let expected = (new_cursor as usize + i).checked_sub(c)?;
            if self.map(i)? as usize != expected {
                return None;
            }
        }
        let horizon = position + examined_len;
        let stale = self
            .unmapped_new_starts
            .iter()
            .any(|&start| start < horizon);
        if stale {
            return None;
        }
        Some(new_cursor)
    }
}

/// Renumber the barrier cursors in every surviving memo key; entries whose
/// barrier environment changed are dropped.
pub(crate) fn apply_remap(memo: &mut MemoTable, remap: &BarrierRemap) {
    memo.rebuild(|key, cached| {
        let new_cursor = remap.remap_cursor(
            key.cursor,
            cached.consumed_barriers,
            key.position,
            cached.examined_len,
        )?;
        Some((
            MemoKey {
                cursor: new_cursor,
                ..key
            },
            cached,
        ))
    });
}
