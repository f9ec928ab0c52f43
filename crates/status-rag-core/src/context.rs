//! Context budgeter.
//!
//! Selects the corpus entries that go into the generation prompt and
//! renders them as a numbered context block:
//!
//! ```text
//! [1] Atlas (2024-05-01)
//! Shipped v2 release
//! ---
//! [2] Borealis (2024-05-02)
//! Budget shortfall in Q2
//! ```
//!
//! Entries are taken in **original corpus order**, not relevance order, so
//! that `[n]` numbers stay meaningful across repeated and trimmed calls.
//! Selection stops at the first entry that would push the rendered text
//! past `max_chars`, or once `max_entries` entries are included.
//!
//! Character counts are Unicode scalar values, not bytes.

use serde::Serialize;

use crate::corpus::truncate_chars;
use crate::models::CorpusEntry;

/// Separator between rendered entries.
pub const ENTRY_DELIMITER: &str = "\n---\n";

/// The entries embedded in the prompt, numbered `1..=entries.len()`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextSelection {
    pub entries: Vec<CorpusEntry>,
    pub rendered_text: String,
    pub char_count: usize,
}

impl ContextSelection {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry cited as `[number]`, if in range.
    pub fn by_number(&self, number: usize) -> Option<&CorpusEntry> {
        number.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// The `[n]` number of the entry at corpus `position`, if selected.
    ///
    /// A selection is always a prefix of the corpus, so entry `i` is `[i + 1]`.
    pub fn number_for_position(&self, position: usize) -> Option<usize> {
        (position < self.entries.len()).then_some(position + 1)
    }
}

/// Render one entry as a `[n] project (date)` block.
pub fn render_entry(number: usize, entry: &CorpusEntry) -> String {
    format!(
        "[{}] {} ({})\n{}",
        number, entry.project, entry.date, entry.text
    )
}

/// Select entries in corpus order under both caps.
pub fn select_context(
    entries: &[CorpusEntry],
    max_entries: usize,
    max_chars: usize,
) -> ContextSelection {
    let delimiter_chars = ENTRY_DELIMITER.chars().count();
    let mut selection = ContextSelection::default();

    for entry in entries {
        if selection.entries.len() >= max_entries {
            break;
        }
        let block = render_entry(selection.entries.len() + 1, entry);
        let block_chars = block.chars().count();
        let added = if selection.entries.is_empty() {
            block_chars
        } else {
            delimiter_chars + block_chars
        };
        if selection.char_count + added > max_chars {
            break;
        }
        if !selection.entries.is_empty() {
            selection.rendered_text.push_str(ENTRY_DELIMITER);
        }
        selection.rendered_text.push_str(&block);
        selection.char_count += added;
        selection.entries.push(entry.clone());
    }

    selection
}

/// Shrink a selection for a retry.
///
/// Keeps the first `max(len / 2, min_entries)` entries (never more than
/// the selection had), truncates each kept entry's text to `entry_chars`,
/// and re-renders. Kept entries retain their numbers because the
/// selection is a prefix of corpus order.
pub fn trim_selection(
    selection: &ContextSelection,
    min_entries: usize,
    entry_chars: usize,
) -> ContextSelection {
    let len = selection.entries.len();
    let keep = (len / 2).max(min_entries).min(len);

    let trimmed: Vec<CorpusEntry> = selection.entries[..keep]
        .iter()
        .map(|e| CorpusEntry {
            text: truncate_chars(&e.text, entry_chars).to_string(),
            ..e.clone()
        })
        .collect();

    // Trimmed blocks are never longer than the originals, so the old
    // character budget still holds.
    select_context(&trimmed, keep, usize::MAX)
}
