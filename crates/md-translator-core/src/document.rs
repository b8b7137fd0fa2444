//! Paragraph-level document model.
//!
//! A Markdown document is split on blank lines into translatable units.
//! Unit ids are 0-based, contiguous indices into the ordered sequence and
//! stay stable until the whole sequence is replaced by a reparse or a
//! progress load.

use serde::{Deserialize, Serialize};

/// Blocks shorter than this are dropped by the splitter (stray separators,
/// lone punctuation lines).
const MIN_BLOCK_LEN: usize = 4;

/// One translatable block: the immutable source paragraph paired with its
/// mutable translation/proofread result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub id: usize,
    pub source_text: String,
    pub result_text: String,
}

impl Unit {
    /// A unit needs work while its result is empty after trimming.
    pub fn needs_work(&self) -> bool {
        self.result_text.trim().is_empty()
    }
}

/// One record of a saved progress document; array order matches unit ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub original_text: String,
    pub translated_text: String,
}

/// Ordered sequence of units for the current document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    units: Vec<Unit>,
}

impl Document {
    /// Split Markdown content into paragraph units.
    ///
    /// Blank lines separate paragraphs; each block is trimmed and blocks of
    /// fewer than four characters are discarded.
    pub fn parse(content: &str) -> Self {
        let mut blocks: Vec<String> = Vec::new();
        let mut current = String::new();

        for line in content.lines() {
            if line.trim().is_empty() {
                if !current.trim().is_empty() {
                    blocks.push(current.trim().to_string());
                }
                current.clear();
            } else if current.is_empty() {
                current.push_str(line);
            } else {
                current.push('\n');
                current.push_str(line);
            }
        }
        if !current.trim().is_empty() {
            blocks.push(current.trim().to_string());
        }

        let units = blocks
            .into_iter()
            .filter(|block| block.len() >= MIN_BLOCK_LEN)
            .enumerate()
            .map(|(id, source_text)| Unit {
                id,
                source_text,
                result_text: String::new(),
            })
            .collect();

        Self { units }
    }

    /// Rebuild a document from a saved progress sequence.
    pub fn from_progress(records: &[ProgressRecord]) -> Self {
        let units = records
            .iter()
            .enumerate()
            .map(|(id, record)| Unit {
                id,
                source_text: record.original_text.clone(),
                result_text: record.translated_text.clone(),
            })
            .collect();

        Self { units }
    }

    /// Snapshot the current state as progress records, in unit order.
    pub fn to_progress(&self) -> Vec<ProgressRecord> {
        self.units
            .iter()
            .map(|unit| ProgressRecord {
                original_text: unit.source_text.clone(),
                translated_text: unit.result_text.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn unit(&self, id: usize) -> Option<&Unit> {
        self.units.get(id)
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Overwrite a unit's result. Returns false for an unknown id.
    pub fn set_result(&mut self, id: usize, text: impl Into<String>) -> bool {
        match self.units.get_mut(id) {
            Some(unit) => {
                unit.result_text = text.into();
                true
            }
            None => false,
        }
    }

    /// Source paragraphs surrounding a unit, up to `window` on each side.
    /// An unknown id yields empty context on both sides.
    pub fn context(&self, id: usize, window: usize) -> (Vec<String>, Vec<String>) {
        if id >= self.units.len() {
            return (Vec::new(), Vec::new());
        }

        let start = id.saturating_sub(window);
        let before = self.units[start..id]
            .iter()
            .map(|u| u.source_text.clone())
            .collect();
        let after = self
            .units
            .iter()
            .skip(id + 1)
            .take(window)
            .map(|u| u.source_text.clone())
            .collect();
        (before, after)
    }

    /// Export the translated document: non-empty results joined by a blank
    /// line. Pure function of final state.
    pub fn export_text(&self) -> String {
        self.units
            .iter()
            .map(|u| u.result_text.trim())
            .filter(|r| !r.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
