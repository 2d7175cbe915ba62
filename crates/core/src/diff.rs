// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Line-level change sets between two content snapshots.
//!
//! [`diff_lines`] is a forward alignment scan, not a minimum edit distance.
//! It walks the new lines with a cursor into the old lines and classifies each
//! mismatch by looking ahead:
//!
//! - the old line still occurs later in the new lines: the new line was
//!   inserted (`add`)
//! - the new line still occurs later in the old lines: the old line was
//!   deleted (`remove`), and the same new line is tested again
//! - neither: the line was replaced (`remove` then `add`)
//!
//! Old lines left past the cursor at the end are removed. Pure reorderings
//! may come out as add/remove pairs rather than moves. Every emitted list is
//! still an alignment, so [`apply_changes`] reproduces the new content.

use std::collections::HashSet;

use crate::model::{ChangeType, FileChange};

/// Splits content into lines on `\n`.
///
/// Empty content has no lines. Anything else round-trips through
/// `join("\n")`, including a trailing newline (a final empty line).
pub fn split_lines(content: &str) -> Vec<&str> {
    if content.is_empty() {
        Vec::new()
    } else {
        content.split('\n').collect()
    }
}

/// Computes the change list that turns `old` into `new`.
///
/// Add positions index the new snapshot; remove positions index the old one.
pub fn diff_lines(old: &str, new: &str) -> Vec<FileChange> {
    let old_lines = split_lines(old);
    let new_lines = split_lines(new);

    let mut changes = Vec::new();
    let mut cursor = 0;
    let mut position = 0;

    while position < new_lines.len() {
        let line = new_lines[position];

        let Some(&old_line) = old_lines.get(cursor) else {
            changes.push(FileChange::add(line, position));
            position += 1;
            continue;
        };

        if line == old_line {
            cursor += 1;
            position += 1;
        } else if new_lines[position + 1..].contains(&old_line) {
            changes.push(FileChange::add(line, position));
            position += 1;
        } else if old_lines[cursor + 1..].contains(&line) {
            changes.push(FileChange::remove(old_line, cursor));
            cursor += 1;
        } else {
            changes.push(FileChange::remove(old_line, cursor));
            changes.push(FileChange::add(line, position));
            cursor += 1;
            position += 1;
        }
    }

    for (index, line) in old_lines.iter().enumerate().skip(cursor) {
        changes.push(FileChange::remove(*line, index));
    }

    changes
}

/// Replays a change list produced by [`diff_lines`] against `old`.
///
/// Removes drop old lines by old position; adds are then inserted in
/// ascending new position.
pub fn apply_changes(old: &str, changes: &[FileChange]) -> String {
    let removed: HashSet<usize> = changes
        .iter()
        .filter(|c| c.change_type == ChangeType::Remove)
        .map(|c| c.position)
        .collect();

    let mut lines: Vec<&str> = split_lines(old)
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !removed.contains(index))
        .map(|(_, line)| line)
        .collect();

    let mut adds: Vec<&FileChange> = changes
        .iter()
        .filter(|c| c.change_type == ChangeType::Add)
        .collect();
    adds.sort_by_key(|c| c.position);

    for add in adds {
        let at = add.position.min(lines.len());
        lines.insert(at, add.content.as_str());
    }

    lines.join("\n")
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod tests;
