//! Line-level unified diff between two manifests.
//!
//! Lines are aligned with Myers' algorithm (linear-space variant), the
//! alignment is turned into edit operations, and operations are grouped into
//! hunks with a fixed amount of surrounding context. The output uses the classic unified
//! format (`@@ -a,b +c,d @@` headers followed by ` `, `-` and `+` lines)
//! without the `---`/`+++` file-header preamble.

use std::ops::Range;
use std::time::{Duration, Instant};

use similar::{Algorithm, DiffTag};

/// Context lines kept around every change.
pub const DEFAULT_CONTEXT: usize = 3;
/// Past this budget the alignment search settles for a coarser, still valid, diff.
pub const DIFF_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpTag {
    Equal,
    Delete,
    Insert,
    Replace,
}

/// One edit operation: `old[a]` relates to `new[b]` as `tag` says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Op {
    pub tag: OpTag,
    pub a: Range<usize>,
    pub b: Range<usize>,
}

impl Op {
    fn new(tag: OpTag, a: Range<usize>, b: Range<usize>) -> Self {
        Self { tag, a, b }
    }
}

/// Edit operations turning `old` into `new`, covering both sequences fully.
///
/// Memory stays linear in the input size, so manifests with tens of
/// thousands of lines diff as readily as small ones.
pub fn opcodes<S: AsRef<str>>(old: &[S], new: &[S]) -> Vec<Op> {
    let old: Vec<&str> = old.iter().map(AsRef::as_ref).collect();
    let new: Vec<&str> = new.iter().map(AsRef::as_ref).collect();
    let deadline = Instant::now() + DIFF_DEADLINE;
    similar::capture_diff_slices_deadline(Algorithm::Myers, &old, &new, Some(deadline))
        .iter()
        .map(|op| {
            let (tag, a, b) = op.as_tag_tuple();
            let tag = match tag {
                DiffTag::Equal => OpTag::Equal,
                DiffTag::Delete => OpTag::Delete,
                DiffTag::Insert => OpTag::Insert,
                DiffTag::Replace => OpTag::Replace,
            };
            Op::new(tag, a, b)
        })
        .collect()
}

/// Split operations into hunks, trimming equal runs to `context` lines and
/// breaking wherever more than `2 * context` unchanged lines separate edits.
pub fn grouped_opcodes(mut ops: Vec<Op>, context: usize) -> Vec<Vec<Op>> {
    if ops.is_empty() {
        ops.push(Op::new(OpTag::Equal, 0..1, 0..1));
    }
    if let Some(first) = ops.first_mut() {
        if first.tag == OpTag::Equal {
            first.a.start = first.a.start.max(first.a.end.saturating_sub(context));
            first.b.start = first.b.start.max(first.b.end.saturating_sub(context));
        }
    }
    if let Some(last) = ops.last_mut() {
        if last.tag == OpTag::Equal {
            last.a.end = last.a.end.min(last.a.start + context);
            last.b.end = last.b.end.min(last.b.start + context);
        }
    }

    let mut groups = Vec::new();
    let mut group = Vec::new();
    for mut op in ops {
        if op.tag == OpTag::Equal && op.a.len() > context * 2 {
            group.push(Op::new(
                OpTag::Equal,
                op.a.start..op.a.end.min(op.a.start + context),
                op.b.start..op.b.end.min(op.b.start + context),
            ));
            groups.push(std::mem::take(&mut group));
            op.a.start = op.a.start.max(op.a.end.saturating_sub(context));
            op.b.start = op.b.start.max(op.b.end.saturating_sub(context));
        }
        group.push(op);
    }
    let only_equal = group.len() == 1 && group[0].tag == OpTag::Equal;
    if !group.is_empty() && !only_equal {
        groups.push(group);
    }
    groups
}

/// Unified-format range: `start` for a single line, `start-1,0` when empty,
/// `start,len` otherwise (1-based).
fn format_range(range: &Range<usize>) -> String {
    let start = range.start + 1;
    match range.len() {
        1 => start.to_string(),
        0 => format!("{},0", start - 1),
        len => format!("{start},{len}"),
    }
}

/// Unified diff lines from `old` to `new`. Empty when the sequences match.
pub fn unified_diff<S: AsRef<str>>(old: &[S], new: &[S], context: usize) -> Vec<String> {
    let mut out = Vec::new();
    for group in grouped_opcodes(opcodes(old, new), context) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        out.push(format!(
            "@@ -{} +{} @@",
            format_range(&(first.a.start..last.a.end)),
            format_range(&(first.b.start..last.b.end)),
        ));
        for op in &group {
            if op.tag == OpTag::Equal {
                out.extend(old[op.a.clone()].iter().map(|l| format!(" {}", l.as_ref())));
                continue;
            }
            if matches!(op.tag, OpTag::Delete | OpTag::Replace) {
                out.extend(old[op.a.clone()].iter().map(|l| format!("-{}", l.as_ref())));
            }
            if matches!(op.tag, OpTag::Insert | OpTag::Replace) {
                out.extend(new[op.b.clone()].iter().map(|l| format!("+{}", l.as_ref())));
            }
        }
    }
    out
}
