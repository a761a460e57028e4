use std::collections::HashSet;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static METHOD_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*method\b").expect("invalid method pattern"));
static METHOD_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*methodend\b").expect("invalid methodend pattern"));
static LABEL_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z_]\w*):(?:[^:]|$)").expect("invalid label pattern"));

/// Language-reserved transfer targets, always offered first and in this order.
pub const SYMBOLIC_LABELS: [&str; 12] = [
    "*next", "*break", "*continue", "*return", "*exit", "*proceed", "*same", "*retry",
    "*escape", "*stop", "*end", "*endif",
];

/// A label defined in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelDef {
    pub name: String,
    pub line: usize,
}

/// Line range whose labels are visible from `cursor_line`.
///
/// Inside a `method` ... `methodend` block this is the lines strictly between
/// the two keywords; when no `methodend` follows the cursor the range runs to
/// the end of the document. Outside any block it is the whole document.
pub fn scan_range(lines: &[&str], cursor_line: usize) -> Range<usize> {
    let cursor_line = cursor_line.min(lines.len());

    let mut open: Option<usize> = None;
    for (i, line) in lines.iter().enumerate().take(cursor_line) {
        if METHOD_OPEN.is_match(line) {
            open = Some(i);
        } else if METHOD_CLOSE.is_match(line) {
            open = None;
        }
    }

    let Some(open) = open else {
        return 0..lines.len();
    };

    let close = lines
        .iter()
        .enumerate()
        .skip(cursor_line)
        .find(|(_, line)| METHOD_CLOSE.is_match(line))
        .map(|(i, _)| i)
        .unwrap_or(lines.len());

    open + 1..close
}

/// Labels defined within `range`, in document order, first spelling of each
/// name (case-insensitive).
pub fn collect_labels(lines: &[&str], range: Range<usize>) -> Vec<LabelDef> {
    let mut seen = HashSet::new();
    let end = range.end.min(lines.len());
    let start = range.start.min(end);

    lines[start..end]
        .iter()
        .enumerate()
        .filter_map(|(offset, line)| {
            let name = LABEL_DEF.captures(line)?.get(1)?.as_str();
            Some(LabelDef {
                name: name.to_string(),
                line: start + offset,
            })
        })
        .filter(|def| seen.insert(def.name.to_ascii_lowercase()))
        .collect()
}

/// Labels visible from `cursor_line`.
pub fn visible_labels(lines: &[&str], cursor_line: usize) -> Vec<LabelDef> {
    collect_labels(lines, scan_range(lines, cursor_line))
}
