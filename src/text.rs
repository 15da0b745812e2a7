//! Line ranges over a source buffer and the mapping from byte spans to lines.

use serde::Serialize;

/// One line of source. `start`/`end` are byte offsets, `end` exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Range {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub index: usize,
}

/// Half-open run of line indices a statement occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
    pub length: usize,
}

impl LineSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            length: end - start,
        }
    }
}

/// Splits `source` at every occurrence of `delimiter`.
///
/// The delimiter belongs to neither neighbour. A trailing partial line is
/// emitted, and a source ending in the delimiter gets a final empty range, so
/// joining the texts with the delimiter gives back `source`.
pub fn split_ranges(source: &str, delimiter: &str) -> Vec<Range> {
    if delimiter.is_empty() {
        return vec![Range {
            text: source.to_string(),
            start: 0,
            end: source.len(),
            index: 0,
        }];
    }

    let mut ranges = Vec::new();
    let mut start = 0;
    let mut cursor = 0;
    while let Some(found) = source[cursor..].find(delimiter) {
        let end = cursor + found;
        ranges.push(Range {
            text: source[start..end].to_string(),
            start,
            end,
            index: ranges.len(),
        });
        start = end + delimiter.len();
        cursor = start;
    }
    if start < source.len() || !ranges.is_empty() {
        ranges.push(Range {
            text: source[start..].to_string(),
            start,
            end: source.len(),
            index: ranges.len(),
        });
    }
    ranges
}

/// Maps the byte span `start..end` onto the lines it covers.
///
/// A span ending exactly on a line's end is attributed to that line and stops
/// there instead of reaching into the next one.
pub fn line_span(ranges: &[Range], start: usize, end: usize) -> LineSpan {
    if ranges.is_empty() {
        return LineSpan::default();
    }

    let mut first = 0;
    for (idx, range) in ranges.iter().enumerate() {
        first = idx;
        if range.text.is_empty() {
            continue;
        }
        if start < range.end {
            break;
        }
    }

    let mut last = first;
    for (idx, range) in ranges.iter().enumerate().skip(first) {
        last = idx;
        if end == range.end {
            last = idx + 1;
            break;
        }
        if end < range.end {
            break;
        }
    }

    LineSpan::new(first, last)
}

/// Length of the prefix of `source` made only of `chars`.
pub fn count_chars_from_start(source: &str, chars: &[char]) -> usize {
    source.chars().take_while(|ch| chars.contains(ch)).count()
}

/// Strips matching leading and trailing `wrappers` until none applies.
pub fn unwrap<'a>(mut source: &'a str, wrappers: &[&str]) -> &'a str {
    loop {
        let mut matched = false;
        for wrapper in wrappers {
            if wrapper.is_empty() || source.len() < wrapper.len() * 2 {
                continue;
            }
            if source.starts_with(wrapper) && source.ends_with(wrapper) {
                source = &source[wrapper.len()..source.len() - wrapper.len()];
                matched = true;
            }
        }
        if !matched {
            return source;
        }
    }
}
