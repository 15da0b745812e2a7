use replpad::text::{count_chars_from_start, line_span, split_ranges, unwrap};

fn rejoin(source: &str, delimiter: &str) -> String {
    split_ranges(source, delimiter)
        .into_iter()
        .map(|range| range.text)
        .collect::<Vec<_>>()
        .join(delimiter)
}

#[test]
fn split_ranges_round_trips() {
    let samples = [
        "",
        "single line",
        "a\nbb\nccc",
        "trailing\n",
        "\n\nblank lines\n\n",
        "let x = 1;\nx + 2;",
    ];
    for source in samples {
        assert_eq!(rejoin(source, "\n"), source, "round trip of {source:?}");
    }
}

#[test]
fn split_ranges_records_offsets_and_indices() {
    let ranges = split_ranges("a\nbb\n", "\n");
    assert_eq!(ranges.len(), 3);
    assert_eq!((ranges[0].start, ranges[0].end, ranges[0].index), (0, 1, 0));
    assert_eq!(ranges[1].text, "bb");
    assert_eq!((ranges[1].start, ranges[1].end, ranges[1].index), (2, 4, 1));
    assert_eq!(ranges[2].text, "");
    assert_eq!((ranges[2].start, ranges[2].end), (5, 5));
}

#[test]
fn split_ranges_matches_multi_character_delimiters() {
    let ranges = split_ranges("a--b--c", "--");
    let texts: Vec<_> = ranges.iter().map(|range| range.text.as_str()).collect();
    assert_eq!(texts, ["a", "b", "c"]);
    assert_eq!((ranges[1].start, ranges[1].end), (3, 4));
    assert_eq!(rejoin("x--y----z--", "--"), "x--y----z--");
}

#[test]
fn empty_delimiter_yields_one_range() {
    let ranges = split_ranges("abc", "");
    assert_eq!(ranges.len(), 1);
    assert_eq!(ranges[0].text, "abc");
}

#[test]
fn line_span_attributes_statements_to_lines() {
    let ranges = split_ranges("let x = 1;\nx + 2;", "\n");
    let first = line_span(&ranges, 0, 10);
    assert_eq!((first.start, first.end, first.length), (0, 1, 1));
    let second = line_span(&ranges, 11, 17);
    assert_eq!((second.start, second.end, second.length), (1, 2, 1));
}

#[test]
fn line_span_covers_multi_line_statements() {
    let source = "function f() {\n  return 1;\n}\nf();";
    let ranges = split_ranges(source, "\n");
    let end = source.find("}\n").map(|idx| idx + 1).unwrap();
    let span = line_span(&ranges, 0, end);
    assert_eq!((span.start, span.end), (0, 3));
}

#[test]
fn line_span_stays_within_bounds() {
    let source = "a\n\nbb\nccc\n";
    let ranges = split_ranges(source, "\n");
    for start in 0..=source.len() {
        for end in start..=source.len() {
            let span = line_span(&ranges, start, end);
            assert!(span.start <= span.end, "{start}..{end}: {span:?}");
            assert!(span.end <= ranges.len(), "{start}..{end}: {span:?}");
            assert_eq!(span.length, span.end - span.start);
        }
    }
}

#[test]
fn line_span_of_no_ranges_is_empty() {
    let span = line_span(&[], 0, 0);
    assert_eq!((span.start, span.end, span.length), (0, 0, 0));
}

#[test]
fn counts_leading_characters() {
    assert_eq!(count_chars_from_start("   x", &[' ']), 3);
    assert_eq!(count_chars_from_start(" \t x", &[' ', '\t']), 3);
    assert_eq!(count_chars_from_start("x  ", &[' ']), 0);
}

#[test]
fn unwrap_strips_nested_quotes() {
    let quotes = ["'", "\""];
    assert_eq!(unwrap("\"mod.js\"", &quotes), "mod.js");
    assert_eq!(unwrap("\"'mod.js'\"", &quotes), "mod.js");
    assert_eq!(unwrap("mod.js", &quotes), "mod.js");
    assert_eq!(unwrap("'", &quotes), "'");
    assert_eq!(unwrap("''", &quotes), "");
}
