//! Anchor markers: invisible delimiters that tie a block's span in the buffer
//! back to its [`NodeKey`].
//!
//! A marker is an opener, one to eight hex digits and a closer, all taken from
//! the private-use area so shaping and word segmentation ignore them:
//!
//! ```text
//! U+E000 (start) | U+E001 (end)   U+E010 + nibble ...   U+E002
//! ```
//!
//! The key is written big-endian without leading zeros, so `NodeKey(0x2a)`
//! becomes `\u{E000}\u{E012}\u{E01A}\u{E002}`. Every marker code point is three
//! UTF-8 bytes.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

use crate::export::{RichText, TextRun};
use crate::model::NodeKey;

pub const START_OPENER: char = '\u{E000}';
pub const END_OPENER: char = '\u{E001}';
pub const CLOSER: char = '\u{E002}';
const DIGIT_BASE: u32 = 0xE010;
const CODE_POINT_LEN: usize = 3;

fn well_formed() -> &'static Regex {
    static WELL_FORMED: OnceLock<Regex> = OnceLock::new();
    WELL_FORMED.get_or_init(|| {
        Regex::new(r"[\x{E000}\x{E001}][\x{E010}-\x{E01F}]{1,8}\x{E002}")
            .expect("Invalid marker regex")
    })
}

fn marker_char() -> &'static Regex {
    static MARKER_CHAR: OnceLock<Regex> = OnceLock::new();
    MARKER_CHAR.get_or_init(|| {
        Regex::new(r"[\x{E000}-\x{E002}\x{E010}-\x{E01F}]").expect("Invalid marker char regex")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Start,
    End,
}

/// A decoded marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub kind: MarkerKind,
    pub key: NodeKey,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarkerError {
    #[error("malformed marker at byte {offset}")]
    Malformed { offset: usize },
    #[error("end marker for {key} at byte {offset} has no matching start")]
    UnmatchedEnd { key: NodeKey, offset: usize },
    #[error("end marker for {found} at byte {offset} closes {expected}")]
    Mismatched {
        expected: NodeKey,
        found: NodeKey,
        offset: usize,
    },
    #[error("start marker for {key} is never closed")]
    Unclosed { key: NodeKey },
}

fn nibbles(key: NodeKey) -> usize {
    let bits = u32::BITS - key.0.leading_zeros();
    (bits as usize).div_ceil(4).max(1)
}

/// Byte length of either marker for `key`.
pub fn marker_len(key: NodeKey) -> usize {
    CODE_POINT_LEN * (2 + nibbles(key))
}

pub fn write_marker(out: &mut String, kind: MarkerKind, key: NodeKey) {
    out.push(match kind {
        MarkerKind::Start => START_OPENER,
        MarkerKind::End => END_OPENER,
    });
    for shift in (0..nibbles(key)).rev() {
        let nibble = (key.0 >> (shift * 4)) & 0xF;
        // DIGIT_BASE + 0..=15 stays inside the private-use block.
        out.push(char::from_u32(DIGIT_BASE + nibble).unwrap_or(CLOSER));
    }
    out.push(CLOSER);
}

pub fn start_marker(key: NodeKey) -> String {
    let mut out = String::with_capacity(marker_len(key));
    write_marker(&mut out, MarkerKind::Start, key);
    out
}

pub fn end_marker(key: NodeKey) -> String {
    let mut out = String::with_capacity(marker_len(key));
    write_marker(&mut out, MarkerKind::End, key);
    out
}

/// Decode the marker at the start of `text`, returning it with its byte length.
pub fn decode_marker(text: &str) -> Result<(Marker, usize), MarkerError> {
    let malformed = MarkerError::Malformed { offset: 0 };
    let mut chars = text.char_indices();
    let kind = match chars.next() {
        Some((_, START_OPENER)) => MarkerKind::Start,
        Some((_, END_OPENER)) => MarkerKind::End,
        _ => return Err(malformed),
    };

    let mut value: u32 = 0;
    let mut digits = 0;
    for (offset, c) in chars {
        if c == CLOSER {
            if digits == 0 {
                return Err(malformed);
            }
            return Ok((
                Marker {
                    kind,
                    key: NodeKey(value),
                },
                offset + c.len_utf8(),
            ));
        }
        let nibble = (c as u32).wrapping_sub(DIGIT_BASE);
        if nibble > 0xF || digits == 8 {
            return Err(malformed);
        }
        value = (value << 4) | nibble;
        digits += 1;
    }
    Err(malformed)
}

/// Remove every well-formed marker from `text`.
///
/// Markers are removed whether or not they pair up. At the first marker code
/// point that is not part of a well-formed marker, stripping stops and the
/// rest of the text is kept as is, so the result never loses user text and
/// stripping twice gives the same output.
pub fn strip_markers(text: &str) -> Cow<'_, str> {
    let (stripped, _) = strip_from(text);
    stripped
}

/// Returns the stripped text and whether a malformed marker stopped stripping.
fn strip_from(text: &str) -> (Cow<'_, str>, bool) {
    let Some(first) = marker_char().find(text) else {
        return (Cow::Borrowed(text), false);
    };

    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut at = first.start();
    loop {
        match well_formed().find_at(text, at) {
            Some(marker) if marker.start() == at => {
                out.push_str(&text[copied..at]);
                copied = marker.end();
            }
            _ => {
                log::warn!("malformed anchor marker at byte {at}, leaving remainder unstripped");
                out.push_str(&text[copied..]);
                return (Cow::Owned(out), true);
            }
        }
        match marker_char().find_at(text, copied) {
            Some(next) => at = next.start(),
            None => break,
        }
    }
    out.push_str(&text[copied..]);
    (Cow::Owned(out), false)
}

/// [`strip_markers`] over each run. Once a run hits a malformed marker the
/// following runs are copied unchanged.
pub fn strip_markers_rich(rich: &RichText) -> RichText {
    let mut stopped = false;
    let runs = rich
        .runs
        .iter()
        .map(|run| {
            let text = if stopped {
                run.text.clone()
            } else {
                let (text, hit_malformed) = strip_from(&run.text);
                stopped = hit_malformed;
                text.into_owned()
            };
            TextRun {
                key: run.key,
                text,
                format: run.format,
            }
        })
        .filter(|run| !run.text.is_empty())
        .collect();
    RichText { runs }
}

/// Check that the markers in `text` are well formed and properly nested.
/// Returns the number of start/end pairs.
pub fn validate_pairing(text: &str) -> Result<usize, MarkerError> {
    let mut open: Vec<NodeKey> = Vec::new();
    let mut pairs = 0;
    let mut at = 0;
    while let Some(found) = marker_char().find_at(text, at) {
        let offset = found.start();
        let (marker, len) =
            decode_marker(&text[offset..]).map_err(|_| MarkerError::Malformed { offset })?;
        at = offset + len;
        match marker.kind {
            MarkerKind::Start => open.push(marker.key),
            MarkerKind::End => match open.pop() {
                Some(expected) if expected == marker.key => pairs += 1,
                Some(expected) => {
                    return Err(MarkerError::Mismatched {
                        expected,
                        found: marker.key,
                        offset,
                    });
                }
                None => {
                    return Err(MarkerError::UnmatchedEnd {
                        key: marker.key,
                        offset,
                    });
                }
            },
        }
    }
    match open.pop() {
        Some(key) => Err(MarkerError::Unclosed { key }),
        None => Ok(pairs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TextFormat;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1)]
    #[case(0xF, 1)]
    #[case(0x10, 2)]
    #[case(0x2A, 2)]
    #[case(0xFFFF, 4)]
    #[case(u32::MAX, 8)]
    fn test_marker_length_tracks_nibbles(#[case] key: u32, #[case] digits: usize) {
        let key = NodeKey(key);
        assert_eq!(marker_len(key), 3 * (2 + digits));
        assert_eq!(start_marker(key).len(), marker_len(key));
        assert_eq!(end_marker(key).chars().count(), 2 + digits);
    }

    #[test]
    fn test_encoding_is_big_endian() {
        assert_eq!(
            start_marker(NodeKey(0x2A)),
            "\u{E000}\u{E012}\u{E01A}\u{E002}"
        );
        assert_eq!(end_marker(NodeKey(0)), "\u{E001}\u{E010}\u{E002}");
    }

    #[rstest]
    #[case(NodeKey(0))]
    #[case(NodeKey(7))]
    #[case(NodeKey(4096))]
    #[case(NodeKey(u32::MAX))]
    fn test_decode_recovers_key(#[case] key: NodeKey) {
        let mut text = end_marker(key);
        text.push_str("tail");
        let (marker, len) = decode_marker(&text).unwrap();
        assert_eq!(
            marker,
            Marker {
                kind: MarkerKind::End,
                key
            }
        );
        assert_eq!(len, marker_len(key));
    }

    #[rstest]
    #[case("")]
    #[case("plain")]
    #[case("\u{E000}\u{E002}")]
    #[case("\u{E000}\u{E011}")]
    #[case("\u{E000}\u{E011}x\u{E002}")]
    #[case("\u{E010}\u{E002}")]
    fn test_decode_rejects_malformed(#[case] text: &str) {
        assert_eq!(
            decode_marker(text),
            Err(MarkerError::Malformed { offset: 0 })
        );
    }

    #[test]
    fn test_strip_removes_paired_and_unpaired_markers() {
        let a = NodeKey(1);
        let b = NodeKey(300);
        let text = format!(
            "{}A{}\n{}B\n",
            start_marker(a),
            end_marker(a),
            start_marker(b)
        );
        assert_eq!(strip_markers(&text), "A\nB\n");
    }

    #[test]
    fn test_strip_without_markers_borrows() {
        assert!(matches!(strip_markers("nothing here"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_stops_at_malformed_marker() {
        let good = start_marker(NodeKey(5));
        let text = format!("{good}one \u{E000}\u{E011} two {good}three");
        let stripped = strip_markers(&text);
        assert_eq!(stripped, format!("one \u{E000}\u{E011} two {good}three"));
        assert_eq!(strip_markers(&stripped), stripped);
    }

    #[test]
    fn test_strip_rich_carries_stop_across_runs() {
        let marker = start_marker(NodeKey(9));
        let rich = RichText {
            runs: vec![
                TextRun {
                    key: None,
                    text: format!("{marker}bold"),
                    format: TextFormat::BOLD,
                },
                TextRun {
                    key: None,
                    text: "\u{E002}broken".to_string(),
                    format: TextFormat::default(),
                },
                TextRun {
                    key: None,
                    text: format!("{marker}kept"),
                    format: TextFormat::ITALIC,
                },
            ],
        };
        let stripped = strip_markers_rich(&rich);
        let texts: Vec<String> = stripped.runs.iter().map(|r| r.text.clone()).collect();
        assert_eq!(
            texts,
            vec![
                "bold".to_string(),
                "\u{E002}broken".to_string(),
                format!("{marker}kept"),
            ]
        );
        assert_eq!(stripped.runs[0].format, TextFormat::BOLD);
    }

    #[test]
    fn test_validate_pairing() {
        let (a, b) = (NodeKey(1), NodeKey(2));
        let nested = format!(
            "{}{}x{}{}",
            start_marker(a),
            start_marker(b),
            end_marker(b),
            end_marker(a)
        );
        assert_eq!(validate_pairing(&nested), Ok(2));

        let crossed = format!(
            "{}{}{}{}",
            start_marker(a),
            start_marker(b),
            end_marker(a),
            end_marker(b)
        );
        assert!(matches!(
            validate_pairing(&crossed),
            Err(MarkerError::Mismatched { expected, found, .. }) if expected == b && found == a
        ));

        assert_eq!(
            validate_pairing(&start_marker(a)),
            Err(MarkerError::Unclosed { key: a })
        );
        assert_eq!(
            validate_pairing(&end_marker(b)),
            Err(MarkerError::UnmatchedEnd { key: b, offset: 0 })
        );
        assert_eq!(
            validate_pairing("ok \u{E000}"),
            Err(MarkerError::Malformed { offset: 3 })
        );
    }
}
