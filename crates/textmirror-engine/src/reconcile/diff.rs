use std::ops::Range;

/// A single replacement turning one string into another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    /// Range in the old string.
    pub range: Range<usize>,
    pub replacement: String,
}

/// Length of the longest common prefix, on a character boundary of both.
pub fn common_prefix_len(a: &str, b: &str) -> usize {
    let mut len = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    while !(a.is_char_boundary(len) && b.is_char_boundary(len)) {
        len -= 1;
    }
    len
}

/// Length of the longest common suffix no longer than `max`, on a character
/// boundary of both.
pub fn common_suffix_len(a: &str, b: &str, max: usize) -> usize {
    let mut len = a
        .bytes()
        .rev()
        .zip(b.bytes().rev())
        .take(max)
        .take_while(|(x, y)| x == y)
        .count();
    while !(a.is_char_boundary(a.len() - len) && b.is_char_boundary(b.len() - len)) {
        len -= 1;
    }
    len
}

/// The smallest single edit from `old` to `new`, found by trimming their
/// common prefix and suffix. `None` when the strings are equal.
pub fn minimal_edit(old: &str, new: &str) -> Option<TextEdit> {
    if old == new {
        return None;
    }
    let prefix = common_prefix_len(old, new);
    let max_suffix = old.len().min(new.len()) - prefix;
    let suffix = common_suffix_len(&old[prefix..], &new[prefix..], max_suffix);
    Some(TextEdit {
        range: prefix..old.len() - suffix,
        replacement: new[prefix..new.len() - suffix].to_string(),
    })
}
