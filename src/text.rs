//! In-place normalisation of filter text.
//!
//! Filter text is owned as a `String` and mutated here while it is being
//! parsed; once a filter is interned its text never changes again, so any
//! offsets recorded during parsing stay valid for the lifetime of the
//! filter.

use std::cell::Cell;

/// Upper bound on accepted filter text, in code units.
pub const MAX_TEXT_LENGTH: usize = (1 << 30) - 1;

thread_local! {
    static CASE_FOLD: Cell<fn(char) -> char> = Cell::new(identity_fold);
}

fn identity_fold(c: char) -> char {
    c
}

/// Installs the host-provided lower-case fold for non-ASCII code points.
/// ASCII folding is always done inline; everything else goes through this
/// hook, which defaults to the identity function.
pub fn set_case_fold(fold: fn(char) -> char) {
    CASE_FOLD.with(|f| f.set(fold));
}

#[inline]
fn fold_char(c: char) -> char {
    if c.is_ascii() {
        c.to_ascii_lowercase()
    } else {
        CASE_FOLD.with(|f| f.get()(c))
    }
}

/// Strips leading whitespace and control characters, removes interior
/// control characters and strips trailing spaces.
pub fn normalize_whitespace(text: &mut String) {
    let start = text.len() - text.trim_start_matches(|c: char| c <= ' ').len();
    if start > 0 {
        text.drain(..start);
    }
    text.retain(|c| c >= ' ');
    text.truncate(text.trim_end_matches(' ').len());
}

/// Removes every space character.
pub fn remove_spaces(text: &mut String) {
    text.retain(|c| c != ' ');
}

/// Removes the spaces located before `selector_start`, adjusting both
/// `domains_end` and `selector_start` for the removed characters. Spaces
/// inside the selector are preserved.
pub(crate) fn collapse_leading_spaces(
    text: &mut String,
    domains_end: &mut usize,
    selector_start: &mut usize,
) {
    let mut out = String::with_capacity(text.len());
    let mut new_domains_end = *domains_end;
    let mut new_selector_start = *selector_start;
    for (pos, c) in text.char_indices() {
        if pos == *domains_end {
            new_domains_end = out.len();
        }
        if pos == *selector_start {
            new_selector_start = out.len();
        }
        if c == ' ' && pos < *selector_start {
            continue;
        }
        out.push(c);
    }
    *text = out;
    *domains_end = new_domains_end;
    *selector_start = new_selector_start;
}

/// Lower-cases the given byte range in place. Non-ASCII code points are
/// folded through the host hook and only replaced when the fold preserves
/// the encoded length, so offsets into the text stay valid.
pub(crate) fn lowercase_range(text: &mut String, start: usize, end: usize) {
    if let Some(range) = text.get_mut(start..end) {
        if range.is_ascii() {
            range.make_ascii_lowercase();
            return;
        }
    }
    let folded: String = text[start..end]
        .chars()
        .map(|c| {
            let lower = fold_char(c);
            if lower.len_utf8() == c.len_utf8() {
                lower
            } else {
                c
            }
        })
        .collect();
    text.replace_range(start..end, &folded);
}

/// Lower-cased copy of `input`, using the same fold as the in-place
/// operations so that map lookups agree with what parsing recorded.
pub(crate) fn to_lower(input: &str) -> String {
    input.chars().map(fold_char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_leading_and_trailing() {
        let mut text = String::from("  \t\nexample.com  ");
        normalize_whitespace(&mut text);
        assert_eq!(text, "example.com");
    }

    #[test]
    fn normalize_removes_interior_controls_but_keeps_spaces() {
        let mut text = String::from("exam\x01ple # ad\r\n");
        normalize_whitespace(&mut text);
        assert_eq!(text, "example # ad");
    }

    #[test]
    fn normalize_can_empty_out_control_only_input() {
        let mut text = String::from("\x01\x02\x03");
        normalize_whitespace(&mut text);
        assert!(text.is_empty());
    }

    #[test]
    fn remove_spaces_drops_every_space() {
        let mut text = String::from("| |");
        remove_spaces(&mut text);
        assert_eq!(text, "||");
    }

    #[test]
    fn collapse_adjusts_offsets() {
        let mut text = String::from("example.com , foo.com ## div p");
        let mut domains_end = 22;
        let mut selector_start = 25;
        assert_eq!(&text[domains_end..domains_end + 2], "##");
        collapse_leading_spaces(&mut text, &mut domains_end, &mut selector_start);
        assert_eq!(text, "example.com,foo.com##div p");
        assert_eq!(domains_end, 19);
        assert_eq!(selector_start, 21);
        assert_eq!(&text[selector_start..], "div p");
    }

    #[test]
    fn lowercase_range_is_ascii_only_by_default() {
        let mut text = String::from("EXAMPLE.com##AD");
        lowercase_range(&mut text, 0, 11);
        assert_eq!(text, "example.com##AD");
    }
}
