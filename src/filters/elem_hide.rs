//! Element-hiding filter rules: hiding, exceptions and emulation.
//!
//! The textual shape is `domains ## selector`, with `#@#` marking an
//! exception and `#?#` an emulation rule. The legacy
//! `[-abp-properties='…']` attribute form is rewritten into the emulation
//! syntax while the text is being canonicalised, so the interned text is
//! always the modern form.

use memchr::memchr;

use crate::filters::active::{self, ActiveFilterState};
use crate::text;

const OLD_PROPS_SELECTOR: &str = "[-abp-properties=";
const PROPS_SELECTOR: &str = ":-abp-properties(";

pub struct ElemHideData {
    pub(crate) state: ActiveFilterState,
    selector_start: u32,
}

impl ElemHideData {
    pub(crate) fn selector<'a>(&self, filter_text: &'a str) -> &'a str {
        &filter_text[self.selector_start as usize..]
    }

    pub(crate) fn is_active_on_domain(&self, doc_domain: &str, sitekey: &str) -> bool {
        active::is_active_on_domain(self.state.domains(), None, doc_domain, sitekey, true)
    }

    /// Comma-joined include domains, empty for a generic rule.
    pub(crate) fn selector_domain(&self) -> String {
        let mut result = String::new();
        if let Some(domains) = self.state.domains() {
            for (domain, &included) in domains.iter() {
                if included && !domain.is_empty() {
                    if !result.is_empty() {
                        result.push(',');
                    }
                    result.push_str(domain);
                }
            }
        }
        result
    }
}

/// Escapes `{` and `}` in CSS hex form so the selector can be embedded in
/// a stylesheet verbatim.
pub(crate) fn escape_selector(selector: &str) -> String {
    if !selector.contains(['{', '}']) {
        return selector.to_string();
    }
    let mut out = String::with_capacity(selector.len() + 8);
    for c in selector.chars() {
        match c {
            '{' => out.push_str("\\7B "),
            '}' => out.push_str("\\7D "),
            _ => out.push(c),
        }
    }
    out
}

pub(crate) enum ElemHideParse {
    /// Not an element-hiding rule at all; the next classifier decides.
    NotElemHide,
    Invalid(&'static str),
    ElemHide(ElemHideData),
    Exception(ElemHideData),
    Emulation(ElemHideData),
}

#[derive(Clone, Copy, PartialEq)]
enum Marker {
    Plain,
    Exception,
    Emulation,
}

/// Parses `text` as an element-hiding rule, normalising it in place.
pub(crate) fn parse(text: &mut String) -> ElemHideParse {
    let bytes = text.as_bytes();
    let sharp = match memchr(b'#', bytes) {
        Some(pos) => pos,
        None => return ElemHideParse::NotElemHide,
    };

    let mut seen_spaces = false;
    for &byte in &bytes[..sharp] {
        match byte {
            b'/' | b'*' | b'|' | b'@' | b'"' | b'!' => return ElemHideParse::NotElemHide,
            b' ' => seen_spaces = true,
            _ => {}
        }
    }

    let mut domains_end = sharp;
    let mut pos = sharp + 1;
    while bytes.get(pos) == Some(&b' ') {
        seen_spaces = true;
        pos += 1;
    }
    let mut marker = Marker::Plain;
    match bytes.get(pos) {
        Some(b'@') => {
            marker = Marker::Exception;
            pos += 1;
        }
        Some(b'?') => {
            marker = Marker::Emulation;
            pos += 1;
        }
        _ => {}
    }
    if marker != Marker::Plain {
        while bytes.get(pos) == Some(&b' ') {
            seen_spaces = true;
            pos += 1;
        }
    }
    if bytes.get(pos) != Some(&b'#') {
        return ElemHideParse::NotElemHide;
    }
    pos += 1;
    while bytes.get(pos) == Some(&b' ') {
        seen_spaces = true;
        pos += 1;
    }
    // The selector must not be empty.
    if pos >= text.len() {
        return ElemHideParse::NotElemHide;
    }
    let mut selector_start = pos;

    if seen_spaces {
        text::collapse_leading_spaces(text, &mut domains_end, &mut selector_start);
    }
    text::lowercase_range(text, 0, domains_end);

    if let Some(found) = text[selector_start..].find(OLD_PROPS_SELECTOR) {
        if convert_legacy_selector(text, selector_start + found).is_err() {
            return ElemHideParse::Invalid("filter_invalid_css_property");
        }
        if marker == Marker::Plain {
            text.insert(domains_end + 1, '?');
            selector_start += 1;
            marker = Marker::Emulation;
        }
    }

    let state = ActiveFilterState::default();
    let domains = if domains_end > 0 {
        Some(active::parse_domain_list(&text[..domains_end], ',', true))
    } else {
        None
    };
    let _ = state.domains.set(domains);

    let data = ElemHideData {
        state,
        selector_start: selector_start as u32,
    };
    match marker {
        Marker::Plain => ElemHideParse::ElemHide(data),
        Marker::Exception => ElemHideParse::Exception(data),
        Marker::Emulation => {
            if active::is_generic(data.state.domains(), None) {
                ElemHideParse::Invalid("filter_elemhideemulation_nodomain")
            } else {
                ElemHideParse::Emulation(data)
            }
        }
    }
}

// Rewrites `[-abp-properties=<q>value<q>]` at `at` into
// `:-abp-properties(value)`. The value must be quoted, the opening quote
// must directly follow `=` and the closing quote must directly precede
// `]`.
fn convert_legacy_selector(text: &mut String, at: usize) -> Result<(), ()> {
    let value_start = at + OLD_PROPS_SELECTOR.len();
    let quote = match text.as_bytes().get(value_start) {
        Some(&q) if q == b'\'' || q == b'"' => q,
        _ => return Err(()),
    };
    let closing = match memchr(quote, &text.as_bytes()[value_start + 1..]) {
        Some(offset) => value_start + 1 + offset,
        None => return Err(()),
    };
    if text.as_bytes().get(closing + 1) != Some(&b']') {
        return Err(());
    }

    let value = text[value_start + 1..closing].to_string();
    let mut replacement = String::with_capacity(PROPS_SELECTOR.len() + value.len() + 1);
    replacement.push_str(PROPS_SELECTOR);
    replacement.push_str(&value);
    replacement.push(')');
    text.replace_range(at..closing + 2, &replacement);
    Ok(())
}
