//! The regular-expression service backing network filter matching.
//!
//! Filters never hold a compiled regex directly; they hold an opaque
//! [`RegexHandle`] into whatever [`RegexService`] the host installed.
//! Compiled patterns therefore live in one external pool that can be
//! swapped out, instrumented or discarded wholesale without touching the
//! filters themselves. Non thread safe, like the rest of the engine.

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::utils::RandomState;

/// Opaque identifier of a compiled pattern inside a [`RegexService`].
pub type RegexHandle = u64;

#[derive(Debug, Error)]
pub enum RegexError {
    #[error("pattern failed to compile: {0}")]
    Compile(#[from] regex::Error),
}

/// The contract between the engine and its regular-expression executor:
/// compile a pattern into a handle, test a handle against text, release a
/// handle when its filter goes away.
pub trait RegexService {
    fn compile(&mut self, pattern: &str, case_insensitive: bool)
        -> Result<RegexHandle, RegexError>;
    fn test(&mut self, handle: RegexHandle, text: &str) -> bool;
    fn release(&mut self, handle: RegexHandle);
}

// The regex crate has no lookaround, so the default service drops
// lookaround groups before compiling. For the anchors generated by
// `to_regex` this is behaviourally equivalent; hosts that need exact
// ECMAScript semantics install their own service.
static LOOK_AROUND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\?(?:=|!|<=|<!)((?:[^()]|\([^()]*\))*)\)").unwrap());

fn strip_lookaround(pattern: &str) -> Cow<str> {
    LOOK_AROUND.replace_all(pattern, "")
}

/// Default [`RegexService`] over the `regex` crate. Keeps every compiled
/// pattern in a handle-keyed map along with a running compile count.
pub struct RegexManager {
    map: HashMap<RegexHandle, Regex, RandomState>,
    next_handle: RegexHandle,
    compiled_regex_count: u64,
}

impl Default for RegexManager {
    fn default() -> RegexManager {
        RegexManager {
            map: HashMap::default(),
            next_handle: 0,
            compiled_regex_count: 0,
        }
    }
}

impl RegexManager {
    pub fn get_compiled_regex_count(&self) -> u64 {
        self.compiled_regex_count
    }
}

impl RegexService for RegexManager {
    fn compile(
        &mut self,
        pattern: &str,
        case_insensitive: bool,
    ) -> Result<RegexHandle, RegexError> {
        let stripped = strip_lookaround(pattern);
        let source = if case_insensitive {
            format!("(?i){}", stripped)
        } else {
            stripped.into_owned()
        };
        let regex = Regex::new(&source)?;
        self.next_handle += 1;
        self.compiled_regex_count += 1;
        self.map.insert(self.next_handle, regex);
        Ok(self.next_handle)
    }

    fn test(&mut self, handle: RegexHandle, text: &str) -> bool {
        self.map.get(&handle).map_or(false, |regex| regex.is_match(text))
    }

    fn release(&mut self, handle: RegexHandle) {
        self.map.remove(&handle);
    }
}

thread_local! {
    static SERVICE: RefCell<Box<dyn RegexService>> =
        RefCell::new(Box::<RegexManager>::default());
}

/// Replaces the active regular-expression service. Handles issued by the
/// previous service are forgotten with it.
pub fn set_regex_service(service: Box<dyn RegexService>) {
    SERVICE.with(|slot| *slot.borrow_mut() = service);
}

pub(crate) fn with_service<R>(f: impl FnOnce(&mut dyn RegexService) -> R) -> R {
    SERVICE.with(|slot| f(slot.borrow_mut().as_mut()))
}

// Filters release their handle on drop, which can run during thread
// teardown after the service slot is gone.
pub(crate) fn release_handle(handle: RegexHandle) {
    let _ = SERVICE.try_with(|slot| slot.borrow_mut().release(handle));
}

const SEPARATOR_CLASS: &str = r"(?:[\x00-\x24\x26-\x2C\x2F\x3A-\x40\x5B-\x5E\x60\x7B-\x7F]|$)";
const EXTENDED_ANCHOR: &str = r"^[\w\-]+:\/+(?!\/)(?:[^\/]+\.)?";

/// Converts filter shorthand into a regular expression source string.
///
/// `*` becomes `.*`, `^` becomes the separator class, `|` anchors at the
/// pattern edges and is escaped elsewhere, and every other ASCII character
/// that is not a letter or digit is escaped. Trailing wildcards are not
/// trimmed; the result matches the shorthand exactly as written.
pub fn to_regex(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut result = String::with_capacity(source.len() * 2);
    let mut prev_char = '*';
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' => {
                if prev_char != '*' {
                    result.push_str(".*");
                }
            }
            '^' => result.push_str(SEPARATOR_CLASS),
            '|' if i == 0 => {
                if chars.len() > 1 && chars[1] == '|' {
                    result.push_str(EXTENDED_ANCHOR);
                    i += 1;
                } else {
                    result.push('^');
                }
            }
            '|' if i == chars.len() - 1 => {
                // Anchor at the end, unless it follows a separator
                // placeholder which already matches the end.
                if prev_char != '^' {
                    result.push('$');
                }
            }
            '|' => result.push_str("\\|"),
            _ => {
                if !c.is_ascii_alphanumeric() && c.is_ascii() {
                    result.push('\\');
                }
                result.push(c);
            }
        }
        prev_char = c;
        i += 1;
    }
    result
}
