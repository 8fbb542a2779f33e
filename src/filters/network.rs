//! Network filter rules: request blocking and whitelisting.
//!
//! A network rule is a match pattern plus a `$`-introduced option list.
//! Parsing records substring offsets into the canonical text; the domain
//! list, the sitekey list and the compiled pattern are all materialised
//! lazily from those offsets on first use.

use std::cell::Cell;
use std::fmt;

use bitflags::bitflags;
use memchr::memchr;

use crate::filters::active::{
    self, ActiveFilterState, DomainMap, SitekeySet,
};
use crate::regex_manager::{self, RegexHandle};
use crate::text;

bitflags! {
    /// Content-type bits of the request classes a filter applies to.
    pub struct TypeMask: u32 {
        const OTHER = 0x1;
        const SCRIPT = 0x2;
        const IMAGE = 0x4;
        const STYLESHEET = 0x8;
        const OBJECT = 0x10;
        const SUBDOCUMENT = 0x20;
        const DOCUMENT = 0x40;
        const WEBSOCKET = 0x80;
        const WEBRTC = 0x100;
        const PING = 0x400;
        const XMLHTTPREQUEST = 0x800;
        const OBJECT_SUBREQUEST = 0x1000;
        const MEDIA = 0x4000;
        const FONT = 0x8000;
        const POPUP = 0x8000000;
        const GENERICBLOCK = 0x10000000;
        const GENERICHIDE = 0x20000000;
        const ELEMHIDE = 0x40000000;
    }
}

impl TypeMask {
    /// Mask applied when a rule names no content type. The classes that
    /// routinely break whole pages when matched implicitly are left out.
    pub const DEFAULT: TypeMask = TypeMask::from_bits_truncate(
        !(TypeMask::DOCUMENT.bits
            | TypeMask::ELEMHIDE.bits
            | TypeMask::POPUP.bits
            | TypeMask::GENERICBLOCK.bits
            | TypeMask::GENERICHIDE.bits),
    );
}

impl fmt::Display for TypeMask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:b}", self.bits)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriState {
    Any,
    Yes,
    No,
}

impl Default for TriState {
    fn default() -> TriState {
        TriState::Any
    }
}

#[derive(Clone, Copy, Debug)]
enum PatternState {
    /// Offsets of the raw pattern within the canonical text.
    Source(u32, u32),
    /// Handle into the regex service; the source offsets are gone.
    Compiled(RegexHandle),
    Failed,
}

#[derive(Debug)]
pub struct RegExpFilterData {
    pub(crate) state: ActiveFilterState,
    pattern: Cell<PatternState>,
    domains_source: Cell<Option<(u32, u32)>>,
    sitekeys_source: Cell<Option<(u32, u32)>>,
    content_type: TypeMask,
    match_case: bool,
    third_party: TriState,
    collapse: TriState,
}

impl RegExpFilterData {
    pub fn content_type(&self) -> TypeMask {
        self.content_type
    }

    pub fn match_case(&self) -> bool {
        self.match_case
    }

    pub fn third_party(&self) -> TriState {
        self.third_party
    }

    pub fn collapse(&self) -> TriState {
        self.collapse
    }

    pub(crate) fn domains(&self, filter_text: &str) -> Option<&DomainMap> {
        self.state
            .domains
            .get_or_init(|| {
                self.domains_source.take().map(|(start, end)| {
                    active::parse_domain_list(
                        &filter_text[start as usize..end as usize],
                        '|',
                        false,
                    )
                })
            })
            .as_ref()
    }

    pub(crate) fn sitekeys(&self, filter_text: &str) -> Option<&SitekeySet> {
        self.state
            .sitekeys
            .get_or_init(|| {
                self.sitekeys_source.take().map(|(start, end)| {
                    active::parse_sitekey_list(&filter_text[start as usize..end as usize])
                })
            })
            .as_ref()
    }

    pub(crate) fn is_active_on_domain(
        &self,
        filter_text: &str,
        doc_domain: &str,
        sitekey: &str,
    ) -> bool {
        active::is_active_on_domain(
            self.domains(filter_text),
            self.sitekeys(filter_text),
            doc_domain,
            sitekey,
            false,
        )
    }

    pub(crate) fn matches(
        &self,
        filter_text: &str,
        location: &str,
        type_mask: TypeMask,
        doc_domain: &str,
        third_party: bool,
        sitekey: &str,
    ) -> bool {
        if (self.content_type & type_mask).is_empty() {
            return false;
        }
        match self.third_party {
            TriState::Yes if !third_party => return false,
            TriState::No if third_party => return false,
            _ => {}
        }
        if !self.is_active_on_domain(filter_text, doc_domain, sitekey) {
            return false;
        }

        if let PatternState::Source(start, end) = self.pattern.get() {
            let source =
                regex_manager::to_regex(&filter_text[start as usize..end as usize]);
            let compiled =
                regex_manager::with_service(|s| s.compile(&source, !self.match_case));
            self.pattern.set(match compiled {
                Ok(handle) => PatternState::Compiled(handle),
                Err(_) => PatternState::Failed,
            });
        }
        match self.pattern.get() {
            PatternState::Compiled(handle) => {
                regex_manager::with_service(|s| s.test(handle, location))
            }
            _ => false,
        }
    }

    pub(crate) fn release_pattern(&self) {
        if let PatternState::Compiled(handle) = self.pattern.get() {
            regex_manager::release_handle(handle);
        }
    }
}

/// Parses `text` as a network rule, normalising it in place. Returns the
/// whitelist flag and the parsed data, or the reason the rule is invalid.
/// Every input yields one of those two outcomes; this parser is the final
/// classifier in the chain.
pub(crate) fn parse(text: &mut String) -> Result<(bool, RegExpFilterData), &'static str> {
    text::remove_spaces(text);

    let mut whitelist = false;
    let mut pattern_start = 0usize;
    if text.starts_with("@@") {
        whitelist = true;
        pattern_start = 2;
    }

    let pattern_end = memchr(b'$', &text.as_bytes()[pattern_start..])
        .map(|i| i + pattern_start)
        .unwrap_or(text.len());

    let mut options = ParsedOptions::default();
    if pattern_end < text.len() {
        parse_options(text, pattern_end + 1, &mut options)?;
    }
    if let Some((start, end)) = options.domains_source {
        text::lowercase_range(text, start, end);
    }

    let pattern = parse_pattern(text, pattern_start, pattern_end, options.match_case)?;

    let data = RegExpFilterData {
        state: ActiveFilterState::default(),
        pattern: Cell::new(pattern),
        domains_source: Cell::new(
            options
                .domains_source
                .map(|(start, end)| (start as u32, end as u32)),
        ),
        sitekeys_source: Cell::new(
            options
                .sitekeys_source
                .map(|(start, end)| (start as u32, end as u32)),
        ),
        content_type: options.content_type.unwrap_or(TypeMask::DEFAULT),
        match_case: options.match_case,
        third_party: options.third_party,
        collapse: options.collapse,
    };
    Ok((whitelist, data))
}

fn parse_pattern(
    text: &str,
    pattern_start: usize,
    pattern_end: usize,
    match_case: bool,
) -> Result<PatternState, &'static str> {
    let pattern = &text[pattern_start..pattern_end];
    if pattern.len() >= 2 && pattern.starts_with('/') && pattern.ends_with('/') {
        // A literal regular expression compiles up front so that malformed
        // rules surface as invalid filters instead of failing at match
        // time.
        let source = &pattern[1..pattern.len() - 1];
        if source.is_empty() {
            return Err("filter_invalid_regexp");
        }
        return match regex_manager::with_service(|s| s.compile(source, !match_case)) {
            Ok(handle) => Ok(PatternState::Compiled(handle)),
            Err(_) => Err("filter_invalid_regexp"),
        };
    }
    Ok(PatternState::Source(
        pattern_start as u32,
        pattern_end as u32,
    ))
}

#[derive(Default)]
struct ParsedOptions {
    content_type: Option<TypeMask>,
    match_case: bool,
    third_party: TriState,
    collapse: TriState,
    domains_source: Option<(usize, usize)>,
    sitekeys_source: Option<(usize, usize)>,
}

fn parse_options(
    text: &str,
    options_start: usize,
    options: &mut ParsedOptions,
) -> Result<(), &'static str> {
    let bytes = text.as_bytes();
    let mut segment_start = options_start;
    loop {
        let segment_end = memchr(b',', &bytes[segment_start..])
            .map(|i| i + segment_start)
            .unwrap_or(text.len());
        parse_option(text, segment_start, segment_end, options)?;
        if segment_end == text.len() {
            return Ok(());
        }
        segment_start = segment_end + 1;
    }
}

fn parse_option(
    text: &str,
    start: usize,
    end: usize,
    options: &mut ParsedOptions,
) -> Result<(), &'static str> {
    if end <= start {
        return Ok(());
    }

    let (negated, name_start) = if text.as_bytes()[start] == b'~' {
        (true, start + 1)
    } else {
        (false, start)
    };
    let (name_end, value) = match memchr(b'=', &text.as_bytes()[name_start..end]) {
        Some(i) => (name_start + i, (name_start + i + 1, end)),
        None => (end, (end, end)),
    };
    if name_end <= name_start {
        return Ok(());
    }

    let name: String = text[name_start..name_end]
        .chars()
        .map(|c| if c == '_' { '-' } else { c.to_ascii_lowercase() })
        .collect();

    if let Some(bits) = content_type_for(&name) {
        let mask = options.content_type.get_or_insert(if negated {
            TypeMask::DEFAULT
        } else {
            TypeMask::empty()
        });
        if negated {
            mask.remove(bits);
        } else {
            mask.insert(bits);
        }
        return Ok(());
    }

    match name.as_str() {
        "domain" => {
            if value.1 > value.0 {
                options.domains_source = Some(value);
            }
        }
        "sitekey" => {
            if value.1 > value.0 {
                options.sitekeys_source = Some(value);
            }
        }
        "match-case" => options.match_case = !negated,
        "third-party" => {
            options.third_party = if negated { TriState::No } else { TriState::Yes }
        }
        "collapse" => {
            options.collapse = if negated { TriState::No } else { TriState::Yes }
        }
        _ => return Err("filter_unknown_option"),
    }
    Ok(())
}

fn content_type_for(name: &str) -> Option<TypeMask> {
    let bits = match name {
        "other" => TypeMask::OTHER,
        "xbl" => TypeMask::OTHER,
        "dtd" => TypeMask::OTHER,
        "script" => TypeMask::SCRIPT,
        "image" => TypeMask::IMAGE,
        "background" => TypeMask::IMAGE,
        "stylesheet" => TypeMask::STYLESHEET,
        "object" => TypeMask::OBJECT,
        "subdocument" => TypeMask::SUBDOCUMENT,
        "document" => TypeMask::DOCUMENT,
        "websocket" => TypeMask::WEBSOCKET,
        "webrtc" => TypeMask::WEBRTC,
        "ping" => TypeMask::PING,
        "xmlhttprequest" => TypeMask::XMLHTTPREQUEST,
        "object-subrequest" => TypeMask::OBJECT_SUBREQUEST,
        "media" => TypeMask::MEDIA,
        "font" => TypeMask::FONT,
        "popup" => TypeMask::POPUP,
        "genericblock" => TypeMask::GENERICBLOCK,
        "generichide" => TypeMask::GENERICHIDE,
        "elemhide" => TypeMask::ELEMHIDE,
        _ => return None,
    };
    Some(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> (bool, RegExpFilterData, String) {
        let mut text = String::from(input);
        let (whitelist, data) = parse(&mut text).expect("filter should parse");
        (whitelist, data, text)
    }

    fn parse_err(input: &str) -> &'static str {
        let mut text = String::from(input);
        parse(&mut text).expect_err("filter should be invalid")
    }

    /// A comparison-friendly summary of the parsed options.
    #[derive(Debug, PartialEq)]
    struct NetworkFilterBreakdown {
        whitelist: bool,
        content_type: TypeMask,
        match_case: bool,
        third_party: TriState,
        collapse: TriState,
        has_domains: bool,
        has_sitekeys: bool,
    }

    impl NetworkFilterBreakdown {
        fn of(input: &str) -> NetworkFilterBreakdown {
            let (whitelist, data, text) = parse_ok(input);
            NetworkFilterBreakdown {
                whitelist,
                content_type: data.content_type(),
                match_case: data.match_case(),
                third_party: data.third_party(),
                collapse: data.collapse(),
                has_domains: data.domains(&text).is_some(),
                has_sitekeys: data.sitekeys(&text).is_some(),
            }
        }
    }

    impl Default for NetworkFilterBreakdown {
        fn default() -> NetworkFilterBreakdown {
            NetworkFilterBreakdown {
                whitelist: false,
                content_type: TypeMask::DEFAULT,
                match_case: false,
                third_party: TriState::Any,
                collapse: TriState::Any,
                has_domains: false,
                has_sitekeys: false,
            }
        }
    }

    #[test]
    fn plain_pattern_gets_defaults() {
        assert_eq!(
            NetworkFilterBreakdown::of("example.com/banner"),
            NetworkFilterBreakdown::default()
        );
    }

    #[test]
    fn whitelist_prefix_is_recognised() {
        assert_eq!(
            NetworkFilterBreakdown::of("@@||example.com^"),
            NetworkFilterBreakdown {
                whitelist: true,
                ..Default::default()
            }
        );
    }

    #[test]
    fn first_positive_type_resets_the_mask() {
        assert_eq!(
            NetworkFilterBreakdown::of("||example.com^$script"),
            NetworkFilterBreakdown {
                content_type: TypeMask::SCRIPT,
                ..Default::default()
            }
        );
        assert_eq!(
            NetworkFilterBreakdown::of("||example.com^$script,image"),
            NetworkFilterBreakdown {
                content_type: TypeMask::SCRIPT | TypeMask::IMAGE,
                ..Default::default()
            }
        );
    }

    #[test]
    fn first_negated_type_starts_from_the_default_mask() {
        assert_eq!(
            NetworkFilterBreakdown::of("||example.com^$~script"),
            NetworkFilterBreakdown {
                content_type: TypeMask::DEFAULT - TypeMask::SCRIPT,
                ..Default::default()
            }
        );
    }

    #[test]
    fn backwards_compatible_type_names_map_to_modern_bits() {
        assert_eq!(
            NetworkFilterBreakdown::of("ads$xbl,dtd,background"),
            NetworkFilterBreakdown {
                content_type: TypeMask::OTHER | TypeMask::IMAGE,
                ..Default::default()
            }
        );
    }

    #[test]
    fn option_names_are_case_and_underscore_insensitive() {
        assert_eq!(
            NetworkFilterBreakdown::of("ads$Match_Case,THIRD_PARTY"),
            NetworkFilterBreakdown {
                match_case: true,
                third_party: TriState::Yes,
                ..Default::default()
            }
        );
    }

    #[test]
    fn tri_state_options() {
        assert_eq!(
            NetworkFilterBreakdown::of("ads$~third-party,collapse"),
            NetworkFilterBreakdown {
                third_party: TriState::No,
                collapse: TriState::Yes,
                ..Default::default()
            }
        );
        assert_eq!(
            NetworkFilterBreakdown::of("ads$~collapse"),
            NetworkFilterBreakdown {
                collapse: TriState::No,
                ..Default::default()
            }
        );
    }

    #[test]
    fn unknown_options_are_invalid() {
        assert_eq!(parse_err("ads$foobar"), "filter_unknown_option");
        assert_eq!(parse_err("ads$script,foobar"), "filter_unknown_option");
    }

    #[test]
    fn domain_option_is_lowercased_in_place() {
        let (_, data, text) = parse_ok("ads$domain=Example.COM|~Sub.Example.COM");
        assert_eq!(text, "ads$domain=example.com|~sub.example.com");
        let domains = data.domains(&text).unwrap();
        assert_eq!(domains.get("example.com"), Some(&true));
        assert_eq!(domains.get("sub.example.com"), Some(&false));
        assert_eq!(domains.get(""), Some(&false));
    }

    #[test]
    fn sitekeys_are_split_on_pipes() {
        let (_, data, text) = parse_ok("ads$sitekey=KEY1|KEY2");
        let sitekeys = data.sitekeys(&text).unwrap();
        assert!(sitekeys.contains("KEY1"));
        assert!(sitekeys.contains("KEY2"));
        assert!(!sitekeys.contains("key1"));
    }

    #[test]
    fn spaces_are_stripped_before_parsing() {
        let (_, _, text) = parse_ok("| |");
        assert_eq!(text, "||");
    }

    #[test]
    fn literal_regex_rules() {
        let (_, data, text) = parse_ok("/ad[0-9]+\\./");
        assert!(data.matches(&text, "https://x.com/ad123.png", TypeMask::IMAGE, "", false, ""));
        assert!(!data.matches(&text, "https://x.com/ad.png", TypeMask::IMAGE, "", false, ""));
    }

    #[test]
    fn malformed_or_empty_literal_regex_is_invalid() {
        assert_eq!(parse_err("/ad(/"), "filter_invalid_regexp");
        assert_eq!(parse_err("//"), "filter_invalid_regexp");
    }

    #[test]
    fn matches_respects_the_type_mask() {
        let (_, data, text) = parse_ok("||example.com^$script");
        let location = "https://cdn.example.com/lib.js";
        assert!(data.matches(&text, location, TypeMask::SCRIPT, "", false, ""));
        assert!(!data.matches(&text, location, TypeMask::IMAGE, "", false, ""));
        // Widening the mask can only turn a non-match into a match.
        assert!(data.matches(
            &text,
            location,
            TypeMask::IMAGE | TypeMask::SCRIPT,
            "",
            false,
            ""
        ));
    }

    #[test]
    fn matches_respects_third_party_constraints() {
        let (_, data, text) = parse_ok("ads$third-party");
        assert!(data.matches(&text, "https://x.com/ads", TypeMask::SCRIPT, "", true, ""));
        assert!(!data.matches(&text, "https://x.com/ads", TypeMask::SCRIPT, "", false, ""));

        let (_, data, text) = parse_ok("ads$~third-party");
        assert!(!data.matches(&text, "https://x.com/ads", TypeMask::SCRIPT, "", true, ""));
        assert!(data.matches(&text, "https://x.com/ads", TypeMask::SCRIPT, "", false, ""));
    }

    #[test]
    fn matches_is_case_insensitive_unless_requested() {
        let (_, data, text) = parse_ok("/banner/");
        assert!(data.matches(&text, "https://x.com/BANNER/1", TypeMask::IMAGE, "", false, ""));

        let (_, data, text) = parse_ok("banner$match-case");
        assert!(!data.matches(&text, "https://x.com/BANNER/1", TypeMask::IMAGE, "", false, ""));
        assert!(data.matches(&text, "https://x.com/banner/1", TypeMask::IMAGE, "", false, ""));
    }

    #[test]
    fn hostname_anchor_matches_subdomains() {
        let (_, data, text) = parse_ok("||example.com^");
        assert!(data.matches(
            &text,
            "https://sub.example.com/x",
            TypeMask::SCRIPT,
            "",
            false,
            ""
        ));
        assert!(!data.matches(
            &text,
            "https://example.org/x",
            TypeMask::SCRIPT,
            "",
            false,
            ""
        ));
    }

    #[test]
    fn domain_restrictions_gate_matching() {
        let (_, data, text) = parse_ok("||example.com^$script,domain=a.com|~b.a.com");
        let location = "https://ads.example.com/lib.js";
        assert!(data.matches(&text, location, TypeMask::SCRIPT, "x.a.com", false, ""));
        assert!(!data.matches(&text, location, TypeMask::SCRIPT, "b.a.com", false, ""));
        assert!(!data.matches(&text, location, TypeMask::SCRIPT, "other.com", false, ""));
    }
}
