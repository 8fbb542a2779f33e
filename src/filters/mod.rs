//! Representations and standalone behaviours of individual filter rules.
//!
//! A [`Filter`] is a canonical text plus the data parsed out of it.
//! Filters are interned: parsing the same canonical text twice yields the
//! same reference-counted value, and dropping the last reference removes
//! the entry again. The canonical text never changes after interning, so
//! the substring offsets recorded by the parsers stay valid for the whole
//! lifetime of the filter.

pub(crate) mod active;
pub mod elem_hide;
pub mod network;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use bitflags::bitflags;

use crate::containers::StringMap;
use crate::filters::active::{DomainMap, SitekeySet};
use crate::filters::elem_hide::{ElemHideData, ElemHideParse};
use crate::filters::network::{RegExpFilterData, TypeMask};
use crate::notifier::{self, Topic};
use crate::text;

pub type FilterRef = Rc<Filter>;

bitflags! {
    /// Type tags arranged so that "is a" checks on the hierarchy reduce to
    /// mask tests: every concrete tag contains the bits of its ancestors.
    pub struct FilterType: u32 {
        const INVALID = 1;
        const COMMENT = 2;
        const ACTIVE = 4;
        const REGEXP = Self::ACTIVE.bits | 8;
        const BLOCKING = Self::REGEXP.bits | 16;
        const WHITELIST = Self::REGEXP.bits | 32;
        const ELEM_HIDE_BASE = Self::ACTIVE.bits | 64;
        const ELEM_HIDE = Self::ELEM_HIDE_BASE.bits | 128;
        const ELEM_HIDE_EXCEPTION = Self::ELEM_HIDE_BASE.bits | 256;
        const ELEM_HIDE_EMULATION = Self::ELEM_HIDE_BASE.bits | 512;
    }
}

pub enum FilterKind {
    Comment,
    Invalid { reason: &'static str },
    Blocking(RegExpFilterData),
    Whitelist(RegExpFilterData),
    ElemHide(ElemHideData),
    ElemHideException(ElemHideData),
    ElemHideEmulation(ElemHideData),
}

pub struct Filter {
    text: String,
    kind: FilterKind,
}

thread_local! {
    static KNOWN_FILTERS: RefCell<StringMap<Weak<Filter>>> =
        RefCell::new(StringMap::with_capacity(1024));
}

impl Filter {
    /// Parses `text` into a filter, normalising and canonicalising it
    /// first. Returns `None` for text that is empty after normalisation
    /// or too long to index. Two calls with texts that canonicalise the
    /// same return the same instance.
    pub fn from_text(text: &str) -> Option<FilterRef> {
        let mut text = text.to_owned();
        text::normalize_whitespace(&mut text);
        if text.is_empty() || text.len() > text::MAX_TEXT_LENGTH {
            return None;
        }
        let kind = classify(&mut text);
        Some(Self::intern(text, kind))
    }

    fn intern(text: String, kind: FilterKind) -> FilterRef {
        KNOWN_FILTERS.with(|known| {
            if let Some(existing) = known.borrow().get(&text).and_then(Weak::upgrade) {
                return existing;
            }
            let filter = Rc::new(Filter { text, kind });
            known
                .borrow_mut()
                .insert(filter.text.clone(), Rc::downgrade(&filter));
            filter
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }

    pub fn filter_type(&self) -> FilterType {
        match self.kind {
            FilterKind::Comment => FilterType::COMMENT,
            FilterKind::Invalid { .. } => FilterType::INVALID,
            FilterKind::Blocking(_) => FilterType::BLOCKING,
            FilterKind::Whitelist(_) => FilterType::WHITELIST,
            FilterKind::ElemHide(_) => FilterType::ELEM_HIDE,
            FilterKind::ElemHideException(_) => FilterType::ELEM_HIDE_EXCEPTION,
            FilterKind::ElemHideEmulation(_) => FilterType::ELEM_HIDE_EMULATION,
        }
    }

    /// Reason token for invalid filters, `None` otherwise.
    pub fn reason(&self) -> Option<&'static str> {
        match self.kind {
            FilterKind::Invalid { reason } => Some(reason),
            _ => None,
        }
    }

    fn active_state(&self) -> Option<&active::ActiveFilterState> {
        match &self.kind {
            FilterKind::Blocking(data) | FilterKind::Whitelist(data) => Some(&data.state),
            FilterKind::ElemHide(data)
            | FilterKind::ElemHideException(data)
            | FilterKind::ElemHideEmulation(data) => Some(&data.state),
            _ => None,
        }
    }

    pub fn disabled(&self) -> bool {
        self.active_state().map_or(false, |state| state.disabled.get())
    }

    pub fn set_disabled(&self, value: bool) {
        if let Some(state) = self.active_state() {
            if state.disabled.get() != value {
                state.disabled.set(value);
                notifier::filter_change(Topic::FilterDisabled, self, None, None);
            }
        }
    }

    pub fn hit_count(&self) -> u32 {
        self.active_state().map_or(0, |state| state.hit_count.get())
    }

    pub fn set_hit_count(&self, value: u32) {
        if let Some(state) = self.active_state() {
            if state.hit_count.get() != value {
                state.hit_count.set(value);
                notifier::filter_change(Topic::FilterHitCount, self, None, None);
            }
        }
    }

    pub fn last_hit(&self) -> u64 {
        self.active_state().map_or(0, |state| state.last_hit.get())
    }

    pub fn set_last_hit(&self, value: u64) {
        if let Some(state) = self.active_state() {
            if state.last_hit.get() != value {
                state.last_hit.set(value);
                notifier::filter_change(Topic::FilterLastHit, self, None, None);
            }
        }
    }

    /// The parsed domain restrictions, if the filter has any.
    pub(crate) fn domains(&self) -> Option<&DomainMap> {
        match &self.kind {
            FilterKind::Blocking(data) | FilterKind::Whitelist(data) => {
                data.domains(&self.text)
            }
            FilterKind::ElemHide(data)
            | FilterKind::ElemHideException(data)
            | FilterKind::ElemHideEmulation(data) => data.state.domains(),
            _ => None,
        }
    }

    pub(crate) fn sitekeys(&self) -> Option<&SitekeySet> {
        match &self.kind {
            FilterKind::Blocking(data) | FilterKind::Whitelist(data) => {
                data.sitekeys(&self.text)
            }
            _ => None,
        }
    }

    pub fn is_active_on_domain(&self, doc_domain: &str, sitekey: &str) -> bool {
        match &self.kind {
            FilterKind::Blocking(data) | FilterKind::Whitelist(data) => {
                data.is_active_on_domain(&self.text, doc_domain, sitekey)
            }
            FilterKind::ElemHide(data)
            | FilterKind::ElemHideException(data)
            | FilterKind::ElemHideEmulation(data) => {
                data.is_active_on_domain(doc_domain, sitekey)
            }
            _ => false,
        }
    }

    pub fn is_active_only_on_domain(&self, doc_domain: &str) -> bool {
        let ignore_trailing_dot = self
            .filter_type()
            .contains(FilterType::ELEM_HIDE_BASE);
        self.filter_type().contains(FilterType::ACTIVE)
            && active::is_active_only_on_domain(self.domains(), doc_domain, ignore_trailing_dot)
    }

    pub fn is_generic(&self) -> bool {
        active::is_generic(self.domains(), self.sitekeys())
    }

    /// Network matching: does this rule apply to a request for `location`
    /// of the given content classes, loaded by `doc_domain`?
    pub fn matches(
        &self,
        location: &str,
        type_mask: TypeMask,
        doc_domain: &str,
        third_party: bool,
        sitekey: &str,
    ) -> bool {
        match &self.kind {
            FilterKind::Blocking(data) | FilterKind::Whitelist(data) => data.matches(
                &self.text,
                location,
                type_mask,
                doc_domain,
                third_party,
                sitekey,
            ),
            _ => false,
        }
    }

    /// The raw CSS selector of an element-hiding rule.
    pub fn selector(&self) -> Option<&str> {
        match &self.kind {
            FilterKind::ElemHide(data)
            | FilterKind::ElemHideException(data)
            | FilterKind::ElemHideEmulation(data) => Some(data.selector(&self.text)),
            _ => None,
        }
    }

    /// The selector with `{`/`}` hex-escaped for stylesheet embedding.
    pub fn escaped_selector(&self) -> Option<String> {
        self.selector().map(elem_hide::escape_selector)
    }

    /// Comma-joined include domains of an element-hiding rule.
    pub fn selector_domain(&self) -> Option<String> {
        match &self.kind {
            FilterKind::ElemHide(data)
            | FilterKind::ElemHideException(data)
            | FilterKind::ElemHideEmulation(data) => Some(data.selector_domain()),
            _ => None,
        }
    }
}

impl Drop for Filter {
    fn drop(&mut self) {
        let _ = KNOWN_FILTERS.try_with(|known| {
            known.borrow_mut().remove(&self.text);
        });
        if let FilterKind::Blocking(data) | FilterKind::Whitelist(data) = &self.kind {
            data.release_pattern();
        }
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("text", &self.text)
            .field("type", &self.filter_type())
            .finish()
    }
}

fn classify(text: &mut String) -> FilterKind {
    if text.starts_with('!') {
        return FilterKind::Comment;
    }
    match elem_hide::parse(text) {
        ElemHideParse::NotElemHide => {}
        ElemHideParse::Invalid(reason) => return FilterKind::Invalid { reason },
        ElemHideParse::ElemHide(data) => return FilterKind::ElemHide(data),
        ElemHideParse::Exception(data) => return FilterKind::ElemHideException(data),
        ElemHideParse::Emulation(data) => return FilterKind::ElemHideEmulation(data),
    }
    match network::parse(text) {
        Ok((false, data)) => FilterKind::Blocking(data),
        Ok((true, data)) => FilterKind::Whitelist(data),
        Err(reason) => FilterKind::Invalid { reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tags_contain_their_ancestors() {
        assert!(FilterType::BLOCKING.contains(FilterType::REGEXP));
        assert!(FilterType::BLOCKING.contains(FilterType::ACTIVE));
        assert!(FilterType::WHITELIST.contains(FilterType::REGEXP));
        assert!(FilterType::ELEM_HIDE.contains(FilterType::ELEM_HIDE_BASE));
        assert!(FilterType::ELEM_HIDE_EXCEPTION.contains(FilterType::ELEM_HIDE_BASE));
        assert!(FilterType::ELEM_HIDE_EMULATION.contains(FilterType::ELEM_HIDE_BASE));
        assert!(!FilterType::COMMENT.contains(FilterType::ACTIVE));
        assert!(!FilterType::ELEM_HIDE.contains(FilterType::REGEXP));
    }

    #[test]
    fn comments_keep_their_text() {
        let filter = Filter::from_text("!comment").unwrap();
        assert_eq!(filter.filter_type(), FilterType::COMMENT);
        assert_eq!(filter.text(), "!comment");
        assert!(!filter.is_active_on_domain("example.com", ""));
    }

    #[test]
    fn empty_or_control_only_text_produces_nothing() {
        assert!(Filter::from_text("").is_none());
        assert!(Filter::from_text("   \t  ").is_none());
        assert!(Filter::from_text("\x01\x02").is_none());
    }

    #[test]
    fn from_text_interns_by_canonical_text() {
        let a = Filter::from_text("||example.com^$script").unwrap();
        let b = Filter::from_text("||example.com^$script").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        // Spaces vanish during canonicalisation, so this is the same rule.
        let c = Filter::from_text("|| example.com^ $script").unwrap();
        assert!(Rc::ptr_eq(&a, &c));
        // Parsing the canonical text round-trips to the same instance.
        let d = Filter::from_text(a.text()).unwrap();
        assert!(Rc::ptr_eq(&a, &d));
    }

    #[test]
    fn dropping_the_last_reference_deregisters_the_text() {
        let text;
        {
            let filter = Filter::from_text("||intern-check.example^").unwrap();
            text = filter.text().to_string();
            assert!(KNOWN_FILTERS.with(|known| known.borrow().contains_key(&text)));
        }
        assert!(!KNOWN_FILTERS.with(|known| known.borrow().contains_key(&text)));
    }

    #[test]
    fn classification_covers_every_variant() {
        let cases = [
            ("!x", FilterType::COMMENT),
            ("example.com/ads", FilterType::BLOCKING),
            ("@@example.com/ads", FilterType::WHITELIST),
            ("##.ad", FilterType::ELEM_HIDE),
            ("example.com#@#.ad", FilterType::ELEM_HIDE_EXCEPTION),
            ("example.com#?#.ad", FilterType::ELEM_HIDE_EMULATION),
            ("ads$bogus-option", FilterType::INVALID),
        ];
        for (text, expected) in cases {
            let filter = Filter::from_text(text).unwrap();
            assert_eq!(filter.filter_type(), expected, "{:?}", text);
        }
    }

    #[test]
    fn invalid_filters_carry_their_reason() {
        let filter = Filter::from_text("ads$bogus-option").unwrap();
        assert_eq!(filter.reason(), Some("filter_unknown_option"));
        let filter = Filter::from_text("/foo(/").unwrap();
        assert_eq!(filter.reason(), Some("filter_invalid_regexp"));
        let filter = Filter::from_text("#?#.ad").unwrap();
        assert_eq!(filter.reason(), Some("filter_elemhideemulation_nodomain"));
    }

    #[test]
    fn pipe_space_pipe_is_a_blocking_rule() {
        let filter = Filter::from_text("| |").unwrap();
        assert_eq!(filter.filter_type(), FilterType::BLOCKING);
        assert_eq!(filter.text(), "||");
    }

    #[test]
    fn counters_notify_only_on_change() {
        use std::cell::RefCell as StdRefCell;

        #[derive(Default)]
        struct Recorder {
            topics: StdRefCell<Vec<Topic>>,
        }
        impl crate::notifier::NotificationSink for Recorder {
            fn filter_change(
                &self,
                topic: Topic,
                _filter: &Filter,
                _subscription: Option<&crate::subscriptions::Subscription>,
                _position: Option<usize>,
            ) {
                self.topics.borrow_mut().push(topic);
            }
        }

        let recorder = Rc::new(Recorder::default());
        crate::notifier::set_notification_sink(Some(recorder.clone()));

        let filter = Filter::from_text("||counter.example^").unwrap();
        filter.set_hit_count(1);
        filter.set_hit_count(1);
        filter.set_last_hit(1234);
        filter.set_disabled(true);
        filter.set_disabled(true);
        assert_eq!(
            *recorder.topics.borrow(),
            vec![Topic::FilterHitCount, Topic::FilterLastHit, Topic::FilterDisabled]
        );

        crate::notifier::set_notification_sink(None);
    }

    #[test]
    fn generic_and_domain_specific_filters() {
        let generic = Filter::from_text("##.ad").unwrap();
        assert!(generic.is_generic());
        assert!(!generic.is_active_only_on_domain("example.com"));

        let specific = Filter::from_text("example.com##.ad").unwrap();
        assert!(!specific.is_generic());
        assert!(specific.is_active_only_on_domain("example.com"));
        assert!(!specific.is_active_only_on_domain("other.com"));

        let sitekey = Filter::from_text("ads$sitekey=ABC").unwrap();
        assert!(!sitekey.is_generic());
    }
}
