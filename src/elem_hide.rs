//! The element-hiding lookup index.
//!
//! Answers "which selectors apply to this document domain". Filters
//! without domain restrictions and without exceptions take an
//! unconditional fast path whose materialised list is cached behind a
//! `RefCell` and regenerated only after a mutation touched the
//! unconditional set; everything else fans out into per-domain buckets
//! that are walked from the most specific suffix to the empty suffix.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::filters::{Filter, FilterRef, FilterType};
use crate::utils::RandomState;

/// Which selectors a query should produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Criteria {
    /// Everything that applies to the domain.
    AllMatching,
    /// Skip the unconditional fast-path selectors.
    NoUnconditional,
    /// Only selectors from rules restricted to the queried domain.
    SpecificOnly,
}

/// An ordered list of element-hiding filters produced by a query.
#[derive(Default, Clone)]
pub struct SelectorList {
    filters: Vec<FilterRef>,
}

impl SelectorList {
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// The selector at `index`, escaped for stylesheet embedding.
    pub fn selector_at(&self, index: usize) -> Option<String> {
        self.filters.get(index).and_then(|f| f.escaped_selector())
    }

    /// The canonical text of the filter behind the selector at `index`.
    pub fn filter_key_at(&self, index: usize) -> Option<&str> {
        self.filters.get(index).map(|f| f.text())
    }

    pub fn filters(&self) -> &[FilterRef] {
        &self.filters
    }

    /// All selectors, escaped, in result order.
    pub fn selectors(&self) -> Vec<String> {
        self.filters
            .iter()
            .filter_map(|f| f.escaped_selector())
            .collect()
    }
}

type DomainBucket = HashMap<String, Option<FilterRef>, RandomState>;

#[derive(Default)]
pub struct ElemHide {
    /// Canonical text to filter, exception filters excluded.
    filters: HashMap<String, FilterRef, RandomState>,
    /// Host suffix to per-filter entry; `None` marks an exclude entry.
    filters_by_domain: HashMap<String, DomainBucket, RandomState>,
    /// Selector to exception filters, oldest first.
    exceptions: HashMap<String, Vec<FilterRef>, RandomState>,
    known_exceptions: HashSet<String, RandomState>,
    unconditional_selectors: HashMap<String, FilterRef, RandomState>,
    unconditional_selectors_cache: RefCell<Option<Rc<SelectorList>>>,
}

impl ElemHide {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.filters.clear();
        self.filters_by_domain.clear();
        self.exceptions.clear();
        self.known_exceptions.clear();
        self.unconditional_selectors.clear();
        self.unconditional_selectors_cache.replace(None);
    }

    pub fn add(&mut self, filter: &FilterRef) {
        let selector = match filter.selector() {
            Some(selector) => selector.to_string(),
            None => return,
        };
        let text = filter.text();

        if filter.filter_type() == FilterType::ELEM_HIDE_EXCEPTION {
            if self.known_exceptions.contains(text) {
                return;
            }
            self.exceptions
                .entry(selector.clone())
                .or_default()
                .push(filter.clone());

            // The selector is no longer unconditional.
            if let Some(demoted) = self.unconditional_selectors.remove(&selector) {
                self.add_to_filters_by_domain(&demoted);
                self.unconditional_selectors_cache.replace(None);
            }
            self.known_exceptions.insert(text.to_string());
        } else {
            if self.filters.contains_key(text) {
                return;
            }
            self.filters.insert(text.to_string(), filter.clone());
            if filter.domains().is_none() && !self.exceptions.contains_key(&selector) {
                self.unconditional_selectors.insert(selector, filter.clone());
                self.unconditional_selectors_cache.replace(None);
            } else {
                self.add_to_filters_by_domain(filter);
            }
        }
    }

    pub fn remove(&mut self, filter: &FilterRef) {
        let selector = match filter.selector() {
            Some(selector) => selector.to_string(),
            None => return,
        };
        let text = filter.text();

        if filter.filter_type() == FilterType::ELEM_HIDE_EXCEPTION {
            if !self.known_exceptions.contains(text) {
                return;
            }
            if let Some(list) = self.exceptions.get_mut(&selector) {
                list.retain(|entry| !Rc::ptr_eq(entry, filter));
            }
            self.known_exceptions.remove(text);
        } else {
            if !self.filters.contains_key(text) {
                return;
            }
            if self.unconditional_selectors.remove(&selector).is_some() {
                self.unconditional_selectors_cache.replace(None);
            } else {
                match filter.domains() {
                    Some(domains) => {
                        for (domain, _) in domains.iter() {
                            if let Some(bucket) = self.filters_by_domain.get_mut(domain) {
                                bucket.remove(text);
                            }
                        }
                    }
                    None => {
                        if let Some(bucket) = self.filters_by_domain.get_mut("") {
                            bucket.remove(text);
                        }
                    }
                }
            }
            self.filters.remove(text);
        }
    }

    fn add_to_filters_by_domain(&mut self, filter: &FilterRef) {
        let text = filter.text();
        match filter.domains() {
            Some(domains) => {
                for (domain, &included) in domains.iter() {
                    let entry = if included { Some(filter.clone()) } else { None };
                    self.filters_by_domain
                        .entry(domain.to_string())
                        .or_default()
                        .insert(text.to_string(), entry);
                }
            }
            None => {
                self.filters_by_domain
                    .entry(String::new())
                    .or_default()
                    .insert(text.to_string(), Some(filter.clone()));
            }
        }
    }

    /// The newest exception whose rule is active on `doc_domain` and whose
    /// selector equals the given filter's selector.
    pub fn get_exception(&self, filter: &Filter, doc_domain: &str) -> Option<FilterRef> {
        let list = self.exceptions.get(filter.selector()?)?;
        list.iter()
            .rev()
            .find(|exception| exception.is_active_on_domain(doc_domain, ""))
            .cloned()
    }

    /// The memoised list of selectors applied on every domain.
    pub fn get_unconditional_selectors(&self) -> Rc<SelectorList> {
        let mut cache = self.unconditional_selectors_cache.borrow_mut();
        cache
            .get_or_insert_with(|| {
                Rc::new(SelectorList {
                    filters: self.unconditional_selectors.values().cloned().collect(),
                })
            })
            .clone()
    }

    /// Selectors applying to `domain`. Callers pass the lower-cased
    /// document host. Result order: unconditional selectors first (for
    /// [`Criteria::AllMatching`]), then the suffix walk from the full
    /// domain towards the empty suffix.
    pub fn get_selectors_for_domain(&self, domain: &str, criteria: Criteria) -> SelectorList {
        let mut result = SelectorList::default();
        if criteria == Criteria::AllMatching {
            result
                .filters
                .extend(self.get_unconditional_selectors().filters.iter().cloned());
        }

        let specific_only = criteria == Criteria::SpecificOnly;
        let mut seen_filters: HashSet<&str, RandomState> = HashSet::default();
        let mut current_domain = domain;
        loop {
            if specific_only && current_domain.is_empty() {
                break;
            }
            if let Some(bucket) = self.filters_by_domain.get(current_domain) {
                for (text, entry) in bucket {
                    if seen_filters.contains(text.as_str()) {
                        continue;
                    }
                    seen_filters.insert(text.as_str());
                    if let Some(filter) = entry {
                        if self.get_exception(filter, domain).is_none() {
                            result.filters.push(filter.clone());
                        }
                    }
                }
            }
            if current_domain.is_empty() {
                break;
            }
            current_domain = match current_domain.find('.') {
                Some(dot) => &current_domain[dot + 1..],
                None => "",
            };
        }
        result
    }
}
