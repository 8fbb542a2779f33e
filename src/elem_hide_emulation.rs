//! The emulation-rule index: a flat text-keyed map queried per domain.

use std::collections::HashMap;

use crate::elem_hide::ElemHide;
use crate::filters::FilterRef;
use crate::utils::RandomState;

#[derive(Default)]
pub struct ElemHideEmulation {
    filters: HashMap<String, FilterRef, RandomState>,
}

impl ElemHideEmulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, filter: &FilterRef) {
        self.filters.insert(filter.text().to_string(), filter.clone());
    }

    pub fn remove(&mut self, filter: &FilterRef) {
        self.filters.remove(filter.text());
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }

    /// Every emulation rule active on `doc_domain` that is not overridden
    /// by a selector exception in the main index.
    pub fn get_rules_for_domain(&self, elem_hide: &ElemHide, doc_domain: &str) -> Vec<FilterRef> {
        self.filters
            .values()
            .filter(|filter| {
                filter.is_active_on_domain(doc_domain, "")
                    && elem_hide.get_exception(filter, doc_domain).is_none()
            })
            .cloned()
            .collect()
    }
}
