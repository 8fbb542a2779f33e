//! Activation state shared by every filter that can match at runtime:
//! the domain restriction map, the sitekey set and the mutable hit
//! counters.

use std::cell::Cell;

use once_cell::unsync::OnceCell;

use crate::containers::{StringMap, StringSet};
use crate::text;

/// Host suffix to include/exclude verdict. The empty key holds the default
/// verdict used when no suffix matches: exclude as soon as at least one
/// include is listed, include otherwise.
pub type DomainMap = StringMap<bool>;

pub type SitekeySet = StringSet;

#[derive(Default, Debug)]
pub(crate) struct ActiveFilterState {
    pub(crate) disabled: Cell<bool>,
    pub(crate) hit_count: Cell<u32>,
    pub(crate) last_hit: Cell<u64>,
    pub(crate) domains: OnceCell<Option<DomainMap>>,
    pub(crate) sitekeys: OnceCell<Option<SitekeySet>>,
}

impl ActiveFilterState {
    pub(crate) fn domains(&self) -> Option<&DomainMap> {
        self.domains.get().and_then(Option::as_ref)
    }

    pub(crate) fn sitekeys(&self) -> Option<&SitekeySet> {
        self.sitekeys.get().and_then(Option::as_ref)
    }
}

pub(crate) fn parse_domain_list(
    source: &str,
    separator: char,
    ignore_trailing_dot: bool,
) -> DomainMap {
    let mut map = DomainMap::with_capacity(4);
    let mut has_includes = false;
    for entry in source.split(separator) {
        let (reverse, domain) = match entry.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, entry),
        };
        let domain = if ignore_trailing_dot {
            domain.strip_suffix('.').unwrap_or(domain)
        } else {
            domain
        };
        if domain.is_empty() {
            continue;
        }
        map.insert(domain.to_string(), !reverse);
        if !reverse {
            has_includes = true;
        }
    }
    map.insert(String::new(), !has_includes);
    map
}

pub(crate) fn parse_sitekey_list(source: &str) -> SitekeySet {
    let mut set = SitekeySet::new();
    for key in source.split('|') {
        if !key.is_empty() {
            set.insert(key.to_string());
        }
    }
    set
}

fn default_verdict(domains: &DomainMap) -> bool {
    domains.get("").copied().unwrap_or(true)
}

pub(crate) fn is_active_on_domain(
    domains: Option<&DomainMap>,
    sitekeys: Option<&SitekeySet>,
    doc_domain: &str,
    sitekey: &str,
    ignore_trailing_dot: bool,
) -> bool {
    if let Some(keys) = sitekeys {
        if !keys.contains(sitekey) {
            return false;
        }
    }

    // No domain restrictions: the rule matches everywhere.
    let domains = match domains {
        Some(domains) => domains,
        None => return true,
    };

    if doc_domain.is_empty() {
        return default_verdict(domains);
    }

    let lowered = text::to_lower(doc_domain);
    let mut current: &str = &lowered;
    if ignore_trailing_dot {
        current = current.strip_suffix('.').unwrap_or(current);
    }
    loop {
        if let Some(&included) = domains.get(current) {
            return included;
        }
        match current.find('.') {
            Some(dot) => current = &current[dot + 1..],
            None => break,
        }
    }
    default_verdict(domains)
}

pub(crate) fn is_active_only_on_domain(
    domains: Option<&DomainMap>,
    doc_domain: &str,
    ignore_trailing_dot: bool,
) -> bool {
    let domains = match domains {
        Some(domains) => domains,
        None => return false,
    };
    if doc_domain.is_empty() || default_verdict(domains) {
        return false;
    }

    let lowered = text::to_lower(doc_domain);
    let mut doc_domain: &str = &lowered;
    if ignore_trailing_dot {
        doc_domain = doc_domain.strip_suffix('.').unwrap_or(doc_domain);
    }
    for (domain, &included) in domains.iter() {
        if !included || domain == doc_domain {
            continue;
        }
        let is_subdomain = domain.len() > doc_domain.len()
            && domain.ends_with(doc_domain)
            && domain.as_bytes()[domain.len() - doc_domain.len() - 1] == b'.';
        if !is_subdomain {
            return false;
        }
    }
    true
}

pub(crate) fn is_generic(domains: Option<&DomainMap>, sitekeys: Option<&SitekeySet>) -> bool {
    sitekeys.is_none() && domains.map_or(true, default_verdict)
}
