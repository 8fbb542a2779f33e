//! Line-oriented text serialisation of engine state.
//!
//! The persisted format is append-only plain text: bracketed section
//! headers followed by `key=value` lines, with optional fields written
//! only when they differ from their defaults. Reading the format back is
//! the host loader's job; the engine only ever emits it.

use std::fmt::Write;

use crate::filters::Filter;
use crate::subscriptions::{FilterCategories, Subscription};

/// Serialises one filter as a `[Filter]` section.
pub fn serialize_filter(filter: &Filter) -> String {
    let mut result = String::from("[Filter]\ntext=");
    result.push_str(filter.text());
    result.push('\n');
    if filter.disabled() {
        result.push_str("disabled=true\n");
    }
    if filter.hit_count() != 0 {
        let _ = writeln!(result, "hitCount={}", filter.hit_count());
    }
    if filter.last_hit() != 0 {
        let _ = writeln!(result, "lastHit={}", filter.last_hit());
    }
    result
}

/// Serialises a subscription's own state as a `[Subscription]` section.
/// The filter list is written separately by
/// [`serialize_subscription_filters`].
pub fn serialize_subscription(subscription: &Subscription) -> String {
    let mut result = String::from("[Subscription]\nurl=");
    result.push_str(subscription.id());
    result.push('\n');
    let title = subscription.title();
    if !title.is_empty() {
        let _ = writeln!(result, "title={}", title);
    }
    if subscription.disabled() {
        result.push_str("disabled=true\n");
    }

    if subscription.is_user_defined() {
        let defaults = subscription.defaults();
        if !defaults.is_empty() {
            let mut tokens = Vec::with_capacity(3);
            if defaults.contains(FilterCategories::BLOCKING) {
                tokens.push("blocking");
            }
            if defaults.contains(FilterCategories::WHITELIST) {
                tokens.push("whitelist");
            }
            if defaults.contains(FilterCategories::ELEMHIDE) {
                tokens.push("elemhide");
            }
            let _ = writeln!(result, "defaults={}", tokens.join(" "));
        }
        return result;
    }

    if subscription.fixed_title() {
        result.push_str("fixedTitle=true\n");
    }
    let homepage = subscription.homepage();
    if !homepage.is_empty() {
        let _ = writeln!(result, "homepage={}", homepage);
    }
    if subscription.last_check() != 0 {
        let _ = writeln!(result, "lastCheck={}", subscription.last_check());
    }
    if subscription.hard_expiration() != 0 {
        let _ = writeln!(result, "expires={}", subscription.hard_expiration());
    }
    if subscription.soft_expiration() != 0 {
        let _ = writeln!(result, "softExpiration={}", subscription.soft_expiration());
    }
    if subscription.last_download() != 0 {
        let _ = writeln!(result, "lastDownload={}", subscription.last_download());
    }
    let download_status = subscription.download_status();
    if !download_status.is_empty() {
        let _ = writeln!(result, "downloadStatus={}", download_status);
    }
    if subscription.last_success() != 0 {
        let _ = writeln!(result, "lastSuccess={}", subscription.last_success());
    }
    if subscription.error_count() != 0 {
        let _ = writeln!(result, "errors={}", subscription.error_count());
    }
    if subscription.data_revision() != 0 {
        let _ = writeln!(result, "version={}", subscription.data_revision());
    }
    let required_version = subscription.required_version();
    if !required_version.is_empty() {
        let _ = writeln!(result, "requiredVersion={}", required_version);
    }
    if subscription.download_count() != 0 {
        let _ = writeln!(result, "downloadCount={}", subscription.download_count());
    }
    result
}

/// Serialises a subscription's filter texts in order, or nothing when the
/// subscription is empty.
pub fn serialize_subscription_filters(subscription: &Subscription) -> String {
    let filters = subscription.filters();
    if filters.is_empty() {
        return String::new();
    }
    let mut result = String::from("[Subscription filters]\n");
    for filter in filters {
        result.push_str(filter.text());
        result.push('\n');
    }
    result
}
