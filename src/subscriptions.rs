//! Subscriptions: ordered, identity-carrying containers of filters.
//!
//! Like filters, subscriptions are interned by their id. Ids beginning
//! with `~` denote user-defined subscriptions; everything else is a
//! downloadable list whose metadata is tracked for the downloader but has
//! no effect on matching.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use bitflags::bitflags;

use crate::containers::StringMap;
use crate::filters::{Filter, FilterRef, FilterType};
use crate::notifier::{self, Topic};

pub type SubscriptionRef = Rc<Subscription>;

bitflags! {
    /// Filter categories a user-defined subscription claims as its
    /// preferred target for newly added filters.
    pub struct FilterCategories: u32 {
        const WHITELIST = 1;
        const BLOCKING = 2;
        const ELEMHIDE = 4;
    }
}

fn filter_category(filter: &Filter) -> FilterCategories {
    let filter_type = filter.filter_type();
    if filter_type == FilterType::WHITELIST {
        FilterCategories::WHITELIST
    } else if filter_type == FilterType::BLOCKING {
        FilterCategories::BLOCKING
    } else if filter_type.contains(FilterType::ELEM_HIDE_BASE) {
        FilterCategories::ELEMHIDE
    } else {
        FilterCategories::empty()
    }
}

#[derive(Default)]
pub struct DownloadableState {
    fixed_title: Cell<bool>,
    homepage: RefCell<String>,
    last_check: Cell<u64>,
    hard_expiration: Cell<u64>,
    soft_expiration: Cell<u64>,
    last_download: Cell<u64>,
    last_success: Cell<u64>,
    download_status: RefCell<String>,
    error_count: Cell<u32>,
    data_revision: Cell<u64>,
    required_version: RefCell<String>,
    download_count: Cell<u32>,
}

pub enum SubscriptionDetails {
    UserDefined { defaults: Cell<FilterCategories> },
    Downloadable(DownloadableState),
}

pub struct Subscription {
    id: String,
    title: RefCell<String>,
    disabled: Cell<bool>,
    listed: Cell<bool>,
    filters: RefCell<Vec<FilterRef>>,
    details: SubscriptionDetails,
}

thread_local! {
    static KNOWN_SUBSCRIPTIONS: RefCell<StringMap<Weak<Subscription>>> =
        RefCell::new(StringMap::new());
    static NEXT_USER_ID: Cell<u32> = Cell::new(0);
}

macro_rules! downloadable_value_property {
    ($field:ident: $ty:ty, $getter:ident, $setter:ident, $topic:expr) => {
        pub fn $getter(&self) -> $ty {
            match &self.details {
                SubscriptionDetails::Downloadable(state) => state.$field.get(),
                _ => <$ty>::default(),
            }
        }

        pub fn $setter(&self, value: $ty) {
            if let SubscriptionDetails::Downloadable(state) = &self.details {
                if state.$field.get() != value {
                    state.$field.set(value);
                    notifier::subscription_change($topic, self);
                }
            }
        }
    };
}

macro_rules! downloadable_string_property {
    ($field:ident, $getter:ident, $setter:ident, $topic:expr) => {
        pub fn $getter(&self) -> String {
            match &self.details {
                SubscriptionDetails::Downloadable(state) => state.$field.borrow().clone(),
                _ => String::new(),
            }
        }

        pub fn $setter(&self, value: &str) {
            if let SubscriptionDetails::Downloadable(state) = &self.details {
                if *state.$field.borrow() != value {
                    *state.$field.borrow_mut() = value.to_string();
                    notifier::subscription_change($topic, self);
                }
            }
        }
    };
}

impl Subscription {
    /// Returns the subscription with the given id, creating it on first
    /// use. An empty id allocates a fresh user-defined id.
    pub fn from_id(id: &str) -> SubscriptionRef {
        if id.is_empty() {
            let generated = generate_user_id();
            return Self::from_id(&generated);
        }
        KNOWN_SUBSCRIPTIONS.with(|known| {
            if let Some(existing) = known.borrow().get(id).and_then(Weak::upgrade) {
                return existing;
            }
            let user_defined = id.starts_with('~');
            let subscription = Rc::new(Subscription {
                id: id.to_string(),
                // Downloadable lists show their location until the first
                // download supplies a real title.
                title: RefCell::new(if user_defined {
                    String::new()
                } else {
                    id.to_string()
                }),
                disabled: Cell::new(false),
                listed: Cell::new(false),
                filters: RefCell::new(Vec::new()),
                details: if user_defined {
                    SubscriptionDetails::UserDefined {
                        defaults: Cell::new(FilterCategories::empty()),
                    }
                } else {
                    SubscriptionDetails::Downloadable(DownloadableState::default())
                },
            });
            known
                .borrow_mut()
                .insert(id.to_string(), Rc::downgrade(&subscription));
            subscription
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn details(&self) -> &SubscriptionDetails {
        &self.details
    }

    pub fn is_user_defined(&self) -> bool {
        matches!(self.details, SubscriptionDetails::UserDefined { .. })
    }

    pub fn is_downloadable(&self) -> bool {
        matches!(self.details, SubscriptionDetails::Downloadable(_))
    }

    pub fn title(&self) -> String {
        self.title.borrow().clone()
    }

    pub fn set_title(&self, value: &str) {
        if *self.title.borrow() != value {
            *self.title.borrow_mut() = value.to_string();
            notifier::subscription_change(Topic::SubscriptionTitle, self);
        }
    }

    pub fn disabled(&self) -> bool {
        self.disabled.get()
    }

    pub fn set_disabled(&self, value: bool) {
        if self.disabled.get() != value {
            self.disabled.set(value);
            notifier::subscription_change(Topic::SubscriptionDisabled, self);
        }
    }

    /// Whether the subscription currently appears in the storage list.
    pub fn listed(&self) -> bool {
        self.listed.get()
    }

    pub(crate) fn set_listed(&self, value: bool) {
        self.listed.set(value);
    }

    pub fn filter_count(&self) -> usize {
        self.filters.borrow().len()
    }

    pub fn filter_at(&self, index: usize) -> Option<FilterRef> {
        self.filters.borrow().get(index).cloned()
    }

    pub fn index_of_filter(&self, filter: &Filter) -> Option<usize> {
        self.filters
            .borrow()
            .iter()
            .position(|entry| std::ptr::eq(&**entry, filter))
    }

    pub fn filters(&self) -> Vec<FilterRef> {
        self.filters.borrow().clone()
    }

    /// Inserts `filter` at `position` (clamped to the end). While the
    /// subscription is listed the insertion is reported to the sink.
    pub fn insert_filter_at(&self, filter: &FilterRef, position: usize) {
        let position = {
            let mut filters = self.filters.borrow_mut();
            let position = position.min(filters.len());
            filters.insert(position, filter.clone());
            position
        };
        if self.listed.get() {
            notifier::filter_change(Topic::FilterAdded, filter, Some(self), Some(position));
        }
    }

    /// Removes the filter at `position`; `false` if out of bounds.
    pub fn remove_filter_at(&self, position: usize) -> bool {
        let removed = {
            let mut filters = self.filters.borrow_mut();
            if position >= filters.len() {
                return false;
            }
            filters.remove(position)
        };
        if self.listed.get() {
            notifier::filter_change(Topic::FilterRemoved, &removed, Some(self), Some(position));
        }
        true
    }

    /// A user-defined subscription with no default categories accepts any
    /// kind of filter.
    pub fn is_generic(&self) -> bool {
        match &self.details {
            SubscriptionDetails::UserDefined { defaults } => defaults.get().is_empty(),
            _ => false,
        }
    }

    pub fn defaults(&self) -> FilterCategories {
        match &self.details {
            SubscriptionDetails::UserDefined { defaults } => defaults.get(),
            _ => FilterCategories::empty(),
        }
    }

    pub fn is_default_for(&self, filter: &Filter) -> bool {
        match &self.details {
            SubscriptionDetails::UserDefined { defaults } => {
                let category = filter_category(filter);
                !category.is_empty() && defaults.get().intersects(category)
            }
            _ => false,
        }
    }

    pub fn make_default_for(&self, filter: &Filter) {
        if let SubscriptionDetails::UserDefined { defaults } = &self.details {
            defaults.set(defaults.get() | filter_category(filter));
        }
    }

    downloadable_value_property!(fixed_title: bool, fixed_title, set_fixed_title,
        Topic::SubscriptionFixedTitle);
    downloadable_value_property!(last_check: u64, last_check, set_last_check,
        Topic::SubscriptionLastCheck);
    downloadable_value_property!(hard_expiration: u64, hard_expiration, set_hard_expiration,
        Topic::None);
    downloadable_value_property!(soft_expiration: u64, soft_expiration, set_soft_expiration,
        Topic::None);
    downloadable_value_property!(last_download: u64, last_download, set_last_download,
        Topic::SubscriptionLastDownload);
    downloadable_value_property!(last_success: u64, last_success, set_last_success,
        Topic::None);
    downloadable_value_property!(error_count: u32, error_count, set_error_count,
        Topic::SubscriptionErrors);
    downloadable_value_property!(data_revision: u64, data_revision, set_data_revision,
        Topic::None);
    downloadable_value_property!(download_count: u32, download_count, set_download_count,
        Topic::None);
    downloadable_string_property!(homepage, homepage, set_homepage,
        Topic::SubscriptionHomepage);
    downloadable_string_property!(download_status, download_status, set_download_status,
        Topic::SubscriptionDownloadStatus);
    downloadable_string_property!(required_version, required_version, set_required_version,
        Topic::None);
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = KNOWN_SUBSCRIPTIONS.try_with(|known| {
            known.borrow_mut().remove(&self.id);
        });
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("user_defined", &self.is_user_defined())
            .finish()
    }
}

fn generate_user_id() -> String {
    loop {
        let number = NEXT_USER_ID.with(|next| {
            let value = next.get();
            next.set(value.wrapping_add(1));
            value
        });
        let id = format!("~user~{:06}", number % 1_000_000);
        let taken = KNOWN_SUBSCRIPTIONS.with(|known| known.borrow().contains_key(&id));
        if !taken {
            return id;
        }
    }
}
