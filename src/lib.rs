//! `adblock-core` is the in-memory core of an Adblock-Plus-compatible
//! content blocker: it parses textual filter rules, canonicalises and
//! interns them, classifies each into a typed variant and maintains the
//! lookup structures that answer which network requests to block and
//! which CSS selectors to apply to a document.
//!
//! The engine is strictly single-threaded: no locks are taken, all
//! notifications fire synchronously inside the mutating call, and hosts
//! needing parallelism serialise access externally. I/O, clocks, URL
//! parsing and the regular-expression executor are the host's concern;
//! the latter is consumed through the replaceable
//! [`regex_manager::RegexService`].
//!
//! ```
//! use adblock_core::{Criteria, ElemHide, Filter, TypeMask};
//!
//! let blocking = Filter::from_text("||ads.example.com^$script").unwrap();
//! assert!(blocking.matches(
//!     "https://ads.example.com/lib.js",
//!     TypeMask::SCRIPT,
//!     "example.com",
//!     true,
//!     "",
//! ));
//!
//! let mut elem_hide = ElemHide::new();
//! elem_hide.add(&Filter::from_text("##.ad").unwrap());
//! let selectors = elem_hide.get_selectors_for_domain("example.com", Criteria::AllMatching);
//! assert_eq!(selectors.selectors(), vec![".ad".to_string()]);
//! ```

pub mod containers;
pub mod data_format;
pub mod elem_hide;
pub mod elem_hide_emulation;
pub mod filters;
pub mod lists;
pub mod notifier;
pub mod regex_manager;
pub mod storage;
pub mod subscriptions;
pub mod text;
pub mod utils;

pub use crate::elem_hide::{Criteria, ElemHide, SelectorList};
pub use crate::elem_hide_emulation::ElemHideEmulation;
pub use crate::filters::network::{TriState, TypeMask};
pub use crate::filters::{Filter, FilterKind, FilterRef, FilterType};
pub use crate::notifier::{set_notification_sink, NotificationSink, Topic};
pub use crate::storage::FilterStorage;
pub use crate::subscriptions::{FilterCategories, Subscription, SubscriptionRef};
