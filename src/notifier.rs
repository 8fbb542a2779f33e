//! Typed change notifications.
//!
//! Every observable mutation of a filter, a subscription or the storage is
//! reported synchronously to the host-installed sink, inside the mutating
//! call and in mutation order. Fields without a bound topic stay silent.

use std::cell::RefCell;
use std::rc::Rc;

use crate::filters::Filter;
use crate::subscriptions::Subscription;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topic {
    None,
    FilterAdded,
    FilterRemoved,
    FilterDisabled,
    FilterHitCount,
    FilterLastHit,
    SubscriptionAdded,
    SubscriptionRemoved,
    SubscriptionMoved,
    SubscriptionTitle,
    SubscriptionDisabled,
    SubscriptionFixedTitle,
    SubscriptionHomepage,
    SubscriptionLastCheck,
    SubscriptionLastDownload,
    SubscriptionDownloadStatus,
    SubscriptionErrors,
}

/// Host-side receiver of change events. Implement only the callbacks you
/// care about; the defaults ignore everything.
pub trait NotificationSink {
    fn filter_change(
        &self,
        _topic: Topic,
        _filter: &Filter,
        _subscription: Option<&Subscription>,
        _position: Option<usize>,
    ) {
    }

    fn subscription_change(&self, _topic: Topic, _subscription: &Subscription) {}
}

thread_local! {
    static SINK: RefCell<Option<Rc<dyn NotificationSink>>> = RefCell::new(None);
}

/// Installs (or clears) the notification sink for this engine instance.
pub fn set_notification_sink(sink: Option<Rc<dyn NotificationSink>>) {
    SINK.with(|slot| *slot.borrow_mut() = sink);
}

fn current_sink() -> Option<Rc<dyn NotificationSink>> {
    SINK.with(|slot| slot.borrow().clone())
}

pub(crate) fn filter_change(
    topic: Topic,
    filter: &Filter,
    subscription: Option<&Subscription>,
    position: Option<usize>,
) {
    if topic == Topic::None {
        return;
    }
    if let Some(sink) = current_sink() {
        sink.filter_change(topic, filter, subscription, position);
    }
}

pub(crate) fn subscription_change(topic: Topic, subscription: &Subscription) {
    if topic == Topic::None {
        return;
    }
    if let Some(sink) = current_sink() {
        sink.subscription_change(topic, subscription);
    }
}
