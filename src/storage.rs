//! The ordered list of subscriptions owned by the engine.

use std::cell::RefCell;
use std::rc::Rc;

use crate::filters::Filter;
use crate::notifier::{self, Topic};
use crate::subscriptions::{Subscription, SubscriptionRef};

#[derive(Default)]
pub struct FilterStorage {
    subscriptions: RefCell<Vec<SubscriptionRef>>,
}

thread_local! {
    static INSTANCE: Rc<FilterStorage> = Rc::new(FilterStorage::default());
}

impl FilterStorage {
    /// The engine-wide storage instance.
    pub fn instance() -> Rc<FilterStorage> {
        INSTANCE.with(Rc::clone)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    pub fn subscription_at(&self, index: usize) -> Option<SubscriptionRef> {
        self.subscriptions.borrow().get(index).cloned()
    }

    pub fn index_of_subscription(&self, subscription: &Subscription) -> Option<usize> {
        self.subscriptions
            .borrow()
            .iter()
            .position(|entry| std::ptr::eq(&**entry, subscription))
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionRef> {
        self.subscriptions.borrow().clone()
    }

    /// The user-defined subscription new filters of this kind should go
    /// to: the first enabled one that claims the filter's category, with
    /// the first generic user-defined subscription as fallback.
    pub fn get_subscription_for_filter(&self, filter: &Filter) -> Option<SubscriptionRef> {
        let mut fallback: Option<SubscriptionRef> = None;
        for subscription in self.subscriptions.borrow().iter() {
            if !subscription.is_user_defined() {
                continue;
            }
            if !subscription.disabled() && subscription.is_default_for(filter) {
                return Some(subscription.clone());
            }
            if fallback.is_none() && subscription.is_generic() {
                fallback = Some(subscription.clone());
            }
        }
        fallback
    }

    /// Appends an unlisted subscription; `false` if it is already listed.
    pub fn add_subscription(&self, subscription: &SubscriptionRef) -> bool {
        if subscription.listed() {
            return false;
        }
        self.subscriptions.borrow_mut().push(subscription.clone());
        subscription.set_listed(true);
        notifier::subscription_change(Topic::SubscriptionAdded, subscription);
        true
    }

    /// Removes a listed subscription; `false` if it is not listed.
    pub fn remove_subscription(&self, subscription: &SubscriptionRef) -> bool {
        if !subscription.listed() {
            return false;
        }
        {
            let mut subscriptions = self.subscriptions.borrow_mut();
            if let Some(position) = subscriptions
                .iter()
                .position(|entry| Rc::ptr_eq(entry, subscription))
            {
                subscriptions.remove(position);
            }
        }
        subscription.set_listed(false);
        notifier::subscription_change(Topic::SubscriptionRemoved, subscription);
        true
    }

    /// Moves a subscription to just before `insert_before`, or to the end
    /// when `insert_before` is `None` or not listed itself. Returns
    /// `false` without emitting when nothing changes.
    pub fn move_subscription(
        &self,
        subscription: &SubscriptionRef,
        insert_before: Option<&SubscriptionRef>,
    ) -> bool {
        let moved = {
            let mut subscriptions = self.subscriptions.borrow_mut();
            let old_position = match subscriptions
                .iter()
                .position(|entry| Rc::ptr_eq(entry, subscription))
            {
                Some(position) => position,
                None => return false,
            };
            let mut new_position = insert_before
                .and_then(|before| {
                    subscriptions
                        .iter()
                        .position(|entry| Rc::ptr_eq(entry, before))
                })
                .unwrap_or(subscriptions.len());
            if new_position > old_position {
                new_position -= 1;
            }
            if new_position == old_position {
                return false;
            }
            let entry = subscriptions.remove(old_position);
            subscriptions.insert(new_position, entry);
            true
        };
        if moved {
            notifier::subscription_change(Topic::SubscriptionMoved, subscription);
        }
        moved
    }
}
