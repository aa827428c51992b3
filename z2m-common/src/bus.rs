//! In-process event bus with token-based subscriptions.
//!
//! Delivery is synchronous on the emitting thread, in subscription order.
//! Each subscription is gated so that once [`EventBus::unsubscribe`] returns,
//! its handler is neither running nor will it be invoked again.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{ReentrantMutex, RwLock};
use tracing::{trace, warn};

use crate::error::Result;
use crate::events::{BusEvent, EventKind};

/// Boxed event handler.
pub type Handler = Box<dyn Fn(&BusEvent) -> Result<()> + Send + Sync>;

/// Registration token returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Subscription {
    token: SubscriptionToken,
    kind: EventKind,
    handler: Handler,
    active: AtomicBool,
    gate: ReentrantMutex<()>,
}

/// The host event bus.
pub struct EventBus {
    name: String,
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
    next_token: AtomicU64,
}

impl EventBus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscriptions: RwLock::new(Vec::new()),
            next_token: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscribe a handler to one event kind.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionToken
    where
        F: Fn(&BusEvent) -> Result<()> + Send + Sync + 'static,
    {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let subscription = Arc::new(Subscription {
            token,
            kind,
            handler: Box::new(handler),
            active: AtomicBool::new(true),
            gate: ReentrantMutex::new(()),
        });

        self.subscriptions.write().push(subscription);
        trace!(bus = %self.name, %token, kind = kind.as_str(), "Subscribed");
        token
    }

    /// Remove a subscription, waiting for an in-flight delivery to finish.
    ///
    /// Returns `false` if the token was unknown.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let removed = {
            let mut subscriptions = self.subscriptions.write();
            match subscriptions.iter().position(|s| s.token == token) {
                Some(index) => subscriptions.remove(index),
                None => return false,
            }
        };

        removed.active.store(false, Ordering::Release);
        drop(removed.gate.lock());

        trace!(bus = %self.name, %token, "Unsubscribed");
        true
    }

    /// Remove several subscriptions; returns how many were known.
    pub fn unsubscribe_all<I>(&self, tokens: I) -> usize
    where
        I: IntoIterator<Item = SubscriptionToken>,
    {
        tokens
            .into_iter()
            .filter(|token| self.unsubscribe(*token))
            .count()
    }

    /// Deliver an event to every subscriber of its kind.
    ///
    /// Handler errors are logged and do not stop delivery. Returns the number
    /// of handlers invoked.
    pub fn emit(&self, event: impl Into<BusEvent>) -> usize {
        let event = event.into();
        let kind = event.kind();

        let targets: Vec<Arc<Subscription>> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.kind == kind)
            .cloned()
            .collect();

        let mut delivered = 0;
        for subscription in targets {
            let _guard = subscription.gate.lock();
            if !subscription.active.load(Ordering::Acquire) {
                continue;
            }

            delivered += 1;
            if let Err(e) = (subscription.handler)(&event) {
                warn!(
                    bus = %self.name,
                    token = %subscription.token,
                    kind = kind.as_str(),
                    error = %e,
                    "Event handler failed"
                );
            }
        }

        delivered
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("name", &self.name)
            .field("subscriptions", &self.subscriber_count())
            .finish()
    }
}
