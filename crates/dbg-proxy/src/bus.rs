use std::{cell::RefCell, fmt, rc::Rc};
use tracing::trace;

use crate::event::{BreakpointEvent, SessionEvent, TargetEvent};

type SubscriptionId = usize;
type Handler<E> = Rc<dyn Fn(&E)>;

/// Handle to a registered callback. Dropping it stops further delivery.
#[must_use = "dropping a subscription immediately unsubscribes the callback"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Keep the callback registered for as long as the emitter lives.
    pub fn detach(mut self) {
        self.unsubscribe.take();
    }

    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

struct Registry<E> {
    next_id: SubscriptionId,
    handlers: Vec<(SubscriptionId, Handler<E>)>,
}

impl<E> Registry<E> {
    fn contains(&self, id: SubscriptionId) -> bool {
        self.handlers.iter().any(|(handler_id, _)| *handler_id == id)
    }
}

/// A single named channel of the event bus.
///
/// Delivery is synchronous and follows subscription order. Callbacks may
/// subscribe or unsubscribe (including themselves) while an event is being
/// delivered; a callback unsubscribed mid-delivery is not called afterwards.
pub struct Emitter<E> {
    name: &'static str,
    registry: Rc<RefCell<Registry<E>>>,
}

impl<E: 'static> Emitter<E> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            registry: Rc::new(RefCell::new(Registry {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn subscribe(&self, handler: impl Fn(&E) + 'static) -> Subscription {
        let id = {
            let mut registry = self.registry.borrow_mut();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.handlers.push((id, Rc::new(handler)));
            id
        };
        trace!(channel = self.name, id, "Subscribed");

        let registry = Rc::downgrade(&self.registry);
        let name = self.name;
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry
                    .borrow_mut()
                    .handlers
                    .retain(|(handler_id, _)| *handler_id != id);
                trace!(channel = name, id, "Unsubscribed");
            }
        })
    }

    pub fn emit(&self, event: &E) {
        let handlers = self.registry.borrow().handlers.clone();
        trace!(channel = self.name, subscribers = handlers.len(), "Emitting event");

        for (id, handler) in handlers {
            if self.registry.borrow().contains(id) {
                handler(event);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.borrow().handlers.len()
    }
}

impl<E> Clone for Emitter<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            registry: Rc::clone(&self.registry),
        }
    }
}

impl<E> fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("name", &self.name)
            .field("subscribers", &self.registry.borrow().handlers.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Breakpoint,
    Session,
    Target,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Breakpoint => "breakpoint",
            Channel::Session => "session",
            Channel::Target => "target",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three channels the proxy republishes on.
#[derive(Debug, Clone)]
pub struct EventBus {
    breakpoint: Emitter<BreakpointEvent>,
    session: Emitter<SessionEvent>,
    target: Emitter<TargetEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            breakpoint: Emitter::new(Channel::Breakpoint.as_str()),
            session: Emitter::new(Channel::Session.as_str()),
            target: Emitter::new(Channel::Target.as_str()),
        }
    }

    pub fn breakpoint(&self) -> &Emitter<BreakpointEvent> {
        &self.breakpoint
    }

    pub fn session(&self) -> &Emitter<SessionEvent> {
        &self.session
    }

    pub fn target(&self) -> &Emitter<TargetEvent> {
        &self.target
    }

    pub fn subscriber_count(&self, channel: Channel) -> usize {
        match channel {
            Channel::Breakpoint => self.breakpoint.subscriber_count(),
            Channel::Session => self.session.subscriber_count(),
            Channel::Target => self.target.subscriber_count(),
        }
    }
}
