//! Scene events with scoped subscriptions.
//!
//! A [`Subscription`] deregisters its handler when dropped, so a component tears down its
//! hooks by dropping the handles it holds.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Handler<E> = Rc<RefCell<dyn FnMut(&E)>>;

struct Slots<E> {
    next_id: u64,
    handlers: Vec<(u64, Handler<E>)>,
}

pub struct Observable<E> {
    slots: Rc<RefCell<Slots<E>>>,
}

impl<E: 'static> Default for Observable<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> Observable<E> {
    pub fn new() -> Self {
        Observable {
            slots: Rc::new(RefCell::new(Slots {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    #[must_use = "the handler is removed as soon as the subscription is dropped"]
    pub fn subscribe(&self, handler: impl FnMut(&E) + 'static) -> Subscription {
        let mut slots = self.slots.borrow_mut();
        let id = slots.next_id;
        slots.next_id += 1;
        let handler: Handler<E> = Rc::new(RefCell::new(handler));
        slots.handlers.push((id, handler));

        let weak: Weak<RefCell<Slots<E>>> = Rc::downgrade(&self.slots);
        Subscription {
            release: Some(Box::new(move || {
                if let Some(slots) = weak.upgrade() {
                    slots.borrow_mut().handlers.retain(|(i, _)| *i != id);
                }
            })),
        }
    }

    /// Calls every handler in subscription order. Handlers removed by an earlier handler of
    /// the same notification are skipped.
    pub fn notify(&self, event: &E) {
        let snapshot: Vec<(u64, Handler<E>)> = self.slots.borrow().handlers.clone();
        for (id, handler) in snapshot {
            let still_registered = self.slots.borrow().handlers.iter().any(|(i, _)| *i == id);
            if still_registered {
                (&mut *handler.borrow_mut())(event);
            }
        }
    }

    pub fn observer_count(&self) -> usize {
        self.slots.borrow().handlers.len()
    }
}

/// Keeps a handler registered for as long as it lives.
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Leaves the handler registered for the lifetime of the observable.
    pub fn forget(mut self) {
        self.release = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("live", &self.release.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_drop_deregisters() {
        let observable = Observable::<u32>::new();
        let seen = Rc::new(Cell::new(0));
        let sink = seen.clone();
        let subscription = observable.subscribe(move |v| sink.set(sink.get() + *v));
        observable.notify(&2);
        observable.notify(&3);
        assert_eq!(seen.get(), 5);
        assert_eq!(observable.observer_count(), 1);

        drop(subscription);
        observable.notify(&10);
        assert_eq!(seen.get(), 5);
        assert_eq!(observable.observer_count(), 0);
    }

    #[test]
    fn test_subscription_outliving_observable() {
        let observable = Observable::<u32>::new();
        let subscription = observable.subscribe(|_| {});
        drop(observable);
        drop(subscription);
    }

    #[test]
    fn test_order_and_removal_during_notify() {
        let observable = Rc::new(Observable::<()>::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        let second: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let l = log.clone();
        let s = second.clone();
        let _first = observable.subscribe(move |_| {
            l.borrow_mut().push("first");
            s.borrow_mut().take();
        });
        let l = log.clone();
        *second.borrow_mut() = Some(observable.subscribe(move |_| l.borrow_mut().push("second")));

        observable.notify(&());
        assert_eq!(*log.borrow(), vec!["first"]);
        assert_eq!(observable.observer_count(), 1);
    }

    #[test]
    fn test_forget_keeps_handler() {
        let observable = Observable::<u32>::new();
        let seen = Rc::new(Cell::new(0));
        let sink = seen.clone();
        observable.subscribe(move |v| sink.set(*v)).forget();
        observable.notify(&7);
        assert_eq!(seen.get(), 7);
    }
}
