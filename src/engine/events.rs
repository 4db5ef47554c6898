use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::model::{DocumentSnapshot, PageStyle};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered observer list.
///
/// Listeners fire in subscription order. A listener may subscribe or
/// unsubscribe anyone (itself included) while an event is being dispatched:
/// removed listeners are skipped for the rest of that dispatch, new ones
/// first fire on the next event.
pub struct Emitter<E> {
    listeners: RefCell<Vec<(ListenerId, Rc<dyn Fn(&E)>)>>,
    next_id: Cell<u64>,
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }
}

impl<E> Emitter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, listener: Rc<dyn Fn(&E)>) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn emit(&self, event: &E) {
        let snapshot: Vec<(ListenerId, Rc<dyn Fn(&E)>)> = self.listeners.borrow().clone();
        for (id, listener) in snapshot {
            let still_subscribed = self.listeners.borrow().iter().any(|(lid, _)| *lid == id);
            if still_subscribed {
                listener(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }
}

/// A transaction on the live document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeEvent {
    /// False for selection-only transactions.
    pub doc_changed: bool,
    /// The document after the change, serialized. `None` means "ask the host".
    pub snapshot: Option<serde_json::Value>,
}

/// The live editor the engine mirrors.
pub trait EditorHost {
    fn on_change(&self, listener: Rc<dyn Fn(&ChangeEvent)>) -> ListenerId;
    fn off_change(&self, id: ListenerId);
    fn current_snapshot(&self) -> Option<serde_json::Value>;
    fn page_style_defaults(&self) -> PageStyle;
}

/// An in-memory host: holds one serialized snapshot and notifies on change.
pub struct SnapshotHost {
    snapshot: RefCell<Option<serde_json::Value>>,
    page_style: Cell<PageStyle>,
    changes: Emitter<ChangeEvent>,
}

impl SnapshotHost {
    pub fn new(doc: &DocumentSnapshot) -> Self {
        let host = Self::empty();
        host.snapshot.replace(serde_json::to_value(doc).ok());
        host
    }

    pub fn empty() -> Self {
        Self {
            snapshot: RefCell::new(None),
            page_style: Cell::new(PageStyle::default()),
            changes: Emitter::new(),
        }
    }

    pub fn set_page_style(&self, style: PageStyle) {
        self.page_style.set(style);
    }

    /// Replace the document and notify listeners.
    pub fn set_snapshot(&self, doc: &DocumentSnapshot) {
        match serde_json::to_value(doc) {
            Ok(value) => self.set_raw_snapshot(value),
            Err(e) => log::warn!("could not serialize snapshot: {e}"),
        }
    }

    /// Replace the document with arbitrary JSON, which may not match the schema.
    pub fn set_raw_snapshot(&self, value: serde_json::Value) {
        self.snapshot.replace(Some(value.clone()));
        self.changes.emit(&ChangeEvent {
            doc_changed: true,
            snapshot: Some(value),
        });
    }

    /// Emit a transaction that leaves the content alone (a cursor move).
    pub fn notify_selection(&self) {
        self.changes.emit(&ChangeEvent {
            doc_changed: false,
            snapshot: None,
        });
    }

    pub fn listener_count(&self) -> usize {
        self.changes.len()
    }
}

impl EditorHost for SnapshotHost {
    fn on_change(&self, listener: Rc<dyn Fn(&ChangeEvent)>) -> ListenerId {
        self.changes.on(listener)
    }

    fn off_change(&self, id: ListenerId) {
        if !self.changes.off(id) {
            log::debug!("change listener {id:?} was already removed");
        }
    }

    fn current_snapshot(&self) -> Option<serde_json::Value> {
        self.snapshot.borrow().clone()
    }

    fn page_style_defaults(&self) -> PageStyle {
        self.page_style.get()
    }
}
