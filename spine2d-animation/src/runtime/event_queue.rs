use super::animation_state::EntryId;
use crate::{AnimationState, Event, TrackEntryHandle};

/// Notifications delivered to listeners as a track entry moves through its lifecycle.
#[derive(Clone, Debug, PartialEq)]
pub enum AnimationStateEvent {
    /// The entry became the current entry of its track.
    Start,
    /// Another entry was set while this one was current.
    Interrupt,
    /// The entry will never be applied again.
    End,
    /// The entry is about to be freed. Always the last notification for an entry.
    Dispose,
    /// A loop iteration finished, or the animation reached its end.
    Complete,
    /// A keyed event fired.
    Event(Event),
}

/// Receives lifecycle notifications. Callbacks get the state back so they can queue or replace
/// animations; anything they trigger is delivered after the current notification.
pub trait AnimationStateListener {
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: TrackEntryHandle,
        event: &AnimationStateEvent,
    );
}

impl<F> AnimationStateListener for F
where
    F: FnMut(&mut AnimationState, TrackEntryHandle, &AnimationStateEvent),
{
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: TrackEntryHandle,
        event: &AnimationStateEvent,
    ) {
        self(state, entry, event);
    }
}

/// Returned by [`AnimationState::add_listener`], used to remove the listener again.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ListenerId(u64);

#[derive(Clone, Debug)]
pub(crate) struct QueuedEvent {
    pub(crate) entry: EntryId,
    pub(crate) event: AnimationStateEvent,
}

/// Buffered notifications. Delivery is driven by [`AnimationState`], which holds the listeners.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    objects: Vec<QueuedEvent>,
    pub(crate) drain_disabled: bool,
}

impl EventQueue {
    pub(crate) fn push(&mut self, entry: EntryId, event: AnimationStateEvent) {
        self.objects.push(QueuedEvent { entry, event });
    }

    pub(crate) fn get(&self, index: usize) -> Option<&QueuedEvent> {
        self.objects.get(index)
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }

    pub(crate) fn clear(&mut self) {
        self.objects.clear();
    }

    /// Entries whose end or dispose notification is still queued.
    pub(crate) fn pending_disposals(&self) -> Vec<EntryId> {
        self.objects
            .iter()
            .filter(|q| matches!(q.event, AnimationStateEvent::End | AnimationStateEvent::Dispose))
            .map(|q| q.entry)
            .collect()
    }
}

type BoxedListener = Box<dyn AnimationStateListener>;

/// Global listeners. While a notification is being delivered the list is lent out; changes made
/// from inside a callback are recorded and merged back when it is returned.
#[derive(Default)]
pub(crate) struct Listeners {
    entries: Vec<(ListenerId, BoxedListener)>,
    next_id: u64,
    lent: Vec<ListenerId>,
    removed: Vec<ListenerId>,
    cleared: bool,
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.entries.len())
            .field("lent", &self.lent.len())
            .finish()
    }
}

impl Listeners {
    pub(crate) fn add(&mut self, listener: BoxedListener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        if let Some(pos) = self.entries.iter().position(|(l, _)| *l == id) {
            self.entries.remove(pos);
            return true;
        }
        if self.lent.contains(&id) && !self.removed.contains(&id) {
            self.removed.push(id);
            return true;
        }
        false
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        if !self.lent.is_empty() {
            self.cleared = true;
        }
    }

    pub(crate) fn is_removed(&self, id: ListenerId) -> bool {
        self.cleared || self.removed.contains(&id)
    }

    pub(crate) fn lend(&mut self) -> Vec<(ListenerId, BoxedListener)> {
        self.lent = self.entries.iter().map(|(id, _)| *id).collect();
        std::mem::take(&mut self.entries)
    }

    pub(crate) fn restore(&mut self, mut lent: Vec<(ListenerId, BoxedListener)>) {
        if self.cleared {
            lent.clear();
        }
        let removed = std::mem::take(&mut self.removed);
        lent.retain(|(id, _)| !removed.contains(id));
        lent.append(&mut self.entries);
        self.entries = lent;
        self.lent.clear();
        self.cleared = false;
    }
}
