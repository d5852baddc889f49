//! Change events, observers, and the change log behind tracking queries.

use std::collections::{HashMap, HashSet};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use trellis_foundation::Entity;

use crate::registry::{Trait, TraitId, TraitKey};

/// What happened to a trait on an entity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChangeKind {
    /// The trait (or pair) was added.
    Added,
    /// The trait (or pair) was removed, or its entity destroyed.
    Removed,
    /// The trait's data was written.
    Changed,
}

/// A single structural or data change.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChangeEvent {
    /// The affected entity.
    pub entity: Entity,
    /// The affected key.
    pub key: TraitKey,
    /// What happened.
    pub kind: ChangeKind,
}

impl ChangeEvent {
    /// The trait id of the affected key.
    #[must_use]
    pub fn trait_id(&self) -> Option<TraitId> {
        self.key.trait_id()
    }

    /// The pair target, for relation events.
    #[must_use]
    pub fn target(&self) -> Option<Entity> {
        self.key.target()
    }
}

/// What an observer listens to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Observed {
    /// Every trait.
    Any,
    /// One trait, including all pairs of a relation.
    Trait(TraitId),
}

impl From<&Trait> for Observed {
    fn from(t: &Trait) -> Self {
        Self::Trait(t.id())
    }
}

impl Observed {
    fn matches(self, event: &ChangeEvent) -> bool {
        match self {
            Self::Any => true,
            Self::Trait(id) => event.trait_id() == Some(id),
        }
    }
}

/// Handle returned by a subscription; pass it back to unsubscribe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// Observer callback. Invoked synchronously at the mutation point.
pub type Callback = Box<dyn FnMut(&ChangeEvent) + Send>;

struct Observer {
    id: Subscription,
    observed: Observed,
    kind: Option<ChangeKind>,
    callback: Callback,
}

/// Registered observers of one world.
#[derive(Default)]
pub struct Observers {
    next: u64,
    list: Vec<Observer>,
}

impl Observers {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback. `kind` of `None` receives every kind.
    pub fn subscribe(
        &mut self,
        observed: Observed,
        kind: Option<ChangeKind>,
        callback: Callback,
    ) -> Subscription {
        let id = Subscription(self.next);
        self.next += 1;
        self.list.push(Observer {
            id,
            observed,
            kind,
            callback,
        });
        id
    }

    /// Removes a callback. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.list.len();
        self.list.retain(|o| o.id != subscription);
        self.list.len() != before
    }

    /// Delivers an event to every matching observer, in subscription order.
    pub fn notify(&mut self, event: &ChangeEvent) {
        for observer in &mut self.list {
            if observer.observed.matches(event) && observer.kind.is_none_or(|k| k == event.kind) {
                (observer.callback)(event);
            }
        }
    }

    /// Number of observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Returns true if nobody is listening.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("len", &self.list.len())
            .finish()
    }
}

#[derive(Copy, Clone, Debug)]
struct Logged {
    seq: u64,
    event: ChangeEvent,
}

/// Sequenced record of changes for traits that tracking queries watch.
///
/// Each tracking query holds a cursor into the sequence; entries every
/// cursor has passed are pruned.
#[derive(Debug, Default)]
pub struct ChangeLog {
    next_seq: u64,
    tracked: HashSet<TraitId>,
    entries: HashMap<TraitId, Vec<Logged>>,
}

impl ChangeLog {
    /// Creates an empty log tracking nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts recording changes to `id`.
    pub fn track(&mut self, id: TraitId) {
        self.tracked.insert(id);
    }

    /// Stops recording changes to `id` and drops what was kept for it.
    pub fn untrack(&mut self, id: TraitId) {
        self.tracked.remove(&id);
        self.entries.remove(&id);
    }

    /// Returns true if changes to `id` are being recorded.
    #[must_use]
    pub fn is_tracked(&self, id: TraitId) -> bool {
        self.tracked.contains(&id)
    }

    /// Position the next recorded change will take.
    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.next_seq
    }

    /// Records an event if its trait is tracked.
    pub fn record(&mut self, event: &ChangeEvent) {
        let Some(id) = event.trait_id() else {
            return;
        };
        if !self.tracked.contains(&id) {
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.entry(id).or_default().push(Logged {
            seq,
            event: *event,
        });
    }

    /// Entities that saw `kind` on `id` at or after `cursor`.
    #[must_use]
    pub fn since(&self, id: TraitId, kind: ChangeKind, cursor: u64) -> HashSet<Entity> {
        self.entries
            .get(&id)
            .map(|list| {
                let start = list.partition_point(|l| l.seq < cursor);
                list[start..]
                    .iter()
                    .filter(|l| l.event.kind == kind)
                    .map(|l| l.event.entity)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drops entries before `cursor`.
    pub fn prune(&mut self, cursor: u64) {
        for list in self.entries.values_mut() {
            let start = list.partition_point(|l| l.seq < cursor);
            list.drain(..start);
        }
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Returns true if nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    /// Removes and returns every retained entry in sequence order.
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        let mut all: Vec<Logged> = self.entries.drain().flat_map(|(_, list)| list).collect();
        all.sort_unstable_by_key(|l| l.seq);
        all.into_iter().map(|l| l.event).collect()
    }

    /// Drops every entry; tracked traits stay tracked.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
