//! Subscription Table
//!
//! Message type → ordered handler list, built once before the scheduler runs.
//!
//! Handlers are ordered by layer depth first (base layers are shallower and
//! run first, so their state updates precede what derived layers observe),
//! then by registration order within a depth. Wildcard handlers run after
//! every type-specific handler.

use crate::context::Context;
use crate::messages::HandlerId;
use codec::Message;
use std::collections::HashMap;

/// Message handler body
pub type HandlerFn<A> = Box<dyn FnMut(&mut A, &mut Context, &Message) -> anyhow::Result<()>>;

/// Periodic or deferred task body
pub type TaskFn<A> = Box<dyn FnMut(&mut A, &mut Context) -> anyhow::Result<()>>;

pub(crate) struct Subscription<A> {
    pub(crate) id: HandlerId,
    pub(crate) depth: u8,
    pub(crate) handler: HandlerFn<A>,
}

pub struct SubscriptionTable<A> {
    by_type: HashMap<u16, Vec<Subscription<A>>>,
    wildcard: Vec<Subscription<A>>,
}

impl<A> Default for SubscriptionTable<A> {
    fn default() -> Self {
        Self {
            by_type: HashMap::new(),
            wildcard: Vec::new(),
        }
    }
}

impl<A> std::fmt::Debug for SubscriptionTable<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionTable")
            .field("types", &self.types())
            .field("wildcard", &self.wildcard.len())
            .finish()
    }
}

/// Insert after every entry of the same or shallower depth
fn insert_ordered<A>(list: &mut Vec<Subscription<A>>, sub: Subscription<A>) {
    let pos = list.partition_point(|s| s.depth <= sub.depth);
    list.insert(pos, sub);
}

impl<A> SubscriptionTable<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(&mut self, type_id: u16, id: HandlerId, depth: u8, handler: HandlerFn<A>) {
        let list = self.by_type.entry(type_id).or_default();
        insert_ordered(list, Subscription { id, depth, handler });
    }

    pub(crate) fn subscribe_all(&mut self, id: HandlerId, depth: u8, handler: HandlerFn<A>) {
        insert_ordered(&mut self.wildcard, Subscription { id, depth, handler });
    }

    /// Subscribed type ids, ascending
    pub fn types(&self) -> Vec<u16> {
        let mut types: Vec<u16> = self
            .by_type
            .iter()
            .filter(|(_, subs)| !subs.is_empty())
            .map(|(type_id, _)| *type_id)
            .collect();
        types.sort_unstable();
        types
    }

    pub fn has_wildcard(&self) -> bool {
        !self.wildcard.is_empty()
    }

    /// Types a message source needs to produce, `None` meaning all of them
    pub fn wanted_types(&self) -> Option<Vec<u16>> {
        (!self.has_wildcard()).then(|| self.types())
    }

    /// Dispatch order for a type (typed handlers, then wildcards)
    pub fn handler_ids(&self, type_id: u16) -> Vec<&HandlerId> {
        self.by_type
            .get(&type_id)
            .into_iter()
            .flatten()
            .chain(self.wildcard.iter())
            .map(|s| &s.id)
            .collect()
    }

    /// Handlers for a message in dispatch order
    ///
    /// `unknown` payloads only reach wildcard handlers.
    pub(crate) fn handlers_mut(
        &mut self,
        type_id: u16,
        unknown: bool,
    ) -> impl Iterator<Item = &mut Subscription<A>> + '_ {
        let typed = if unknown {
            None
        } else {
            self.by_type.get_mut(&type_id)
        };
        typed.into_iter().flatten().chain(self.wildcard.iter_mut())
    }
}
