//! Per-request state: who is visiting, their session, and what has been
//! queued so far. One value per request; never shared between visitors.

use interlude_core::{Visitor, VisitorIdentity};
use interlude_store::SessionStore;

use crate::queue::RequestQueue;

pub struct RequestContext<'a> {
    visitor: &'a Visitor,
    session: &'a dyn SessionStore,
    pub queue: RequestQueue,
}

impl<'a> RequestContext<'a> {
    pub fn new(visitor: &'a Visitor, session: &'a dyn SessionStore) -> Self {
        Self {
            visitor,
            session,
            queue: RequestQueue::new(),
        }
    }

    pub fn visitor(&self) -> &'a Visitor {
        self.visitor
    }

    pub fn session(&self) -> &'a dyn SessionStore {
        self.session
    }

    /// Identity view facts are recorded and matched under.
    pub fn identity(&self) -> VisitorIdentity {
        VisitorIdentity::for_visitor(self.visitor, self.session.id())
    }
}
