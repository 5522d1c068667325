// src/supervisor/access.rs

use std::collections::HashSet;

use crate::types::Requester;

/// Caller-supplied authorization predicate.
pub trait AccessPolicy: Send + Sync {
    fn is_admin(&self, who: &Requester) -> bool;

    /// Owners control their own jobs; admins control everything.
    fn may_control(&self, who: &Requester, owner: &Requester) -> bool {
        who == owner || self.is_admin(who)
    }
}

/// Fixed set of administrator ids.
#[derive(Debug, Default, Clone)]
pub struct AdminList {
    admins: HashSet<Requester>,
}

impl AdminList {
    pub fn new<I, S>(admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            admins: admins.into_iter().map(|a| Requester::new(a)).collect(),
        }
    }
}

impl AccessPolicy for AdminList {
    fn is_admin(&self, who: &Requester) -> bool {
        self.admins.contains(who)
    }
}
