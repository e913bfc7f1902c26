//! # Identity Collaborator
//!
//! Supplies the attribution string written to log entries.

/// Source of the current actor's name.
pub trait IdentityProvider: Send + Sync {
    fn current_actor(&self) -> String;
}

/// A fixed actor, e.g. the configured default or a signed-in admin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIdentity {
    actor: String,
}

impl StaticIdentity {
    pub fn new(actor: impl Into<String>) -> Self {
        StaticIdentity {
            actor: actor.into(),
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_actor(&self) -> String {
        self.actor.clone()
    }
}
