//! Ownership and sharing checks for user-owned resources

use serde::{Deserialize, Serialize};

/// The caller on whose behalf an access check runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// None for anonymous callers
    pub user_id: Option<String>,
    pub is_superuser: bool,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            is_superuser: false,
        }
    }

    pub fn superuser(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            is_superuser: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    fn is(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }
}

/// Resources that have an owner, a public flag, and a share list
pub trait Shared {
    fn owner_id(&self) -> &str;

    fn is_public(&self) -> bool;

    /// Read access. `shared_with_caller` says whether the caller appears in the share list.
    fn can_access(&self, principal: &Principal, shared_with_caller: bool) -> bool {
        if !principal.is_authenticated() {
            return self.is_public();
        }

        self.is_public()
            || principal.is(self.owner_id())
            || shared_with_caller
            || principal.is_superuser
    }

    /// Write access: owner or superuser only
    fn can_edit(&self, principal: &Principal) -> bool {
        principal.is_authenticated() && (principal.is(self.owner_id()) || principal.is_superuser)
    }
}
