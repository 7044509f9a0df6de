use std::fmt;

use serde::{Deserialize, Serialize};

use super::UserId;

/// A verified caller identity.
///
/// Obtained from password verification in the ledger service, or asserted by
/// an external identity provider that has already checked a bearer
/// credential. It is passed explicitly to every call that acts on behalf of a
/// user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    user_id: UserId,
}

impl Principal {
    /// Trust an id that an external identity provider has already verified.
    pub fn assume(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_id)
    }
}
