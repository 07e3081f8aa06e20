//! Participant identity and the join handshake.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::ANONYMOUS_NAME;
use crate::errors::ProtocolError;
use crate::ids::UserId;

/// A participant as seen by every other member of the session.
///
/// Immutable once attached to a connection. Construct through [`Identity::new`]
/// so the name is always non-blank.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable participant id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// When the participant joined.
    pub joined_at: DateTime<Utc>,
}

impl Identity {
    /// Create an identity joined now. Blank names are rejected.
    pub fn new(id: UserId, name: impl Into<String>) -> Result<Self, ProtocolError> {
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(ProtocolError::EmptyName);
        }
        Ok(Self {
            id,
            name,
            joined_at: Utc::now(),
        })
    }

    /// Whether the identity is well-formed (deserialized values bypass `new`).
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// First frame a peer sends after the socket is accepted.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Handshake {
    /// Peer-chosen stable id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Handshake {
    /// Handshake for a named participant.
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            name: Some(name.into()),
        }
    }

    /// Resolve into an [`Identity`].
    ///
    /// A missing name becomes `"Anonymous"` and a missing id a fresh one; a
    /// name that is present but blank is malformed.
    pub fn into_identity(self) -> Result<Identity, ProtocolError> {
        let id = self
            .user_id
            .filter(|id| !id.trim().is_empty())
            .map_or_else(UserId::new, UserId::from);
        let name = self.name.unwrap_or_else(|| ANONYMOUS_NAME.to_owned());
        Identity::new(id, name)
    }
}
