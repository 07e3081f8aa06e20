//! Branded ID newtypes.
//!
//! Sessions, connections and participants each get a distinct ID type so a
//! connection ID can never be passed where a session ID is expected. Fresh IDs
//! are UUID v7 (time-ordered), optionally prefixed for readability in logs.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(format!("{}{}", $prefix, Uuid::now_v7()))
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifier of a shared session (taken from the join URL).
    SessionId, ""
}

branded_id! {
    /// Identifier of one open server-side connection.
    ConnectionId, "conn_"
}

branded_id! {
    /// Stable identifier of a participant.
    UserId, ""
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn user_id_new_is_uuid_v7() {
        let id = UserId::new();
        let parsed = Uuid::parse_str(id.as_str()).unwrap();
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn connection_id_is_prefixed() {
        let id = ConnectionId::new();
        let rest = id.strip_prefix("conn_").unwrap();
        assert!(Uuid::parse_str(rest).is_ok());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn serde_is_transparent() {
        let id = SessionId::from("parlour");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"parlour\"");
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn map_lookup_by_str() {
        let mut map = HashMap::new();
        let _ = map.insert(SessionId::from("attic"), 1);
        assert_eq!(map.get("attic"), Some(&1));
    }

    #[test]
    fn display_and_into_string() {
        let id = UserId::from("u-1");
        assert_eq!(format!("{id}"), "u-1");
        let s: String = id.into();
        assert_eq!(s, "u-1");
    }
}
