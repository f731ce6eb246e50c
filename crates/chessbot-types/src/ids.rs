//! Opaque protocol identifiers.
//!
//! Rooms, events, users and uploaded media are all addressed by strings the
//! homeserver hands out. Wrapping them in newtypes keeps a room id from being
//! passed where an event id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// A room identifier such as `!abc:example.org`.
    RoomId
);
string_id!(
    /// An event identifier such as `$xyz`.
    EventId
);
string_id!(
    /// A fully qualified user identifier such as `@chessbot:example.org`.
    UserId
);
string_id!(
    /// An `mxc://` URI returned by a media upload.
    ContentUri
);

impl UserId {
    /// The localpart of a `@localpart:server` identifier.
    ///
    /// Returns `None` when the identifier is not of that shape.
    pub fn localpart(&self) -> Option<&str> {
        let rest = self.0.strip_prefix('@')?;
        let (local, server) = rest.split_once(':')?;
        if local.is_empty() || server.is_empty() {
            return None;
        }
        Some(local)
    }

    /// Whether this looks like a valid `@localpart:server` identifier.
    pub fn is_valid(&self) -> bool {
        self.localpart().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_localpart() {
        let user = UserId::new("@chessbot:example.org");
        assert_eq!(user.localpart(), Some("chessbot"));
        assert!(user.is_valid());
    }

    #[test]
    fn test_localpart_rejects_malformed() {
        assert_eq!(UserId::new("chessbot:example.org").localpart(), None);
        assert_eq!(UserId::new("@chessbot").localpart(), None);
        assert_eq!(UserId::new("@:example.org").localpart(), None);
        assert!(!UserId::new("@chessbot:").is_valid());
    }

    #[test]
    fn test_serde_transparent() {
        let room = RoomId::new("!room:example.org");
        let json = serde_json::to_string(&room).unwrap();
        assert_eq!(json, "\"!room:example.org\"");
        let parsed: RoomId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, room);
    }
}
