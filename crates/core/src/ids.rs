use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! newtype_i64 {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Create a new instance from the platform-level integer id.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Return the raw integer value.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

newtype_i64!(ChatId, "Identifies a chat or channel on the messaging platform.");
newtype_i64!(UserId, "Identifies a platform user (uploader or requester).");
newtype_i64!(MessageId, "Identifies a message within a chat; deliveries use it as the retraction handle.");

macro_rules! newtype_token {
    ($name:ident, $len:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a fresh random token.
            #[must_use]
            pub fn generate() -> Self {
                let mut buf = Uuid::encode_buffer();
                let simple = Uuid::new_v4().simple().encode_lower(&mut buf);
                Self(simple[..$len].to_owned())
            }

            /// Wrap an existing token, e.g. one parsed from a link.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Return the token as a str slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
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

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_token!(
    BatchId,
    12,
    "Opaque, URL-safe batch token. Minted at finalize time; 48 bits of \
     entropy, with duplicate detection at the store layer as a backstop."
);
newtype_token!(
    JobId,
    32,
    "Identifies a scheduled retraction job. Full UUID, never user-facing."
);
