use std::{fmt, str::FromStr};

use aliri_braid::braid;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! limited_reveal {
    ($ty:ty: $hidden:literal, $default:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    f.write_str("\"")?;
                    limited_reveal(&self.0, &mut *f, $default)?;
                    f.write_str("\"")
                } else {
                    f.write_str(concat!("***", $hidden, "***"))
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    limited_reveal(&self.0, &mut *f, $default)
                } else {
                    f.write_str(concat!("***", $hidden, "***"))
                }
            }
        }
    };
}

/// Writes everything up to the final `.` and at most `default_len`
/// characters of what follows
///
/// The final segment of a compact token is its signature, so a token printed
/// this way can be correlated in logs without being replayable.
fn limited_reveal(unprotected: &str, f: &mut fmt::Formatter, default_len: usize) -> fmt::Result {
    let (visible, protected) = match unprotected.rfind('.') {
        Some(idx) => unprotected.split_at(idx + 1),
        None => ("", unprotected),
    };

    f.write_str(visible)?;

    let max_len = f.width().unwrap_or(default_len);
    if max_len == 0 {
        if !protected.is_empty() {
            f.write_str("…")?;
        }
        Ok(())
    } else if max_len >= protected.chars().count() {
        f.write_str(protected)
    } else {
        match protected.char_indices().nth(max_len) {
            Some((idx, _)) => {
                f.write_str(&protected[..idx])?;
                f.write_str("…")
            }
            None => f.write_str(protected),
        }
    }
}

/// A signed access token in compact form
#[braid(serde, debug = "owned", display = "owned")]
pub struct AccessToken;

limited_reveal!(AccessTokenRef: "ACCESS TOKEN", 0);

/// A signed refresh token in compact form
///
/// Clients never see this form. They are handed its [`TransportToken`]
/// encoding instead.
#[braid(serde, debug = "owned", display = "owned")]
pub struct RefreshToken;

limited_reveal!(RefreshTokenRef: "REFRESH TOKEN", 0);

/// The base64url encoding of a refresh token, as exchanged with clients
#[braid(serde, debug = "owned", display = "owned")]
pub struct TransportToken;

limited_reveal!(TransportTokenRef: "REFRESH TOKEN", 5);

/// A salted one-way hash of a refresh token's signature
#[braid(serde, debug = "owned", display = "owned")]
pub struct Fingerprint;

limited_reveal!(FingerprintRef: "FINGERPRINT", 0);

/// The unique identifier of a single issued credential (`jti`)
#[braid(serde)]
pub struct InstanceId;

impl InstanceId {
    /// Generates a fresh random identifier
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }
}

/// Where theft alerts for a principal are sent
#[braid(serde)]
pub struct ContactAddress;

/// The stable identifier of an authenticated principal
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Identity(Uuid);

impl Identity {
    /// Wraps an existing UUID
    #[inline]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// A random identity, mostly useful for tests and provisioning tools
    #[inline]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID
    #[inline]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Whether this is the nil UUID, which never names a principal
    #[inline]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl From<Uuid> for Identity {
    #[inline]
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Identity {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}
