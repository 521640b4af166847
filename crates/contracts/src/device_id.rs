//! DeviceId - Cheap-to-clone device identifier
//!
//! Uses Arc<str> internally for O(1) clone operations. A measurement is cloned
//! once per sink, so the identifier must not allocate on every copy.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Hardware address of a sensor, e.g. `"aa:bb:cc:dd:ee:ff"`.
///
/// # Examples
/// ```
/// use contracts::DeviceId;
///
/// let id: DeviceId = "aa:bb:cc:dd:ee:ff".into();
/// assert_eq!(id.normalized(), "AABBCCDDEEFF");
/// assert!(id.is_valid_mac());
/// ```
#[derive(Clone, Default)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    /// Create a new DeviceId from a string slice.
    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Get the underlying string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address with `:`/`-` separators removed, upper-cased.
    ///
    /// Used as the lookup key for configured tag names.
    pub fn normalized(&self) -> String {
        normalize_mac(&self.0)
    }

    /// Lower-case address without separators, safe as an MQTT topic level.
    pub fn compact(&self) -> String {
        self.normalized().to_ascii_lowercase()
    }

    /// Whether this looks like a 6-octet hardware address.
    pub fn is_valid_mac(&self) -> bool {
        let octets: Vec<&str> = self.0.split([':', '-']).collect();
        octets.len() == 6
            && octets
                .iter()
                .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
    }
}

/// Strip separators from a hardware address and upper-case it.
pub fn normalize_mac(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != ':' && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

impl Deref for DeviceId {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for DeviceId {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for DeviceId {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    #[inline]
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for DeviceId {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({:?})", self.0)
    }
}

impl PartialEq for DeviceId {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        // Fast path: same Arc pointer
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for DeviceId {}

impl PartialEq<str> for DeviceId {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for DeviceId {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

// Hash - same as str hash for HashMap compatibility
impl Hash for DeviceId {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl Serialize for DeviceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}
