//! Bonded peer identity

use std::fmt;
use std::hash::{Hash, Hasher};

/// A remote endpoint previously paired with the local adapter.
///
/// Equality and hashing use the address only, so a set of peers never holds
/// two entries for the same device even if their names differ.
#[derive(Debug, Clone)]
pub struct Peer<H> {
    address: String,
    name: Option<String>,
    handle: H,
}

impl<H> Peer<H> {
    /// Create a peer. The address is normalized to upper case.
    pub fn new(address: impl AsRef<str>, name: Option<String>, handle: H) -> Self {
        Self {
            address: address.as_ref().trim().to_ascii_uppercase(),
            name: name.filter(|n| !n.is_empty()),
            handle,
        }
    }

    /// Hardware address in string form
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Display name, if the peer advertises one
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Radio handle used to open sockets to this peer
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Whether `address` refers to this peer (case-insensitive)
    pub fn matches_address(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address.trim())
    }
}

impl<H> PartialEq for Peer<H> {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl<H> Eq for Peer<H> {}

impl<H> Hash for Peer<H> {
    fn hash<S: Hasher>(&self, state: &mut S) {
        self.address.hash(state);
    }
}

impl<H> fmt::Display for Peer<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_ignores_name_and_handle() {
        let a = Peer::new("00:11:22:33:44:55", Some("HC-05".into()), 1usize);
        let b = Peer::new("00:11:22:33:44:55", Some("Renamed".into()), 2usize);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_address_normalized() {
        let peer = Peer::new(" aa:bb:cc:dd:ee:ff ", None, ());
        assert_eq!(peer.address(), "AA:BB:CC:DD:EE:FF");
        assert!(peer.matches_address("aa:bb:cc:dd:ee:ff"));
        assert_eq!(peer, Peer::new("AA:BB:CC:DD:EE:FF", None, ()));
    }

    #[test]
    fn test_empty_name_is_absent() {
        let peer = Peer::new("00:11:22:33:44:55", Some(String::new()), ());
        assert_eq!(peer.name(), None);
        assert_eq!(peer.to_string(), "00:11:22:33:44:55");

        let named = Peer::new("00:11:22:33:44:55", Some("HC-05".into()), ());
        assert_eq!(named.to_string(), "HC-05 (00:11:22:33:44:55)");
    }
}
