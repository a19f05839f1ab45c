//! # Data Model
//!
//! Core data structures for duplicate detection: user and IP identifiers,
//! the per-log-line `Record`, and the persisted `UserInfo` aggregate.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Compact identifier for users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl UserId {
    /// Encode as the store key: 8 bytes, big-endian, so lexicographic key
    /// order equals numeric user order.
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Decode from a store key
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        UserId(u64::from_be_bytes(bytes))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> UserId {
        UserId(value)
    }
}

/// An IPv4 address encoded as a 32-bit integer in network byte order.
///
/// Encoding is a total bijection over well-formed dotted-quad strings:
/// [`IpKey::parse`] rejects anything else (IPv6 literals included) with
/// [`Error::InvalidAddress`] instead of producing a silent zero value, and
/// `Display` is its exact inverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IpKey(pub u32);

/// Largest possible IP key (255.255.255.255)
pub const MAX_IP: IpKey = IpKey(u32::MAX);

impl IpKey {
    /// Parse a dotted-quad IPv4 string into its integer key.
    pub fn parse(text: &str) -> Result<Self> {
        let addr =
            Ipv4Addr::from_str(text).map_err(|_| Error::InvalidAddress(text.to_string()))?;
        Ok(IpKey(u32::from(addr)))
    }

    /// The dotted-quad form of this key. Total: every `u32` is an address.
    pub fn to_ipv4(self) -> Ipv4Addr {
        Ipv4Addr::from(self.0)
    }
}

impl fmt::Display for IpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ipv4())
    }
}

impl From<Ipv4Addr> for IpKey {
    fn from(addr: Ipv4Addr) -> IpKey {
        IpKey(u32::from(addr))
    }
}

impl From<IpKey> for Ipv4Addr {
    fn from(key: IpKey) -> Ipv4Addr {
        key.to_ipv4()
    }
}

impl FromStr for IpKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        IpKey::parse(s)
    }
}

/// One observed access-log line: a user seen at an IP address.
///
/// Immutable and short-lived; consumed once by the ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub user_id: UserId,
    pub ip: IpKey,
}

impl Record {
    pub fn new(user_id: UserId, ip: IpKey) -> Self {
        Self { user_id, ip }
    }

    /// Build a record from a raw log line's fields, validating the address.
    pub fn from_text(user_id: u64, ip: &str) -> Result<Self> {
        Ok(Self {
            user_id: UserId(user_id),
            ip: IpKey::parse(ip)?,
        })
    }
}

/// Persisted aggregate: every distinct IP address ever observed for a user.
///
/// Created on the first record for the user, grown by set-union on each
/// subsequent record, never deleted individually. The store hands out owned
/// copies; mutating one does not touch persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: UserId,
    pub ips: BTreeSet<IpKey>,
}

impl UserInfo {
    /// An empty aggregate. Indistinguishable from "user never seen".
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            ips: BTreeSet::new(),
        }
    }

    /// Aggregate with a single observed address
    pub fn with_ip(user_id: UserId, ip: IpKey) -> Self {
        let mut info = Self::empty(user_id);
        info.ips.insert(ip);
        info
    }

    /// Union-merge one address. Idempotent; returns whether the set grew.
    pub fn observe(&mut self, ip: IpKey) -> bool {
        self.ips.insert(ip)
    }

    pub fn ip_count(&self) -> usize {
        self.ips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ips.is_empty()
    }
}
