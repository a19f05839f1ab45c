//! # Duplicate-Detection Engine
//!
//! Pure set-intersection logic: two accounts are duplicates once their IP
//! sets share at least a threshold number of addresses. No I/O, no state.

use crate::model::IpKey;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

/// Default duplicate threshold: two accounts are duplicates once they share
/// at least this many distinct IP addresses. A single shared IP is treated
/// as coincidental (shared NAT, proxy), not evidence of duplication.
pub const DEFAULT_DUPLICATE_THRESHOLD: usize = 2;

/// Presence state for an address of the left-hand set.
const SEEN_IN_A: u8 = 1;
/// The address has already been counted as common; never count it twice.
const COUNTED: u8 = 2;

/// Whether `a` and `b` share at least `n` distinct IP addresses.
///
/// Builds a presence map over `a` (counts capped at [`COUNTED`], since only
/// "seen in a" vs "seen in both" matters), then scans `b` with a running
/// commons counter, returning the instant it reaches `n`.
///
/// `n == 0` is vacuously satisfied and always returns `true`, including for
/// empty sets. Empty sets never match for `n >= 1`.
///
/// O(|a| + |b|) time, O(|a|) auxiliary space; the result does not depend on
/// set iteration order.
pub fn has_n_common(a: &BTreeSet<IpKey>, b: &BTreeSet<IpKey>, n: usize) -> bool {
    if n == 0 {
        return true;
    }
    if a.is_empty() || b.is_empty() || n > a.len().min(b.len()) {
        return false;
    }

    let mut presence: FxHashMap<IpKey, u8> =
        FxHashMap::with_capacity_and_hasher(a.len(), Default::default());
    for ip in a {
        presence.insert(*ip, SEEN_IN_A);
    }

    let mut commons = 0;
    for ip in b {
        if let Some(state) = presence.get_mut(ip) {
            if *state == SEEN_IN_A {
                *state = COUNTED;
                commons += 1;
                if commons >= n {
                    return true;
                }
            }
        }
    }
    false
}
