use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Canonical map key for the connection between a pair of users.
pub fn conn_key(offerer: &str, answerer: &str) -> String {
    format!("{}|{}", offerer, answerer)
}

/// Enumerates every unordered pair of members in negotiation order:
/// walk the membership list newest-first, pairing each member with every
/// earlier one. The later-joined member of a pair is always the offerer,
/// so roles are reproducible from the membership list alone.
pub fn pairings(users: &[String]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for i in (0..users.len()).rev() {
        for j in (0..i).rev() {
            pairs.push((users[i].clone(), users[j].clone()));
        }
    }
    pairs
}

/// Membership and per-pair signaling state for one room. Stored as a
/// single value and mutated only inside CAS read-modify-write cycles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Room {
    /// Participant ids in arrival order. Order drives role assignment.
    pub users: Vec<String>,
    /// Connection records keyed by `conn_key`. Only pairs whose both
    /// members are currently in `users` have an entry.
    pub conns: HashMap<String, Connection>,
}

/// Signaling state for one unordered pair of participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub offerer: String,
    pub answerer: String,
    /// Monotonic per-room renegotiation counter. Never reused.
    pub seq: u64,
    /// De-bounces error-triggered bumps: a bump arms the flag, the next
    /// error report on the pair clears it instead of bumping again.
    pub pending_error_ack: bool,
}

/// One entry of the connection list returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnState {
    pub offerer: String,
    pub answerer: String,
    pub seq: u64,
}

impl Room {
    pub fn occupancy(&self) -> usize {
        self.users.len()
    }

    pub fn has_user(&self, uid: &str) -> bool {
        self.users.iter().any(|u| u == uid)
    }

    /// Appends without a membership check; callers guard with `has_user`.
    pub fn add_user(&mut self, uid: &str) {
        self.users.push(uid.to_string());
    }

    /// Removes the user and every connection record referencing it.
    pub fn remove_user(&mut self, uid: &str) {
        self.users.retain(|u| u != uid);
        self.conns
            .retain(|_, c| c.offerer != uid && c.answerer != uid);
    }
}
