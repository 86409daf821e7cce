// Copyright (c) 2024 Tessera Foundation

//! Admin-key governance values.
//!
//! Governance is carried on chain by three *threads*. Each thread is a
//! single zero-value output that every admin transaction of that thread
//! spends and recreates, so the thread's history is a linear chain of
//! transactions. Root and Provision thread transactions carry key
//! operations; Issue thread transactions mint new coins.

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    ops::Index,
};
use tsr_crypto_keys::PublicKey;

/// A governance role holding a set of authorized keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeySetType {
    /// Authorizes Root thread operations (changes to Root and Provisioning).
    Root,
    /// Authorizes Provision thread operations (changes to Issuing and
    /// Validating).
    Provisioning,
    /// Authorizes Issue thread transactions.
    Issuing,
    /// Keys allowed to sign blocks.
    Validating,
}

impl KeySetType {
    /// All roles, in display order.
    pub const ALL: [KeySetType; 4] = [
        KeySetType::Root,
        KeySetType::Provisioning,
        KeySetType::Issuing,
        KeySetType::Validating,
    ];
}

impl fmt::Display for KeySetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeySetType::Root => "root",
            KeySetType::Provisioning => "provisioning",
            KeySetType::Issuing => "issuing",
            KeySetType::Validating => "validating",
        };
        f.write_str(name)
    }
}

/// One of the three admin threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AdminThread {
    /// Manages Root and Provisioning keys.
    Root,
    /// Manages Issuing and Validating keys.
    Provision,
    /// Mints new coins.
    Issue,
}

impl AdminThread {
    /// The role whose keys may sign for this thread.
    pub fn authorizing_role(&self) -> KeySetType {
        match self {
            AdminThread::Root => KeySetType::Root,
            AdminThread::Provision => KeySetType::Provisioning,
            AdminThread::Issue => KeySetType::Issuing,
        }
    }

    /// Whether an operation on `role` may be carried by this thread.
    pub fn manages(&self, role: KeySetType) -> bool {
        matches!(
            (self, role),
            (AdminThread::Root, KeySetType::Root)
                | (AdminThread::Root, KeySetType::Provisioning)
                | (AdminThread::Provision, KeySetType::Issuing)
                | (AdminThread::Provision, KeySetType::Validating)
        )
    }
}

/// A key operation carried in an admin transaction output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdminOp {
    /// Authorize `key` for `role`.
    AddKey {
        /// Target role.
        role: KeySetType,
        /// Key being added.
        key: PublicKey,
    },
    /// Remove `key` from `role`.
    RevokeKey {
        /// Target role.
        role: KeySetType,
        /// Key being revoked.
        key: PublicKey,
    },
}

impl AdminOp {
    /// The role this operation changes.
    pub fn role(&self) -> KeySetType {
        match self {
            AdminOp::AddKey { role, .. } | AdminOp::RevokeKey { role, .. } => *role,
        }
    }

    /// The key this operation names.
    pub fn key(&self) -> &PublicKey {
        match self {
            AdminOp::AddKey { key, .. } | AdminOp::RevokeKey { key, .. } => key,
        }
    }
}

/// The authorized keys of every role at one point of the chain.
///
/// Values are immutable once attached to a chain node; changes produce a new
/// value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminKeySets {
    root: BTreeSet<PublicKey>,
    provisioning: BTreeSet<PublicKey>,
    issuing: BTreeSet<PublicKey>,
    validating: BTreeSet<PublicKey>,
}

impl AdminKeySets {
    /// Build key sets from per-role key lists.
    pub fn new(
        root: impl IntoIterator<Item = PublicKey>,
        provisioning: impl IntoIterator<Item = PublicKey>,
        issuing: impl IntoIterator<Item = PublicKey>,
        validating: impl IntoIterator<Item = PublicKey>,
    ) -> Self {
        Self {
            root: root.into_iter().collect(),
            provisioning: provisioning.into_iter().collect(),
            issuing: issuing.into_iter().collect(),
            validating: validating.into_iter().collect(),
        }
    }

    /// The keys authorized for `role`.
    pub fn keys(&self, role: KeySetType) -> &BTreeSet<PublicKey> {
        match role {
            KeySetType::Root => &self.root,
            KeySetType::Provisioning => &self.provisioning,
            KeySetType::Issuing => &self.issuing,
            KeySetType::Validating => &self.validating,
        }
    }

    fn keys_mut(&mut self, role: KeySetType) -> &mut BTreeSet<PublicKey> {
        match role {
            KeySetType::Root => &mut self.root,
            KeySetType::Provisioning => &mut self.provisioning,
            KeySetType::Issuing => &mut self.issuing,
            KeySetType::Validating => &mut self.validating,
        }
    }

    /// Whether `key` is authorized for `role`.
    pub fn contains(&self, role: KeySetType, key: &PublicKey) -> bool {
        self.keys(role).contains(key)
    }

    /// Add `key` to `role`. Returns false if it was already present.
    pub fn insert(&mut self, role: KeySetType, key: PublicKey) -> bool {
        self.keys_mut(role).insert(key)
    }

    /// Remove `key` from `role`. Returns false if it was absent.
    pub fn remove(&mut self, role: KeySetType, key: &PublicKey) -> bool {
        self.keys_mut(role).remove(key)
    }

    /// A role-keyed map view, including empty roles.
    pub fn to_map(&self) -> BTreeMap<KeySetType, BTreeSet<PublicKey>> {
        KeySetType::ALL
            .iter()
            .map(|role| (*role, self.keys(*role).clone()))
            .collect()
    }
}

impl Index<KeySetType> for AdminKeySets {
    type Output = BTreeSet<PublicKey>;

    fn index(&self, role: KeySetType) -> &Self::Output {
        self.keys(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> PublicKey {
        PublicKey::from_bytes([byte; 32])
    }

    #[test]
    fn test_insert_and_remove() {
        let mut sets = AdminKeySets::new([key(1)], [key(2)], [], [key(4)]);
        assert!(sets.insert(KeySetType::Issuing, key(3)));
        assert!(!sets.insert(KeySetType::Issuing, key(3)));
        assert!(sets[KeySetType::Issuing].contains(&key(3)));

        assert!(sets.remove(KeySetType::Validating, &key(4)));
        assert!(!sets.remove(KeySetType::Validating, &key(4)));
        assert!(sets[KeySetType::Validating].is_empty());
    }

    #[test]
    fn test_map_view_lists_every_role() {
        let sets = AdminKeySets::new([key(1)], [], [], []);
        let map = sets.to_map();
        assert_eq!(map.len(), 4);
        assert!(map[&KeySetType::Provisioning].is_empty());
        assert!(map[&KeySetType::Root].contains(&key(1)));
    }

    #[test]
    fn test_thread_role_mapping() {
        assert!(AdminThread::Root.manages(KeySetType::Provisioning));
        assert!(!AdminThread::Root.manages(KeySetType::Validating));
        assert!(AdminThread::Provision.manages(KeySetType::Issuing));
        assert!(!AdminThread::Provision.manages(KeySetType::Root));
        assert!(!AdminThread::Issue.manages(KeySetType::Issuing));
        assert_eq!(
            AdminThread::Provision.authorizing_role(),
            KeySetType::Provisioning
        );
    }
}
