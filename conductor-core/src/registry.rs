//! Role registry: which role is bound to which address and session.
//!
//! The registry is generic over the session handle `H` so that the server can
//! store its outbound channel here while tests use plain values.

use std::collections::BTreeMap;

use conductor_types::{Address, Role};
use thiserror::Error;

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The role is already bound to a live session.
    #[error("duplicate role: {0}")]
    DuplicateRole(Role),

    /// The role is not registered.
    #[error("unknown role: {0}")]
    UnknownRole(Role),
}

/// A registered role.
#[derive(Debug, Clone)]
pub struct RoleEntry<H> {
    /// Address announced in the handshake.
    pub address: Address,
    /// Handle of the owning session.
    pub handle: H,
}

/// Maps roles to their address and session handle.
#[derive(Debug)]
pub struct RoleRegistry<H> {
    entries: BTreeMap<Role, RoleEntry<H>>,
    /// Sessions waiting for a role that has not registered yet.
    interest: BTreeMap<Role, Vec<H>>,
}

impl<H> Default for RoleRegistry<H> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            interest: BTreeMap::new(),
        }
    }
}

impl<H> RoleRegistry<H> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `role` to `address` and `handle`.
    ///
    /// Returns the handles that were waiting for this role's address.
    pub fn register(
        &mut self,
        role: Role,
        address: Address,
        handle: H,
    ) -> Result<Vec<H>, RegistryError> {
        if self.entries.contains_key(&role) {
            return Err(RegistryError::DuplicateRole(role));
        }
        let waiting = self.interest.remove(&role).unwrap_or_default();
        self.entries.insert(role, RoleEntry { address, handle });
        Ok(waiting)
    }

    /// Look up a role.
    pub fn lookup(&self, role: &Role) -> Result<&RoleEntry<H>, RegistryError> {
        self.entries
            .get(role)
            .ok_or_else(|| RegistryError::UnknownRole(role.clone()))
    }

    /// Address of a role, if registered.
    pub fn address_of(&self, role: &Role) -> Option<&Address> {
        self.entries.get(role).map(|e| &e.address)
    }

    /// Whether the role is currently registered.
    pub fn is_registered(&self, role: &Role) -> bool {
        self.entries.contains_key(role)
    }

    /// Remove `role` only if its entry is owned by the caller.
    ///
    /// A session that lost a race with a newer session for the same role must
    /// not evict the newer binding.
    pub fn unregister(
        &mut self,
        role: &Role,
        owns: impl FnOnce(&H) -> bool,
    ) -> Option<RoleEntry<H>> {
        match self.entries.get(role) {
            Some(entry) if owns(&entry.handle) => self.entries.remove(role),
            _ => None,
        }
    }

    /// Remove `role` unconditionally.
    pub fn remove(&mut self, role: &Role) -> Option<RoleEntry<H>> {
        self.entries.remove(role)
    }

    /// Park `requester` until `role` registers.
    pub fn park_interest(&mut self, role: Role, requester: H) {
        self.interest.entry(role).or_default().push(requester);
    }

    /// Drop every parked interest matching `pred` (e.g. a closed session).
    pub fn drop_interest(&mut self, mut pred: impl FnMut(&H) -> bool) {
        self.interest.retain(|_, waiting| {
            waiting.retain(|h| !pred(h));
            !waiting.is_empty()
        });
    }

    /// Number of parked interests across all roles.
    pub fn interest_count(&self) -> usize {
        self.interest.values().map(Vec::len).sum()
    }

    /// Registered roles in name order.
    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.entries.keys()
    }

    /// Registered entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&Role, &RoleEntry<H>)> {
        self.entries.iter()
    }

    /// Number of registered roles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no role is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove everything, returning the entries.
    pub fn drain(&mut self) -> Vec<(Role, RoleEntry<H>)> {
        self.interest.clear();
        std::mem::take(&mut self.entries).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> Address {
        Address::new("akka.tcp", "Sys", "127.0.0.1", port)
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = RoleRegistry::new();
        reg.register(Role::new("a"), addr(1), 10u32).unwrap();

        let entry = reg.lookup(&Role::new("a")).unwrap();
        assert_eq!(entry.address, addr(1));
        assert_eq!(entry.handle, 10);
        assert!(reg.is_registered(&Role::new("a")));
    }

    #[test]
    fn duplicate_role_rejected() {
        let mut reg = RoleRegistry::new();
        reg.register(Role::new("a"), addr(1), 1u32).unwrap();

        let err = reg.register(Role::new("a"), addr(2), 2u32).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateRole(Role::new("a")));
        // Original binding untouched
        assert_eq!(reg.lookup(&Role::new("a")).unwrap().handle, 1);
    }

    #[test]
    fn lookup_unknown_role() {
        let reg: RoleRegistry<u32> = RoleRegistry::new();
        assert!(matches!(
            reg.lookup(&Role::new("x")),
            Err(RegistryError::UnknownRole(_))
        ));
    }

    #[test]
    fn unregister_requires_ownership() {
        let mut reg = RoleRegistry::new();
        reg.register(Role::new("a"), addr(1), 7u32).unwrap();

        // A stale session (handle 3) cannot evict the live one
        assert!(reg.unregister(&Role::new("a"), |h| *h == 3).is_none());
        assert!(reg.is_registered(&Role::new("a")));

        let removed = reg.unregister(&Role::new("a"), |h| *h == 7).unwrap();
        assert_eq!(removed.handle, 7);
        assert!(reg.is_empty());
    }

    #[test]
    fn role_can_rebind_after_unregister() {
        let mut reg = RoleRegistry::new();
        reg.register(Role::new("a"), addr(1), 1u32).unwrap();
        reg.remove(&Role::new("a"));
        reg.register(Role::new("a"), addr(2), 2u32).unwrap();
        assert_eq!(reg.address_of(&Role::new("a")), Some(&addr(2)));
    }

    #[test]
    fn parked_interest_released_on_register() {
        let mut reg = RoleRegistry::new();
        reg.park_interest(Role::new("late"), 1u32);
        reg.park_interest(Role::new("late"), 2u32);
        assert_eq!(reg.interest_count(), 2);

        let waiting = reg.register(Role::new("late"), addr(9), 3u32).unwrap();
        assert_eq!(waiting, vec![1, 2]);
        assert_eq!(reg.interest_count(), 0);
    }

    #[test]
    fn drop_interest_of_closed_session() {
        let mut reg = RoleRegistry::new();
        reg.park_interest(Role::new("x"), 1u32);
        reg.park_interest(Role::new("y"), 1u32);
        reg.park_interest(Role::new("y"), 2u32);

        reg.drop_interest(|h| *h == 1);
        assert_eq!(reg.interest_count(), 1);

        let waiting = reg.register(Role::new("y"), addr(1), 5u32).unwrap();
        assert_eq!(waiting, vec![2]);
    }

    #[test]
    fn roles_are_listed_in_name_order() {
        let mut reg = RoleRegistry::new();
        for name in ["c", "a", "b"] {
            reg.register(Role::new(name), addr(1), ()).unwrap();
        }
        let names: Vec<_> = reg.roles().map(|r| r.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(reg.len(), 3);
    }
}
