//! Registry of protocol roles
//!
//! Components read the roles they need when they are constructed or
//! initialised and keep that snapshot. Updating a role therefore only affects
//! dependents created afterwards: an otoken keeps the controller and logic
//! template it was initialised with.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::{ProtocolError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Controller,
    Oracle,
    Whitelist,
    OtokenFactory,
    OtokenImpl,
    MarginPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBook {
    owner: Address,
    roles: BTreeMap<Role, Address>,
}

impl AddressBook {
    pub fn new(owner: Address) -> Self {
        Self { owner, roles: BTreeMap::new() }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn set(&mut self, caller: Address, role: Role, address: Address) -> Result<()> {
        if caller != self.owner {
            return Err(ProtocolError::NotOwner);
        }
        log::debug!("address book: {:?} -> {}", role, address);
        self.roles.insert(role, address);
        Ok(())
    }

    pub fn get(&self, role: Role) -> Option<Address> {
        self.roles.get(&role).copied()
    }

    /// Role address, or the zero address when unset
    pub fn get_or_zero(&self, role: Role) -> Address {
        self.get(role).unwrap_or(Address::ZERO)
    }

    pub fn otoken_impl(&self) -> Result<Address> {
        self.get(Role::OtokenImpl).ok_or(ProtocolError::ImplementationNotSet)
    }

    pub fn transfer_ownership(&mut self, caller: Address, new_owner: Address) -> Result<()> {
        if caller != self.owner {
            return Err(ProtocolError::NotOwner);
        }
        self.owner = new_owner;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_owner_sets_roles() {
        let owner = Address::from_low_u64(1);
        let random = Address::from_low_u64(2);
        let mut book = AddressBook::new(owner);

        assert_eq!(book.set(random, Role::Controller, random), Err(ProtocolError::NotOwner));
        assert_eq!(book.get(Role::Controller), None);

        book.set(owner, Role::Controller, random).unwrap();
        assert_eq!(book.get(Role::Controller), Some(random));
        assert_eq!(book.get_or_zero(Role::Oracle), Address::ZERO);
        assert_eq!(book.otoken_impl(), Err(ProtocolError::ImplementationNotSet));
    }

    #[test]
    fn ownership_moves() {
        let owner = Address::from_low_u64(1);
        let next = Address::from_low_u64(2);
        let mut book = AddressBook::new(owner);
        book.transfer_ownership(owner, next).unwrap();
        assert_eq!(book.set(owner, Role::Oracle, owner), Err(ProtocolError::NotOwner));
        book.set(next, Role::Oracle, owner).unwrap();
    }
}
