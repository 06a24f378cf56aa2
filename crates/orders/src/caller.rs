//! Identity of the user behind a request.

use common::{StoreId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Seller,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "customer" => Some(Role::Customer),
            "seller" => Some(Role::Seller),
            _ => None,
        }
    }
}

/// An authenticated user as supplied by the identity provider.
///
/// Sellers normally carry the store they run; a seller without a store can
/// authenticate but cannot act on orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
    pub store_id: Option<StoreId>,
}

impl Caller {
    pub fn customer(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Customer,
            store_id: None,
        }
    }

    pub fn seller(user_id: UserId, store_id: Option<StoreId>) -> Self {
        Self {
            user_id,
            role: Role::Seller,
            store_id,
        }
    }

    pub fn is_seller(&self) -> bool {
        self.role == Role::Seller
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("customer"), Some(Role::Customer));
        assert_eq!(Role::parse("seller"), Some(Role::Seller));
        assert_eq!(Role::parse("admin"), None);
    }

    #[test]
    fn test_constructors() {
        let user = UserId::new();
        let store = StoreId::new();

        assert!(!Caller::customer(user).is_seller());
        let seller = Caller::seller(user, Some(store));
        assert!(seller.is_seller());
        assert_eq!(seller.store_id, Some(store));
    }
}
