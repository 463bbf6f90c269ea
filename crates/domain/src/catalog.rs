//! Reference data owned by the rest of the marketplace.
//!
//! The booking core only reads these; profile management and the craft
//! catalog write them.

use chrono::{DateTime, Utc};
use common::{CraftId, CraftsmanId, CustomerId, UserId};
use serde::{Deserialize, Serialize};
use store::Version;

use crate::entity::impl_entity;

/// A customer account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub version: Version,
}

impl Customer {
    pub fn new(user_id: UserId) -> Self {
        Self {
            id: CustomerId::new(),
            user_id,
            created_at: Utc::now(),
            version: Version::initial(),
        }
    }
}

/// A craftsman account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Craftsman {
    pub id: CraftsmanId,
    pub user_id: UserId,
    pub craft_id: CraftId,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub version: Version,
}

impl Craftsman {
    pub fn new(user_id: UserId, craft_id: CraftId) -> Self {
        Self {
            id: CraftsmanId::new(),
            user_id,
            craft_id,
            created_at: Utc::now(),
            version: Version::initial(),
        }
    }
}

/// Contact details behind a customer or craftsman. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[serde(skip)]
    pub version: Version,
}

impl UserProfile {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.full_name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Returns the name to show, or `fallback` when none is set.
    pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.full_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(fallback)
    }
}

/// A craft in the catalog (plumbing, carpentry, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Craft {
    pub id: CraftId,
    pub name: String,
    #[serde(skip)]
    pub version: Version,
}

impl Craft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CraftId::new(),
            name: name.into(),
            version: Version::initial(),
        }
    }
}

impl_entity!(Customer, "customer");
impl_entity!(Craftsman, "craftsman");
impl_entity!(UserProfile, "user_profile");
impl_entity!(Craft, "craft");
