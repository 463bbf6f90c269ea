use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

entity_id!(
    /// Identifies a customer-authored job posting.
    ServiceRequestId
);

entity_id!(
    /// Identifies a craftsman's bid against a service request.
    OfferId
);

entity_id!(
    /// Identifies a confirmed engagement between customer and craftsman.
    BookingId
);

entity_id!(
    /// Identifies a single payment attempt against a booking.
    PaymentId
);

entity_id!(
    /// Identifies a customer account.
    CustomerId
);

entity_id!(
    /// Identifies a craftsman account.
    CraftsmanId
);

entity_id!(
    /// Identifies a craft (plumbing, carpentry, ...) in the catalog.
    CraftId
);

entity_id!(
    /// Identifies the user profile behind a customer or craftsman.
    UserId
);
