//! Store mapping for domain entities.

/// Implements [`store::Entity`] for a struct with an `id` field of a
/// `common` identifier type and a `#[serde(skip)] version` field.
macro_rules! impl_entity {
    ($ty:ty, $kind:literal) => {
        impl store::Entity for $ty {
            const KIND: &'static str = $kind;

            fn entity_id(&self) -> uuid::Uuid {
                self.id.as_uuid()
            }

            fn version(&self) -> store::Version {
                self.version
            }

            fn set_version(&mut self, version: store::Version) {
                self.version = version;
            }
        }
    };
}

pub(crate) use impl_entity;
