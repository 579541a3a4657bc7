//! Binding between a characteristic and an external device property.

use hap_core::{PropertyConfig, PropertyType};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRef {
    pub id: Uuid,
    pub kind: PropertyType,
    /// Allowed string values of an enum formatted property.
    pub format: Option<Vec<String>>,
}

impl PropertyRef {
    pub fn new(id: Uuid, kind: PropertyType) -> Self {
        Self {
            id,
            kind,
            format: None,
        }
    }

    pub fn with_format(mut self, items: Vec<String>) -> Self {
        self.format = Some(items);
        self
    }

    /// True when an update travelling from (or to) the device should be
    /// written into the bound characteristic.
    pub fn accepts_update(&self, from_device: bool) -> bool {
        self.kind.accepts(PropertyType::update_direction(from_device))
    }

    pub fn is_mapped(&self) -> bool {
        self.kind == PropertyType::Mapped
    }
}

impl From<&PropertyConfig> for PropertyRef {
    fn from(config: &PropertyConfig) -> Self {
        Self {
            id: config.id,
            kind: config.kind,
            format: config.format.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_matching() {
        let dynamic = PropertyRef::new(Uuid::nil(), PropertyType::Dynamic);
        let mapped = PropertyRef::new(Uuid::nil(), PropertyType::Mapped);

        assert!(dynamic.accepts_update(true));
        assert!(!dynamic.accepts_update(false));
        assert!(mapped.accepts_update(false));
        assert!(!mapped.accepts_update(true));
        assert!(mapped.is_mapped());
    }
}
