//! Property descriptors: the partial records `defineProperty` and the
//! proxy traps traffic in.

use core_types::{ObjectId, Value};
use memory_manager::{Property, PropertyValue};

/// A partial property descriptor. Absent fields mean "leave alone"
/// during validation and take defaults when a property is created.
#[derive(Debug, Clone, Default)]
pub struct PropertyDescriptor {
    /// `[[Value]]`
    pub value: Option<Value>,
    /// `[[Writable]]`
    pub writable: Option<bool>,
    /// `[[Get]]`; `Some(None)` is an explicit `undefined` getter.
    pub get: Option<Option<ObjectId>>,
    /// `[[Set]]`
    pub set: Option<Option<ObjectId>>,
    /// `[[Enumerable]]`
    pub enumerable: Option<bool>,
    /// `[[Configurable]]`
    pub configurable: Option<bool>,
}

impl PropertyDescriptor {
    /// A full data descriptor.
    pub fn data(value: Value, writable: bool, enumerable: bool, configurable: bool) -> Self {
        Self {
            value: Some(value),
            writable: Some(writable),
            enumerable: Some(enumerable),
            configurable: Some(configurable),
            ..Default::default()
        }
    }

    /// Descriptor with only `[[Value]]` set.
    pub fn value_only(value: Value) -> Self {
        Self {
            value: Some(value),
            ..Default::default()
        }
    }

    /// True when any accessor field is present.
    pub fn is_accessor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    /// True when any data field is present.
    pub fn is_data(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    /// True when neither data nor accessor fields are present.
    pub fn is_generic(&self) -> bool {
        !self.is_accessor() && !self.is_data()
    }

    /// Snapshot of an existing property as a full descriptor.
    pub fn from_property(p: &Property) -> Self {
        match &p.value {
            PropertyValue::Data { value, writable } => Self {
                value: Some(value.clone()),
                writable: Some(*writable),
                enumerable: Some(p.enumerable),
                configurable: Some(p.configurable),
                ..Default::default()
            },
            PropertyValue::Accessor { get, set } => Self {
                get: Some(*get),
                set: Some(*set),
                enumerable: Some(p.enumerable),
                configurable: Some(p.configurable),
                ..Default::default()
            },
        }
    }

    /// Materialize into a concrete property, applying creation
    /// defaults for absent fields.
    pub fn into_property(self) -> Property {
        let value = if self.is_accessor() {
            PropertyValue::Accessor {
                get: self.get.unwrap_or(None),
                set: self.set.unwrap_or(None),
            }
        } else {
            PropertyValue::Data {
                value: self.value.unwrap_or(Value::Undefined),
                writable: self.writable.unwrap_or(false),
            }
        };
        Property {
            value,
            enumerable: self.enumerable.unwrap_or(false),
            configurable: self.configurable.unwrap_or(false),
        }
    }

    /// Apply present fields over an existing property in place.
    pub fn apply_to(&self, p: &mut Property) {
        if self.is_accessor() {
            let (old_get, old_set) = match &p.value {
                PropertyValue::Accessor { get, set } => (*get, *set),
                _ => (None, None),
            };
            p.value = PropertyValue::Accessor {
                get: self.get.unwrap_or(old_get),
                set: self.set.unwrap_or(old_set),
            };
        } else if self.is_data() {
            let (old_value, old_writable) = match &p.value {
                PropertyValue::Data { value, writable } => (value.clone(), *writable),
                _ => (Value::Undefined, false),
            };
            p.value = PropertyValue::Data {
                value: self.value.clone().unwrap_or(old_value),
                writable: self.writable.unwrap_or(old_writable),
            };
        }
        if let Some(e) = self.enumerable {
            p.enumerable = e;
        }
        if let Some(c) = self.configurable {
            p.configurable = c;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_defaults() {
        let p = PropertyDescriptor::value_only(Value::Number(1.0)).into_property();
        match p.value {
            PropertyValue::Data { writable, .. } => assert!(!writable),
            _ => unreachable!(),
        }
        assert!(!p.enumerable);
        assert!(!p.configurable);
    }

    #[test]
    fn test_generic_classification() {
        assert!(PropertyDescriptor::default().is_generic());
        assert!(!PropertyDescriptor::value_only(Value::Null).is_generic());
        let acc = PropertyDescriptor {
            get: Some(None),
            ..Default::default()
        };
        assert!(acc.is_accessor());
        assert!(!acc.is_data());
    }

    #[test]
    fn test_apply_preserves_absent_fields() {
        let mut p = PropertyDescriptor::data(Value::Number(1.0), true, true, true).into_property();
        PropertyDescriptor::value_only(Value::Number(2.0)).apply_to(&mut p);
        match &p.value {
            PropertyValue::Data { value, writable } => {
                assert_eq!(value.as_number(), Some(2.0));
                assert!(*writable);
            }
            _ => unreachable!(),
        }
        assert!(p.enumerable);
    }
}
