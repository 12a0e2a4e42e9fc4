//! Type coercion registry.
//!
//! Maps language types to wire types and wire values back to language values.
//! The table is held as an immutable [`RegistrySnapshot`] behind an
//! [`ArcSwap`]: readers load the current snapshot without locking, writers
//! clone it, change the clone and publish it in one atomic swap.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::convert::{coerce_enum, coerce_scalar};
use crate::error::CoercionError;
use crate::members::ColumnMap;
use crate::types::{ScalarKind, TypeInfo, TypeKind};
use crate::value::{Value, WireType};

/// User-supplied conversion for one language type.
///
/// Converters take precedence over every built-in rule for the type they are
/// registered on. `from_wire` must return a value the type's
/// [`SqlType::from_value`](crate::types::SqlType::from_value) accepts.
pub trait TypeConverter: Send + Sync {
    fn wire_type(&self) -> WireType;

    /// Language value (as produced by `to_value`) to the value sent to the driver.
    fn to_wire(&self, value: &Value) -> Result<Value, CoercionError>;

    /// Non-null wire value to the canonical language value.
    fn from_wire(&self, value: &Value) -> Result<Value, CoercionError>;
}

/// Result of [`RegistrySnapshot::wire_type_of`].
#[derive(Debug, Clone, PartialEq)]
pub enum WireMapping {
    Single(WireType),
    /// Enumerable value; the binder expands it into one parameter per element.
    MultiValue(TypeInfo),
}

/// One immutable version of the registry.
#[derive(Clone)]
pub struct RegistrySnapshot {
    mappings: HashMap<TypeId, WireType>,
    converters: HashMap<TypeId, Arc<dyn TypeConverter>>,
    column_maps: HashMap<TypeId, Arc<ColumnMap>>,
}

impl fmt::Debug for RegistrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrySnapshot")
            .field("mappings", &self.mappings.len())
            .field("converters", &self.converters.len())
            .field("column_maps", &self.column_maps.len())
            .finish()
    }
}

impl RegistrySnapshot {
    /// Snapshot holding only the built-in scalar table.
    pub fn with_builtins() -> Self {
        let mappings = ScalarKind::ALL
            .iter()
            .map(|kind| (kind.type_id(), kind.default_wire_type()))
            .collect();
        RegistrySnapshot {
            mappings,
            converters: HashMap::new(),
            column_maps: HashMap::new(),
        }
    }

    /// Wire type for a language type, or `None` when it is not supported.
    ///
    /// Lookup order: strip `Option`, replace an enum by its underlying
    /// integer type, the type table, registered converters, then lists.
    pub fn wire_type_of(&self, ty: &TypeInfo) -> Option<WireMapping> {
        let target = ty.non_nullable();
        let id = match &target.kind {
            TypeKind::Enum(info) => info.underlying.type_id(),
            _ => target.id,
        };
        if let Some(wire) = self.mappings.get(&id) {
            return Some(WireMapping::Single(*wire));
        }
        if let Some(converter) = self.converters.get(&target.id) {
            return Some(WireMapping::Single(converter.wire_type()));
        }
        match &target.kind {
            TypeKind::List(element) => Some(WireMapping::MultiValue((**element).clone())),
            _ => None,
        }
    }

    /// Whether a single column can be read into `ty`.
    pub fn is_readable(&self, ty: &TypeInfo) -> bool {
        let target = ty.non_nullable();
        match target.kind {
            TypeKind::Scalar(_) | TypeKind::Enum(_) => true,
            TypeKind::List(_) => false,
            _ => self.mappings.contains_key(&target.id) || self.converters.contains_key(&target.id),
        }
    }

    /// Converts a wire value into the canonical value for `ty`.
    pub fn convert(&self, value: &Value, ty: &TypeInfo) -> Result<Value, CoercionError> {
        if value.is_null() {
            return if ty.accepts_null() {
                Ok(Value::Null)
            } else {
                Err(CoercionError::NullToNonNullable { target: ty.name })
            };
        }
        let target = ty.non_nullable();
        if let Some(converter) = self.converters.get(&target.id) {
            return converter.from_wire(value);
        }
        match &target.kind {
            TypeKind::Scalar(kind) => coerce_scalar(value, *kind),
            TypeKind::Enum(info) => coerce_enum(value, info, target.name),
            TypeKind::List(element) => match value {
                Value::List(items) => items
                    .iter()
                    .map(|item| self.convert(item, element))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List),
                other => Err(CoercionError::Incompatible {
                    from: other.type_name(),
                    target: target.name,
                }),
            },
            TypeKind::Nullable(_) | TypeKind::Opaque => Ok(value.clone()),
        }
    }

    /// Converts a language value into the value handed to the driver.
    pub fn to_wire(&self, value: Value, ty: &TypeInfo) -> Result<Value, CoercionError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self.converters.get(&ty.non_nullable().id) {
            Some(converter) => converter.to_wire(&value),
            None => Ok(value),
        }
    }

    pub fn column_map(&self, id: TypeId) -> Option<&Arc<ColumnMap>> {
        self.column_maps.get(&id)
    }

    pub fn has_converter(&self, id: TypeId) -> bool {
        self.converters.contains_key(&id)
    }
}

impl Default for RegistrySnapshot {
    fn default() -> Self {
        RegistrySnapshot::with_builtins()
    }
}

/// Copy-on-write registry shared by every compile.
pub struct TypeRegistry {
    current: ArcSwap<RegistrySnapshot>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry {
            current: ArcSwap::from_pointee(RegistrySnapshot::with_builtins()),
        }
    }

    /// The current table. Later registrations do not affect a loaded snapshot.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    /// Maps a language type to a wire type, replacing any previous mapping.
    pub fn register_type_mapping(&self, id: TypeId, wire: WireType) {
        self.current.rcu(|current| {
            let mut next = RegistrySnapshot::clone(current);
            next.mappings.insert(id, wire);
            next
        });
    }

    /// Installs a converter. Any table mapping for the type is dropped so the
    /// converter's wire type wins.
    pub fn register_converter(&self, id: TypeId, converter: Arc<dyn TypeConverter>) {
        self.current.rcu(|current| {
            let mut next = RegistrySnapshot::clone(current);
            next.mappings.remove(&id);
            next.converters.insert(id, Arc::clone(&converter));
            next
        });
    }

    pub fn register_column_map(&self, id: TypeId, map: ColumnMap) {
        let map = Arc::new(map);
        self.current.rcu(|current| {
            let mut next = RegistrySnapshot::clone(current);
            next.column_maps.insert(id, Arc::clone(&map));
            next
        });
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        TypeRegistry::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeRegistry").field(&*self.current.load()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlType;

    struct YesNo;

    impl TypeConverter for YesNo {
        fn wire_type(&self) -> WireType {
            WireType::StringFixedLength
        }

        fn to_wire(&self, value: &Value) -> Result<Value, CoercionError> {
            match value {
                Value::Bool(true) => Ok(Value::Text("Y".into())),
                Value::Bool(false) => Ok(Value::Text("N".into())),
                other => Err(CoercionError::Incompatible {
                    from: other.type_name(),
                    target: "bool",
                }),
            }
        }

        fn from_wire(&self, value: &Value) -> Result<Value, CoercionError> {
            match value.as_str() {
                Some("Y") => Ok(Value::Bool(true)),
                Some("N") => Ok(Value::Bool(false)),
                _ => Err(CoercionError::Custom(format!("expected Y or N, got {value}"))),
            }
        }
    }

    #[test]
    fn builtin_wire_types() {
        let snapshot = RegistrySnapshot::with_builtins();
        assert_eq!(
            snapshot.wire_type_of(&i32::type_info()),
            Some(WireMapping::Single(WireType::Int32))
        );
        assert_eq!(
            snapshot.wire_type_of(&<Option<char>>::type_info()),
            Some(WireMapping::Single(WireType::StringFixedLength))
        );
        assert_eq!(
            snapshot.wire_type_of(&<Vec<u8>>::type_info()),
            Some(WireMapping::Single(WireType::Binary))
        );
        assert_eq!(
            snapshot.wire_type_of(&<Vec<i64>>::type_info()),
            Some(WireMapping::MultiValue(i64::type_info()))
        );
    }

    #[test]
    fn opaque_types_are_unsupported_until_registered() {
        struct Money;
        let registry = TypeRegistry::new();
        let info = TypeInfo::opaque::<Money>();
        assert_eq!(registry.snapshot().wire_type_of(&info), None);

        registry.register_type_mapping(TypeId::of::<Money>(), WireType::Decimal);
        assert_eq!(
            registry.snapshot().wire_type_of(&info),
            Some(WireMapping::Single(WireType::Decimal))
        );
    }

    #[test]
    fn null_into_nullable_and_non_nullable() {
        let snapshot = RegistrySnapshot::with_builtins();
        assert_eq!(
            snapshot.convert(&Value::Null, &<Option<i32>>::type_info()),
            Ok(Value::Null)
        );
        assert_eq!(
            snapshot.convert(&Value::Null, &Value::type_info()),
            Ok(Value::Null)
        );
        assert!(matches!(
            snapshot.convert(&Value::Null, &i32::type_info()),
            Err(CoercionError::NullToNonNullable { .. })
        ));
    }

    #[test]
    fn converter_takes_precedence_over_builtins() {
        let registry = TypeRegistry::new();
        let before = registry.snapshot();
        registry.register_converter(TypeId::of::<bool>(), Arc::new(YesNo));
        let after = registry.snapshot();

        assert_eq!(
            after.convert(&Value::Text("Y".into()), &bool::type_info()),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            after.wire_type_of(&bool::type_info()),
            Some(WireMapping::Single(WireType::StringFixedLength))
        );
        assert_eq!(
            after.to_wire(Value::Bool(false), &<Option<bool>>::type_info()),
            Ok(Value::Text("N".into()))
        );

        // A snapshot loaded before registration is unaffected.
        assert_eq!(
            before.wire_type_of(&bool::type_info()),
            Some(WireMapping::Single(WireType::Boolean))
        );
    }

    #[test]
    fn converts_lists_elementwise() {
        let snapshot = RegistrySnapshot::with_builtins();
        let converted = snapshot.convert(
            &Value::List(vec![Value::I64(1), Value::Text("2".into())]),
            &<Vec<i32>>::type_info(),
        );
        assert_eq!(converted, Ok(Value::List(vec![Value::I32(1), Value::I32(2)])));
    }
}
