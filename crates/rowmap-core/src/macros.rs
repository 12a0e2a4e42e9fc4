//! Declarative glue for user types.
//!
//! [`sql_enum!`](crate::sql_enum) declares a fieldless enum that maps to an
//! integer column (or its variant name). [`entity!`](crate::entity) describes
//! the members of an existing struct so it can be materialized from rows and
//! used as a parameter source.

/// Declares a fieldless enum with an integer representation.
///
/// The first variant is the default and the value used for database null.
///
/// ```
/// rowmap_core::sql_enum!(pub Status: i16 { Active, Suspended = 5 });
///
/// assert_eq!(Status::default(), Status::Active);
/// assert_eq!(Status::Suspended as i16, 5);
/// ```
#[macro_export]
macro_rules! sql_enum {
    (
        $(#[$meta:meta])*
        $vis:vis $ty:ident : $repr:ident {
            $first:ident $(= $first_disc:literal)?
            $(, $rest:ident $(= $rest_disc:literal)?)* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        #[repr($repr)]
        $vis enum $ty {
            #[default]
            $first $(= $first_disc)?,
            $($rest $(= $rest_disc)?,)*
        }

        impl $crate::types::SqlEnum for $ty {
            const VARIANTS: &'static [(&'static str, i64)] = &[
                (stringify!($first), $ty::$first as i64),
                $((stringify!($rest), $ty::$rest as i64),)*
            ];

            fn underlying() -> $crate::types::ScalarKind {
                $crate::types::scalar_kind_of::<$repr>()
            }

            fn from_discriminant(value: i64) -> Option<Self> {
                [$ty::$first $(, $ty::$rest)*]
                    .into_iter()
                    .find(|variant| *variant as i64 == value)
            }

            fn discriminant(self) -> i64 {
                self as i64
            }

            fn default_variant() -> Self {
                $ty::$first
            }
        }

        impl $crate::types::SqlType for $ty {
            fn type_info() -> $crate::types::TypeInfo {
                $crate::types::enum_type_info::<$ty>()
            }

            fn from_value(
                value: $crate::value::Value,
            ) -> Result<Self, $crate::error::CoercionError> {
                $crate::types::enum_from_value::<$ty>(value)
            }

            fn to_value(&self) -> $crate::value::Value {
                $crate::types::enum_to_value(*self)
            }

            fn null_default() -> Self {
                <$ty as $crate::types::SqlEnum>::default_variant()
            }
        }

        impl $crate::types::ListElement for $ty {}

        impl $crate::materialize::FromRow for $ty {
            fn compile(
                ctx: &$crate::materialize::CompileContext<'_>,
                shape: &$crate::shape::ColumnShape,
            ) -> Result<$crate::materialize::RowFn<Self>, $crate::error::MapError> {
                $crate::materialize::compile_scalar::<Self>(ctx, shape)
            }
        }
    };
}

/// Describes the members of a struct that implements `Default`.
///
/// Each field becomes a settable, gettable member named after the field or
/// after the given alias. The struct gets [`Entity`](crate::members::Entity),
/// [`FromRow`](crate::materialize::FromRow) and
/// [`ToParams`](crate::bind::ToParams).
///
/// ```
/// #[derive(Debug, Default)]
/// struct Order {
///     id: i64,
///     note: Option<String>,
/// }
///
/// rowmap_core::entity! {
///     Order {
///         id: i64 => "OrderId",
///         note: Option<String>,
///     }
/// }
///
/// use rowmap_core::Entity;
/// let names: Vec<_> = Order::members().iter().map(|m| m.name).collect();
/// assert_eq!(names, ["OrderId", "note"]);
/// ```
#[macro_export]
macro_rules! entity {
    (
        $ty:ident {
            $($field:ident : $fty:ty $(=> $alias:literal)?),* $(,)?
        }
    ) => {
        impl $crate::members::Entity for $ty {
            fn members() -> Vec<$crate::members::Member<Self>> {
                vec![$(
                    $crate::members::Member::new(
                        $crate::__member_name!($field $($alias)?),
                        <$fty as $crate::types::SqlType>::type_info(),
                    )
                    .with_setter(|target: &mut $ty, value: $crate::value::Value| {
                        target.$field = <$fty as $crate::types::SqlType>::from_value(value)?;
                        Ok(())
                    })
                    .with_reset(|target: &mut $ty| {
                        target.$field = <$fty as $crate::types::SqlType>::null_default();
                    })
                    .with_getter(|source: &$ty| {
                        $crate::types::SqlType::to_value(&source.$field)
                    })
                ),*]
            }

            fn parameterless() -> Option<fn() -> Self> {
                Some(<$ty as Default>::default as fn() -> Self)
            }
        }

        impl $crate::materialize::FromRow for $ty {
            fn compile(
                ctx: &$crate::materialize::CompileContext<'_>,
                shape: &$crate::shape::ColumnShape,
            ) -> Result<$crate::materialize::RowFn<Self>, $crate::error::MapError> {
                $crate::materialize::compile_entity::<Self>(ctx, shape)
            }
        }

        impl $crate::bind::ToParams for $ty {
            fn compile_binder(
                ctx: &$crate::materialize::CompileContext<'_>,
                sql: &str,
                kind: $crate::identity::CommandKind,
            ) -> Result<$crate::bind::BindFn<Self>, $crate::error::MapError> {
                $crate::bind::compile_entity_binder::<Self>(ctx, sql, kind)
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __member_name {
    ($field:ident) => {
        stringify!($field)
    };
    ($field:ident $alias:literal) => {
        $alias
    };
}

#[cfg(test)]
mod tests {
    use crate::members::Entity;
    use crate::types::{SqlEnum, SqlType, TypeKind};
    use crate::value::Value;

    crate::sql_enum!(Level: u8 { Low = 1, High = 9 });

    #[derive(Debug, Default)]
    struct Reading {
        level: Level,
        value: f64,
    }

    crate::entity! {
        Reading {
            level: Level => "Lvl",
            value: f64,
        }
    }

    #[test]
    fn enum_variants_carry_explicit_discriminants() {
        assert_eq!(Level::VARIANTS, &[("Low", 1), ("High", 9)]);
        assert_eq!(Level::from_discriminant(9), Some(Level::High));
        assert_eq!(Level::from_discriminant(2), None);
        assert_eq!(Level::High.to_value(), Value::U8(9));
        assert!(matches!(Level::type_info().kind, TypeKind::Enum(_)));
    }

    #[test]
    fn entity_members_use_aliases_and_reset_to_null_default() {
        let members = Reading::members();
        let names: Vec<_> = members.iter().map(|m| m.name).collect();
        assert_eq!(names, ["Lvl", "value"]);

        let mut reading = Reading {
            level: Level::High,
            value: 2.5,
        };
        let get = members[1].get.unwrap();
        assert_eq!(get(&reading), Value::F64(2.5));

        let reset = members[0].reset.unwrap();
        reset(&mut reading);
        assert_eq!(reading.level, Level::Low);

        let set = members[0].set.unwrap();
        set(&mut reading, Value::from("high")).unwrap();
        assert_eq!(reading.level, Level::High);
    }
}
