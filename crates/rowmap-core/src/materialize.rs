//! Row materializers.
//!
//! [`FromRow::compile`] turns a `(target type, column shape)` pair into a
//! [`RowFn`]: a closure over a precomputed plan that reads one row and
//! produces one value. There are three paths:
//!
//! - **scalar**: the target is a single wire value (`i32`, `Option<String>`,
//!   an enum, [`Value`]); column 0 is converted through the registry.
//! - **composite**: the target is an [`Entity`]; columns are resolved to
//!   members once, and each row either sets members on a fresh instance or
//!   feeds a selected constructor.
//! - **dynamic**: the target is [`DynamicRow`]; every column is copied and
//!   the row shares one [`DynamicTable`] per result set through [`RowContext`].
//!
//! Conversion failures are reported as [`MapError::ColumnConversion`] with
//! the column index, name and raw value, wrapping the [`CoercionError`].

use std::any::TypeId;
use std::sync::Arc;

use crate::dynamic::{DynamicRow, DynamicTable};
use crate::error::{CoercionError, MapError};
use crate::members::{Construction, ConstructorArgs, Entity, MemberMapCache, Setter};
use crate::options::MapperOptions;
use crate::registry::RegistrySnapshot;
use crate::shape::{ColumnShape, Cursor, RowSource, ShapeHash};
use crate::types::{SqlType, TypeInfo};
use crate::value::Value;

/// A compiled row function.
pub type RowFn<T> =
    Arc<dyn Fn(&dyn RowSource, &mut RowContext) -> Result<T, MapError> + Send + Sync>;

/// State scoped to one result set.
///
/// Compiled row functions are cached across result sets; anything that must
/// be shared only between rows of the same result set lives here.
#[derive(Debug, Default)]
pub struct RowContext {
    table: Option<Arc<DynamicTable>>,
}

impl RowContext {
    pub fn new() -> Self {
        RowContext::default()
    }

    /// The dynamic table created for this result set, if any row needed one.
    pub fn table(&self) -> Option<&Arc<DynamicTable>> {
        self.table.as_ref()
    }
}

/// Everything a compile needs besides the shape.
pub struct CompileContext<'a> {
    pub registry: Arc<RegistrySnapshot>,
    pub members: &'a MemberMapCache,
    pub options: &'a MapperOptions,
}

/// A type that rows can be materialized into.
pub trait FromRow: Sized + Send + Sync + 'static {
    /// Whether a zero-column shape can produce values of this type.
    fn accepts_empty_shape() -> bool {
        false
    }

    fn compile(ctx: &CompileContext<'_>, shape: &ColumnShape) -> Result<RowFn<Self>, MapError>;
}

/// A row function together with the shape it was built for.
pub struct CompiledMaterializer<T> {
    shape_hash: ShapeHash,
    row_fn: RowFn<T>,
}

impl<T> Clone for CompiledMaterializer<T> {
    fn clone(&self) -> Self {
        CompiledMaterializer {
            shape_hash: self.shape_hash,
            row_fn: Arc::clone(&self.row_fn),
        }
    }
}

impl<T> CompiledMaterializer<T> {
    pub fn new(shape_hash: ShapeHash, row_fn: RowFn<T>) -> Self {
        CompiledMaterializer { shape_hash, row_fn }
    }

    pub fn shape_hash(&self) -> ShapeHash {
        self.shape_hash
    }

    pub fn row_fn(&self) -> &RowFn<T> {
        &self.row_fn
    }

    /// A reader for one result set.
    pub fn reader(&self) -> RowReader<T> {
        RowReader {
            row_fn: Arc::clone(&self.row_fn),
            context: RowContext::new(),
        }
    }
}

/// Applies a row function to successive rows of one result set.
pub struct RowReader<T> {
    row_fn: RowFn<T>,
    context: RowContext,
}

impl<T> RowReader<T> {
    pub fn read(&mut self, source: &dyn RowSource) -> Result<T, MapError> {
        (self.row_fn)(source, &mut self.context)
    }

    pub fn context(&self) -> &RowContext {
        &self.context
    }
}

/// The remaining rows of a cursor, read one at a time.
///
/// A row that fails to convert yields its error and the next call moves on
/// to the following row, so rows read before a failure stay with the caller.
/// A cursor error ends the stream.
pub struct Rows<'c, T, C> {
    inner: Option<(RowReader<T>, &'c mut C)>,
}

impl<'c, T, C: Cursor> Rows<'c, T, C> {
    pub fn new(reader: RowReader<T>, cursor: &'c mut C) -> Self {
        Rows {
            inner: Some((reader, cursor)),
        }
    }

    /// A stream that yields nothing.
    pub fn empty() -> Self {
        Rows { inner: None }
    }
}

impl<T, C: Cursor> Iterator for Rows<'_, T, C> {
    type Item = Result<T, MapError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (reader, cursor) = self.inner.as_mut()?;
        match cursor.advance() {
            Ok(true) => Some(reader.read(&**cursor)),
            Ok(false) => {
                self.inner = None;
                None
            }
            Err(err) => {
                self.inner = None;
                Some(Err(err))
            }
        }
    }
}

/// Compiles the scalar path: column 0 converted to `T`.
pub fn compile_scalar<T: SqlType>(
    ctx: &CompileContext<'_>,
    shape: &ColumnShape,
) -> Result<RowFn<T>, MapError> {
    let info = T::type_info();
    let Some(first) = shape.columns().first() else {
        return Err(MapError::EmptyShape {
            type_name: info.name,
        });
    };
    if !ctx.registry.is_readable(&info) {
        return Err(MapError::UnsupportedType {
            type_name: info.name,
            member: first.name.clone(),
        });
    }
    tracing::debug!(
        "Compiled scalar materializer for {} from column '{}' ({})",
        info.name,
        first.name,
        first.wire_type
    );
    let registry = Arc::clone(&ctx.registry);
    let name = first.name.clone();
    Ok(Arc::new(move |source: &dyn RowSource, _: &mut RowContext| {
        let raw = source.read(0)?;
        registry
            .convert(&raw, &info)
            .and_then(T::from_value)
            .map_err(|err| MapError::column(0, &name, raw, err))
    }))
}

struct PropertyBinding<T> {
    index: usize,
    column: String,
    ty: TypeInfo,
    set: Setter<T>,
    reset: Option<fn(&mut T)>,
}

struct ConstructorArg {
    column: Option<(usize, String)>,
    ty: TypeInfo,
}

enum Plan<T> {
    Properties {
        create: fn() -> T,
        bindings: Vec<PropertyBinding<T>>,
    },
    Constructor {
        build: fn(&mut ConstructorArgs) -> Result<T, CoercionError>,
        args: Vec<ConstructorArg>,
    },
}

fn unsupported(ty: &TypeInfo, member: &str) -> MapError {
    MapError::UnsupportedType {
        type_name: ty.name,
        member: member.to_string(),
    }
}

/// Compiles the composite path for an [`Entity`].
pub fn compile_entity<T: Entity>(
    ctx: &CompileContext<'_>,
    shape: &ColumnShape,
) -> Result<RowFn<T>, MapError> {
    let map = ctx.members.get::<T>();
    if shape.is_empty() {
        return Err(MapError::EmptyShape {
            type_name: map.type_name,
        });
    }
    let aliases = ctx.registry.column_map(TypeId::of::<T>()).cloned();

    let plan = match map.select_constructor(shape)? {
        Construction::Parameterless(create) => {
            let mut bindings = Vec::new();
            for (index, column) in shape.columns().iter().enumerate() {
                let Some(member) = map.find_member(
                    &column.name,
                    aliases.as_deref(),
                    ctx.options.match_names_with_underscores,
                ) else {
                    continue;
                };
                let Some(set) = member.set else { continue };
                if !ctx.registry.is_readable(&member.ty) {
                    return Err(unsupported(&member.ty, member.name));
                }
                bindings.push(PropertyBinding {
                    index,
                    column: column.name.clone(),
                    ty: member.ty.clone(),
                    set,
                    reset: member.reset,
                });
            }
            Plan::Properties { create, bindings }
        }
        Construction::Constructor { index, columns } => {
            let ctor = &map.constructors[index];
            let mut args = Vec::with_capacity(ctor.arity());
            for ((param, ty), column) in ctor.params.iter().zip(columns) {
                if !ctx.registry.is_readable(ty) {
                    return Err(unsupported(ty, param));
                }
                args.push(ConstructorArg {
                    column: column.map(|i| (i, shape.columns()[i].name.clone())),
                    ty: ty.clone(),
                });
            }
            Plan::Constructor {
                build: ctor.build,
                args,
            }
        }
    };

    tracing::debug!(
        "Compiled materializer for {} over {} column(s), shape {}",
        map.type_name,
        shape.len(),
        shape.hash()
    );
    let registry = Arc::clone(&ctx.registry);
    Ok(Arc::new(move |source: &dyn RowSource, _: &mut RowContext| match &plan {
        Plan::Properties { create, bindings } => {
            let mut instance = create();
            for binding in bindings {
                let raw = source.read(binding.index)?;
                if raw.is_null() {
                    if let Some(reset) = binding.reset {
                        reset(&mut instance);
                    }
                    continue;
                }
                let assigned = registry
                    .convert(&raw, &binding.ty)
                    .and_then(|value| (binding.set)(&mut instance, value));
                if let Err(err) = assigned {
                    return Err(MapError::column(binding.index, &binding.column, raw, err));
                }
            }
            Ok(instance)
        }
        Plan::Constructor { build, args } => {
            let mut values = Vec::with_capacity(args.len());
            let mut raws = Vec::with_capacity(args.len());
            for arg in args {
                let Some((index, name)) = &arg.column else {
                    values.push(Value::Null);
                    raws.push(Value::Null);
                    continue;
                };
                let raw = source.read(*index)?;
                // Null arguments take the parameter's null default.
                if raw.is_null() {
                    values.push(Value::Null);
                } else {
                    match registry.convert(&raw, &arg.ty) {
                        Ok(value) => values.push(value),
                        Err(err) => return Err(MapError::column(*index, name, raw, err)),
                    }
                }
                raws.push(raw);
            }
            let mut ctor_args = ConstructorArgs::new(values);
            build(&mut ctor_args).map_err(|err| {
                let failed = ctor_args.consumed().saturating_sub(1);
                let (index, name) = args
                    .get(failed)
                    .and_then(|arg| arg.column.clone())
                    .unwrap_or((failed, String::new()));
                let raw = raws.get(failed).cloned().unwrap_or_default();
                MapError::column(index, &name, raw, err)
            })
        }
    }))
}

/// Materializes `None` when column 0 is database null, otherwise `T`.
///
/// Used when several entities are read from one row and a missing joined
/// entity shows up as a null key column.
#[derive(Debug, Clone, PartialEq)]
pub struct NullIfFirstMissing<T>(pub Option<T>);

impl<T> NullIfFirstMissing<T> {
    pub fn into_inner(self) -> Option<T> {
        self.0
    }
}

/// Wraps a compiled row function with the null-first-column check.
pub fn compile_entity_nullable<T: FromRow>(
    ctx: &CompileContext<'_>,
    shape: &ColumnShape,
) -> Result<RowFn<NullIfFirstMissing<T>>, MapError> {
    let inner = T::compile(ctx, shape)?;
    Ok(Arc::new(move |source: &dyn RowSource, row_ctx: &mut RowContext| {
        if source.read(0)?.is_null() {
            return Ok(NullIfFirstMissing(None));
        }
        inner(source, row_ctx).map(|value| NullIfFirstMissing(Some(value)))
    }))
}

impl<T: FromRow> FromRow for NullIfFirstMissing<T> {
    fn compile(ctx: &CompileContext<'_>, shape: &ColumnShape) -> Result<RowFn<Self>, MapError> {
        compile_entity_nullable::<T>(ctx, shape)
    }
}

impl FromRow for DynamicRow {
    fn accepts_empty_shape() -> bool {
        true
    }

    fn compile(_ctx: &CompileContext<'_>, shape: &ColumnShape) -> Result<RowFn<Self>, MapError> {
        let names: Vec<String> = shape.names().map(str::to_string).collect();
        tracing::debug!("Compiled dynamic materializer over {} column(s)", names.len());
        Ok(Arc::new(move |source: &dyn RowSource, row_ctx: &mut RowContext| {
            let table = row_ctx
                .table
                .get_or_insert_with(|| Arc::new(DynamicTable::new(names.iter().cloned())));
            let table = Arc::clone(table);
            let values = (0..names.len())
                .map(|i| source.read(i))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DynamicRow::new(table, values))
        }))
    }
}

macro_rules! scalar_from_row {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromRow for $ty {
                fn compile(
                    ctx: &CompileContext<'_>,
                    shape: &ColumnShape,
                ) -> Result<RowFn<Self>, MapError> {
                    compile_scalar::<Self>(ctx, shape)
                }
            }
        )*
    };
}

scalar_from_row!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    f32,
    f64,
    crate::value::Decimal,
    String,
    char,
    uuid::Uuid,
    chrono::NaiveDateTime,
    chrono::DateTime<chrono::FixedOffset>,
    chrono::TimeDelta,
    Vec<u8>,
    Value,
);

impl<T: SqlType> FromRow for Option<T> {
    fn compile(ctx: &CompileContext<'_>, shape: &ColumnShape) -> Result<RowFn<Self>, MapError> {
        compile_scalar::<Self>(ctx, shape)
    }
}

macro_rules! tuple_entity {
    ($($name:ident => $label:literal),+) => {
        impl<$($name: SqlType),+> Entity for ($($name,)+) {
            fn members() -> Vec<crate::members::Member<Self>> {
                Vec::new()
            }

            fn constructors() -> Vec<crate::members::Constructor<Self>> {
                vec![crate::members::Constructor {
                    params: vec![$(($label, $name::type_info())),+],
                    build: |args| Ok(($(args.next::<$name>()?,)+)),
                }]
            }

            fn positional() -> bool {
                true
            }
        }

        impl<$($name: SqlType),+> FromRow for ($($name,)+) {
            fn compile(
                ctx: &CompileContext<'_>,
                shape: &ColumnShape,
            ) -> Result<RowFn<Self>, MapError> {
                compile_entity::<Self>(ctx, shape)
            }
        }
    };
}

tuple_entity!(A => "Item1", B => "Item2");
tuple_entity!(A => "Item1", B => "Item2", C => "Item3");
tuple_entity!(A => "Item1", B => "Item2", C => "Item3", D => "Item4");
