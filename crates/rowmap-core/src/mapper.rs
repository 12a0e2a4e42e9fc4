//! The [`Mapper`] facade.
//!
//! A mapper owns one type registry, one member-map cache, one query cache and
//! its options. Execution layers hold a mapper (or use [`Mapper::shared`]) and
//! go through it for every materializer and binder.

use std::any::TypeId;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::bind::{Command, CompiledBinder, ToParams};
use crate::cache::{CacheSlot, QueryCache};
use crate::error::MapError;
use crate::identity::Identity;
use crate::materialize::{CompileContext, CompiledMaterializer, FromRow, Rows};
use crate::members::{ColumnMap, MemberMapCache};
use crate::options::MapperOptions;
use crate::registry::{TypeConverter, TypeRegistry};
use crate::shape::{ColumnShape, Cursor};
use crate::value::WireType;

pub struct Mapper {
    registry: TypeRegistry,
    members: MemberMapCache,
    cache: QueryCache,
    options: MapperOptions,
}

impl Mapper {
    pub fn new(options: MapperOptions) -> Self {
        Mapper {
            registry: TypeRegistry::new(),
            members: MemberMapCache::new(),
            cache: QueryCache::from_options(&options),
            options,
        }
    }

    /// Process-wide mapper with default options, built on first use.
    pub fn shared() -> &'static Mapper {
        static SHARED: OnceLock<Mapper> = OnceLock::new();
        SHARED.get_or_init(Mapper::default)
    }

    pub fn options(&self) -> &MapperOptions {
        &self.options
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    fn context(&self) -> CompileContext<'_> {
        CompileContext {
            registry: self.registry.snapshot(),
            members: &self.members,
            options: &self.options,
        }
    }

    /// Materializer for `T` over `shape`, reusing the cached one when the
    /// shape hash still matches.
    pub fn materializer<T: FromRow>(
        &self,
        identity: &Identity,
        shape: &ColumnShape,
    ) -> Result<CompiledMaterializer<T>, MapError> {
        self.cache
            .get_or_compile_materializer(identity, &self.context(), shape)
    }

    pub fn binder<P: ToParams>(&self, identity: &Identity) -> Result<CompiledBinder<P>, MapError> {
        self.cache.get_or_compile_binder(identity, &self.context())
    }

    /// Binds `params` into `command` with the cached binder for `identity`.
    pub fn bind<P: ToParams>(
        &self,
        identity: &Identity,
        command: &mut dyn Command,
        params: &P,
    ) -> Result<(), MapError> {
        self.binder::<P>(identity)?.bind(command, params)
    }

    /// Starts one use of `identity`. The cache slot is looked up here, once,
    /// and counts as a single hit however many artifacts the execution needs.
    pub fn execution<'a>(&'a self, identity: &'a Identity) -> Execution<'a> {
        Execution {
            mapper: self,
            identity,
            slot: self.cache.slot(identity),
        }
    }

    /// Streams the remaining rows of `cursor` as `T`.
    pub fn rows<'c, T: FromRow, C: Cursor>(
        &self,
        identity: &Identity,
        cursor: &'c mut C,
    ) -> Result<Rows<'c, T, C>, MapError> {
        self.execution(identity).rows(cursor)
    }

    /// Reads every remaining row of `cursor` as `T`.
    ///
    /// A cursor without columns yields no rows and compiles nothing. Stops at
    /// the first failing row; use [`rows`](Self::rows) to keep the rows read
    /// before it.
    pub fn read_all<T: FromRow, C: Cursor>(
        &self,
        identity: &Identity,
        cursor: &mut C,
    ) -> Result<Vec<T>, MapError> {
        self.rows(identity, cursor)?.collect()
    }

    /// Maps `T` to `wire` and drops every cached artifact.
    pub fn register_type_mapping<T: 'static>(&self, wire: WireType) {
        self.registry.register_type_mapping(TypeId::of::<T>(), wire);
        self.invalidate::<T>();
    }

    pub fn register_converter<T: 'static>(&self, converter: impl TypeConverter + 'static) {
        self.registry
            .register_converter(TypeId::of::<T>(), Arc::new(converter));
        self.invalidate::<T>();
    }

    pub fn register_column_map<T: 'static>(&self, map: ColumnMap) {
        self.registry.register_column_map(TypeId::of::<T>(), map);
        self.invalidate::<T>();
    }

    // Compiled artifacts capture the registry snapshot they were built with,
    // and a scalar may be a member of any entity, so everything goes.
    fn invalidate<T: 'static>(&self) {
        self.members.purge(TypeId::of::<T>());
        self.cache.clear();
    }

    /// Drops cached artifacts whose identity names `T` as target or
    /// parameter type. Returns the number of slots removed.
    ///
    /// Only identities that name `T` directly are dropped. An entity whose
    /// members have type `T` keeps its compiled artifacts; use
    /// [`purge_cache`](Self::purge_cache) when those must go too.
    pub fn purge_type<T: 'static>(&self) -> usize {
        self.members.purge(TypeId::of::<T>());
        self.cache.purge_type(TypeId::of::<T>())
    }

    pub fn purge_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn hit_count(&self, identity: &Identity) -> Option<u64> {
        self.cache.hit_count(identity)
    }

    /// Removes cold cache slots now instead of waiting for the next sweep.
    pub fn sweep(&self) -> usize {
        self.cache.sweep()
    }
}

/// One use of an [`Identity`] against a [`Mapper`].
///
/// Binding the parameters and reading the results of a single command go
/// through the same cache slot.
pub struct Execution<'a> {
    mapper: &'a Mapper,
    identity: &'a Identity,
    slot: Arc<CacheSlot>,
}

impl Execution<'_> {
    pub fn identity(&self) -> &Identity {
        self.identity
    }

    pub fn binder<P: ToParams>(&self) -> Result<CompiledBinder<P>, MapError> {
        self.mapper
            .cache
            .binder_in(&self.slot, self.identity, &self.mapper.context())
    }

    pub fn bind<P: ToParams>(&self, command: &mut dyn Command, params: &P) -> Result<(), MapError> {
        self.binder::<P>()?.bind(command, params)
    }

    pub fn materializer<T: FromRow>(
        &self,
        shape: &ColumnShape,
    ) -> Result<CompiledMaterializer<T>, MapError> {
        self.mapper
            .cache
            .materializer_in(&self.slot, self.identity, &self.mapper.context(), shape)
    }

    /// Streams the remaining rows of `cursor`; a cursor without columns
    /// yields nothing.
    pub fn rows<'c, T: FromRow, C: Cursor>(
        &self,
        cursor: &'c mut C,
    ) -> Result<Rows<'c, T, C>, MapError> {
        let shape = ColumnShape::from_source(&*cursor);
        if shape.is_empty() {
            return Ok(Rows::empty());
        }
        let materializer = self.materializer::<T>(&shape)?;
        Ok(Rows::new(materializer.reader(), cursor))
    }
}

impl Default for Mapper {
    fn default() -> Self {
        Mapper::new(MapperOptions::default())
    }
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("options", &self.options)
            .field("cached", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoercionError;
    use crate::identity::CommandKind;
    use crate::memory::MemoryCursor;
    use crate::value::Value;

    struct Upper;

    impl TypeConverter for Upper {
        fn wire_type(&self) -> WireType {
            WireType::String
        }

        fn to_wire(&self, value: &Value) -> Result<Value, CoercionError> {
            Ok(value.clone())
        }

        fn from_wire(&self, value: &Value) -> Result<Value, CoercionError> {
            Ok(Value::Text(value.to_string().to_uppercase()))
        }
    }

    fn cursor(values: &[&str]) -> MemoryCursor {
        MemoryCursor::new(
            ColumnShape::of(&[("s", WireType::String)]),
            values.iter().map(|v| vec![Value::from(*v)]).collect(),
        )
    }

    #[test]
    fn read_all_uses_the_cache() {
        let mapper = Mapper::default();
        let id = Identity::new("select s", CommandKind::Text, "mem").with_target::<String>();
        let rows: Vec<String> = mapper.read_all(&id, &mut cursor(&["a", "b"])).unwrap();
        assert_eq!(rows, vec!["a", "b"]);
        let _: Vec<String> = mapper.read_all(&id, &mut cursor(&["c"])).unwrap();
        assert_eq!(mapper.cache_len(), 1);
        assert_eq!(mapper.hit_count(&id), Some(1));
    }

    #[test]
    fn registering_a_converter_invalidates_compiled_artifacts() {
        let mapper = Mapper::default();
        let id = Identity::new("select s", CommandKind::Text, "mem").with_target::<String>();
        let before: Vec<String> = mapper.read_all(&id, &mut cursor(&["a"])).unwrap();
        assert_eq!(before, vec!["a"]);

        mapper.register_converter::<String>(Upper);
        assert_eq!(mapper.cache_len(), 0);
        let after: Vec<String> = mapper.read_all(&id, &mut cursor(&["a"])).unwrap();
        assert_eq!(after, vec!["A"]);
    }

    #[test]
    fn zero_column_cursor_yields_no_rows() {
        let mapper = Mapper::default();
        let id = Identity::new("update t set x = 1", CommandKind::Text, "mem").with_target::<i32>();
        let mut empty = MemoryCursor::new(ColumnShape::default(), vec![vec![]]);
        let rows: Vec<i32> = mapper.read_all(&id, &mut empty).unwrap();
        assert!(rows.is_empty());
        assert_eq!(mapper.cache_len(), 0);
    }

    #[test]
    fn rows_keep_going_past_a_bad_row() {
        let mapper = Mapper::default();
        let id = Identity::new("select n", CommandKind::Text, "mem").with_target::<i64>();
        let mut source = cursor(&["1", "2", "x", "4"]);
        let rows: Vec<Result<i64, MapError>> = mapper.rows(&id, &mut source).unwrap().collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].as_ref().ok(), Some(&1));
        assert_eq!(rows[1].as_ref().ok(), Some(&2));
        assert!(rows[2].is_err());
        assert_eq!(rows[3].as_ref().ok(), Some(&4));

        let err = mapper.read_all::<i64, _>(&id, &mut cursor(&["1", "x"])).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ColumnConversion);
    }

    #[test]
    fn one_execution_counts_one_hit() {
        let mapper = Mapper::default();
        let id = Identity::new("select s", CommandKind::Text, "mem")
            .with_target::<String>()
            .with_parameters::<()>();
        for expected in [0, 1] {
            let execution = mapper.execution(&id);
            execution.bind(&mut crate::bind::ParameterBuffer::new("select s"), &()).unwrap();
            let rows: Vec<String> = execution
                .rows(&mut cursor(&["a"]))
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap();
            assert_eq!(rows, vec!["a"]);
            assert_eq!(mapper.hit_count(&id), Some(expected));
        }
    }

    #[derive(Debug, Default)]
    struct Named {
        s: String,
    }

    crate::entity! {
        Named {
            s: String,
        }
    }

    #[test]
    fn purge_type_spares_entities_that_only_contain_the_type() {
        let mapper = Mapper::default();
        let scalar = Identity::new("select s", CommandKind::Text, "mem").with_target::<String>();
        let entity = Identity::new("select s", CommandKind::Text, "mem").with_target::<Named>();
        let _: Vec<String> = mapper.read_all(&scalar, &mut cursor(&["a"])).unwrap();
        let named: Vec<Named> = mapper.read_all(&entity, &mut cursor(&["a"])).unwrap();
        assert_eq!(named[0].s, "a");
        assert_eq!(mapper.cache_len(), 2);

        assert_eq!(mapper.purge_type::<String>(), 1);
        assert_eq!(mapper.hit_count(&entity), Some(0));
        mapper.purge_cache();
        assert_eq!(mapper.cache_len(), 0);
    }

    #[test]
    fn shared_instance_is_stable() {
        assert!(std::ptr::eq(Mapper::shared(), Mapper::shared()));
    }
}
