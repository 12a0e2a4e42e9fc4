//! Member discovery and column-to-member resolution.
//!
//! An [`Entity`] describes its settable members and constructors once; the
//! resulting [`MemberMap`] is cached per type in a [`MemberMapCache`] and is
//! reused for every column shape the type is materialized from.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{CoercionError, MapError};
use crate::shape::ColumnShape;
use crate::types::{SqlType, TypeInfo};
use crate::value::Value;

pub type Setter<T> = fn(&mut T, Value) -> Result<(), CoercionError>;
pub type Getter<T> = fn(&T) -> Value;

/// A named member of an entity with its declared type.
pub struct Member<T> {
    pub name: &'static str,
    pub ty: TypeInfo,
    pub set: Option<Setter<T>>,
    /// Assigns the member's null default; used for database null.
    pub reset: Option<fn(&mut T)>,
    pub get: Option<Getter<T>>,
}

impl<T> Member<T> {
    pub fn new(name: &'static str, ty: TypeInfo) -> Self {
        Member {
            name,
            ty,
            set: None,
            reset: None,
            get: None,
        }
    }

    pub fn with_setter(mut self, set: Setter<T>) -> Self {
        self.set = Some(set);
        self
    }

    pub fn with_reset(mut self, reset: fn(&mut T)) -> Self {
        self.reset = Some(reset);
        self
    }

    pub fn with_getter(mut self, get: Getter<T>) -> Self {
        self.get = Some(get);
        self
    }

    pub fn is_settable(&self) -> bool {
        self.set.is_some()
    }
}

impl<T> Clone for Member<T> {
    fn clone(&self) -> Self {
        Member {
            name: self.name,
            ty: self.ty.clone(),
            set: self.set,
            reset: self.reset,
            get: self.get,
        }
    }
}

/// Converted constructor arguments, consumed in declaration order.
#[derive(Debug, Default)]
pub struct ConstructorArgs {
    values: Vec<Value>,
    index: usize,
}

impl ConstructorArgs {
    pub fn new(values: Vec<Value>) -> Self {
        ConstructorArgs { values, index: 0 }
    }

    /// Takes the next argument. Null or missing arguments yield the type's
    /// null default.
    pub fn next<F: SqlType>(&mut self) -> Result<F, CoercionError> {
        let value = self
            .values
            .get_mut(self.index)
            .map(std::mem::take)
            .unwrap_or_default();
        self.index += 1;
        if value.is_null() {
            return Ok(F::null_default());
        }
        F::from_value(value)
    }

    pub fn consumed(&self) -> usize {
        self.index
    }
}

/// A parameterized constructor.
pub struct Constructor<T> {
    pub params: Vec<(&'static str, TypeInfo)>,
    pub build: fn(&mut ConstructorArgs) -> Result<T, CoercionError>,
}

impl<T> Constructor<T> {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl<T> Clone for Constructor<T> {
    fn clone(&self) -> Self {
        Constructor {
            params: self.params.clone(),
            build: self.build,
        }
    }
}

/// A composite type that rows can be materialized into and that can act as a
/// parameter source.
///
/// Usually generated with [`entity!`](crate::entity).
pub trait Entity: Sized + Send + Sync + 'static {
    fn members() -> Vec<Member<Self>>;

    fn constructors() -> Vec<Constructor<Self>> {
        Vec::new()
    }

    fn parameterless() -> Option<fn() -> Self> {
        None
    }

    /// Positional types bind columns by ordinal through constructor 0,
    /// ignoring names.
    fn positional() -> bool {
        false
    }
}

/// Explicit column-to-member aliases for one type.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    aliases: HashMap<String, &'static str>,
}

impl ColumnMap {
    pub fn new() -> Self {
        ColumnMap::default()
    }

    /// Maps `column` (case-insensitive) onto `member`.
    pub fn map(mut self, column: &str, member: &'static str) -> Self {
        self.aliases.insert(column.to_lowercase(), member);
        self
    }

    pub fn member_for(&self, column: &str) -> Option<&'static str> {
        self.aliases.get(&column.to_lowercase()).copied()
    }
}

/// How an instance gets created for one shape.
pub enum Construction<T> {
    Parameterless(fn() -> T),
    /// Constructor `index`; `columns[i]` is the column feeding parameter `i`.
    Constructor {
        index: usize,
        columns: Vec<Option<usize>>,
    },
}

fn strip_underscores(name: &str) -> String {
    name.chars().filter(|c| *c != '_').flat_map(char::to_lowercase).collect()
}

/// Member and constructor metadata for one type, discovered once.
pub struct MemberMap<T> {
    pub type_name: &'static str,
    pub members: Vec<Member<T>>,
    pub constructors: Vec<Constructor<T>>,
    pub parameterless: Option<fn() -> T>,
    pub positional: bool,
}

impl<T: Entity> MemberMap<T> {
    pub fn discover() -> Self {
        MemberMap {
            type_name: std::any::type_name::<T>(),
            members: T::members(),
            constructors: T::constructors(),
            parameterless: T::parameterless(),
            positional: T::positional(),
        }
    }
}

impl<T> MemberMap<T> {
    /// Settable member receiving `column`.
    ///
    /// An explicit alias wins; otherwise exact match, then case-insensitive,
    /// then (when `underscores` is set) a case-insensitive match with
    /// underscores removed on both sides.
    pub fn find_member(
        &self,
        column: &str,
        aliases: Option<&ColumnMap>,
        underscores: bool,
    ) -> Option<&Member<T>> {
        let settable = || self.members.iter().filter(|m| m.is_settable());
        let column = match aliases.and_then(|map| map.member_for(column)) {
            Some(member) => member,
            None => column,
        };
        settable()
            .find(|m| m.name == column)
            .or_else(|| settable().find(|m| m.name.eq_ignore_ascii_case(column)))
            .or_else(|| {
                if !underscores {
                    return None;
                }
                let stripped = strip_underscores(column);
                settable().find(|m| strip_underscores(m.name) == stripped)
            })
    }

    /// Picks how to construct instances for `shape`.
    pub fn select_constructor(&self, shape: &ColumnShape) -> Result<Construction<T>, MapError> {
        let names: Vec<&str> = shape.names().collect();

        if self.positional {
            if let Some(ctor) = self.constructors.first() {
                let columns = (0..ctor.arity())
                    .map(|i| (i < names.len()).then_some(i))
                    .collect();
                return Ok(Construction::Constructor { index: 0, columns });
            }
        }

        let mut matched = self
            .constructors
            .iter()
            .enumerate()
            .filter(|(_, ctor)| ctor.arity() == names.len())
            .filter_map(|(index, ctor)| match_constructor(ctor, &names).map(|c| (index, c)));
        if let (Some((index, columns)), None) = (matched.next(), matched.next()) {
            return Ok(Construction::Constructor {
                index,
                columns: columns.into_iter().map(Some).collect(),
            });
        }

        self.parameterless
            .map(Construction::Parameterless)
            .ok_or_else(|| MapError::NoUsableConstructor {
                type_name: self.type_name,
                signature: shape.signature(),
            })
    }

    /// Gettable member indices in binding order.
    ///
    /// A constructor whose parameters are exactly the gettable members fixes
    /// the order when it is the only one; otherwise the order is alphabetical.
    pub fn parameter_order(&self) -> Vec<usize> {
        let gettable: Vec<usize> = (0..self.members.len())
            .filter(|i| self.members[*i].get.is_some())
            .collect();
        let names: Vec<&str> = gettable.iter().map(|i| self.members[*i].name).collect();

        let mut candidates = self
            .constructors
            .iter()
            .filter(|ctor| ctor.arity() == names.len())
            .filter_map(|ctor| match_constructor(ctor, &names));
        if let (Some(order), None) = (candidates.next(), candidates.next()) {
            return order.into_iter().map(|pos| gettable[pos]).collect();
        }

        let mut alphabetical = gettable;
        alphabetical.sort_by(|a, b| self.members[*a].name.cmp(self.members[*b].name));
        alphabetical
    }
}

/// Column ordinal per constructor parameter, matching positionally first and
/// by name second (both case-insensitive).
fn match_constructor<T>(ctor: &Constructor<T>, names: &[&str]) -> Option<Vec<usize>> {
    let positional = ctor
        .params
        .iter()
        .zip(names)
        .all(|((param, _), name)| param.eq_ignore_ascii_case(name));
    if positional {
        return Some((0..names.len()).collect());
    }
    let mut used = vec![false; names.len()];
    let mut columns = Vec::with_capacity(ctor.arity());
    for (param, _) in &ctor.params {
        let found = names
            .iter()
            .enumerate()
            .position(|(i, name)| !used[i] && param.eq_ignore_ascii_case(name))?;
        used[found] = true;
        columns.push(found);
    }
    Some(columns)
}

/// Per-type [`MemberMap`]s, discovered on first use.
#[derive(Default)]
pub struct MemberMapCache {
    maps: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl MemberMapCache {
    pub fn new() -> Self {
        MemberMapCache::default()
    }

    pub fn get<T: Entity>(&self) -> Arc<MemberMap<T>> {
        let id = TypeId::of::<T>();
        let found = self.maps.get(&id).map(|entry| Arc::clone(entry.value()));
        if let Some(map) = found.and_then(|any| any.downcast::<MemberMap<T>>().ok()) {
            return map;
        }
        let map = Arc::new(MemberMap::<T>::discover());
        self.maps.insert(id, map.clone());
        map
    }

    pub fn purge(&self, id: TypeId) {
        self.maps.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}
