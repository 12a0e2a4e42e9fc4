//! Parameter binders.
//!
//! [`ToParams::compile_binder`] produces a [`BindFn`] that writes a parameter
//! source into a [`Command`]. Entities are inspected once per type: their
//! gettable members are ordered, optionally filtered against the placeholders
//! of the SQL text, and resolved to wire types. Name/value maps
//! ([`DynamicParameters`], `HashMap`, `IndexMap`, [`DynamicRow`]) are bound
//! entry by entry with no inspection.
//!
//! List-valued members are expanded into `name0`, `name1`, ... and the
//! command is told to rewrite its text accordingly.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dynamic::DynamicRow;
use crate::error::{CoercionError, MapError};
use crate::identity::CommandKind;
use crate::materialize::CompileContext;
use crate::members::{Entity, Getter};
use crate::registry::{RegistrySnapshot, WireMapping};
use crate::types::TypeInfo;
use crate::value::{Value, WireType};

/// Parameter direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

/// Declared size of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamSize {
    Fixed(usize),
    /// Larger than the configured threshold; the driver picks.
    Unbounded,
}

/// One command parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
    pub wire_type: Option<WireType>,
    pub direction: Direction,
    pub size: Option<ParamSize>,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Parameter {
            name: name.into(),
            value: Value::Null,
            wire_type: None,
            direction: Direction::Input,
            size: None,
        }
    }
}

/// The command side of a driver, as seen by a binder.
pub trait Command {
    fn command_text(&self) -> &str;

    fn create_parameter(&self, name: &str) -> Parameter {
        Parameter::new(name)
    }

    fn add_parameter(&mut self, parameter: Parameter) -> Result<(), MapError>;

    fn parameter_mut(&mut self, name: &str) -> Option<&mut Parameter>;

    /// Called after `count` parameters `name0..name{count-1}` were added for
    /// the list placeholder `name`.
    fn expand_list(&mut self, name: &str, count: usize);
}

/// In-memory [`Command`]: SQL text plus collected parameters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParameterBuffer {
    sql: String,
    parameters: Vec<Parameter>,
    expansions: Vec<(String, usize)>,
    #[serde(skip)]
    require_unique: bool,
}

impl ParameterBuffer {
    pub fn new(sql: impl Into<String>) -> Self {
        ParameterBuffer {
            sql: sql.into(),
            ..ParameterBuffer::default()
        }
    }

    /// Rejects a second parameter with an existing name instead of
    /// appending it.
    pub fn with_unique_names(mut self) -> Self {
        self.require_unique = true;
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// List placeholders expanded so far, with their element counts.
    pub fn expansions(&self) -> &[(String, usize)] {
        &self.expansions
    }

    pub fn into_parts(self) -> (String, Vec<Parameter>) {
        (self.sql, self.parameters)
    }
}

impl Command for ParameterBuffer {
    fn command_text(&self) -> &str {
        &self.sql
    }

    fn add_parameter(&mut self, parameter: Parameter) -> Result<(), MapError> {
        if self.require_unique && self.get(&parameter.name).is_some() {
            return Err(MapError::DuplicateKey {
                key: parameter.name,
            });
        }
        self.parameters.push(parameter);
        Ok(())
    }

    fn parameter_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.name == name)
    }

    fn expand_list(&mut self, name: &str, count: usize) {
        self.sql = expand_list_placeholders(&self.sql, name, count);
        self.expansions.push((name.to_string(), count));
    }
}

/// A compiled bind function.
pub type BindFn<P> = Arc<dyn Fn(&mut dyn Command, &P) -> Result<(), MapError> + Send + Sync>;

pub struct CompiledBinder<P> {
    bind_fn: BindFn<P>,
}

impl<P> Clone for CompiledBinder<P> {
    fn clone(&self) -> Self {
        CompiledBinder {
            bind_fn: Arc::clone(&self.bind_fn),
        }
    }
}

impl<P> CompiledBinder<P> {
    pub fn new(bind_fn: BindFn<P>) -> Self {
        CompiledBinder { bind_fn }
    }

    pub fn bind(&self, command: &mut dyn Command, source: &P) -> Result<(), MapError> {
        (self.bind_fn)(command, source)
    }
}

/// A parameter source.
pub trait ToParams: Send + Sync + 'static {
    fn compile_binder(
        ctx: &CompileContext<'_>,
        sql: &str,
        kind: CommandKind,
    ) -> Result<BindFn<Self>, MapError>;
}

#[derive(Debug, Clone, Copy)]
struct WriteOptions {
    threshold: usize,
    find_existing: bool,
}

fn string_size(value: &Value, threshold: usize) -> Option<ParamSize> {
    match value {
        Value::Text(s) if s.chars().count() <= threshold => Some(ParamSize::Fixed(threshold)),
        Value::Text(_) => Some(ParamSize::Unbounded),
        _ => None,
    }
}

fn write_parameter(
    command: &mut dyn Command,
    name: &str,
    value: Value,
    wire_type: Option<WireType>,
    direction: Direction,
    size: Option<ParamSize>,
    opts: WriteOptions,
) -> Result<(), MapError> {
    let size = size.or_else(|| string_size(&value, opts.threshold));
    if opts.find_existing {
        if let Some(existing) = command.parameter_mut(name) {
            existing.value = value;
            existing.wire_type = wire_type;
            existing.direction = direction;
            existing.size = size;
            return Ok(());
        }
    }
    let mut parameter = command.create_parameter(name);
    parameter.value = value;
    parameter.wire_type = wire_type;
    parameter.direction = direction;
    parameter.size = size;
    command.add_parameter(parameter)
}

fn parameter_error(name: &str, source: CoercionError) -> MapError {
    MapError::ParameterConversion {
        name: name.to_string(),
        source,
    }
}

enum MemberWire {
    Single(WireType),
    /// List member; element type and its wire type.
    Multi(TypeInfo, WireType),
}

struct MemberParam<P> {
    name: &'static str,
    ty: TypeInfo,
    get: Getter<P>,
    wire: MemberWire,
}

/// Compiles the reflective binder for an [`Entity`] parameter source.
pub fn compile_entity_binder<P: Entity>(
    ctx: &CompileContext<'_>,
    sql: &str,
    kind: CommandKind,
) -> Result<BindFn<P>, MapError> {
    let map = ctx.members.get::<P>();
    let placeholders = (ctx.options.filter_parameters_by_sql && kind == CommandKind::Text)
        .then(|| placeholder_names(sql));

    let mut params = Vec::new();
    for index in map.parameter_order() {
        let member = &map.members[index];
        let Some(get) = member.get else { continue };
        if let Some(names) = &placeholders {
            if !names.contains(&member.name.to_lowercase()) {
                continue;
            }
        }
        let unsupported = |ty: &TypeInfo| MapError::UnsupportedType {
            type_name: ty.name,
            member: member.name.to_string(),
        };
        let wire = match ctx.registry.wire_type_of(&member.ty) {
            Some(WireMapping::Single(wire)) => MemberWire::Single(wire),
            Some(WireMapping::MultiValue(element)) => match ctx.registry.wire_type_of(&element) {
                Some(WireMapping::Single(wire)) => MemberWire::Multi(element, wire),
                _ => return Err(unsupported(&element)),
            },
            None => return Err(unsupported(&member.ty)),
        };
        params.push(MemberParam {
            name: member.name,
            ty: member.ty.clone(),
            get,
            wire,
        });
    }

    tracing::debug!(
        "Compiled binder for {} with {} parameter(s)",
        map.type_name,
        params.len()
    );
    let registry = Arc::clone(&ctx.registry);
    let opts = WriteOptions {
        threshold: ctx.options.string_size_threshold,
        find_existing: ctx.options.check_existing_parameters,
    };
    Ok(Arc::new(move |command: &mut dyn Command, source: &P| {
        for param in &params {
            let value = (param.get)(source);
            match &param.wire {
                MemberWire::Single(wire) => {
                    let value = registry
                        .to_wire(value, &param.ty)
                        .map_err(|err| parameter_error(param.name, err))?;
                    write_parameter(
                        command,
                        param.name,
                        value,
                        Some(*wire),
                        Direction::Input,
                        None,
                        opts,
                    )?;
                }
                MemberWire::Multi(element, wire) => {
                    bind_list(command, param.name, value, &registry, element, Some(*wire), opts)?;
                }
            }
        }
        Ok(())
    }))
}

fn list_items(value: Value) -> Vec<Value> {
    match value {
        Value::List(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    }
}

fn bind_list(
    command: &mut dyn Command,
    name: &str,
    value: Value,
    registry: &RegistrySnapshot,
    element: &TypeInfo,
    wire: Option<WireType>,
    opts: WriteOptions,
) -> Result<(), MapError> {
    let items = list_items(value);
    let count = items.len();
    for (i, item) in items.into_iter().enumerate() {
        let item_name = format!("{name}{i}");
        let item = registry
            .to_wire(item, element)
            .map_err(|err| parameter_error(&item_name, err))?;
        write_parameter(command, &item_name, item, wire, Direction::Input, None, opts)?;
    }
    command.expand_list(name, count);
    Ok(())
}

/// Binds one name/value map entry; list values are expanded.
fn bind_entry(
    command: &mut dyn Command,
    name: &str,
    entry: &ParamEntry,
    opts: WriteOptions,
) -> Result<(), MapError> {
    let name = clean_name(name);
    match &entry.value {
        Value::List(items) => {
            let count = items.len();
            for (i, item) in items.iter().enumerate() {
                let wire = entry.wire_type.or_else(|| inferred_wire_type(item));
                write_parameter(
                    command,
                    &format!("{name}{i}"),
                    item.clone(),
                    wire,
                    entry.direction,
                    None,
                    opts,
                )?;
            }
            command.expand_list(name, count);
            Ok(())
        }
        value => write_parameter(
            command,
            name,
            value.clone(),
            entry.wire_type.or_else(|| inferred_wire_type(value)),
            entry.direction,
            entry.size,
            opts,
        ),
    }
}

fn inferred_wire_type(value: &Value) -> Option<WireType> {
    (!value.is_null()).then(|| value.wire_type())
}

/// Parameter name without a leading `@`, `:`, `$` or `?`.
pub fn clean_name(name: &str) -> &str {
    name.strip_prefix(['@', ':', '$', '?']).unwrap_or(name)
}

/// One entry of a [`DynamicParameters`] bag.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamEntry {
    pub value: Value,
    pub wire_type: Option<WireType>,
    pub direction: Direction,
    pub size: Option<ParamSize>,
}

impl ParamEntry {
    pub fn new(value: impl Into<Value>) -> Self {
        ParamEntry {
            value: value.into(),
            ..ParamEntry::default()
        }
    }

    pub fn wire_type(mut self, wire: WireType) -> Self {
        self.wire_type = Some(wire);
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn size(mut self, size: ParamSize) -> Self {
        self.size = Some(size);
        self
    }
}

/// Ordered name/value parameter bag.
///
/// Names are stored without their placeholder prefix, so `@id` and `id`
/// refer to the same entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicParameters {
    entries: IndexMap<String, ParamEntry>,
}

impl DynamicParameters {
    pub fn new() -> Self {
        DynamicParameters::default()
    }

    /// Adds or replaces `name`.
    pub fn add(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.add_entry(name, ParamEntry::new(value))
    }

    pub fn add_entry(&mut self, name: &str, entry: ParamEntry) -> &mut Self {
        self.entries.insert(clean_name(name).to_string(), entry);
        self
    }

    /// Adds `name`, failing when it is already present.
    pub fn add_unique(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self, MapError> {
        let key = clean_name(name);
        if self.entries.contains_key(key) {
            return Err(MapError::DuplicateKey {
                key: key.to_string(),
            });
        }
        Ok(self.add(key, value))
    }

    /// Adds every gettable member of `source` under its member name.
    pub fn add_entity<P: Entity>(&mut self, source: &P) -> &mut Self {
        for member in P::members() {
            if let Some(get) = member.get {
                let value = get(source);
                let wire = match &member.ty.non_nullable().kind {
                    crate::types::TypeKind::List(_) => None,
                    _ => inferred_wire_type(&value),
                };
                self.add_entry(
                    member.name,
                    ParamEntry {
                        wire_type: wire,
                        ..ParamEntry::new(value)
                    },
                );
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(clean_name(name)).map(|e| &e.value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn map_options(ctx: &CompileContext<'_>) -> WriteOptions {
    WriteOptions {
        threshold: ctx.options.string_size_threshold,
        find_existing: ctx.options.check_existing_parameters,
    }
}

impl ToParams for DynamicParameters {
    fn compile_binder(
        ctx: &CompileContext<'_>,
        _sql: &str,
        _kind: CommandKind,
    ) -> Result<BindFn<Self>, MapError> {
        let opts = map_options(ctx);
        Ok(Arc::new(move |command: &mut dyn Command, source: &Self| {
            for (name, entry) in &source.entries {
                bind_entry(command, name, entry, opts)?;
            }
            Ok(())
        }))
    }
}

macro_rules! value_map_params {
    ($($map:ty),*) => {
        $(
            impl ToParams for $map {
                fn compile_binder(
                    ctx: &CompileContext<'_>,
                    _sql: &str,
                    _kind: CommandKind,
                ) -> Result<BindFn<Self>, MapError> {
                    let opts = map_options(ctx);
                    Ok(Arc::new(move |command: &mut dyn Command, source: &Self| {
                        for (name, value) in source {
                            bind_entry(command, name, &ParamEntry::new(value.clone()), opts)?;
                        }
                        Ok(())
                    }))
                }
            }
        )*
    };
}

value_map_params!(HashMap<String, Value>, IndexMap<String, Value>);

impl ToParams for DynamicRow {
    fn compile_binder(
        ctx: &CompileContext<'_>,
        _sql: &str,
        _kind: CommandKind,
    ) -> Result<BindFn<Self>, MapError> {
        let opts = map_options(ctx);
        Ok(Arc::new(move |command: &mut dyn Command, source: &Self| {
            for (name, value) in source.entries() {
                bind_entry(command, &name, &ParamEntry::new(value.clone()), opts)?;
            }
            Ok(())
        }))
    }
}

impl ToParams for () {
    fn compile_binder(
        _ctx: &CompileContext<'_>,
        _sql: &str,
        _kind: CommandKind,
    ) -> Result<BindFn<Self>, MapError> {
        Ok(Arc::new(|_: &mut dyn Command, _: &()| Ok(())))
    }
}

/// A `@name`, `:name`, `$name` or `?name` token in SQL text.
struct Placeholder {
    start: usize,
    name: Range<usize>,
    prefix: char,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Finds placeholder tokens, skipping `::` casts, `@@` variables and
/// prefixes glued to a preceding identifier.
fn scan_placeholders(sql: &str) -> Vec<Placeholder> {
    let mut found = Vec::new();
    let mut prev: Option<char> = None;
    let mut chars = sql.char_indices().peekable();
    while let Some((pos, c)) = chars.next() {
        let starts = matches!(c, '@' | ':' | '$' | '?')
            && prev != Some(c)
            && !prev.is_some_and(is_ident_char);
        prev = Some(c);
        if !starts {
            continue;
        }
        let Some(&(_, first)) = chars.peek() else {
            continue;
        };
        if !(first.is_alphabetic() || first == '_') {
            continue;
        }
        let name_start = pos + c.len_utf8();
        let mut end = name_start;
        while let Some(&(p, n)) = chars.peek() {
            if !is_ident_char(n) {
                break;
            }
            end = p + n.len_utf8();
            prev = Some(n);
            chars.next();
        }
        found.push(Placeholder {
            start: pos,
            name: name_start..end,
            prefix: c,
        });
    }
    found
}

/// Lowercased names of every placeholder in `sql`.
pub fn placeholder_names(sql: &str) -> HashSet<String> {
    scan_placeholders(sql)
        .into_iter()
        .map(|p| sql[p.name].to_lowercase())
        .collect()
}

/// Rewrites every `name` placeholder into a list of `count` numbered ones.
///
/// `IN @ids` with three elements becomes `IN (@ids0, @ids1, @ids2)`; when the
/// placeholder is already parenthesized no extra parentheses are added. An
/// empty list becomes a subquery that yields no rows.
pub fn expand_list_placeholders(sql: &str, name: &str, count: usize) -> String {
    let mut out = String::with_capacity(sql.len() + count * (name.len() + 4));
    let mut last = 0;
    for placeholder in scan_placeholders(sql) {
        if !sql[placeholder.name.clone()].eq_ignore_ascii_case(name) {
            continue;
        }
        let end = placeholder.name.end;
        let enclosed = sql[..placeholder.start].trim_end().ends_with('(')
            && sql[end..].trim_start().starts_with(')');
        out.push_str(&sql[last..placeholder.start]);
        if !enclosed {
            out.push('(');
        }
        if count == 0 {
            out.push_str("SELECT NULL WHERE 1 = 0");
        } else {
            for i in 0..count {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push(placeholder.prefix);
                out.push_str(name);
                out.push_str(&i.to_string());
            }
        }
        if !enclosed {
            out.push(')');
        }
        last = end;
    }
    out.push_str(&sql[last..]);
    out
}
