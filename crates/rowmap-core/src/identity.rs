//! Cache keys.

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// How the command text is interpreted by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CommandKind {
    #[default]
    Text,
    StoredProcedure,
    TableDirect,
}

/// A static type taking part in an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    pub id: TypeId,
    pub name: &'static str,
}

impl TypeKey {
    pub fn of<T: 'static>() -> Self {
        TypeKey {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

/// Structural identity of a query: SQL text, command kind, target type,
/// parameter type and connection.
///
/// Equal identities share one cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub sql: Arc<str>,
    pub kind: CommandKind,
    pub target: Option<TypeKey>,
    pub parameters: Option<TypeKey>,
    pub connection: Arc<str>,
}

impl Identity {
    pub fn new(sql: &str, kind: CommandKind, connection: &str) -> Self {
        Identity {
            sql: Arc::from(sql),
            kind,
            target: None,
            parameters: None,
            connection: Arc::from(connection),
        }
    }

    pub fn with_target<T: 'static>(mut self) -> Self {
        self.target = Some(TypeKey::of::<T>());
        self
    }

    pub fn with_parameters<P: 'static>(mut self) -> Self {
        self.parameters = Some(TypeKey::of::<P>());
        self
    }

    /// Whether `id` is this identity's target or parameter type.
    pub fn references(&self, id: TypeId) -> bool {
        self.target.is_some_and(|t| t.id == id) || self.parameters.is_some_and(|p| p.id == id)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} '{}'", self.kind, self.sql)?;
        if let Some(target) = self.target {
            write!(f, " -> {}", target.name)?;
        }
        if let Some(parameters) = self.parameters {
            write!(f, " with {}", parameters.name)?;
        }
        Ok(())
    }
}
