pub mod bind;
pub mod cache;
pub mod convert;
pub mod dynamic;
pub mod error;
pub mod identity;
pub mod macros;
pub mod mapper;
pub mod materialize;
pub mod members;
pub mod memory;
pub mod options;
pub mod registry;
pub mod shape;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use bind::{
    Command, CompiledBinder, Direction, DynamicParameters, ParamEntry, ParamSize, Parameter,
    ParameterBuffer, ToParams,
};
pub use cache::QueryCache;
pub use dynamic::{DynamicRow, DynamicTable};
pub use error::{CoercionError, ErrorKind, MapError, OptionsError};
pub use identity::{CommandKind, Identity};
pub use mapper::{Execution, Mapper};
pub use materialize::{CompiledMaterializer, FromRow, NullIfFirstMissing, RowReader, Rows};
pub use members::{ColumnMap, Entity};
pub use memory::MemoryCursor;
pub use options::MapperOptions;
pub use registry::{TypeConverter, TypeRegistry};
pub use shape::{Column, ColumnShape, Cursor, RowSource, ShapeHash};
pub use types::{ScalarKind, SqlEnum, SqlType, TypeInfo, TypeKind};
pub use value::{Decimal, Value, WireType};
