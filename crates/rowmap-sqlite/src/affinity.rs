//! Declared column types to [`WireType`].
//!
//! SQLite only records the type name a column was declared with. The mapping
//! follows SQLite's own affinity rules (substring matches, first rule wins),
//! with a few extra names checked up front for types SQLite stores as text or
//! integers.

use rowmap_core::WireType;

pub fn wire_type_for_declared(declared: Option<&str>) -> WireType {
    let Some(declared) = declared.map(str::trim).filter(|d| !d.is_empty()) else {
        return WireType::Object;
    };
    let upper = declared.to_ascii_uppercase();
    let has = |needle: &str| upper.contains(needle);

    if has("BOOL") {
        WireType::Boolean
    } else if has("GUID") || has("UUID") {
        WireType::Guid
    } else if has("OFFSET") || has("TIMESTAMPTZ") {
        WireType::DateTimeOffset
    } else if has("DATE") || has("TIME") {
        WireType::DateTime
    } else if has("INT") {
        WireType::Int64
    } else if has("CHAR") || has("CLOB") || has("TEXT") {
        WireType::String
    } else if has("BLOB") {
        WireType::Binary
    } else if has("REAL") || has("FLOA") || has("DOUB") {
        WireType::Double
    } else {
        // NUMERIC affinity
        WireType::Decimal
    }
}
