//! Column type introspection for result sets.

use std::fmt;

use crate::bitmap::{Bit, get_bit_in};
use crate::protocol::{Datatype, Schema};

/// Rust type a column is best scanned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    Bytes,
    String,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Bool,
    Timestamp,
}

impl ScanType {
    pub fn for_datatype(datatype: Datatype) -> Option<Self> {
        Some(match datatype {
            Datatype::ByteArray => ScanType::Bytes,
            Datatype::String | Datatype::Uuid => ScanType::String,
            Datatype::Int8 => ScanType::I8,
            Datatype::Uint8 => ScanType::U8,
            Datatype::Int16 => ScanType::I16,
            Datatype::Uint16 => ScanType::U16,
            Datatype::Int32 => ScanType::I32,
            Datatype::Uint32 => ScanType::U32,
            Datatype::Int64 => ScanType::I64,
            Datatype::Uint64 => ScanType::U64,
            Datatype::Float32 => ScanType::F32,
            Datatype::Float64 => ScanType::F64,
            Datatype::Bool => ScanType::Bool,
            Datatype::Timestamp => ScanType::Timestamp,
            Datatype::Unknown(_) => return None,
        })
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanType::Bytes => "Vec<u8>",
            ScanType::String => "String",
            ScanType::I8 => "i8",
            ScanType::U8 => "u8",
            ScanType::I16 => "i16",
            ScanType::U16 => "u16",
            ScanType::I32 => "i32",
            ScanType::U32 => "u32",
            ScanType::I64 => "i64",
            ScanType::U64 => "u64",
            ScanType::F32 => "f32",
            ScanType::F64 => "f64",
            ScanType::Bool => "bool",
            ScanType::Timestamp => "DateTime<Utc>",
        };
        f.write_str(name)
    }
}

/// Everything known about one result column. Each capability is optional;
/// `None` means the server did not say or the notion does not apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnType {
    pub name: String,
    pub datatype: Datatype,
    pub scan_type: Option<ScanType>,
    pub nullable: Option<bool>,
    pub precision_scale: Option<(i64, i64)>,
    /// Declared length of variable-width columns.
    pub length: Option<i64>,
}

impl ColumnType {
    /// Upper-case type name, `UNDEF` when unknown.
    pub fn database_type_name(&self) -> &'static str {
        self.datatype.type_name()
    }

    pub(crate) fn from_schema(schema: &Schema, names: &[String]) -> Vec<ColumnType> {
        schema
            .column_types
            .iter()
            .enumerate()
            .map(|(i, &datatype)| ColumnType {
                name: names.get(i).cloned().unwrap_or_default(),
                datatype,
                scan_type: ScanType::for_datatype(datatype),
                nullable: schema
                    .nullable_bitmap
                    .as_deref()
                    .and_then(|bits| get_bit_in(bits, i).ok())
                    .map(Bit::is_set),
                precision_scale: match datatype {
                    Datatype::Float32 | Datatype::Float64 => Some((11, 2)),
                    Datatype::Timestamp => Some((9, 9)),
                    _ => None,
                },
                length: match datatype {
                    Datatype::ByteArray | Datatype::String => schema.column_sizes.get(i).copied(),
                    _ => None,
                },
            })
            .collect()
    }
}
