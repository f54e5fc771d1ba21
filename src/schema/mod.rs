// Schema module - the declarative table model that drives DDL, row
// validation, and the codec.
//
// Split into sub-modules:
// - column: column descriptors (kind sum type + flags)
// - json_shape: the closed grammar for json-kind columns
// - table: table descriptors and validation
// - ddl: CREATE TABLE / index emission
// - project: insert/select projection and runtime row validation
// - export: schema export/import JSON model

pub mod column;
pub mod ddl;
pub mod export;
pub mod json_shape;
pub mod project;
pub mod table;

pub use column::{ColumnDef, ColumnKind, StorageType};
pub use ddl::{IndexSpec, create_index_sql, create_table_sql, drop_index_sql};
pub use export::{ColumnInfo, IndexInfo, SchemaExport, TableExport};
pub use json_shape::{JsonLiteral, JsonShape};
pub use project::{Requirement, validate_insert_row, validate_update_values};
pub use table::{Schema, TableSchema};
