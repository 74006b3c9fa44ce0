#[allow(clippy::module_inception)]
pub mod schema;
pub mod registry;

pub use registry::{SchemaChange, SchemaChangeKind, SchemaRegistry};
pub use schema::{
    build_index_value, embedding_text, index_fields, index_name_for, is_empty_index_value, Field,
    RowSchema,
};
