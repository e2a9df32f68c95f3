mod column_definition;
pub mod prepared;
pub mod text;
pub mod utility;

pub use column_definition::parse_column;
pub use column_definition::Column;
pub use column_definition::ColumnDefinitionTail;
