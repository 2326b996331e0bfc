mod record;
mod schema;

pub use record::Record;
pub use schema::FieldSchema;
