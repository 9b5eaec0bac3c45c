mod schema;
mod slots;
mod types;

pub use schema::Database;
pub use types::DatabaseError;
