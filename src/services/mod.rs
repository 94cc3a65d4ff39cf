pub mod admin;
pub mod database;
pub mod finalize;
pub mod requirements;
pub mod schema;
pub mod security;
