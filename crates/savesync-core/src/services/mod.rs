//! Services shared by the engine and its front-ends

mod database;

pub use database::DatabaseService;
