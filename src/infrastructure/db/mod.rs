pub mod history_store;
pub mod postgres;
pub mod sqlite;
