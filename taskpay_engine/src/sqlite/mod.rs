//! SQLite backend for the taskpay engine.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
