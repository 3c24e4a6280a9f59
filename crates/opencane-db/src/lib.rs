//! `SQLite`-backed implementation of the `Store` port (spec §6.3, §6.4):
//! schema creation for the nine logical tables plus the on-disk lifelog
//! image asset layout.

#![deny(unsafe_code)]

pub mod asset_store;
pub mod row_mappers;
pub mod schema;
pub mod setup;
pub mod sqlite_store;

pub use asset_store::{AssetStore, AssetStoreError};
pub use schema::create_schema;
pub use setup::setup_database;
#[cfg(any(test, feature = "test-utils"))]
pub use setup::setup_test_database;
pub use sqlite_store::SqliteStore;
