pub mod db;

pub use db::SqliteTableStore;
