//! Persistent storage for the DAG.

pub mod db;

pub use db::SledStore;
