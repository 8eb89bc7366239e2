//! Data structures for vault items, key records, and configuration.

pub mod item;
pub mod key;
pub mod settings;
