//! Core logic: vault session, catalog, key resolution, agent bridge, askpass callback.

pub mod agent;
pub mod askpass;
pub mod catalog;
pub mod config;
pub mod resolver;
pub mod session;
