// src/handlers/mod.rs
pub mod bonds;
pub mod commands;
pub mod error;
pub mod updates;
