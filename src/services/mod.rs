// src/services/mod.rs
pub mod bonds;
pub mod chart;
pub mod dates;
pub mod report;
pub mod scheduler;
pub mod subscriptions;
pub mod telegram;
