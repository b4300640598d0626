//! Version classification and the update strategy table.

pub mod classify;
pub mod strategy;

pub use classify::{UpdateType, classify, parse_release};
pub use strategy::{RiskLevel, UpdateStrategy};
