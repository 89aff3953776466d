//! Domain services - Operations spanning several entities

pub mod inventory;

pub use inventory::{hold, InventoryError};
