//! Application layer - Use cases and ports
//!
//! This layer contains:
//! - DTOs: the serialized entity envelope and its codec
//! - Ports: the storage contract adapters implement
//! - Services: the session / unit of work driving entities through storage

pub mod dto;
pub mod ports;
pub mod services;
