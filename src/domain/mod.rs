//! Domain types and the ports the application layer depends on.

pub mod options;
pub mod ports;
pub mod product;
pub mod subscription;
pub mod transaction;
