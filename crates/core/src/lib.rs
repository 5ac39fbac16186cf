//! Core data types for the price-alert engine.

pub mod alert;
pub mod code;
pub mod price;

pub use alert::*;
pub use code::*;
pub use price::*;
