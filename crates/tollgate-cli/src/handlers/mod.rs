//! API request handlers

pub mod legacy;
pub mod resources;
pub mod token;

pub use legacy::*;
pub use resources::*;
pub use token::*;
