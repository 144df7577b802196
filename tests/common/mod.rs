#![allow(dead_code)]

pub mod mock_modules;
pub mod strategies;

pub use mock_modules::*;
pub use strategies::*;
