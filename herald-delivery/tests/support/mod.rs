#![allow(dead_code)] // Test utility module - not all helpers used in every test

pub mod mock_provider;

pub use mock_provider::{Behaviour, MockProvider};
