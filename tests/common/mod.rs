#![allow(dead_code)]

pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use mocks::{CountingCheckpoint, MemoryRegistry, MockEna};
