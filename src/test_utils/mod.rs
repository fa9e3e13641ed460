//! the test_utils folder here will share utils or test components between unit
//! tests
mod common;
mod fixtures;
mod flaky_store;

pub use common::*;
pub use fixtures::*;
pub use flaky_store::*;
