// Shared test helpers
//
// Included from each test target with
//   #[path = "../helpers/mod.rs"]
//   mod helpers;
//
// Service tests run against the in-process store; the MySQL helpers are only
// used by `#[ignore]`d tests that need a reachable TEST_DATABASE_URL.

#![allow(dead_code)]


pub use test_data::*;
pub use test_database::*;
