#![allow(dead_code)]

pub use routeweave_test_utils::*;
