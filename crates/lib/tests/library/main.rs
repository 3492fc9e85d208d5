//! Integration tests for the planning library.

mod common;
mod crawl_tests;
mod plan_tests;
