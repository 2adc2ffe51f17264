//! Integration tests for imagebuilder-lib.

mod common;

mod merge_tests;
mod publish_tests;
