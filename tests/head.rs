/*!
 * Head node tests entry point
 */

mod common;

#[path = "head/execute_test.rs"]
mod execute_test;

#[path = "head/batch_test.rs"]
mod batch_test;

#[path = "head/resume_test.rs"]
mod resume_test;

#[path = "head/process_test.rs"]
mod process_test;
