//! Test-only crate. The integration tests live in `tests/`; see
//! `tests/helpers/mod.rs` for the shared harness.
