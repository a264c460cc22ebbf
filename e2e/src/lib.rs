//! Helpers for the end-to-end tests in `tests/`. The scenarios themselves live in `tests/features`.
pub mod helpers;
