//! Shared scene description used by the `scene` runner.

pub mod scene;
