//! Shared utility functions.

pub mod clock;
