//! Library half of the `tracefold` binary.
//!
//! Holds the pieces of the CLI that are worth testing without a terminal:
//! loading saved conversation logs and rebuilding their view models.

pub mod replay;
