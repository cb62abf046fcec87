//! Command implementations.

pub(crate) mod upload;
