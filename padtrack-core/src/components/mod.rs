//! Engine components that live behind the public API.

pub mod source;
