//! Platform abstraction layer: the OS free-space query behind a trait.

pub mod pal;
