//! Frame helpers: CPU colourspace conversion and generated test cards.

pub mod convert;
pub mod pattern;

pub use convert::convert;
pub use pattern::TestPattern;
