//! `.datignore` rule matching (§3, §4.3).

mod datignore;

pub use datignore::DatIgnoreMatcher;

// vim: ts=4
