// src/cbs/mod.rs
//! Mirror of the CBS (statistics bureau) accident files kept in S3.
//!
//! Keys are laid out as `accidents_type_<category>/<year>/<file>`; the mirror
//! copies everything for a year range into `<work dir>/cbsfiles/`.

pub mod mirror;
pub mod store;

pub use mirror::{CbsMirror, LocalWorkDir, MirrorReport};
pub use store::{ObjectStore, S3ObjectStore};

use std::fmt;
use std::str::FromStr;

pub const ACCIDENTS_TYPE_PREFIX: &str = "accidents_type";
pub const LOCAL_CBS_DIRECTORY: &str = "cbsfiles";

/// Accident-type dataset family (e.g. 1, 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Category(pub u32);

impl Category {
    pub const TYPE_1: Category = Category(1);
    pub const TYPE_3: Category = Category(3);

    /// The set mirrored when the caller does not choose.
    pub const KNOWN: [Category; 2] = [Category::TYPE_1, Category::TYPE_3];

    /// `accidents_type_<n>`
    pub fn directory(self) -> String {
        format!("{ACCIDENTS_TYPE_PREFIX}_{}", self.0)
    }

    /// `accidents_type_<n>/<year>`
    pub fn year_prefix(self, year: i32) -> String {
        format!("{}/{year}", self.directory())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Category {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_follow_bucket_layout() {
        assert_eq!(Category(1).directory(), "accidents_type_1");
        assert_eq!(Category(3).year_prefix(2021), "accidents_type_3/2021");
    }

    #[test]
    fn parses_from_cli_text() {
        assert_eq!(" 3 ".parse::<Category>().unwrap(), Category::TYPE_3);
        assert!("three".parse::<Category>().is_err());
    }
}
