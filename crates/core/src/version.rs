//! Rules schema versions.

use std::fmt;
use std::str::FromStr;

/// Newest schema version this engine compiles.
pub const ENGINE_VERSION: SchemaVersion = SchemaVersion::new(1, 2);

/// Schema versions this engine accepts in `schemaVersion`.
pub const SUPPORTED_VERSIONS: [SchemaVersion; 3] = [
    SchemaVersion::new(1, 0),
    SchemaVersion::new(1, 1),
    SchemaVersion::new(1, 2),
];

/// A `major.minor` schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        SchemaVersion { major, minor }
    }

    pub fn is_supported(self) -> bool {
        SUPPORTED_VERSIONS.contains(&self)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for SchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || format!("'{}' is not a major.minor version", s);
        let (major, minor) = s.split_once('.').ok_or_else(malformed)?;
        let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !digits(major) || !digits(minor) {
            return Err(malformed());
        }
        Ok(SchemaVersion {
            major: major.parse().map_err(|_| malformed())?,
            minor: minor.parse().map_err(|_| malformed())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_orders() {
        let v: SchemaVersion = "1.10".parse().unwrap();
        assert_eq!(v, SchemaVersion::new(1, 10));
        assert!(SchemaVersion::new(1, 2) < v);
        assert!(v < SchemaVersion::new(2, 0));
        assert_eq!(v.to_string(), "1.10");
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["1", "1.", ".1", "v1.0", "1.0.0", "1.x", ""] {
            assert!(bad.parse::<SchemaVersion>().is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn engine_version_is_supported() {
        assert!(ENGINE_VERSION.is_supported());
        assert!(!SchemaVersion::new(2, 0).is_supported());
    }
}
