//! Package versions: `MAJOR.MINOR.PATCH` plus an optional `.rN` packaging
//! revision, e.g. `4.6.5` or `v4.6.5.r1`.

use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// A parsed package version. Revision `0` means "no revision".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub revision: u32,
}

impl PackageVersion {
    pub fn new(major: u64, minor: u64, patch: u64, revision: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            revision,
        }
    }

    /// The upstream part without the revision, e.g. `4.6.5`.
    pub fn base(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.revision > 0 {
            write!(f, ".r{}", self.revision)?;
        }
        Ok(())
    }
}

impl FromStr for PackageVersion {
    type Err = StoreError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| StoreError::InvalidVersion {
            input: input.to_string(),
            reason,
        };

        let trimmed = input.trim();
        let body = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let parts: Vec<&str> = body.split('.').collect();
        if parts.len() != 3 && parts.len() != 4 {
            return Err(invalid("expected MAJOR.MINOR.PATCH with optional .rN"));
        }

        let number = |part: &str| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("version components must be numeric"));
            }
            part.parse::<u64>()
                .map_err(|_| invalid("version component out of range"))
        };

        let major = number(parts[0])?;
        let minor = number(parts[1])?;
        let patch = number(parts[2])?;
        let revision = match parts.get(3) {
            None => 0,
            Some(rev) => {
                let digits = rev
                    .strip_prefix('r')
                    .ok_or_else(|| invalid("revision must look like rN"))?;
                let value = number(digits)?;
                u32::try_from(value).map_err(|_| invalid("revision out of range"))?
            }
        };

        Ok(Self::new(major, minor, patch, revision))
    }
}
