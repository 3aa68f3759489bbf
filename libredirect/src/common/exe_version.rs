//! Abstractions for executable versioning

/// ExeVersion
///
/// Version of a loaded executable. Only `(major, minor)` identifies a build
/// for address lookups, see [`ExeVersion::tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExeVersion {
    major: u32,
    minor: u32,
    build: u32,
    sub: u32,
}

impl std::fmt::Display for ExeVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.build, self.sub) {
            (0, 0) => write!(f, "{}.{}", self.major, self.minor),
            (build, 0) => write!(f, "{}.{}.{}", self.major, self.minor, build),
            (build, sub) => write!(f, "{}.{}.{}.{}", self.major, self.minor, build, sub),
        }
    }
}

impl ExeVersion {
    pub const fn new(major: u32, minor: u32, build: u32, sub: u32) -> Self {
        Self {
            major,
            minor,
            build,
            sub,
        }
    }

    /// Version made only of major and minor parts
    pub const fn from_tag(major: u32, minor: u32) -> Self {
        Self::new(major, minor, 0, 0)
    }

    /// `(major, minor)` pair used as a lookup key
    pub const fn tag(&self) -> (u32, u32) {
        (self.major, self.minor)
    }
}
