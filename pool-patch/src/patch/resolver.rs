//! Version keyed address lookup.
//!
//! Only exact `(major, minor)` matches resolve. An unknown build never gets a
//! guessed offset, the patch simply stays off for it.

use libredirect::common::exe_version::ExeVersion;

use super::errors::{PatchError, PatchResult};

/// Loaded host executable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostBinaryHandle {
    version: ExeVersion,
    base_address: usize,
}

impl HostBinaryHandle {
    pub const fn new(version: ExeVersion, base_address: usize) -> Self {
        Self {
            version,
            base_address,
        }
    }

    /// Main executable of the current process
    #[cfg(windows)]
    pub fn current() -> libredirect::os::windows::winapi::WinapiResult<Self> {
        use libredirect::os::windows::module::{main_module_base, module_file_name, product_version};

        let base_address = main_module_base()?;
        let path = module_file_name(None)?;
        let version = product_version(&path)?;

        log::debug!("Host {} version {} loaded at {:#X}", path.display(), version, base_address);

        Ok(Self::new(version, base_address))
    }

    pub const fn version(&self) -> ExeVersion {
        self.version
    }

    pub const fn base_address(&self) -> usize {
        self.base_address
    }
}

/// Offset of a function from the image base in one host build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionOffset {
    pub version: ExeVersion,
    pub offset: usize,
}

impl VersionOffset {
    pub const fn new(major: u32, minor: u32, offset: usize) -> Self {
        Self {
            version: ExeVersion::from_tag(major, minor),
            offset,
        }
    }
}

/// Checked table of per-build offsets, at most one per version tag
#[derive(Debug, Clone, Copy)]
pub struct VersionAddressTable {
    entries: &'static [VersionOffset],
}

impl VersionAddressTable {
    pub fn new(entries: &'static [VersionOffset]) -> PatchResult<Self> {
        for (idx, entry) in entries.iter().enumerate() {
            if entries[..idx]
                .iter()
                .any(|other| other.version.tag() == entry.version.tag())
            {
                return Err(PatchError::DuplicateVersion(entry.version));
            }
        }

        Ok(Self { entries })
    }

    pub fn offset(&self, version: ExeVersion) -> Option<usize> {
        self.entries
            .iter()
            .find(|entry| entry.version.tag() == version.tag())
            .map(|entry| entry.offset)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AddressResolver {
    table: VersionAddressTable,
}

impl AddressResolver {
    pub const fn new(table: VersionAddressTable) -> Self {
        Self { table }
    }

    /// Absolute address of the target in `host`, `None` for unlisted builds
    pub fn resolve(&self, host: &HostBinaryHandle) -> Option<usize> {
        self.table
            .offset(host.version())
            .map(|offset| host.base_address().wrapping_add(offset))
    }
}
