//! Per-target count of irrelevant low bits in type-identity addresses.
//!
//! These values are measured, not derived: they follow from how a toolchain
//! lays out per-type identity tables, which no standard documents. A value
//! larger than the real alignment merges unrelated types into one key, so
//! targets without a row must be measured (see [`crate::probe`]) and added.

use typekey_target::target::{BuildMode, PointerWidth};
use typekey_target::toolchain::ToolchainFamily;

/// One measured table entry. `toolchain: None` applies to every family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlignmentRow {
    #[cfg_attr(feature = "serde", serde(default))]
    pub toolchain: Option<ToolchainFamily>,
    pub pointer_width: PointerWidth,
    pub build_mode: BuildMode,
    pub irrelevant_bits: u32,
}

impl AlignmentRow {
    pub const fn generic(pointer_width: PointerWidth, build_mode: BuildMode, irrelevant_bits: u32) -> Self {
        Self {
            toolchain: None,
            pointer_width,
            build_mode,
            irrelevant_bits,
        }
    }

    fn matches(&self, width: PointerWidth, mode: BuildMode) -> bool {
        self.pointer_width == width && self.build_mode == mode
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentTable {
    rows: Vec<AlignmentRow>,
}

impl Default for AlignmentTable {
    fn default() -> Self {
        Self::documented()
    }
}

impl AlignmentTable {
    /// Bumped whenever a documented row changes.
    pub const VERSION: u32 = 1;

    pub fn empty() -> Self {
        Self { rows: Vec::new() }
    }

    /// Reference values: identity tables are 8/16 byte aligned on 64-bit
    /// debug/release builds and 4/8 byte aligned on 32-bit ones.
    pub fn documented() -> Self {
        use BuildMode::*;
        use PointerWidth::*;
        Self {
            rows: vec![
                AlignmentRow::generic(W64, Debug, 3),
                AlignmentRow::generic(W64, Release, 4),
                AlignmentRow::generic(W32, Debug, 2),
                AlignmentRow::generic(W32, Release, 3),
            ],
        }
    }

    /// Add a row, replacing any row with the same scope.
    pub fn insert(&mut self, row: AlignmentRow) {
        self.rows.retain(|r| {
            !(r.toolchain == row.toolchain && r.matches(row.pointer_width, row.build_mode))
        });
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[AlignmentRow] {
        &self.rows
    }

    /// A row scoped to `family` wins over a generic row.
    pub fn lookup(&self, family: ToolchainFamily, width: PointerWidth, mode: BuildMode) -> Option<u32> {
        let candidates = || self.rows.iter().filter(move |r| r.matches(width, mode));
        candidates()
            .find(|r| r.toolchain == Some(family))
            .or_else(|| candidates().find(|r| r.toolchain.is_none()))
            .map(|r| r.irrelevant_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BuildMode::*;
    use PointerWidth::*;

    #[test]
    fn documented_rows() {
        let t = AlignmentTable::documented();
        assert_eq!(t.lookup(ToolchainFamily::Msvc, W64, Debug), Some(3));
        assert_eq!(t.lookup(ToolchainFamily::Msvc, W64, Release), Some(4));
        assert_eq!(t.lookup(ToolchainFamily::Gcc, W32, Debug), Some(2));
        assert_eq!(t.lookup(ToolchainFamily::Clang, W32, Release), Some(3));
    }

    #[test]
    fn scoped_row_takes_precedence() {
        let mut t = AlignmentTable::documented();
        t.insert(AlignmentRow {
            toolchain: Some(ToolchainFamily::Gcc),
            pointer_width: W64,
            build_mode: Release,
            irrelevant_bits: 3,
        });
        assert_eq!(t.lookup(ToolchainFamily::Gcc, W64, Release), Some(3));
        assert_eq!(t.lookup(ToolchainFamily::Msvc, W64, Release), Some(4));
    }

    #[test]
    fn insert_replaces_same_scope() {
        let mut t = AlignmentTable::documented();
        t.insert(AlignmentRow::generic(W64, Debug, 2));
        assert_eq!(t.rows().len(), 4);
        assert_eq!(t.lookup(ToolchainFamily::Msvc, W64, Debug), Some(2));
    }

    #[test]
    fn empty_table_has_no_answer() {
        assert_eq!(AlignmentTable::empty().lookup(ToolchainFamily::Msvc, W64, Debug), None);
    }
}
