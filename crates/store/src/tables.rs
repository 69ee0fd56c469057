//! Fixed table definitions for the store.
//!
//! Tables are known at compile time. Each table struct implements [`Table`]
//! with its key and value types; both are encoded with postcard.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use stratus_types::{BundleHash, Lambda, LambdaUuid, Namespace};

/// Compile-time table identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TableId {
    /// Lambda records, partitioned by namespace.
    LambdaDirectory = 0,

    /// Bundle reference counts: bundle hash -> `u64`.
    BundleRefs = 1,

    /// Bundle payloads: bundle hash -> raw bytes.
    BundleData = 2,
}

impl TableId {
    /// Total number of tables.
    pub const COUNT: usize = 3;

    /// Returns the human-readable name for this table.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::LambdaDirectory => "lambda_directory",
            Self::BundleRefs => "bundle_refs",
            Self::BundleData => "bundle_data",
        }
    }

    /// Whether writes to this table require an ensured partition.
    #[inline]
    pub const fn is_partitioned(self) -> bool {
        matches!(self, Self::LambdaDirectory)
    }

    /// Returns all table IDs.
    pub const fn all() -> [TableId; Self::COUNT] {
        [Self::LambdaDirectory, Self::BundleRefs, Self::BundleData]
    }
}

// ============================================================================
// Type-Safe Table Trait
// ============================================================================

/// Trait for compile-time type-safe table access.
pub trait Table {
    /// The table identifier.
    const ID: TableId;

    /// Key type for this table.
    type Key: Serialize;

    /// Value type for this table.
    type Value: Serialize + DeserializeOwned;

    /// Partition selector of `key`, or `None` for global tables.
    fn partition(_key: &Self::Key) -> Option<&str> {
        None
    }
}

// ============================================================================
// Table Definitions
// ============================================================================

/// Directory key: a lambda uuid scoped by its namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LambdaKey {
    /// Partition selector.
    pub namespace: Namespace,
    /// Unique identifier within the namespace.
    pub uuid: LambdaUuid,
}

impl LambdaKey {
    /// Creates a directory key.
    pub fn new(namespace: &Namespace, uuid: &LambdaUuid) -> Self {
        Self { namespace: namespace.clone(), uuid: uuid.clone() }
    }
}

/// Lambda directory: one record per `(namespace, uuid)`.
pub struct LambdaDirectory;
impl Table for LambdaDirectory {
    const ID: TableId = TableId::LambdaDirectory;
    type Key = LambdaKey;
    type Value = Lambda;

    fn partition(key: &LambdaKey) -> Option<&str> {
        Some(key.namespace.as_str())
    }
}

/// Bundle reference counts, global across namespaces.
pub struct BundleRefs;
impl Table for BundleRefs {
    const ID: TableId = TableId::BundleRefs;
    type Key = BundleHash;
    type Value = u64;
}

/// Bundle payloads, global across namespaces.
///
/// Kept apart from [`BundleRefs`] so reading a payload never touches the
/// contended counter and counter updates never rewrite the payload.
pub struct BundleData;
impl Table for BundleData {
    const ID: TableId = TableId::BundleData;
    type Key = BundleHash;
    type Value = Vec<u8>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names_are_unique() {
        let mut names: Vec<_> = TableId::all().iter().map(|t| t.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), TableId::COUNT);
    }

    #[test]
    fn test_only_directory_is_partitioned() {
        assert!(TableId::LambdaDirectory.is_partitioned());
        assert!(!TableId::BundleRefs.is_partitioned());
        assert!(!TableId::BundleData.is_partitioned());
    }

    #[test]
    fn test_directory_partition_is_namespace() {
        let key = LambdaKey::new(&Namespace::new("acme"), &LambdaUuid::new("l1"));
        assert_eq!(LambdaDirectory::partition(&key), Some("acme"));
        assert_eq!(BundleRefs::partition(&BundleHash::new("h")), None);
    }
}
