//! Core type definitions for the lambda subsystem.
//!
//! - Identifier types (Namespace, LambdaUuid, Runtime, BundleHash, CorrelationToken)
//! - Persisted records (Lambda, Bundle)

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Identifier Types
// ============================================================================

/// Generates a newtype wrapper around `String` for type-safe names.
///
/// Each generated type provides:
/// - Standard derives: Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord
/// - Serde with `#[serde(transparent)]` for wire format compatibility
/// - `From<String>`, `From<&str>` and `Into<String>` conversions
/// - `Display` printing the raw value
/// - `new()` constructor and `as_str()` accessor
macro_rules! define_name {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new name from a raw value.
            #[inline]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the raw string value.
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the name, returning the raw string.
            #[inline]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<$name> for String {
            #[inline]
            fn from(name: $name) -> Self {
                name.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

define_name!(
    /// Tenant isolation scope.
    ///
    /// The empty string denotes the global scope shared by all tenants; it
    /// always exists and is never checked against the namespace service.
    Namespace
);

define_name!(
    /// Caller-supplied lambda identifier, unique within its namespace.
    LambdaUuid
);

define_name!(
    /// Runtime tag selecting the worker pool that consumes a task.
    ///
    /// Used verbatim as the broker routing key on the task exchange.
    Runtime
);

define_name!(
    /// Opaque content hash identifying a code bundle.
    ///
    /// Supplied by the caller. Whether it is verified against the bundle bytes
    /// is decided by [`HashPolicy`](crate::config::HashPolicy).
    BundleHash
);

define_name!(
    /// Opaque token pairing an asynchronous request with its reply.
    ///
    /// Carried as the broker's correlation-id message property.
    CorrelationToken
);

impl Namespace {
    /// Returns the global namespace (empty string).
    #[inline]
    pub fn global() -> Self {
        Self(String::new())
    }

    /// Whether this is the global namespace.
    #[inline]
    pub fn is_global(&self) -> bool {
        self.0.is_empty()
    }
}

impl CorrelationToken {
    /// Generates a fresh random token (UUIDv4, hyphenated).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

// ============================================================================
// Records
// ============================================================================

/// Identity of an invocable unit.
///
/// Created by `Create`, immutable thereafter, destroyed by `Delete`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lambda {
    /// Tenant scope.
    pub namespace: Namespace,
    /// Unique identifier within the namespace.
    pub uuid: LambdaUuid,
    /// Worker pool selector, used as the task routing key.
    pub runtime: Runtime,
    /// Bundle this lambda executes.
    pub bundle_hash: BundleHash,
    /// Advisory flag asking workers to deduplicate redeliveries.
    ///
    /// Recorded only; the dispatcher itself provides at-least-once delivery.
    pub ensure_exactly_one_delivery: bool,
}

/// Content-addressed code bundle.
///
/// Bundles are global (not namespace-scoped) so identical code shared by
/// several tenants is stored once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    /// Content-derived unique key.
    pub hash: BundleHash,
    /// Raw packaged code.
    pub data: Vec<u8>,
    /// Number of lambda records currently pointing at this bundle.
    pub reference_count: u64,
}
