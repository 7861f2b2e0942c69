//! Strongly-typed identifiers used across the ledger.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Item (stock-keeping unit) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

/// Physical storage cell, identified by its scan code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(String);

macro_rules! impl_code_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Wrap a raw scan code. Use `FromStr` when the code comes
            /// from an untrusted boundary and must be non-empty.
            pub fn new(code: impl Into<String>) -> Self {
                Self(code.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl FromStr for $t {
            type Err = LedgerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.trim().is_empty() {
                    return Err(LedgerError::validation(concat!($name, " cannot be empty")));
                }
                Ok(Self(s.to_string()))
            }
        }
    };
}

impl_code_newtype!(ItemId, "ItemId");
impl_code_newtype!(CellId, "CellId");

/// Packaging-unit identifier (each, inner pack, case, pallet, ...).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrunitId(i32);

/// Logical warehouse/partition id; optional on storage records.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarehouseId(i32);

/// Store-assigned storage record id (monotonic per store).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

macro_rules! impl_int_newtype {
    ($t:ty, $inner:ty) => {
        impl $t {
            pub fn new(value: $inner) -> Self {
                Self(value)
            }

            pub fn value(&self) -> $inner {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$inner> for $t {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$t> for $inner {
            fn from(value: $t) -> Self {
                value.0
            }
        }
    };
}

impl_int_newtype!(PrunitId, i32);
impl_int_newtype!(WarehouseId, i32);
impl_int_newtype!(RecordId, i64);
