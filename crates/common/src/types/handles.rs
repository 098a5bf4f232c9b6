// SCDB - Script Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Non-owning handles into tables owned by the script VM.
//!
//! The debugger never owns script objects, frames or reflection descriptors. It refers to
//! them through these plain handles and asks the VM to look them up again whenever it
//! needs data, so a handle that outlived its target simply resolves to nothing.

use std::str::FromStr;

use derive_more::Display;
use eyre::{eyre, Error, Result};
use serde::{Deserialize, Serialize};

macro_rules! hex_handle_from_str {
    ($($ty:ident($inner:ty)),* $(,)?) => {
        $(
            impl FromStr for $ty {
                type Err = Error;

                /// Parses the hexadecimal form produced by `Display`, with or without `0x`.
                fn from_str(s: &str) -> Result<Self> {
                    let digits = s.trim().trim_start_matches("0x").trim_start_matches("0X");
                    <$inner>::from_str_radix(digits, 16)
                        .map(Self)
                        .map_err(|e| eyre!("Invalid {} '{s}': {e}", stringify!($ty)))
                }
            }
        )*
    };
}

/// A live script object (actor, component, ...).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[display("{_0:08X}")]
pub struct ObjectId(pub u32);

/// A native frame record of the VM, one per active invocation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[display("{_0:08X}")]
pub struct FrameId(pub u32);

/// A reflected struct: class, script struct, function or state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[display("{_0:08X}")]
pub struct StructId(pub u32);

/// A reflected property (field, parameter or local variable).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[display("{_0:08X}")]
pub struct PropertyId(pub u32);

/// An address in the VM's script memory. Zero is the null address.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
)]
#[display("{_0:08X}")]
pub struct Address(pub u64);

hex_handle_from_str!(ObjectId(u32), FrameId(u32), StructId(u32), PropertyId(u32), Address(u64));

impl Address {
    /// The null address
    pub const NULL: Self = Self(0);

    /// Whether this is the null address
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// The address `bytes` past this one
    pub fn offset(&self, bytes: usize) -> Self {
        Self(self.0 + bytes as u64)
    }
}

/// Identifier the front end hands back for a displayed watch entry.
///
/// Used as the parent link when building the watch tree.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
pub struct WatchEntryId(pub usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_display_as_hex() {
        assert_eq!(PropertyId(0x2a).to_string(), "0000002A");
        assert_eq!(Address(0x1010).to_string(), "00001010");
    }

    #[test]
    fn test_handles_parse_back() {
        assert_eq!("0000002A".parse::<PropertyId>().unwrap(), PropertyId(42));
        assert_eq!("0x1010".parse::<Address>().unwrap(), Address(0x1010));
        assert!("not-hex".parse::<ObjectId>().is_err());
    }

    #[test]
    fn test_address_offset() {
        assert!(Address::NULL.is_null());
        assert_eq!(Address(0x100).offset(8), Address(0x108));
    }
}
