//! Device capabilities and model classification.
//!
//! A device's [`FeatureSet`] is computed once at setup from its vendor/product
//! pair and the configured feature mask. It is never widened afterwards; the
//! only later change is the narrowing to [`FeatureSet::UPDATE_ONLY`] when the
//! firmware asks for an update.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// USB vendor id of the supported keyboard family.
pub const VENDOR_ID: u16 = 0x1b1c;

/// Known product ids.
pub mod pids {
    /// Compact (65%) RGB board.
    pub const COMPACT_RGB: u16 = 0x1b17;
    /// Standard (tenkeyless-plus) RGB board.
    pub const STANDARD_RGB: u16 = 0x1b13;
    /// Standard board without RGB lighting.
    pub const STANDARD: u16 = 0x1b09;
    /// Full-size RGB board with macro keys.
    pub const FULL_SIZE_RGB: u16 = 0x1b11;
    /// Full-size board without RGB lighting.
    pub const FULL_SIZE: u16 = 0x1b08;

    /// Every product id this crate knows how to drive.
    pub const ALL: &[u16] = &[COMPACT_RGB, STANDARD_RGB, STANDARD, FULL_SIZE_RGB, FULL_SIZE];
}

bitflags! {
    /// Optional capabilities a device may expose.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FeatureSet: u32 {
        /// Per-key RGB lighting driven through the command queue.
        const RGB         = 1 << 0;
        /// Device reports its USB poll rate.
        const POLL_RATE   = 1 << 1;
        /// Poll rate can be changed.
        const ADJUST_RATE = 1 << 2;
        /// Key rebinding.
        const BIND        = 1 << 3;
        /// Key-state notifications.
        const NOTIFY      = 1 << 4;
        /// Firmware version can be queried.
        const FW_VERSION  = 1 << 5;
        /// Firmware can be updated in place.
        const FW_UPDATE   = 1 << 6;

        /// Everything an RGB board supports.
        const STANDARD_RGB = Self::RGB.bits()
            | Self::POLL_RATE.bits()
            | Self::ADJUST_RATE.bits()
            | Self::BIND.bits()
            | Self::NOTIFY.bits()
            | Self::FW_VERSION.bits()
            | Self::FW_UPDATE.bits();
        /// Everything a non-RGB board supports.
        const STANDARD_NON_RGB = Self::BIND.bits() | Self::NOTIFY.bits();
        /// What is left while a firmware update is pending.
        const UPDATE_ONLY = Self::RGB.bits() | Self::FW_VERSION.bits() | Self::FW_UPDATE.bits();
    }
}

/// `true` if the vendor/product pair is an RGB-capable board.
pub fn is_rgb(vendor: u16, product: u16) -> bool {
    vendor == VENDOR_ID && product != pids::STANDARD && product != pids::FULL_SIZE
}

/// Feature set for a vendor/product pair, restricted to `mask`.
pub fn derive_features(vendor: u16, product: u16, mask: FeatureSet) -> FeatureSet {
    let base = if is_rgb(vendor, product) {
        FeatureSet::STANDARD_RGB
    } else {
        FeatureSet::STANDARD_NON_RGB
    };
    base & mask
}

/// Physical form factor, derived from the product id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelClass {
    Compact,
    Standard,
    /// The largest board. Always carries at least three lighting modes.
    FullSize,
}

impl ModelClass {
    pub fn from_product(product: u16) -> Self {
        match product {
            pids::COMPACT_RGB => Self::Compact,
            pids::STANDARD_RGB | pids::STANDARD => Self::Standard,
            _ => Self::FullSize,
        }
    }

    /// Marketing size number used in default device names.
    pub fn size(self) -> u8 {
        match self {
            Self::Compact => 65,
            Self::Standard => 70,
            Self::FullSize => 95,
        }
    }

    /// Number of lighting modes populated at setup.
    pub fn default_modes(self) -> usize {
        match self {
            Self::FullSize => 3,
            _ => 1,
        }
    }

    /// Name given to a device that did not supply one.
    pub fn default_name(self, features: FeatureSet) -> String {
        let rgb = if features.contains(FeatureSet::RGB) {
            " RGB"
        } else {
            ""
        };
        format!("Corsair K{}{}", self.size(), rgb)
    }
}

impl fmt::Display for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "K{}", self.size())
    }
}
