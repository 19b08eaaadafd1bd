//! Lifecycle management for USB RGB keyboards.
//!
//! A keyboard goes through three controllers:
//! - [`setup()`] builds an initialized [`Device`] from a [`DeviceSkeleton`];
//! - [`prepare_for_reset`], [`reset::reset`] and [`try_reset`] hand the device
//!   back to its firmware, reset it and bring it back;
//! - [`close`] persists the profile and releases everything.
//!
//! Outbound lighting commands go through a bounded per-device
//! [`CommandQueue`]. Everything outside the core (HID transport, control node,
//! input subsystem, firmware and lighting protocol, notifications, profile
//! storage) is reached through the traits in [`backends`].
//!
//! [`DeviceManager`] ties it together for a fixed number of slots.

pub mod backends;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod eventbus;
pub mod features;
pub mod filtered_listener;
pub mod logger;
pub mod manager;
pub mod metadata;
pub mod profile;
pub mod queue;
pub mod reset;
pub mod setup;
pub mod snapshot;
pub mod store;
pub mod teardown;

pub use backends::Services;
pub use config::{Config, Settle, SettleTimes};
pub use device::{Device, DeviceSkeleton, DeviceState, Lifecycle, PollRate};
pub use error::{Error, ResetSeverity, Result, StoreError, TransportError};
pub use event::{DeviceEvent, EventKind};
pub use eventbus::{EventBus, EventFilter, EventListener};
pub use features::{FeatureSet, ModelClass};
pub use manager::DeviceManager;
pub use metadata::DeviceIdentity;
pub use profile::{Keymap, Mode, Profile};
pub use queue::{CommandQueue, Message, MSG_SIZE};
pub use reset::{prepare_for_reset, try_reset};
pub use setup::setup;
pub use snapshot::{DeviceStatus, Snapshot};
pub use store::{JsonProfileStore, MemoryProfileStore, ProfileStore};
pub use teardown::close;
