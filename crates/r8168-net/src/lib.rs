//! Driver for the Realtek RTL8168/8111 family of PCI Express gigabit Ethernet controllers.
//!
//! The driver is written against the host seams in `r8168-hal`: it reaches the chip only through
//! [`r8168_hal::Mmio`], places descriptor rings and packet buffers in [`r8168_hal::DmaMemory`],
//! touches PCI configuration space through [`r8168_hal::PciConfig`] and measures every bounded wait
//! with a [`r8168_hal::Clock`]. Received frames and flow-control notifications go upstream through
//! [`NetStack`].
//!
//! Entry points a host wires up:
//! - [`Rtl8168::handle_interrupt`] from the interrupt line;
//! - [`Rtl8168::poll`] when [`DriverConfig::poll_mode`] is set and the stack was asked to poll;
//! - [`Rtl8168::run_timers`] and [`Rtl8168::run_deferred_work`] from a periodic worker.

#![forbid(unsafe_code)]

pub mod access;
mod admin;
mod config;
mod device;
mod dispatch;
mod error;
pub mod filter;
mod hw;
pub mod mdio;
mod packet;
pub mod phy;
pub mod regs;
mod ring;
mod stack;
mod stats;
mod timers;
pub mod tuning;
pub mod variant;

pub use access::{EriType, Registers};
pub use admin::{DriverInfo, WakeFlags, DRIVER_NAME, DRIVER_VERSION};
pub use config::DriverConfig;
pub use device::{rx_buf_size, DeferredTask, DeviceResources, Rtl8168};
pub use dispatch::{Budget, IrqReturn};
pub use error::{AccessError, ConfigError, Error, Result};
pub use filter::RxFilter;
pub use mdio::{Mdio, MdioTransport};
pub use packet::{RxChecksum, RxFrame, TxChecksum, TxOutcome, TxPacket};
pub use phy::{Duplex, GmiiPhy, LinkPhase, LinkRequest, LinkSettings, PhyOps, Speed};
pub use ring::RingState;
pub use stack::{NetStack, Recorded, RecordingStack};
pub use stats::{NetStats, TallyCounters};
pub use timers::TimerKind;
pub use variant::{ChecksumClass, ChipVariant, UnknownVariant, VariantDescriptor};
