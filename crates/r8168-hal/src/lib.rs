//! Host abstraction seams for the RTL8168 driver.
//!
//! The driver never touches hardware directly. Register BAR access, coherent DMA memory, PCI
//! configuration space and time are all reached through the traits in this crate so the same
//! driver code runs against real mappings or against an in-process chip model in tests.

#![forbid(unsafe_code)]

mod clock;
mod dense;
mod dma;
mod mmio;
pub mod pci;

pub use clock::{Clock, FakeClock, StdClock};
pub use dense::{DenseDma, DmaAccess, DmaAccessKind};
pub use dma::{DmaMemory, DmaRegion};
pub use mmio::Mmio;
pub use pci::PciConfig;
