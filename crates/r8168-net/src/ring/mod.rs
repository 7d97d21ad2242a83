//! Descriptor ring manager.
//!
//! Each direction owns a contiguous array of 16-byte descriptors in coherent memory plus a
//! host-side slot per descriptor holding the buffer currently attached to it. The `DESC_OWN` bit
//! in `opts1` decides who may touch a slot's buffer; everything here is written so the driver
//! only reads or writes a buffer while that bit is clear, and only flips it to the device after
//! the address and length fields are published behind a write barrier.

mod rx;
mod tx;

use std::sync::Arc;

use r8168_hal::{DmaMemory, DmaRegion};

use crate::regs::*;

pub(crate) use rx::{RxContext, RxRing};
pub(crate) use tx::{Reclaimed, TxRing, TxSubmit};

/// Ring lifecycle. `Draining` covers the window between quiescing the chip and tearing the ring
/// down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingState {
    Uninitialized,
    Initialized,
    Active,
    Draining,
}

/// The descriptor array of one ring.
pub(crate) struct DescRing {
    dma: Arc<dyn DmaMemory>,
    region: DmaRegion,
    count: usize,
}

impl DescRing {
    pub fn alloc(dma: &Arc<dyn DmaMemory>, count: usize) -> Option<Self> {
        let region = DmaRegion::alloc(dma, count * DESC_SIZE, RING_ALIGN)?;
        Some(Self {
            dma: Arc::clone(dma),
            region,
            count,
        })
    }

    pub fn dma(&self) -> &Arc<dyn DmaMemory> {
        &self.dma
    }

    pub fn paddr(&self) -> u64 {
        self.region.paddr()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Slot index of a free-running cursor.
    pub fn index(&self, cursor: u32) -> usize {
        cursor as usize % self.count
    }

    fn desc(&self, index: usize) -> u64 {
        self.region.paddr() + (index * DESC_SIZE) as u64
    }

    pub fn opts1(&self, index: usize) -> u32 {
        self.dma.read_u32(self.desc(index) + DESC_OPTS1)
    }

    pub fn opts2(&self, index: usize) -> u32 {
        self.dma.read_u32(self.desc(index) + DESC_OPTS2)
    }

    pub fn addr(&self, index: usize) -> u64 {
        self.dma.read_u64(self.desc(index) + DESC_ADDR)
    }

    pub fn set_opts1(&self, index: usize, value: u32) {
        self.dma.write_u32(self.desc(index) + DESC_OPTS1, value);
    }

    pub fn set_opts2(&self, index: usize, value: u32) {
        self.dma.write_u32(self.desc(index) + DESC_OPTS2, value);
    }

    pub fn set_addr(&self, index: usize, value: u64) {
        self.dma.write_u64(self.desc(index) + DESC_ADDR, value);
    }

    /// The wrap marker for `index`.
    pub fn ring_end(&self, index: usize) -> u32 {
        if index + 1 == self.count {
            RING_END
        } else {
            0
        }
    }

    /// Zeroes every descriptor and sets the wrap marker on the last one.
    pub fn reset(&self) {
        self.region.clear();
        self.set_opts1(self.count - 1, RING_END);
    }
}

/// `a - b` on free-running cursors.
pub(crate) fn distance(a: u32, b: u32) -> usize {
    a.wrapping_sub(b) as usize
}
