use std::sync::atomic::{fence, Ordering};
use std::sync::Arc;

/// Coherent DMA memory as seen by the driver.
///
/// Addresses are bus/physical addresses as programmed into descriptors. Reads and writes are
/// defined as infallible: a descriptor ring or packet buffer is only ever accessed inside a
/// region previously returned by [`DmaMemory::alloc_coherent`].
pub trait DmaMemory: Send + Sync {
    /// Allocates `len` bytes aligned to `align` (a power of two). `None` on exhaustion.
    fn alloc_coherent(&self, len: usize, align: usize) -> Option<u64>;

    /// Releases a region returned by [`DmaMemory::alloc_coherent`].
    fn free_coherent(&self, paddr: u64, len: usize);

    fn read(&self, paddr: u64, buf: &mut [u8]);
    fn write(&self, paddr: u64, buf: &[u8]);

    /// Write barrier: every store issued before it is visible to the device before any store
    /// issued after it.
    fn wmb(&self) {
        fence(Ordering::Release);
    }

    /// Read barrier: loads issued after it observe device writes that completed before a
    /// preceding load (typically the ownership bit) returned.
    fn rmb(&self) {
        fence(Ordering::Acquire);
    }

    fn read_u16(&self, paddr: u64) -> u16 {
        let mut buf = [0u8; 2];
        self.read(paddr, &mut buf);
        u16::from_le_bytes(buf)
    }

    fn read_u32(&self, paddr: u64) -> u32 {
        let mut buf = [0u8; 4];
        self.read(paddr, &mut buf);
        u32::from_le_bytes(buf)
    }

    fn read_u64(&self, paddr: u64) -> u64 {
        let mut buf = [0u8; 8];
        self.read(paddr, &mut buf);
        u64::from_le_bytes(buf)
    }

    fn write_u16(&self, paddr: u64, val: u16) {
        self.write(paddr, &val.to_le_bytes());
    }

    fn write_u32(&self, paddr: u64, val: u32) {
        self.write(paddr, &val.to_le_bytes());
    }

    fn write_u64(&self, paddr: u64, val: u64) {
        self.write(paddr, &val.to_le_bytes());
    }
}

impl<T: DmaMemory + ?Sized> DmaMemory for Arc<T> {
    fn alloc_coherent(&self, len: usize, align: usize) -> Option<u64> {
        (**self).alloc_coherent(len, align)
    }

    fn free_coherent(&self, paddr: u64, len: usize) {
        (**self).free_coherent(paddr, len)
    }

    fn read(&self, paddr: u64, buf: &mut [u8]) {
        (**self).read(paddr, buf)
    }

    fn write(&self, paddr: u64, buf: &[u8]) {
        (**self).write(paddr, buf)
    }

    fn wmb(&self) {
        (**self).wmb()
    }

    fn rmb(&self) {
        (**self).rmb()
    }
}

/// An owned coherent allocation.
///
/// The region is released exactly once, when the handle is dropped. Descriptor arrays and
/// packet buffers are both represented this way so a buffer can never be freed twice or leaked
/// by a forgotten bookkeeping path.
pub struct DmaRegion {
    dma: Arc<dyn DmaMemory>,
    paddr: u64,
    len: usize,
}

impl DmaRegion {
    pub fn alloc(dma: &Arc<dyn DmaMemory>, len: usize, align: usize) -> Option<Self> {
        let paddr = dma.alloc_coherent(len, align)?;
        Some(Self {
            dma: Arc::clone(dma),
            paddr,
            len,
        })
    }

    pub fn paddr(&self) -> u64 {
        self.paddr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copies `dst.len()` bytes starting at `offset` out of the region.
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) {
        debug_assert!(offset + dst.len() <= self.len);
        self.dma.read(self.paddr + offset as u64, dst);
    }

    pub fn write_at(&self, offset: usize, src: &[u8]) {
        debug_assert!(offset + src.len() <= self.len);
        self.dma.write(self.paddr + offset as u64, src);
    }

    /// Zero-fills the whole region.
    pub fn clear(&self) {
        self.dma.write(self.paddr, &vec![0u8; self.len]);
    }
}

impl Drop for DmaRegion {
    fn drop(&mut self) {
        self.dma.free_coherent(self.paddr, self.len);
    }
}

impl std::fmt::Debug for DmaRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmaRegion")
            .field("paddr", &format_args!("{:#x}", self.paddr))
            .field("len", &self.len)
            .finish()
    }
}
