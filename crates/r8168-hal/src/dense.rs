use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::dma::DmaMemory;

/// Lowest address handed out; keeps a zero address meaning "unmapped".
const BASE: u64 = 0x1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaAccessKind {
    Read,
    Write,
    Free,
}

/// One driver-side access recorded by [`DenseDma`] while logging is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaAccess {
    pub kind: DmaAccessKind,
    pub paddr: u64,
    pub len: usize,
}

impl DmaAccess {
    pub fn overlaps(&self, paddr: u64, len: usize) -> bool {
        let end = self.paddr + self.len as u64;
        let other_end = paddr + len as u64;
        self.paddr < other_end && paddr < end
    }
}

#[derive(Debug, Default)]
struct Inner {
    mem: Vec<u8>,
    allocations: BTreeMap<u64, usize>,
    alloc_attempts: u64,
    allocs: u64,
    frees: u64,
    bad_frees: u64,
    fail_at_attempt: Option<u64>,
    exhausted: bool,
    log: Option<Vec<DmaAccess>>,
}

/// Dense `Vec`-backed coherent memory with a first-fit allocator.
///
/// Used as the DMA backend in tests and by the chip model. Driver-side accesses go through the
/// [`DmaMemory`] trait and can be logged; the device side uses [`DenseDma::device_read`] /
/// [`DenseDma::device_write`], which are never logged.
#[derive(Debug)]
pub struct DenseDma {
    inner: Mutex<Inner>,
}

impl DenseDma {
    pub fn new(size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                mem: vec![0; size],
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn size(&self) -> u64 {
        self.lock().mem.len() as u64
    }

    /// Number of allocations currently outstanding.
    pub fn live_allocations(&self) -> usize {
        self.lock().allocations.len()
    }

    pub fn total_allocations(&self) -> u64 {
        self.lock().allocs
    }

    pub fn total_frees(&self) -> u64 {
        self.lock().frees
    }

    /// Frees of addresses that were not allocated (double frees or stray pointers).
    pub fn bad_frees(&self) -> u64 {
        self.lock().bad_frees
    }

    pub fn is_allocated(&self, paddr: u64) -> bool {
        self.lock().allocations.contains_key(&paddr)
    }

    /// Makes the `k`-th allocation attempt from now (1-based) fail. One-shot.
    pub fn fail_nth_allocation(&self, k: u64) {
        let mut inner = self.lock();
        let target = inner.alloc_attempts + k.max(1);
        inner.fail_at_attempt = Some(target);
    }

    /// While set, every allocation fails.
    pub fn set_exhausted(&self, exhausted: bool) {
        self.lock().exhausted = exhausted;
    }

    /// Starts recording driver-side accesses, discarding any previous log.
    pub fn start_access_log(&self) {
        self.lock().log = Some(Vec::new());
    }

    /// Returns and clears the access log (logging stays enabled).
    pub fn take_access_log(&self) -> Vec<DmaAccess> {
        let mut inner = self.lock();
        match inner.log.as_mut() {
            Some(log) => std::mem::take(log),
            None => Vec::new(),
        }
    }

    pub fn device_read(&self, paddr: u64, buf: &mut [u8]) {
        self.lock().read(paddr, buf);
    }

    pub fn device_write(&self, paddr: u64, buf: &[u8]) {
        self.lock().write(paddr, buf);
    }

    pub fn device_read_u32(&self, paddr: u64) -> u32 {
        let mut buf = [0u8; 4];
        self.device_read(paddr, &mut buf);
        u32::from_le_bytes(buf)
    }

    pub fn device_read_u64(&self, paddr: u64) -> u64 {
        let mut buf = [0u8; 8];
        self.device_read(paddr, &mut buf);
        u64::from_le_bytes(buf)
    }

    pub fn device_write_u32(&self, paddr: u64, val: u32) {
        self.device_write(paddr, &val.to_le_bytes());
    }

    pub fn device_write_u64(&self, paddr: u64, val: u64) {
        self.device_write(paddr, &val.to_le_bytes());
    }
}

impl Inner {
    fn range(&self, paddr: u64, len: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(paddr).ok()?;
        let end = start.checked_add(len)?;
        (end <= self.mem.len()).then_some(start..end)
    }

    fn read(&self, paddr: u64, buf: &mut [u8]) {
        match self.range(paddr, buf.len()) {
            Some(range) => buf.copy_from_slice(&self.mem[range]),
            None => {
                tracing::warn!(paddr, len = buf.len(), "DMA read out of range");
                buf.fill(0xff);
            }
        }
    }

    fn write(&mut self, paddr: u64, buf: &[u8]) {
        match self.range(paddr, buf.len()) {
            Some(range) => self.mem[range].copy_from_slice(buf),
            None => tracing::warn!(paddr, len = buf.len(), "DMA write out of range"),
        }
    }

    fn record(&mut self, kind: DmaAccessKind, paddr: u64, len: usize) {
        if let Some(log) = self.log.as_mut() {
            log.push(DmaAccess { kind, paddr, len });
        }
    }

    fn find_gap(&self, len: usize, align: u64) -> Option<u64> {
        let align_up = |addr: u64| (addr + align - 1) & !(align - 1);
        let mut candidate = align_up(BASE);
        for (&start, &size) in &self.allocations {
            if candidate + len as u64 <= start {
                break;
            }
            candidate = candidate.max(align_up(start + size as u64));
        }
        (candidate + len as u64 <= self.mem.len() as u64).then_some(candidate)
    }
}

impl DmaMemory for DenseDma {
    fn alloc_coherent(&self, len: usize, align: usize) -> Option<u64> {
        let mut inner = self.lock();
        inner.alloc_attempts += 1;
        if inner.exhausted || inner.fail_at_attempt == Some(inner.alloc_attempts) {
            inner.fail_at_attempt = None;
            return None;
        }

        let align = align.max(1).next_power_of_two() as u64;
        let paddr = inner.find_gap(len.max(1), align)?;
        inner.allocations.insert(paddr, len.max(1));
        inner.allocs += 1;
        Some(paddr)
    }

    fn free_coherent(&self, paddr: u64, len: usize) {
        let mut inner = self.lock();
        inner.record(DmaAccessKind::Free, paddr, len);
        match inner.allocations.remove(&paddr) {
            Some(_) => inner.frees += 1,
            None => {
                inner.bad_frees += 1;
                tracing::error!(paddr, len, "free of unallocated DMA region");
            }
        }
    }

    fn read(&self, paddr: u64, buf: &mut [u8]) {
        let mut inner = self.lock();
        inner.record(DmaAccessKind::Read, paddr, buf.len());
        inner.read(paddr, buf);
    }

    fn write(&self, paddr: u64, buf: &[u8]) {
        let mut inner = self.lock();
        inner.record(DmaAccessKind::Write, paddr, buf.len());
        inner.write(paddr, buf);
    }
}
