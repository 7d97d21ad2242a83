//! Register access layer.
//!
//! Direct BAR accesses plus the indirect register spaces reached through a command/data register
//! pair (CSI, EPHY, ERI, OCP, efuse). Every indirect access issues a command and then polls a flag
//! bit with a short delay for a bounded number of attempts. A timeout is logged and reported as
//! [`AccessError::Timeout`]; most callers treat the access as best effort and carry on.

use std::sync::Arc;

use r8168_hal::{Clock, Mmio};

use crate::error::AccessError;
use crate::regs::*;

/// Poll attempts for CSI/EPHY/ERI handshakes (100us apart, ~1ms total).
const INDIRECT_POLL_ATTEMPTS: u32 = 10;
const INDIRECT_POLL_DELAY_US: u64 = 100;
/// Settle time after an indirect handshake.
const INDIRECT_SETTLE_US: u64 = 20;
const OCP_POLL_ATTEMPTS: u32 = 20;
const EFUSE_POLL_ATTEMPTS: u32 = 300;

/// ERI address-space selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EriType {
    Exgmac = 0,
    Msix = 1,
    Asf = 2,
    Oob = 3,
}

/// Handle on the device's register BAR.
///
/// Cheap to clone; every subsystem of the driver holds one.
#[derive(Clone)]
pub struct Registers {
    mmio: Arc<dyn Mmio>,
    clock: Arc<dyn Clock>,
}

impl Registers {
    pub fn new(mmio: Arc<dyn Mmio>, clock: Arc<dyn Clock>) -> Self {
        Self { mmio, clock }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn read8(&self, offset: u32) -> u8 {
        self.mmio.read8(offset)
    }

    pub fn read16(&self, offset: u32) -> u16 {
        self.mmio.read16(offset)
    }

    pub fn read32(&self, offset: u32) -> u32 {
        self.mmio.read32(offset)
    }

    pub fn write8(&self, offset: u32, value: u8) {
        self.mmio.write8(offset, value)
    }

    pub fn write16(&self, offset: u32, value: u16) {
        self.mmio.write16(offset, value)
    }

    pub fn write32(&self, offset: u32, value: u32) {
        self.mmio.write32(offset, value)
    }

    pub fn set_bits8(&self, offset: u32, bits: u8) {
        self.write8(offset, self.read8(offset) | bits);
    }

    pub fn clear_bits8(&self, offset: u32, bits: u8) {
        self.write8(offset, self.read8(offset) & !bits);
    }

    /// Writes a 64-bit bus address as two 32-bit halves, low word first.
    pub fn write_u64_pair(&self, low_offset: u32, value: u64) {
        self.write32(low_offset, value as u32);
        self.write32(low_offset + 4, (value >> 32) as u32);
    }

    pub fn delay_us(&self, us: u64) {
        self.clock.delay_us(us);
    }

    pub fn delay_ms(&self, ms: u64) {
        self.clock.delay_ms(ms);
    }

    /// Polls `offset` until `done` accepts the value, waiting `delay_us` before each read.
    /// Returns the last value read on success.
    pub(crate) fn poll32(
        &self,
        offset: u32,
        attempts: u32,
        delay_us: u64,
        done: impl Fn(u32) -> bool,
    ) -> Option<u32> {
        for _ in 0..attempts {
            self.clock.delay_us(delay_us);
            let value = self.read32(offset);
            if done(value) {
                return Some(value);
            }
        }
        None
    }

    fn handshake(
        &self,
        what: &'static str,
        offset: u32,
        flag: u32,
        flag_set_when_done: bool,
    ) -> Result<u32, AccessError> {
        let done = |v: u32| (v & flag != 0) == flag_set_when_done;
        let result = self.poll32(offset, INDIRECT_POLL_ATTEMPTS, INDIRECT_POLL_DELAY_US, done);
        self.clock.delay_us(INDIRECT_SETTLE_US);
        result.ok_or_else(|| {
            tracing::warn!(what, offset, "indirect register handshake timed out");
            AccessError::Timeout { what }
        })
    }

    pub fn ephy_write(&self, reg: u8, value: u16) -> Result<(), AccessError> {
        self.write32(
            EPHYAR,
            EPHYAR_FLAG
                | (u32::from(reg) & EPHYAR_REG_MASK) << EPHYAR_REG_SHIFT
                | (u32::from(value) & EPHYAR_DATA_MASK),
        );
        self.handshake("EPHY write", EPHYAR, EPHYAR_FLAG, false)
            .map(|_| ())
    }

    pub fn ephy_read(&self, reg: u8) -> Result<u16, AccessError> {
        self.write32(EPHYAR, (u32::from(reg) & EPHYAR_REG_MASK) << EPHYAR_REG_SHIFT);
        self.handshake("EPHY read", EPHYAR, EPHYAR_FLAG, true)
            .map(|v| (v & EPHYAR_DATA_MASK) as u16)
    }

    pub fn csi_write(&self, addr: u16, value: u32) -> Result<(), AccessError> {
        self.write32(CSIDR, value);
        self.write32(
            CSIAR,
            CSIAR_FLAG
                | CSIAR_BYTE_ENABLE << CSIAR_BYTE_ENABLE_SHIFT
                | (u32::from(addr) & CSIAR_ADDR_MASK),
        );
        self.handshake("CSI write", CSIAR, CSIAR_FLAG, false)
            .map(|_| ())
    }

    pub fn csi_read(&self, addr: u16) -> Result<u32, AccessError> {
        self.write32(
            CSIAR,
            CSIAR_BYTE_ENABLE << CSIAR_BYTE_ENABLE_SHIFT | (u32::from(addr) & CSIAR_ADDR_MASK),
        );
        self.handshake("CSI read", CSIAR, CSIAR_FLAG, true)?;
        Ok(self.read32(CSIDR))
    }

    fn eri_read_window(&self, aligned: u32, ty: EriType) -> Result<u32, AccessError> {
        self.write32(
            ERIAR,
            (ty as u32) << ERIAR_TYPE_SHIFT | 0x0f << ERIAR_BYTE_EN_SHIFT | (aligned & ERIAR_ADDR_MASK),
        );
        self.handshake("ERI read", ERIAR, ERIAR_FLAG, true)?;
        Ok(self.read32(ERIDR))
    }

    fn eri_write_window(&self, aligned: u32, value: u32, ty: EriType) -> Result<(), AccessError> {
        self.write32(ERIDR, value);
        self.write32(
            ERIAR,
            ERIAR_FLAG
                | (ty as u32) << ERIAR_TYPE_SHIFT
                | 0x0f << ERIAR_BYTE_EN_SHIFT
                | (aligned & ERIAR_ADDR_MASK),
        );
        self.handshake("ERI write", ERIAR, ERIAR_FLAG, false)
            .map(|_| ())
    }

    /// Reads `len` (1..=4) bytes of the extended register space starting at any byte address.
    ///
    /// Spans crossing a 32-bit boundary are split into two aligned window reads and stitched
    /// together little-endian.
    pub fn eri_read(&self, addr: u32, len: usize, ty: EriType) -> Result<u32, AccessError> {
        if !(1..=4).contains(&len) {
            return Err(AccessError::InvalidLength(len));
        }

        let mut value = 0u32;
        for window in eri_windows(addr, len) {
            let raw = self.eri_read_window(window.aligned, ty)?;
            let bytes = (raw >> (window.byte_offset * 8)) & window.value_mask();
            value |= bytes << (window.shift * 8);
        }
        Ok(value)
    }

    /// Writes `len` (1..=4) bytes of `value` at any byte address, read-modify-writing each
    /// aligned window so neighbouring bytes are preserved.
    pub fn eri_write(
        &self,
        addr: u32,
        len: usize,
        value: u32,
        ty: EriType,
    ) -> Result<(), AccessError> {
        if !(1..=4).contains(&len) {
            return Err(AccessError::InvalidLength(len));
        }

        for window in eri_windows(addr, len) {
            let lane_mask = window.value_mask() << (window.byte_offset * 8);
            let current = self.eri_read_window(window.aligned, ty)?;
            let bytes = (value >> (window.shift * 8)) & window.value_mask();
            let merged = (current & !lane_mask) | (bytes << (window.byte_offset * 8));
            self.eri_write_window(window.aligned, merged, ty)?;
        }
        Ok(())
    }

    /// Out-of-band management processor register read (`mask` selects byte lanes).
    pub fn ocp_read(&self, mask: u8, reg: u16) -> Result<u32, AccessError> {
        self.write32(
            OCPAR,
            (u32::from(mask) & 0xf) << OCPAR_BYTE_EN_SHIFT | (u32::from(reg) & OCPAR_ADDR_MASK),
        );
        let done = self.poll32(OCPAR, OCP_POLL_ATTEMPTS, INDIRECT_POLL_DELAY_US, |v| {
            v & OCPAR_FLAG != 0
        });
        if done.is_none() {
            tracing::warn!(reg, "OCP read timed out");
            return Err(AccessError::Timeout { what: "OCP read" });
        }
        Ok(self.read32(OCPDR))
    }

    pub fn ocp_write(&self, mask: u8, reg: u16, data: u32) -> Result<(), AccessError> {
        self.write32(OCPDR, data);
        self.write32(
            OCPAR,
            OCPAR_FLAG
                | (u32::from(mask) & 0xf) << OCPAR_BYTE_EN_SHIFT
                | (u32::from(reg) & OCPAR_ADDR_MASK),
        );
        let done = self.poll32(OCPAR, OCP_POLL_ATTEMPTS, INDIRECT_POLL_DELAY_US, |v| {
            v & OCPAR_FLAG == 0
        });
        done.map(|_| ()).ok_or_else(|| {
            tracing::warn!(reg, "OCP write timed out");
            AccessError::Timeout { what: "OCP write" }
        })
    }

    /// Reads one byte of the on-chip efuse. Only meaningful on variants that have one.
    pub fn efuse_read(&self, reg: u16) -> Result<u8, AccessError> {
        self.write32(
            EFUSEAR,
            EFUSE_READ | (u32::from(reg) & EFUSE_REG_MASK) << EFUSE_REG_SHIFT,
        );
        let value = self.poll32(EFUSEAR, EFUSE_POLL_ATTEMPTS, INDIRECT_POLL_DELAY_US, |v| {
            v & EFUSE_READ_OK != 0
        });
        match value {
            Some(v) => Ok((v & EFUSE_DATA_MASK) as u8),
            None => {
                tracing::warn!(reg, "efuse read timed out");
                Err(AccessError::Timeout { what: "efuse read" })
            }
        }
    }
}

/// One aligned 32-bit window of an unaligned ERI span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EriWindow {
    pub aligned: u32,
    /// First byte lane used inside the window.
    pub byte_offset: u32,
    /// Number of lanes used.
    pub len: u32,
    /// Byte position of this window's data within the caller's value.
    pub shift: u32,
}

impl EriWindow {
    fn value_mask(&self) -> u32 {
        if self.len >= 4 {
            u32::MAX
        } else {
            (1u32 << (self.len * 8)) - 1
        }
    }
}

pub(crate) fn eri_windows(addr: u32, len: usize) -> impl Iterator<Item = EriWindow> {
    let mut addr = addr;
    let mut remaining = len as u32;
    let mut shift = 0u32;
    std::iter::from_fn(move || {
        if remaining == 0 {
            return None;
        }
        let byte_offset = addr % ERIAR_ADDR_ALIGN;
        let take = remaining.min(ERIAR_ADDR_ALIGN - byte_offset);
        let window = EriWindow {
            aligned: addr & !(ERIAR_ADDR_ALIGN - 1),
            byte_offset,
            len: take,
            shift,
        };
        remaining -= take;
        shift += take;
        addr += take;
        Some(window)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_span_is_one_window() {
        let windows: Vec<_> = eri_windows(0x40, 4).collect();
        assert_eq!(
            windows,
            vec![EriWindow {
                aligned: 0x40,
                byte_offset: 0,
                len: 4,
                shift: 0
            }]
        );
    }

    #[test]
    fn unaligned_span_splits_at_word_boundary() {
        let windows: Vec<_> = eri_windows(0x43, 3).collect();
        assert_eq!(windows.len(), 2);
        assert_eq!((windows[0].aligned, windows[0].byte_offset, windows[0].len), (0x40, 3, 1));
        assert_eq!((windows[1].aligned, windows[1].byte_offset, windows[1].len), (0x44, 0, 2));
        assert_eq!(windows[1].shift, 1);
    }

    #[test]
    fn short_span_inside_word() {
        let windows: Vec<_> = eri_windows(0x41, 2).collect();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].value_mask(), 0xffff);
        assert_eq!(windows[0].byte_offset, 1);
    }
}
