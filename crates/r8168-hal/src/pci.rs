//! PCI configuration-space access.

use std::sync::Arc;

pub const PCI_COMMAND: u16 = 0x04;
pub const PCI_STATUS: u16 = 0x06;
pub const PCI_CACHE_LINE_SIZE: u16 = 0x0c;
pub const PCI_LATENCY_TIMER: u16 = 0x0d;
pub const PCI_BASE_ADDRESS_0: u16 = 0x10;
pub const PCI_BASE_ADDRESS_2: u16 = 0x18;
pub const PCI_BASE_ADDRESS_4: u16 = 0x20;
pub const PCI_BASE_ADDRESS_5: u16 = 0x24;
pub const PCI_INTERRUPT_LINE: u16 = 0x3c;

pub const PCI_COMMAND_IO: u16 = 1 << 0;
pub const PCI_COMMAND_MEMORY: u16 = 1 << 1;
pub const PCI_COMMAND_MASTER: u16 = 1 << 2;
pub const PCI_COMMAND_PARITY: u16 = 1 << 6;
pub const PCI_COMMAND_SERR: u16 = 1 << 8;

pub const PCI_STATUS_PARITY: u16 = 1 << 8;
pub const PCI_STATUS_SIG_TARGET_ABORT: u16 = 1 << 11;
pub const PCI_STATUS_REC_TARGET_ABORT: u16 = 1 << 12;
pub const PCI_STATUS_REC_MASTER_ABORT: u16 = 1 << 13;
pub const PCI_STATUS_SIG_SYSTEM_ERROR: u16 = 1 << 14;
pub const PCI_STATUS_DETECTED_PARITY: u16 = 1 << 15;

/// Every status bit that reports a bus error. These bits are write-1-to-clear.
pub const PCI_STATUS_ERROR_BITS: u16 = PCI_STATUS_PARITY
    | PCI_STATUS_SIG_TARGET_ABORT
    | PCI_STATUS_REC_TARGET_ABORT
    | PCI_STATUS_REC_MASTER_ABORT
    | PCI_STATUS_SIG_SYSTEM_ERROR
    | PCI_STATUS_DETECTED_PARITY;

/// Configuration space of the function the driver is bound to.
pub trait PciConfig: Send + Sync {
    fn read_u8(&self, offset: u16) -> u8;
    fn read_u16(&self, offset: u16) -> u16;
    fn read_u32(&self, offset: u16) -> u32;

    fn write_u8(&self, offset: u16, value: u8);
    fn write_u16(&self, offset: u16, value: u16);
    fn write_u32(&self, offset: u16, value: u32);
}

impl<T: PciConfig + ?Sized> PciConfig for Arc<T> {
    fn read_u8(&self, offset: u16) -> u8 {
        (**self).read_u8(offset)
    }

    fn read_u16(&self, offset: u16) -> u16 {
        (**self).read_u16(offset)
    }

    fn read_u32(&self, offset: u16) -> u32 {
        (**self).read_u32(offset)
    }

    fn write_u8(&self, offset: u16, value: u8) {
        (**self).write_u8(offset, value)
    }

    fn write_u16(&self, offset: u16, value: u16) {
        (**self).write_u16(offset, value)
    }

    fn write_u32(&self, offset: u16, value: u32) {
        (**self).write_u32(offset, value)
    }
}
