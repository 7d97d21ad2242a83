use std::sync::{Mutex, MutexGuard};

use r8168_hal::pci::*;
use r8168_hal::PciConfig;

const SPACE_LEN: usize = 256;

/// Type-0 configuration header of the modelled function.
///
/// The status register's error bits are write-1-to-clear, like the real thing. Everything else
/// is plain storage; [`PciSpace::corrupt_u8`] and friends bypass that to simulate bus glitches.
#[derive(Debug)]
pub struct PciSpace {
    space: Mutex<[u8; SPACE_LEN]>,
}

impl Default for PciSpace {
    fn default() -> Self {
        let mut space = [0u8; SPACE_LEN];
        let mut put = |offset: u16, bytes: &[u8]| {
            let start = usize::from(offset);
            space[start..start + bytes.len()].copy_from_slice(bytes);
        };
        put(0x00, &0x10ecu16.to_le_bytes());
        put(0x02, &0x8168u16.to_le_bytes());
        put(PCI_COMMAND, &(PCI_COMMAND_IO | PCI_COMMAND_MEMORY).to_le_bytes());
        put(PCI_CACHE_LINE_SIZE, &[0x10]);
        put(PCI_BASE_ADDRESS_0, &0x0000_e001u32.to_le_bytes());
        put(PCI_BASE_ADDRESS_2, &0xfebf_0004u32.to_le_bytes());
        put(PCI_BASE_ADDRESS_4, &0xfebe_000cu32.to_le_bytes());
        put(PCI_INTERRUPT_LINE, &[11]);
        Self {
            space: Mutex::new(space),
        }
    }
}

impl PciSpace {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, [u8; SPACE_LEN]> {
        self.space
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self, offset: u16, buf: &mut [u8]) {
        let space = self.lock();
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = space.get(usize::from(offset) + i).copied().unwrap_or(0xff);
        }
    }

    fn store(&self, offset: u16, bytes: &[u8]) {
        let mut space = self.lock();
        for (i, byte) in bytes.iter().enumerate() {
            if let Some(slot) = space.get_mut(usize::from(offset) + i) {
                *slot = *byte;
            }
        }
    }

    /// Writes behind the driver's back.
    pub fn corrupt_u8(&self, offset: u16, value: u8) {
        self.store(offset, &[value]);
    }

    pub fn corrupt_u16(&self, offset: u16, value: u16) {
        self.store(offset, &value.to_le_bytes());
    }

    /// Latches error bits into the status register as the bus would.
    pub fn raise_status(&self, bits: u16) {
        let status = self.read_u16(PCI_STATUS);
        self.store(PCI_STATUS, &(status | bits).to_le_bytes());
    }
}

impl PciConfig for PciSpace {
    fn read_u8(&self, offset: u16) -> u8 {
        let mut buf = [0u8; 1];
        self.read(offset, &mut buf);
        buf[0]
    }

    fn read_u16(&self, offset: u16) -> u16 {
        let mut buf = [0u8; 2];
        self.read(offset, &mut buf);
        u16::from_le_bytes(buf)
    }

    fn read_u32(&self, offset: u16) -> u32 {
        let mut buf = [0u8; 4];
        self.read(offset, &mut buf);
        u32::from_le_bytes(buf)
    }

    fn write_u8(&self, offset: u16, value: u8) {
        self.store(offset, &[value]);
    }

    fn write_u16(&self, offset: u16, value: u16) {
        if offset == PCI_STATUS {
            let status = self.read_u16(PCI_STATUS);
            let cleared = status & !(value & PCI_STATUS_ERROR_BITS);
            self.store(PCI_STATUS, &cleared.to_le_bytes());
            return;
        }
        self.store(offset, &value.to_le_bytes());
    }

    fn write_u32(&self, offset: u16, value: u32) {
        self.write_u16(offset, value as u16);
        self.write_u16(offset + 2, (value >> 16) as u16);
    }
}
