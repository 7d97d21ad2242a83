use std::sync::Arc;

/// Memory-mapped register window of one device.
///
/// Offsets are byte offsets into the BAR. Accesses are plain stores/loads; implementations
/// backed by real mappings must use volatile accesses. Methods take `&self` because register
/// windows are shared by every context that talks to the device.
pub trait Mmio: Send + Sync {
    fn read8(&self, offset: u32) -> u8;
    fn read16(&self, offset: u32) -> u16;
    fn read32(&self, offset: u32) -> u32;

    fn write8(&self, offset: u32, value: u8);
    fn write16(&self, offset: u32, value: u16);
    fn write32(&self, offset: u32, value: u32);
}

impl<T: Mmio + ?Sized> Mmio for Arc<T> {
    fn read8(&self, offset: u32) -> u8 {
        (**self).read8(offset)
    }

    fn read16(&self, offset: u32) -> u16 {
        (**self).read16(offset)
    }

    fn read32(&self, offset: u32) -> u32 {
        (**self).read32(offset)
    }

    fn write8(&self, offset: u32, value: u8) {
        (**self).write8(offset, value)
    }

    fn write16(&self, offset: u32, value: u16) {
        (**self).write16(offset, value)
    }

    fn write32(&self, offset: u32, value: u32) {
        (**self).write32(offset, value)
    }
}

impl<T: Mmio + ?Sized> Mmio for Box<T> {
    fn read8(&self, offset: u32) -> u8 {
        (**self).read8(offset)
    }

    fn read16(&self, offset: u32) -> u16 {
        (**self).read16(offset)
    }

    fn read32(&self, offset: u32) -> u32 {
        (**self).read32(offset)
    }

    fn write8(&self, offset: u32, value: u8) {
        (**self).write8(offset, value)
    }

    fn write16(&self, offset: u32, value: u16) {
        (**self).write16(offset, value)
    }

    fn write32(&self, offset: u32, value: u32) {
        (**self).write32(offset, value)
    }
}
