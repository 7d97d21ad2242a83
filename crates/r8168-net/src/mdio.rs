//! PHY management (MDIO) access.
//!
//! Three transports exist across the family. Most chips use PHYAR directly; the RTL8168DP rev 2
//! needs a gate bit in a vendor register dropped around every PHYAR access; the RTL8168DP rev 1
//! tunnels GPHY registers through the OCP window. The "current page" register (0x1f) is shared
//! device state, so every multi-step sequence runs under [`Mdio::lock`].

use std::sync::{Mutex, MutexGuard};

use crate::access::Registers;
use crate::error::AccessError;
use crate::regs::*;

pub const MII_BMCR: u8 = 0x00;
pub const MII_BMSR: u8 = 0x01;
pub const MII_PHYSID1: u8 = 0x02;
pub const MII_PHYSID2: u8 = 0x03;
pub const MII_ADVERTISE: u8 = 0x04;
pub const MII_LPA: u8 = 0x05;
pub const MII_CTRL1000: u8 = 0x09;
pub const MII_PAGE_SELECT: u8 = 0x1f;

pub const BMCR_FULLDPLX: u16 = 0x0100;
pub const BMCR_ANRESTART: u16 = 0x0200;
pub const BMCR_PDOWN: u16 = 0x0800;
pub const BMCR_ANENABLE: u16 = 0x1000;
pub const BMCR_SPEED100: u16 = 0x2000;
pub const BMCR_RESET: u16 = 0x8000;

pub const BMSR_LSTATUS: u16 = 0x0004;
pub const BMSR_ANEGCOMPLETE: u16 = 0x0020;

pub const ADVERTISE_CSMA: u16 = 0x0001;
pub const ADVERTISE_10HALF: u16 = 0x0020;
pub const ADVERTISE_10FULL: u16 = 0x0040;
pub const ADVERTISE_100HALF: u16 = 0x0080;
pub const ADVERTISE_100FULL: u16 = 0x0100;
pub const ADVERTISE_PAUSE_CAP: u16 = 0x0400;
pub const ADVERTISE_PAUSE_ASYM: u16 = 0x0800;
pub const ADVERTISE_1000HALF: u16 = 0x0100;
pub const ADVERTISE_1000FULL: u16 = 0x0200;

/// Value an MDIO read yields when the handshake never completes.
pub const MDIO_READ_FAILED: u16 = 0xffff;

const PHYAR_POLL_ATTEMPTS: u32 = 10;
const PHYAR_POLL_DELAY_US: u64 = 100;
const PHYAR_SETTLE_US: u64 = 20;
const OCP_GPHY_POLL_ATTEMPTS: u32 = 100;
const OCP_GPHY_POLL_DELAY_US: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MdioTransport {
    Phyar,
    /// PHYAR with [`DP_GATE_BIT`] of [`DP_GATE_REG`] cleared for the duration of the access.
    GatedPhyar,
    /// GPHY registers tunnelled through OCPAR/OCPDR.
    Ocp,
}

pub struct Mdio {
    regs: Registers,
    transport: MdioTransport,
    lock: Mutex<()>,
}

impl Mdio {
    pub fn new(regs: Registers, transport: MdioTransport) -> Self {
        Self {
            regs,
            transport,
            lock: Mutex::new(()),
        }
    }

    pub fn transport(&self) -> MdioTransport {
        self.transport
    }

    /// Takes the PHY lock. All PHY register traffic goes through the returned guard.
    pub fn lock(&self) -> PhyAccess<'_> {
        let guard = self
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        PhyAccess {
            mdio: self,
            _guard: guard,
        }
    }

    fn gate(&self, open: bool) {
        if self.transport == MdioTransport::GatedPhyar {
            let value = self.regs.read32(DP_GATE_REG);
            let value = if open {
                value & !DP_GATE_BIT
            } else {
                value | DP_GATE_BIT
            };
            self.regs.write32(DP_GATE_REG, value);
        }
    }

    fn raw_write(&self, reg: u8, value: u16) -> Result<(), AccessError> {
        match self.transport {
            MdioTransport::Ocp => self.ocp_gphy_write(reg, value),
            MdioTransport::Phyar | MdioTransport::GatedPhyar => {
                self.gate(true);
                self.regs.write32(
                    PHYAR,
                    PHYAR_FLAG
                        | (u32::from(reg) & PHYAR_REG_MASK) << PHYAR_REG_SHIFT
                        | u32::from(value) & PHYAR_DATA_MASK,
                );
                let done = self.regs.poll32(
                    PHYAR,
                    PHYAR_POLL_ATTEMPTS,
                    PHYAR_POLL_DELAY_US,
                    |v| v & PHYAR_FLAG == 0,
                );
                self.regs.delay_us(PHYAR_SETTLE_US);
                self.gate(false);
                done.map(|_| ()).ok_or_else(|| {
                    tracing::warn!(reg, value, "MDIO write timed out");
                    AccessError::Timeout { what: "MDIO write" }
                })
            }
        }
    }

    fn raw_read(&self, reg: u8) -> Result<u16, AccessError> {
        match self.transport {
            MdioTransport::Ocp => self.ocp_gphy_read(reg),
            MdioTransport::Phyar | MdioTransport::GatedPhyar => {
                self.gate(true);
                self.regs
                    .write32(PHYAR, (u32::from(reg) & PHYAR_REG_MASK) << PHYAR_REG_SHIFT);
                let done = self.regs.poll32(
                    PHYAR,
                    PHYAR_POLL_ATTEMPTS,
                    PHYAR_POLL_DELAY_US,
                    |v| v & PHYAR_FLAG != 0,
                );
                self.regs.delay_us(PHYAR_SETTLE_US);
                self.gate(false);
                match done {
                    Some(v) => Ok((v & PHYAR_DATA_MASK) as u16),
                    None => {
                        tracing::warn!(reg, "MDIO read timed out");
                        Err(AccessError::Timeout { what: "MDIO read" })
                    }
                }
            }
        }
    }

    fn ocp_gphy_write(&self, reg: u8, value: u16) -> Result<(), AccessError> {
        self.regs.write32(
            OCPDR,
            OCPDR_WRITE
                | (u32::from(reg) & OCPDR_REG_MASK) << OCPDR_REG_SHIFT
                | u32::from(value) & OCPDR_DATA_MASK,
        );
        self.regs.write32(OCPAR, OCPAR_GPHY_WRITE);
        self.regs.write32(EPHY_RXER_NUM, 0);
        let done = self.regs.poll32(
            OCPAR,
            OCP_GPHY_POLL_ATTEMPTS,
            OCP_GPHY_POLL_DELAY_US,
            |v| v & OCPAR_FLAG == 0,
        );
        done.map(|_| ()).ok_or_else(|| {
            tracing::warn!(reg, value, "OCP GPHY write timed out");
            AccessError::Timeout {
                what: "OCP GPHY write",
            }
        })
    }

    fn ocp_gphy_read(&self, reg: u8) -> Result<u16, AccessError> {
        // Latch the register number, then issue the read.
        self.regs.write32(
            OCPDR,
            OCPDR_READ | (u32::from(reg) & OCPDR_REG_MASK) << OCPDR_REG_SHIFT,
        );
        self.regs.write32(OCPAR, OCPAR_GPHY_WRITE);
        self.regs.write32(EPHY_RXER_NUM, 0);
        let latched = self.regs.poll32(
            OCPAR,
            OCP_GPHY_POLL_ATTEMPTS,
            OCP_GPHY_POLL_DELAY_US,
            |v| v & OCPAR_FLAG == 0,
        );
        self.regs.delay_ms(1);
        self.regs.write32(OCPAR, OCPAR_GPHY_READ);
        self.regs.write32(EPHY_RXER_NUM, 0);
        let done = self.regs.poll32(
            OCPAR,
            OCP_GPHY_POLL_ATTEMPTS,
            OCP_GPHY_POLL_DELAY_US,
            |v| v & OCPAR_FLAG != 0,
        );
        if latched.is_none() || done.is_none() {
            tracing::warn!(reg, "OCP GPHY read timed out");
            return Err(AccessError::Timeout {
                what: "OCP GPHY read",
            });
        }
        Ok((self.regs.read32(OCPDR) & OCPDR_DATA_MASK) as u16)
    }
}

/// PHY register access with the PHY lock held.
pub struct PhyAccess<'a> {
    mdio: &'a Mdio,
    _guard: MutexGuard<'a, ()>,
}

impl PhyAccess<'_> {
    pub fn read(&self, reg: u8) -> Result<u16, AccessError> {
        self.mdio.raw_read(reg)
    }

    /// Reads a register, substituting [`MDIO_READ_FAILED`] on timeout.
    pub fn read_or_failed(&self, reg: u8) -> u16 {
        self.read(reg).unwrap_or(MDIO_READ_FAILED)
    }

    pub fn write(&self, reg: u8, value: u16) -> Result<(), AccessError> {
        self.mdio.raw_write(reg, value)
    }

    pub fn select_page(&self, page: u16) -> Result<(), AccessError> {
        self.write(MII_PAGE_SELECT, page)
    }

    /// Read-modify-write: clears `clear` then sets `set`.
    pub fn update(&self, reg: u8, clear: u16, set: u16) -> Result<(), AccessError> {
        let value = self.read(reg)?;
        self.write(reg, (value & !clear) | set)
    }
}
