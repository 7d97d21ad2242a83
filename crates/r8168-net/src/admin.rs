//! Administrative surface: wake-on-LAN, register dump, tally counters, link control.

use bitflags::bitflags;
use r8168_hal::DmaRegion;

use crate::device::{lock, Rtl8168};
use crate::error::{Error, Result};
use crate::mdio::{BMCR_ANENABLE, BMCR_ANRESTART, MII_BMCR};
use crate::phy::{LinkRequest, LinkSettings};
use crate::regs::*;
use crate::stats::TallyCounters;

pub const DRIVER_NAME: &str = "r8168";
pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tally dump completion poll: 100 attempts, 1ms apart.
const TALLY_POLL_ATTEMPTS: u32 = 100;
const TALLY_POLL_DELAY_US: u64 = 1000;
const TALLY_ALIGN: usize = 64;

bitflags! {
    /// Wake-on-LAN sources.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WakeFlags: u8 {
        const PHY = 1 << 0;
        const MAGIC = 1 << 1;
        const UCAST = 1 << 2;
        const BCAST = 1 << 3;
        const MCAST = 1 << 4;
    }
}

/// Which config-register bit backs each wake source. `None` means "any source set".
const WAKE_BITS: [(Option<WakeFlags>, u32, u8); 7] = [
    (None, CONFIG1, CONFIG1_PM_ENABLE),
    (Some(WakeFlags::PHY), CONFIG3, CONFIG3_LINK_UP),
    (Some(WakeFlags::MAGIC), CONFIG3, CONFIG3_MAGIC_PACKET),
    (Some(WakeFlags::UCAST), CONFIG5, CONFIG5_UWF),
    (Some(WakeFlags::BCAST), CONFIG5, CONFIG5_BWF),
    (Some(WakeFlags::MCAST), CONFIG5, CONFIG5_MWF),
    (None, CONFIG5, CONFIG5_LAN_WAKE),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    pub driver: &'static str,
    pub version: &'static str,
    pub chip: &'static str,
    pub regdump_len: usize,
    pub eedump_len: usize,
}

impl Rtl8168 {
    pub fn wol(&self) -> WakeFlags {
        let regs = &self.regs;
        let mut flags = WakeFlags::empty();
        if regs.read8(CONFIG1) & CONFIG1_PM_ENABLE == 0 {
            return flags;
        }
        for (flag, reg, bit) in WAKE_BITS {
            if let Some(flag) = flag {
                if regs.read8(reg) & bit != 0 {
                    flags |= flag;
                }
            }
        }
        flags
    }

    pub fn set_wol(&self, wake: WakeFlags) {
        let mut state = lock(&self.state);
        let regs = &self.regs;

        regs.write8(CFG9346, CFG9346_UNLOCK);
        for (flag, reg, bit) in WAKE_BITS {
            let enable = match flag {
                Some(flag) => wake.contains(flag),
                None => !wake.is_empty(),
            };
            if enable {
                regs.set_bits8(reg, bit);
            } else {
                regs.clear_bits8(reg, bit);
            }
        }
        regs.write8(CFG9346, CFG9346_LOCK);

        state.wol_enabled = !wake.is_empty();
        tracing::debug!(?wake, "wake-on-LAN configured");
    }

    /// Snapshot of the register window.
    pub fn register_dump(&self) -> Vec<u8> {
        (0..REGISTER_WINDOW as u32)
            .step_by(4)
            .flat_map(|offset| self.regs.read32(offset).to_le_bytes())
            .collect()
    }

    pub fn read_eeprom(&self, _offset: usize, _len: usize) -> Result<Vec<u8>> {
        Err(Error::Unsupported("EEPROM read"))
    }

    /// Asks the chip to dump its hardware counters and parses the result.
    pub fn tally_counters(&self) -> Result<TallyCounters> {
        let buf = DmaRegion::alloc(&self.dma, TALLY_COUNTERS_LEN, TALLY_ALIGN)
            .ok_or(Error::AllocationFailure)?;
        let regs = &self.regs;
        let paddr = buf.paddr();

        regs.write32(COUNTER_ADDR_HIGH, (paddr >> 32) as u32);
        regs.write32(COUNTER_ADDR_LOW, paddr as u32);
        regs.write32(COUNTER_ADDR_LOW, paddr as u32 | COUNTER_DUMP);

        let done = regs.poll32(
            COUNTER_ADDR_LOW,
            TALLY_POLL_ATTEMPTS,
            TALLY_POLL_DELAY_US,
            |v| v & COUNTER_DUMP == 0,
        );
        if done.is_none() {
            tracing::warn!("tally counter dump did not complete");
        }

        regs.write32(COUNTER_ADDR_LOW, 0);
        regs.write32(COUNTER_ADDR_HIGH, 0);

        let mut raw = [0u8; TALLY_COUNTERS_LEN];
        buf.read_at(0, &mut raw);
        Ok(TallyCounters::parse(&raw))
    }

    pub fn link_ok(&self) -> bool {
        self.phy.link_ok(&self.regs)
    }

    pub fn link_settings(&self) -> LinkSettings {
        let request = lock(&self.state).link.request;
        self.phy.settings(&self.regs, request)
    }

    /// Stores a new link request and programs the PHY with it.
    pub fn set_link_settings(&self, request: LinkRequest) {
        lock(&self.state).link.request = request;
        self.phy.set_speed(&self.mdio, request);
    }

    /// Restarts autonegotiation.
    pub fn nway_reset(&self) -> Result<()> {
        if !self.is_running() {
            return Err(Error::NotRunning);
        }
        let phy = self.mdio.lock();
        let _ = phy.select_page(0);
        let bmcr = phy.read_or_failed(MII_BMCR);
        if bmcr & BMCR_ANENABLE == 0 {
            return Err(Error::Unsupported("autonegotiation disabled"));
        }
        let _ = phy.write(MII_BMCR, bmcr | BMCR_ANRESTART);
        Ok(())
    }

    pub fn driver_info(&self) -> DriverInfo {
        DriverInfo {
            driver: DRIVER_NAME,
            version: DRIVER_VERSION,
            chip: self.chip.name,
            regdump_len: REGISTER_WINDOW,
            eedump_len: 0,
        }
    }
}
