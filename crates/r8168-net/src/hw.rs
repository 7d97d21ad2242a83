//! Chip bring-up, reset and power sequencing.

use std::sync::atomic::Ordering;

use r8168_hal::pci::*;
use r8168_hal::PciConfig;

use crate::device::{lock, Rtl8168};
use crate::filter::RxFilter;
use crate::mdio::MII_BMCR;
use crate::regs::*;
use crate::ring::RingState;
use crate::tuning;
use crate::variant::{JumboEnable, CONFIG3_JUMBO_EN0, CONFIG4_JUMBO_EN1};

/// Reset completion poll: 100 attempts, 100us apart.
const RESET_POLL_ATTEMPTS: u32 = 100;
const RESET_POLL_DELAY_US: u64 = 100;
/// Doorbell drain before reset on the DP parts.
const TX_POLL_DRAIN_ATTEMPTS: u32 = 1000;
const TX_POLL_DRAIN_DELAY_US: u64 = 20;
/// Settling time between the FIFO overflow and the ring flush.
const FIFO_RECOVERY_DELAY_US: u64 = 300;

/// Device-specific-management hook points for the LAN enable GPIO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dsm {
    MacInit,
    IfDown,
    IfUp,
}

/// PCI configuration registers captured after the first successful start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PciSnapshot {
    bytes: [(u16, u8); 3],
    words: [(u16, u16); 8],
}

impl PciSnapshot {
    pub fn capture(pci: &dyn PciConfig) -> Self {
        let byte = |offset| (offset, pci.read_u8(offset));
        let word = |offset| (offset, pci.read_u16(offset));
        Self {
            bytes: [
                byte(PCI_COMMAND),
                byte(PCI_CACHE_LINE_SIZE),
                byte(PCI_INTERRUPT_LINE),
            ],
            words: [
                word(PCI_BASE_ADDRESS_0),
                word(PCI_BASE_ADDRESS_0 + 2),
                word(PCI_BASE_ADDRESS_2),
                word(PCI_BASE_ADDRESS_2 + 2),
                word(PCI_BASE_ADDRESS_4),
                word(PCI_BASE_ADDRESS_4 + 2),
                word(PCI_BASE_ADDRESS_5),
                word(PCI_BASE_ADDRESS_5 + 2),
            ],
        }
    }

    /// Rewrites every register that no longer matches. Returns how many were rewritten.
    pub fn restore(&self, pci: &dyn PciConfig) -> usize {
        let mut rewritten = 0;
        for &(offset, value) in &self.bytes {
            let current = pci.read_u8(offset);
            if current != value {
                tracing::debug!(offset, expected = value, current, "PCI config byte changed");
                pci.write_u8(offset, value);
                rewritten += 1;
            }
        }
        for &(offset, value) in &self.words {
            let current = pci.read_u16(offset);
            if current != value {
                tracing::debug!(offset, expected = value, current, "PCI config word changed");
                pci.write_u16(offset, value);
                rewritten += 1;
            }
        }
        rewritten
    }
}

impl Rtl8168 {
    /// Programs the chip from scratch and enables Tx/Rx. The rings must be initialised. Takes the
    /// state lock; callers must hold neither it nor a ring lock.
    pub(crate) fn hw_start(&self) {
        let regs = &self.regs;
        let variant = self.chip.variant;

        self.stop_queue();
        self.nic_reset();

        regs.write8(CFG9346, CFG9346_UNLOCK);
        regs.write8(MTPS, MTPS_DEFAULT);

        let mut cpcmd = regs.read16(CPLUS_CMD) | CPCMD_PKT_CNTR_DISABLE | CPCMD_INTT_1;
        cpcmd &= !(CPCMD_RX_CHKSUM | CPCMD_RX_VLAN);
        if self.config.rx_checksum {
            cpcmd |= CPCMD_RX_CHKSUM;
        }
        if self.config.vlan {
            cpcmd |= CPCMD_RX_VLAN;
        }
        regs.write16(CPLUS_CMD, cpcmd);
        regs.write16(INTR_MITIGATE, INTR_MITIGATE_DEFAULT);

        if let Some(ring) = lock(&self.tx).as_ref() {
            regs.write_u64_pair(TX_DESC_START_ADDR_LOW, ring.paddr());
        }
        if let Some(ring) = lock(&self.rx).as_ref() {
            regs.write_u64_pair(RX_DESC_ADDR_LOW, ring.paddr());
        }

        let accept = RxAccept::all().bits();
        regs.write32(RX_CONFIG, regs.read32(RX_CONFIG) & !accept);
        regs.write32(TX_CONFIG, variant.tx_config());
        regs.write16(INTR_STATUS, 0xffff);

        tuning::apply(regs, &self.mdio, self.chip.start_tuning);

        let mut state = lock(&self.state);
        let jumbo = state.mtu > ETH_DATA_LEN;
        match (self.chip.jumbo_enable, jumbo) {
            (JumboEnable::None, _) => {}
            (JumboEnable::Config3, true) => regs.set_bits8(CONFIG3, CONFIG3_JUMBO_EN0),
            (JumboEnable::Config3, false) => regs.clear_bits8(CONFIG3, CONFIG3_JUMBO_EN0),
            (JumboEnable::Config3And4, true) => {
                regs.set_bits8(CONFIG3, CONFIG3_JUMBO_EN0);
                regs.set_bits8(CONFIG4, CONFIG4_JUMBO_EN1);
            }
            (JumboEnable::Config3And4, false) => {
                regs.clear_bits8(CONFIG3, CONFIG3_JUMBO_EN0);
                regs.clear_bits8(CONFIG4, CONFIG4_JUMBO_EN1);
            }
        }
        // The checksum engine cannot handle frames above the standard MTU.
        self.tx_offload
            .store(self.config.tx_checksum && !jumbo, Ordering::Relaxed);
        regs.write16(RX_MAX_SIZE, state.rx_buf_sz as u16);

        // Ring addresses and descriptors must be visible before the engines start.
        self.dma.wmb();
        regs.write8(CHIP_CMD, CMD_TX_ENB | CMD_RX_ENB);
        self.apply_rx_mode(&state.filter);

        for ring in lock(&self.tx).iter_mut() {
            ring.set_state(RingState::Active);
        }
        for ring in lock(&self.rx).iter_mut() {
            ring.set_state(RingState::Active);
        }

        regs.write8(CFG9346, CFG9346_LOCK);

        if state.pci_snapshot.is_none() {
            state.pci_snapshot = Some(PciSnapshot::capture(self.pci.as_ref()));
        }
        state.wol_enabled = self.wake_configured();
        drop(state);

        self.dsm(Dsm::MacInit);

        if !self.fifo_recovery.load(Ordering::Acquire) {
            self.active_mask
                .store(self.intr_mask.bits(), Ordering::Release);
            regs.write16(INTR_MASK, self.intr_mask.bits());
            self.wake_queue();
        }

        tracing::debug!(chip = self.chip.name, "chip started");
    }

    /// Stops Tx/Rx and soft-resets the MAC.
    pub(crate) fn nic_reset(&self) {
        let regs = &self.regs;
        let variant = self.chip.variant;

        let accept = RxAccept::all().bits();
        regs.write32(RX_CONFIG, regs.read32(RX_CONFIG) & !accept);

        if variant.waits_for_tx_poll_on_reset() {
            let mut drained = false;
            for _ in 0..TX_POLL_DRAIN_ATTEMPTS {
                if regs.read8(TX_POLL) & TX_POLL_NPQ == 0 {
                    drained = true;
                    break;
                }
                regs.delay_us(TX_POLL_DRAIN_DELAY_US);
            }
            if !drained {
                tracing::warn!("Tx doorbell did not drain before reset");
            }
        } else if !variant.is_8168b() {
            regs.write8(CHIP_CMD, CMD_STOP_REQ | CMD_RX_ENB | CMD_TX_ENB);
            regs.delay_us(100);
        }

        regs.write8(CHIP_CMD, CMD_RESET);
        for _ in 0..RESET_POLL_ATTEMPTS {
            if regs.read8(CHIP_CMD) & CMD_RESET == 0 {
                return;
            }
            regs.delay_us(RESET_POLL_DELAY_US);
        }
        tracing::warn!("chip reset did not complete");
    }

    /// Masks every interrupt source, acknowledges anything pending and resets the MAC.
    pub(crate) fn asic_down(&self) {
        self.active_mask.store(0, Ordering::Release);
        self.regs.write16(INTR_MASK, 0);
        self.regs.write16(INTR_STATUS, 0xffff);
        self.nic_reset();
    }

    /// Re-arms Rx with every descriptor host-owned so a sleeping B-family chip does not DMA into
    /// stale buffers.
    pub(crate) fn sleep_rx_enable(&self) {
        if !self.chip.variant.needs_sleep_rx_enable() {
            return;
        }
        self.regs.write8(CHIP_CMD, CMD_RESET);
        if let Some(ring) = lock(&self.rx).as_ref() {
            ring.reset_ownership(false);
        }
        self.regs.write8(CHIP_CMD, CMD_RX_ENB);
    }

    /// Powers the PHY (and PLL where the chip has one) up and reprograms the requested link.
    pub(crate) fn powerup_pll(&self) {
        let variant = self.chip.variant;
        if variant.firmware_owns_power() {
            return;
        }
        if variant.has_pll_power_control() {
            self.regs.set_bits8(PMCH, PMCH_PLL_ON);
        }
        self.phy.power_up(&self.mdio);
        let request = lock(&self.state).link.request;
        self.phy.set_speed(&self.mdio, request);
    }

    /// Powers the PHY down unless wake-on-LAN needs it, in which case Rx is left accepting wake
    /// frames.
    pub(crate) fn powerdown_pll(&self) {
        let variant = self.chip.variant;
        if variant.firmware_owns_power() {
            return;
        }
        if variant.has_asf_management() && self.regs.read16(CPLUS_CMD) & CPCMD_ASF != 0 {
            return;
        }

        {
            let phy = self.mdio.lock();
            let _ = phy.select_page(0);
            let _ = phy.write(MII_BMCR, 0);
        }

        if lock(&self.state).wol_enabled {
            let wake = (RxAccept::BROADCAST | RxAccept::MULTICAST | RxAccept::MY_PHYS).bits();
            self.regs
                .write32(RX_CONFIG, self.regs.read32(RX_CONFIG) | wake);
            return;
        }

        self.phy.power_down(&self.mdio);
        if variant.has_pll_power_control() {
            self.regs.clear_bits8(PMCH, PMCH_PLL_ON);
        }
    }

    /// Drives the LAN enable GPIO from the MACDBG strap on the parts that wire it.
    pub(crate) fn dsm(&self, point: Dsm) {
        if !self.chip.variant.has_dsm_gpio() {
            return;
        }
        let strapped = self.regs.read8(MACDBG) & MACDBG_LAN_STRAP != 0;
        match point {
            Dsm::MacInit if strapped => self.regs.set_bits8(GPIO, GPIO_EN),
            Dsm::MacInit => self.regs.clear_bits8(GPIO, GPIO_EN),
            Dsm::IfDown if strapped => self.regs.clear_bits8(GPIO, GPIO_EN),
            Dsm::IfUp if strapped => self.regs.set_bits8(GPIO, GPIO_EN),
            Dsm::IfDown | Dsm::IfUp => {}
        }
    }

    pub(crate) fn write_mac(&self, addr: &[u8; ETH_ALEN]) {
        let regs = &self.regs;
        regs.write8(CFG9346, CFG9346_UNLOCK);
        regs.write32(MAC0, u32::from_le_bytes([addr[0], addr[1], addr[2], addr[3]]));
        regs.write32(MAC4, u32::from(u16::from_le_bytes([addr[4], addr[5]])));
        regs.write8(CFG9346, CFG9346_LOCK);
    }

    pub(crate) fn apply_rx_mode(&self, filter: &RxFilter) {
        let mode = filter.rx_mode(self.config.multicast_filter_limit);
        let regs = &self.regs;
        regs.write32(MAR0, mode.mar[0]);
        regs.write32(MAR0 + 4, mode.mar[1]);

        let keep = regs.read32(RX_CONFIG) & self.chip.rx_config_mask;
        regs.write32(RX_CONFIG, self.chip.rx_config | mode.accept.bits() | keep);
    }

    /// Any wake source armed in Config3/Config5.
    pub(crate) fn wake_configured(&self) -> bool {
        self.regs.read8(CONFIG3) & (CONFIG3_LINK_UP | CONFIG3_MAGIC_PACKET) != 0
            || self.regs.read8(CONFIG5) & (CONFIG5_UWF | CONFIG5_BWF | CONFIG5_MWF) != 0
    }

    /// Fatal bus error: clear the PCI error bits, halt the chip and defer the restart.
    pub(crate) fn pci_error(&self) {
        let command = self.pci.read_u16(PCI_COMMAND);
        let status = self.pci.read_u16(PCI_STATUS);
        tracing::error!(command, status, "PCI error, resetting chip");
        self.stop_queue();

        self.pci
            .write_u16(PCI_COMMAND, command | PCI_COMMAND_SERR | PCI_COMMAND_PARITY);
        // Error bits are write-1-to-clear.
        self.pci.write_u16(PCI_STATUS, status & PCI_STATUS_ERROR_BITS);

        self.asic_down();
        self.schedule(crate::device::DeferredTask::Reset);
    }

    /// Rx FIFO overflow on parts where it corrupts ring state: flush both rings and restart.
    /// Runs in the interrupt handler.
    pub(crate) fn recover_fifo_overflow(&self) {
        tracing::warn!("Rx FIFO overflow, reinitialising rings");
        self.fifo_recovery.store(true, Ordering::Release);
        self.stop_queue();
        self.regs.delay_us(FIFO_RECOVERY_DELAY_US);

        self.tx_clear();
        let rx_buf_sz = lock(&self.state).rx_buf_sz;
        let filled = match lock(&self.rx).as_mut() {
            Some(ring) => ring.init(rx_buf_sz),
            None => false,
        };

        self.hw_start();
        self.regs.write16(INTR_STATUS, Intr::RX_FIFO_OVER.bits());
        self.fifo_recovery.store(false, Ordering::Release);

        if filled {
            self.wake_queue();
        } else {
            self.schedule(crate::device::DeferredTask::Reset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakePci(Mutex<HashMap<u16, u8>>);

    impl PciConfig for FakePci {
        fn read_u8(&self, offset: u16) -> u8 {
            *self.0.lock().unwrap().get(&offset).unwrap_or(&0)
        }

        fn read_u16(&self, offset: u16) -> u16 {
            u16::from_le_bytes([self.read_u8(offset), self.read_u8(offset + 1)])
        }

        fn read_u32(&self, offset: u16) -> u32 {
            u32::from(self.read_u16(offset)) | u32::from(self.read_u16(offset + 2)) << 16
        }

        fn write_u8(&self, offset: u16, value: u8) {
            self.0.lock().unwrap().insert(offset, value);
        }

        fn write_u16(&self, offset: u16, value: u16) {
            let [lo, hi] = value.to_le_bytes();
            self.write_u8(offset, lo);
            self.write_u8(offset + 1, hi);
        }

        fn write_u32(&self, offset: u16, value: u32) {
            self.write_u16(offset, value as u16);
            self.write_u16(offset + 2, (value >> 16) as u16);
        }
    }

    #[test]
    fn snapshot_restores_only_changed_registers() {
        let pci = FakePci::default();
        pci.write_u16(PCI_COMMAND, 0x0107);
        pci.write_u32(PCI_BASE_ADDRESS_2, 0xfebf_0004);
        pci.write_u8(PCI_INTERRUPT_LINE, 11);

        let snapshot = PciSnapshot::capture(&pci);
        assert_eq!(snapshot.restore(&pci), 0);

        pci.write_u8(PCI_INTERRUPT_LINE, 0xff);
        pci.write_u16(PCI_BASE_ADDRESS_2 + 2, 0);
        assert_eq!(snapshot.restore(&pci), 2);
        assert_eq!(pci.read_u8(PCI_INTERRUPT_LINE), 11);
        assert_eq!(pci.read_u32(PCI_BASE_ADDRESS_2), 0xfebf_0004);
        assert_eq!(snapshot.restore(&pci), 0);
    }
}
