//! Lifecycle controller.
//!
//! Lock order, outermost first: `lifecycle` (open/close/MTU/timers/deferred work), `irq_lock`
//! (interrupt handler, poll task, teardown synchronisation), `state`, the PHY lock inside
//! [`Mdio`]. The Tx and Rx ring locks are leaves. Stack callbacks are never made with a ring lock
//! held.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use r8168_hal::{Clock, DmaMemory, Mmio, PciConfig};

use crate::access::Registers;
use crate::config::DriverConfig;
use crate::error::{Error, Result};
use crate::filter::RxFilter;
use crate::hw::{Dsm, PciSnapshot};
use crate::mdio::Mdio;
use crate::packet::{TxChecksum, TxOutcome, TxPacket};
use crate::phy::{GmiiPhy, LinkPhase, LinkState, PhyOps};
use crate::regs::*;
use crate::ring::{RingState, RxRing, TxRing, TxSubmit};
use crate::stack::NetStack;
use crate::stats::{bump, Counters, NetStats};
use crate::timers::{TimerKind, Timers};
use crate::tuning::{self, SpecialCase};
use crate::variant::{self, ChecksumClass, ChipVariant, VariantDescriptor};

/// Teardown re-issues the quiesce sequence at most this many times.
const DOWN_RETRY_LIMIT: usize = 100;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Rx buffer size for an MTU.
pub fn rx_buf_size(mtu: usize) -> usize {
    if mtu > ETH_DATA_LEN {
        mtu + ETH_HLEN + 8
    } else {
        RX_BUF_SIZE
    }
}

/// Host resources the device is bound to.
#[derive(Clone)]
pub struct DeviceResources {
    pub mmio: Arc<dyn Mmio>,
    pub pci: Arc<dyn PciConfig>,
    pub dma: Arc<dyn DmaMemory>,
    pub clock: Arc<dyn Clock>,
}

/// Work that must run outside interrupt context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredTask {
    /// Drain, rewind the rings and restart the chip.
    Reset,
}

pub(crate) struct DeviceState {
    pub mtu: usize,
    pub rx_buf_sz: usize,
    pub link: LinkState,
    pub filter: RxFilter,
    pub mac: [u8; ETH_ALEN],
    pub pci_snapshot: Option<PciSnapshot>,
    pub wol_enabled: bool,
    pub suspended: bool,
}

/// One RTL8168-family function.
pub struct Rtl8168 {
    pub(crate) regs: Registers,
    pub(crate) pci: Arc<dyn PciConfig>,
    pub(crate) dma: Arc<dyn DmaMemory>,
    pub(crate) stack: Arc<dyn NetStack>,
    pub(crate) config: DriverConfig,
    pub(crate) chip: &'static VariantDescriptor,
    pub(crate) phy: Box<dyn PhyOps>,
    pub(crate) mdio: Mdio,
    /// Interrupt sources serviced on this chip.
    pub(crate) intr_mask: Intr,
    /// Mask restored when the handler exits; narrower while a poll is pending.
    pub(crate) active_mask: AtomicU16,
    perm_addr: [u8; ETH_ALEN],

    lifecycle: Mutex<()>,
    pub(crate) irq_lock: Mutex<()>,
    pub(crate) state: Mutex<DeviceState>,
    pub(crate) tx: Mutex<Option<TxRing>>,
    pub(crate) rx: Mutex<Option<RxRing>>,
    timers: Mutex<Timers>,
    deferred: Mutex<Option<DeferredTask>>,

    pub(crate) counters: Counters,
    pub(crate) running: AtomicBool,
    irq_registered: AtomicBool,
    pub(crate) queue_stopped: AtomicBool,
    /// Tx checksum offload in effect (disabled while jumbo frames are enabled).
    pub(crate) tx_offload: AtomicBool,
    pub(crate) fifo_recovery: AtomicBool,
}

impl Rtl8168 {
    /// Identifies the chip and reads its permanent address. Does not touch the rings or enable
    /// anything.
    pub fn probe(
        resources: DeviceResources,
        stack: Arc<dyn NetStack>,
        config: DriverConfig,
    ) -> Result<Self> {
        config.validate()?;

        let regs = Registers::new(resources.mmio, resources.clock);
        let chip = variant::detect(&regs);
        check_mtu(chip, config.mtu)?;

        let mut perm_addr = [0u8; ETH_ALEN];
        for (i, byte) in perm_addr.iter_mut().enumerate() {
            *byte = regs.read8(MAC0 + i as u32);
        }

        let pci = resources.pci;
        let command = pci.read_u16(r8168_hal::pci::PCI_COMMAND);
        pci.write_u16(
            r8168_hal::pci::PCI_COMMAND,
            command | r8168_hal::pci::PCI_COMMAND_MEMORY | r8168_hal::pci::PCI_COMMAND_MASTER,
        );

        let intr_mask = chip.variant.interrupt_mask();
        tracing::info!(
            chip = chip.name,
            variant = ?chip.variant,
            mac = ?perm_addr,
            "probed RTL8168"
        );

        Ok(Self {
            mdio: Mdio::new(regs.clone(), chip.variant.mdio_transport()),
            phy: Box::new(GmiiPhy::new(chip.variant)),
            regs,
            pci,
            dma: resources.dma,
            stack,
            chip,
            intr_mask,
            active_mask: AtomicU16::new(intr_mask.bits()),
            perm_addr,
            lifecycle: Mutex::new(()),
            irq_lock: Mutex::new(()),
            state: Mutex::new(DeviceState {
                mtu: config.mtu,
                rx_buf_sz: rx_buf_size(config.mtu),
                link: LinkState::new(config.link),
                filter: RxFilter::default(),
                mac: perm_addr,
                pci_snapshot: None,
                wol_enabled: false,
                suspended: false,
            }),
            tx: Mutex::new(None),
            rx: Mutex::new(None),
            timers: Mutex::new(Timers::new(
                config.link_poll_interval_ms,
                config.config_check_interval_ms,
            )),
            deferred: Mutex::new(None),
            counters: Counters::default(),
            running: AtomicBool::new(false),
            irq_registered: AtomicBool::new(false),
            queue_stopped: AtomicBool::new(true),
            tx_offload: AtomicBool::new(false),
            fifo_recovery: AtomicBool::new(false),
            config,
        })
    }

    /// Replaces the PHY driver. Only meaningful before [`Rtl8168::open`].
    pub fn with_phy(mut self, phy: Box<dyn PhyOps>) -> Self {
        self.phy = phy;
        self
    }

    pub fn variant(&self) -> ChipVariant {
        self.chip.variant
    }

    pub fn descriptor(&self) -> &'static VariantDescriptor {
        self.chip
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    pub fn permanent_address(&self) -> [u8; ETH_ALEN] {
        self.perm_addr
    }

    pub fn mac_address(&self) -> [u8; ETH_ALEN] {
        lock(&self.state).mac
    }

    pub fn mtu(&self) -> usize {
        lock(&self.state).mtu
    }

    pub fn rx_buf_size(&self) -> usize {
        lock(&self.state).rx_buf_sz
    }

    pub fn interrupt_mask(&self) -> Intr {
        self.intr_mask
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn irq_registered(&self) -> bool {
        self.irq_registered.load(Ordering::Acquire)
    }

    pub fn queue_stopped(&self) -> bool {
        self.queue_stopped.load(Ordering::Acquire)
    }

    pub fn link_phase(&self) -> LinkPhase {
        lock(&self.state).link.phase
    }

    pub fn timer_armed(&self, kind: TimerKind) -> bool {
        lock(&self.timers).is_armed(kind)
    }

    pub fn pending_work(&self) -> Option<DeferredTask> {
        *lock(&self.deferred)
    }

    /// `(state, current, dirty)` of the Tx ring, if allocated.
    pub fn tx_ring_status(&self) -> Option<(RingState, u32, u32)> {
        lock(&self.tx).as_ref().map(|ring| {
            let (cur, dirty) = ring.cursors();
            (ring.state(), cur, dirty)
        })
    }

    /// `(state, current, dirty)` of the Rx ring, if allocated.
    pub fn rx_ring_status(&self) -> Option<(RingState, u32, u32)> {
        lock(&self.rx).as_ref().map(|ring| {
            let (cur, dirty) = ring.cursors();
            (ring.state(), cur, dirty)
        })
    }

    pub fn stats(&self) -> NetStats {
        self.counters.snapshot()
    }

    pub fn open(&self) -> Result<()> {
        let _lifecycle = lock(&self.lifecycle);
        if self.is_running() {
            return Err(Error::AlreadyOpen);
        }

        let rx_buf_sz = {
            let mut state = lock(&self.state);
            state.rx_buf_sz = rx_buf_size(state.mtu);
            state.rx_buf_sz
        };

        let mut tx = TxRing::alloc(
            &self.dma,
            self.config.tx_ring_size,
            self.config.max_tx_fragments,
        )
        .ok_or(Error::AllocationFailure)?;
        let mut rx =
            RxRing::alloc(&self.dma, self.config.rx_ring_size).ok_or(Error::AllocationFailure)?;
        tx.init();
        if !rx.init(rx_buf_sz) {
            tracing::warn!(rx_buf_sz, "Rx ring fill failed");
            return Err(Error::AllocationFailure);
        }
        *lock(&self.tx) = Some(tx);
        *lock(&self.rx) = Some(rx);

        self.running.store(true, Ordering::Release);

        if !self.chip.variant.firmware_owns_power() {
            self.phy.reset(&self.regs, &self.mdio);
        }
        self.powerup_pll();
        tuning::apply(&self.regs, &self.mdio, self.chip.phy_tuning);
        self.hw_start();

        {
            let now = self.regs.clock().now_ns();
            let mut timers = lock(&self.timers);
            timers.start(TimerKind::ConfigCheck, now);
            timers.start(TimerKind::Link, now);
        }

        self.dsm(Dsm::IfUp);
        self.check_link();

        self.irq_registered.store(true, Ordering::Release);
        tracing::debug!(chip = self.chip.name, "interface up");
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        let _lifecycle = lock(&self.lifecycle);
        if !self.running.swap(false, Ordering::AcqRel) {
            return Err(Error::NotRunning);
        }

        self.down();

        self.irq_registered.store(false, Ordering::Release);
        *lock(&self.tx) = None;
        *lock(&self.rx) = None;
        *lock(&self.deferred) = None;

        let mut state = lock(&self.state);
        state.mac = self.perm_addr;
        self.write_mac(&self.perm_addr);
        tracing::debug!(chip = self.chip.name, "interface down");
        Ok(())
    }

    /// Quiesces the chip and releases every ring buffer. Ring memory stays allocated.
    fn down(&self) {
        self.dsm(Dsm::IfDown);
        self.stop_queue();
        lock(&self.timers).cancel_all();

        for ring in lock(&self.tx).iter_mut() {
            ring.set_state(RingState::Draining);
        }
        for ring in lock(&self.rx).iter_mut() {
            ring.set_state(RingState::Draining);
        }

        let mut quiesced = false;
        for _ in 0..DOWN_RETRY_LIMIT {
            {
                let _irq = lock(&self.irq_lock);
                self.asic_down();
                self.sleep_rx_enable();
            }
            // A poll that raced with teardown may have re-armed the mask.
            if self.regs.read16(INTR_MASK) == 0 {
                quiesced = true;
                break;
            }
        }
        if !quiesced {
            tracing::warn!(
                attempts = DOWN_RETRY_LIMIT,
                "interrupt mask still armed after teardown"
            );
        }

        if self.chip.has(SpecialCase::EphyParkOnDown) {
            let _ = self.regs.ephy_write(0x19, 0xff64);
        }

        self.tx_clear();
        if let Some(ring) = lock(&self.rx).as_mut() {
            ring.clear();
        }

        self.powerdown_pll();
    }

    /// Frees every in-flight Tx buffer, counting each as dropped, and re-zeroes the ring.
    pub(crate) fn tx_clear(&self) {
        if let Some(ring) = lock(&self.tx).as_mut() {
            let dropped = ring.clear();
            crate::stats::add(&self.counters.tx_dropped, dropped as u64);
            ring.init();
        }
    }

    /// Re-zeroes the Tx ring and refills the Rx ring from scratch.
    pub(crate) fn init_rings(&self, rx_buf_sz: usize) -> bool {
        self.tx_clear();
        match lock(&self.rx).as_mut() {
            Some(ring) => ring.init(rx_buf_sz),
            None => false,
        }
    }

    pub fn change_mtu(&self, mtu: usize) -> Result<()> {
        check_mtu(self.chip, mtu)?;

        let _lifecycle = lock(&self.lifecycle);
        if !self.is_running() {
            let mut state = lock(&self.state);
            state.mtu = mtu;
            state.rx_buf_sz = rx_buf_size(mtu);
            return Ok(());
        }

        self.down();

        let rx_buf_sz = {
            let mut state = lock(&self.state);
            state.mtu = mtu;
            state.rx_buf_sz = rx_buf_size(mtu);
            state.rx_buf_sz
        };
        if !self.init_rings(rx_buf_sz) {
            tracing::warn!(mtu, rx_buf_sz, "Rx ring fill failed after MTU change");
            return Err(Error::AllocationFailure);
        }

        self.powerup_pll();
        self.hw_start();

        let now = self.regs.clock().now_ns();
        let mut timers = lock(&self.timers);
        timers.start(TimerKind::ConfigCheck, now);
        timers.start(TimerKind::Link, now);
        tracing::debug!(mtu, rx_buf_sz, "MTU changed");
        Ok(())
    }

    /// Queues one packet. `Busy` means the caller must hold the packet until
    /// [`NetStack::wake_queue`] fires.
    pub fn transmit(&self, packet: &TxPacket) -> TxOutcome {
        if !self.is_running() {
            tracing::debug!("transmit while interface is down, dropping");
            bump(&self.counters.tx_dropped);
            return TxOutcome::Accepted;
        }
        // The chip is halted until the pending reset rebuilds the rings.
        if self.fifo_recovery.load(Ordering::Acquire) || self.reset_pending() {
            self.stop_queue();
            bump(&self.counters.tx_dropped);
            return TxOutcome::Busy;
        }

        let (opts1, opts2) = self.tx_opts(packet);
        let (submit, has_room) = match lock(&self.tx).as_mut() {
            Some(ring) => (ring.submit(packet, opts1, opts2), ring.has_room()),
            None => (TxSubmit::Busy, false),
        };

        match submit {
            TxSubmit::Busy => {
                self.stop_queue();
                bump(&self.counters.tx_dropped);
                TxOutcome::Busy
            }
            TxSubmit::Dropped => {
                bump(&self.counters.tx_dropped);
                TxOutcome::Accepted
            }
            TxSubmit::Accepted => {
                self.regs.write8(TX_POLL, TX_POLL_NPQ);
                if !has_room {
                    self.stop_queue();
                    // A reclaim may have run between the submit and the stop.
                    let room = lock(&self.tx).as_ref().is_some_and(TxRing::has_room);
                    if room {
                        self.wake_queue();
                    }
                }
                TxOutcome::Accepted
            }
        }
    }

    /// Per-packet offload words: `(opts1 bits, opts2)`.
    pub(crate) fn tx_opts(&self, packet: &TxPacket) -> (u32, u32) {
        let mut opts1 = 0;
        let mut opts2 = 0;

        if self.config.tso {
            if let Some(mss) = packet.mss {
                opts1 |= TX_LARGE_SEND | (u32::from(mss) & TX_MSS_MASK) << TX_MSS_SHIFT;
            }
        }

        if self.tx_offload.load(Ordering::Relaxed) {
            match self.chip.checksum {
                ChecksumClass::B => {
                    opts1 |= match packet.checksum {
                        TxChecksum::None => 0,
                        TxChecksum::Ip => TX_IPCS,
                        TxChecksum::Tcp => TX_IPCS | TX_TCPCS,
                        TxChecksum::Udp => TX_IPCS | TX_UDPCS,
                    }
                }
                ChecksumClass::C => {
                    opts2 |= match packet.checksum {
                        TxChecksum::None => 0,
                        TxChecksum::Ip => TX_IPCS_C,
                        TxChecksum::Tcp => TX_IPCS_C | TX_TCPCS_C,
                        TxChecksum::Udp => TX_IPCS_C | TX_UDPCS_C,
                    }
                }
            }
        }

        if self.config.vlan {
            if let Some(vid) = packet.vlan {
                opts2 |= TX_VLAN_TAG | u32::from(vid.swap_bytes());
            }
        }

        (opts1, opts2)
    }

    pub(crate) fn stop_queue(&self) {
        self.queue_stopped.store(true, Ordering::Release);
    }

    /// Restarts a stopped queue and tells the stack.
    pub(crate) fn wake_queue(&self) {
        if self.queue_stopped.swap(false, Ordering::AcqRel) {
            self.stack.wake_queue();
        }
    }

    pub fn set_rx_mode(&self, filter: RxFilter) {
        let mut state = lock(&self.state);
        self.apply_rx_mode(&filter);
        state.filter = filter;
    }

    pub fn set_mac_address(&self, addr: [u8; ETH_ALEN]) -> Result<()> {
        if addr[0] & 0x01 != 0 || addr == [0; ETH_ALEN] {
            return Err(Error::InvalidAddress(addr));
        }
        let mut state = lock(&self.state);
        state.mac = addr;
        self.write_mac(&addr);
        Ok(())
    }

    /// The stack saw no Tx completion for too long.
    pub fn tx_timeout(&self) {
        tracing::warn!("Tx timeout, resetting chip");
        self.stop_queue();
        {
            let _irq = lock(&self.irq_lock);
            self.asic_down();
        }
        self.schedule(DeferredTask::Reset);
    }

    pub fn suspend(&self) {
        let _lifecycle = lock(&self.lifecycle);
        if !self.is_running() {
            return;
        }

        self.stop_queue();
        lock(&self.timers).cancel(TimerKind::ConfigCheck);
        self.dsm(Dsm::IfDown);
        {
            let _irq = lock(&self.irq_lock);
            self.asic_down();
            self.sleep_rx_enable();
        }
        self.powerdown_pll();
        lock(&self.state).suspended = true;
        tracing::debug!("suspended");
    }

    pub fn resume(&self) {
        let _lifecycle = lock(&self.lifecycle);
        if !self.is_running() {
            return;
        }

        if let Some(ring) = lock(&self.rx).as_ref() {
            ring.reset_ownership(true);
        }
        self.dsm(Dsm::IfUp);
        self.powerup_pll();
        self.schedule(DeferredTask::Reset);

        let now = self.regs.clock().now_ns();
        lock(&self.timers).start(TimerKind::ConfigCheck, now);
        lock(&self.state).suspended = false;
        tracing::debug!("resumed");
    }

    /// Queues deferred work. The Tx queue stays stopped until the reset has run.
    pub(crate) fn schedule(&self, task: DeferredTask) {
        self.stop_queue();
        *lock(&self.deferred) = Some(task);
    }

    fn reset_pending(&self) -> bool {
        *lock(&self.deferred) == Some(DeferredTask::Reset)
    }

    /// Runs pending deferred work. Returns whether anything ran.
    pub fn run_deferred_work(&self) -> bool {
        let _lifecycle = lock(&self.lifecycle);
        let Some(task) = lock(&self.deferred).take() else {
            return false;
        };
        match task {
            DeferredTask::Reset => self.reset_task(),
        }
        true
    }

    fn reset_task(&self) {
        if !self.is_running() {
            return;
        }

        let _irq = lock(&self.irq_lock);
        self.regs.write16(INTR_MASK, 0);

        self.drain_rx(crate::dispatch::Budget::Unbounded);
        self.tx_clear();

        let rx_buf_sz = lock(&self.state).rx_buf_sz;
        let ready = match lock(&self.rx).as_mut() {
            Some(ring) if ring.state() == RingState::Uninitialized => ring.init(rx_buf_sz),
            Some(ring) => ring.rewind(),
            None => false,
        };

        if ready {
            self.hw_start();
            self.wake_queue();
            tracing::debug!("reset complete");
        } else {
            tracing::warn!("Rx buffers shortage, retrying reset later");
            self.schedule(DeferredTask::Reset);
        }
    }

    /// Fires every due timer. Returns the timers that ran.
    pub fn run_timers(&self) -> Vec<TimerKind> {
        let _lifecycle = lock(&self.lifecycle);
        let now = self.regs.clock().now_ns();
        let due = lock(&self.timers).expired(now);
        for kind in &due {
            match kind {
                TimerKind::Link => self.check_link(),
                TimerKind::ConfigCheck => self.check_config_space(),
            }
        }
        due
    }

    /// Reads the link flag and announces a carrier change upstream.
    pub(crate) fn check_link(&self) {
        let up = self.phy.link_ok(&self.regs);
        let changed = lock(&self.state).link.observe(up);
        if let Some(phase) = changed {
            tracing::info!(?phase, "link changed");
            self.stack.carrier_changed(phase == LinkPhase::LinkUp);
        }
        if self.chip.has(SpecialCase::Dp10MbpsAnalog) {
            crate::phy::dp_10mbps_analog(&self.regs, &self.mdio);
        }
    }

    /// Compares PCI configuration space with the snapshot taken at start; on any difference
    /// rewrites the saved values and reinitialises the rings and the chip.
    fn check_config_space(&self) {
        let Some(snapshot) = lock(&self.state).pci_snapshot else {
            return;
        };
        let rewritten = snapshot.restore(self.pci.as_ref());
        if rewritten == 0 {
            return;
        }

        tracing::warn!(rewritten, "PCI config space corrupted, reinitialising");
        let _irq = lock(&self.irq_lock);
        self.asic_down();
        let rx_buf_sz = lock(&self.state).rx_buf_sz;
        if !self.init_rings(rx_buf_sz) {
            self.schedule(DeferredTask::Reset);
            return;
        }
        self.powerup_pll();
        self.hw_start();
        self.dsm(Dsm::IfUp);
        self.check_link();
    }
}

fn check_mtu(chip: &VariantDescriptor, mtu: usize) -> Result<()> {
    if mtu < ETH_ZLEN || mtu > chip.jumbo_frame_size {
        return Err(Error::InvalidMtu {
            mtu,
            min: ETH_ZLEN,
            max: chip.jumbo_frame_size,
        });
    }
    Ok(())
}
