mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use common::*;
use r8168_hal::pci::*;
use r8168_hal::{DenseDma, Mmio, PciConfig};
use r8168_model::regs::*;
use r8168_model::{ChipModel, LinkSpeed};
use r8168_net::regs::Intr;
use r8168_net::{DeferredTask, DriverConfig, LinkPhase, TxOutcome, TxPacket};

#[test]
fn system_error_clears_pci_status_and_defers_reset() {
    let rig = open_rig(signature::RTL8168C2, small_config());
    let pci = rig.model.pci();
    pci.raise_status(PCI_STATUS_SIG_SYSTEM_ERROR | PCI_STATUS_DETECTED_PARITY);
    rig.model.raise_interrupt(INTR_SYS_ERR);

    let returns = rig.service();
    assert_eq!(returns.len(), 1);
    assert!(returns[0].handled);

    assert_eq!(pci.read_u16(PCI_STATUS) & PCI_STATUS_ERROR_BITS, 0);
    let command = pci.read_u16(PCI_COMMAND);
    assert_ne!(command & PCI_COMMAND_SERR, 0);
    assert_ne!(command & PCI_COMMAND_PARITY, 0);
    assert_eq!(rig.model.interrupt_mask(), 0);
    assert_eq!(rig.dev.pending_work(), Some(DeferredTask::Reset));

    assert!(rig.dev.run_deferred_work());
    assert_eq!(rig.dev.pending_work(), None);
    assert_eq!(rig.model.interrupt_mask(), Intr::DEFAULT_MASK.bits());
    assert!(!rig.dev.queue_stopped());

    // Data path is back.
    assert!(rig.model.receive_frame(&frame(300, 4)));
    rig.service();
    assert_eq!(rig.stack.take_frames().len(), 1);
}

#[test]
fn transmit_is_held_back_until_the_error_reset_runs() {
    let rig = open_rig(signature::RTL8168C2, small_config());
    rig.model.raise_interrupt(INTR_SYS_ERR);
    rig.service();
    assert!(rig.dev.queue_stopped());

    let wakes = rig.stack.wakes();
    assert_eq!(
        rig.dev.transmit(&TxPacket::linear(frame(100, 1))),
        TxOutcome::Busy
    );
    assert_eq!(rig.dev.stats().tx_dropped, 1);
    assert_eq!(rig.dev.tx_ring_status().map(|(_, cur, dirty)| (cur, dirty)), Some((0, 0)));
    assert!(rig.model.take_transmitted().is_empty());

    assert!(rig.dev.run_deferred_work());
    assert!(!rig.dev.queue_stopped());
    assert_eq!(rig.stack.wakes(), wakes + 1);
    assert_eq!(
        rig.dev.transmit(&TxPacket::linear(frame(100, 2))),
        TxOutcome::Accepted
    );
    assert_eq!(rig.model.take_transmitted().len(), 1);
}

#[test]
fn fifo_overflow_reinitialises_rings_on_b1() {
    let rig = open_rig(signature::RTL8168B1, small_config());
    for i in 0..3 {
        assert!(rig.model.receive_frame(&frame(300, i)));
    }
    rig.service();
    assert_eq!(rig.stack.take_frames().len(), 3);
    assert_eq!(rig.dev.rx_ring_status().map(|(_, cur, _)| cur), Some(3));

    let resets = rig.model.resets();
    rig.model.raise_interrupt(INTR_RX_FIFO_OVER);
    rig.service();

    assert!(rig.model.resets() > resets);
    assert_eq!(rig.dev.stats().rx_fifo_errors, 1);
    assert_eq!(rig.dev.rx_ring_status().map(|(_, cur, dirty)| (cur, dirty)), Some((0, 0)));
    assert_eq!(rig.model.interrupt_status() & INTR_RX_FIFO_OVER, 0);
    assert_eq!(rig.model.interrupt_mask(), rig.dev.interrupt_mask().bits());
    assert_eq!(rig.dev.pending_work(), None);

    assert!(rig.model.receive_frame(&frame(300, 9)));
    rig.service();
    assert_eq!(rig.stack.take_frames().len(), 1);
}

#[test]
fn fifo_overflow_is_only_counted_on_later_chips() {
    let rig = open_rig(signature::RTL8168C2, small_config());
    let resets = rig.model.resets();

    rig.model.raise_interrupt(INTR_RX_FIFO_OVER | INTR_RX_OK);
    rig.service();

    assert_eq!(rig.model.resets(), resets);
    assert_eq!(rig.dev.stats().rx_fifo_errors, 1);
    assert_eq!(rig.model.interrupt_status(), 0);
}

#[test]
fn link_change_reports_carrier() {
    let rig = open_rig(signature::RTL8168C2, small_config());
    assert_eq!(rig.stack.carrier(), Some(true));
    assert_eq!(rig.dev.link_phase(), LinkPhase::LinkUp);

    rig.model.set_link(false, LinkSpeed::Mbps1000, true);
    rig.service();
    assert_eq!(rig.stack.carrier(), Some(false));
    assert_eq!(rig.dev.link_phase(), LinkPhase::LinkDown);

    // A second event with no actual change is not reported again.
    rig.model.set_link(false, LinkSpeed::Mbps1000, true);
    rig.service();
    assert_eq!(rig.stack.snapshot().carrier, vec![true, false]);
}

#[test]
fn vanished_device_is_not_claimed() {
    let rig = open_rig(signature::RTL8168C2, small_config());
    rig.model.poke8(INTR_STATUS, 0xff);
    rig.model.poke8(INTR_STATUS + 1, 0xff);

    let ret = rig.dev.handle_interrupt();
    assert!(!ret.handled);
    assert!(!ret.poll_scheduled);
    assert_eq!(rig.stack.take_frames().len(), 0);
}

#[test]
fn spurious_interrupt_is_not_claimed() {
    let rig = open_rig(signature::RTL8168C2, small_config());
    let ret = rig.dev.handle_interrupt();
    assert!(!ret.handled);
    assert_eq!(rig.model.interrupt_mask(), Intr::DEFAULT_MASK.bits());
}

#[test]
fn interrupt_while_down_quiesces_the_chip() {
    let rig = rig(signature::RTL8168C2, small_config());
    rig.model.raise_interrupt(INTR_RX_OK | INTR_LINK_CHG);

    let ret = rig.dev.handle_interrupt();
    assert!(ret.handled);
    assert_eq!(rig.model.interrupt_mask(), 0);
    assert_eq!(rig.model.interrupt_status(), 0);
    assert_eq!(rig.stack.carrier(), None);
}

#[test]
fn tx_error_is_counted() {
    let rig = open_rig(signature::RTL8168C2, small_config());
    rig.model.raise_interrupt(INTR_TX_ERR);
    rig.service();
    assert_eq!(rig.dev.stats().tx_errors, 1);
}

#[test]
fn tx_descriptor_unavailable_rings_the_doorbell_again() {
    let rig = open_rig(signature::RTL8168C2, small_config());
    let doorbells = rig.model.doorbells();

    rig.model.raise_interrupt(INTR_TX_OK | INTR_TX_DESC_UNAVAIL);
    rig.service();

    assert_eq!(rig.model.doorbells(), doorbells + 1);
    assert_eq!(rig.model.interrupt_status(), 0);
}

/// Forwards to the model but, once armed, keeps reporting RX_OK in the status register.
struct StickyStatus {
    model: Arc<ChipModel>,
    armed: AtomicBool,
    status_reads: AtomicUsize,
}

impl Mmio for StickyStatus {
    fn read8(&self, offset: u32) -> u8 {
        self.model.read8(offset)
    }

    fn read16(&self, offset: u32) -> u16 {
        let value = self.model.read16(offset);
        if offset == INTR_STATUS && self.armed.load(Ordering::SeqCst) {
            self.status_reads.fetch_add(1, Ordering::SeqCst);
            return value | INTR_RX_OK;
        }
        value
    }

    fn read32(&self, offset: u32) -> u32 {
        self.model.read32(offset)
    }

    fn write8(&self, offset: u32, value: u8) {
        self.model.write8(offset, value)
    }

    fn write16(&self, offset: u32, value: u16) {
        self.model.write16(offset, value)
    }

    fn write32(&self, offset: u32, value: u32) {
        self.model.write32(offset, value)
    }
}

#[test]
fn interrupt_work_is_bounded() {
    let dma = Arc::new(DenseDma::new(8 * 1024 * 1024));
    let model = Arc::new(ChipModel::new(signature::RTL8168C2, MAC, dma.clone()));
    let sticky = Arc::new(StickyStatus {
        model: model.clone(),
        armed: AtomicBool::new(false),
        status_reads: AtomicUsize::new(0),
    });
    let config = DriverConfig {
        max_interrupt_work: 2,
        ..small_config()
    };
    let rig = rig_with_mmio(model, sticky.clone(), dma, config);
    rig.dev.open().unwrap();

    sticky.armed.store(true, Ordering::SeqCst);
    let ret = rig.dev.handle_interrupt();
    sticky.armed.store(false, Ordering::SeqCst);

    assert!(ret.handled);
    assert_eq!(sticky.status_reads.load(Ordering::SeqCst), 2);
    assert_eq!(rig.model.interrupt_status(), 0);
    assert_eq!(rig.model.interrupt_mask(), Intr::DEFAULT_MASK.bits());
}

fn poll_config() -> DriverConfig {
    DriverConfig {
        poll_mode: true,
        ..small_config()
    }
}

#[test]
fn poll_mode_defers_rx_and_rearms_under_budget() {
    let rig = open_rig(signature::RTL8168C2, poll_config());
    for i in 0..3 {
        assert!(rig.model.receive_frame(&frame(300, i)));
    }

    let returns = rig.service();
    assert_eq!(returns.len(), 1);
    assert!(returns[0].poll_scheduled);
    assert_eq!(rig.stack.polls_scheduled(), 1);
    assert!(rig.stack.take_frames().is_empty());
    let narrowed = Intr::DEFAULT_MASK - Intr::POLL_EVENTS;
    assert_eq!(rig.model.interrupt_mask(), narrowed.bits());

    // Budget exhausted: stay in poll mode.
    assert_eq!(rig.dev.poll(2), 2);
    assert_eq!(rig.stack.take_frames().len(), 2);
    assert_eq!(rig.model.interrupt_mask(), narrowed.bits());

    assert_eq!(rig.dev.poll(2), 1);
    assert_eq!(rig.stack.take_frames().len(), 1);
    assert_eq!(rig.model.interrupt_mask(), Intr::DEFAULT_MASK.bits());
}

#[test]
fn poll_mode_still_handles_link_changes_inline() {
    let rig = open_rig(signature::RTL8168C2, poll_config());
    assert_eq!(rig.stack.carrier(), Some(true));
    assert_eq!(rig.stack.polls_scheduled(), 0);
    assert_eq!(rig.model.interrupt_mask(), Intr::DEFAULT_MASK.bits());
}

#[test]
fn poll_after_close_does_not_rearm() {
    let rig = open_rig(signature::RTL8168C2, poll_config());
    assert!(rig.model.receive_frame(&frame(300, 1)));
    rig.service();
    assert_eq!(rig.stack.polls_scheduled(), 1);

    rig.dev.close().unwrap();
    assert_eq!(rig.dev.poll(64), 0);
    assert_eq!(rig.model.interrupt_mask(), 0);
}

#[test]
fn poll_reclaims_transmit_completions() {
    let rig = open_rig(signature::RTL8168C2, poll_config());
    let outcome = rig.dev.transmit(&TxPacket::linear(frame(100, 1)));
    assert_eq!(outcome, TxOutcome::Accepted);
    // The doorbell completed the descriptor synchronously and raised TX_OK.
    let returns = rig.service();
    assert!(returns[0].poll_scheduled);
    assert_eq!(rig.dev.stats().tx_packets, 0);

    assert_eq!(rig.dev.poll(16), 0);
    assert_eq!(rig.dev.stats().tx_packets, 1);
}
