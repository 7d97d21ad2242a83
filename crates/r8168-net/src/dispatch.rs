//! Interrupt and poll dispatcher.
//!
//! Both entry points funnel into [`Rtl8168::drain`]: Rx first (bounded by the budget), then every
//! completed Tx descriptor. The interrupt handler drains with [`Budget::Unbounded`] unless poll
//! mode is on, in which case it masks the poll events, asks the stack to schedule a poll and lets
//! [`Rtl8168::poll`] re-arm the mask once a pass finishes under budget.

use std::sync::atomic::Ordering;

use crate::device::{lock, Rtl8168};
use crate::regs::*;
use crate::ring::RxContext;
use crate::stats::{add, bump};

/// How much Rx work one drain may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    Unbounded,
    Limited(usize),
}

impl Budget {
    fn limit(self) -> usize {
        match self {
            Budget::Unbounded => usize::MAX,
            Budget::Limited(n) => n,
        }
    }
}

/// Result of one interrupt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IrqReturn {
    /// The device had something pending.
    pub handled: bool,
    /// Work was deferred to the poll task.
    pub poll_scheduled: bool,
}

impl Rtl8168 {
    pub fn handle_interrupt(&self) -> IrqReturn {
        let mut ret = IrqReturn::default();
        {
            let _irq = lock(&self.irq_lock);
            if !self.service_interrupt(&mut ret) {
                return ret;
            }
            self.regs
                .write16(INTR_MASK, self.active_mask.load(Ordering::Acquire));
        }
        if ret.poll_scheduled {
            self.stack.schedule_poll();
        }
        ret
    }

    /// Status loop. Returns `false` when the mask must stay cleared on exit.
    fn service_interrupt(&self, ret: &mut IrqReturn) -> bool {
        let regs = &self.regs;
        let variant = self.chip.variant;
        regs.write16(INTR_MASK, 0);

        let mut work_left = self.config.max_interrupt_work;
        loop {
            let raw = regs.read16(INTR_STATUS);
            // All ones: the device fell off the bus.
            if raw == 0 || raw == 0xffff {
                break;
            }
            ret.handled = true;

            if !self.is_running() {
                tracing::debug!(status = raw, "interrupt while interface is down");
                self.asic_down();
                return false;
            }

            let raw = Intr::from_bits_retain(raw);
            let mut ack = Intr::CLEAN_MASK;
            if raw.contains(Intr::RX_FIFO_OVER) && !variant.fifo_overflow_needs_reset() {
                bump(&self.counters.rx_fifo_errors);
                ack |= Intr::RX_FIFO_OVER;
            }
            let status = raw & (self.intr_mask | Intr::TX_DESC_UNAVAIL);
            regs.write16(INTR_STATUS, ack.bits());

            if !status.intersects(self.intr_mask) {
                break;
            }

            if status.contains(Intr::RX_FIFO_OVER) && variant.fifo_overflow_needs_reset() {
                bump(&self.counters.rx_fifo_errors);
                self.recover_fifo_overflow();
            }

            if status.contains(Intr::SYS_ERR) {
                self.pci_error();
                break;
            }

            if status.contains(Intr::LINK_CHG) {
                self.check_link();
            }

            if status.contains(Intr::TX_OK | Intr::TX_DESC_UNAVAIL) {
                regs.write8(TX_POLL, TX_POLL_NPQ);
                regs.write16(INTR_STATUS, Intr::TX_DESC_UNAVAIL.bits());
            }

            if status.contains(Intr::TX_ERR) {
                bump(&self.counters.tx_errors);
            }

            if self.config.poll_mode {
                if status.intersects(Intr::POLL_EVENTS) {
                    let mask = self.intr_mask - Intr::POLL_EVENTS;
                    self.active_mask.store(mask.bits(), Ordering::Release);
                    ret.poll_scheduled = true;
                    break;
                }
            } else {
                self.drain_rx(Budget::Unbounded);
                if status.intersects(Intr::TX_EVENTS) {
                    self.reclaim_tx();
                }
            }

            work_left -= 1;
            if work_left == 0 {
                tracing::warn!(
                    limit = self.config.max_interrupt_work,
                    "too much work at interrupt"
                );
                regs.write16(INTR_STATUS, 0xffff);
                break;
            }
        }
        true
    }

    /// Poll-mode drain. Re-arms the full interrupt mask when less than `budget` Rx descriptors
    /// were processed. Returns the Rx work done.
    pub fn poll(&self, budget: usize) -> usize {
        let _irq = lock(&self.irq_lock);
        let work = self.drain(Budget::Limited(budget));

        // A zero mask means teardown quiesced the chip while the poll was pending.
        if work < budget && self.is_running() && self.active_mask.load(Ordering::Acquire) != 0 {
            self.active_mask
                .store(self.intr_mask.bits(), Ordering::Release);
            self.regs.write16(INTR_MASK, self.intr_mask.bits());
        }
        work
    }

    /// Rx up to `budget`, then all of Tx.
    pub(crate) fn drain(&self, budget: Budget) -> usize {
        let work = self.drain_rx(budget);
        self.reclaim_tx();
        work
    }

    pub(crate) fn drain_rx(&self, budget: Budget) -> usize {
        let ctx = RxContext {
            copybreak: self.config.rx_copybreak,
            checksum: self.config.rx_checksum.then_some(self.chip.checksum),
            vlan: self.config.vlan,
            counters: &self.counters,
        };

        let mut frames = Vec::new();
        let work = match lock(&self.rx).as_mut() {
            Some(ring) => ring.drain(budget.limit(), &ctx, &mut |frame| frames.push(frame)),
            None => 0,
        };

        for frame in frames {
            self.stack.receive(frame);
        }
        work
    }

    pub(crate) fn reclaim_tx(&self) {
        let (done, room) = match lock(&self.tx).as_mut() {
            Some(ring) => {
                let done = ring.reclaim();
                (done, ring.has_room())
            }
            None => return,
        };

        add(&self.counters.tx_packets, done.packets);
        add(&self.counters.tx_bytes, done.bytes);

        if done.descriptors > 0 && room && self.queue_stopped() {
            self.wake_queue();
        }
    }
}
