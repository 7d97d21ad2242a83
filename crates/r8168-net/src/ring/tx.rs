use std::sync::Arc;

use r8168_hal::{DmaMemory, DmaRegion};

use super::{distance, DescRing, RingState};
use crate::packet::TxPacket;
use crate::regs::*;

/// Buffer alignment for Tx fragments.
const TX_BUF_ALIGN: usize = 8;

#[derive(Default)]
struct TxSlot {
    buf: Option<DmaRegion>,
    len: usize,
}

/// Outcome of [`TxRing::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxSubmit {
    Accepted,
    /// Not enough free descriptors, or the head slot is still owned by the chip.
    Busy,
    /// Consumed without being sent: a bounce buffer could not be allocated, or the packet needs
    /// more descriptors than the ring can ever offer.
    Dropped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Reclaimed {
    pub descriptors: usize,
    pub packets: u64,
    pub bytes: u64,
}

pub(crate) struct TxRing {
    desc: DescRing,
    slots: Vec<TxSlot>,
    cur: u32,
    dirty: u32,
    margin: usize,
    state: RingState,
}

impl TxRing {
    pub fn alloc(dma: &Arc<dyn DmaMemory>, count: usize, margin: usize) -> Option<Self> {
        let desc = DescRing::alloc(dma, count)?;
        Some(Self {
            desc,
            slots: (0..count).map(|_| TxSlot::default()).collect(),
            cur: 0,
            dirty: 0,
            margin,
            state: RingState::Uninitialized,
        })
    }

    pub fn paddr(&self) -> u64 {
        self.desc.paddr()
    }

    pub fn count(&self) -> usize {
        self.desc.count()
    }

    pub fn cursors(&self) -> (u32, u32) {
        (self.cur, self.dirty)
    }

    pub fn state(&self) -> RingState {
        self.state
    }

    pub fn set_state(&mut self, state: RingState) {
        self.state = state;
    }

    pub fn in_flight(&self) -> usize {
        distance(self.cur, self.dirty)
    }

    /// Free descriptors minus the per-packet safety margin. May be negative.
    pub fn available(&self) -> isize {
        self.count() as isize - self.in_flight() as isize - self.margin as isize
    }

    /// Whether a packet with `frags` extra fragments fits.
    pub fn admits(&self, frags: usize) -> bool {
        self.available() >= frags as isize
    }

    /// Whether a packet with `frags` extra fragments fits into an empty ring.
    pub fn fits(&self, frags: usize) -> bool {
        frags + self.margin <= self.count()
    }

    /// Whether the queue should be running: a worst-case packet fits.
    pub fn has_room(&self) -> bool {
        self.available() >= self.margin as isize
    }

    /// Zeroes the descriptors and resets both cursors.
    pub fn init(&mut self) {
        debug_assert!(self.slots.iter().all(|slot| slot.buf.is_none()));
        self.desc.reset();
        self.cur = 0;
        self.dirty = 0;
        self.state = RingState::Initialized;
    }

    /// Publishes a packet: fragments first, head descriptor last, so the chip never sees a
    /// partially built chain. `opts1` carries offload bits for `opts1`, `opts2` the per-packet
    /// second word.
    pub fn submit(&mut self, packet: &TxPacket, opts1: u32, opts2: u32) -> TxSubmit {
        let frags = packet.frags.len();
        if !self.fits(frags) {
            tracing::warn!(
                frags,
                count = self.count(),
                "Tx packet can never fit the ring, dropping"
            );
            return TxSubmit::Dropped;
        }
        if !self.admits(frags) {
            tracing::warn!(
                in_flight = self.in_flight(),
                frags,
                "Tx ring full when queue awake"
            );
            return TxSubmit::Busy;
        }

        let entry = self.desc.index(self.cur);
        if self.desc.opts1(entry) & DESC_OWN != 0 {
            return TxSubmit::Busy;
        }

        // Stage every bounce buffer before touching a descriptor so a failed allocation leaves the
        // ring untouched.
        let mut staged = Vec::with_capacity(frags + 1);
        for piece in std::iter::once(&packet.head).chain(packet.frags.iter()) {
            let Some(buf) = DmaRegion::alloc(self.desc.dma(), piece.len().max(1), TX_BUF_ALIGN)
            else {
                tracing::debug!(len = piece.len(), "Tx bounce buffer allocation failed");
                return TxSubmit::Dropped;
            };
            buf.write_at(0, piece);
            staged.push((buf, piece.len()));
        }

        let base = DESC_OWN | opts1;
        let mut staged = staged.into_iter();
        let head = staged.next();

        for (i, (buf, len)) in staged.enumerate() {
            let index = self.desc.index(self.cur.wrapping_add(1 + i as u32));
            let last = if i + 1 == frags { LAST_FRAG } else { 0 };
            self.publish(index, buf, len, base | last, opts2);
        }

        if let Some((buf, len)) = head {
            let last = if frags == 0 { LAST_FRAG } else { 0 };
            self.publish(entry, buf, len, base | FIRST_FRAG | last, opts2);
        }

        self.cur = self.cur.wrapping_add(frags as u32 + 1);
        self.desc.dma().wmb();
        TxSubmit::Accepted
    }

    fn publish(&mut self, index: usize, buf: DmaRegion, len: usize, opts1: u32, opts2: u32) {
        self.desc.set_addr(index, buf.paddr());
        self.desc.set_opts2(index, opts2);
        self.slots[index] = TxSlot {
            buf: Some(buf),
            len,
        };
        self.desc.dma().wmb();
        let status = opts1 | (len as u32 & TX_LEN_MASK) | self.desc.ring_end(index);
        self.desc.set_opts1(index, status);
    }

    /// Releases every descriptor the chip has finished with, oldest first, stopping at the first
    /// one it still owns.
    pub fn reclaim(&mut self) -> Reclaimed {
        let mut done = Reclaimed::default();
        while self.cur != self.dirty {
            let index = self.desc.index(self.dirty);
            let status = self.desc.opts1(index);
            if status & DESC_OWN != 0 {
                break;
            }
            self.desc.dma().rmb();

            let slot = std::mem::take(&mut self.slots[index]);
            done.bytes += slot.len as u64;
            if status & LAST_FRAG != 0 {
                done.packets += 1;
            }
            drop(slot.buf);

            self.dirty = self.dirty.wrapping_add(1);
            done.descriptors += 1;
        }
        done
    }

    /// Frees every attached buffer regardless of ownership. The chip must already be stopped.
    /// Returns the number of buffers dropped.
    pub fn clear(&mut self) -> usize {
        let mut dropped = 0;
        for slot in &mut self.slots {
            if slot.buf.take().is_some() {
                dropped += 1;
            }
            slot.len = 0;
        }
        self.cur = 0;
        self.dirty = 0;
        self.state = RingState::Uninitialized;
        dropped
    }

    #[cfg(test)]
    pub(crate) fn opts1_at(&self, index: usize) -> u32 {
        self.desc.opts1(index)
    }
}
