use std::sync::Arc;

use r8168_hal::{DmaMemory, DmaRegion};

use super::{distance, DescRing, RingState};
use crate::packet::{RxChecksum, RxFrame};
use crate::regs::*;
use crate::stats::{add, bump, Counters};
use crate::variant::ChecksumClass;

const RX_BUF_ALIGN: usize = 8;

/// Per-drain settings derived from the device configuration.
pub(crate) struct RxContext<'a> {
    pub copybreak: usize,
    /// `None` when Rx checksum offload is disabled.
    pub checksum: Option<ChecksumClass>,
    pub vlan: bool,
    pub counters: &'a Counters,
}

pub(crate) struct RxRing {
    desc: DescRing,
    slots: Vec<Option<DmaRegion>>,
    cur: u32,
    dirty: u32,
    buf_size: usize,
    state: RingState,
}

impl RxRing {
    pub fn alloc(dma: &Arc<dyn DmaMemory>, count: usize) -> Option<Self> {
        let desc = DescRing::alloc(dma, count)?;
        Some(Self {
            desc,
            slots: (0..count).map(|_| None).collect(),
            cur: 0,
            dirty: 0,
            buf_size: RX_BUF_SIZE,
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

    pub fn buf_size(&self) -> usize {
        self.buf_size
    }

    pub fn state(&self) -> RingState {
        self.state
    }

    pub fn set_state(&mut self, state: RingState) {
        self.state = state;
    }

    /// Slots that currently hold a buffer.
    pub fn live_buffers(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Zeroes the ring and attaches a buffer of `buf_size` bytes to every slot.
    ///
    /// All or nothing: if any allocation fails every buffer attached so far is released, the
    /// descriptors are poisoned, and `false` is returned.
    pub fn init(&mut self, buf_size: usize) -> bool {
        self.clear();
        self.buf_size = buf_size;
        self.desc.reset();

        let count = self.count() as u32;
        let filled = self.refill(0, count);
        if filled != count {
            tracing::debug!(filled, count, "Rx ring fill failed, unwinding");
            self.clear();
            return false;
        }

        self.cur = 0;
        self.dirty = 0;
        self.state = RingState::Initialized;
        true
    }

    /// Hands the slot's buffer back to the chip.
    fn give_to_chip(&self, index: usize) {
        self.desc.set_opts2(index, 0);
        self.desc.dma().wmb();
        self.desc
            .set_opts1(index, DESC_OWN | self.desc.ring_end(index) | self.buf_size as u32);
    }

    /// Attaches fresh buffers to the slots in `[from, to)` that lack one and grants each to the
    /// chip. Stops at the first allocation failure; returns how far it got.
    pub fn refill(&mut self, from: u32, to: u32) -> u32 {
        let mut cursor = from;
        while cursor != to {
            let index = self.desc.index(cursor);
            if self.slots[index].is_none() {
                let Some(buf) = DmaRegion::alloc(self.desc.dma(), self.buf_size, RX_BUF_ALIGN)
                else {
                    break;
                };
                self.desc.set_addr(index, buf.paddr());
                self.slots[index] = Some(buf);
                self.give_to_chip(index);
            }
            cursor = cursor.wrapping_add(1);
        }
        cursor.wrapping_sub(from)
    }

    /// Processes up to `budget` completed descriptors, delivering good frames through `deliver`,
    /// then refills whatever was consumed. Returns the number of descriptors processed.
    pub fn drain(
        &mut self,
        budget: usize,
        ctx: &RxContext<'_>,
        deliver: &mut dyn FnMut(RxFrame),
    ) -> usize {
        let live = self.count() - distance(self.cur, self.dirty);
        let limit = live.min(budget);
        let mut processed = 0;

        while processed < limit {
            let index = self.desc.index(self.cur);
            let status = self.desc.opts1(index);
            if status & DESC_OWN != 0 {
                break;
            }
            self.desc.dma().rmb();

            if status & RX_RES != 0 {
                bump(&ctx.counters.rx_errors);
                if status & (RX_RWT | RX_RUNT) != 0 {
                    bump(&ctx.counters.rx_length_errors);
                }
                if status & RX_CRC != 0 {
                    bump(&ctx.counters.rx_crc_errors);
                }
                tracing::debug!(index, status, "Rx error descriptor");
                self.give_to_chip(index);
            } else if status & (FIRST_FRAG | LAST_FRAG) != (FIRST_FRAG | LAST_FRAG) {
                // Frames spanning descriptors are not reassembled.
                bump(&ctx.counters.rx_dropped);
                bump(&ctx.counters.rx_length_errors);
                self.give_to_chip(index);
            } else {
                let frame = self.take_frame(index, status, ctx);
                add(&ctx.counters.rx_bytes, frame.data.len() as u64);
                bump(&ctx.counters.rx_packets);
                if frame.data.first().is_some_and(|b| b & 1 != 0) {
                    bump(&ctx.counters.multicast);
                }
                deliver(frame);
            }

            self.cur = self.cur.wrapping_add(1);
            processed += 1;
        }

        let gap = self.cur.wrapping_sub(self.dirty);
        let refilled = self.refill(self.dirty, self.cur);
        self.dirty = self.dirty.wrapping_add(refilled);
        if refilled < gap && distance(self.cur, self.dirty) == self.count() {
            tracing::warn!("Rx buffers exhausted");
        }

        processed
    }

    fn take_frame(&mut self, index: usize, status: u32, ctx: &RxContext<'_>) -> RxFrame {
        let opts2 = self.desc.opts2(index);
        let len = ((status & RX_LEN_MASK) as usize)
            .saturating_sub(ETH_FCS_LEN)
            .min(self.buf_size);
        let mut data = vec![0u8; len];

        if len < ctx.copybreak {
            if let Some(buf) = &self.slots[index] {
                buf.read_at(0, &mut data);
            }
            self.give_to_chip(index);
        } else if let Some(buf) = self.slots[index].take() {
            buf.read_at(0, &mut data);
        }

        RxFrame {
            data,
            checksum: match ctx.checksum {
                Some(class) => classify_checksum(class, status, opts2),
                None => RxChecksum::None,
            },
            vlan: if ctx.vlan && opts2 & RX_VLAN_TAG != 0 {
                Some((opts2 as u16).swap_bytes())
            } else {
                None
            },
        }
    }

    /// Rewrites the ownership of every slot that holds a buffer. Used while the chip is stopped.
    pub fn reset_ownership(&self, own: bool) {
        let own = if own { DESC_OWN } else { 0 };
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.is_some() {
                self.desc
                    .set_opts1(index, own | self.desc.ring_end(index) | self.buf_size as u32);
            }
        }
    }

    /// Restarts the ring at slot 0 after a chip reset, granting every slot back to the chip.
    /// Only possible while every slot holds a buffer.
    pub fn rewind(&mut self) -> bool {
        if self.live_buffers() != self.count() {
            return false;
        }
        self.cur = 0;
        self.dirty = 0;
        self.reset_ownership(true);
        self.state = RingState::Initialized;
        true
    }

    /// Releases every buffer regardless of ownership and poisons the descriptors. The chip must
    /// already be stopped.
    pub fn clear(&mut self) {
        for index in 0..self.slots.len() {
            if self.slots[index].take().is_some() {
                self.desc.set_addr(index, POISON_ADDR);
                let opts1 = self.desc.opts1(index);
                self.desc.set_opts1(index, opts1 & RING_END);
            }
        }
        self.cur = 0;
        self.dirty = 0;
        self.state = RingState::Uninitialized;
    }

    #[cfg(test)]
    pub(crate) fn opts1_at(&self, index: usize) -> u32 {
        self.desc.opts1(index)
    }
}

fn classify_checksum(class: ChecksumClass, opts1: u32, opts2: u32) -> RxChecksum {
    let proto = opts1 & RX_PROTO_MASK;
    let ok = match class {
        ChecksumClass::B => {
            (proto == RX_PROTO_TCP && opts1 & RX_TCPF == 0)
                || (proto == RX_PROTO_UDP && opts1 & RX_UDPF == 0)
                || (proto == RX_PROTO_IP && opts1 & RX_IPF == 0)
        }
        ChecksumClass::C => {
            (proto == RX_TCPT && opts1 & RX_TCPF == 0)
                || (proto == RX_UDPT && opts1 & RX_UDPF == 0)
                || (proto == 0 && opts2 & RX_V4F != 0 && opts1 & RX_IPF == 0)
        }
    };
    if ok {
        RxChecksum::Unnecessary
    } else {
        RxChecksum::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r8168_hal::DenseDma;

    fn ring(count: usize) -> (Arc<DenseDma>, RxRing) {
        let dense = Arc::new(DenseDma::new(256 * 1024));
        let dma: Arc<dyn DmaMemory> = dense.clone();
        let ring = RxRing::alloc(&dma, count).unwrap();
        (dense, ring)
    }

    fn ctx(counters: &Counters) -> RxContext<'_> {
        RxContext {
            copybreak: 200,
            checksum: Some(ChecksumClass::C),
            vlan: true,
            counters,
        }
    }

    /// Plays the chip: writes `data` into slot `index` and hands the descriptor back.
    fn fill(dense: &DenseDma, ring: &RxRing, index: usize, data: &[u8], extra: u32, opts2: u32) {
        let desc = ring.paddr() + (index * DESC_SIZE) as u64;
        let addr = dense.device_read_u64(desc + DESC_ADDR);
        dense.device_write(addr, data);
        dense.device_write_u32(desc + DESC_OPTS2, opts2);
        let opts1 = dense.device_read_u32(desc) & RING_END;
        let len = (data.len() + ETH_FCS_LEN) as u32;
        dense.device_write_u32(desc, opts1 | FIRST_FRAG | LAST_FRAG | extra | len);
    }

    #[test]
    fn init_grants_every_slot() {
        let (dense, mut ring) = ring(4);
        let base = dense.live_allocations();
        assert!(ring.init(RX_BUF_SIZE));
        assert_eq!(dense.live_allocations(), base + 4);
        for i in 0..4 {
            assert_ne!(ring.opts1_at(i) & DESC_OWN, 0);
        }
        assert_ne!(ring.opts1_at(3) & RING_END, 0);
        assert_eq!(ring.opts1_at(0) & RX_LEN_MASK, RX_BUF_SIZE as u32);
    }

    #[test]
    fn init_unwinds_on_partial_fill() {
        let (dense, mut ring) = ring(8);
        let base = dense.live_allocations();
        dense.fail_nth_allocation(5);
        assert!(!ring.init(RX_BUF_SIZE));
        assert_eq!(dense.live_allocations(), base);
        assert_eq!(ring.live_buffers(), 0);
        for i in 0..8 {
            assert_eq!(ring.opts1_at(i) & DESC_OWN, 0);
        }
    }

    #[test]
    fn short_frame_is_copied_and_buffer_recycled() {
        let (dense, mut ring) = ring(4);
        assert!(ring.init(RX_BUF_SIZE));
        let allocs = dense.total_allocations();
        let counters = Counters::default();

        fill(&dense, &ring, 0, &[0x02; 64], 0, 0);
        let mut frames = Vec::new();
        assert_eq!(ring.drain(16, &ctx(&counters), &mut |f| frames.push(f)), 1);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, vec![0x02; 64]);
        assert_ne!(ring.opts1_at(0) & DESC_OWN, 0);
        // Recycled in place: no new allocation.
        assert_eq!(dense.total_allocations(), allocs);
        assert_eq!(ring.cursors(), (1, 1));
        assert_eq!(counters.snapshot().rx_packets, 1);
    }

    #[test]
    fn long_frame_takes_buffer_and_refills() {
        let (dense, mut ring) = ring(4);
        assert!(ring.init(RX_BUF_SIZE));
        let allocs = dense.total_allocations();
        let counters = Counters::default();

        fill(&dense, &ring, 0, &[0x01; 600], 0, 0);
        let mut frames = Vec::new();
        ring.drain(16, &ctx(&counters), &mut |f| frames.push(f));

        assert_eq!(frames[0].data.len(), 600);
        assert_eq!(counters.snapshot().multicast, 1);
        assert_eq!(dense.total_allocations(), allocs + 1);
        assert_eq!(ring.live_buffers(), 4);
        assert_eq!(dense.bad_frees(), 0);
    }

    #[test]
    fn crc_error_is_counted_and_recycled() {
        let (dense, mut ring) = ring(4);
        assert!(ring.init(RX_BUF_SIZE));
        let counters = Counters::default();

        fill(&dense, &ring, 0, &[0; 64], RX_RES | RX_CRC, 0);
        let mut frames = Vec::new();
        assert_eq!(ring.drain(16, &ctx(&counters), &mut |f| frames.push(f)), 1);

        let stats = counters.snapshot();
        assert!(frames.is_empty());
        assert_eq!(stats.rx_errors, 1);
        assert_eq!(stats.rx_crc_errors, 1);
        assert_ne!(ring.opts1_at(0) & DESC_OWN, 0);
    }

    #[test]
    fn refill_failure_is_retried_later() {
        let (dense, mut ring) = ring(4);
        assert!(ring.init(RX_BUF_SIZE));
        let counters = Counters::default();

        fill(&dense, &ring, 0, &[0x10; 600], 0, 0);
        dense.set_exhausted(true);
        ring.drain(16, &ctx(&counters), &mut |_| {});
        assert_eq!(ring.cursors(), (1, 0));
        assert_eq!(ring.live_buffers(), 3);

        dense.set_exhausted(false);
        ring.drain(16, &ctx(&counters), &mut |_| {});
        assert_eq!(ring.cursors(), (1, 1));
        assert_eq!(ring.live_buffers(), 4);
    }

    #[test]
    fn budget_bounds_processing() {
        let (dense, mut ring) = ring(4);
        assert!(ring.init(RX_BUF_SIZE));
        let counters = Counters::default();
        for i in 0..3 {
            fill(&dense, &ring, i, &[0x04; 60], 0, 0);
        }
        assert_eq!(ring.drain(2, &ctx(&counters), &mut |_| {}), 2);
        assert_eq!(ring.drain(2, &ctx(&counters), &mut |_| {}), 1);
    }

    #[test]
    fn checksum_and_vlan_hints() {
        let (dense, mut ring) = ring(4);
        assert!(ring.init(RX_BUF_SIZE));
        let counters = Counters::default();

        fill(&dense, &ring, 0, &[0; 60], RX_TCPT, RX_VLAN_TAG | 0x0a00);
        fill(&dense, &ring, 1, &[0; 60], RX_TCPT | RX_TCPF, 0);
        let mut frames = Vec::new();
        ring.drain(16, &ctx(&counters), &mut |f| frames.push(f));

        assert_eq!(frames[0].checksum, RxChecksum::Unnecessary);
        assert_eq!(frames[0].vlan, Some(10));
        assert_eq!(frames[1].checksum, RxChecksum::None);
        assert_eq!(frames[1].vlan, None);
    }

    #[test]
    fn b_class_checksum_uses_protocol_field() {
        assert_eq!(
            classify_checksum(ChecksumClass::B, RX_PROTO_UDP, 0),
            RxChecksum::Unnecessary
        );
        assert_eq!(
            classify_checksum(ChecksumClass::B, RX_PROTO_IP | RX_IPF, 0),
            RxChecksum::None
        );
        assert_eq!(
            classify_checksum(ChecksumClass::C, 0, RX_V4F),
            RxChecksum::Unnecessary
        );
    }
}
