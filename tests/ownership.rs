#![cfg(not(target_arch = "wasm32"))]

//! The driver never touches a buffer while its descriptor is owned by the chip, and every buffer
//! goes back to the allocator exactly once.

use std::sync::Arc;

use proptest::prelude::*;
use r8168_hal::{Clock, DenseDma, DmaAccess, DmaMemory, FakeClock, PciConfig};
use r8168_model::regs::{
    signature, DESC_OWN, DESC_SIZE, INTR_TX_OK, RX_DESC_ADDR_LOW, TX_DESC_ADDR_LOW, TX_LEN_MASK,
};
use r8168_model::{ChipModel, LinkSpeed};
use r8168_net::{DeviceResources, DriverConfig, RecordingStack, Rtl8168, TxPacket};

const RING: usize = 8;
const RX_LEN_MASK: u32 = 0x3fff;
const MAC: [u8; 6] = [0x00, 0xe0, 0x4c, 0x11, 0x22, 0x33];

struct Bench {
    model: Arc<ChipModel>,
    dma: Arc<DenseDma>,
    stack: Arc<RecordingStack>,
    dev: Rtl8168,
    /// Live DMA allocations before the interface was opened.
    baseline: usize,
    /// Next Tx slot the scripted device will complete.
    device_tx: usize,
}

impl Bench {
    fn open() -> Self {
        let dma = Arc::new(DenseDma::new(4 * 1024 * 1024));
        let model = Arc::new(ChipModel::new(signature::RTL8168D1, MAC, dma.clone()));
        let stack = Arc::new(RecordingStack::new());
        let resources = DeviceResources {
            mmio: model.clone(),
            pci: model.pci().clone() as Arc<dyn PciConfig>,
            dma: dma.clone() as Arc<dyn DmaMemory>,
            clock: Arc::new(FakeClock::new()) as Arc<dyn Clock>,
        };
        let config = DriverConfig {
            tx_ring_size: RING,
            rx_ring_size: RING,
            max_tx_fragments: 2,
            ..DriverConfig::default()
        };
        let dev = Rtl8168::probe(resources, stack.clone(), config).unwrap();
        let baseline = dma.live_allocations();
        dev.open().unwrap();
        model.pause_tx(true);
        model.set_link(true, LinkSpeed::Mbps1000, true);
        let bench = Self {
            model,
            dma,
            stack,
            dev,
            baseline,
            device_tx: 0,
        };
        bench.service();
        bench
    }

    fn service(&self) {
        for _ in 0..16 {
            if !self.model.irq_pending() {
                break;
            }
            self.dev.handle_interrupt();
        }
    }

    fn ring_base(&self, low: u32) -> u64 {
        u64::from(self.model.peek32(low)) | u64::from(self.model.peek32(low + 4)) << 32
    }

    /// `(paddr, len)` of every buffer whose descriptor the chip currently owns.
    fn chip_owned(&self) -> Vec<(u64, usize)> {
        let mut owned = Vec::new();
        for (low, mask) in [(TX_DESC_ADDR_LOW, TX_LEN_MASK), (RX_DESC_ADDR_LOW, RX_LEN_MASK)] {
            let base = self.ring_base(low);
            for i in 0..RING as u64 {
                let desc = base + i * DESC_SIZE;
                let opts1 = self.dma.device_read_u32(desc);
                if opts1 & DESC_OWN != 0 {
                    let addr = self.dma.device_read_u64(desc + 8);
                    owned.push((addr, (opts1 & mask) as usize));
                }
            }
        }
        owned
    }

    /// Plays the chip finishing up to `n` Tx descriptors in ring order.
    fn complete_tx(&mut self, n: usize) {
        let base = self.ring_base(TX_DESC_ADDR_LOW);
        let mut done = 0;
        while done < n {
            let desc = base + (self.device_tx * DESC_SIZE as usize) as u64;
            let opts1 = self.dma.device_read_u32(desc);
            if opts1 & DESC_OWN == 0 {
                break;
            }
            self.dma.device_write_u32(desc, opts1 & !DESC_OWN);
            self.device_tx = (self.device_tx + 1) % RING;
            done += 1;
        }
        if done > 0 {
            self.model.raise_interrupt(INTR_TX_OK);
        }
    }
}

fn frame(len: usize, fill: u8) -> Vec<u8> {
    let mut data = vec![fill; len];
    data[..6].copy_from_slice(&MAC);
    data[6..12].copy_from_slice(&[0x02, 0, 0, 0, 0, 0x42]);
    data
}

fn check_step(owned: &[(u64, usize)], log: &[DmaAccess]) -> Result<(), TestCaseError> {
    for access in log {
        for &(paddr, len) in owned {
            prop_assert!(
                !access.overlaps(paddr, len),
                "driver {:?} at {:#x} while chip owns {:#x}+{}",
                access.kind,
                access.paddr,
                paddr,
                len
            );
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum Step {
    Send { len: usize, frags: usize },
    Complete(usize),
    Receive(usize),
    Service,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (60usize..800, 0usize..=2).prop_map(|(len, frags)| Step::Send { len, frags }),
        (1usize..4).prop_map(Step::Complete),
        (60usize..1200).prop_map(Step::Receive),
        Just(Step::Service),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn chip_owned_buffers_are_never_touched(steps in prop::collection::vec(step(), 1..60)) {
        let mut bench = Bench::open();
        let mut received = 0;
        bench.dma.start_access_log();

        for (i, step) in steps.into_iter().enumerate() {
            let fill = i as u8;
            // Ownership before the step bounds what the driver may touch during it.
            let owned = bench.chip_owned();
            bench.dma.take_access_log();
            match step {
                Step::Send { len, frags } => {
                    let head = frame(len, fill);
                    let packet = TxPacket::with_frags(head, vec![vec![fill; 40]; frags]);
                    bench.dev.transmit(&packet);
                }
                Step::Complete(n) => {
                    bench.complete_tx(n);
                    let owned = bench.chip_owned();
                    bench.service();
                    check_step(&owned, &bench.dma.take_access_log())?;
                    continue;
                }
                Step::Receive(len) => {
                    if bench.model.receive_frame(&frame(len, fill)) {
                        received += 1;
                    }
                    let owned = bench.chip_owned();
                    bench.service();
                    check_step(&owned, &bench.dma.take_access_log())?;
                    continue;
                }
                Step::Service => bench.service(),
            }
            check_step(&owned, &bench.dma.take_access_log())?;
        }

        bench.dev.close().unwrap();
        check_step(&[], &bench.dma.take_access_log())?;
        prop_assert_eq!(bench.dma.bad_frees(), 0);
        prop_assert_eq!(bench.dma.live_allocations(), bench.baseline);
        prop_assert_eq!(bench.stack.take_frames().len(), received);
    }
}
