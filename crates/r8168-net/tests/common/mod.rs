#![allow(dead_code)]

use std::sync::Arc;

use r8168_hal::{Clock, DenseDma, DmaMemory, FakeClock, Mmio, PciConfig};
use r8168_model::{ChipModel, LinkSpeed};
use r8168_net::{DeviceResources, DriverConfig, IrqReturn, RecordingStack, Rtl8168};

pub use r8168_model::regs::signature;

pub const MAC: [u8; 6] = [0x00, 0xe0, 0x4c, 0x68, 0x01, 0x02];
const DMA_SIZE: usize = 8 * 1024 * 1024;

pub struct Rig {
    pub model: Arc<ChipModel>,
    pub dma: Arc<DenseDma>,
    pub clock: Arc<FakeClock>,
    pub stack: Arc<RecordingStack>,
    pub dev: Rtl8168,
}

/// Small rings keep wrap-around paths reachable in a handful of frames.
pub fn small_config() -> DriverConfig {
    DriverConfig {
        tx_ring_size: 8,
        rx_ring_size: 8,
        max_tx_fragments: 2,
        ..DriverConfig::default()
    }
}

pub fn rig(signature: u32, config: DriverConfig) -> Rig {
    let dma = Arc::new(DenseDma::new(DMA_SIZE));
    let model = Arc::new(ChipModel::new(signature, MAC, dma.clone()));
    rig_with_mmio(model.clone(), model, dma, config)
}

/// Like [`rig`] but the driver talks to `mmio`, which may wrap the model.
pub fn rig_with_mmio(
    model: Arc<ChipModel>,
    mmio: Arc<dyn Mmio>,
    dma: Arc<DenseDma>,
    config: DriverConfig,
) -> Rig {
    let clock = Arc::new(FakeClock::new());
    let stack = Arc::new(RecordingStack::new());
    let pci: Arc<dyn PciConfig> = model.pci().clone();
    let resources = DeviceResources {
        mmio,
        pci,
        dma: dma.clone() as Arc<dyn DmaMemory>,
        clock: clock.clone() as Arc<dyn Clock>,
    };
    let dev = Rtl8168::probe(resources, stack.clone(), config).unwrap();
    Rig {
        model,
        dma,
        clock,
        stack,
        dev,
    }
}

pub fn open_rig(signature: u32, config: DriverConfig) -> Rig {
    let rig = rig(signature, config);
    rig.dev.open().unwrap();
    rig.model.set_link(true, LinkSpeed::Mbps1000, true);
    rig.service();
    rig
}

impl Rig {
    /// Runs the interrupt handler until the line drops (bounded).
    pub fn service(&self) -> Vec<IrqReturn> {
        let mut returns = Vec::new();
        for _ in 0..16 {
            if !self.model.irq_pending() {
                break;
            }
            returns.push(self.dev.handle_interrupt());
        }
        returns
    }

    pub fn advance_ms(&self, ms: u64) {
        self.clock.advance_ms(ms);
    }
}

pub fn frame(len: usize, fill: u8) -> Vec<u8> {
    let mut data = vec![fill; len];
    data[..6].copy_from_slice(&[0x00, 0xe0, 0x4c, 0x68, 0x01, 0x02]);
    data[6..12].copy_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x09]);
    data[12..14].copy_from_slice(&0x0800u16.to_be_bytes());
    data
}
