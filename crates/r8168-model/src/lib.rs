//! Behavioural model of an RTL8168-family controller.
//!
//! Implements enough of the chip for the driver to be exercised end to end: the register file,
//! the indirect access engines (PHYAR, EPHYAR, CSIAR, ERIAR, OCPAR, EFUSEAR), the tally counter
//! dump, interrupt status/mask, link, and the Tx/Rx descriptor engines operating on a shared
//! [`DenseDma`]. Every handshake completes immediately unless a [`Faults`] switch says otherwise.
//!
//! The model is passive. Tx descriptors are consumed when the driver rings the doorbell, Rx
//! frames arrive when a test calls [`ChipModel::receive_frame`], and interrupts are only ever
//! latched into the status register; the test decides when to call the driver's handler.

#![forbid(unsafe_code)]

mod pci;
mod phy;
pub mod regs;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use r8168_hal::{DenseDma, Mmio};

pub use pci::PciSpace;
use phy::PhyModel;
use regs::*;

/// Upper bound on descriptors walked per doorbell; a ring with no `RING_END` never spins forever.
const MAX_TX_WALK: usize = 4096;

/// Handshake failures the model can be told to simulate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    /// PHYAR and the OCP GPHY tunnel never complete.
    pub mdio_stuck: bool,
    /// CSI, EPHY, ERI, OCP and efuse handshakes never complete.
    pub indirect_stuck: bool,
    /// The reset bit in ChipCmd never self-clears.
    pub reset_stuck: bool,
    /// The normal-priority doorbell never drains.
    pub tx_poll_stuck: bool,
    /// The tally dump bit never clears.
    pub tally_stuck: bool,
    /// BMCR reset never self-clears.
    pub phy_reset_stuck: bool,
    /// PHYAR accesses are ignored while the DP gate bit is set.
    pub mdio_gate_enforced: bool,
}

/// One frame taken off the Tx ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub data: Vec<u8>,
    /// `opts1` of the first descriptor, ownership bit as the driver set it.
    pub opts1: u32,
    pub opts2: u32,
    pub descriptors: usize,
}

/// Link reported through PHYstatus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSpeed {
    Mbps10,
    Mbps100,
    Mbps1000,
}

#[derive(Debug)]
struct State {
    regs: [u8; REGISTER_WINDOW],
    signature: u32,
    phy: PhyModel,
    ephy: [u16; 32],
    csi: HashMap<u32, u32>,
    eri: HashMap<(u32, u32), u32>,
    ocp: HashMap<u32, u32>,
    efuse: HashMap<u32, u8>,
    gphy_latched: u8,
    tx_index: u64,
    rx_index: u64,
    tx_paused: bool,
    faults: Faults,
    transmitted: Vec<TxRecord>,
    partial: Option<TxRecord>,
    doorbells: u64,
    resets: u64,
    rx_ok: u64,
    rx_missed: u64,
}

impl State {
    fn read8(&self, offset: u32) -> u8 {
        self.regs.get(offset as usize).copied().unwrap_or(0)
    }

    fn read16(&self, offset: u32) -> u16 {
        u16::from_le_bytes([self.read8(offset), self.read8(offset + 1)])
    }

    fn read32(&self, offset: u32) -> u32 {
        u32::from_le_bytes([
            self.read8(offset),
            self.read8(offset + 1),
            self.read8(offset + 2),
            self.read8(offset + 3),
        ])
    }

    fn store(&mut self, offset: u32, bytes: &[u8]) {
        for (i, byte) in bytes.iter().enumerate() {
            if let Some(slot) = self.regs.get_mut(offset as usize + i) {
                *slot = *byte;
            }
        }
    }

    fn store16(&mut self, offset: u32, value: u16) {
        self.store(offset, &value.to_le_bytes());
    }

    fn store32(&mut self, offset: u32, value: u32) {
        self.store(offset, &value.to_le_bytes());
    }

    fn raise(&mut self, bits: u16) {
        let isr = self.read16(INTR_STATUS) | bits;
        self.store16(INTR_STATUS, isr);
    }

    fn unlocked(&self) -> bool {
        self.read8(CFG9346) & CFG9346_UNLOCK == CFG9346_UNLOCK
    }

    fn chip_cmd(&self) -> u8 {
        self.read8(CHIP_CMD)
    }

    fn ring_base(&self, low: u32) -> u64 {
        u64::from(self.read32(low)) | u64::from(self.read32(low + 4)) << 32
    }
}

/// The modelled chip. Share it as `Arc<ChipModel>`; it implements [`Mmio`].
#[derive(Debug)]
pub struct ChipModel {
    state: Mutex<State>,
    dma: Arc<DenseDma>,
    pci: Arc<PciSpace>,
}

impl ChipModel {
    /// A chip whose TxConfig reports `signature` (see [`regs::signature`]) with the given
    /// permanent address.
    pub fn new(signature: u32, mac: [u8; 6], dma: Arc<DenseDma>) -> Self {
        let mut state = State {
            regs: [0; REGISTER_WINDOW],
            signature: signature & TX_CONFIG_ID_MASK,
            phy: PhyModel::default(),
            ephy: [0; 32],
            csi: HashMap::new(),
            eri: HashMap::new(),
            ocp: HashMap::new(),
            efuse: HashMap::new(),
            gphy_latched: 0,
            tx_index: 0,
            rx_index: 0,
            tx_paused: false,
            faults: Faults::default(),
            transmitted: Vec::new(),
            partial: None,
            doorbells: 0,
            resets: 0,
            rx_ok: 0,
            rx_missed: 0,
        };
        state.store(MAC0, &mac);
        state.store32(TX_CONFIG, state.signature);
        Self {
            state: Mutex::new(state),
            dma,
            pci: Arc::new(PciSpace::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn dma(&self) -> &Arc<DenseDma> {
        &self.dma
    }

    pub fn pci(&self) -> &Arc<PciSpace> {
        &self.pci
    }

    pub fn set_faults(&self, faults: Faults) {
        let mut state = self.lock();
        state.phy.reset_stuck = faults.phy_reset_stuck;
        state.faults = faults;
    }

    /// Register read without side effects.
    pub fn peek8(&self, offset: u32) -> u8 {
        self.lock().read8(offset)
    }

    pub fn peek16(&self, offset: u32) -> u16 {
        self.lock().read16(offset)
    }

    pub fn peek32(&self, offset: u32) -> u32 {
        self.lock().read32(offset)
    }

    /// Register write without side effects (straps, config bits set by firmware).
    pub fn poke8(&self, offset: u32, value: u8) {
        self.lock().store(offset, &[value]);
    }

    pub fn interrupt_status(&self) -> u16 {
        self.lock().read16(INTR_STATUS)
    }

    pub fn interrupt_mask(&self) -> u16 {
        self.lock().read16(INTR_MASK)
    }

    /// Whether the interrupt line is asserted.
    pub fn irq_pending(&self) -> bool {
        let state = self.lock();
        state.read16(INTR_STATUS) & state.read16(INTR_MASK) != 0
    }

    /// Latches status bits (SysErr, FIFO overflow, ...).
    pub fn raise_interrupt(&self, bits: u16) {
        self.lock().raise(bits);
    }

    pub fn set_link(&self, up: bool, speed: LinkSpeed, full_duplex: bool) {
        let mut state = self.lock();
        let mut status = 0;
        if up {
            status |= PHY_LINK_STATUS;
            status |= match speed {
                LinkSpeed::Mbps10 => PHY_SPEED_10,
                LinkSpeed::Mbps100 => PHY_SPEED_100,
                LinkSpeed::Mbps1000 => PHY_SPEED_1000_FULL,
            };
            if full_duplex {
                status |= PHY_FULL_DUP;
            }
        }
        state.phy.link_up = up;
        state.store(PHY_STATUS, &[status]);
        state.raise(INTR_LINK_CHG);
    }

    pub fn phy_reg(&self, page: u16, reg: u8) -> u16 {
        self.lock().phy.get(page, reg)
    }

    /// Every PHY write as `(page, reg, value)`, oldest first.
    pub fn phy_writes(&self) -> Vec<(u16, u8, u16)> {
        self.lock().phy.writes.clone()
    }

    pub fn ephy_reg(&self, reg: u8) -> u16 {
        self.lock().ephy[usize::from(reg & 0x1f)]
    }

    pub fn set_efuse(&self, reg: u32, value: u8) {
        self.lock().efuse.insert(reg, value);
    }

    pub fn eri_word(&self, ty: u32, aligned: u32) -> u32 {
        self.lock().eri.get(&(ty, aligned)).copied().unwrap_or(0)
    }

    pub fn set_eri_word(&self, ty: u32, aligned: u32, value: u32) {
        self.lock().eri.insert((ty, aligned), value);
    }

    pub fn csi_word(&self, addr: u32) -> u32 {
        self.lock().csi.get(&addr).copied().unwrap_or(0)
    }

    pub fn doorbells(&self) -> u64 {
        self.lock().doorbells
    }

    pub fn resets(&self) -> u64 {
        self.lock().resets
    }

    pub fn rx_missed(&self) -> u64 {
        self.lock().rx_missed
    }

    pub fn take_transmitted(&self) -> Vec<TxRecord> {
        std::mem::take(&mut self.lock().transmitted)
    }

    /// While paused the doorbell is recorded but descriptors stay owned by the chip.
    pub fn pause_tx(&self, paused: bool) {
        self.lock().tx_paused = paused;
    }

    /// Consumes every descriptor the driver has granted. Returns how many were completed.
    pub fn process_tx(&self) -> usize {
        let mut state = self.lock();
        self.walk_tx(&mut state)
    }

    fn walk_tx(&self, state: &mut State) -> usize {
        if state.chip_cmd() & CMD_TX_ENB == 0 {
            return 0;
        }
        let base = state.ring_base(TX_DESC_ADDR_LOW);
        let mut done = 0;
        while done < MAX_TX_WALK {
            let desc = base + state.tx_index * DESC_SIZE;
            let opts1 = self.dma.device_read_u32(desc);
            if opts1 & DESC_OWN == 0 {
                break;
            }
            let opts2 = self.dma.device_read_u32(desc + 4);
            let addr = self.dma.device_read_u64(desc + 8);
            let len = (opts1 & TX_LEN_MASK) as usize;
            let mut piece = vec![0u8; len];
            self.dma.device_read(addr, &mut piece);

            let record = state.partial.get_or_insert_with(|| TxRecord {
                data: Vec::new(),
                opts1,
                opts2,
                descriptors: 0,
            });
            record.data.extend_from_slice(&piece);
            record.descriptors += 1;
            if opts1 & LAST_FRAG != 0 {
                if let Some(record) = state.partial.take() {
                    state.transmitted.push(record);
                }
            }

            self.dma.device_write_u32(desc, opts1 & !DESC_OWN);
            state.tx_index = if opts1 & RING_END != 0 {
                0
            } else {
                state.tx_index + 1
            };
            done += 1;
        }
        if done > 0 {
            state.raise(INTR_TX_OK);
        }
        done
    }

    /// Delivers a good frame (FCS appended by the model). Returns `false` if the frame was
    /// missed: receiver disabled or no descriptor owned by the chip.
    pub fn receive_frame(&self, data: &[u8]) -> bool {
        self.receive_with(data, 0, 0)
    }

    /// Delivers a frame with extra status bits in `opts1` (error or protocol flags) and the given
    /// `opts2`.
    pub fn receive_with(&self, data: &[u8], status: u32, opts2: u32) -> bool {
        let mut state = self.lock();
        let cmd = state.chip_cmd();
        if cmd & CMD_RX_ENB == 0 || cmd & CMD_RESET != 0 {
            state.rx_missed += 1;
            return false;
        }

        let base = state.ring_base(RX_DESC_ADDR_LOW);
        let desc = base + state.rx_index * DESC_SIZE;
        let opts1 = self.dma.device_read_u32(desc);
        if opts1 & DESC_OWN == 0 {
            state.rx_missed += 1;
            tracing::trace!(index = state.rx_index, "no Rx descriptor owned by the chip");
            state.raise(INTR_RX_DESC_UNAVAIL);
            return false;
        }

        let buf_size = (opts1 & RX_BUF_MASK) as usize;
        let addr = self.dma.device_read_u64(desc + 8);
        let mut wire = data.to_vec();
        wire.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef][..FCS_LEN]);

        let frag = if wire.len() > buf_size {
            // Frames larger than the buffer would span descriptors; only the first is modelled.
            wire.truncate(buf_size);
            FIRST_FRAG
        } else {
            FIRST_FRAG | LAST_FRAG
        };
        self.dma.device_write(addr, &wire);
        self.dma.device_write_u32(desc + 4, opts2);
        self.dma
            .device_write_u32(desc, (opts1 & RING_END) | frag | status | wire.len() as u32);

        state.rx_index = if opts1 & RING_END != 0 {
            0
        } else {
            state.rx_index + 1
        };
        if status & RX_RES != 0 {
            state.raise(INTR_RX_ERR);
        } else {
            state.rx_ok += 1;
            state.raise(INTR_RX_OK);
        }
        true
    }

    fn write(&self, offset: u32, width: usize, value: u32) {
        let mut state = self.lock();
        let state = &mut *state;
        match (offset, width) {
            (INTR_STATUS, 2) => {
                let isr = state.read16(INTR_STATUS) & !(value as u16);
                state.store16(INTR_STATUS, isr);
            }
            (CHIP_CMD, 1) => {
                let value = value as u8;
                if value & CMD_RESET != 0 {
                    state.resets += 1;
                    tracing::debug!(resets = state.resets, "chip reset");
                    state.tx_index = 0;
                    state.rx_index = 0;
                    state.partial = None;
                    let latched = if state.faults.reset_stuck { CMD_RESET } else { 0 };
                    state.store(CHIP_CMD, &[latched]);
                } else {
                    state.store(CHIP_CMD, &[value & (CMD_RX_ENB | CMD_TX_ENB)]);
                }
            }
            (TX_POLL, 1) => {
                if value as u8 & TX_POLL_NPQ != 0 {
                    state.doorbells += 1;
                    if !state.tx_paused {
                        self.walk_tx(state);
                    }
                    let latched = if state.faults.tx_poll_stuck { TX_POLL_NPQ } else { 0 };
                    state.store(TX_POLL, &[latched]);
                }
            }
            (TX_CONFIG, 4) => {
                let value = (value & !TX_CONFIG_ID_MASK) | state.signature;
                state.store32(TX_CONFIG, value);
            }
            (MAC0..=0x07, _) | (CONFIG1..=CONFIG5, _) if !state.unlocked() => {}
            (COUNTER_ADDR_LOW, 4) => self.counter_dump(state, value),
            (PHYAR, 4) => self.phyar(state, value),
            (EPHYAR, 4) => {
                let reg = ((value >> 16) & 0x1f) as usize;
                let stuck = state.faults.indirect_stuck;
                if value & EPHYAR_FLAG != 0 {
                    state.ephy[reg] = value as u16;
                    state.store32(EPHYAR, if stuck { value } else { value & !EPHYAR_FLAG });
                } else {
                    let data = u32::from(state.ephy[reg]);
                    state.store32(EPHYAR, if stuck { value } else { EPHYAR_FLAG | value | data });
                }
            }
            (CSIAR, 4) => {
                let addr = value & 0x0fff;
                let stuck = state.faults.indirect_stuck;
                if value & CSIAR_FLAG != 0 {
                    let data = state.read32(CSIDR);
                    state.csi.insert(addr, data);
                    state.store32(CSIAR, if stuck { value } else { value & !CSIAR_FLAG });
                } else {
                    let data = state.csi.get(&addr).copied().unwrap_or(0);
                    state.store32(CSIDR, data);
                    state.store32(CSIAR, if stuck { value } else { value | CSIAR_FLAG });
                }
            }
            (ERIAR, 4) => {
                let ty = (value >> 16) & 0x3;
                let lanes = (value >> 12) & 0xf;
                let aligned = value & 0x0ffc;
                let stuck = state.faults.indirect_stuck;
                if value & ERIAR_FLAG != 0 {
                    let mask = (0..4)
                        .filter(|lane| lanes & (1 << lane) != 0)
                        .fold(0u32, |mask, lane| mask | 0xff << (lane * 8));
                    let current = state.eri.get(&(ty, aligned)).copied().unwrap_or(0);
                    let data = state.read32(ERIDR);
                    state.eri.insert((ty, aligned), (current & !mask) | (data & mask));
                    state.store32(ERIAR, if stuck { value } else { value & !ERIAR_FLAG });
                } else {
                    let data = state.eri.get(&(ty, aligned)).copied().unwrap_or(0);
                    state.store32(ERIDR, data);
                    state.store32(ERIAR, if stuck { value } else { value | ERIAR_FLAG });
                }
            }
            (OCPAR, 4) => self.ocpar(state, value),
            (EFUSEAR, 4) => {
                let reg = (value >> 8) & 0x3ff;
                if state.faults.indirect_stuck {
                    state.store32(EFUSEAR, value);
                } else {
                    let data = u32::from(state.efuse.get(&reg).copied().unwrap_or(0xff));
                    state.store32(EFUSEAR, EFUSE_READ_OK | value | data);
                }
            }
            (_, 1) => state.store(offset, &[value as u8]),
            (_, 2) => state.store16(offset, value as u16),
            _ => state.store32(offset, value),
        }
    }

    fn phyar(&self, state: &mut State, value: u32) {
        let gated = state.faults.mdio_gate_enforced
            && state.read32(DP_GATE_REG) & DP_GATE_BIT != 0;
        if state.faults.mdio_stuck || gated {
            state.store32(PHYAR, value);
            return;
        }
        let reg = ((value >> 16) & 0x1f) as u8;
        if value & PHYAR_FLAG != 0 {
            state.phy.write(reg, value as u16);
            state.store32(PHYAR, value & !PHYAR_FLAG);
        } else {
            let data = u32::from(state.phy.read(reg));
            state.store32(PHYAR, PHYAR_FLAG | (value & 0x001f_0000) | data);
        }
    }

    fn ocpar(&self, state: &mut State, value: u32) {
        let gphy = value == OCPAR_GPHY_WRITE || value == OCPAR_GPHY_READ;
        let stuck = if gphy {
            state.faults.mdio_stuck
        } else {
            state.faults.indirect_stuck
        };
        if stuck {
            state.store32(OCPAR, value);
            return;
        }

        if value == OCPAR_GPHY_WRITE {
            let data = state.read32(OCPDR);
            let reg = ((data >> 16) & 0xff) as u8;
            if data & OCPDR_WRITE != 0 {
                state.phy.write(reg, data as u16);
            } else {
                state.gphy_latched = reg;
            }
            state.store32(OCPAR, value & !OCPAR_FLAG);
        } else if value == OCPAR_GPHY_READ {
            let data = u32::from(state.phy.read(state.gphy_latched));
            state.store32(OCPDR, data);
            state.store32(OCPAR, value | OCPAR_FLAG);
        } else if value & OCPAR_FLAG != 0 {
            let data = state.read32(OCPDR);
            state.ocp.insert(value & 0xfff, data);
            state.store32(OCPAR, value & !OCPAR_FLAG);
        } else {
            let data = state.ocp.get(&(value & 0xfff)).copied().unwrap_or(0);
            state.store32(OCPDR, data);
            state.store32(OCPAR, value | OCPAR_FLAG);
        }
    }

    fn counter_dump(&self, state: &mut State, value: u32) {
        if value & COUNTER_DUMP == 0 {
            state.store32(COUNTER_ADDR_LOW, value);
            return;
        }
        if state.faults.tally_stuck {
            state.store32(COUNTER_ADDR_LOW, value);
            return;
        }

        let paddr = u64::from(state.read32(COUNTER_ADDR_HIGH)) << 32
            | u64::from(value & !(TALLY_LEN as u32 - 1));
        let mut block = [0u8; TALLY_LEN];
        block[0..8].copy_from_slice(&(state.transmitted.len() as u64).to_le_bytes());
        block[8..16].copy_from_slice(&state.rx_ok.to_le_bytes());
        let missed = u16::try_from(state.rx_missed).unwrap_or(u16::MAX);
        block[28..30].copy_from_slice(&missed.to_le_bytes());
        self.dma.device_write(paddr, &block);
        state.store32(COUNTER_ADDR_LOW, value & !COUNTER_DUMP);
    }
}

impl Mmio for ChipModel {
    fn read8(&self, offset: u32) -> u8 {
        self.lock().read8(offset)
    }

    fn read16(&self, offset: u32) -> u16 {
        self.lock().read16(offset)
    }

    fn read32(&self, offset: u32) -> u32 {
        self.lock().read32(offset)
    }

    fn write8(&self, offset: u32, value: u8) {
        self.write(offset, 1, u32::from(value));
    }

    fn write16(&self, offset: u32, value: u16) {
        self.write(offset, 2, u32::from(value));
    }

    fn write32(&self, offset: u32, value: u32) {
        self.write(offset, 4, value);
    }
}
