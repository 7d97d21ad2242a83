//! Per-variant register tuning sequences.
//!
//! Vendor analog calibration is carried as opaque data: a list of steps replayed at a fixed
//! lifecycle point (PHY configuration on open, chip start). Anything that cannot be expressed as
//! plain data is a [`SpecialCase`] with a name.

use crate::access::Registers;
use crate::mdio::{Mdio, PhyAccess};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuningStep {
    /// PHY register write. Register 0x1f selects the page for following steps.
    Phy { reg: u8, value: u16 },
    /// PHY read-modify-write.
    PhyUpdate { reg: u8, clear: u16, set: u16 },
    /// PCIe PHY read-modify-write.
    EphyUpdate { reg: u8, clear: u16, set: u16 },
    /// Extended config space: `(csi & keep) | set`.
    CsiUpdate { addr: u16, keep: u32, set: u32 },
    /// MAC register read-modify-write.
    Mac8Update { offset: u32, clear: u8, set: u8 },
    DelayMs(u64),
}

/// Behaviour that cannot be flattened into a register table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialCase {
    /// RTL8168DP rev 1: retune the analog front end whenever link changes, depending on whether
    /// the link came up at 10Mbps.
    Dp10MbpsAnalog,
    /// RTL8168DP rev 2: the MDIO gate bit must be set once during identification.
    DpMdioGateOnDetect,
    /// RTL8168E: write EPHY 0x19 on teardown.
    EphyParkOnDown,
}

/// Replays `steps`, holding the PHY lock across the whole sequence.
///
/// Individual handshake timeouts are logged by the access layer and do not stop the sequence.
pub fn apply(regs: &Registers, mdio: &Mdio, steps: &[TuningStep]) {
    if steps.is_empty() {
        return;
    }
    let phy = mdio.lock();
    for step in steps {
        apply_step(regs, &phy, step);
    }
}

fn apply_step(regs: &Registers, phy: &PhyAccess<'_>, step: &TuningStep) {
    match *step {
        TuningStep::Phy { reg, value } => {
            let _ = phy.write(reg, value);
        }
        TuningStep::PhyUpdate { reg, clear, set } => {
            let _ = phy.update(reg, clear, set);
        }
        TuningStep::EphyUpdate { reg, clear, set } => {
            if let Ok(value) = regs.ephy_read(reg) {
                let _ = regs.ephy_write(reg, (value & !clear) | set);
            }
        }
        TuningStep::CsiUpdate { addr, keep, set } => {
            if let Ok(value) = regs.csi_read(addr) {
                let _ = regs.csi_write(addr, (value & keep) | set);
            }
        }
        TuningStep::Mac8Update { offset, clear, set } => {
            regs.write8(offset, (regs.read8(offset) & !clear) | set);
        }
        TuningStep::DelayMs(ms) => regs.delay_ms(ms),
    }
}

use TuningStep::*;

#[rustfmt::skip]
pub(crate) const PHY_8168B: &[TuningStep] = &[
    Phy { reg: 0x1f, value: 0x0001 },
    Phy { reg: 0x0b, value: 0x94b0 },
    Phy { reg: 0x1f, value: 0x0003 },
    Phy { reg: 0x12, value: 0x6096 },
    Phy { reg: 0x1f, value: 0x0000 },
];

#[rustfmt::skip]
pub(crate) const PHY_8168B_REV1: &[TuningStep] = &[
    Phy { reg: 0x1f, value: 0x0001 },
    Phy { reg: 0x0b, value: 0x94b0 },
    Phy { reg: 0x1f, value: 0x0003 },
    Phy { reg: 0x12, value: 0x6096 },
    Phy { reg: 0x1f, value: 0x0000 },
    Phy { reg: 0x0d, value: 0xf8a0 },
];

#[rustfmt::skip]
pub(crate) const PHY_8168C: &[TuningStep] = &[
    Phy { reg: 0x1f, value: 0x0001 },
    Phy { reg: 0x12, value: 0x2300 },
    Phy { reg: 0x1f, value: 0x0003 },
    Phy { reg: 0x16, value: 0x000a },
    Phy { reg: 0x12, value: 0xc096 },
    Phy { reg: 0x1f, value: 0x0002 },
    Phy { reg: 0x00, value: 0x88de },
    Phy { reg: 0x01, value: 0x82b1 },
    Phy { reg: 0x08, value: 0x9e30 },
    Phy { reg: 0x09, value: 0x01f0 },
    Phy { reg: 0x0a, value: 0x5500 },
    Phy { reg: 0x03, value: 0x7002 },
    Phy { reg: 0x0c, value: 0x00c8 },
    Phy { reg: 0x1f, value: 0x0000 },
    PhyUpdate { reg: 0x14, clear: 0, set: 1 << 5 },
    PhyUpdate { reg: 0x0d, clear: 1 << 5, set: 0 },
];

#[rustfmt::skip]
pub(crate) const PHY_8168CP: &[TuningStep] = &[
    Phy { reg: 0x1f, value: 0x0001 },
    Phy { reg: 0x12, value: 0x2300 },
    Phy { reg: 0x1f, value: 0x0003 },
    Phy { reg: 0x16, value: 0x0f0a },
    Phy { reg: 0x1f, value: 0x0002 },
    Phy { reg: 0x00, value: 0x88de },
    Phy { reg: 0x01, value: 0x82b1 },
    Phy { reg: 0x0c, value: 0x7eb8 },
    Phy { reg: 0x1f, value: 0x0000 },
];

#[rustfmt::skip]
pub(crate) const PHY_8168D: &[TuningStep] = &[
    Phy { reg: 0x1f, value: 0x0002 },
    PhyUpdate { reg: 0x06, clear: 0x00ff, set: 0x0040 },
    Phy { reg: 0x1f, value: 0x0000 },
    PhyUpdate { reg: 0x0d, clear: 0, set: 1 << 5 },
];

#[rustfmt::skip]
pub(crate) const PHY_8168DP: &[TuningStep] = &[
    Phy { reg: 0x1f, value: 0x0000 },
    Phy { reg: 0x18, value: 0x0310 },
    Phy { reg: 0x1f, value: 0x0000 },
];

#[rustfmt::skip]
pub(crate) const PHY_8168E: &[TuningStep] = &[
    Phy { reg: 0x1f, value: 0x0005 },
    Phy { reg: 0x05, value: 0x8b80 },
    PhyUpdate { reg: 0x06, clear: 0, set: 0x0006 },
    Phy { reg: 0x1f, value: 0x0000 },
];

#[rustfmt::skip]
pub(crate) const START_8168C: &[TuningStep] = &[
    CsiUpdate { addr: 0x70c, keep: 0x00ff_ffff, set: 0x2700_0000 },
    EphyUpdate { reg: 0x02, clear: 1 << 11, set: 1 << 12 },
    EphyUpdate { reg: 0x03, clear: 0, set: 1 << 1 },
    EphyUpdate { reg: 0x06, clear: 1 << 7, set: 0 },
];

#[rustfmt::skip]
pub(crate) const START_8168C_REV2: &[TuningStep] = &[
    CsiUpdate { addr: 0x70c, keep: 0x00ff_ffff, set: 0x2700_0000 },
    EphyUpdate { reg: 0x01, clear: 0, set: 1 << 0 },
    Mac8Update { offset: 0xf3, clear: 0, set: 1 << 2 },
];

#[rustfmt::skip]
pub(crate) const START_8168CP: &[TuningStep] = &[
    CsiUpdate { addr: 0x70c, keep: 0x00ff_ffff, set: 0x2700_0000 },
];

#[rustfmt::skip]
pub(crate) const START_8168D: &[TuningStep] = &[
    CsiUpdate { addr: 0x70c, keep: 0x00ff_ffff, set: 0x2700_0000 },
    EphyUpdate { reg: 0x01, clear: 0, set: 0x0001 },
];

#[rustfmt::skip]
pub(crate) const START_8168DP: &[TuningStep] = &[
    CsiUpdate { addr: 0x70c, keep: 0x00ff_ffff, set: 0x1700_0000 },
    Mac8Update { offset: crate::regs::CONFIG1, clear: 0x3f, set: 0x1f },
];

#[rustfmt::skip]
pub(crate) const START_8168E: &[TuningStep] = &[
    CsiUpdate { addr: 0x70c, keep: 0x00ff_ffff, set: 0x2700_0000 },
    EphyUpdate { reg: 0x00, clear: 0x0200, set: 0x0100 },
    EphyUpdate { reg: 0x00, clear: 0, set: 0x0004 },
    EphyUpdate { reg: 0x06, clear: 0x0002, set: 0x0001 },
];
