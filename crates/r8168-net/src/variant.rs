//! Chip variant table.
//!
//! TxConfig carries a silicon signature in bits 30..26 and 23, with a sub-revision (ICVerID) in
//! bits 22..20. Each known combination maps to one immutable [`VariantDescriptor`].

use thiserror::Error;

use crate::access::Registers;
use crate::mdio::MdioTransport;
use crate::regs::*;
use crate::tuning::{self, SpecialCase, TuningStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipVariant {
    Rtl8168B1,
    Rtl8168B2,
    Rtl8168B3,
    Rtl8168C1,
    Rtl8168C2,
    Rtl8168C3,
    Rtl8168Cp1,
    Rtl8168Cp2,
    Rtl8168D1,
    Rtl8168D2,
    Rtl8168Dp1,
    Rtl8168Dp2,
    Rtl8168Dp3,
    Rtl8168E1,
    Rtl8168E2,
}

/// How the chip consumes Tx checksum requests and reports Rx checksum results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumClass {
    /// Requests in Tx opts1; Rx protocol field in opts1 bits 18..17.
    B,
    /// Requests in Tx opts2; Rx protocol flags split across opts1/opts2.
    C,
}

/// Config-register bits that must be flipped for jumbo frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumboEnable {
    None,
    Config3,
    Config3And4,
}

pub const CONFIG3_JUMBO_EN0: u8 = 1 << 2;
pub const CONFIG4_JUMBO_EN1: u8 = 1 << 1;

#[derive(Debug)]
pub struct VariantDescriptor {
    pub name: &'static str,
    pub variant: ChipVariant,
    /// RxConfig bits owned by the driver (FIFO threshold, DMA burst, interrupt options).
    pub rx_config: u32,
    /// RxConfig bits preserved from the hardware value when the filter is rewritten.
    pub rx_config_mask: u32,
    /// Largest supported MTU.
    pub jumbo_frame_size: usize,
    pub checksum: ChecksumClass,
    pub efuse: bool,
    pub jumbo_enable: JumboEnable,
    pub phy_tuning: &'static [TuningStep],
    pub start_tuning: &'static [TuningStep],
    pub special_cases: &'static [SpecialCase],
}

impl VariantDescriptor {
    pub fn has(&self, case: SpecialCase) -> bool {
        self.special_cases.contains(&case)
    }
}

const JUMBO_4K: usize = 4 * 1024;
const JUMBO_6K: usize = 6 * 1024;
const JUMBO_9K: usize = 9 * 1024;

const RX_CFG_B: u32 = RX_CFG_RESERVED2 | RX_DMA_BURST << RX_CFG_DMA_SHIFT;
const RX_CFG_C: u32 = RX_CFG_128_INT_EN | RX_CFG_FET_MULTI_EN | RX_DMA_BURST << RX_CFG_DMA_SHIFT;
const RX_CFG_D: u32 = RX_CFG_128_INT_EN | RX_DMA_BURST << RX_CFG_DMA_SHIFT;

#[allow(clippy::too_many_arguments)]
const fn entry(
    name: &'static str,
    variant: ChipVariant,
    rx_config: u32,
    jumbo_frame_size: usize,
    checksum: ChecksumClass,
    efuse: bool,
    jumbo_enable: JumboEnable,
    phy_tuning: &'static [TuningStep],
    start_tuning: &'static [TuningStep],
    special_cases: &'static [SpecialCase],
) -> VariantDescriptor {
    VariantDescriptor {
        name,
        variant,
        rx_config,
        rx_config_mask: RX_CONFIG_MASK,
        jumbo_frame_size,
        checksum,
        efuse,
        jumbo_enable,
        phy_tuning,
        start_tuning,
        special_cases,
    }
}

use ChecksumClass::{B, C};
use ChipVariant::*;

/// Index 0 is the fallback for unrecognised signatures.
#[rustfmt::skip]
pub static VARIANTS: [VariantDescriptor; 15] = [
    entry("RTL8168B/8111B", Rtl8168B1, RX_CFG_B, JUMBO_4K, B, false, JumboEnable::None, tuning::PHY_8168B_REV1, &[], &[]),
    entry("RTL8168B/8111B", Rtl8168B2, RX_CFG_B, JUMBO_4K, B, false, JumboEnable::None, tuning::PHY_8168B, &[], &[]),
    entry("RTL8168B/8111B", Rtl8168B3, RX_CFG_B, JUMBO_4K, B, false, JumboEnable::None, tuning::PHY_8168B, &[], &[]),
    entry("RTL8168C/8111C", Rtl8168C1, RX_CFG_C, JUMBO_6K, C, false, JumboEnable::Config3And4, tuning::PHY_8168C, tuning::START_8168C, &[]),
    entry("RTL8168C/8111C", Rtl8168C2, RX_CFG_C, JUMBO_6K, C, false, JumboEnable::Config3And4, tuning::PHY_8168CP, tuning::START_8168C_REV2, &[]),
    entry("RTL8168C/8111C", Rtl8168C3, RX_CFG_C, JUMBO_6K, C, false, JumboEnable::Config3And4, tuning::PHY_8168CP, tuning::START_8168C_REV2, &[]),
    entry("RTL8168CP/8111CP", Rtl8168Cp1, RX_CFG_C, JUMBO_6K, C, false, JumboEnable::Config3And4, tuning::PHY_8168CP, tuning::START_8168CP, &[]),
    entry("RTL8168CP/8111CP", Rtl8168Cp2, RX_CFG_C, JUMBO_6K, C, false, JumboEnable::Config3And4, tuning::PHY_8168CP, tuning::START_8168CP, &[]),
    entry("RTL8168D/8111D", Rtl8168D1, RX_CFG_D, JUMBO_9K, C, true, JumboEnable::Config3And4, tuning::PHY_8168D, tuning::START_8168D, &[]),
    entry("RTL8168D/8111D", Rtl8168D2, RX_CFG_D, JUMBO_9K, C, true, JumboEnable::Config3And4, tuning::PHY_8168D, tuning::START_8168D, &[]),
    entry("RTL8168DP/8111DP", Rtl8168Dp1, RX_CFG_D, JUMBO_9K, C, true, JumboEnable::Config3, tuning::PHY_8168DP, tuning::START_8168DP, &[SpecialCase::Dp10MbpsAnalog]),
    entry("RTL8168DP/8111DP", Rtl8168Dp2, RX_CFG_D, JUMBO_9K, C, true, JumboEnable::Config3, tuning::PHY_8168DP, tuning::START_8168DP, &[SpecialCase::DpMdioGateOnDetect]),
    entry("RTL8168DP/8111DP", Rtl8168Dp3, RX_CFG_D, JUMBO_9K, C, true, JumboEnable::Config3, tuning::PHY_8168DP, tuning::START_8168DP, &[]),
    entry("RTL8168E/8111E", Rtl8168E1, RX_CFG_D, JUMBO_9K, C, true, JumboEnable::Config3And4, tuning::PHY_8168E, tuning::START_8168E, &[SpecialCase::EphyParkOnDown]),
    entry("RTL8168E/8111E", Rtl8168E2, RX_CFG_D, JUMBO_9K, C, true, JumboEnable::Config3And4, tuning::PHY_8168E, tuning::START_8168E, &[SpecialCase::EphyParkOnDown]),
];

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("unknown chip signature {signature:#010x}")]
pub struct UnknownVariant {
    pub signature: u32,
}

/// Decodes a raw TxConfig value. Pure.
pub fn identify(tx_config: u32) -> Result<ChipVariant, UnknownVariant> {
    let reg = tx_config & TX_CONFIG_SIGNATURE_MASK;
    let icver = tx_config & TX_CONFIG_ICVER_MASK;

    let variant = match (reg, icver) {
        (0x3000_0000, _) => Rtl8168B1,
        (0x3800_0000, 0x0000_0000) => Rtl8168B2,
        (0x3800_0000, _) => Rtl8168B3,
        (0x3c00_0000, 0x0000_0000) => Rtl8168C1,
        (0x3c00_0000, 0x0020_0000) => Rtl8168C2,
        (0x3c00_0000, _) => Rtl8168C3,
        (0x3c80_0000, 0x0010_0000) => Rtl8168Cp1,
        (0x3c80_0000, _) => Rtl8168Cp2,
        (0x2800_0000, 0x0010_0000) => Rtl8168D1,
        (0x2800_0000, _) => Rtl8168D2,
        (0x2880_0000, 0x0000_0000) => Rtl8168Dp1,
        (0x2880_0000, 0x0020_0000) => Rtl8168Dp2,
        (0x2880_0000, _) => Rtl8168Dp3,
        (0x2c00_0000, 0x0010_0000) => Rtl8168E1,
        (0x2c00_0000, _) => Rtl8168E2,
        _ => return Err(UnknownVariant { signature: reg }),
    };
    Ok(variant)
}

/// Reads the signature from the chip and selects its descriptor.
///
/// Not idempotent for the RTL8168DP rev 2: detecting it sets the MDIO gate bit in
/// [`DP_GATE_REG`], a documented erratum workaround that must happen before any PHY access.
/// Unknown signatures fall back to the first table entry with a warning.
pub fn detect(regs: &Registers) -> &'static VariantDescriptor {
    let tx_config = regs.read32(TX_CONFIG);
    let descriptor = match identify(tx_config) {
        Ok(variant) => ChipVariant::descriptor(variant),
        Err(err) => {
            tracing::warn!(
                signature = err.signature,
                fallback = VARIANTS[0].name,
                "unknown chip signature, using default variant"
            );
            &VARIANTS[0]
        }
    };

    if descriptor.has(SpecialCase::DpMdioGateOnDetect) {
        regs.write32(DP_GATE_REG, regs.read32(DP_GATE_REG) | DP_GATE_BIT);
    }

    tracing::debug!(
        name = descriptor.name,
        variant = ?descriptor.variant,
        tx_config,
        "identified chip"
    );
    descriptor
}

impl ChipVariant {
    pub fn descriptor(self) -> &'static VariantDescriptor {
        &VARIANTS[self.index()]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// The RTL8168B family: no stop request before reset, B-class offloads.
    pub fn is_8168b(self) -> bool {
        matches!(self, Rtl8168B1 | Rtl8168B2 | Rtl8168B3)
    }

    /// Rx FIFO overflow corrupts ring state and needs a full reinitialisation.
    pub fn fifo_overflow_needs_reset(self) -> bool {
        self == Rtl8168B1
    }

    /// Rx must be re-armed with ownership dropped while the chip sleeps.
    pub fn needs_sleep_rx_enable(self) -> bool {
        matches!(self, Rtl8168B1 | Rtl8168B2)
    }

    /// Reset waits for the normal-priority doorbell to drain instead of issuing a stop request.
    pub fn waits_for_tx_poll_on_reset(self) -> bool {
        matches!(self, Rtl8168Dp1 | Rtl8168Dp2)
    }

    /// PLL power is controlled through PMCH.
    pub fn has_pll_power_control(self) -> bool {
        matches!(
            self,
            Rtl8168D1 | Rtl8168D2 | Rtl8168Dp2 | Rtl8168E1 | Rtl8168E2
        )
    }

    /// The management firmware owns the PLL and PHY power state.
    pub fn firmware_owns_power(self) -> bool {
        self == Rtl8168Dp1
    }

    /// PHY power-up/down keeps register 0x0e untouched.
    pub fn is_8168e(self) -> bool {
        matches!(self, Rtl8168E1 | Rtl8168E2)
    }

    /// PHY power stays up while ASF management firmware is active.
    pub fn has_asf_management(self) -> bool {
        matches!(self, Rtl8168Cp1 | Rtl8168Cp2)
    }

    /// LAN enable GPIO follows the MACDBG strap.
    pub fn has_dsm_gpio(self) -> bool {
        matches!(self, Rtl8168C2 | Rtl8168C3)
    }

    pub fn mdio_transport(self) -> MdioTransport {
        match self {
            Rtl8168Dp1 => MdioTransport::Ocp,
            Rtl8168Dp2 => MdioTransport::GatedPhyar,
            _ => MdioTransport::Phyar,
        }
    }

    /// Interrupt sources serviced on this chip.
    pub fn interrupt_mask(self) -> Intr {
        if self.fifo_overflow_needs_reset() {
            (Intr::DEFAULT_MASK | Intr::RX_FIFO_OVER | Intr::PCS_TIMEOUT) - Intr::RX_DESC_UNAVAIL
        } else {
            Intr::DEFAULT_MASK
        }
    }

    /// TxConfig DMA burst and inter-frame gap.
    pub fn tx_config(self) -> u32 {
        let burst = if self == Rtl8168B1 {
            TX_DMA_BURST_512
        } else {
            TX_DMA_BURST_UNLIMITED
        };
        burst << TX_DMA_SHIFT | TX_INTER_FRAME_GAP << TX_INTER_FRAME_GAP_SHIFT
    }
}
