//! Register offsets and bits the model implements. Kept independent of the driver crate so the
//! two cannot drift silently in the same direction.

pub const MAC0: u32 = 0x00;
pub const COUNTER_ADDR_LOW: u32 = 0x10;
pub const COUNTER_ADDR_HIGH: u32 = 0x14;
pub const TX_DESC_ADDR_LOW: u32 = 0x20;
pub const CHIP_CMD: u32 = 0x37;
pub const TX_POLL: u32 = 0x38;
pub const INTR_MASK: u32 = 0x3c;
pub const INTR_STATUS: u32 = 0x3e;
pub const TX_CONFIG: u32 = 0x40;
pub const RX_CONFIG: u32 = 0x44;
pub const CFG9346: u32 = 0x50;
pub const CONFIG1: u32 = 0x52;
pub const CONFIG3: u32 = 0x54;
pub const CONFIG4: u32 = 0x55;
pub const CONFIG5: u32 = 0x56;
pub const PHYAR: u32 = 0x60;
pub const CSIDR: u32 = 0x64;
pub const CSIAR: u32 = 0x68;
pub const PHY_STATUS: u32 = 0x6c;
pub const MACDBG: u32 = 0x6d;
pub const GPIO: u32 = 0x6e;
pub const PMCH: u32 = 0x6f;
pub const ERIDR: u32 = 0x70;
pub const ERIAR: u32 = 0x74;
pub const EPHYAR: u32 = 0x80;
pub const OCPDR: u32 = 0xb0;
pub const OCPAR: u32 = 0xb4;
pub const DP_GATE_REG: u32 = 0xd0;
pub const RX_MAX_SIZE: u32 = 0xda;
pub const EFUSEAR: u32 = 0xdc;
pub const CPLUS_CMD: u32 = 0xe0;
pub const RX_DESC_ADDR_LOW: u32 = 0xe4;

pub const REGISTER_WINDOW: usize = 0x100;

pub const CMD_RESET: u8 = 0x10;
pub const CMD_RX_ENB: u8 = 0x08;
pub const CMD_TX_ENB: u8 = 0x04;
pub const TX_POLL_NPQ: u8 = 0x40;
pub const CFG9346_UNLOCK: u8 = 0xc0;
pub const COUNTER_DUMP: u32 = 0x08;

pub const TX_CONFIG_ID_MASK: u32 = 0x7cf0_0000;

pub const DP_GATE_BIT: u32 = 0x0002_0000;

pub const PHYAR_FLAG: u32 = 0x8000_0000;
pub const EPHYAR_FLAG: u32 = 0x8000_0000;
pub const CSIAR_FLAG: u32 = 0x8000_0000;
pub const ERIAR_FLAG: u32 = 0x8000_0000;
pub const OCPAR_FLAG: u32 = 0x8000_0000;
pub const OCPAR_GPHY_WRITE: u32 = 0x8000_f060;
pub const OCPAR_GPHY_READ: u32 = 0x0000_f060;
pub const OCPDR_WRITE: u32 = 0x8000_0000;
pub const EFUSE_READ_OK: u32 = 0x8000_0000;

// Interrupt status bits.
pub const INTR_RX_OK: u16 = 0x0001;
pub const INTR_RX_ERR: u16 = 0x0002;
pub const INTR_TX_OK: u16 = 0x0004;
pub const INTR_TX_ERR: u16 = 0x0008;
pub const INTR_RX_DESC_UNAVAIL: u16 = 0x0010;
pub const INTR_LINK_CHG: u16 = 0x0020;
pub const INTR_RX_FIFO_OVER: u16 = 0x0040;
pub const INTR_TX_DESC_UNAVAIL: u16 = 0x0080;
pub const INTR_SYS_ERR: u16 = 0x8000;

// PHYstatus bits.
pub const PHY_FULL_DUP: u8 = 0x01;
pub const PHY_LINK_STATUS: u8 = 0x02;
pub const PHY_SPEED_10: u8 = 0x04;
pub const PHY_SPEED_100: u8 = 0x08;
pub const PHY_SPEED_1000_FULL: u8 = 0x10;

// Descriptor layout.
pub const DESC_SIZE: u64 = 16;
pub const DESC_OWN: u32 = 1 << 31;
pub const RING_END: u32 = 1 << 30;
pub const FIRST_FRAG: u32 = 1 << 29;
pub const LAST_FRAG: u32 = 1 << 28;
pub const TX_LEN_MASK: u32 = 0xffff;
pub const RX_BUF_MASK: u32 = 0x3fff;
pub const RX_RES: u32 = 1 << 21;
pub const RX_CRC: u32 = 1 << 19;
pub const RX_RUNT: u32 = 1 << 20;

pub const FCS_LEN: usize = 4;
pub const TALLY_LEN: usize = 64;

/// TxConfig identification values for each silicon revision.
pub mod signature {
    pub const RTL8168B1: u32 = 0x3000_0000;
    pub const RTL8168B2: u32 = 0x3800_0000;
    pub const RTL8168B3: u32 = 0x3810_0000;
    pub const RTL8168C1: u32 = 0x3c00_0000;
    pub const RTL8168C2: u32 = 0x3c20_0000;
    pub const RTL8168C3: u32 = 0x3c40_0000;
    pub const RTL8168CP1: u32 = 0x3c90_0000;
    pub const RTL8168CP2: u32 = 0x3ca0_0000;
    pub const RTL8168D1: u32 = 0x2810_0000;
    pub const RTL8168D2: u32 = 0x2820_0000;
    pub const RTL8168DP1: u32 = 0x2880_0000;
    pub const RTL8168DP2: u32 = 0x28a0_0000;
    pub const RTL8168DP3: u32 = 0x28b0_0000;
    pub const RTL8168E1: u32 = 0x2c10_0000;
    pub const RTL8168E2: u32 = 0x2c20_0000;
    /// Not a known revision; exercises the fallback path.
    pub const UNKNOWN: u32 = 0x0400_0000;
}
