//! RTL8168 register map, descriptor layout and bit definitions.

use bitflags::bitflags;

pub const MAC0: u32 = 0x00;
pub const MAC4: u32 = 0x04;
pub const MAR0: u32 = 0x08;
pub const COUNTER_ADDR_LOW: u32 = 0x10;
pub const COUNTER_ADDR_HIGH: u32 = 0x14;
pub const TX_DESC_START_ADDR_LOW: u32 = 0x20;
pub const TX_DESC_START_ADDR_HIGH: u32 = 0x24;
pub const CHIP_CMD: u32 = 0x37;
pub const TX_POLL: u32 = 0x38;
pub const INTR_MASK: u32 = 0x3c;
pub const INTR_STATUS: u32 = 0x3e;
pub const TX_CONFIG: u32 = 0x40;
pub const RX_CONFIG: u32 = 0x44;
pub const CFG9346: u32 = 0x50;
pub const CONFIG0: u32 = 0x51;
pub const CONFIG1: u32 = 0x52;
pub const CONFIG2: u32 = 0x53;
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
pub const DBG_REG: u32 = 0xd1;
pub const RX_MAX_SIZE: u32 = 0xda;
pub const EFUSEAR: u32 = 0xdc;
pub const EPHY_RXER_NUM: u32 = 0x7c;
pub const CPLUS_CMD: u32 = 0xe0;
pub const INTR_MITIGATE: u32 = 0xe2;
pub const RX_DESC_ADDR_LOW: u32 = 0xe4;
pub const RX_DESC_ADDR_HIGH: u32 = 0xe8;
pub const MTPS: u32 = 0xec;
/// Vendor debug register whose bit 17 gates PHYAR on the RTL8168DP rev 2.
pub const DP_GATE_REG: u32 = 0xd0;
pub const DP_GATE_BIT: u32 = 0x0002_0000;

/// Size of the register window exposed by the register dump.
pub const REGISTER_WINDOW: usize = 0x100;

// ChipCmd
pub const CMD_STOP_REQ: u8 = 0x80;
pub const CMD_RESET: u8 = 0x10;
pub const CMD_RX_ENB: u8 = 0x08;
pub const CMD_TX_ENB: u8 = 0x04;

// TxPoll
pub const TX_POLL_NPQ: u8 = 0x40;

// Cfg9346
pub const CFG9346_LOCK: u8 = 0x00;
pub const CFG9346_UNLOCK: u8 = 0xc0;

// Config1 / Config3 / Config5
pub const CONFIG1_PM_ENABLE: u8 = 0x01;
pub const CONFIG3_MAGIC_PACKET: u8 = 1 << 5;
pub const CONFIG3_LINK_UP: u8 = 1 << 4;
pub const CONFIG5_BWF: u8 = 1 << 6;
pub const CONFIG5_MWF: u8 = 1 << 5;
pub const CONFIG5_UWF: u8 = 1 << 4;
pub const CONFIG5_LAN_WAKE: u8 = 1 << 1;

// GPIO / MACDBG
pub const GPIO_EN: u8 = 0x01;
pub const MACDBG_LAN_STRAP: u8 = 0x80;

// PMCH
pub const PMCH_PLL_ON: u8 = 0x80;

// MTPS default
pub const MTPS_DEFAULT: u8 = 0x3f;

// CPlusCmd
pub const CPCMD_RX_VLAN: u16 = 1 << 6;
pub const CPCMD_RX_CHKSUM: u16 = 1 << 5;
pub const CPCMD_PKT_CNTR_DISABLE: u16 = 1 << 7;
pub const CPCMD_INTT_1: u16 = 0x0001;
/// Management firmware (ASF) owns the PHY.
pub const CPCMD_ASF: u16 = 1 << 8;

pub const INTR_MITIGATE_DEFAULT: u16 = 0x5151;

// TxConfig
pub const TX_DMA_SHIFT: u32 = 8;
pub const TX_DMA_BURST_512: u32 = 5;
pub const TX_DMA_BURST_UNLIMITED: u32 = 7;
pub const TX_INTER_FRAME_GAP_SHIFT: u32 = 24;
pub const TX_INTER_FRAME_GAP: u32 = 3;
/// Hardware revision bits of TxConfig.
pub const TX_CONFIG_SIGNATURE_MASK: u32 = 0x7c80_0000;
pub const TX_CONFIG_ICVER_MASK: u32 = 0x0070_0000;

// RxConfig
pub const RX_CFG_FIFO_SHIFT: u32 = 13;
pub const RX_CFG_DMA_SHIFT: u32 = 8;
pub const RX_DMA_BURST: u32 = 7;
pub const RX_CFG_128_INT_EN: u32 = 1 << 15;
pub const RX_CFG_FET_MULTI_EN: u32 = 1 << 14;
pub const RX_CFG_RESERVED2: u32 = 7 << RX_CFG_FIFO_SHIFT;
pub const RX_CONFIG_MASK: u32 = 0xff7e_1880;

bitflags! {
    /// Receive-filter accept bits of RxConfig.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RxAccept: u32 {
        const ALL_PHYS = 0x01;
        const MY_PHYS = 0x02;
        const MULTICAST = 0x04;
        const BROADCAST = 0x08;
        const RUNT = 0x10;
        const ERR = 0x20;
    }
}

bitflags! {
    /// IntrMask / IntrStatus bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Intr: u16 {
        const RX_OK = 0x0001;
        const RX_ERR = 0x0002;
        const TX_OK = 0x0004;
        const TX_ERR = 0x0008;
        const RX_DESC_UNAVAIL = 0x0010;
        const LINK_CHG = 0x0020;
        const RX_FIFO_OVER = 0x0040;
        const TX_DESC_UNAVAIL = 0x0080;
        const SW_INT = 0x0100;
        const PCS_TIMEOUT = 0x4000;
        const SYS_ERR = 0x8000;
    }
}

impl Intr {
    /// Events the interrupt handler services.
    pub const DEFAULT_MASK: Intr = Intr::SYS_ERR
        .union(Intr::LINK_CHG)
        .union(Intr::RX_DESC_UNAVAIL)
        .union(Intr::TX_ERR)
        .union(Intr::TX_OK)
        .union(Intr::RX_ERR)
        .union(Intr::RX_OK);

    /// Events handed to the poll routine when running in poll mode.
    pub const POLL_EVENTS: Intr = Intr::RX_OK
        .union(Intr::RX_DESC_UNAVAIL)
        .union(Intr::RX_FIFO_OVER)
        .union(Intr::TX_OK)
        .union(Intr::TX_ERR);

    /// Bits acknowledged after every status read.
    pub const CLEAN_MASK: Intr = Intr::SYS_ERR
        .union(Intr::PCS_TIMEOUT)
        .union(Intr::SW_INT)
        .union(Intr::LINK_CHG)
        .union(Intr::RX_DESC_UNAVAIL)
        .union(Intr::TX_ERR)
        .union(Intr::TX_OK)
        .union(Intr::RX_ERR)
        .union(Intr::RX_OK);

    pub const RX_EVENTS: Intr = Intr::RX_OK
        .union(Intr::RX_DESC_UNAVAIL)
        .union(Intr::RX_FIFO_OVER);

    pub const TX_EVENTS: Intr = Intr::TX_OK.union(Intr::TX_ERR);
}

bitflags! {
    /// PHYstatus register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PhyStatus: u8 {
        const FULL_DUP = 0x01;
        const LINK_STATUS = 0x02;
        const SPEED_10 = 0x04;
        const SPEED_100 = 0x08;
        const SPEED_1000_FULL = 0x10;
        const RX_FLOW = 0x20;
        const TX_FLOW = 0x40;
        const TBI_ENABLE = 0x80;
    }
}

// PHYAR
pub const PHYAR_FLAG: u32 = 0x8000_0000;
pub const PHYAR_REG_SHIFT: u32 = 16;
pub const PHYAR_REG_MASK: u32 = 0x1f;
pub const PHYAR_DATA_MASK: u32 = 0xffff;

// OCP-tunnelled GPHY access
pub const OCPAR_FLAG: u32 = 0x8000_0000;
pub const OCPAR_GPHY_WRITE: u32 = 0x8000_f060;
pub const OCPAR_GPHY_READ: u32 = 0x0000_f060;
pub const OCPDR_WRITE: u32 = 0x8000_0000;
pub const OCPDR_READ: u32 = 0x0000_0000;
pub const OCPDR_REG_MASK: u32 = 0xff;
pub const OCPDR_REG_SHIFT: u32 = 16;
pub const OCPDR_DATA_MASK: u32 = 0xffff;
pub const OCPAR_ADDR_MASK: u32 = 0xfff;
pub const OCPAR_BYTE_EN_SHIFT: u32 = 12;

// EPHYAR
pub const EPHYAR_FLAG: u32 = 0x8000_0000;
pub const EPHYAR_REG_SHIFT: u32 = 16;
pub const EPHYAR_REG_MASK: u32 = 0x1f;
pub const EPHYAR_DATA_MASK: u32 = 0xffff;

// CSIAR
pub const CSIAR_FLAG: u32 = 0x8000_0000;
pub const CSIAR_BYTE_ENABLE: u32 = 0x0f;
pub const CSIAR_BYTE_ENABLE_SHIFT: u32 = 12;
pub const CSIAR_ADDR_MASK: u32 = 0x0fff;

// ERIAR
pub const ERIAR_FLAG: u32 = 0x8000_0000;
pub const ERIAR_TYPE_SHIFT: u32 = 16;
pub const ERIAR_BYTE_EN_SHIFT: u32 = 12;
pub const ERIAR_ADDR_ALIGN: u32 = 4;
pub const ERIAR_ADDR_MASK: u32 = 0x0fff;

// EFUSEAR
pub const EFUSE_READ: u32 = 0x0000_0000;
pub const EFUSE_READ_OK: u32 = 0x8000_0000;
pub const EFUSE_REG_SHIFT: u32 = 8;
pub const EFUSE_REG_MASK: u32 = 0x3ff;
pub const EFUSE_DATA_MASK: u32 = 0xff;

// Tally counter dump (CounterAddrLow bit 3 starts the dump and clears on completion)
pub const COUNTER_DUMP: u32 = 0x08;
pub const TALLY_COUNTERS_LEN: usize = 64;

// Descriptor layout: opts1 @0, opts2 @4, addr @8.
pub const DESC_SIZE: usize = 16;
pub const DESC_OPTS1: u64 = 0;
pub const DESC_OPTS2: u64 = 4;
pub const DESC_ADDR: u64 = 8;
/// Descriptor rings must be 256-byte aligned.
pub const RING_ALIGN: usize = 256;
/// Address written into descriptors that must never be used again.
pub const POISON_ADDR: u64 = 0x0bad_badb_adba_dbad;

pub const DESC_OWN: u32 = 1 << 31;
pub const RING_END: u32 = 1 << 30;
pub const FIRST_FRAG: u32 = 1 << 29;
pub const LAST_FRAG: u32 = 1 << 28;

// Tx opts1
pub const TX_LARGE_SEND: u32 = 1 << 27;
pub const TX_MSS_SHIFT: u32 = 16;
pub const TX_MSS_MASK: u32 = 0x7ff;
pub const TX_IPCS: u32 = 1 << 18;
pub const TX_UDPCS: u32 = 1 << 17;
pub const TX_TCPCS: u32 = 1 << 16;
pub const TX_LEN_MASK: u32 = 0xffff;

// Tx opts2 (C-class chips)
pub const TX_IPCS_C: u32 = 1 << 29;
pub const TX_TCPCS_C: u32 = 1 << 30;
pub const TX_UDPCS_C: u32 = 1 << 31;
pub const TX_VLAN_TAG: u32 = 1 << 17;

// Rx opts1
pub const RX_RWT: u32 = 1 << 22;
pub const RX_RES: u32 = 1 << 21;
pub const RX_RUNT: u32 = 1 << 20;
pub const RX_CRC: u32 = 1 << 19;
pub const RX_PROTO_MASK: u32 = 3 << 17;
pub const RX_PROTO_UDP: u32 = 1 << 17;
pub const RX_PROTO_TCP: u32 = 2 << 17;
pub const RX_PROTO_IP: u32 = 3 << 17;
pub const RX_IPF: u32 = 1 << 16;
pub const RX_UDPF: u32 = 1 << 15;
pub const RX_TCPF: u32 = 1 << 14;
pub const RX_UDPT: u32 = 1 << 18;
pub const RX_TCPT: u32 = 1 << 17;
pub const RX_LEN_MASK: u32 = 0x3fff;

// Rx opts2
pub const RX_V6F: u32 = 1 << 31;
pub const RX_V4F: u32 = 1 << 30;
pub const RX_VLAN_TAG: u32 = 1 << 16;

pub const ETH_ALEN: usize = 6;
pub const ETH_HLEN: usize = 14;
pub const ETH_ZLEN: usize = 60;
pub const ETH_DATA_LEN: usize = 1500;
pub const ETH_FCS_LEN: usize = 4;
pub const VLAN_HLEN: usize = 4;
/// Rx buffer size for standard MTUs (1522 bytes plus one).
pub const RX_BUF_SIZE: usize = 0x05f3;
