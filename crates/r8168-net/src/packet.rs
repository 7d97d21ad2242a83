/// Checksum offload requested for an outbound packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TxChecksum {
    #[default]
    None,
    Ip,
    Tcp,
    Udp,
}

/// An outbound packet: a linear head plus zero or more page fragments.
///
/// Each piece occupies one Tx descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxPacket {
    pub head: Vec<u8>,
    pub frags: Vec<Vec<u8>>,
    pub checksum: TxChecksum,
    /// TCP segmentation MSS; `None` disables segmentation offload.
    pub mss: Option<u16>,
    pub vlan: Option<u16>,
}

impl TxPacket {
    pub fn linear(data: Vec<u8>) -> Self {
        Self {
            head: data,
            ..Self::default()
        }
    }

    pub fn with_frags(head: Vec<u8>, frags: Vec<Vec<u8>>) -> Self {
        Self {
            head,
            frags,
            ..Self::default()
        }
    }

    /// Descriptors this packet consumes.
    pub fn descriptors(&self) -> usize {
        1 + self.frags.len()
    }

    pub fn len(&self) -> usize {
        self.head.len() + self.frags.iter().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a transmit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Accepted,
    /// Ring full (or the chip is recovering); requeue and wait for
    /// [`crate::NetStack::wake_queue`].
    Busy,
}

/// Checksum verdict of the receive engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxChecksum {
    /// Hardware verified the L3/L4 checksum.
    Unnecessary,
    /// Not verified; the stack must check.
    None,
}

/// A received frame handed upstream (FCS stripped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxFrame {
    pub data: Vec<u8>,
    pub checksum: RxChecksum,
    pub vlan: Option<u16>,
}
