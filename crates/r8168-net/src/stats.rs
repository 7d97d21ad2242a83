use std::sync::atomic::{AtomicU64, Ordering};

/// Interface statistics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetStats {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub tx_errors: u64,
    pub tx_dropped: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub rx_errors: u64,
    pub rx_dropped: u64,
    pub rx_length_errors: u64,
    pub rx_crc_errors: u64,
    pub rx_fifo_errors: u64,
    pub multicast: u64,
}

macro_rules! counters {
    ($($name:ident),* $(,)?) => {
        /// Live counters, updated from the data path without taking any lock.
        #[derive(Debug, Default)]
        pub(crate) struct Counters {
            $(pub $name: AtomicU64,)*
        }

        impl Counters {
            pub fn snapshot(&self) -> NetStats {
                NetStats {
                    $($name: self.$name.load(Ordering::Relaxed),)*
                }
            }
        }
    };
}

counters!(
    tx_packets,
    tx_bytes,
    tx_errors,
    tx_dropped,
    rx_packets,
    rx_bytes,
    rx_errors,
    rx_dropped,
    rx_length_errors,
    rx_crc_errors,
    rx_fifo_errors,
    multicast,
);

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn add(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

/// Hardware tally counters, dumped by the chip into a 64-byte DMA block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TallyCounters {
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub tx_errors: u64,
    pub rx_errors: u32,
    pub rx_missed: u16,
    pub align_errors: u16,
    pub tx_one_collision: u32,
    pub tx_multi_collision: u32,
    pub rx_unicast: u64,
    pub rx_broadcast: u64,
    pub rx_multicast: u32,
    pub tx_aborted: u16,
    pub tx_underrun: u16,
}

impl TallyCounters {
    pub fn parse(raw: &[u8; 64]) -> Self {
        let u16_at = |off: usize| u16::from_le_bytes([raw[off], raw[off + 1]]);
        let u32_at = |off: usize| {
            u32::from_le_bytes([raw[off], raw[off + 1], raw[off + 2], raw[off + 3]])
        };
        let u64_at = |off: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&raw[off..off + 8]);
            u64::from_le_bytes(bytes)
        };

        Self {
            tx_packets: u64_at(0),
            rx_packets: u64_at(8),
            tx_errors: u64_at(16),
            rx_errors: u32_at(24),
            rx_missed: u16_at(28),
            align_errors: u16_at(30),
            tx_one_collision: u32_at(32),
            tx_multi_collision: u32_at(36),
            rx_unicast: u64_at(40),
            rx_broadcast: u64_at(48),
            rx_multicast: u32_at(56),
            tx_aborted: u16_at(60),
            tx_underrun: u16_at(62),
        }
    }
}
