//! Receive filter: promiscuous / all-multicast / 64-bit multicast hash.

use crate::regs::{RxAccept, ETH_ALEN};

const ETHERNET_POLYNOMIAL: u32 = 0x04c1_1db7;

/// What the stack asked the interface to accept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RxFilter {
    pub promiscuous: bool,
    pub all_multicast: bool,
    pub multicast: Vec<[u8; ETH_ALEN]>,
}

/// Register values realising an [`RxFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxMode {
    pub accept: RxAccept,
    /// Hash words as written: `mar[0]` to MAR0, `mar[1]` to MAR0 + 4.
    pub mar: [u32; 2],
}

/// CRC-32 over the address, bits fed least significant first, result not reflected.
pub fn ether_crc(data: &[u8]) -> u32 {
    let mut crc = u32::MAX;
    for &octet in data {
        let mut octet = octet;
        for _ in 0..8 {
            let feedback = (crc >> 31) ^ u32::from(octet & 1);
            crc <<= 1;
            if feedback != 0 {
                crc ^= ETHERNET_POLYNOMIAL;
            }
            octet >>= 1;
        }
    }
    crc
}

/// Hash-table bit (0..64) selected by a multicast address.
pub fn hash_bit(addr: &[u8; ETH_ALEN]) -> u32 {
    ether_crc(addr) >> 26
}

impl RxFilter {
    pub fn rx_mode(&self, multicast_limit: usize) -> RxMode {
        let (accept, filter) = if self.promiscuous {
            tracing::info!("promiscuous mode enabled");
            (
                RxAccept::BROADCAST | RxAccept::MULTICAST | RxAccept::MY_PHYS | RxAccept::ALL_PHYS,
                [u32::MAX; 2],
            )
        } else if self.all_multicast || self.multicast.len() > multicast_limit {
            (
                RxAccept::BROADCAST | RxAccept::MULTICAST | RxAccept::MY_PHYS,
                [u32::MAX; 2],
            )
        } else {
            let mut accept = RxAccept::BROADCAST | RxAccept::MY_PHYS;
            let mut filter = [0u32; 2];
            for addr in &self.multicast {
                let bit = hash_bit(addr);
                filter[(bit >> 5) as usize] |= 1 << (bit & 31);
                accept |= RxAccept::MULTICAST;
            }
            (accept, filter)
        };

        // The chip expects each word byte-reversed and the high word first.
        RxMode {
            accept,
            mar: [filter[1].swap_bytes(), filter[0].swap_bytes()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_group_hashes() {
        assert_eq!(ether_crc(&[0x01, 0x00, 0x5e, 0x00, 0x00, 0x01]), 0x7fa3_2d9b);
        assert_eq!(hash_bit(&[0x01, 0x00, 0x5e, 0x00, 0x00, 0x01]), 31);
        assert_eq!(hash_bit(&[0x33, 0x33, 0x00, 0x00, 0x00, 0x01]), 62);
    }

    #[test]
    fn hash_words_are_byte_swapped_high_word_first() {
        let mode = RxFilter {
            multicast: vec![
                [0x01, 0x00, 0x5e, 0x00, 0x00, 0x01],
                [0x33, 0x33, 0x00, 0x00, 0x00, 0x01],
            ],
            ..RxFilter::default()
        }
        .rx_mode(32);
        // Bit 31 lands in word 0, bit 62 in word 1.
        assert_eq!(mode.mar, [(1u32 << 30).swap_bytes(), (1u32 << 31).swap_bytes()]);
        assert!(mode.accept.contains(RxAccept::MULTICAST));
    }

    #[test]
    fn no_groups_accepts_only_unicast_and_broadcast() {
        let mode = RxFilter::default().rx_mode(32);
        assert_eq!(mode.accept, RxAccept::BROADCAST | RxAccept::MY_PHYS);
        assert_eq!(mode.mar, [0, 0]);
    }

    #[test]
    fn over_limit_falls_back_to_all_multicast() {
        let filter = RxFilter {
            multicast: (0..3u8).map(|i| [0x01, 0, 0x5e, 0, 0, i]).collect(),
            ..RxFilter::default()
        };
        let mode = filter.rx_mode(2);
        assert_eq!(
            mode.accept,
            RxAccept::BROADCAST | RxAccept::MULTICAST | RxAccept::MY_PHYS
        );
        assert_eq!(mode.mar, [u32::MAX; 2]);
    }

    #[test]
    fn promiscuous_accepts_everything() {
        let mode = RxFilter {
            promiscuous: true,
            ..RxFilter::default()
        }
        .rx_mode(32);
        assert!(mode.accept.contains(RxAccept::ALL_PHYS));
        assert_eq!(mode.mar, [u32::MAX; 2]);
    }
}
