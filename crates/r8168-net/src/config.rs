use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::phy::{Duplex, LinkRequest, Speed};

/// Per-device driver tunables, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Received frames shorter than this are copied out and their DMA buffer recycled in place.
    pub rx_copybreak: usize,
    /// Above this many multicast addresses the filter accepts all multicast.
    pub multicast_filter_limit: usize,
    /// Maximum status-register iterations per interrupt.
    pub max_interrupt_work: u32,
    pub tx_ring_size: usize,
    pub rx_ring_size: usize,
    /// Worst-case descriptors one outbound packet may need; the Tx admission safety margin. At
    /// most half the Tx ring size.
    pub max_tx_fragments: usize,
    /// Drain from a budgeted poll task rather than inside the interrupt handler.
    pub poll_mode: bool,
    pub poll_weight: usize,
    pub link_poll_interval_ms: u64,
    pub config_check_interval_ms: u64,
    pub link: LinkRequest,
    pub rx_checksum: bool,
    pub tx_checksum: bool,
    pub vlan: bool,
    pub tso: bool,
    pub mtu: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            rx_copybreak: 200,
            multicast_filter_limit: 32,
            max_interrupt_work: 20,
            tx_ring_size: 1024,
            rx_ring_size: 1024,
            max_tx_fragments: 18,
            poll_mode: false,
            poll_weight: 64,
            link_poll_interval_ms: 1000,
            config_check_interval_ms: 2000,
            link: LinkRequest {
                autoneg: true,
                speed: Speed::Mbps1000,
                duplex: Duplex::Full,
            },
            rx_checksum: true,
            tx_checksum: true,
            vlan: false,
            tso: false,
            mtu: 1500,
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (which, size) in [("tx", self.tx_ring_size), ("rx", self.rx_ring_size)] {
            if size < 2 || !size.is_power_of_two() {
                return Err(ConfigError::RingSize { which, size });
            }
        }
        // The queue only restarts once a worst-case packet fits after the safety margin, so an
        // empty ring must hold two margins.
        if self.max_tx_fragments == 0 || 2 * self.max_tx_fragments > self.tx_ring_size {
            return Err(ConfigError::TxMargin {
                margin: self.max_tx_fragments,
                ring: self.tx_ring_size,
            });
        }
        if self.max_interrupt_work == 0 {
            return Err(ConfigError::InterruptWork);
        }
        if self.poll_weight == 0 {
            return Err(ConfigError::PollWeight);
        }
        if self.link_poll_interval_ms == 0 {
            return Err(ConfigError::Interval("link_poll_interval_ms"));
        }
        if self.config_check_interval_ms == 0 {
            return Err(ConfigError::Interval("config_check_interval_ms"));
        }
        Ok(())
    }
}
