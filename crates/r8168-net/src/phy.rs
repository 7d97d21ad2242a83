//! Link/PHY state machine.
//!
//! Link state is polled, not interrupt driven: a periodic check compares the chip's link flag
//! with the last observed value and announces carrier changes upstream. Speed/duplex selection
//! either programs the advertisement registers and restarts autonegotiation or, for a true
//! fixed 10/100 link, forces BMCR. Gigabit always negotiates.

use serde::{Deserialize, Serialize};

use crate::access::Registers;
use crate::mdio::*;
use crate::regs::{PhyStatus, PHY_STATUS};
use crate::variant::ChipVariant;

/// PHY reset completion poll: 2500 attempts, 1ms apart.
const PHY_RESET_POLL_ATTEMPTS: u32 = 2500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Speed {
    Mbps10,
    Mbps100,
    Mbps1000,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Duplex {
    Half,
    Full,
}

/// Requested link configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkRequest {
    pub autoneg: bool,
    pub speed: Speed,
    pub duplex: Duplex,
}

impl Default for LinkRequest {
    fn default() -> Self {
        Self {
            autoneg: true,
            speed: Speed::Mbps1000,
            duplex: Duplex::Full,
        }
    }
}

/// Current link as reported by the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub link_up: bool,
    pub speed: Option<Speed>,
    pub duplex: Duplex,
    pub autoneg: bool,
}

/// Register values that realise a [`LinkRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkProgram {
    /// Write ADVERTISE and CTRL1000, then restart autonegotiation.
    Advertise { advertise: u16, ctrl1000: u16 },
    /// Write BMCR directly.
    Forced { bmcr: u16 },
}

/// Computes the PHY programming for a request. `advertise_base`/`ctrl1000_base` are the current
/// register values; speed and pause bits are replaced, others preserved.
pub fn link_program(req: LinkRequest, advertise_base: u16, ctrl1000_base: u16) -> LinkProgram {
    if req.autoneg || req.speed == Speed::Mbps1000 {
        let mut advertise = advertise_base
            & !(ADVERTISE_10HALF
                | ADVERTISE_10FULL
                | ADVERTISE_100HALF
                | ADVERTISE_100FULL
                | ADVERTISE_PAUSE_CAP
                | ADVERTISE_PAUSE_ASYM);
        let mut ctrl1000 = ctrl1000_base & !(ADVERTISE_1000HALF | ADVERTISE_1000FULL);

        advertise |= match (req.speed, req.duplex) {
            (Speed::Mbps10, Duplex::Half) => ADVERTISE_10HALF,
            (Speed::Mbps10, Duplex::Full) => ADVERTISE_10HALF | ADVERTISE_10FULL,
            (Speed::Mbps100, Duplex::Half) => ADVERTISE_10HALF | ADVERTISE_10FULL | ADVERTISE_100HALF,
            (Speed::Mbps100, Duplex::Full) => {
                ADVERTISE_10HALF | ADVERTISE_10FULL | ADVERTISE_100HALF | ADVERTISE_100FULL
            }
            (Speed::Mbps1000, _) => {
                ctrl1000 |= ADVERTISE_1000HALF | ADVERTISE_1000FULL;
                ADVERTISE_10HALF | ADVERTISE_10FULL | ADVERTISE_100HALF | ADVERTISE_100FULL
            }
        };
        advertise |= ADVERTISE_CSMA;

        LinkProgram::Advertise {
            advertise,
            ctrl1000,
        }
    } else {
        let mut bmcr = 0;
        if req.speed == Speed::Mbps100 {
            bmcr |= BMCR_SPEED100;
        }
        if req.duplex == Duplex::Full {
            bmcr |= BMCR_FULLDPLX;
        }
        LinkProgram::Forced { bmcr }
    }
}

/// Capability interface of one PHY family.
pub trait PhyOps: Send + Sync {
    fn link_ok(&self, regs: &Registers) -> bool;

    /// Resets the PHY and waits (bounded) for the reset to complete. Returns `false` on timeout.
    fn reset(&self, regs: &Registers, mdio: &Mdio) -> bool;

    fn set_speed(&self, mdio: &Mdio, req: LinkRequest);

    fn settings(&self, regs: &Registers, req: LinkRequest) -> LinkSettings;

    fn power_up(&self, mdio: &Mdio);

    fn power_down(&self, mdio: &Mdio);
}

/// The integrated GMII PHY of the RTL8168 family.
#[derive(Debug, Clone, Copy)]
pub struct GmiiPhy {
    variant: ChipVariant,
}

impl GmiiPhy {
    pub fn new(variant: ChipVariant) -> Self {
        Self { variant }
    }
}

impl PhyOps for GmiiPhy {
    fn link_ok(&self, regs: &Registers) -> bool {
        PhyStatus::from_bits_retain(regs.read8(PHY_STATUS)).contains(PhyStatus::LINK_STATUS)
    }

    fn reset(&self, regs: &Registers, mdio: &Mdio) -> bool {
        {
            let phy = mdio.lock();
            let _ = phy.select_page(0);
            let _ = phy.update(MII_BMCR, 0, BMCR_RESET);
        }

        for _ in 0..PHY_RESET_POLL_ATTEMPTS {
            let bmcr = mdio.lock().read_or_failed(MII_BMCR);
            if bmcr != MDIO_READ_FAILED && bmcr & BMCR_RESET == 0 {
                return true;
            }
            regs.delay_ms(1);
        }
        tracing::warn!("PHY reset did not complete");
        false
    }

    fn set_speed(&self, mdio: &Mdio, req: LinkRequest) {
        let phy = mdio.lock();
        let _ = phy.select_page(0);
        let advertise = phy.read(MII_ADVERTISE).unwrap_or(0);
        let ctrl1000 = phy.read(MII_CTRL1000).unwrap_or(0);

        match link_program(req, advertise, ctrl1000) {
            LinkProgram::Advertise {
                advertise,
                ctrl1000,
            } => {
                let _ = phy.write(MII_ADVERTISE, advertise);
                let _ = phy.write(MII_CTRL1000, ctrl1000);
                let _ = phy.write(MII_BMCR, BMCR_RESET | BMCR_ANENABLE | BMCR_ANRESTART);
            }
            LinkProgram::Forced { bmcr } => {
                let _ = phy.write(MII_BMCR, bmcr);
            }
        }
        tracing::debug!(?req, "programmed link");
    }

    fn settings(&self, regs: &Registers, req: LinkRequest) -> LinkSettings {
        let status = PhyStatus::from_bits_retain(regs.read8(PHY_STATUS));
        let speed = if status.contains(PhyStatus::SPEED_1000_FULL) {
            Some(Speed::Mbps1000)
        } else if status.contains(PhyStatus::SPEED_100) {
            Some(Speed::Mbps100)
        } else if status.contains(PhyStatus::SPEED_10) {
            Some(Speed::Mbps10)
        } else {
            None
        };
        let duplex = if status.intersects(PhyStatus::FULL_DUP | PhyStatus::SPEED_1000_FULL) {
            Duplex::Full
        } else {
            Duplex::Half
        };
        LinkSettings {
            link_up: status.contains(PhyStatus::LINK_STATUS),
            speed,
            duplex,
            autoneg: req.autoneg,
        }
    }

    fn power_up(&self, mdio: &Mdio) {
        let phy = mdio.lock();
        let _ = phy.select_page(0);
        if !self.variant.is_8168e() {
            let _ = phy.write(0x0e, 0x0000);
        }
        let _ = phy.write(MII_BMCR, BMCR_ANENABLE);
    }

    fn power_down(&self, mdio: &Mdio) {
        let phy = mdio.lock();
        let _ = phy.select_page(0);
        if self.variant.is_8168e() {
            let _ = phy.write(MII_BMCR, BMCR_ANENABLE | BMCR_PDOWN);
        } else {
            let _ = phy.write(0x0e, 0x0200);
            let _ = phy.write(MII_BMCR, BMCR_PDOWN);
        }
    }
}

/// Polled link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    LinkDown,
    LinkUp,
}

/// Last observed link state plus the requested configuration.
#[derive(Debug, Clone, Copy)]
pub struct LinkState {
    pub request: LinkRequest,
    pub phase: LinkPhase,
}

impl LinkState {
    pub fn new(request: LinkRequest) -> Self {
        Self {
            request,
            phase: LinkPhase::LinkDown,
        }
    }

    /// Records an observation; returns the new phase if it changed.
    pub fn observe(&mut self, link_ok: bool) -> Option<LinkPhase> {
        let phase = if link_ok {
            LinkPhase::LinkUp
        } else {
            LinkPhase::LinkDown
        };
        (phase != self.phase).then(|| {
            self.phase = phase;
            phase
        })
    }
}

/// RTL8168DP rev 1 analog retune after a link change.
pub(crate) fn dp_10mbps_analog(regs: &Registers, mdio: &Mdio) {
    let status = PhyStatus::from_bits_retain(regs.read8(PHY_STATUS));
    let value = if status.contains(PhyStatus::LINK_STATUS | PhyStatus::SPEED_10) {
        0x04ee
    } else {
        0x01ee
    };
    let phy = mdio.lock();
    let _ = phy.select_page(0);
    let _ = phy.write(0x10, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(autoneg: bool, speed: Speed, duplex: Duplex) -> LinkRequest {
        LinkRequest {
            autoneg,
            speed,
            duplex,
        }
    }

    #[test]
    fn gigabit_always_negotiates() {
        let program = link_program(req(false, Speed::Mbps1000, Duplex::Full), 0, 0);
        assert_eq!(
            program,
            LinkProgram::Advertise {
                advertise: ADVERTISE_CSMA
                    | ADVERTISE_10HALF
                    | ADVERTISE_10FULL
                    | ADVERTISE_100HALF
                    | ADVERTISE_100FULL,
                ctrl1000: ADVERTISE_1000HALF | ADVERTISE_1000FULL,
            }
        );
    }

    #[test]
    fn autoneg_100_half_excludes_faster_modes_and_pause() {
        let base = ADVERTISE_PAUSE_CAP | ADVERTISE_PAUSE_ASYM | ADVERTISE_100FULL;
        let LinkProgram::Advertise {
            advertise,
            ctrl1000,
        } = link_program(req(true, Speed::Mbps100, Duplex::Half), base, ADVERTISE_1000FULL)
        else {
            panic!("expected advertisement");
        };
        assert_eq!(
            advertise,
            ADVERTISE_CSMA | ADVERTISE_10HALF | ADVERTISE_10FULL | ADVERTISE_100HALF
        );
        assert_eq!(ctrl1000, 0);
    }

    #[test]
    fn fixed_speeds_force_bmcr() {
        assert_eq!(
            link_program(req(false, Speed::Mbps100, Duplex::Full), 0, 0),
            LinkProgram::Forced {
                bmcr: BMCR_SPEED100 | BMCR_FULLDPLX
            }
        );
        assert_eq!(
            link_program(req(false, Speed::Mbps10, Duplex::Half), 0, 0),
            LinkProgram::Forced { bmcr: 0 }
        );
    }

    #[test]
    fn link_state_reports_transitions_once() {
        let mut state = LinkState::new(LinkRequest::default());
        assert_eq!(state.observe(false), None);
        assert_eq!(state.observe(true), Some(LinkPhase::LinkUp));
        assert_eq!(state.observe(true), None);
        assert_eq!(state.observe(false), Some(LinkPhase::LinkDown));
    }
}
