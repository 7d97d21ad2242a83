mod common;

use std::sync::Arc;

use common::*;
use r8168_hal::{Clock, DenseDma, FakeClock, Mmio};
use r8168_model::{ChipModel, Faults};
use r8168_net::mdio::{MII_PHYSID1, MII_PHYSID2};
use r8168_net::regs::{DP_GATE_BIT, DP_GATE_REG};
use r8168_net::{AccessError, EriType, Mdio, MdioTransport, Registers};

fn bench(signature: u32) -> (Arc<ChipModel>, Arc<FakeClock>, Registers) {
    let dma = Arc::new(DenseDma::new(64 * 1024));
    let model = Arc::new(ChipModel::new(signature, MAC, dma));
    let clock = Arc::new(FakeClock::new());
    let regs = Registers::new(
        model.clone() as Arc<dyn Mmio>,
        clock.clone() as Arc<dyn Clock>,
    );
    (model, clock, regs)
}

fn stuck(model: &ChipModel) {
    model.set_faults(Faults {
        indirect_stuck: true,
        ..Faults::default()
    });
}

#[test]
fn eri_write_across_a_word_boundary_preserves_neighbours() {
    let (model, _, regs) = bench(signature::RTL8168E2);
    model.set_eri_word(0, 0x0c, 0x0000_1234);
    model.set_eri_word(0, 0x10, 0xffff_0000);

    regs.eri_write(0x0e, 4, 0xaabb_ccdd, EriType::Exgmac).unwrap();
    assert_eq!(model.eri_word(0, 0x0c), 0xccdd_1234);
    assert_eq!(model.eri_word(0, 0x10), 0xffff_aabb);

    assert_eq!(regs.eri_read(0x0e, 4, EriType::Exgmac), Ok(0xaabb_ccdd));
    assert_eq!(regs.eri_read(0x0d, 2, EriType::Exgmac), Ok(0xdd12));
    assert_eq!(regs.eri_read(0x12, 1, EriType::Exgmac), Ok(0xff));
}

#[test]
fn eri_address_spaces_are_separate() {
    let (model, _, regs) = bench(signature::RTL8168E2);
    regs.eri_write(0x40, 4, 0x0102_0304, EriType::Oob).unwrap();
    assert_eq!(model.eri_word(EriType::Oob as u32, 0x40), 0x0102_0304);
    assert_eq!(model.eri_word(EriType::Exgmac as u32, 0x40), 0);
}

#[test]
fn eri_rejects_bad_lengths() {
    let (_, _, regs) = bench(signature::RTL8168E2);
    assert_eq!(
        regs.eri_read(0x10, 5, EriType::Exgmac),
        Err(AccessError::InvalidLength(5))
    );
    assert_eq!(
        regs.eri_write(0x10, 0, 0, EriType::Exgmac),
        Err(AccessError::InvalidLength(0))
    );
}

#[test]
fn csi_round_trip() {
    let (model, _, regs) = bench(signature::RTL8168C2);
    regs.csi_write(0x070c, 0x1234_5678).unwrap();
    assert_eq!(model.csi_word(0x070c), 0x1234_5678);
    assert_eq!(regs.csi_read(0x070c), Ok(0x1234_5678));
}

#[test]
fn ephy_round_trip() {
    let (model, _, regs) = bench(signature::RTL8168D1);
    regs.ephy_write(0x19, 0xff64).unwrap();
    assert_eq!(model.ephy_reg(0x19), 0xff64);
    assert_eq!(regs.ephy_read(0x19), Ok(0xff64));
}

#[test]
fn stuck_indirect_access_times_out_after_a_bounded_wait() {
    let (model, clock, regs) = bench(signature::RTL8168D1);
    stuck(&model);

    assert_eq!(
        regs.ephy_write(0x01, 0x1234),
        Err(AccessError::Timeout { what: "EPHY write" })
    );
    assert_eq!(
        regs.csi_read(0x070c),
        Err(AccessError::Timeout { what: "CSI read" })
    );
    assert!(matches!(
        regs.eri_read(0x10, 4, EriType::Exgmac),
        Err(AccessError::Timeout { .. })
    ));
    // Ten 100us polls plus settle time each.
    assert!(clock.waited_us() < 10_000);
}

#[test]
fn efuse_read_returns_the_programmed_byte() {
    let (model, _, regs) = bench(signature::RTL8168D1);
    model.set_efuse(0x10, 0xab);
    assert_eq!(regs.efuse_read(0x10), Ok(0xab));
    assert_eq!(regs.efuse_read(0x11), Ok(0xff));

    stuck(&model);
    assert_eq!(
        regs.efuse_read(0x10),
        Err(AccessError::Timeout { what: "efuse read" })
    );
}

#[test]
fn ocp_round_trip() {
    let (_, _, regs) = bench(signature::RTL8168DP1);
    regs.ocp_write(0xf, 0x012, 0xdead_beef).unwrap();
    assert_eq!(regs.ocp_read(0xf, 0x012), Ok(0xdead_beef));
}

#[test]
fn mdio_over_phyar() {
    let (model, _, regs) = bench(signature::RTL8168C2);
    let mdio = Mdio::new(regs, MdioTransport::Phyar);
    let phy = mdio.lock();
    assert_eq!(phy.read(MII_PHYSID1), Ok(0x001c));
    assert_eq!(phy.read(MII_PHYSID2), Ok(0xc912));

    phy.select_page(2).unwrap();
    phy.write(0x10, 0xbeef).unwrap();
    phy.select_page(0).unwrap();
    assert_eq!(model.phy_reg(2, 0x10), 0xbeef);
    assert_eq!(phy.read(0x10), Ok(0));
}

#[test]
fn mdio_tunnelled_through_ocp() {
    let (model, _, regs) = bench(signature::RTL8168DP1);
    let mdio = Mdio::new(regs, MdioTransport::Ocp);
    let phy = mdio.lock();
    phy.write(0x0e, 0x4321).unwrap();
    assert_eq!(model.phy_reg(0, 0x0e), 0x4321);
    assert_eq!(phy.read(0x0e), Ok(0x4321));
    assert_eq!(phy.read(MII_PHYSID1), Ok(0x001c));
}

#[test]
fn gated_mdio_drops_the_gate_around_each_access() {
    let (model, _, regs) = bench(signature::RTL8168DP2);
    model.set_faults(Faults {
        mdio_gate_enforced: true,
        ..Faults::default()
    });
    regs.write32(DP_GATE_REG, DP_GATE_BIT);

    let plain = Mdio::new(regs.clone(), MdioTransport::Phyar);
    assert!(plain.lock().read(MII_PHYSID1).is_err());

    let gated = Mdio::new(regs.clone(), MdioTransport::GatedPhyar);
    assert_eq!(gated.lock().read(MII_PHYSID1), Ok(0x001c));
    assert_ne!(regs.read32(DP_GATE_REG) & DP_GATE_BIT, 0);
}

#[test]
fn stuck_mdio_reads_report_failure() {
    let (model, _, regs) = bench(signature::RTL8168C2);
    model.set_faults(Faults {
        mdio_stuck: true,
        ..Faults::default()
    });
    let mdio = Mdio::new(regs, MdioTransport::Phyar);
    let phy = mdio.lock();
    assert_eq!(phy.read_or_failed(MII_PHYSID1), 0xffff);
    assert_eq!(
        phy.write(0x10, 1),
        Err(AccessError::Timeout { what: "MDIO write" })
    );
}
