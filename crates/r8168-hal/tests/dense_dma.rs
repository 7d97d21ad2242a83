use std::sync::Arc;

use r8168_hal::{DenseDma, DmaAccessKind, DmaMemory, DmaRegion};

#[test]
fn allocations_are_aligned_and_disjoint() {
    let dma = DenseDma::new(64 * 1024);
    let a = dma.alloc_coherent(100, 256).unwrap();
    let b = dma.alloc_coherent(100, 256).unwrap();
    let c = dma.alloc_coherent(8, 8).unwrap();

    assert_eq!(a % 256, 0);
    assert_eq!(b % 256, 0);
    assert_ne!(a, 0);
    assert!(b >= a + 100);
    assert!(c >= b + 100 || c + 8 <= b);
    assert_eq!(dma.live_allocations(), 3);

    dma.free_coherent(b, 100);
    assert_eq!(dma.live_allocations(), 2);
    // The freed hole is reused first-fit.
    assert_eq!(dma.alloc_coherent(100, 256), Some(b));
}

#[test]
fn nth_allocation_failure_is_one_shot() {
    let dma = DenseDma::new(64 * 1024);
    dma.fail_nth_allocation(2);

    assert!(dma.alloc_coherent(16, 16).is_some());
    assert!(dma.alloc_coherent(16, 16).is_none());
    assert!(dma.alloc_coherent(16, 16).is_some());
    assert_eq!(dma.total_allocations(), 2);
}

#[test]
fn exhaustion_and_out_of_space() {
    let dma = DenseDma::new(0x2000);
    dma.set_exhausted(true);
    assert!(dma.alloc_coherent(16, 16).is_none());
    dma.set_exhausted(false);

    assert!(dma.alloc_coherent(0x800, 16).is_some());
    assert!(dma.alloc_coherent(0x1000, 16).is_none());
}

#[test]
fn double_free_is_counted_not_fatal() {
    let dma = DenseDma::new(0x4000);
    let a = dma.alloc_coherent(32, 32).unwrap();
    dma.free_coherent(a, 32);
    dma.free_coherent(a, 32);
    assert_eq!(dma.total_frees(), 1);
    assert_eq!(dma.bad_frees(), 1);
}

#[test]
fn access_log_only_records_driver_side() {
    let dma = DenseDma::new(0x4000);
    let a = dma.alloc_coherent(32, 32).unwrap();

    dma.start_access_log();
    dma.write_u32(a, 0xdead_beef);
    dma.device_write_u32(a + 4, 0x1234_5678);
    assert_eq!(dma.read_u32(a + 4), 0x1234_5678);
    assert_eq!(dma.device_read_u32(a), 0xdead_beef);

    let log = dma.take_access_log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].kind, DmaAccessKind::Write);
    assert_eq!(log[1].kind, DmaAccessKind::Read);
    assert!(log[1].overlaps(a + 4, 4));
    assert!(!log[0].overlaps(a + 4, 4));
}

#[test]
fn region_frees_on_drop() {
    let dense = Arc::new(DenseDma::new(0x4000));
    let dma: Arc<dyn DmaMemory> = dense.clone();

    let region = DmaRegion::alloc(&dma, 64, 64).unwrap();
    region.write_at(8, &[1, 2, 3]);
    let mut out = [0u8; 3];
    region.read_at(8, &mut out);
    assert_eq!(out, [1, 2, 3]);
    assert_eq!(dense.live_allocations(), 1);

    drop(region);
    assert_eq!(dense.live_allocations(), 0);
    assert_eq!(dense.bad_frees(), 0);
}

#[cfg(not(target_arch = "wasm32"))]
mod prop {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        #[test]
        fn live_allocations_never_overlap(ops in proptest::collection::vec((1usize..512, 0u32..5, any::<bool>()), 1..64)) {
            let dma = DenseDma::new(256 * 1024);
            let mut live: Vec<(u64, usize)> = Vec::new();

            for (len, align_shift, free_one) in ops {
                if free_one && !live.is_empty() {
                    let (paddr, len) = live.remove(0);
                    dma.free_coherent(paddr, len);
                    continue;
                }
                let align = 1usize << (align_shift * 2);
                if let Some(paddr) = dma.alloc_coherent(len, align) {
                    prop_assert_eq!(paddr % align as u64, 0);
                    for &(other, other_len) in &live {
                        let disjoint = paddr + len as u64 <= other || other + other_len as u64 <= paddr;
                        prop_assert!(disjoint);
                    }
                    live.push((paddr, len));
                }
            }

            prop_assert_eq!(dma.live_allocations(), live.len());
            prop_assert_eq!(dma.bad_frees(), 0);
        }
    }
}
