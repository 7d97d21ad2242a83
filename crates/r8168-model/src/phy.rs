use std::collections::HashMap;

const MII_BMCR: u8 = 0x00;
const MII_BMSR: u8 = 0x01;
const MII_PHYSID1: u8 = 0x02;
const MII_PHYSID2: u8 = 0x03;
const MII_PAGE_SELECT: u8 = 0x1f;

const BMCR_RESET: u16 = 0x8000;
const BMCR_ANENABLE: u16 = 0x1000;
const BMSR_LSTATUS: u16 = 0x0004;
const BMSR_ANEGCOMPLETE: u16 = 0x0020;
const BMSR_CAPS: u16 = 0x7949;

/// Paged GMII register file.
#[derive(Debug)]
pub(crate) struct PhyModel {
    page: u16,
    regs: HashMap<(u16, u8), u16>,
    pub link_up: bool,
    pub reset_stuck: bool,
    pub writes: Vec<(u16, u8, u16)>,
}

impl Default for PhyModel {
    fn default() -> Self {
        let mut regs = HashMap::new();
        regs.insert((0, MII_BMCR), BMCR_ANENABLE);
        Self {
            page: 0,
            regs,
            link_up: false,
            reset_stuck: false,
            writes: Vec::new(),
        }
    }
}

impl PhyModel {
    pub fn read(&self, reg: u8) -> u16 {
        match (self.page, reg) {
            (_, MII_PAGE_SELECT) => self.page,
            (0, MII_BMSR) => {
                let mut bmsr = BMSR_CAPS;
                if self.link_up {
                    bmsr |= BMSR_LSTATUS | BMSR_ANEGCOMPLETE;
                }
                bmsr
            }
            (0, MII_PHYSID1) => 0x001c,
            (0, MII_PHYSID2) => 0xc912,
            (page, reg) => self.regs.get(&(page, reg)).copied().unwrap_or(0),
        }
    }

    pub fn write(&mut self, reg: u8, value: u16) {
        self.writes.push((self.page, reg, value));
        if reg == MII_PAGE_SELECT {
            self.page = value;
            return;
        }
        let value = if self.page == 0 && reg == MII_BMCR && !self.reset_stuck {
            value & !BMCR_RESET
        } else {
            value
        };
        self.regs.insert((self.page, reg), value);
    }

    pub fn get(&self, page: u16, reg: u8) -> u16 {
        self.regs.get(&(page, reg)).copied().unwrap_or(0)
    }
}
