//! Physical memory with Z180 MMU banking and shadow RAM.
//!
//! On the BNS board the 512 KB RAM sits *behind* the 256 KB ROM on the
//! data bus: write-enable only reaches RAM, so a write to a ROM address
//! lands in the RAM underneath and later reads return it.  The firmware
//! relies on this to patch its own vector table in place.
//!
//! The Z180 MMU divides the 64 KB logical space into three areas:
//! - Common Area 0: `0x0000` to `(CBAR[3:0] << 12) - 1`
//! - Bank Area:     `(CBAR[3:0] << 12)` to `(CBAR[7:4] << 12) - 1`
//! - Common Area 1: `(CBAR[7:4] << 12)` to `0xFFFF`
//!
//! The CPU engine translates logical addresses itself and hands the
//! memory callbacks 20-bit physical addresses; `translate` here is a
//! diagnostic mirror of the same arithmetic.

use std::collections::HashMap;
use std::io::{self, Write};

/// 20-bit physical address space (1 MB).
pub const PHYS_MASK: u32 = 0xF_FFFF;

pub const ROM_SIZE: usize = 256 * 1024;
pub const RAM_SIZE: usize = 512 * 1024;

// ── Written-address bit set ───────────────────────────────────

/// One bit per physical address (128 KB total).  Cheaper than a hash
/// set on the memory hot path.
struct WrittenSet {
    bits: Box<[u64]>,
}

impl WrittenSet {
    fn new() -> Self {
        Self {
            bits: vec![0u64; (PHYS_MASK as usize + 1) / 64].into_boxed_slice(),
        }
    }

    #[inline]
    fn insert(&mut self, addr: u32) {
        self.bits[(addr >> 6) as usize] |= 1 << (addr & 0x3F);
    }

    #[inline]
    fn contains(&self, addr: u32) -> bool {
        self.bits[(addr >> 6) as usize] & (1 << (addr & 0x3F)) != 0
    }

    fn clear(&mut self) {
        self.bits.fill(0);
    }
}

// ── Write tracing ─────────────────────────────────────────────

/// Physical-write watchpoints: single addresses, one range, or the
/// first N writes overall.
#[derive(Debug, Default)]
pub struct WriteWatch {
    pub addrs: Vec<u32>,
    pub range: Option<(u32, u32)>,
    pub first_n: u32,
}

impl WriteWatch {
    fn matches(&mut self, addr: u32) -> bool {
        if self.first_n > 0 {
            self.first_n -= 1;
            return true;
        }
        if let Some((lo, hi)) = self.range {
            if addr >= lo && addr <= hi {
                return true;
            }
        }
        self.addrs.contains(&addr)
    }

    fn armed(&self) -> bool {
        self.first_n > 0 || self.range.is_some() || !self.addrs.is_empty()
    }
}

// ── Memory ────────────────────────────────────────────────────

/// Which MMU area a logical address falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmuRegion {
    Common0,
    Bank,
    Common1,
}

pub struct Memory {
    rom: Vec<u8>,
    ram: Vec<u8>,
    rom_loaded: bool,
    written: WrittenSet,

    // MMU registers (mirror of the CPU engine's live state)
    pub cbr: u8,
    pub bbr: u8,
    pub cbar: u8,

    pub watch: WriteWatch,
    /// Per-address write counts, kept only when census is enabled.
    census: Option<HashMap<u32, u64>>,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            rom: vec![0; ROM_SIZE],
            ram: vec![0; RAM_SIZE],
            rom_loaded: false,
            written: WrittenSet::new(),
            cbr: 0x00,
            bbr: 0x00,
            cbar: 0xF0,
            watch: WriteWatch::default(),
            census: None,
        }
    }

    /// Copy a firmware image into ROM at physical 0.  Oversized images
    /// are truncated with a warning.
    pub fn load_rom(&mut self, data: &[u8]) {
        let len = if data.len() > ROM_SIZE {
            log::warn!(
                "ROM image is {} bytes, truncating to {} bytes",
                data.len(),
                ROM_SIZE
            );
            ROM_SIZE
        } else {
            data.len()
        };
        self.rom[..len].copy_from_slice(&data[..len]);
        self.rom_loaded = true;
    }

    pub fn rom_loaded(&self) -> bool {
        self.rom_loaded
    }

    pub fn rom_bytes(&self) -> &[u8] {
        &self.rom
    }

    /// Read a physical byte.  Shadow RAM wins over ROM once the address
    /// has been written; never-written ROM addresses read from ROM.
    pub fn read(&self, phys: u32) -> u8 {
        let phys = phys & PHYS_MASK;
        let i = phys as usize;
        if self.written.contains(phys) {
            return self.ram[i];
        }
        if self.rom_loaded && i < self.rom.len() {
            return self.rom[i];
        }
        if i < self.ram.len() {
            return self.ram[i];
        }
        0xFF
    }

    /// Write a physical byte.  Writes always target RAM; out-of-range
    /// writes are dropped.
    pub fn write(&mut self, phys: u32, value: u8) {
        let phys = phys & PHYS_MASK;
        if self.watch.armed() && self.watch.matches(phys) {
            eprintln!("[mem] W phys={phys:05X} val={value:02X}");
        }
        if let Some(census) = self.census.as_mut() {
            *census.entry(phys).or_insert(0) += 1;
        }
        let i = phys as usize;
        if i < self.ram.len() {
            self.ram[i] = value;
            self.written.insert(phys);
        }
    }

    /// Forget which addresses have been written (power-on state).
    /// RAM contents are left alone.
    pub fn reset_written_set(&mut self) {
        self.written.clear();
    }

    /// Field-selective MMU register update.
    pub fn set_mmu(&mut self, cbr: Option<u8>, bbr: Option<u8>, cbar: Option<u8>) {
        if let Some(v) = cbr {
            self.cbr = v;
        }
        if let Some(v) = bbr {
            self.bbr = v;
        }
        if let Some(v) = cbar {
            self.cbar = v;
        }
    }

    /// Logical → physical translation (diagnostic; the CPU engine does
    /// its own internally).
    pub fn translate(&self, logical: u16) -> (MmuRegion, u32) {
        let logical = logical as u32;
        let bank_start = ((self.cbar & 0x0F) as u32) << 12;
        let common1_start = ((self.cbar >> 4) as u32) << 12;

        let (region, physical) = if logical < bank_start {
            (MmuRegion::Common0, logical + ((self.cbr as u32) << 12))
        } else if logical < common1_start {
            (MmuRegion::Bank, logical - bank_start + ((self.bbr as u32) << 12))
        } else {
            (MmuRegion::Common1, logical + ((self.cbr as u32) << 12))
        };
        (region, physical & PHYS_MASK)
    }

    // ── Write census ──────────────────────────────────────────

    pub fn enable_write_census(&mut self) {
        if self.census.is_none() {
            self.census = Some(HashMap::new());
        }
    }

    /// Dump `(address, write_count)` as CSV, sorted by address.
    pub fn dump_write_census<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "address,writes")?;
        if let Some(census) = &self.census {
            let mut rows: Vec<_> = census.iter().collect();
            rows.sort_by_key(|(addr, _)| **addr);
            for (addr, count) in rows {
                writeln!(out, "{addr:05X},{count}")?;
            }
        }
        Ok(())
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}
