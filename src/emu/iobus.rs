//! I/O port routing.
//!
//! The Z180 port space is 8-bit, so the bus is two flat 256-entry
//! tables (read and write routed independently — the watchdog shares
//! port 0x80 with the display, writes to the watchdog, reads from the
//! display).  The actual chips live on the board; the bus only answers
//! "which device owns this port", the way the C64 PLA routes `$Dxxx`
//! pages to chip ids.

use std::collections::VecDeque;

/// Bounded I/O trace ring capacity.
pub const IO_TRACE_CAP: usize = 4096;

/// Which device handles a given port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDevice {
    Ssi263,
    Keyboard,
    KeyClear,
    Display,
    Watchdog,
    MmuCbr,
    MmuBbr,
    MmuCbar,
    /// Z180 interrupt/trap control; decoded for trace only.
    Itc,
    Unmapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDir {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy)]
pub struct IoTraceEntry {
    pub dir: IoDir,
    pub port: u8,
    pub value: u8,
}

pub struct IoBus {
    read_map: [PortDevice; 256],
    write_map: [PortDevice; 256],
    log: VecDeque<IoTraceEntry>,
    pub tracing: bool,
}

impl IoBus {
    pub fn new() -> Self {
        Self {
            read_map: [PortDevice::Unmapped; 256],
            write_map: [PortDevice::Unmapped; 256],
            log: VecDeque::new(),
            tracing: false,
        }
    }

    /// Bind a port.  `None` leaves the existing binding for that
    /// direction untouched; a `Some` overrides it.
    pub fn register(&mut self, port: u8, read: Option<PortDevice>, write: Option<PortDevice>) {
        if let Some(dev) = read {
            self.read_map[port as usize] = dev;
        }
        if let Some(dev) = write {
            self.write_map[port as usize] = dev;
        }
    }

    /// Bind every port in `[start, end]` inclusive.
    pub fn register_range(
        &mut self,
        start: u8,
        end: u8,
        read: Option<PortDevice>,
        write: Option<PortDevice>,
    ) {
        for port in start..=end {
            self.register(port, read, write);
        }
    }

    pub fn route_read(&self, port: u8) -> PortDevice {
        self.read_map[port as usize]
    }

    pub fn route_write(&self, port: u8) -> PortDevice {
        self.write_map[port as usize]
    }

    /// Record one bus transaction in the trace ring.
    pub fn trace(&mut self, dir: IoDir, port: u8, value: u8) {
        if !self.tracing {
            return;
        }
        if self.log.len() == IO_TRACE_CAP {
            self.log.pop_front();
        }
        self.log.push_back(IoTraceEntry { dir, port, value });
    }

    /// Formatted trace entries, newest last.  `limit` keeps only the
    /// most recent N.
    pub fn dump_log(&self, limit: Option<usize>) -> Vec<String> {
        let skip = match limit {
            Some(n) => self.log.len().saturating_sub(n),
            None => 0,
        };
        self.log
            .iter()
            .skip(skip)
            .map(|e| {
                let dir = match e.dir {
                    IoDir::Read => 'R',
                    IoDir::Write => 'W',
                };
                format!("{dir} port={:02X} val={:02X}", e.port, e.value)
            })
            .collect()
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }
}

impl Default for IoBus {
    fn default() -> Self {
        Self::new()
    }
}
