//! Digital inputs and outputs of the Cover UI board.

use anyhow::bail;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::protocol::Result;

/// Direct pins plus the port expander.
///
/// Levels are electrical: `true` is high. Buttons pull their line low when
/// pressed.
pub trait DigitalIo: Send + Sync {
    /// Reads the expander input port, bits outside `mask` are zero.
    fn read_expander_bits(&self, mask: u32) -> Result<u32>;
    fn read_gpio(&self, pin: u8) -> Result<bool>;
    fn write_gpio(&self, pin: u8, level: bool) -> Result<()>;
}

#[derive(Default)]
struct Lines {
    expander: u32,
    inputs: HashMap<u8, bool>,
    outputs: HashMap<u8, bool>,
    expander_reads: u64,
    failing: bool,
}

/// In-memory pins for host runs and tests. Every input idles high.
pub struct SimulatedIo {
    lines: Mutex<Lines>,
}

impl Default for SimulatedIo {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedIo {
    pub fn new() -> Self {
        SimulatedIo {
            lines: Mutex::new(Lines {
                expander: u32::MAX,
                ..Lines::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lines> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_input(&self, pin: u8, level: bool) {
        self.lock().inputs.insert(pin, level);
    }

    pub fn set_expander_bits(&self, mask: u32, level: bool) {
        let mut lines = self.lock();
        if level {
            lines.expander |= mask;
        } else {
            lines.expander &= !mask;
        }
    }

    /// Last level written to `pin`, `None` if never written.
    pub fn output(&self, pin: u8) -> Option<bool> {
        self.lock().outputs.get(&pin).copied()
    }

    pub fn expander_reads(&self) -> u64 {
        self.lock().expander_reads
    }

    /// Makes every following call fail, like a dead bus.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }
}

impl DigitalIo for SimulatedIo {
    fn read_expander_bits(&self, mask: u32) -> Result<u32> {
        let mut lines = self.lock();
        if lines.failing {
            bail!("expander not responding");
        }
        lines.expander_reads += 1;
        Ok(lines.expander & mask)
    }

    fn read_gpio(&self, pin: u8) -> Result<bool> {
        let lines = self.lock();
        if lines.failing {
            bail!("gpio {} not readable", pin);
        }
        Ok(lines.inputs.get(&pin).copied().unwrap_or(true))
    }

    fn write_gpio(&self, pin: u8, level: bool) -> Result<()> {
        let mut lines = self.lock();
        if lines.failing {
            bail!("gpio {} not writable", pin);
        }
        lines.outputs.insert(pin, level);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_idle_high() {
        let io = SimulatedIo::new();
        assert!(io.read_gpio(3).unwrap());
        assert_eq!(io.read_expander_bits(0x00ff).unwrap(), 0x00ff);

        io.set_expander_bits(1 << 3, false);
        assert_eq!(io.read_expander_bits(0x000f).unwrap(), 0x0007);
        assert_eq!(io.expander_reads(), 2);
    }

    #[test]
    fn failing_bus() {
        let io = SimulatedIo::new();
        io.set_failing(true);
        assert!(io.read_expander_bits(1).is_err());
        assert!(io.write_gpio(1, true).is_err());
        assert_eq!(io.output(1), None);
    }
}
