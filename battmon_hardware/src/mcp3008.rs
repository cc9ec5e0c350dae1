use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

use crate::error::{HwError, Result};
use battmon_traits::AnalogInput;

/// MCP3008 10-bit SPI ADC. One `Mcp3008` owns the bus; `channel()` hands
/// out per-channel `AnalogInput` views sharing it.
pub struct Mcp3008 {
    spi: Rc<RefCell<Spi>>,
}

impl Mcp3008 {
    /// Open the converter on SPI0/CE0, the reference wiring.
    pub fn open(clock_hz: u32) -> Result<Self> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, clock_hz, Mode::Mode0)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        Ok(Self {
            spi: Rc::new(RefCell::new(spi)),
        })
    }

    pub fn channel(&self, channel: u8) -> Mcp3008Channel {
        Mcp3008Channel {
            spi: Rc::clone(&self.spi),
            channel: channel & 0x07,
        }
    }
}

pub struct Mcp3008Channel {
    spi: Rc<RefCell<Spi>>,
    channel: u8,
}

impl Mcp3008Channel {
    fn read(&self) -> Result<u16> {
        // Start bit, single-ended mode + channel, then clock out 10 bits.
        let tx = [0x01, (0x08 | self.channel) << 4, 0x00];
        let mut rx = [0u8; 3];
        self.spi
            .borrow_mut()
            .transfer(&mut rx, &tx)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        let raw = (u16::from(rx[1] & 0x03) << 8) | u16::from(rx[2]);
        trace!(channel = self.channel, raw, "mcp3008 read");
        Ok(raw)
    }
}

impl AnalogInput for Mcp3008Channel {
    fn read_raw(&mut self) -> std::result::Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.read()?)
    }
}
