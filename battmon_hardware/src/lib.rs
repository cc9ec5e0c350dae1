//! Hardware backends for the battery monitor.
//!
//! The default build ships simulated implementations of every seam so the
//! full pipeline runs on a desk. The `hardware` feature adds the real
//! backends: an MCP3008 ADC over SPI, a GPIO relay (`rppal`) and a UART
//! link (`serialport`).

pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod mcp3008;

use std::io::Write as _;

use battmon_traits::{AnalogInput, Console, Relay, SerialLink};

use crate::error::HwError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Simulated battery channel: a voltage that droops a fixed amount per
/// sample. Droop advances every second read to match the sampler's
/// discard-then-read discipline.
pub struct SimulatedBatteryAdc {
    volts: f64,
    droop_per_sample: f64,
    divider_ratio: f64,
    vref: f64,
    max_code: u16,
    reads: usize,
}

impl SimulatedBatteryAdc {
    pub fn new(
        start_volts: f64,
        droop_per_sample: f64,
        divider_ratio: f64,
        vref: f64,
        max_code: u16,
    ) -> Self {
        Self {
            volts: start_volts,
            droop_per_sample,
            divider_ratio,
            vref,
            max_code,
            reads: 0,
        }
    }

    fn code(&self) -> u16 {
        let adc_volts = (self.volts * self.divider_ratio).clamp(0.0, self.vref);
        ((adc_volts / self.vref) * f64::from(self.max_code)).round() as u16
    }
}

impl AnalogInput for SimulatedBatteryAdc {
    fn read_raw(&mut self) -> Result<u16, BoxError> {
        let code = self.code();
        self.reads += 1;
        if self.reads % 2 == 0 {
            self.volts = (self.volts - self.droop_per_sample).max(0.0);
        }
        Ok(code)
    }
}

/// Simulated current-sensor channel holding a constant output voltage.
pub struct SimulatedSensorAdc {
    volts: f64,
    divider_ratio: f64,
    vref: f64,
    max_code: u16,
}

impl SimulatedSensorAdc {
    pub fn new(volts: f64, divider_ratio: f64, vref: f64, max_code: u16) -> Self {
        Self {
            volts,
            divider_ratio,
            vref,
            max_code,
        }
    }
}

impl AnalogInput for SimulatedSensorAdc {
    fn read_raw(&mut self) -> Result<u16, BoxError> {
        let adc_volts = (self.volts * self.divider_ratio).clamp(0.0, self.vref);
        Ok(((adc_volts / self.vref) * f64::from(self.max_code)).round() as u16)
    }
}

/// Simulated companion device: acknowledges the first notice it receives.
#[derive(Default)]
pub struct SimulatedSerial {
    pending_reply: Option<String>,
}

impl SimulatedSerial {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SerialLink for SimulatedSerial {
    fn write_line(&mut self, line: &str) -> Result<(), BoxError> {
        tracing::info!(line, "serial write (simulated)");
        self.pending_reply = Some("ACK".to_string());
        Ok(())
    }

    fn poll_line(&mut self) -> Result<Option<String>, BoxError> {
        Ok(self.pending_reply.take())
    }
}

/// Simulated relay.
#[derive(Default)]
pub struct SimulatedRelay {
    engaged: bool,
}

impl SimulatedRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }
}

impl Relay for SimulatedRelay {
    fn engage(&mut self) -> Result<(), BoxError> {
        self.engaged = true;
        tracing::info!("relay engaged (simulated)");
        Ok(())
    }
}

/// Blocking operator console on stdin/stdout.
#[derive(Default)]
pub struct StdinConsole;

impl StdinConsole {
    pub fn new() -> Self {
        Self
    }
}

impl Console for StdinConsole {
    fn prompt_line(&mut self, prompt: &str) -> Result<String, BoxError> {
        print!("{prompt}");
        std::io::stdout().flush().map_err(HwError::Io)?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map_err(HwError::Io)?;
        Ok(line)
    }
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use hardware_relay::GpioRelay;

#[cfg(all(feature = "hardware", target_os = "linux"))]
mod hardware_relay {
    use super::BoxError;
    use crate::error::HwError;
    use battmon_traits::Relay;
    use rppal::gpio::{Gpio, OutputPin};

    /// Relay driven by a GPIO pin. `active_high` selects which level cuts
    /// the companion's power; it is deployment wiring, not logic.
    pub struct GpioRelay {
        pin: OutputPin,
        active_high: bool,
    }

    impl GpioRelay {
        pub fn new(pin: u8, active_high: bool) -> Result<Self, HwError> {
            let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
            let mut pin = gpio
                .get(pin)
                .map_err(|e| HwError::Gpio(e.to_string()))?
                .into_output();
            // Idle = power delivered.
            if active_high {
                pin.set_low();
            } else {
                pin.set_high();
            }
            Ok(Self { pin, active_high })
        }
    }

    impl Relay for GpioRelay {
        fn engage(&mut self) -> Result<(), BoxError> {
            if self.active_high {
                self.pin.set_high();
            } else {
                self.pin.set_low();
            }
            tracing::info!(active_high = self.active_high, "relay engaged");
            Ok(())
        }
    }
}

#[cfg(feature = "hardware")]
pub use uart::UartLink;

#[cfg(feature = "hardware")]
mod uart {
    use super::BoxError;
    use crate::error::HwError;
    use battmon_traits::SerialLink;
    use serialport::SerialPort;
    use std::io::Read;
    use std::time::Duration;

    /// Line-oriented UART link to the companion device.
    pub struct UartLink {
        port: Box<dyn SerialPort>,
        rx_buf: Vec<u8>,
    }

    impl UartLink {
        pub fn open(path: &str, baud: u32) -> Result<Self, HwError> {
            let port = serialport::new(path, baud)
                .timeout(Duration::from_millis(10))
                .open()
                .map_err(|e| HwError::Serial(e.to_string()))?;
            Ok(Self {
                port,
                rx_buf: Vec::new(),
            })
        }

        fn take_line(&mut self) -> Option<String> {
            let nl = self.rx_buf.iter().position(|&b| b == b'\n')?;
            let line: Vec<u8> = self.rx_buf.drain(..=nl).collect();
            Some(String::from_utf8_lossy(&line).into_owned())
        }
    }

    impl SerialLink for UartLink {
        fn write_line(&mut self, line: &str) -> Result<(), BoxError> {
            use std::io::Write;
            self.port
                .write_all(format!("{line}\n").as_bytes())
                .map_err(HwError::Io)?;
            tracing::debug!(line, "uart write");
            Ok(())
        }

        fn poll_line(&mut self) -> Result<Option<String>, BoxError> {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }
            let mut chunk = [0u8; 64];
            match self.port.read(&mut chunk) {
                Ok(0) => {}
                Ok(n) => self.rx_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => return Err(Box::new(HwError::Io(e))),
            }
            Ok(self.take_line())
        }
    }
}
