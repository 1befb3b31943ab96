use std::collections::BTreeMap;
use crate::error::ActuatorError;

const RELAY_ON: u8 = 1;
const RELAY_OFF: u8 = 0;

/// The machine relay. `start` and `stop` must tolerate being called in the state they target.
pub trait Actuator {
    fn start(&mut self) -> Result<(), ActuatorError>;
    fn stop(&mut self) -> Result<(), ActuatorError>;
    fn is_running(&self) -> bool;
}

/// Simulated GPIO header driving the machine relay (1 = ON, machine running; 0 = OFF).
#[derive(Debug, Clone)]
pub struct GpioSimulator {
    pins: BTreeMap<u8, u8>,
    relay_pin: u8,
    machine_running: bool,
}

impl Default for GpioSimulator {
    fn default() -> Self {
        Self::new(17)
    }
}

impl GpioSimulator {
    pub fn new(relay_pin: u8) -> Self {
        let mut pins = BTreeMap::new();
        pins.insert(relay_pin, RELAY_ON);
        Self {
            pins,
            relay_pin,
            machine_running: true,
        }
    }

    pub fn set_pin(&mut self, pin: u8, value: u8) {
        self.pins.insert(pin, value);
        log::info!("[GPIO SIM] Pin {} set to {}", pin, value);
    }

    pub fn get_pin(&self, pin: u8) -> u8 {
        self.pins.get(&pin).copied().unwrap_or(0)
    }

    pub fn relay_pin(&self) -> u8 {
        self.relay_pin
    }

    pub fn status(&self) -> &'static str {
        if self.machine_running { "Running" } else { "Auto-stopped" }
    }

    fn drive_relay(&mut self, value: u8) -> Result<(), ActuatorError> {
        self.set_pin(self.relay_pin, value);
        if self.get_pin(self.relay_pin) != value {
            return Err(ActuatorError::RelayMismatch { pin: self.relay_pin, expected: value });
        }
        self.machine_running = value == RELAY_ON;
        Ok(())
    }
}

impl Actuator for GpioSimulator {
    fn start(&mut self) -> Result<(), ActuatorError> {
        self.drive_relay(RELAY_ON)?;
        log::info!("[GPIO SIM] Machine started! (Relay ON)");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        self.drive_relay(RELAY_OFF)?;
        log::warn!("[GPIO SIM] Machine stopped! (Relay OFF)");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.machine_running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running_with_relay_on() {
        let gpio = GpioSimulator::default();
        assert!(gpio.is_running());
        assert_eq!(gpio.get_pin(17), 1);
        assert_eq!(gpio.status(), "Running");
    }

    #[test]
    fn stop_and_start_toggle_relay() {
        let mut gpio = GpioSimulator::new(5);
        gpio.stop().unwrap();
        assert!(!gpio.is_running());
        assert_eq!(gpio.get_pin(5), 0);
        assert_eq!(gpio.status(), "Auto-stopped");
        gpio.start().unwrap();
        assert!(gpio.is_running());
        assert_eq!(gpio.get_pin(5), 1);
    }

    #[test]
    fn repeated_calls_are_idempotent() {
        let mut gpio = GpioSimulator::default();
        gpio.stop().unwrap();
        gpio.stop().unwrap();
        assert!(!gpio.is_running());
        gpio.start().unwrap();
        gpio.start().unwrap();
        assert!(gpio.is_running());
    }

    #[test]
    fn unknown_pins_read_low() {
        assert_eq!(GpioSimulator::default().get_pin(4), 0);
    }
}
