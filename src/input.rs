use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use embedded_hal::digital::{Error as _, ErrorKind, ErrorType, InputPin};
use log::{info, warn};

/// Level of the sensor line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PinState {
    #[default]
    Low,
    High,
}

impl From<bool> for PinState {
    fn from(high: bool) -> Self {
        if high {
            PinState::High
        } else {
            PinState::Low
        }
    }
}

/// Transition seen between two consecutive samples
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

impl Edge {
    pub fn motion_detected(self) -> bool {
        matches!(self, Edge::Rising)
    }
}

/// Samples a digital input once per call and reports edges.
///
/// `previous` always holds what `current` was one poll earlier. Both start
/// out LOW, so a line that is already HIGH at boot reports a rising edge on
/// the first poll.
pub struct InputMonitor<P> {
    pin: P,
    current: PinState,
    previous: PinState,
}

impl<P: InputPin> InputMonitor<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            current: PinState::Low,
            previous: PinState::Low,
        }
    }

    pub fn current(&self) -> PinState {
        self.current
    }

    pub fn previous(&self) -> PinState {
        self.previous
    }

    pub fn poll(&mut self) -> Option<Edge> {
        self.previous = self.current;
        self.current = match self.pin.is_high() {
            Ok(high) => high.into(),
            Err(e) => {
                // A failed read counts as "unchanged"
                warn!("Input: read failed ({:?}), holding {:?}", e.kind(), self.current);
                self.current
            }
        };

        match (self.previous, self.current) {
            (PinState::Low, PinState::High) => {
                info!("Motion detected!");
                Some(Edge::Rising)
            }
            (PinState::High, PinState::Low) => {
                info!("Motion stopped!");
                Some(Edge::Falling)
            }
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct SysfsPinError(pub std::io::Error);

impl embedded_hal::digital::Error for SysfsPinError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// A GPIO line exported through the Linux sysfs interface. Reads the
/// `value` file on every sample.
pub struct SysfsPin {
    value: PathBuf,
}

impl SysfsPin {
    /// Export `pin` under `root` if needed and set it up as an input
    pub fn export(root: impl AsRef<Path>, pin: u8) -> Result<Self, Error> {
        let root = root.as_ref();
        let line = root.join(format!("gpio{pin}"));

        info!("Input: initializing on pin {}", pin);

        if !line.exists() {
            fs::write(root.join("export"), pin.to_string())
                .with_context(|| format!("exporting gpio{pin} under {}", root.display()))?;
        }
        fs::write(line.join("direction"), "in")
            .with_context(|| format!("setting gpio{pin} as input"))?;

        Ok(Self {
            value: line.join("value"),
        })
    }
}

impl ErrorType for SysfsPin {
    type Error = SysfsPinError;
}

impl InputPin for SysfsPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let value = fs::read_to_string(&self.value).map_err(SysfsPinError)?;
        Ok(value.trim() == "1")
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedPin;

    use PinState::{High, Low};

    #[test]
    fn test_edges_only_on_change() {
        let samples = [Low, Low, High, High, High, Low, Low, High, Low];
        let mut monitor = InputMonitor::new(ScriptedPin::new(samples));

        let edges: Vec<_> = samples.iter().map(|_| monitor.poll()).collect();
        assert_eq!(
            edges,
            vec![
                None,
                None,
                Some(Edge::Rising),
                None,
                None,
                Some(Edge::Falling),
                None,
                Some(Edge::Rising),
                Some(Edge::Falling),
            ]
        );
    }

    #[test]
    fn test_previous_trails_current_by_one_poll() {
        let samples = [High, Low, Low, High];
        let mut monitor = InputMonitor::new(ScriptedPin::new(samples));

        let mut last = Low;
        for sample in samples {
            monitor.poll();
            assert_eq!(monitor.previous(), last);
            assert_eq!(monitor.current(), sample);
            last = sample;
        }
    }

    #[test]
    fn test_high_at_boot_is_a_rising_edge() {
        let mut monitor = InputMonitor::new(ScriptedPin::new([High]));
        assert_eq!(monitor.poll(), Some(Edge::Rising));
        assert_eq!(monitor.poll(), None);
    }

    #[test]
    fn test_read_error_holds_state() {
        let mut pin = ScriptedPin::new([High]);
        pin.fail_after(1);
        let mut monitor = InputMonitor::new(pin);

        assert_eq!(monitor.poll(), Some(Edge::Rising));
        assert_eq!(monitor.poll(), None);
        assert_eq!(monitor.current(), High);
    }

    #[test]
    fn test_edge_motion_value() {
        assert!(Edge::Rising.motion_detected());
        assert!(!Edge::Falling.motion_detected());
    }

    #[test]
    fn test_sysfs_pin() {
        let root = tempfile::tempdir().unwrap();
        let line = root.path().join("gpio12");
        std::fs::create_dir(&line).unwrap();
        std::fs::write(line.join("value"), "0\n").unwrap();

        let mut pin = SysfsPin::export(root.path(), 12).unwrap();
        assert_eq!(
            std::fs::read_to_string(line.join("direction")).unwrap(),
            "in"
        );
        assert!(!pin.is_high().unwrap());

        std::fs::write(line.join("value"), "1\n").unwrap();
        assert!(pin.is_high().unwrap());
    }

    #[test]
    fn test_sysfs_pin_exports_missing_line() {
        let root = tempfile::tempdir().unwrap();

        // No kernel behind this directory, so the line never appears
        assert!(SysfsPin::export(root.path(), 5).is_err());
        assert_eq!(
            std::fs::read_to_string(root.path().join("export")).unwrap(),
            "5"
        );
    }
}
