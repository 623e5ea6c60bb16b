//! Per-link configuration.
//!
//! [`LinkConfig`] gathers everything a sender/receiver pair needs except the
//! channel itself, which is passed separately so tests can inject a scripted
//! one.  Defaults reproduce the classic demo: CRC key `1101`, window of 3,
//! first frame numbered 0.

use crate::csma::AccessConfig;
use crate::error::LinkError;
use crate::error_code::{CrcKey, ErrorCode};
use crate::timer::TimerConfig;

/// Default CRC generator, x³ + x² + 1.
pub const DEFAULT_CRC_KEY: &str = "1101";

pub const DEFAULT_WINDOW_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Go-Back-N window size N.
    pub window_size: usize,
    /// Sequence number of the first frame; both ends must agree.
    pub initial_seq: u64,
    pub code: ErrorCode,
    /// Receiver repeats its last ACK when it drops an out-of-order frame.
    pub reack: bool,
    pub timer: TimerConfig,
    pub access: AccessConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            initial_seq: 0,
            code: default_code(),
            reack: true,
            timer: TimerConfig::default(),
            access: AccessConfig::default(),
        }
    }
}

impl LinkConfig {
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.window_size == 0 {
            return Err(LinkError::InvalidConfig(
                "window_size must be at least 1".into(),
            ));
        }
        if self.timer.initial_rto.is_zero() {
            return Err(LinkError::InvalidConfig(
                "initial_rto must be positive".into(),
            ));
        }
        if self.timer.initial_rto > self.timer.max_rto {
            return Err(LinkError::InvalidConfig(format!(
                "initial_rto {:?} exceeds max_rto {:?}",
                self.timer.initial_rto, self.timer.max_rto
            )));
        }
        Ok(())
    }
}

fn default_code() -> ErrorCode {
    match CrcKey::new(DEFAULT_CRC_KEY) {
        Ok(key) => ErrorCode::Crc(key),
        // DEFAULT_CRC_KEY is a valid key.
        Err(_) => ErrorCode::Parity,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = LinkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.code, ErrorCode::crc(DEFAULT_CRC_KEY).unwrap());
    }

    #[test]
    fn zero_window_is_invalid() {
        let config = LinkConfig {
            window_size: 0,
            ..LinkConfig::default()
        };
        assert!(matches!(config.validate(), Err(LinkError::InvalidConfig(_))));
    }

    #[test]
    fn rto_bounds_are_checked() {
        let mut config = LinkConfig::default();
        config.timer.initial_rto = Duration::ZERO;
        assert!(config.validate().is_err());

        config.timer.initial_rto = Duration::from_secs(20);
        config.timer.max_rto = Duration::from_secs(10);
        assert!(config.validate().is_err());
    }
}
