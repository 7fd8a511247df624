use std::env;

/// Environment variable overriding the number of CPU devices.
pub const DEVICES_ENV: &str = "TB_CPU_DEVICES";

/// Configuration of a [`CpuPlatform`](crate::CpuPlatform).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuConfig {
    /// Platform name reported by [`Platform::name`](tb_tensor::Platform::name).
    pub name: String,
    /// Number of devices the platform exposes.
    pub num_devices: usize,
}

impl Default for CpuConfig {
    fn default() -> Self {
        CpuConfig {
            name: "cpu".to_string(),
            num_devices: 1,
        }
    }
}

impl CpuConfig {
    pub fn with_devices(mut self, num_devices: usize) -> Self {
        self.num_devices = num_devices;
        self
    }

    /// Reads the device count from `TB_CPU_DEVICES`, falling back to the
    /// default for unset, empty, zero or malformed values.
    pub fn from_env() -> Self {
        let config = CpuConfig::default();
        match env::var(DEVICES_ENV) {
            Ok(value) => match parse_devices(&value) {
                Some(n) => config.with_devices(n),
                None => config,
            },
            Err(_) => config,
        }
    }
}

fn parse_devices(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok().filter(|&n| n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let config = CpuConfig::default();
        assert_eq!(config.name, "cpu");
        assert_eq!(config.num_devices, 1);
    }

    #[test]
    fn test_parse_devices() {
        assert_eq!(parse_devices("4"), Some(4));
        assert_eq!(parse_devices(" 2 "), Some(2));
        assert_eq!(parse_devices("0"), None);
        assert_eq!(parse_devices(""), None);
        assert_eq!(parse_devices("many"), None);
    }
}
