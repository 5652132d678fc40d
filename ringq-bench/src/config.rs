//! Harness configuration from `RINGQ_*` environment variables.

use std::env;
use std::str::FromStr;

/// Which queue variants to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Spsc,
    Mpsc,
    Both,
}

impl Mode {
    pub const fn runs_spsc(self) -> bool {
        matches!(self, Self::Spsc | Self::Both)
    }

    pub const fn runs_mpsc(self) -> bool {
        matches!(self, Self::Mpsc | Self::Both)
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spsc" => Ok(Self::Spsc),
            "mpsc" => Ok(Self::Mpsc),
            "both" => Ok(Self::Both),
            _ => Err("expected one of spsc, mpsc, both".to_owned()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
    #[error("RINGQ_MPSC_ITEMS={items} times RINGQ_PRODUCERS={producers} overflows")]
    TooManyItems { items: usize, producers: usize },
}

/// Parameters for one harness invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    pub mode: Mode,
    /// Repetitions per variant.
    pub runs: usize,
    pub spsc_items: u64,
    pub spsc_capacity: usize,
    /// Items sent by each MPSC producer.
    pub mpsc_items: usize,
    pub mpsc_capacity: usize,
    pub producers: usize,
    pub producer_cpu: Option<usize>,
    pub consumer_cpu: Option<usize>,
    pub mpsc_consumer_cpu: Option<usize>,
    /// CPU for each MPSC producer by index. Producers past the end run unpinned.
    pub mpsc_producer_cpus: Vec<usize>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Both,
            runs: 10,
            spsc_items: 10_000_000,
            spsc_capacity: 100_000,
            mpsc_items: 1_150_000,
            mpsc_capacity: (1 << 17) - 1,
            producers: 3,
            producer_cpu: Some(4),
            consumer_cpu: Some(1),
            mpsc_consumer_cpu: Some(0),
            mpsc_producer_cpus: vec![1, 2, 3],
        }
    }
}

impl BenchConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Builds a config from `lookup`, falling back to defaults for unset
    /// variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("RINGQ_MODE") {
            config.mode = value.parse().map_err(|reason| ConfigError::Invalid {
                var: "RINGQ_MODE",
                value,
                reason,
            })?;
        }

        read(&lookup, "RINGQ_RUNS", &mut config.runs)?;
        read(&lookup, "RINGQ_SPSC_ITEMS", &mut config.spsc_items)?;
        read(&lookup, "RINGQ_SPSC_CAPACITY", &mut config.spsc_capacity)?;
        read(&lookup, "RINGQ_MPSC_ITEMS", &mut config.mpsc_items)?;
        read(&lookup, "RINGQ_MPSC_CAPACITY", &mut config.mpsc_capacity)?;
        read(&lookup, "RINGQ_PRODUCERS", &mut config.producers)?;

        if let Some(value) = lookup("RINGQ_PRODUCER_CPU") {
            config.producer_cpu = parse_cpu("RINGQ_PRODUCER_CPU", value)?;
        }
        if let Some(value) = lookup("RINGQ_CONSUMER_CPU") {
            config.consumer_cpu = parse_cpu("RINGQ_CONSUMER_CPU", value)?;
        }
        if let Some(value) = lookup("RINGQ_MPSC_CPUS") {
            let mut cpus = parse_cpu_list("RINGQ_MPSC_CPUS", &value)?.into_iter();
            config.mpsc_consumer_cpu = cpus.next();
            config.mpsc_producer_cpus = cpus.collect();
        }

        for (var, value) in [
            ("RINGQ_RUNS", config.runs),
            ("RINGQ_PRODUCERS", config.producers),
            ("RINGQ_MPSC_ITEMS", config.mpsc_items),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { var });
            }
        }
        if config.spsc_items == 0 {
            return Err(ConfigError::Zero {
                var: "RINGQ_SPSC_ITEMS",
            });
        }

        if config.mpsc_total().is_none() || config.producers == usize::MAX {
            return Err(ConfigError::TooManyItems {
                items: config.mpsc_items,
                producers: config.producers,
            });
        }

        Ok(config)
    }

    /// Items received by the MPSC consumer per run, if representable.
    pub fn mpsc_total(&self) -> Option<usize> {
        self.mpsc_items.checked_mul(self.producers)
    }

    /// CPU for MPSC producer `index`, if one was given.
    pub fn mpsc_producer_cpu(&self, index: usize) -> Option<usize> {
        self.mpsc_producer_cpus.get(index).copied()
    }
}

fn read<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    slot: &mut T,
) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = lookup(var) {
        *slot = value.trim().replace('_', "").parse().map_err(|e: T::Err| {
            ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }
        })?;
    }
    Ok(())
}

/// `none` (or an empty value) disables pinning.
fn parse_cpu(var: &'static str, value: String) -> Result<Option<usize>, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        })
}

fn parse_cpu_list(var: &'static str, value: &str) -> Result<Vec<usize>, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(Vec::new());
    }
    trimmed
        .split(',')
        .map(|cpu| {
            cpu.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                var,
                value: value.to_owned(),
                reason: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<BenchConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        BenchConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config, BenchConfig::default());
        assert_eq!(config.mode, Mode::Both);
        assert_eq!(config.runs, 10);
        assert_eq!(config.mpsc_capacity, 131_071);
        assert_eq!(config.mpsc_consumer_cpu, Some(0));
        assert_eq!(config.mpsc_producer_cpu(2), Some(3));
        assert_eq!(config.mpsc_producer_cpu(3), None);
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("RINGQ_MODE", "MPSC"),
            ("RINGQ_RUNS", "3"),
            ("RINGQ_SPSC_ITEMS", "100_000_000"),
            ("RINGQ_PRODUCERS", "5"),
            ("RINGQ_PRODUCER_CPU", "none"),
            ("RINGQ_CONSUMER_CPU", "7"),
            ("RINGQ_MPSC_CPUS", "4, 5,6"),
        ])
        .unwrap();

        assert_eq!(config.mode, Mode::Mpsc);
        assert!(!config.mode.runs_spsc());
        assert!(config.mode.runs_mpsc());
        assert_eq!(config.runs, 3);
        assert_eq!(config.spsc_items, 100_000_000);
        assert_eq!(config.producers, 5);
        assert_eq!(config.producer_cpu, None);
        assert_eq!(config.consumer_cpu, Some(7));
        assert_eq!(config.mpsc_consumer_cpu, Some(4));
        assert_eq!(config.mpsc_producer_cpus, vec![5, 6]);
    }

    #[test]
    fn empty_cpu_list_disables_pinning() {
        let config = config(&[("RINGQ_MPSC_CPUS", "")]).unwrap();
        assert_eq!(config.mpsc_consumer_cpu, None);
        assert!(config.mpsc_producer_cpus.is_empty());
    }

    #[test]
    fn malformed_value_names_variable() {
        let err = config(&[("RINGQ_RUNS", "ten")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "RINGQ_RUNS", .. }));
        assert!(err.to_string().starts_with("RINGQ_RUNS=\"ten\" is invalid"));

        let err = config(&[("RINGQ_MODE", "spmc")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "RINGQ_MODE", .. }));

        let err = config(&[("RINGQ_MPSC_CPUS", "0,x")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "RINGQ_MPSC_CPUS", .. }));
    }

    #[test]
    fn zero_counts_rejected() {
        let err = config(&[("RINGQ_PRODUCERS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Zero { var: "RINGQ_PRODUCERS" }));

        let err = config(&[("RINGQ_SPSC_ITEMS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Zero { var: "RINGQ_SPSC_ITEMS" }));
    }

    #[test]
    fn mpsc_total_overflow_rejected() {
        let huge = (usize::MAX / 2).to_string();
        let err = config(&[("RINGQ_MPSC_ITEMS", &huge), ("RINGQ_PRODUCERS", "3")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::TooManyItems { producers: 3, .. }
        ));

        let err = config(&[("RINGQ_PRODUCERS", &usize::MAX.to_string())]).unwrap_err();
        assert!(matches!(err, ConfigError::TooManyItems { .. }));

        let config = config(&[("RINGQ_MPSC_ITEMS", "1000"), ("RINGQ_PRODUCERS", "4")]).unwrap();
        assert_eq!(config.mpsc_total(), Some(4000));
    }

    #[test]
    fn zero_capacity_left_to_queue() {
        // The queue constructor owns capacity validation.
        let config = config(&[("RINGQ_SPSC_CAPACITY", "0")]).unwrap();
        assert_eq!(config.spsc_capacity, 0);
    }
}
