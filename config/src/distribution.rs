use rand::Rng as _;
use rand_distr::StandardNormal;
use std::{
    fmt,
    str::FromStr,
    time::Duration,
};

const CONST: &str = "const";
const EQUAL: &str = "equal";
const NORM: &str = "norm";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DistributionError {
    #[error("distribution type and parameters must be separated by ':' in {0:?}, use <const|equal|norm>:<param>[,<param>]")]
    MissingSeparator(String),
    #[error("unknown distribution type {0:?}, expected one of const, equal, norm")]
    UnknownKind(String),
    #[error("{kind} distribution expects exactly {expected} parameter(s) but got {actual}")]
    Arity {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("distribution argument must be a non-negative duration but is {0:?}")]
    Negative(String),
    #[error("invalid duration {value:?}: {reason}")]
    InvalidDuration { value: String, reason: String },
    #[error("minimum {min:?} is greater than maximum {max:?}")]
    MinGreaterThanMax { min: Duration, max: Duration },
}

/// Random distribution of the delay a worker waits before (re)opening a stream.
///
/// Textual form: `const:<d>`, `equal:<min>,<max>` or `norm:<mean>,<std-dev>` with durations in
/// humantime notation (`500ms`, `2s`, `1m 30s`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayDistribution {
    Const(Duration),
    Uniform { min: Duration, max: Duration },
    Normal { mean: Duration, std_dev: Duration },
}

impl Default for DelayDistribution {
    fn default() -> Self {
        DelayDistribution::Const(Duration::ZERO)
    }
}

impl DelayDistribution {
    /// Draw one delay. Never negative: normal samples below zero are clamped to zero.
    ///
    /// Uses the thread-local RNG, so concurrent callers do not contend.
    pub fn sample(&self) -> Duration {
        match *self {
            DelayDistribution::Const(value) => value,
            DelayDistribution::Uniform { min, max } if min == max => min,
            DelayDistribution::Uniform { min, max } => {
                let nanos = rand::rng().random_range(as_nanos(min)..=as_nanos(max));
                Duration::from_nanos(nanos)
            }
            DelayDistribution::Normal { mean, std_dev } => {
                let z: f64 = rand::rng().sample(StandardNormal);
                let secs = mean.as_secs_f64() + z * std_dev.as_secs_f64();
                if secs <= 0.0 {
                    return Duration::ZERO;
                }
                Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
            }
        }
    }
}

fn as_nanos(value: Duration) -> u64 {
    u64::try_from(value.as_nanos()).unwrap_or(u64::MAX)
}

fn parse_duration(value: &str) -> Result<Duration, DistributionError> {
    let value = value.trim();
    if value.starts_with('-') {
        return Err(DistributionError::Negative(value.to_string()));
    }
    humantime::parse_duration(value).map_err(|err| DistributionError::InvalidDuration {
        value: value.to_string(),
        reason: err.to_string(),
    })
}

fn expect_params<'a>(
    kind: &'static str,
    params: &'a str,
    expected: usize,
) -> Result<Vec<&'a str>, DistributionError> {
    let params = params.split(',').collect::<Vec<_>>();
    if params.len() != expected {
        return Err(DistributionError::Arity {
            kind,
            expected,
            actual: params.len(),
        });
    }
    Ok(params)
}

impl FromStr for DelayDistribution {
    type Err = DistributionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, params) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| DistributionError::MissingSeparator(s.to_string()))?;

        let distribution = match kind.trim() {
            CONST => {
                let params = expect_params(CONST, params, 1)?;
                DelayDistribution::Const(parse_duration(params[0])?)
            }
            EQUAL => {
                let params = expect_params(EQUAL, params, 2)?;
                let min = parse_duration(params[0])?;
                let max = parse_duration(params[1])?;
                if min > max {
                    return Err(DistributionError::MinGreaterThanMax { min, max });
                }
                DelayDistribution::Uniform { min, max }
            }
            NORM => {
                let params = expect_params(NORM, params, 2)?;
                DelayDistribution::Normal {
                    mean: parse_duration(params[0])?,
                    std_dev: parse_duration(params[1])?,
                }
            }
            other => return Err(DistributionError::UnknownKind(other.to_string())),
        };

        debug!(input = s, %distribution, "parsed delay distribution");
        Ok(distribution)
    }
}

impl fmt::Display for DelayDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use humantime::format_duration as human;
        match self {
            DelayDistribution::Const(value) => write!(f, "{CONST}:{}", human(*value)),
            DelayDistribution::Uniform { min, max } => write!(f, "{EQUAL}:{},{}", human(*min), human(*max)),
            DelayDistribution::Normal { mean, std_dev } => write!(f, "{NORM}:{},{}", human(*mean), human(*std_dev)),
        }
    }
}

impl serde::Serialize for DelayDistribution {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for DelayDistribution {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn secs(value: u64) -> Duration {
        Duration::from_secs(value)
    }

    #[test]
    fn parses_constant_distribution() {
        for value in 0..=10 {
            let parsed: DelayDistribution = format!("const:{value}s").parse().unwrap();
            assert_eq!(parsed, DelayDistribution::Const(secs(value)));
        }
        for value in 1..=10 {
            let err = format!("const:-{value}s").parse::<DelayDistribution>().unwrap_err();
            assert_eq!(err, DistributionError::Negative(format!("-{value}s")));
        }
    }

    #[test]
    fn parses_equal_distribution() {
        for min in 0..=10 {
            for max in min..=11 {
                let parsed: DelayDistribution = format!("equal:{min}s,{max}s").parse().unwrap();
                assert_eq!(
                    parsed,
                    DelayDistribution::Uniform {
                        min: secs(min),
                        max: secs(max)
                    }
                );
            }
        }
        assert!("equal:-1s,2s".parse::<DelayDistribution>().is_err());
        assert!("equal:1s,-2s".parse::<DelayDistribution>().is_err());
    }

    #[test]
    fn rejects_misordered_equal_distribution() {
        let err = "equal:2s,1s".parse::<DelayDistribution>().unwrap_err();
        assert_eq!(
            err,
            DistributionError::MinGreaterThanMax {
                min: secs(2),
                max: secs(1)
            }
        );
    }

    #[test]
    fn parses_normal_distribution() {
        for mean in 0..=10 {
            for std_dev in 0..=10 {
                let parsed: DelayDistribution = format!("norm:{mean}s,{std_dev}s").parse().unwrap();
                assert_eq!(
                    parsed,
                    DelayDistribution::Normal {
                        mean: secs(mean),
                        std_dev: secs(std_dev)
                    }
                );
            }
        }
        assert!("norm:-1s,1s".parse::<DelayDistribution>().is_err());
        assert!("norm:1s,-1s".parse::<DelayDistribution>().is_err());
    }

    #[test]
    fn rejects_malformed_strings() {
        for wrong in [
            "",
            "const",
            "norm:1s,",
            "norm:1s",
            "equal:10s",
            "const:",
            "const:1s,2s",
            "cost:1ms,5s",
            "const:fast",
        ] {
            assert!(wrong.parse::<DelayDistribution>().is_err(), "{wrong:?} should not parse");
        }
        assert_eq!(
            "equal:10s".parse::<DelayDistribution>().unwrap_err(),
            DistributionError::Arity {
                kind: "equal",
                expected: 2,
                actual: 1
            }
        );
        assert_eq!(
            "cost:1ms".parse::<DelayDistribution>().unwrap_err(),
            DistributionError::UnknownKind("cost".to_string())
        );
    }

    #[test]
    fn parsing_is_deterministic_and_display_round_trips() {
        for input in ["const:500ms", "equal:0s,1s", "norm:100ms,30ms"] {
            let first: DelayDistribution = input.parse().unwrap();
            let second: DelayDistribution = input.parse().unwrap();
            assert_eq!(first, second);
            assert_eq!(first.to_string().parse::<DelayDistribution>().unwrap(), first);
        }
    }

    #[test]
    fn samples_stay_within_bounds() {
        let constant: DelayDistribution = "const:250ms".parse().unwrap();
        assert_eq!(constant.sample(), Duration::from_millis(250));

        let uniform: DelayDistribution = "equal:10ms,20ms".parse().unwrap();
        for _ in 0..1000 {
            let sample = uniform.sample();
            assert!(sample >= Duration::from_millis(10) && sample <= Duration::from_millis(20));
        }

        let degenerate: DelayDistribution = "equal:5ms,5ms".parse().unwrap();
        assert_eq!(degenerate.sample(), Duration::from_millis(5));
    }

    #[test]
    fn normal_samples_are_clamped_to_zero() {
        // Mean zero: about half of all raw samples are negative.
        let normal: DelayDistribution = "norm:0s,1s".parse().unwrap();
        let samples = (0..1000).map(|_| normal.sample()).collect::<Vec<_>>();
        assert!(samples.iter().any(|sample| *sample == Duration::ZERO));
        assert!(samples.iter().any(|sample| *sample > Duration::ZERO));
    }

    #[test]
    fn sampling_is_safe_from_many_threads() {
        let normal: DelayDistribution = "norm:10ms,5ms".parse().unwrap();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..1000 {
                        let _ = normal.sample();
                    }
                });
            }
        });
    }
}
