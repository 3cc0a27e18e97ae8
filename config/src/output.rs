use std::{
    fmt,
    path::PathBuf,
    str::FromStr,
};
use strum::{
    Display,
    EnumString,
};

#[derive(Debug, Default, Clone, Copy, Display, EnumString, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum OutputDestination {
    #[default]
    Stdout,
    File(PathBuf),
}

const STDOUT: &str = "-";

/// Where statistics samples go, written as `<format>://<destination>` (e.g. `csv://-`,
/// `json:///var/log/harvester.jsonl`). `-` means standard output.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub format: OutputFormat,
    pub destination: OutputDestination,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutputTargetError {
    #[error("output target {0:?} must have the form <csv|json>://<file or ->")]
    MissingScheme(String),
    #[error("unknown output format {0:?}, expected csv or json")]
    UnknownFormat(String),
    #[error("output target {0:?} has an empty destination")]
    EmptyDestination(String),
}

impl FromStr for OutputTarget {
    type Err = OutputTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (format, destination) = s
            .trim()
            .split_once("://")
            .ok_or_else(|| OutputTargetError::MissingScheme(s.to_string()))?;
        let format = format
            .parse::<OutputFormat>()
            .map_err(|_| OutputTargetError::UnknownFormat(format.to_string()))?;
        let destination = match destination {
            "" => return Err(OutputTargetError::EmptyDestination(s.to_string())),
            STDOUT => OutputDestination::Stdout,
            path => OutputDestination::File(PathBuf::from(path)),
        };
        Ok(Self { format, destination })
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.destination {
            OutputDestination::Stdout => write!(f, "{}://{STDOUT}", self.format),
            OutputDestination::File(path) => write!(f, "{}://{}", self.format, path.display()),
        }
    }
}

impl serde::Serialize for OutputTarget {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for OutputTarget {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}
