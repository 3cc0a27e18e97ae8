use serde::Serialize;
use url::Url;

const TEMPLATE_OPEN: &str = "{{";
const TEMPLATE_CLOSE: &str = "}}";
const PIXELS_PARAMETER: &str = "pixels";
/// Upper bound for the number of URLs a single template may expand to.
const MAX_TEMPLATE_EXPANSION: u64 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid URL template {spec:?}: {reason}. Use exactly one '{{{{<min> <max>}}}}' token with positive integers")]
    InvalidTemplate { spec: String, reason: String },
    #[error("failed to parse URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("URL {url:?} has no host")]
    MissingHost { url: String },
    #[error("URL path needs at least two components (connection target and stream name): {url:?}")]
    MissingPathComponents { url: String },
    #[error("URL {url:?} has an invalid '{PIXELS_PARAMETER}' parameter {value:?}, expected a non-negative integer")]
    InvalidPixels { url: String, value: String },
}

/// One concrete stream source.
///
/// The `pixels` query parameter is stripped from [`Endpoint::url`] and kept as metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    url: Url,
    #[serde(skip)]
    target: Url,
    #[serde(skip)]
    stream_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pixels: Option<u64>,
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, EndpointError> {
        let mut url = Url::parse(raw).map_err(|source| EndpointError::InvalidUrl {
            url: raw.to_string(),
            source,
        })?;

        if url.host_str().is_none_or(str::is_empty) {
            return Err(EndpointError::MissingHost { url: raw.to_string() });
        }

        // Other parameters are kept byte for byte, only `pixels` segments are dropped.
        let mut pixels = None;
        let mut kept = Vec::new();
        for segment in url.query().unwrap_or_default().split('&') {
            let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
            if key == PIXELS_PARAMETER {
                let value = value.trim();
                pixels = Some(value.parse::<u64>().map_err(|_| EndpointError::InvalidPixels {
                    url: raw.to_string(),
                    value: value.to_string(),
                })?);
            } else {
                kept.push(segment);
            }
        }
        if pixels.is_some() {
            let query = kept.join("&");
            url.set_query(Some(query.as_str()).filter(|query| !query.is_empty()));
        }

        let segments = url.path_segments().map(|s| s.collect::<Vec<_>>()).unwrap_or_default();
        let (stream_name, prefix) = match segments.split_last() {
            Some((name, prefix)) if !name.is_empty() && prefix.iter().any(|s| !s.is_empty()) => {
                (name.to_string(), prefix.join("/"))
            }
            _ => return Err(EndpointError::MissingPathComponents { url: raw.to_string() }),
        };
        let mut target = url.clone();
        target.set_path(&prefix);

        Ok(Self {
            url,
            target,
            stream_name,
            pixels,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The URL without the stream name, i.e. what a connection is established to.
    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub fn pixels(&self) -> Option<u64> {
        self.pixels
    }

    /// Grouping key for host-level round robin: `host` or `host:port`.
    pub fn host_key(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.pixels {
            Some(pixels) => write!(f, "{} ({pixels} pixels)", self.url),
            None => write!(f, "{}", self.url),
        }
    }
}

/// Result of parsing one endpoint spec. Template expansion can partially fail: `failures` lists
/// the generated URLs that were rejected while `endpoints` holds the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointBatch {
    pub host: String,
    pub endpoints: Vec<Endpoint>,
    pub failures: Vec<EndpointError>,
}

/// Parse a literal URL or a `{{<min> <max>}}` template into endpoints.
///
/// Fails if the template itself is malformed or if not a single URL could be parsed.
pub fn parse_endpoint_spec(spec: &str) -> Result<EndpointBatch, EndpointError> {
    let spec = spec.trim();
    let urls = expand_template(spec)?;
    if urls.len() > 1 {
        debug!(spec, count = urls.len(), "expanded URL template");
    }

    let mut endpoints = Vec::with_capacity(urls.len());
    let mut failures = Vec::new();
    for url in urls {
        match Endpoint::parse(&url) {
            Ok(endpoint) => endpoints.push(endpoint),
            Err(err) => failures.push(err),
        }
    }

    match endpoints.first() {
        Some(first) => Ok(EndpointBatch {
            host: first.host_key(),
            endpoints,
            failures,
        }),
        None => Err(failures.swap_remove(0)),
    }
}

fn expand_template(spec: &str) -> Result<Vec<String>, EndpointError> {
    let invalid = |reason: &str| EndpointError::InvalidTemplate {
        spec: spec.to_string(),
        reason: reason.to_string(),
    };

    let Some(start) = spec.find(TEMPLATE_OPEN) else {
        return Ok(vec![spec.to_string()]);
    };
    let inner_start = start + TEMPLATE_OPEN.len();
    let inner_end = spec[inner_start..]
        .find(TEMPLATE_CLOSE)
        .map(|offset| inner_start + offset)
        .ok_or_else(|| invalid("unterminated range token"))?;
    let end = inner_end + TEMPLATE_CLOSE.len();
    if spec[end..].contains(TEMPLATE_OPEN) {
        return Err(invalid("more than one range token"));
    }

    let (min, max) = spec[inner_start..inner_end]
        .split_once(' ')
        .ok_or_else(|| invalid("range token must contain two integers separated by a space"))?;
    let min = parse_bound(min).ok_or_else(|| invalid(&format!("minimum {min:?} is not a positive integer")))?;
    let max = parse_bound(max).ok_or_else(|| invalid(&format!("maximum {max:?} is not a positive integer")))?;
    if min > max {
        return Err(invalid(&format!("minimum {min} is greater than maximum {max}")));
    }
    if max - min >= MAX_TEMPLATE_EXPANSION {
        return Err(invalid(&format!(
            "range expands to more than {MAX_TEMPLATE_EXPANSION} URLs"
        )));
    }

    let (prefix, suffix) = (&spec[..start], &spec[end..]);
    Ok((min..=max).map(|value| format!("{prefix}{value}{suffix}")).collect())
}

/// Positive decimal integer without sign or leading zeros.
fn parse_bound(value: &str) -> Option<u64> {
    if value.is_empty() || value.starts_with('0') || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}
