//! Loader for the fenced ```` ```therapydrift ```` TOML block in task descriptions.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::drift_spec::{DriftSpec, RawDriftSpec};
use crate::core::error::DriftError;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```therapydrift[ \t]*\r?\n(?P<body>.*?)\r?\n```")
        .expect("therapydrift fence regex is valid")
});

/// Return the trimmed body of the first therapydrift block, if any.
pub fn extract_spec_block(description: &str) -> Option<String> {
    FENCE_RE
        .captures(description)
        .and_then(|caps| caps.name("body"))
        .map(|body| body.as_str().trim().to_string())
}

/// Parse a block body into a normalized [`DriftSpec`].
pub fn parse_spec_block(body: &str) -> Result<DriftSpec, DriftError> {
    let raw: RawDriftSpec =
        toml::from_str(body).map_err(|err| DriftError::Config(err.to_string()))?;
    DriftSpec::from_raw(raw)
}
