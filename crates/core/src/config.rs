//! Runtime configuration.

use std::env;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CACHE_LENGTH: usize = 100;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_FUNCTION_TURNS: usize = 8;
const DEFAULT_MODEL: &str = "gpt-4o";

/// Builder for [`Config`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigBuilder {
    cache_length: Option<usize>,
    cache_path: Option<PathBuf>,
    request_timeout: Option<Duration>,
    disable_streaming: bool,
    show_functions_output: bool,
    max_function_turns: Option<usize>,
    default_model: Option<String>,
    default_color: Option<String>,
}

impl ConfigBuilder {
    /// Creates a builder with every option at its default.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder pre-filled from the process environment.
    ///
    /// Recognized variables are `CACHE_LENGTH`, `CACHE_PATH`,
    /// `REQUEST_TIMEOUT` (seconds), `DISABLE_STREAMING`,
    /// `SHOW_FUNCTIONS_OUTPUT`, `MAX_FUNCTION_TURNS`, `DEFAULT_MODEL` and
    /// `DEFAULT_COLOR`. Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            cache_length: parse_var(&lookup, "CACHE_LENGTH"),
            cache_path: lookup("CACHE_PATH").map(PathBuf::from),
            request_timeout: parse_var(&lookup, "REQUEST_TIMEOUT")
                .map(Duration::from_secs),
            disable_streaming: flag_var(&lookup, "DISABLE_STREAMING"),
            show_functions_output: flag_var(&lookup, "SHOW_FUNCTIONS_OUTPUT"),
            max_function_turns: parse_var(&lookup, "MAX_FUNCTION_TURNS"),
            default_model: lookup("DEFAULT_MODEL"),
            default_color: lookup("DEFAULT_COLOR"),
        }
    }

    /// Sets the maximum number of cached responses.
    #[inline]
    pub fn with_cache_length(mut self, length: usize) -> Self {
        self.cache_length = Some(length);
        self
    }

    /// Sets the directory cached responses are stored in.
    #[inline]
    pub fn with_cache_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Sets the timeout of one request to the model.
    #[inline]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Prints the answer once it is complete instead of as it streams.
    #[inline]
    pub fn with_disable_streaming(mut self, disable: bool) -> Self {
        self.disable_streaming = disable;
        self
    }

    /// Echoes the raw output of called functions.
    #[inline]
    pub fn with_show_functions_output(mut self, show: bool) -> Self {
        self.show_functions_output = show;
        self
    }

    /// Sets how many function calls one exchange may chain.
    #[inline]
    pub fn with_max_function_turns(mut self, turns: usize) -> Self {
        self.max_function_turns = Some(turns);
        self
    }

    /// Sets the model used when the caller does not name one.
    #[inline]
    pub fn with_default_model<S: Into<String>>(mut self, model: S) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Sets the colour plain text output is printed in.
    #[inline]
    pub fn with_default_color<S: Into<String>>(mut self, color: S) -> Self {
        self.default_color = Some(color.into());
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Config {
        Config {
            cache_length: self.cache_length.unwrap_or(DEFAULT_CACHE_LENGTH),
            cache_path: self
                .cache_path
                .unwrap_or_else(|| env::temp_dir().join("sgpt_cache")),
            request_timeout: self
                .request_timeout
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            disable_streaming: self.disable_streaming,
            show_functions_output: self.show_functions_output,
            max_function_turns: self
                .max_function_turns
                .unwrap_or(DEFAULT_MAX_FUNCTION_TURNS),
            default_model: self
                .default_model
                .unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            default_color: self.default_color,
        }
    }
}

/// Configuration consumed by the completion pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    cache_length: usize,
    cache_path: PathBuf,
    request_timeout: Duration,
    disable_streaming: bool,
    show_functions_output: bool,
    max_function_turns: usize,
    default_model: String,
    default_color: Option<String>,
}

impl Config {
    /// Maximum number of cached responses kept on disk.
    #[inline]
    pub fn cache_length(&self) -> usize {
        self.cache_length
    }

    /// Directory of the response cache.
    #[inline]
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Timeout of one request to the model.
    #[inline]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Whether output is rendered once at the end.
    #[inline]
    pub fn disable_streaming(&self) -> bool {
        self.disable_streaming
    }

    /// Whether raw function output is echoed.
    #[inline]
    pub fn show_functions_output(&self) -> bool {
        self.show_functions_output
    }

    /// Maximum number of chained function calls in one exchange.
    #[inline]
    pub fn max_function_turns(&self) -> usize {
        self.max_function_turns
    }

    /// Model used when none is given.
    #[inline]
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Colour of plain text output.
    #[inline]
    pub fn default_color(&self) -> Option<&str> {
        self.default_color.as_deref()
    }
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        ConfigBuilder::new().build()
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring invalid value of {name}: {raw:?}");
            None
        }
    }
}

#[inline]
fn flag_var(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> bool {
    lookup(name).is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache_length(), 100);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_function_turns(), 8);
        assert!(!config.disable_streaming());
        assert!(!config.show_functions_output());
        assert!(config.cache_path().ends_with("sgpt_cache"));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("CACHE_LENGTH", "5"),
            ("CACHE_PATH", "/tmp/somewhere"),
            ("REQUEST_TIMEOUT", "not a number"),
            ("DISABLE_STREAMING", "true"),
            ("SHOW_FUNCTIONS_OUTPUT", "false"),
            ("DEFAULT_MODEL", "gpt-4o-mini"),
        ]
        .into_iter()
        .collect();
        let config =
            ConfigBuilder::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
                .build();
        assert_eq!(config.cache_length(), 5);
        assert_eq!(config.cache_path(), Path::new("/tmp/somewhere"));
        assert_eq!(config.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert!(config.disable_streaming());
        assert!(!config.show_functions_output());
        assert_eq!(config.default_model(), "gpt-4o-mini");
        assert_eq!(config.default_color(), None);
    }
}
