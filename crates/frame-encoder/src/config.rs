use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

const DEFAULT_FRAMERATE: u32 = 60;
const DEFAULT_KEY_INT_MAX: u32 = 900;
const DEFAULT_QP_MAX: u32 = 32;

/// Settings shared by both x264 branches of the split-alpha pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X264Settings {
    /// Upper bound on the GOP length.
    pub key_int_max: u32,
    pub qp_max: u32,
    pub speed_preset: String,
    pub tune: String,
    pub intra_refresh: bool,
}

impl Default for X264Settings {
    fn default() -> Self {
        Self {
            key_int_max: DEFAULT_KEY_INT_MAX,
            qp_max: DEFAULT_QP_MAX,
            speed_preset: "veryfast".to_string(),
            tune: "zerolatency".to_string(),
            intra_refresh: false,
        }
    }
}

/// Per-encoder configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Framerate advertised in source caps
    pub framerate: u32,
    /// Caller-side bound on each sink pull. `None` waits forever.
    pub pull_timeout: Option<Duration>,
    pub x264: X264Settings,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            framerate: DEFAULT_FRAMERATE,
            pull_timeout: None,
            x264: X264Settings::default(),
        }
    }
}

impl EncoderConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let framerate = env_parse("FRAME_ENCODER_FRAMERATE")
            .filter(|rate: &u32| *rate > 0)
            .unwrap_or(defaults.framerate);
        let pull_timeout = match env_parse::<u64>("FRAME_ENCODER_PULL_TIMEOUT_MS") {
            Some(0) | None => None,
            Some(ms) => Some(Duration::from_millis(ms)),
        };
        let x264 = X264Settings {
            key_int_max: env_parse("FRAME_ENCODER_KEY_INT_MAX")
                .unwrap_or(defaults.x264.key_int_max),
            qp_max: env_parse("FRAME_ENCODER_QP_MAX").unwrap_or(defaults.x264.qp_max),
            ..defaults.x264
        };
        Self {
            framerate,
            pull_timeout,
            x264,
        }
    }

    pub fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = Some(timeout);
        self
    }
}

fn env_parse<T: FromStr>(var: &str) -> Option<T> {
    let raw = env::var(var).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var, value = %raw, "ignoring unparsable encoder setting");
            None
        }
    }
}
