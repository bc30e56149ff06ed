//! Log output for the trainer.
//!
//! Two env knobs shape it. `LOG_LEVEL` takes `EnvFilter` directives and
//! falls back to `DEFAULT_FILTER` when unset or unparsable. `LOG_FORMAT=json`
//! switches to one JSON object per event; anything else prints human
//! readable lines.
//!
//! The service logs under three targets, each of which can be tuned on its
//! own in `LOG_LEVEL`:
//!   locator_trainer : startup, config loading, WebSocket connections
//!   challenge       : bank inventory, scene building, hints served
//!   session         : session lifecycle, rounds, judged locators, score

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,locator_trainer=debug,challenge=debug,session=debug,tower_http=info,axum=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber. Call once, before anything logs.
pub fn init_tracing() {
    let level = std::env::var("LOG_LEVEL").ok();
    let format = LogFormat::from_env_value(std::env::var("LOG_FORMAT").ok().as_deref());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter_from(level.as_deref()))
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_opt_in() {
        assert_eq!(LogFormat::from_env_value(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(Some("pretty")), LogFormat::Pretty);
        assert_eq!(LogFormat::from_env_value(None), LogFormat::Pretty);
    }

    #[test]
    fn unparsable_levels_fall_back_to_the_default_filter() {
        let default = EnvFilter::new(DEFAULT_FILTER).to_string();
        assert_eq!(filter_from(Some("session=loud")).to_string(), default);
        assert_eq!(filter_from(None).to_string(), default);
        assert_ne!(filter_from(Some("warn")).to_string(), default);
    }
}
