//! Logger setup for the lambda binaries

use log::LevelFilter;

/// Level used when `LOG_LEVEL` is not set
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::Debug;

/// Parses a `LOG_LEVEL` value like `DEBUG` or `info`. The level names of
/// Python's `logging` module (`WARNING`, `CRITICAL`, `FATAL`) are accepted
/// as well.
pub fn parse_level(value: Option<&str>) -> anyhow::Result<LevelFilter> {
    use std::str::FromStr;

    value.map_or(Ok(DEFAULT_LEVEL), |value| {
        let name = value.trim();
        if name.eq_ignore_ascii_case("warning") {
            return Ok(LevelFilter::Warn);
        }
        if name.eq_ignore_ascii_case("critical") || name.eq_ignore_ascii_case("fatal") {
            return Ok(LevelFilter::Error);
        }
        LevelFilter::from_str(name)
            .map_err(|_| anyhow::anyhow!("Invalid LOG_LEVEL value: {}", value))
    })
}

/// Initializes `simple_logger` with the level from `LOG_LEVEL`. Timestamps
/// are left out as CloudWatch adds them.
#[cfg(feature = "binary")]
#[cfg_attr(docsrs, doc(cfg(feature = "binary")))]
pub fn init_from_env() -> anyhow::Result<()> {
    use anyhow::Context;

    let level = parse_level(std::env::var("LOG_LEVEL").ok().as_deref())?;
    simple_logger::SimpleLogger::new()
        .with_level(level)
        .without_timestamps()
        .init()
        .context("Unable to setup logging")
}

#[cfg(test)]
mod tests {
    use super::{parse_level, DEFAULT_LEVEL};
    use log::LevelFilter;

    #[test]
    fn levels_are_case_insensitive() {
        assert_eq!(parse_level(Some("DEBUG")).unwrap(), LevelFilter::Debug);
        assert_eq!(parse_level(Some("warn")).unwrap(), LevelFilter::Warn);
        assert_eq!(parse_level(Some("WARNING")).unwrap(), LevelFilter::Warn);
        assert_eq!(parse_level(Some("Critical")).unwrap(), LevelFilter::Error);
        assert_eq!(parse_level(Some("FATAL")).unwrap(), LevelFilter::Error);
        assert_eq!(parse_level(None).unwrap(), DEFAULT_LEVEL);
        assert!(parse_level(Some("loud")).is_err());
    }
}
