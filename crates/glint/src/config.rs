use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use glint_protocol::ErrorCorrection;
use glint_transfer::NamedBuffer;

/// Runtime settings, read from `GLINT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub level: ErrorCorrection,
    pub chunk_target: usize,
    pub delay: Duration,
    pub final_hold: Duration,
    /// Loopback loses every n-th frame; 0 loses none.
    pub drop_every: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let inputs: Vec<PathBuf> = lookup("GLINT_INPUT")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .collect();
        if inputs.is_empty() {
            bail!("GLINT_INPUT must name at least one file (comma-separated)");
        }

        let output_dir = lookup("GLINT_OUTPUT_DIR").unwrap_or_else(|| "./received".into());
        let level = lookup("GLINT_EC_LEVEL")
            .unwrap_or_else(|| "M".into())
            .parse::<ErrorCorrection>()
            .map_err(|e| anyhow!(e))?;
        let chunk_target = parse_var(&lookup, "GLINT_CHUNK_SIZE", "1024")?;
        let delay_ms: u64 = parse_var(&lookup, "GLINT_DELAY_MS", "200")?;
        let final_hold_ms: u64 = parse_var(&lookup, "GLINT_FINAL_HOLD_MS", "1000")?;
        let drop_every = parse_var(&lookup, "GLINT_DROP_EVERY", "0")?;

        Ok(Self {
            inputs,
            output_dir: PathBuf::from(output_dir),
            level,
            chunk_target,
            delay: Duration::from_millis(delay_ms),
            final_hold: Duration::from_millis(final_hold_ms),
            drop_every,
        })
    }

    /// Read every input file, named by its final path component.
    pub fn read_inputs(&self) -> anyhow::Result<Vec<NamedBuffer>> {
        self.inputs
            .iter()
            .map(|path| {
                let name = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .ok_or_else(|| anyhow!("input has no usable file name: {}", path.display()))?;
                let data = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
                Ok(NamedBuffer::new(name, data))
            })
            .collect()
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .with_context(|| format!("invalid {key}: {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config_from(&[("GLINT_INPUT", "a.txt")]).unwrap();
        assert_eq!(config.inputs, vec![PathBuf::from("a.txt")]);
        assert_eq!(config.output_dir, PathBuf::from("./received"));
        assert_eq!(config.level, ErrorCorrection::Medium);
        assert_eq!(config.chunk_target, 1024);
        assert_eq!(config.delay, Duration::from_millis(200));
        assert_eq!(config.final_hold, Duration::from_secs(1));
        assert_eq!(config.drop_every, 0);
    }

    #[test]
    fn overrides_apply() {
        let config = config_from(&[
            ("GLINT_INPUT", " a.txt, ,b.bin "),
            ("GLINT_EC_LEVEL", "h"),
            ("GLINT_CHUNK_SIZE", "300"),
            ("GLINT_DROP_EVERY", "7"),
        ])
        .unwrap();
        assert_eq!(config.inputs, vec![PathBuf::from("a.txt"), PathBuf::from("b.bin")]);
        assert_eq!(config.level, ErrorCorrection::High);
        assert_eq!(config.chunk_target, 300);
        assert_eq!(config.drop_every, 7);
    }

    #[test]
    fn missing_input_is_an_error() {
        assert!(config_from(&[]).is_err());
        assert!(config_from(&[("GLINT_INPUT", " , ")]).is_err());
    }

    #[test]
    fn bad_numbers_are_errors() {
        let err = config_from(&[("GLINT_INPUT", "a"), ("GLINT_DELAY_MS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("GLINT_DELAY_MS"));
        assert!(config_from(&[("GLINT_INPUT", "a"), ("GLINT_EC_LEVEL", "Z")]).is_err());
    }
}
