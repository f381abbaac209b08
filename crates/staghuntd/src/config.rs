//! Layered configuration: defaults, then a JSON file, then `STAGHUNT_*`
//! environment variables, then command-line flags.

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use staghunt::mind::Tier;
use staghunt_games::error::GameError;
use staghunt_games::session::{parse_size, SessionConfig};
use thiserror::Error;
use tracing::warn;

pub const USAGE: &str = "\
staghuntd - play the maze stag hunt against a theory-of-mind companion

USAGE:
    staghuntd [OPTIONS]

OPTIONS:
    --config PATH      JSON session config (any subset of fields)
    --tier K           companion sophistication, 0-4 (also \"2-TOM\")
    --episodes N       episodes in the session
    --size RxC         maze size, e.g. 7x7
    --max-turns N      turn limit per episode
    --seed N           maze seed
    --timeout SECS     give up waiting for a move after SECS (0 = wait forever)
    --data-dir PATH    where session files go
    --serve ADDR       run the TCP JSON-lines server on ADDR instead
    -h, --help         print this help

ENVIRONMENT:
    STAGHUNT_TIER, STAGHUNT_EPISODES, STAGHUNT_MAX_TURNS, STAGHUNT_SEED,
    STAGHUNT_MOVE_TIMEOUT_SECS
";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Bad command line; the caller prints [`USAGE`] after it.
    #[error("{0}")]
    Usage(String),

    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Invalid(#[from] GameError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub session: SessionConfig,
    pub data_dir: Option<PathBuf>,
    pub serve: Option<String>,
    pub move_timeout: Option<Duration>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            data_dir: None,
            serve: None,
            move_timeout: Some(Duration::from_secs(300)),
        }
    }
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl DaemonConfig {
    /// Resolve every layer. `env` looks up an environment variable.
    pub fn resolve(
        args: &[String],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(path) = flag_value(args, "--config")? {
            cfg.session = load_file(PathBuf::from(path))?;
        }
        cfg.apply_env(env);
        cfg.apply_args(args)?;
        cfg.session.validate()?;
        Ok(cfg)
    }

    /// Unparseable values are logged and skipped.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        fn parsed<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            let v = env(key)?;
            match v.trim().parse() {
                Ok(x) => Some(x),
                Err(_) => {
                    warn!("ignoring {}={:?}", key, v);
                    None
                }
            }
        }

        // STAGHUNT_TIER=2 or STAGHUNT_TIER=2-TOM
        if let Some(t) = parsed::<Tier>(&env, "STAGHUNT_TIER") {
            self.session.tier = t;
        }
        if let Some(n) = parsed::<u32>(&env, "STAGHUNT_EPISODES") {
            self.session.episodes = n;
        }
        if let Some(n) = parsed::<u32>(&env, "STAGHUNT_MAX_TURNS") {
            self.session.max_turns = n;
        }
        if let Some(n) = parsed::<u64>(&env, "STAGHUNT_SEED") {
            self.session.seed = n;
        }
        if let Some(n) = parsed::<u64>(&env, "STAGHUNT_MOVE_TIMEOUT_SECS") {
            self.move_timeout = timeout_from_secs(n);
        }
    }

    pub fn apply_args(&mut self, args: &[String]) -> Result<(), ConfigError> {
        let mut it = args.iter();
        while let Some(flag) = it.next() {
            let mut value = || {
                it.next()
                    .cloned()
                    .ok_or_else(|| ConfigError::Usage(format!("{flag} needs a value")))
            };
            match flag.as_str() {
                "--config" => {
                    value()?;
                }
                "--tier" => {
                    self.session.tier = value()?
                        .parse::<Tier>()
                        .map_err(GameError::invalid_config)?;
                }
                "--episodes" => self.session.episodes = number(flag, &value()?)?,
                "--max-turns" => self.session.max_turns = number(flag, &value()?)?,
                "--seed" => self.session.seed = number(flag, &value()?)?,
                "--size" => {
                    let (rows, cols) = parse_size(&value()?)?;
                    self.session.rows = rows;
                    self.session.cols = cols;
                }
                "--timeout" => self.move_timeout = timeout_from_secs(number(flag, &value()?)?),
                "--data-dir" => self.data_dir = Some(PathBuf::from(value()?)),
                "--serve" => self.serve = Some(value()?),
                other => return Err(ConfigError::Usage(format!("unknown option {other}"))),
            }
        }
        Ok(())
    }
}

fn number<T: FromStr>(flag: &str, v: &str) -> Result<T, ConfigError> {
    v.trim()
        .parse()
        .map_err(|_| ConfigError::Usage(format!("{flag} expects a number, got {v:?}")))
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>, ConfigError> {
    match args.iter().position(|a| a == flag) {
        None => Ok(None),
        Some(i) => args
            .get(i + 1)
            .map(|v| Some(v.as_str()))
            .ok_or_else(|| ConfigError::Usage(format!("{flag} needs a value"))),
    }
}

fn load_file(path: PathBuf) -> Result<SessionConfig, ConfigError> {
    let text = match fs::read_to_string(&path) {
        Ok(t) => t,
        Err(source) => return Err(ConfigError::Read { path, source }),
    };
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_without_any_input() {
        let cfg = DaemonConfig::resolve(&[], no_env).unwrap();
        assert_eq!(cfg, DaemonConfig::default());
        assert_eq!(cfg.session.tier.level(), 2);
        assert_eq!((cfg.session.rows, cfg.session.cols), (7, 7));
    }

    #[test]
    fn flags_override_environment() {
        let env: HashMap<&str, &str> = [
            ("STAGHUNT_TIER", "3-TOM"),
            ("STAGHUNT_EPISODES", "4"),
            ("STAGHUNT_MOVE_TIMEOUT_SECS", "0"),
            ("STAGHUNT_SEED", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let lookup = |k: &str| env.get(k).map(|v| v.to_string());

        let cfg = DaemonConfig::resolve(&args("--episodes 2 --size 9x8"), lookup).unwrap();
        assert_eq!(cfg.session.tier.level(), 3);
        assert_eq!(cfg.session.episodes, 2);
        assert_eq!((cfg.session.rows, cfg.session.cols), (9, 8));
        assert_eq!(cfg.move_timeout, None);
        assert_eq!(cfg.session.seed, SessionConfig::default().seed);
    }

    #[test]
    fn config_file_sits_under_env_and_flags() {
        let path = std::env::temp_dir().join(format!("staghuntd-cfg-{}.json", std::process::id()));
        fs::write(&path, r#"{"tier": 1, "episodes": 5, "max_turns": 12}"#).unwrap();
        let a = args(&format!("--config {} --max-turns 30 --serve 127.0.0.1:7000", path.display()));
        let env = |k: &str| (k == "STAGHUNT_EPISODES").then(|| "6".to_string());

        let cfg = DaemonConfig::resolve(&a, env).unwrap();
        assert_eq!(cfg.session.tier.level(), 1);
        assert_eq!(cfg.session.episodes, 6);
        assert_eq!(cfg.session.max_turns, 30);
        assert_eq!(cfg.serve.as_deref(), Some("127.0.0.1:7000"));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn bad_flags_are_reported() {
        assert!(matches!(
            DaemonConfig::resolve(&args("--bogus"), no_env),
            Err(ConfigError::Usage(_))
        ));
        assert!(matches!(
            DaemonConfig::resolve(&args("--episodes"), no_env),
            Err(ConfigError::Usage(_))
        ));
        assert!(matches!(
            DaemonConfig::resolve(&args("--tier 7"), no_env),
            Err(ConfigError::Invalid(GameError::InvalidConfig(_)))
        ));
        assert!(matches!(
            DaemonConfig::resolve(&args("--tier nine"), no_env),
            Err(ConfigError::Invalid(GameError::InvalidConfig(_)))
        ));
        assert!(matches!(
            DaemonConfig::resolve(&args("--size 3x3"), no_env),
            Err(ConfigError::Invalid(GameError::InvalidConfig(_)))
        ));
        assert!(matches!(
            DaemonConfig::resolve(&args("--config /definitely/not/here.json"), no_env),
            Err(ConfigError::Read { .. })
        ));
    }
}
