use std::env;
use std::str::FromStr;

use thiserror::Error;

use crate::blockchain::chain::{default_max_attempts, expected_attempts};

pub const DIFFICULTY_ENV: &str = "CHAINLEDGER_DIFFICULTY";
pub const MAX_ATTEMPTS_ENV: &str = "CHAINLEDGER_MAX_ATTEMPTS";

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_PEERS: &str = "127.0.0.1:8080";
const DEFAULT_DIFFICULTY: &str = "0000";

/// Errors raised while reading the node configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires an argument")]
    MissingValue(String),

    #[error("Unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("No command given")]
    MissingCommand,

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },

    #[error("Difficulty must be hex digits, got {0:?}")]
    InvalidDifficulty(String),

    #[error("Max attempts {max_attempts} is below the {expected} expected for difficulty {difficulty:?}")]
    AttemptsTooLow {
        max_attempts: u64,
        expected: u64,
        difficulty: String,
    },
}

/// What the binary was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Serve `mine` and `catchup` over HTTP
    Server,

    /// Catch up from the configured peers
    Client,

    /// Print a fresh keypair and exit
    NewWallet,
}

impl FromStr for Command {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(Command::Server),
            "client" => Ok(Command::Client),
            "new_wallet" => Ok(Command::NewWallet),
            other => Err(ConfigError::UnknownCommand(other.to_string())),
        }
    }
}

/// Node configuration assembled from the environment and command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub command: Command,
    pub bind: String,
    pub peers: Vec<String>,
    pub difficulty: String,
    pub max_attempts: u64,
}

fn parse_peers(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|peer| !peer.is_empty())
        .map(String::from)
        .collect()
}

fn parse_attempts(name: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

impl NodeConfig {
    /// Reads `CHAINLEDGER_*` variables, then the process arguments
    pub fn load() -> Result<Self, ConfigError> {
        let args: Vec<String> = env::args().skip(1).collect();
        Self::from_sources(
            env::var(DIFFICULTY_ENV).ok(),
            env::var(MAX_ATTEMPTS_ENV).ok(),
            &args,
        )
    }

    /// Flags win over environment values, which win over defaults
    pub fn from_sources(
        env_difficulty: Option<String>,
        env_max_attempts: Option<String>,
        args: &[String],
    ) -> Result<Self, ConfigError> {
        let mut bind = DEFAULT_BIND.to_string();
        let mut peers = parse_peers(DEFAULT_PEERS);
        let mut difficulty = env_difficulty.unwrap_or_else(|| DEFAULT_DIFFICULTY.to_string());
        let mut max_attempts = env_max_attempts
            .map(|value| parse_attempts(MAX_ATTEMPTS_ENV, &value))
            .transpose()?;
        let mut command = None;

        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "-b" | "--bind" | "--peers" | "--difficulty" | "--max-attempts" => {
                    let value = args
                        .get(i + 1)
                        .ok_or_else(|| ConfigError::MissingValue(flag.to_string()))?;
                    match flag {
                        "--peers" => peers = parse_peers(value),
                        "--difficulty" => difficulty = value.clone(),
                        "--max-attempts" => max_attempts = Some(parse_attempts(flag, value)?),
                        _ => bind = value.clone(),
                    }
                    i += 2;
                }
                other if other.starts_with('-') => {
                    return Err(ConfigError::UnexpectedArgument(other.to_string()));
                }
                other => {
                    if command.is_some() {
                        return Err(ConfigError::UnexpectedArgument(other.to_string()));
                    }
                    command = Some(other.parse()?);
                    i += 1;
                }
            }
        }

        let config = NodeConfig {
            command: command.ok_or(ConfigError::MissingCommand)?,
            bind,
            peers,
            max_attempts: max_attempts.unwrap_or_else(|| default_max_attempts(&difficulty)),
            difficulty,
        };
        config.validate()?;

        Ok(config)
    }

    /// Rejects non-hex difficulties and attempt caps below `16^len(difficulty)`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.difficulty.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
            return Err(ConfigError::InvalidDifficulty(self.difficulty.clone()));
        }

        let expected = expected_attempts(&self.difficulty);
        if self.max_attempts < expected {
            return Err(ConfigError::AttemptsTooLow {
                max_attempts: self.max_attempts,
                expected,
                difficulty: self.difficulty.clone(),
            });
        }

        Ok(())
    }
}

pub fn usage(program: &str) -> String {
    format!(
        "Usage: {program} [options] <server|client|new_wallet>\n\
         \n\
         Options:\n  \
           -b, --bind <addr>        Address to serve on (default {DEFAULT_BIND})\n  \
           --peers <a,b,..>         Peers to catch up from (default {DEFAULT_PEERS})\n  \
           --difficulty <hex>       Required hash prefix (default {DEFAULT_DIFFICULTY}, env {DIFFICULTY_ENV})\n  \
           --max-attempts <n>       Mining attempt cap (env {MAX_ATTEMPTS_ENV})\n  \
           -h, --help               Show this message"
    )
}
