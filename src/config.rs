use crate::{errors::ConfigError, models::instance::Modality};
use clap::{Parser, Subcommand};
use reqwest::Url;
use std::{env, fmt, path::PathBuf};

pub const DEFAULT_DEPOT_API: &str = "https://depotapi.tbportals.niaidprod.net";
const BULK_PRESIGNED_PATH: &str = "/api/Amazon/GetBulkPresignedUrls";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub username: String,
    pub password: String,
    /// `host[:port]/dbname` part of the PostgreSQL connection string.
    pub database: String,
    pub bulk_endpoint: Url,
    pub max_connections: u32,
    pub destination: PathBuf,
    pub modality: Modality,
    pub verbose: bool,
    pub allow_truncation: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Download CT and X-ray series from the depot")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Root directory downloads are written under
    #[arg(long, global = true, default_value = ".")]
    pub dest: PathBuf,

    /// Which instance table to read from
    #[arg(long, value_enum, global = true, default_value_t = Modality::Ct)]
    pub modality: Modality,

    /// Log progress for every series and object (overrides DEPOT_VERBOSE)
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Write as many objects as the resolver returned urls for instead of failing
    #[arg(long, global = true)]
    pub allow_truncation: bool,

    /// Depot API base URL (overrides DEPOT_API)
    #[arg(long, global = true)]
    pub api: Option<String>,

    /// Database host and name (overrides DEPOT_DATABASE)
    #[arg(long, global = true)]
    pub database: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Download a single series of a study
    Series {
        #[arg(long)]
        study: String,
        #[arg(long)]
        series: String,
    },
    /// Download every series of a patient, by internal patient id
    Patient {
        #[arg(long)]
        patient_id: String,
    },
    /// Download every series of a patient, by external identifier
    Identifier {
        #[arg(long)]
        identifier: String,
    },
    /// Download every series of a study
    Study {
        #[arg(long)]
        study: String,
    },
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command to run.
    pub fn from_env_and_args() -> Result<(Self, Command), ConfigError> {
        Self::from_parts(Args::parse(), |name| env::var(name))
    }

    /// Merge already-parsed arguments with values from `lookup`.
    pub fn from_parts<F>(args: Args, lookup: F) -> Result<(Self, Command), ConfigError>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let username = get_env(&lookup, "DEPOT_USERNAME", None)?;
        let password = get_env(&lookup, "DEPOT_PASSWORD", None)?;
        let database = match args.database {
            Some(database) => database,
            None => get_env(&lookup, "DEPOT_DATABASE", None)?,
        };
        let api = match args.api {
            Some(api) => api,
            None => get_env(&lookup, "DEPOT_API", Some(DEFAULT_DEPOT_API))?,
        };
        let bulk_endpoint = bulk_endpoint(&api)?;

        let raw_connections = get_env(&lookup, "DEPOT_MAX_CONNECTIONS", Some("1"))?;
        let max_connections =
            raw_connections
                .parse::<u32>()
                .map_err(|err| ConfigError::InvalidValue {
                    name: "DEPOT_MAX_CONNECTIONS".into(),
                    value: raw_connections.clone(),
                    reason: err.to_string(),
                })?;

        let verbose = args.verbose || get_env_bool(&lookup, "DEPOT_VERBOSE")?;

        let cfg = Self {
            username,
            password,
            database,
            bulk_endpoint,
            max_connections,
            destination: args.dest,
            modality: args.modality,
            verbose,
            allow_truncation: args.allow_truncation,
        };

        Ok((cfg, args.command))
    }

    /// PostgreSQL connection string with the password percent-encoded.
    pub fn database_url(&self) -> String {
        format!(
            "postgresql://{}:{}@{}",
            self.username,
            urlencoding::encode(&self.password),
            self.database
        )
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("bulk_endpoint", &self.bulk_endpoint.as_str())
            .field("max_connections", &self.max_connections)
            .field("destination", &self.destination)
            .field("modality", &self.modality)
            .field("verbose", &self.verbose)
            .field("allow_truncation", &self.allow_truncation)
            .finish()
    }
}

/// Read `name`, falling back to `default`. Unset with no default is an error.
fn get_env<F>(lookup: &F, name: &str, default: Option<&str>) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    match lookup(name) {
        Ok(value) => Ok(value),
        Err(env::VarError::NotPresent) => default
            .map(str::to_string)
            .ok_or_else(|| ConfigError::MissingVar(name.to_string())),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode(name.to_string())),
    }
}

/// Boolean variables are true for `1` or `true` (any case), false otherwise or when unset.
fn get_env_bool<F>(lookup: &F, name: &str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    let value = get_env(lookup, name, Some("false"))?;
    Ok(value == "1" || value.eq_ignore_ascii_case("true"))
}

/// The bulk endpoint path is absolute, so it replaces any path on the base.
fn bulk_endpoint(api: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        name: "DEPOT_API".into(),
        value: api.to_string(),
        reason,
    };
    let base = Url::parse(api).map_err(|err| invalid(err.to_string()))?;
    base.join(BULK_PRESIGNED_PATH)
        .map_err(|err| invalid(err.to_string()))
}
