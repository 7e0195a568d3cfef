use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use std::path::PathBuf;

use tally_core::identity::DEFAULT_TOKEN_TTL_HOURS;

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub token_ttl_hours: i64,
    secret_override: Option<String>,
}

impl Config {
    /// Resolve paths and settings from `TALLY_*` environment variables,
    /// falling back to the platform data directory.
    pub fn load() -> Result<Self> {
        let data_dir = match env_var("TALLY_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("", "", "tally")
                .context("Could not determine home directory")?
                .data_dir()
                .to_path_buf(),
        };
        let mut config = Self::in_dir(data_dir)?;

        if let Some(path) = env_var("TALLY_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(ttl) = env_var("TALLY_TOKEN_TTL_HOURS") {
            config.token_ttl_hours = parse_ttl(&ttl)?;
        }
        config.secret_override = env_var("TALLY_SECRET_KEY");

        Ok(config)
    }

    /// Defaults rooted at `data_dir`, which is created if missing.
    pub fn in_dir(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("tally.db");

        Ok(Config {
            db_path,
            data_dir,
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            secret_override: None,
        })
    }

    /// Load the token signing secret, or generate and persist a new one.
    ///
    /// Returns `(secret, newly_created)` where `newly_created` is true when a
    /// fresh secret was just generated (first run).
    pub fn load_or_create_secret(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        if let Some(secret) = &self.secret_override {
            return Ok((secret.clone(), false));
        }

        let path = self.data_dir.join("secret_key");

        if path.exists() {
            let secret = std::fs::read_to_string(&path).context("Failed to read secret key file")?;
            let secret = secret.trim().to_string();
            if !secret.is_empty() {
                return Ok((secret, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let secret = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &secret).context("Failed to write secret key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set secret key file permissions")?;
        }
        tracing::info!(path = %path.display(), "generated new token signing secret");
        Ok((secret, true))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_ttl(raw: &str) -> Result<i64> {
    let hours: i64 = raw
        .trim()
        .parse()
        .with_context(|| format!("Invalid TALLY_TOKEN_TTL_HOURS '{raw}'"))?;
    if !(1..=24 * 365).contains(&hours) {
        bail!("TALLY_TOKEN_TTL_HOURS must be between 1 and 8760");
    }
    Ok(hours)
}
