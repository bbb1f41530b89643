use std::{
    env, fs,
    path::{Path, PathBuf},
};

use secrecy::{ExposeSecret, SecretString};

use crate::{domain::ChoiceKind, errors::Error, Result};

pub const DEFAULT_SHEET_TITLE: &str = "Sheet1";
pub const DEFAULT_COFFEE_PRICE: f64 = 2.0;
pub const DEFAULT_TEA_PRICE: f64 = 1.5;
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BROADCAST_HOUR: u32 = 9;

/// Static per-kind prices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pricing {
    pub coffee: f64,
    pub tea: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            coffee: DEFAULT_COFFEE_PRICE,
            tea: DEFAULT_TEA_PRICE,
        }
    }
}

impl Pricing {
    pub fn price_for(&self, kind: &ChoiceKind) -> Option<f64> {
        match kind {
            ChoiceKind::Coffee => Some(self.coffee),
            ChoiceKind::Tea => Some(self.tea),
            ChoiceKind::Other(_) => None,
        }
    }
}

/// Typed configuration, loaded from the environment (and an optional `.env`).
///
/// Missing credentials are not fatal here; see [`Config::missing_required`].
/// Credentials are held as [`SecretString`] so `Debug` output redacts them.
#[derive(Clone, Debug)]
pub struct Config {
    // Slack
    pub slack_bot_token: SecretString,
    pub slack_signing_secret: SecretString,

    // Ledger
    pub spreadsheet_id: String,
    pub sheet_title: String,
    pub google_credentials_file: Option<PathBuf>,
    pub google_access_token: Option<SecretString>,

    // Billing
    pub pricing: Pricing,
    pub pay_link: Option<String>,

    // Server
    pub port: u16,

    // Broadcast
    pub broadcast_enabled: bool,
    pub broadcast_hour: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slack_bot_token: SecretString::default(),
            slack_signing_secret: SecretString::default(),
            spreadsheet_id: String::new(),
            sheet_title: DEFAULT_SHEET_TITLE.to_string(),
            google_credentials_file: None,
            google_access_token: None,
            pricing: Pricing::default(),
            pay_link: None,
            port: DEFAULT_PORT,
            broadcast_enabled: true,
            broadcast_hour: DEFAULT_BROADCAST_HOUR,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let slack_bot_token = SecretString::from(env_str("SLACK_BOT_TOKEN").unwrap_or_default());
        let slack_signing_secret =
            SecretString::from(env_str("SLACK_SIGNING_SECRET").unwrap_or_default());

        let spreadsheet_id = env_str("SPREADSHEET_ID").unwrap_or_default();
        let sheet_title = env_str("SHEET_TITLE")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_SHEET_TITLE.to_string());
        let google_credentials_file = env_str("GOOGLE_APPLICATION_CREDENTIALS")
            .and_then(non_empty)
            .map(PathBuf::from);
        let google_access_token = env_str("GOOGLE_ACCESS_TOKEN")
            .and_then(non_empty)
            .map(SecretString::from);

        let pricing = Pricing {
            coffee: env_price("COFFEE_PRICE")?.unwrap_or(DEFAULT_COFFEE_PRICE),
            tea: env_price("TEA_PRICE")?.unwrap_or(DEFAULT_TEA_PRICE),
        };
        let pay_link = env_str("PAY_LINK").and_then(non_empty);

        let port = env_u16("PORT").unwrap_or(DEFAULT_PORT);

        let broadcast_enabled = env_bool("BROADCAST_ENABLED").unwrap_or(true);
        let broadcast_hour = env_u32("BROADCAST_HOUR").unwrap_or(DEFAULT_BROADCAST_HOUR);
        if broadcast_hour > 23 {
            return Err(Error::Config(format!(
                "BROADCAST_HOUR must be 0-23, got {broadcast_hour}"
            )));
        }

        Ok(Self {
            slack_bot_token,
            slack_signing_secret,
            spreadsheet_id,
            sheet_title,
            google_credentials_file,
            google_access_token,
            pricing,
            pay_link,
            port,
            broadcast_enabled,
            broadcast_hour,
        })
    }

    /// Names of required settings that are absent.
    ///
    /// The bot still starts without them; operations needing them fail when exercised.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.slack_bot_token.expose_secret().trim().is_empty() {
            out.push("SLACK_BOT_TOKEN");
        }
        if self.slack_signing_secret.expose_secret().trim().is_empty() {
            out.push("SLACK_SIGNING_SECRET");
        }
        if self.spreadsheet_id.trim().is_empty() {
            out.push("SPREADSHEET_ID");
        }
        if self.google_credentials_file.is_none() && self.google_access_token.is_none() {
            out.push("GOOGLE_APPLICATION_CREDENTIALS");
        }
        out
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_u16(key: &str) -> Option<u16> {
    env_str(key).and_then(|s| s.trim().parse::<u16>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_price(key: &str) -> Result<Option<f64>> {
    let Some(raw) = env_str(key).and_then(non_empty) else {
        return Ok(None);
    };
    parse_price(&raw)
        .map(Some)
        .ok_or_else(|| Error::Config(format!("{key} must be a non-negative number, got {raw:?}")))
}

fn parse_price(s: &str) -> Option<f64> {
    let v = s.trim().parse::<f64>().ok()?;
    if v.is_finite() && v >= 0.0 {
        Some(v)
    } else {
        None
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
