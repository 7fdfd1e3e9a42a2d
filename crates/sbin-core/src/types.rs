use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{SbinError, SbinResult};

/// Expiry as written by a user: `<n><unit>` or a bare number of seconds.
///
/// Units: `s`, `min`, `h`/`hr`, `d`, `w`, `m` (30 days), `y` (365 days).
/// The label is kept as written so it can be matched against a list of
/// offered options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ExpiresRepr", into = "String")]
pub struct Expires {
    label: String,
    seconds: u64,
}

pub const DEFAULT_EXPIRES: &str = "1w";

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

impl Expires {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.seconds)
    }
}

impl FromStr for Expires {
    type Err = SbinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        let invalid = || SbinError::InvalidOption(format!("invalid expiry {label:?}"));

        let split = label
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(label.len());
        let (digits, unit) = label.split_at(split);
        if digits.is_empty() {
            return Err(invalid());
        }

        let n: u64 = digits.parse().map_err(|_| invalid())?;
        if n == 0 {
            return Err(SbinError::InvalidOption(format!(
                "expiry {label:?} must be positive"
            )));
        }

        let multiplier = match unit {
            "" | "s" => 1,
            "min" => MINUTE,
            "h" | "hr" => HOUR,
            "d" => DAY,
            "w" => 7 * DAY,
            "m" => 30 * DAY,
            "y" => 365 * DAY,
            _ => {
                return Err(SbinError::InvalidOption(format!(
                    "unknown unit in expiry {label:?}"
                )))
            }
        };

        Ok(Self {
            label: label.to_string(),
            seconds: n.checked_mul(multiplier).ok_or_else(invalid)?,
        })
    }
}

/// Serialized forms of [`Expires`]: a label, or an integer number of seconds.
#[derive(Deserialize)]
#[serde(untagged)]
enum ExpiresRepr {
    Seconds(u64),
    Label(String),
}

impl TryFrom<ExpiresRepr> for Expires {
    type Error = SbinError;

    fn try_from(repr: ExpiresRepr) -> Result<Self, Self::Error> {
        match repr {
            ExpiresRepr::Seconds(n) => n.to_string().parse(),
            ExpiresRepr::Label(s) => s.parse(),
        }
    }
}

impl TryFrom<String> for Expires {
    type Error = SbinError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Expires> for String {
    fn from(e: Expires) -> Self {
        e.label
    }
}

impl fmt::Display for Expires {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Per-submission options.
///
/// Only `password` reaches the envelope. The rest is retention policy for
/// the store.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitOptions {
    /// Second factor on top of the link key. Empty means none.
    #[serde(default, deserialize_with = "deserialize_password")]
    pub password: Option<SecretString>,
    /// Falls back to `client.default_expires`.
    #[serde(default)]
    pub expires: Option<Expires>,
    /// Maximum successful reads before the secret is deleted.
    #[serde(default, alias = "burnAfter")]
    pub burn_after: Option<u32>,
    /// Anti-bruteforce delay hint in seconds.
    #[serde(default)]
    pub slowdown: Option<u32>,
}

fn deserialize_password<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    pub fn with_expires(mut self, expires: Expires) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn with_burn_after(mut self, reads: u32) -> Self {
        self.burn_after = Some(reads);
        self
    }

    pub fn with_slowdown(mut self, seconds: u32) -> Self {
        self.slowdown = Some(seconds);
        self
    }

    /// The password, treating an empty string as absent.
    pub fn password(&self) -> Option<&SecretString> {
        self.password
            .as_ref()
            .filter(|p| !p.expose_secret().is_empty())
    }

    /// Check everything that can be checked without the store and fill in
    /// the configured default expiry.
    pub fn resolve(&self, client: &ClientConfig) -> SbinResult<ResolvedOptions> {
        if self.burn_after == Some(0) {
            return Err(SbinError::InvalidOption(
                "burn_after must be at least 1 read".into(),
            ));
        }
        if self.slowdown == Some(0) {
            return Err(SbinError::InvalidOption(
                "slowdown must be at least 1 second".into(),
            ));
        }

        let expires = match &self.expires {
            Some(e) => e.clone(),
            None => {
                let default = client.default_expiry()?;
                debug!(expires = %default, "no expiry given, using configured default");
                default
            }
        };

        if client.expires_options.is_empty() {
            let max = client.max_expiry()?;
            if expires.seconds() > max.seconds() {
                return Err(SbinError::InvalidOption(format!(
                    "expiry {expires} exceeds the maximum of {max}"
                )));
            }
        } else if !client.expires_options.iter().any(|o| o == expires.label()) {
            return Err(SbinError::InvalidOption(format!(
                "invalid expiry {expires}; valid options are: {}",
                client.expires_options.join(", ")
            )));
        }

        Ok(ResolvedOptions {
            expires,
            burn_after: self.burn_after,
            slowdown: self.slowdown,
            password_protected: self.password().is_some(),
        })
    }
}

/// Validated retention policy handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOptions {
    pub expires: Expires,
    pub burn_after: Option<u32>,
    pub slowdown: Option<u32>,
    pub password_protected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expires(s: &str) -> Expires {
        s.parse().unwrap()
    }

    #[test]
    fn test_expires_units() {
        assert_eq!(expires("30").seconds(), 30);
        assert_eq!(expires("30s").seconds(), 30);
        assert_eq!(expires("5min").seconds(), 300);
        assert_eq!(expires("1hr").seconds(), 3600);
        assert_eq!(expires("2h").seconds(), 7200);
        assert_eq!(expires("1d").seconds(), 86_400);
        assert_eq!(expires("1w").seconds(), 604_800);
        assert_eq!(expires("1m").seconds(), 2_592_000);
        assert_eq!(expires("1y").seconds(), 31_536_000);
        assert_eq!(expires(" 1hr ").label(), "1hr");
    }

    #[test]
    fn test_expires_rejects_garbage() {
        for s in ["", "hr", "0", "0d", "-1d", "1.5h", "1 h", "1fortnight", "99999999999999999999y"] {
            assert!(
                matches!(s.parse::<Expires>(), Err(SbinError::InvalidOption(_))),
                "{s:?} must be rejected"
            );
        }
    }

    #[test]
    fn test_expires_serde_uses_label() {
        #[derive(Deserialize, Serialize)]
        struct Wrap {
            e: Expires,
        }
        let w: Wrap = toml::from_str(r#"e = "1hr""#).unwrap();
        assert_eq!(w.e.seconds(), 3600);
        assert_eq!(toml::to_string(&w).unwrap().trim(), r#"e = "1hr""#);
        assert!(toml::from_str::<Wrap>(r#"e = "soon""#).is_err());
    }

    #[test]
    fn test_options_deserialize() {
        let opts: SubmitOptions = toml::from_str(
            r#"
password = "secret"
expires = "1hr"
burnAfter = 1
"#,
        )
        .unwrap();

        assert_eq!(opts.password().unwrap().expose_secret(), "secret");
        assert_eq!(opts.expires.as_ref().unwrap().seconds(), 3600);
        assert_eq!(opts.burn_after, Some(1));
        assert_eq!(opts.slowdown, None);
    }

    #[test]
    fn test_options_expires_as_seconds() {
        let opts: SubmitOptions = toml::from_str("expires = 3600").unwrap();
        let expires = opts.expires.unwrap();
        assert_eq!(expires.seconds(), 3600);
        assert_eq!(expires.label(), "3600");

        assert!(toml::from_str::<SubmitOptions>("expires = 0").is_err());
        assert!(toml::from_str::<SubmitOptions>("expires = -5").is_err());
    }

    #[test]
    fn test_options_reject_unknown_fields() {
        assert!(toml::from_str::<SubmitOptions>(r#"burn_afterr = 1"#).is_err());
    }

    #[test]
    fn test_empty_password_is_none() {
        let opts = SubmitOptions::new().with_password("");
        assert!(opts.password().is_none());
        let resolved = opts.resolve(&ClientConfig::default()).unwrap();
        assert!(!resolved.password_protected);
    }

    #[test]
    fn test_resolve_defaults() {
        let resolved = SubmitOptions::new().resolve(&ClientConfig::default()).unwrap();
        assert_eq!(resolved.expires.label(), DEFAULT_EXPIRES);
        assert_eq!(resolved.burn_after, None);
    }

    #[test]
    fn test_resolve_rejects_zero_counts() {
        let client = ClientConfig::default();
        assert!(matches!(
            SubmitOptions::new().with_burn_after(0).resolve(&client),
            Err(SbinError::InvalidOption(_))
        ));
        assert!(matches!(
            SubmitOptions::new().with_slowdown(0).resolve(&client),
            Err(SbinError::InvalidOption(_))
        ));
    }

    #[test]
    fn test_resolve_enforces_max_expires() {
        let client = ClientConfig::default();
        assert!(SubmitOptions::new()
            .with_expires(expires("1y"))
            .resolve(&client)
            .is_ok());
        let err = SubmitOptions::new()
            .with_expires(expires("2y"))
            .resolve(&client)
            .unwrap_err();
        assert!(err.to_string().contains("maximum"));
    }

    #[test]
    fn test_resolve_against_offered_options() {
        let client = ClientConfig {
            expires_options: vec!["5min".into(), "1hr".into(), "1d".into()],
            default_expires: "1hr".into(),
            ..ClientConfig::default()
        };

        let resolved = SubmitOptions::new()
            .with_password("secret")
            .with_expires(expires("1hr"))
            .with_burn_after(1)
            .resolve(&client)
            .unwrap();
        assert_eq!(resolved.expires.seconds(), 3600);
        assert_eq!(resolved.burn_after, Some(1));
        assert!(resolved.password_protected);

        // same duration, different label
        let err = SubmitOptions::new()
            .with_expires(expires("60min"))
            .resolve(&client)
            .unwrap_err();
        assert!(err.to_string().contains("valid options are: 5min, 1hr, 1d"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let opts = SubmitOptions::new().with_password("hunter2");
        assert!(!format!("{opts:?}").contains("hunter2"));
    }
}
