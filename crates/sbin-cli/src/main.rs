//! sbin: secretbin command-line client
//!
//! Commands:
//!   send [MESSAGE] [-f FILE]...  - encrypt, upload, print the share link
//!   open <LINK> [--out DIR]      - fetch, decrypt, print message, save files
//!   status                       - show storage backend health
//!   config show                  - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::SecretString;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

use sbin_core::config::StorageBackend;
use sbin_core::{Expires, SbinConfig, SubmitOptions};
use sbin_crypto::{Link, Secret};
use sbin_storage::operator::expand_home;
use sbin_storage::{build_from_config, check_health, OpendalStore, SecretClient};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sbin",
    version,
    about = "secretbin client",
    long_about = "sbin: share end-to-end encrypted messages and files through one-time links"
)]
struct Cli {
    /// Path to sbin configuration file
    #[arg(
        long,
        short = 'c',
        env = "SBIN_CONFIG",
        default_value = "~/.config/sbin/config.toml"
    )]
    config: PathBuf,

    /// Log filter (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "SBIN_LOG")]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "SBIN_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a message (and files) and print a share link
    ///
    /// The message is read from stdin when not given. The password, if any,
    /// comes from SBIN_PASSWORD or an interactive prompt.
    Send {
        /// Message text (default: read from stdin)
        message: Option<String>,
        /// Attach a file (repeatable; order is preserved)
        #[arg(long = "file", short = 'f')]
        files: Vec<PathBuf>,
        /// Expiry, e.g. 5min, 1hr, 1d, 1w (default: client.default_expires)
        #[arg(long, short = 'e')]
        expires: Option<Expires>,
        /// Delete the secret after this many reads
        #[arg(long, short = 'b')]
        burn_after: Option<u32>,
        /// Anti-bruteforce delay hint in seconds
        #[arg(long)]
        slowdown: Option<u32>,
        /// Prompt for a password (second factor on top of the link)
        #[arg(long, short = 'p')]
        password_prompt: bool,
    },

    /// Fetch and decrypt a secret from its share link
    Open {
        /// Share link (https://host/secret/<id>#<key>)
        link: String,
        /// Directory to write attachments into (default: current dir)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Check that the storage backend is reachable
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_home(&cli.config);
    let (config, from_file) = load_config(&config_path)?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match cli.log_format {
        Some(f) => f,
        None => LogFormat::from_str(&config.log.format, true)
            .map_err(|e| anyhow::anyhow!("log.format: {e}"))?,
    };
    init_logging(&level, &format);

    if !from_file {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            config_path.display()
        );
    }

    match cli.command {
        Commands::Send {
            message,
            files,
            expires,
            burn_after,
            slowdown,
            password_prompt,
        } => {
            let options = SubmitOptions {
                password: send_password(password_prompt)?,
                expires,
                burn_after,
                slowdown,
            };
            cmd_send(&config, message, &files, &options).await
        }
        Commands::Open { link, out } => cmd_open(&config, &link, out.as_deref()).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path, from_file),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the link and the message; logs go to stderr
    let layer = fmt::layer().with_writer(std::io::stderr);

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .init();
        }
    }
}

/// Returns the config and whether it came from a file.
fn load_config(path: &Path) -> Result<(SbinConfig, bool)> {
    if path.exists() {
        let config = SbinConfig::load(path)
            .with_context(|| format!("loading config: {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((SbinConfig::default(), false))
    }
}

fn build_client(config: &SbinConfig) -> Result<SecretClient<OpendalStore>> {
    let op = build_from_config(&config.storage).context("building storage operator")?;
    let store = OpendalStore::new(op, &config.storage.prefix);
    SecretClient::new(store, config).context("building secret client")
}

// ── Passwords ─────────────────────────────────────────────────────────────────

fn env_password() -> Option<SecretString> {
    std::env::var("SBIN_PASSWORD")
        .ok()
        .filter(|p| !p.is_empty())
        .map(SecretString::from)
}

fn send_password(prompt: bool) -> Result<Option<SecretString>> {
    if let Some(pw) = env_password() {
        return Ok(Some(pw));
    }
    if !prompt {
        return Ok(None);
    }

    let first = rpassword::prompt_password("Password: ").context("reading password")?;
    let second = rpassword::prompt_password("Confirm password: ").context("reading password")?;
    if first != second {
        anyhow::bail!("passwords do not match");
    }
    if first.is_empty() {
        anyhow::bail!("empty password; omit --password-prompt to send without one");
    }
    Ok(Some(SecretString::from(first)))
}

fn open_password(link: &Link) -> Result<Option<SecretString>> {
    if !link.key_material().is_password_protected() {
        return Ok(None);
    }
    if let Some(pw) = env_password() {
        return Ok(Some(pw));
    }
    let pw = rpassword::prompt_password("This secret is password protected. Password: ")
        .context("reading password")?;
    Ok(Some(SecretString::from(pw)))
}

// ── `sbin send` ───────────────────────────────────────────────────────────────

async fn cmd_send(
    config: &SbinConfig,
    message: Option<String>,
    files: &[PathBuf],
    options: &SubmitOptions,
) -> Result<()> {
    let message = match message {
        Some(m) => m,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading message from stdin")?;
            buf
        }
    };

    let mut secret = Secret::new(message);
    for path in files {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading attachment: {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("attachment has no file name: {}", path.display()))?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        secret.add_attachment(filename, mime.essence_str(), content);
    }

    let client = build_client(config)?;
    let link = client.submit(&secret, options).await?;

    info!(
        location = %link.location(),
        password = options.password().is_some(),
        "share link created"
    );
    println!("{link}");
    Ok(())
}

// ── `sbin open` ───────────────────────────────────────────────────────────────

async fn cmd_open(config: &SbinConfig, url: &str, out: Option<&Path>) -> Result<()> {
    let link = Link::decode(url).context("parsing share link")?;
    let password = open_password(&link)?;

    let client = build_client(config)?;
    let secret = client
        .retrieve(&link, password.as_ref())
        .await
        .with_context(|| format!("opening {}", link.location()))?;

    println!("{}", secret.message);

    let out_dir = out.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    if !secret.attachments.is_empty() {
        tokio::fs::create_dir_all(&out_dir)
            .await
            .with_context(|| format!("creating {}", out_dir.display()))?;
    }
    for (index, attachment) in secret.attachments.iter().enumerate() {
        let path = out_dir.join(safe_file_name(&attachment.filename, index));
        write_new_file(&path, &attachment.content).await?;
        eprintln!(
            "wrote {} ({} bytes, {})",
            path.display(),
            attachment.content.len(),
            attachment.mime_type
        );
    }
    Ok(())
}

/// Base name only: a sender must not be able to choose where files land.
fn safe_file_name(name: &str, index: usize) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    match base {
        "" | "." | ".." => format!("attachment-{}", index + 1),
        other => other.to_string(),
    }
}

async fn write_new_file(path: &Path, content: &[u8]) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .with_context(|| format!("creating {} (refusing to overwrite)", path.display()))?;
    file.write_all(content)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    file.flush().await?;
    Ok(())
}

// ── `sbin status` ─────────────────────────────────────────────────────────────

async fn cmd_status(config: &SbinConfig) -> Result<()> {
    let op = build_from_config(&config.storage)?;
    let target = match config.storage.backend {
        StorageBackend::Memory => "memory".to_string(),
        StorageBackend::Fs => expand_home(&config.storage.root).display().to_string(),
        StorageBackend::S3 => format!("{}/{}", config.storage.endpoint, config.storage.bucket),
    };

    println!("backend:  {:?} ({target})", config.storage.backend);
    println!("links:    {}/<id>", config.client.base_url());
    match check_health(&op).await {
        Ok(()) => {
            println!("storage:  reachable");
            Ok(())
        }
        Err(e) => {
            println!("storage:  UNREACHABLE");
            Err(e)
        }
    }
}

// ── `sbin config show` ────────────────────────────────────────────────────────

fn cmd_config_show(config: &SbinConfig, config_path: &Path, from_file: bool) -> Result<()> {
    if from_file {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = config.to_toml_string()?;
    print!("{rendered}");

    if env_password().is_some() {
        println!();
        println!("# SBIN_PASSWORD is set and will be used for send/open");
    }
    Ok(())
}
