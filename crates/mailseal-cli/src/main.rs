// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// mailseal: run outgoing mail through the signing/encryption pipeline.
//
// Dispatched envelopes are written to stdout as JSON lines (re-submitted
// recipients first, the returned envelope last); logs go to stderr.

mod transport;

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use mailseal_core::types::{OutgoingMessage, Scheme};
use mailseal_core::MailConfig;
use mailseal_mail::{
    AgeKeyEncryptor, CredentialStore, CustomerRoleOverride, InMemoryCredentialStore, MailFanout,
    OpenSslEnveloper, PgpAdapter, SigningSource, SmimeAdapter, SqliteCredentialStore,
    StoredCredential,
};
use mailseal_security::{AuditLog, SecureEraser, SigningKeypair, StagingArea};

use crate::transport::JsonLinesTransport;

/// Per-recipient signing and encryption for outgoing mail.
#[derive(Parser, Debug)]
#[command(name = "mailseal")]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, env = "MAILSEAL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "MAILSEAL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format (plain, json)
    #[arg(long, env = "MAILSEAL_LOG_FORMAT", default_value = "plain")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dispatch a JSON message (`-` reads stdin)
    Dispatch {
        #[arg(default_value = "-")]
        message: PathBuf,
        /// Apply the customer-role signing rule
        #[arg(long)]
        customer_rule: bool,
    },
    /// Send a short test message to one address
    TestEmail { address: String },
    /// Generate the site signing keypair
    Keygen {
        /// Key identity, e.g. "Shop <shop@example.org>"
        #[arg(long)]
        identity: String,
        /// Where to write the armored private key
        #[arg(long)]
        out: PathBuf,
        /// Also export the armored public key
        #[arg(long)]
        public_out: Option<PathBuf>,
        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },
    /// Securely erase files
    Shred {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Overwrite passes (defaults to the configured value)
        #[arg(long)]
        passes: Option<u32>,
    },
    /// Store a recipient's key and/or certificate
    Import {
        address: String,
        /// File holding the recipient's public key
        #[arg(long)]
        key: Option<PathBuf>,
        /// File holding the recipient's certificate (PEM or DER)
        #[arg(long)]
        cert: Option<PathBuf>,
        /// Preferred scheme when both are present
        #[arg(long, default_value = "pgp")]
        method: String,
        #[arg(long)]
        redact_subject: bool,
        /// Do not send this recipient signed mail
        #[arg(long)]
        unsigned: bool,
        #[arg(long = "role")]
        roles: Vec<String>,
    },
    /// Remove a recipient's stored credentials
    Remove { address: String },
    /// Delete every stored recipient credential
    Purge {
        #[arg(long)]
        yes: bool,
    },
    /// Print recent delivery decisions from the audit log
    Audit {
        /// Only entries for this recipient, oldest first
        #[arg(long)]
        recipient: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

fn setup_logging(log_level: &str, log_format: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    match log_format.to_lowercase().as_str() {
        "json" => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set subscriber")?;
        }
        _ => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .with_target(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set subscriber")?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<MailConfig> {
    match path {
        Some(path) => MailConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(MailConfig::default()),
    }
}

fn open_store(config: &MailConfig) -> Result<Box<dyn CredentialStore>> {
    Ok(match &config.credential_db {
        Some(path) => Box::new(
            SqliteCredentialStore::open(path)
                .with_context(|| format!("opening credential store {}", path.display()))?,
        ),
        None => {
            warn!("no credential_db configured, every recipient is unknown");
            Box::new(InMemoryCredentialStore::new())
        }
    })
}

fn require_store(config: &MailConfig) -> Result<SqliteCredentialStore> {
    let path = config
        .credential_db
        .as_ref()
        .context("credential_db is not configured")?;
    SqliteCredentialStore::open(path)
        .with_context(|| format!("opening credential store {}", path.display()))
}

fn read_message(path: &Path) -> Result<OutgoingMessage> {
    let raw = if path == Path::new("-") {
        let mut raw = String::new();
        io::stdin().read_to_string(&mut raw).context("reading stdin")?;
        raw
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    serde_json::from_str(&raw).context("parsing message JSON")
}

/// Run `message` through the full pipeline, emitting every envelope.
fn dispatch(config: &MailConfig, message: OutgoingMessage, customer_rule: bool) -> Result<()> {
    let store = open_store(config)?;
    let audit = config
        .audit_db
        .as_ref()
        .map(|path| AuditLog::open(path).with_context(|| format!("opening audit log {}", path.display())))
        .transpose()?;

    let staging = StagingArea::from_config(config);
    let pgp = PgpAdapter::new(AgeKeyEncryptor);
    let smime = SmimeAdapter::new(
        staging.clone(),
        OpenSslEnveloper::new(config.openssl_binary.clone(), staging),
    );
    let transport = JsonLinesTransport::new(io::stdout().lock());
    let rule = CustomerRoleOverride::default();

    let mut fanout = MailFanout::new(config, store.as_ref(), &pgp, &smime, &transport);
    if let Some(path) = &config.signing_key_path {
        fanout = fanout.with_signing(SigningSource::KeyFile(path.clone()));
    }
    if customer_rule {
        fanout = fanout.with_sign_override(&rule);
    }
    if let Some(audit) = &audit {
        fanout = fanout.with_audit(audit);
    }

    let (last, stats) = fanout.dispatch_with_stats(message)?;
    transport.emit(last)?;
    info!(
        recipients = stats.recipients,
        encrypted = stats.encrypted,
        signed = stats.signed,
        "messages emitted"
    );
    Ok(())
}

fn keygen(identity: &str, out: &Path, public_out: Option<&Path>, force: bool) -> Result<()> {
    if out.exists() && !force {
        bail!("{} already exists (use --force to replace it)", out.display());
    }
    let keypair = SigningKeypair::generate(identity)?;
    write_private(out, keypair.to_armored().as_bytes())
        .with_context(|| format!("writing {}", out.display()))?;
    if let Some(path) = public_out {
        std::fs::write(path, keypair.public_key_armored())
            .with_context(|| format!("writing {}", path.display()))?;
    }
    info!(key_id = %keypair.key_id(), path = %out.display(), "signing keypair written");
    println!("{}", keypair.key_id());
    Ok(())
}

fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)?.write_all(bytes)
}

fn shred(config: &MailConfig, paths: &[PathBuf], passes: Option<u32>) -> Result<()> {
    let config = MailConfig {
        erasure_passes: passes.unwrap_or(config.erasure_passes),
        ..config.clone()
    };
    config.validate()?;
    let eraser = SecureEraser::from_config(&config);

    let mut failed = 0usize;
    for path in paths {
        let outcome = eraser.erase(path);
        println!("{}\t{outcome:?}", path.display());
        failed += usize::from(!outcome.is_success());
    }
    if failed > 0 {
        bail!("{failed} of {} paths not erased", paths.len());
    }
    Ok(())
}

fn audit(config: &MailConfig, recipient: Option<&str>, limit: u32) -> Result<()> {
    let path = config
        .audit_db
        .as_ref()
        .context("audit_db is not configured")?;
    let log = AuditLog::open(path)
        .with_context(|| format!("opening audit log {}", path.display()))?;
    let entries = match recipient {
        Some(recipient) => log.entries_for_recipient(recipient)?,
        None => log.recent_entries(limit)?,
    };
    for entry in &entries {
        println!("{}", serde_json::to_string(entry)?);
    }
    Ok(())
}

fn read_optional(path: Option<&PathBuf>) -> Result<Option<String>> {
    path.map(|p| std::fs::read(p).with_context(|| format!("reading {}", p.display())))
        .transpose()?
        .map(|bytes| {
            String::from_utf8(bytes).or_else(|e| {
                // Raw DER certificates are stored as PEM.
                mailseal_mail::parse_certificate(e.as_bytes())
                    .map(|cert| cert.pem().to_owned())
                    .context("credential file is neither text nor a DER certificate")
            })
        })
        .transpose()
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level, &args.log_format)?;
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Dispatch {
            message,
            customer_rule,
        } => dispatch(&config, read_message(&message)?, customer_rule),

        Command::TestEmail { address } => {
            let message = OutgoingMessage::new(
                &address,
                "Mailseal test email",
                "This is a test message from Mailseal.\n\n\
                 If your mail client shows it as signed and/or encrypted, your\n\
                 key and certificate settings are working.\n",
            );
            dispatch(&config, message, false)
        }

        Command::Keygen {
            identity,
            out,
            public_out,
            force,
        } => keygen(&identity, &out, public_out.as_deref(), force),

        Command::Shred { paths, passes } => shred(&config, &paths, passes),

        Command::Import {
            address,
            key,
            cert,
            method,
            redact_subject,
            unsigned,
            roles,
        } => {
            let credential = StoredCredential {
                public_key: read_optional(key.as_ref())?,
                certificate: read_optional(cert.as_ref())?,
                method: method.parse::<Scheme>()?,
                redact_subject,
                receive_signed: !unsigned,
                roles,
            };
            if credential.public_key.is_none() && credential.certificate.is_none() {
                bail!("nothing to import: pass --key and/or --cert");
            }
            require_store(&config)?.upsert(&address, &credential)?;
            info!(%address, "credentials imported");
            Ok(())
        }

        Command::Remove { address } => {
            if !require_store(&config)?.remove(&address)? {
                warn!(%address, "no stored credentials");
            }
            Ok(())
        }

        Command::Purge { yes } => {
            if !yes {
                bail!("refusing to purge without --yes");
            }
            let removed = require_store(&config)?.purge_all()?;
            println!("{removed}");
            Ok(())
        }

        Command::Audit { recipient, limit } => audit(&config, recipient.as_deref(), limit),
    }
}
