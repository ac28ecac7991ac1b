//! Tokenlogin - token login CLI

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

use tokenlogin::{
    store::soft::DEFAULT_TOKEN_LABEL, verify, CredentialStore, Expectation, LoginSession,
    SoftTokenStore,
};
use tokenlogin_core::{
    escape_properties_value, ConfigLayers, EnvSource, LoginMode, PinCandidates, PinSource,
    ProcessEnv, Properties, RawPin, ResolvedCredentials, StorePath, STORE_PATH_KEY,
    STORE_PIN_KEY,
};

/// Tokenlogin - resolve a token PIN and log in
#[derive(Parser)]
#[command(name = "tokenlogin")]
#[command(about = "Resolve a token PIN from configuration and log in")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a software token protected by a PIN (empty when no source is named)
    Provision {
        /// Token directory
        #[arg(long)]
        dir: PathBuf,

        /// Token label
        #[arg(long, default_value = DEFAULT_TOKEN_LABEL)]
        label: String,

        /// Environment variable holding the PIN
        #[arg(long)]
        pin_env: Option<String>,

        /// File whose first line is the PIN
        #[arg(long)]
        pin_file: Option<PathBuf>,
    },

    /// Log in to a token and run a crypto probe
    Login {
        /// Store path override (e.g. sql:/etc/pki/nssdb)
        #[arg(long)]
        store_path: Option<String>,

        /// Store PIN descriptor override: pin:<value>, env:<VAR> or file:<path>
        #[arg(long)]
        pin: Option<String>,

        /// Security properties file providing defaults for both keys
        #[arg(long)]
        security_properties: Option<PathBuf>,

        /// Log in explicitly with the PIN from this environment variable
        #[arg(long)]
        explicit_pin_env: Option<String>,

        /// Verify the outcome: fail unless the PIN came from this source
        #[arg(long, value_enum)]
        expect_source: Option<SourceArg>,

        /// Store path the login must have used (requires --expect-source)
        #[arg(long, requires = "expect_source")]
        expect_path: Option<String>,

        /// Login mode the session must have used (requires --expect-source).
        /// Defaults to explicit with --explicit-pin-env, implicit otherwise.
        #[arg(long, value_enum, requires = "expect_source")]
        expect_mode: Option<ModeArg>,

        /// Treat the store path as a PKCS#11 module
        #[cfg(feature = "pkcs11")]
        #[arg(long)]
        pkcs11: bool,

        /// PKCS#11 slot index
        #[cfg(feature = "pkcs11")]
        #[arg(long, default_value = "0")]
        slot: usize,
    },

    /// Escape a value for a security properties file
    Escape {
        /// Value to escape
        value: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Config,
    Environment,
    File,
    None,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Implicit,
    Explicit,
}

impl From<ModeArg> for LoginMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Implicit => LoginMode::Implicit,
            ModeArg::Explicit => LoginMode::Explicit,
        }
    }
}

/// Expected outcome checked after `login`
struct Expected {
    source: SourceArg,
    path: Option<String>,
    mode: Option<ModeArg>,
}

impl From<SourceArg> for PinSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Config => PinSource::Config,
            SourceArg::Environment => PinSource::Environment,
            SourceArg::File => PinSource::File,
            SourceArg::None => PinSource::None,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tokenlogin=info,tokenlogin_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Provision {
            dir,
            label,
            pin_env,
            pin_file,
        } => {
            let pin = provisioning_pin(pin_env.as_deref(), pin_file.as_deref(), &ProcessEnv)?;
            SoftTokenStore::provision(&dir, &label, &pin)?;
            println!("Software token '{}' created in {}", label, dir.display());
        }

        Commands::Login {
            store_path,
            pin,
            security_properties,
            explicit_pin_env,
            expect_source,
            expect_path,
            expect_mode,
            #[cfg(feature = "pkcs11")]
            pkcs11,
            #[cfg(feature = "pkcs11")]
            slot,
        } => {
            let mut system = Properties::new();
            if let Some(path) = store_path {
                system.set(STORE_PATH_KEY, path);
            }
            if let Some(descriptor) = pin {
                system.set(STORE_PIN_KEY, descriptor);
            }

            let security = match &security_properties {
                Some(path) => {
                    let text = Zeroizing::new(std::fs::read_to_string(path)?);
                    Properties::parse(&text)?
                }
                None => Properties::new(),
            };

            let credentials = ConfigLayers::new(system, security).resolve(&ProcessEnv);

            let explicit_pin = match &explicit_pin_env {
                Some(name) => Some(explicit_pin_from_env(name, &ProcessEnv)?),
                None => None,
            };

            let expected = expect_source.map(|source| Expected {
                source,
                path: expect_path,
                mode: expect_mode,
            });

            #[cfg(feature = "pkcs11")]
            if pkcs11 {
                return run_login(
                    tokenlogin::Pkcs11Store::new(slot),
                    credentials,
                    explicit_pin,
                    expected,
                );
            }

            run_login(SoftTokenStore::new(), credentials, explicit_pin, expected)?;
        }

        Commands::Escape { value } => {
            println!("{}", escape_properties_value(&value));
        }
    }

    Ok(())
}

/// PIN for a new token. A named source that yields nothing is an error.
fn provisioning_pin(
    pin_env: Option<&str>,
    pin_file: Option<&Path>,
    env: &dyn EnvSource,
) -> anyhow::Result<RawPin> {
    let mut candidates = PinCandidates::new();
    if let Some(name) = pin_env {
        candidates = candidates.with_env_var(name, env);
    }
    if let Some(path) = pin_file {
        candidates = candidates.with_pin_file(path);
    }
    let resolution = candidates.resolve();

    if resolution.is_absent() {
        if let Some(name) = pin_env {
            anyhow::bail!("PIN environment variable {} is not set", name);
        }
        if let Some(path) = pin_file {
            anyhow::bail!("Cannot read a PIN from {}", path.display());
        }
        info!("no PIN source given, provisioning with the empty PIN");
        return Ok(RawPin::empty());
    }

    info!(source = %resolution.source(), "provisioning PIN resolved");
    Ok(resolution.into_pin().unwrap_or_else(RawPin::empty))
}

/// PIN for an explicit login, read from the environment variable `name`
fn explicit_pin_from_env(name: &str, env: &dyn EnvSource) -> anyhow::Result<RawPin> {
    match env.var(name) {
        Some(value) => Ok(RawPin::new(value.as_str())),
        None => anyhow::bail!("Explicit PIN variable {} is not set", name),
    }
}

fn expectation(
    expected: &Expected,
    resolved_path: &StorePath,
    explicit: bool,
) -> Expectation {
    let store_path = match &expected.path {
        Some(path) => StorePath::new(path.as_str()),
        None => resolved_path.clone(),
    };
    let mode = match expected.mode {
        Some(mode) => mode.into(),
        None if explicit => LoginMode::Explicit,
        None => LoginMode::Implicit,
    };
    Expectation::new(store_path, expected.source.into(), mode)
}

fn run_login<S: CredentialStore>(
    store: S,
    credentials: ResolvedCredentials,
    explicit_pin: Option<RawPin>,
    expected: Option<Expected>,
) -> anyhow::Result<()> {
    let resolved_path = credentials.store_path.clone();
    let explicit = explicit_pin.is_some();
    let mut session = LoginSession::new(store, credentials);

    let outcome = match &explicit_pin {
        Some(pin) => session.login_explicit(pin).and_then(|_| session.probe()),
        None => session.probe(),
    };
    drop(explicit_pin);

    let inspection = session.inspect();
    println!("Store path:  {}", inspection.store_path());
    println!("PIN source:  {}", inspection.pin_source());
    if let Some(mode) = inspection.mode() {
        println!("Login mode:  {}", mode);
    }
    if let Some(label) = session.token_label() {
        println!("Token:       {}", label);
    }
    println!("State:       {}", inspection.state());

    if let Err(e) = outcome {
        error!("Login failed: {}", e);
        return Err(e.into());
    }

    if let Some(expected) = &expected {
        verify(&expectation(expected, &resolved_path, explicit), &inspection)?;
        println!("Verification succeeded.");
    }

    Ok(())
}
