use crate::VaultEnv;
use crate::credentials::{AuthMaterial, CredentialProvider, sources};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use colored::Colorize;
use std::env;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use vaultenv_core::{GlobalConfig, GlobalDefaults};

/// Main CLI structure for the vaultenv application.
#[derive(Parser)]
#[command(name = "vaultenv")]
#[command(about = "Inject HashiCorp Vault secrets into a build step's environment", long_about = None)]
#[command(version)]
struct Cli {
    /// Manifest to load
    #[arg(short, long, global = true, default_value = vaultenv_core::MANIFEST_FILE)]
    file: PathBuf,
    /// Credential source (env://, dotenv:.env, toml:credentials.toml, keyring://)
    #[arg(short, long, global = true, env = "VAULTENV_CREDENTIALS")]
    credentials: Option<String>,
    /// The subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example vaultenv.toml
    Init,
    /// Read every declared secret and report what is missing
    Check,
    /// Run a command with the declared secrets in its environment
    Run {
        /// Command and arguments to run
        #[arg(trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Print a single secret value
    Get {
        /// Vault path, e.g. secret/app/db
        path: String,
        /// Key inside the secret
        key: String,
        /// KV engine version (1 or 2)
        #[arg(short, long)]
        engine_version: Option<u8>,
    },
    /// Replace the secret at a path with the given KEY=VALUE pairs
    Write {
        /// Vault path, e.g. secret/app/db
        path: String,
        /// Values to write
        #[arg(required = true, value_parser = parse_key_value)]
        pairs: Vec<(String, String)>,
        /// KV engine version (1 or 2)
        #[arg(short, long)]
        engine_version: Option<u8>,
    },
    /// Save a Vault token for a credential reference
    Login {
        /// Credential reference, e.g. "vault" or "ci"
        credential: String,
    },
    /// Init or show ~/.config/vaultenv/config.toml
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Initialize user configuration
    Init,
    /// Show current configuration
    Show,
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("VAULTENV_LOG")
        .unwrap_or_else(|_| "vaultenv=error".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Example manifest written by `vaultenv init`.
fn example_manifest() -> &'static str {
    r#"# Extend shared declarations from other directories
# extends = ["../shared"]

[vault]
url = "https://vault.example.com:8200"
# Name looked up by the credential source (env:// reads VAULT_TOKEN for "vault")
credential = "vault"
fail_if_not_found = true
engine_version = 2
# timeout = 60
# retries = 5
# retry_interval_ms = 1000
# namespace = "team-a"
# prefix_path_depth = 1

[[secrets]]
path = "secret/${DEPLOY_ENV}/database"
values = [
  { vault_key = "username", env_var = "DB_USER" },
  { vault_key = "password", env_var = "DB_PASSWORD" },
]

# Values carrying a secret are written instead of read
# [[secrets]]
# path = "secret/build/metadata"
# values = [{ vault_key = "pipeline", secret = "nightly" }]
"#
}

fn init_manifest(path: &Path) -> Result<()> {
    if path.exists() {
        use inquire::Confirm;
        let overwrite = Confirm::new(&format!("{} already exists. Overwrite?", path.display()))
            .with_default(false)
            .prompt()?;

        if !overwrite {
            println!("Cancelled.");
            return Ok(());
        }
    }

    fs::write(path, example_manifest())?;

    #[cfg(unix)]
    {
        let metadata = fs::metadata(path)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(path, permissions)?;
    }

    println!("{} Created {}", "✓".green(), path.display());
    println!("\nNext steps:");
    println!("  1. vaultenv config init         # Set your Vault URL and credentials");
    println!("  2. vaultenv check               # Verify every secret resolves");
    println!("  3. vaultenv run -- your-command # Run with secrets");
    Ok(())
}

fn login(credential: &str, credentials_arg: Option<String>) -> Result<()> {
    let source_uri = credentials_arg.unwrap_or_else(|| "keyring://".to_string());
    let source = Box::<dyn CredentialProvider>::try_from(source_uri.as_str())?;
    if !source.allows_store() {
        return Err(eyre!(
            "Credential source '{}' is read-only, use keyring:// to log in",
            source.name()
        ));
    }

    let token = rpassword::prompt_password(format!("Vault token for '{}': ", credential))?;
    if token.trim().is_empty() {
        return Err(eyre!("No token entered"));
    }

    source
        .store(credential, &AuthMaterial::Token(token.trim().to_string()))
        .wrap_err("Failed to store token")?;
    println!(
        "{} Saved token for '{}' in {}",
        "✓".green(),
        credential,
        source.name()
    );
    Ok(())
}

fn config_init() -> Result<()> {
    use inquire::{Select, Text};

    let url = Text::new("Default Vault URL:")
        .with_default(&env::var("VAULT_ADDR").unwrap_or_default())
        .prompt()?;
    let credential = Text::new("Default credential reference:")
        .with_default(crate::DEFAULT_CREDENTIAL)
        .prompt()?;

    let infos = sources();
    let choices: Vec<String> = infos.iter().map(|info| info.display_with_examples()).collect();
    let selected = Select::new("Select your credential source:", choices).prompt()?;
    let name = selected.split(':').next().unwrap_or("env");
    let default_uri = infos
        .iter()
        .find(|info| info.name == name)
        .and_then(|info| info.examples.first().copied())
        .unwrap_or("env://");
    let source_uri = Text::new("Credential source URI:")
        .with_default(default_uri)
        .prompt()?;

    let non_empty = |value: String| {
        let value = value.trim().to_string();
        if value.is_empty() { None } else { Some(value) }
    };
    let config = GlobalConfig {
        defaults: GlobalDefaults {
            url: non_empty(url),
            credential: non_empty(credential),
            credentials: non_empty(source_uri),
        },
    };

    config.save()?;
    println!(
        "\n{} Configuration saved to {}",
        "✓".green(),
        GlobalConfig::path()?.display()
    );
    Ok(())
}

fn config_show() -> Result<()> {
    match crate::config::load_global_config()? {
        Some(config) => {
            let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "(none)".into());
            println!("Configuration file: {}\n", GlobalConfig::path()?.display());
            println!("URL:         {}", show(&config.defaults.url));
            println!("Credential:  {}", show(&config.defaults.credential));
            println!("Source:      {}", show(&config.defaults.credentials));
        }
        None => {
            println!("No configuration found. Run 'vaultenv config init' to create one.");
        }
    }
    Ok(())
}

/// Entry point of the `vaultenv` binary.
pub fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => init_manifest(&cli.file),
        Commands::Check => {
            let app = VaultEnv::load(&cli.file, cli.credentials)
                .wrap_err("Failed to load vaultenv configuration")?;
            app.check().wrap_err("Failed to check secrets")?;
            Ok(())
        }
        Commands::Run { command } => {
            let app = VaultEnv::load(&cli.file, cli.credentials)
                .wrap_err("Failed to load vaultenv configuration")?;
            app.run(command).wrap_err("Failed to run command")?;
            Ok(())
        }
        Commands::Get {
            path,
            key,
            engine_version,
        } => {
            let app = VaultEnv::load_or_default(&cli.file, cli.credentials)
                .wrap_err("Failed to load vaultenv configuration")?;
            let value = app
                .get(&path, &key, engine_version)
                .wrap_err("Failed to get secret")?;
            println!("{}", value);
            Ok(())
        }
        Commands::Write {
            path,
            pairs,
            engine_version,
        } => {
            let app = VaultEnv::load_or_default(&cli.file, cli.credentials)
                .wrap_err("Failed to load vaultenv configuration")?;
            app.write(&path, pairs, engine_version)
                .wrap_err("Failed to write secret")?;
            Ok(())
        }
        Commands::Login { credential } => login(&credential, cli.credentials),
        Commands::Config { action } => match action {
            ConfigAction::Init => config_init(),
            ConfigAction::Show => config_show(),
        },
    }
}
