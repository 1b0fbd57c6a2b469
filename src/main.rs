use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use vocalis::audio::{decode_wav, RawAudio};
use vocalis::auth::{Authenticator, Identity};
use vocalis::config::AuthConfig;
use vocalis::error::AuthError;
use vocalis::paths::AppPaths;

#[derive(Parser, Debug)]
#[command(version, about = "Voice biometric authentication with one-time codes", long_about = None)]
struct Cli {
    /// Keep config and data under this directory instead of the OS locations
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file (defaults to config.toml in the config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enroll (or re-enroll) a user from one or more WAV recordings
    Enroll {
        user: String,
        #[arg(required = true)]
        samples: Vec<PathBuf>,
    },
    /// Verify a recording against a user's profile
    Verify { user: String, sample: PathBuf },
    /// Voice check followed by a one-time code sent to the contact address
    Login {
        user: String,
        sample: PathBuf,
        /// Where the one-time code is delivered
        #[arg(long)]
        contact: String,
    },
    /// List enrolled users, or show one user's profile
    Profiles { user: Option<String> },
    /// Delete a user's profile
    Delete { user: String },
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: &'static str,
    kind: vocalis::error::ErrorKind,
    message: &'a str,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        match e.downcast_ref::<AuthError>() {
            Some(auth_err) => {
                let message = auth_err.to_string();
                let _ = print_json(&ErrorResponse {
                    error: auth_err.code(),
                    kind: auth_err.kind(),
                    message: &message,
                });
                std::process::exit(2);
            }
            None => {
                log::error!("{:#}", e);
                std::process::exit(1);
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let paths = match cli.root {
        Some(root) => AppPaths::rooted_at(root),
        None => AppPaths::new()?,
    };
    paths.ensure_directories()?;

    let config_path = cli.config.unwrap_or_else(|| paths.config_file());
    let config = AuthConfig::load_or_create(&config_path)?;

    let auth = Authenticator::open(&paths, &config).context("Failed to open authenticator")?;

    match cli.command {
        Command::Enroll { user, samples } => {
            let audio = samples
                .iter()
                .map(|p| load_sample(p))
                .collect::<Result<Vec<_>>>()?;
            print_json(&auth.enroll(&user, &audio)?)
        }
        Command::Verify { user, sample } => {
            print_json(&auth.verify(&user, &load_sample(&sample)?)?)
        }
        Command::Login {
            user,
            sample,
            contact,
        } => {
            let identity = Identity { user, contact };
            let login = auth.begin_login(&identity, &load_sample(&sample)?)?;
            print_json(&login)?;
            if login.code.is_none() {
                return Ok(());
            }

            let code = prompt(&format!("Code sent to {}: ", identity.contact))?;
            print_json(&auth.complete_login(&identity, &code)?)
        }
        Command::Profiles { user: Some(user) } => print_json(&auth.profile_info(&user)?),
        Command::Profiles { user: None } => print_json(&auth.list_profiles()?),
        Command::Delete { user } => {
            auth.delete_profile(&user)?;
            print_json(&serde_json::json!({ "deleted": user }))
        }
    }
}

fn load_sample(path: &Path) -> Result<RawAudio> {
    let audio = decode_wav(path)?;
    log::debug!(
        "Loaded {} ({} ms @ {} Hz, {} ch)",
        path.display(),
        audio.duration_ms(),
        audio.sample_rate,
        audio.channels
    );
    Ok(audio)
}

fn prompt(message: &str) -> Result<String> {
    eprint!("{}", message);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read code from stdin")?;
    Ok(line.trim().to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
