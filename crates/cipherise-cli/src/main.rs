//! Cipherise service provider command line.
//!
//! # Usage
//!
//! ```bash
//! # Register once and keep the printed service id
//! cipherise --server https://cipherise.example.com register --name "Example Ltd"
//! export CIPHERISE_SERVICE_ID=<service id>
//!
//! # Bind a user's device, then authenticate them on it
//! cipherise --server https://cipherise.example.com enrol --username alice
//! cipherise --server https://cipherise.example.com authenticate --level 3 \
//!     push --username alice --device-id <device id>
//! ```

mod terminal;

use std::{collections::BTreeMap, path::PathBuf, process::ExitCode, time::Duration};

use cipherise_client::{DEFAULT_KEY_DIR, HttpTransport, ProviderConfig, ServiceProvider, SystemEnv};
use cipherise_core::{
    AuthKind, AuthLevel, AuthResponse, AuthenticationRequest, EnrolmentRequest, PollInterval,
};
use cipherise_proto::PayloadRequest;
use clap::{Parser, Subcommand};
use terminal::{Terminal, say};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Cipherise service provider
#[derive(Parser, Debug)]
#[command(name = "cipherise")]
#[command(about = "Enrol and authenticate users with Cipherise")]
#[command(version)]
struct Args {
    /// Cipherise server base URL
    #[arg(long, env = "CIPHERISE_SERVER")]
    server: String,

    /// Service id of an existing registration
    #[arg(long, env = "CIPHERISE_SERVICE_ID")]
    service_id: Option<String>,

    /// Directory holding service key files
    #[arg(long, env = "CIPHERISE_KEY_DIR", default_value = DEFAULT_KEY_DIR)]
    key_dir: PathBuf,

    /// Reuse a session id instead of running the handshake
    #[arg(long, env = "CIPHERISE_SESSION")]
    session: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "120")]
    timeout_secs: u64,

    /// Answer yes to every confirmation
    #[arg(short, long)]
    yes: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the server version
    Info,

    /// Register a new service provider
    Register {
        /// Name shown to users on their devices
        #[arg(long)]
        name: String,
    },

    /// Revoke this service provider and delete its keys
    Revoke,

    /// Bind a user's device
    Enrol {
        /// User to enrol
        #[arg(long)]
        username: String,

        #[command(flatten)]
        polling: Polling,

        #[command(flatten)]
        payload: Payload,
    },

    /// Authenticate a user
    Authenticate {
        /// Authentication level, 1 (notification) to 4 (OneTiCK)
        #[arg(long, default_value = "2", value_parser = clap::value_parser!(u8).range(1..=4))]
        level: u8,

        /// Message shown with the request
        #[arg(long, default_value = "")]
        message: String,

        /// Branding shown with the request
        #[arg(long, default_value = "")]
        branding: String,

        #[command(flatten)]
        polling: Polling,

        #[command(flatten)]
        payload: Payload,

        #[command(subcommand)]
        kind: Kind,
    },

    /// List a user's verified devices
    Devices {
        /// User to list
        #[arg(long)]
        username: String,

        /// Include devices that are not authorised
        #[arg(long)]
        all: bool,
    },

    /// Revoke a user or some of their devices
    RevokeUser {
        /// User to revoke
        #[arg(long)]
        username: String,

        /// Only revoke this device (repeatable)
        #[arg(long = "device")]
        devices: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum Kind {
    /// Notify a known device
    Push {
        /// User to authenticate
        #[arg(long)]
        username: String,

        /// Device to notify
        #[arg(long)]
        device_id: String,

        /// Notification text
        #[arg(long, default_value = "")]
        notification: String,
    },

    /// Show a code for any enrolled device to scan
    Wave {
        /// Where the app returns after a same-device authentication
        #[arg(long, default_value = "")]
        redirect_url: String,
    },
}

#[derive(clap::Args, Debug)]
struct Polling {
    /// Poll interval in milliseconds: 0 for the default, negative for long poll
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    interval_ms: i64,

    /// Issue a fresh code when one expires
    #[arg(long, value_name = "BOOL")]
    repeat: Option<bool>,
}

#[derive(clap::Args, Debug)]
struct Payload {
    /// Ask the device for this value (repeatable)
    #[arg(long = "get", value_name = "KEY")]
    get: Vec<String>,

    /// Store this value on the device (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_pair)]
    set: Vec<(String, String)>,
}

impl Payload {
    fn into_request(self) -> PayloadRequest {
        PayloadRequest { set: self.set.into_iter().collect::<BTreeMap<_, _>>(), get: self.get }
    }
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

fn print_payload(values: Option<&BTreeMap<String, String>>) {
    for (key, value) in values.into_iter().flatten() {
        say(format_args!("payload {key} = {value}"));
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let transport = HttpTransport::with_timeout(Duration::from_secs(args.timeout_secs))?;
    let config =
        ProviderConfig { server: args.server, service_id: args.service_id, key_dir: args.key_dir };
    let mut provider = ServiceProvider::from_config(config, transport, SystemEnv::new())?;
    if let Some(session) = args.session {
        provider.resume_session(session)?;
    }

    match args.command {
        Command::Info => say(provider.info().await?),

        Command::Register { name } => {
            let service_id = provider.register(&name).await?;
            say(format_args!("registered service {service_id}"));
        },

        Command::Revoke => {
            provider.revoke().await?;
            say("service revoked");
        },

        Command::Enrol { username, polling, payload } => {
            let request = EnrolmentRequest {
                username,
                interval: PollInterval::from_millis(polling.interval_ms),
                repeat_on_timeout: polling.repeat.unwrap_or(true),
            };
            let mut terminal = Terminal::new(args.yes, payload.into_request());
            let report = provider.enrol(request, &mut terminal).await?;

            if !report.confirmed {
                say("enrolment not confirmed");
                return Ok(ExitCode::FAILURE);
            }
            say(format_args!("enrolled {} on device {}", report.username, report.device_id));
            print_payload(report.payload.as_ref());
        },

        Command::Authenticate { level, message, branding, polling, payload, kind } => {
            let kind = match kind {
                Kind::Push { username, device_id, notification } => {
                    AuthKind::Push { username, device_id, notification_message: notification }
                },
                Kind::Wave { redirect_url } => AuthKind::Wave { app_redirect_url: redirect_url },
            };
            let level = AuthLevel::from_value(level).unwrap_or_default();
            let mut request = AuthenticationRequest::new(kind, level)
                .with_messages(message, branding)
                .with_interval(PollInterval::from_millis(polling.interval_ms));
            if let Some(repeat) = polling.repeat {
                request.repeat_on_timeout = repeat;
            }

            let mut terminal = Terminal::new(args.yes, payload.into_request());
            let report = provider.authenticate(request, &mut terminal).await?;

            say(format_args!(
                "{:?} by '{}' on '{}' ({}), verified: {}",
                report.response,
                report.username,
                report.device_name,
                report.device_id,
                report.verified
            ));
            print_payload(report.payload.as_ref());
            if report.response != AuthResponse::Accept || !report.verified {
                return Ok(ExitCode::FAILURE);
            }
        },

        Command::Devices { username, all } => {
            for device in provider.user_devices(&username, all).await? {
                say(format_args!(
                    "{}  {}  authorised: {}",
                    device.device_id,
                    device.friendly_name,
                    device.is_authorised()
                ));
            }
        },

        Command::RevokeUser { username, devices } => {
            let devices = (!devices.is_empty()).then_some(devices);
            for unknown in provider.revoke_user(&username, devices).await? {
                say(format_args!("unknown device {unknown}"));
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}
