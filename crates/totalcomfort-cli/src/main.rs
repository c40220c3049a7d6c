//! Command-line tool for Total Connect Comfort thermostats.
//!
//! Every library operation is mirrored by a flag, which makes this handy
//! for poking at a thermostat from a shell or a cron job. Exit code is 0
//! on success and non-zero on any failure.

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use totalcomfort_core::{
    Attribute, AttributeWrite, Config, CredentialStore, Credentials, Hold, PortalClient, Session,
};

/// Seconds between polls in `--loop` mode.
const POLL_INTERVAL_SECS: u64 = 15;

#[derive(Parser, Debug)]
#[command(
    name = "totalcomfort",
    about = "Read and control Total Connect Comfort thermostats",
    rename_all = "snake_case"
)]
struct Cli {
    /// Portal username (falls back to the last remembered one)
    #[arg(long)]
    username: Option<String>,

    /// Portal password (falls back to the OS keychain, then a prompt)
    #[arg(long)]
    password: Option<String>,

    /// Device id to operate on (defaults to the account's first device)
    #[arg(long)]
    device: Option<i64>,

    /// Just try to login
    #[arg(long)]
    login: bool,

    /// List available devices
    #[arg(long)]
    devices: bool,

    /// Loop on temperature and operating mode
    #[arg(long = "loop")]
    poll: bool,

    // Getters
    #[arg(long, help = "Get setpoint_cool")]
    get_setpoint_cool: bool,
    #[arg(long, help = "Get setpoint_heat")]
    get_setpoint_heat: bool,
    #[arg(long, help = "Get fan_mode")]
    get_fan_mode: bool,
    #[arg(long, help = "Get system_mode")]
    get_system_mode: bool,
    #[arg(long, help = "Get current_temperature")]
    get_current_temperature: bool,
    #[arg(long, help = "Get current_humidity")]
    get_current_humidity: bool,
    #[arg(long, help = "Get outdoor_temperature")]
    get_outdoor_temperature: bool,
    #[arg(long, help = "Get outdoor_humidity")]
    get_outdoor_humidity: bool,
    #[arg(long, help = "Get equipment_output_status")]
    get_equipment_output_status: bool,
    #[arg(long, help = "Get the current hold mode")]
    get_hold: bool,

    // Setters
    #[arg(long, help = "Set setpoint_cool")]
    set_setpoint_cool: Option<f64>,
    #[arg(long, help = "Set setpoint_heat")]
    set_setpoint_heat: Option<f64>,
    #[arg(long, help = "Set fan_mode (auto, on, circulate, follow schedule)")]
    set_fan_mode: Option<totalcomfort_core::FanMode>,
    #[arg(long, help = "Set system_mode (emheat, heat, off, cool, auto)")]
    set_system_mode: Option<totalcomfort_core::SystemMode>,
    #[arg(long, help = "Cancel any hold and resume the schedule")]
    cancel_hold: bool,
    #[arg(long, help = "Hold the current setpoints permanently")]
    permanent_hold: bool,
    #[arg(long, value_name = "HH:MM", help = "Hold until time")]
    hold_until: Option<String>,
}

impl Cli {
    /// The write requested by the flags, if any. First match wins, like the
    /// one-shot flags this mirrors.
    fn requested_write(&self) -> Result<Option<AttributeWrite>> {
        if let Some(temp) = self.set_setpoint_cool {
            return Ok(Some(AttributeWrite::SetpointCool(temp)));
        }
        if let Some(temp) = self.set_setpoint_heat {
            return Ok(Some(AttributeWrite::SetpointHeat(temp)));
        }
        if let Some(mode) = self.set_fan_mode {
            return Ok(Some(AttributeWrite::Fan(mode)));
        }
        if let Some(mode) = self.set_system_mode {
            return Ok(Some(AttributeWrite::System(mode)));
        }
        if self.cancel_hold {
            return Ok(Some(AttributeWrite::Hold(Hold::Schedule)));
        }
        if self.permanent_hold {
            return Ok(Some(AttributeWrite::Hold(Hold::Permanent)));
        }
        if let Some(ref time) = self.hold_until {
            let deadline = NaiveTime::parse_from_str(time, "%H:%M")
                .map_err(|_| anyhow::anyhow!("invalid time '{time}' (use HH:MM)"))?;
            return Ok(Some(AttributeWrite::Hold(Hold::Until(deadline))));
        }
        Ok(None)
    }

    /// The read requested by the flags, if any.
    fn requested_read(&self) -> Option<Attribute> {
        let reads = [
            (self.get_setpoint_cool, Attribute::SetpointCool),
            (self.get_setpoint_heat, Attribute::SetpointHeat),
            (self.get_fan_mode, Attribute::FanMode),
            (self.get_system_mode, Attribute::SystemMode),
            (self.get_current_temperature, Attribute::CurrentTemperature),
            (self.get_current_humidity, Attribute::CurrentHumidity),
            (self.get_outdoor_temperature, Attribute::OutdoorTemperature),
            (self.get_outdoor_humidity, Attribute::OutdoorHumidity),
            (
                self.get_equipment_output_status,
                Attribute::EquipmentOutputStatus,
            ),
            (self.get_hold, Attribute::Hold),
        ];
        reads
            .into_iter()
            .find_map(|(wanted, attribute)| wanted.then_some(attribute))
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn print_inventory(session: &Session) {
    for location in session.locations().values() {
        println!("Location {} ({}):", location.id, location.display_name());
        for device in location.devices.values() {
            println!("  Device {}: {}", device.id, device.display_name());
        }
    }
}

/// Resolve the password from the flag, the OS keychain, or a prompt.
fn resolve_password(cli: &Cli, username: &str) -> Result<String> {
    if let Some(ref password) = cli.password {
        return Ok(password.clone());
    }
    if let Ok(password) = CredentialStore::get_password(username) {
        debug!("using password from keychain");
        return Ok(password);
    }
    rpassword::prompt_password("Password: ").context("failed to read password")
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load().unwrap_or_default();

    let username = cli
        .username
        .clone()
        .or_else(|| config.last_username.clone())
        .context("no username given (--username) and none remembered")?;
    let password = resolve_password(&cli, &username)?;

    let mut client = PortalClient::new(Credentials::new(username.clone(), password))?;
    let mut session = client.login().await?;
    info!(username = %username, "logged in");

    config.last_username = Some(username);

    if cli.login {
        println!("Success");
        let _ = config.save();
        return Ok(());
    }

    client.list_devices(&mut session).await?;

    if cli.devices {
        print_inventory(&session);
    }

    let mut device = match cli.device.or(config.default_device_id) {
        Some(id) => session
            .find_device(id)
            .with_context(|| format!("device {id} not found"))?
            .clone(),
        None => session
            .default_device()
            .context("no devices found on the account")?
            .clone(),
    };

    config.default_device_id = Some(device.id);
    let _ = config.save();

    let mut did_action = cli.devices;
    if let Some(write) = cli.requested_write()? {
        client.set_attribute(&mut session, &mut device, write).await?;
        did_action = true;
    } else if let Some(attribute) = cli.requested_read() {
        let value = client
            .get_attribute(&mut session, &mut device, attribute)
            .await?;
        println!("{value}");
        did_action = true;
    }

    if !did_action && !cli.poll {
        print_inventory(&session);
    }

    if cli.poll {
        loop {
            tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
            client.refresh_device(&mut session, &mut device).await?;
            println!("{}", device.attribute(Attribute::CurrentTemperature)?);
            println!("{}", device.attribute(Attribute::SystemMode)?);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
