//! Device simulator - Main Entry Point
//!
//! Loads the configuration, resolves missing MQTT settings from the account
//! endpoint, connects the simulated device and runs it until a signal or a
//! protocol violation stops it.

use clap::{Parser, Subcommand};
use device_simulator::api::{DeviceApi, RestApiClient};
use device_simulator::config::SimulatorConfig;
use device_simulator::device::{CertificateType, DeviceSession, DeviceType};
use device_simulator::jobs::{path_name, FailureScenario, JobsManager};
use device_simulator::observability::init_default_logging_with;
use device_simulator::orchestrator::{Orchestrator, OrchestratorSettings};
use device_simulator::transport::mqtt::MqttClient;
use device_simulator::transport::Transport;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Simulated IoT device for a fleet-management control plane
#[derive(Parser)]
#[command(name = "device-sim")]
#[command(about = "Device-side simulator for a cloud fleet-management control plane")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[arg(long, env = "DEVICE_ID")]
    device_id: Option<String>,

    /// generic | team
    #[arg(long, value_parser = parse_device_type)]
    device_type: Option<DeviceType>,

    /// self-signed | jitp
    #[arg(long, value_parser = parse_certificate_type)]
    certificate_type: Option<CertificateType>,

    /// Do not associate a JITP device on first connection
    #[arg(long)]
    prevent_association: bool,

    #[arg(long)]
    app_fw_version: Option<String>,

    /// atv2 | mss | path to a JSON device twin document
    #[arg(long)]
    shadow_profile: Option<String>,

    /// Preset name (reject, download-hang, ...) or status list (QUEUED,REJECTED)
    #[arg(long)]
    failure_scenario: Option<FailureScenario>,

    #[arg(long, env = "MQTT_ENDPOINT")]
    mqtt_endpoint: Option<String>,

    #[arg(long, env = "MQTT_MESSAGES_PREFIX")]
    mqtt_messages_prefix: Option<String>,

    #[arg(long, env = "TENANT_ID")]
    tenant_id: Option<String>,

    #[arg(long, env = "API_HOST")]
    api_host: Option<String>,

    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Onboard a self-signed device with its client certificate before connecting
    #[arg(long)]
    onboard: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the simulated device
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

fn parse_device_type(value: &str) -> Result<DeviceType, String> {
    match value.to_lowercase().as_str() {
        "generic" => Ok(DeviceType::Generic),
        "team" => Ok(DeviceType::Team),
        other => Err(format!("Unknown device type: {other}")),
    }
}

fn parse_certificate_type(value: &str) -> Result<CertificateType, String> {
    match value.to_lowercase().as_str() {
        "self-signed" | "selfsigned" => Ok(CertificateType::SelfSigned),
        "jitp" => Ok(CertificateType::Jitp),
        other => Err(format!("Unknown certificate type: {other}")),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging_with(cli.verbose);

    info!("Starting device simulator v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_device(config, &cli).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(cli: &Cli) -> Result<SimulatorConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            SimulatorConfig::load_from_file(path)?
        }
        None => SimulatorConfig::load_default()?,
    };

    apply_overrides(&mut config, cli);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut SimulatorConfig, cli: &Cli) {
    if let Some(device_id) = &cli.device_id {
        config.device.id = device_id.clone();
    }
    if let Some(device_type) = cli.device_type {
        config.device.device_type = device_type;
    }
    if let Some(certificate_type) = cli.certificate_type {
        config.device.certificate_type = certificate_type;
    }
    if cli.prevent_association {
        config.device.prevent_jitp_association = true;
    }
    if let Some(version) = &cli.app_fw_version {
        config.device.app_fw_version = version.clone();
    }
    if let Some(profile) = &cli.shadow_profile {
        config.device.shadow_profile = Some(profile.clone());
    }
    if let Some(scenario) = &cli.failure_scenario {
        config.jobs.failure_scenario = Some(scenario.clone());
    }
    if let Some(endpoint) = &cli.mqtt_endpoint {
        config.mqtt.endpoint = Some(endpoint.clone());
    }
    if let Some(prefix) = &cli.mqtt_messages_prefix {
        config.mqtt.messages_prefix = Some(prefix.clone());
    }
    if let Some(tenant_id) = &cli.tenant_id {
        config.mqtt.tenant_id = Some(tenant_id.clone());
    }
    if let Some(host) = &cli.api_host {
        config.api.host = host.clone();
    }
}

async fn run_device(
    mut config: SimulatorConfig,
    cli: &Cli,
) -> Result<(), Box<dyn std::error::Error>> {
    let api_key = match &cli.api_key {
        Some(key) => key.clone(),
        None => config.api_key()?,
    };
    let api = Arc::new(RestApiClient::new(&config.api.host, api_key)?);

    if config.needs_team_info() {
        info!("Fetching MQTT settings from the account endpoint...");
        let team_info = api.fetch_team_info().await?;
        config.merge_team_info(&team_info);
    }

    let settings = OrchestratorSettings::from_config(&config)?;
    log_config_banner(&config, &settings);

    if cli.onboard {
        onboard_device(&config, api.as_ref()).await?;
    }

    let identity = config.device.identity();
    let topics = config.topic_set()?;
    let transport = Arc::new(MqttClient::new(&config.device.id, &config.mqtt)?);
    let events = transport.start().await?;

    let session = Arc::new(DeviceSession::new(
        identity,
        topics,
        Arc::clone(&transport),
        config.mqtt.keep_alive_secs,
    ));
    let jobs = JobsManager::new(Arc::clone(&session), config.jobs.failure_scenario.clone());
    let mut orchestrator = Orchestrator::new(session, jobs, api, settings);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => info!("Received {}, shutting down gracefully...", name),
            Err(e) => error!("Signal handling failed, shutting down: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    info!("Device is running...");
    let result = orchestrator.run(events, shutdown_rx).await;

    info!("Application shutdown initiated");
    if let Err(e) = transport.disconnect().await {
        warn!("Error during disconnect: {}", e);
    }

    Ok(result?)
}

async fn wait_for_signal() -> std::io::Result<&'static str> {
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => Ok("SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

/// Register a self-signed device together with its client certificate
async fn onboard_device(
    config: &SimulatorConfig,
    api: &impl DeviceApi,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = config
        .mqtt
        .client_cert_path
        .as_ref()
        .ok_or("--onboard requires mqtt.client_cert_path")?;
    let certificate = std::fs::read_to_string(path)?;

    info!("Onboarding device {}...", config.device.id);
    api.onboard_device(&config.device.id, &certificate).await?;
    Ok(())
}

fn log_config_banner(config: &SimulatorConfig, settings: &OrchestratorSettings) {
    let device = &config.device;
    let prevent_association = if device.certificate_type == CertificateType::Jitp {
        device.prevent_jitp_association.to_string()
    } else {
        "N/A".to_string()
    };
    let shadow_profile = settings
        .shadow_profile
        .as_ref()
        .map(|profile| profile.to_string())
        .unwrap_or_else(|| "none".to_string());

    info!("DEVICE ID: {}", device.id);
    info!("DEVICE TYPE: {}", device.device_type);
    info!("CERTIFICATE TYPE: {}", device.certificate_type);
    info!("PREVENT NEW JITP DEVICE ASSOCIATION: {}", prevent_association);
    info!("APP FW VERSION: {}", device.app_fw_version);
    info!("SHADOW PROFILE: {}", shadow_profile);
    info!(
        "JOB EXECUTION PATH: {}",
        path_name(config.jobs.failure_scenario.as_ref())
    );
    info!("STAGE: {}", config.stage());
}

fn handle_config_command(
    config: &SimulatorConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
