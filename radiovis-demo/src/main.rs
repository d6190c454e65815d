//! radiovis: command line RadioVIS client.
//!
//! Resolves a station through RadioDNS, follows its RadioVIS text and
//! slideshow feed, and saves the slides it announces.

use std::cmp::Reverse;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use serde::Deserialize;

use radiovis_client::config::{self, parse_proxy_url};
use radiovis_client::{CoalescePolicy, Coordinator, CoordinatorConfig};
use radiovis_protocol::{ProxySettings, ServiceDescriptor, ServiceEndpoint, DEFAULT_STOMP_PORT};

mod logging;
mod output;
mod station;

use output::{ConsoleObserver, Status, StatusObserver};
use station::StationArgs;

/// radiovis - RadioDNS / RadioVIS command line client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory for rolling log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Number of days to keep log files [default: 7]
    #[arg(long)]
    log_retention_days: Option<u64>,

    /// RadioDNS domain suffix
    #[arg(long)]
    domain: Option<String>,

    /// HTTP proxy as host:port (defaults to $http_proxy)
    #[arg(long)]
    proxy: Option<String>,

    /// Fetch slideshow images through the proxy
    #[arg(long)]
    image_proxy: bool,

    /// Directory where fetched images are saved
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print every STOMP frame received
    #[arg(long)]
    frames: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Look up a station's canonical name and services
    Resolve {
        #[command(flatten)]
        station: StationArgs,
    },

    /// Resolve a station and follow its RadioVIS feed
    Listen {
        #[command(flatten)]
        station: StationArgs,

        /// Use the n-th RadioVIS endpoint instead of the preferred one
        #[arg(long)]
        index: Option<usize>,

        /// Tunnel the STOMP connection through the proxy
        #[arg(long)]
        session_proxy: bool,
    },

    /// Follow topics on a STOMP server without DNS lookup
    Direct {
        host: String,

        #[arg(default_value_t = DEFAULT_STOMP_PORT)]
        port: u16,

        #[arg(long)]
        text_topic: Option<String>,

        #[arg(long)]
        image_topic: Option<String>,

        /// Tunnel the STOMP connection through the proxy
        #[arg(long)]
        session_proxy: bool,
    },

    /// Publish a TEXT or SHOW message on a topic
    Send {
        host: String,

        topic: String,

        #[arg(long, default_value_t = DEFAULT_STOMP_PORT)]
        port: u16,

        /// TEXT payload
        #[arg(long, conflicts_with = "show")]
        text: Option<String>,

        /// SHOW image URL
        #[arg(long, required_unless_present = "text")]
        show: Option<String>,

        /// SHOW click-through link
        #[arg(long, requires = "show")]
        link: Option<String>,

        /// SHOW trigger time (NOW or RFC 3339)
        #[arg(long, requires = "show")]
        trigger_time: Option<String>,
    },
}

/// Configuration file format.
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    radiodns: RadioDnsSection,
    #[serde(default)]
    proxy: ProxySection,
    #[serde(default)]
    session: SessionSection,
    #[serde(default)]
    fetch: FetchSection,
    #[serde(default)]
    station: StationArgs,
    #[serde(default)]
    output: OutputSection,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, Deserialize, Default)]
struct RadioDnsSection {
    domain: Option<String>,
    services: Option<Vec<ServiceDescriptor>>,
}

#[derive(Debug, Deserialize, Default)]
struct ProxySection {
    host: Option<String>,
    port: Option<u16>,
    images: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionSection {
    login: Option<String>,
    passcode: Option<String>,
    connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct FetchSection {
    connect_timeout_ms: Option<u64>,
    response_timeout_ms: Option<u64>,
    max_body_size: Option<usize>,
    policy: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputSection {
    dir: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoggingSection {
    log_dir: Option<String>,
    retention_days: Option<u64>,
    level: Option<String>,
}

const DEFAULT_LOG_RETENTION_DAYS: u64 = 7;

/// Command line first, then the config file.
fn retention_days(args: &Args, file: &ConfigFile) -> u64 {
    args.log_retention_days
        .or(file.logging.retention_days)
        .unwrap_or(DEFAULT_LOG_RETENTION_DAYS)
}

fn load_config(path: &PathBuf) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Layer the file and command line over `base`. Command line wins.
fn merge_config(
    base: CoordinatorConfig,
    file: &ConfigFile,
    proxy_arg: Option<&str>,
    image_proxy: bool,
) -> Result<CoordinatorConfig, String> {
    let mut config = base;

    if let Some(services) = &file.radiodns.services {
        config.services = services.clone();
    }

    let file_proxy = file
        .proxy
        .host
        .as_ref()
        .map(|host| ProxySettings::http(host.clone(), file.proxy.port.unwrap_or(8080)));
    let arg_proxy = match proxy_arg {
        Some(value) => Some(parse_proxy_url(value).ok_or_else(|| format!("Invalid proxy {:?}", value))?),
        None => None,
    };
    if let Some(proxy) = arg_proxy.or(file_proxy) {
        config.proxy = Some(proxy);
    }
    config.use_http_proxy = image_proxy || file.proxy.images.unwrap_or(config.use_http_proxy);

    if file.session.login.is_some() {
        config.login = file.session.login.clone();
    }
    if file.session.passcode.is_some() {
        config.passcode = file.session.passcode.clone();
    }
    if let Some(ms) = file.session.connect_timeout_ms {
        config.connect_timeout = Duration::from_millis(ms);
    }

    if let Some(ms) = file.fetch.connect_timeout_ms {
        config.fetch.connect_timeout = Some(Duration::from_millis(ms));
    }
    if let Some(ms) = file.fetch.response_timeout_ms {
        config.fetch.response_timeout = Some(Duration::from_millis(ms));
    }
    if let Some(size) = file.fetch.max_body_size {
        config.fetch.max_body_size = size;
    }
    match file.fetch.policy.as_deref() {
        None => {}
        Some("drop") => config.fetch.policy = CoalescePolicy::DropWhileBusy,
        Some("latest") => config.fetch.policy = CoalescePolicy::KeepLatest,
        Some(other) => return Err(format!("Unknown fetch policy {:?}", other)),
    }

    Ok(config)
}

/// The RadioVIS endpoint to use: the n-th, or the lowest priority with the
/// highest weight.
fn pick_endpoint(endpoints: &[ServiceEndpoint], index: Option<usize>) -> Option<&ServiceEndpoint> {
    let radiovis = ServiceDescriptor::radiovis().name;
    let mut candidates: Vec<_> = endpoints.iter().filter(|e| e.name == radiovis).collect();

    match index {
        Some(index) => candidates.get(index).copied(),
        None => {
            candidates.sort_by_key(|e| (e.priority, Reverse(e.weight)));
            candidates.first().copied()
        }
    }
}

/// Block until the session ends or Ctrl-C.
fn wait_for_end(status: &mpsc::Receiver<Status>) {
    loop {
        match status.recv() {
            Ok(Status::Connected) => {}
            Ok(Status::Disconnected) => {
                info!("Session ended");
                break;
            }
            Ok(Status::Interrupted) | Err(_) => {
                info!("Interrupted");
                break;
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Config file: explicit path > ./radiovis.toml > defaults
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from("radiovis.toml");
        default_path.exists().then_some(default_path)
    });
    let file_config = match &config_path {
        Some(path) => match load_config(path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e);
            }
        },
        None => ConfigFile::default(),
    };

    let log_dir = args
        .log_dir
        .clone()
        .or_else(|| file_config.logging.log_dir.as_ref().map(PathBuf::from));
    let retention = retention_days(&args, &file_config);
    let _log_guard = logging::init_logging(
        log_dir.as_deref(),
        retention,
        args.verbose,
        file_config.logging.level.as_deref(),
    )?;

    let config = merge_config(
        config::load_from_env(),
        &file_config,
        args.proxy.as_deref(),
        args.image_proxy,
    )?;
    let domain = args
        .domain
        .clone()
        .or_else(|| file_config.radiodns.domain.clone());

    let output_dir = args
        .output
        .clone()
        .or_else(|| file_config.output.dir.as_ref().map(PathBuf::from));
    if let Some(dir) = &output_dir {
        std::fs::create_dir_all(dir)?;
    }

    let coordinator = Coordinator::new(config)?;
    coordinator.add_observer(Arc::new(ConsoleObserver::new(output_dir, args.frames)));

    let (status_tx, status_rx) = mpsc::channel();
    coordinator.add_observer(Arc::new(StatusObserver::new(status_tx.clone())));
    ctrlc::set_handler(move || {
        let _ = status_tx.send(Status::Interrupted);
    })?;

    let file_station = file_config.station.clone();
    let build_station = |station: StationArgs| {
        let mut station = station.or(file_station.clone()).build()?;
        if let Some(domain) = &domain {
            station.set_domain(domain.clone());
        }
        Ok::<_, String>(station)
    };

    match args.command {
        Commands::Resolve { station } => {
            let station = build_station(station)?;
            let (canonical, endpoints) = coordinator.resolve(&station);
            match canonical {
                Some(canonical) => {
                    println!("{} -> {}", station.hostname(), canonical);
                    if endpoints.is_empty() {
                        println!("  no services advertised");
                    }
                    for endpoint in &endpoints {
                        println!("  {}", endpoint);
                    }
                }
                None => println!("{}: no RadioDNS entry", station.hostname()),
            }
        }

        Commands::Listen {
            station,
            index,
            session_proxy,
        } => {
            let station = build_station(station)?;
            let (canonical, endpoints) = coordinator.resolve(&station);
            let canonical = canonical
                .ok_or_else(|| format!("{}: no RadioDNS entry", station.hostname()))?;
            let endpoint = pick_endpoint(&endpoints, index)
                .ok_or_else(|| format!("{} does not advertise RadioVIS", canonical))?;

            println!("Following {} on {}", station, endpoint);
            println!("  text:  {}", station.text_topic());
            println!("  image: {}", station.image_topic());
            coordinator.connect(endpoint, &station, session_proxy)?;
            wait_for_end(&status_rx);
        }

        Commands::Direct {
            host,
            port,
            text_topic,
            image_topic,
            session_proxy,
        } => {
            if text_topic.is_none() && image_topic.is_none() {
                warn!("No topics given; only raw frames will be shown");
            }
            coordinator.connect_direct(
                &host,
                port,
                text_topic.as_deref(),
                image_topic.as_deref(),
                session_proxy,
            )?;
            wait_for_end(&status_rx);
        }

        Commands::Send {
            host,
            topic,
            port,
            text,
            show,
            link,
            trigger_time,
        } => {
            coordinator.connect_direct(&host, port, None, None, false)?;
            match status_rx.recv_timeout(Duration::from_secs(15)) {
                Ok(Status::Connected) => {}
                _ => {
                    error!("Could not connect to {}:{}", host, port);
                    return Err("not connected".into());
                }
            }

            let sent = match (&text, &show) {
                (Some(text), _) => coordinator.send_text(&topic, text),
                (None, Some(url)) => {
                    coordinator.send_show(&topic, url, link.as_deref(), trigger_time.as_deref())
                }
                (None, None) => false,
            };
            if !sent {
                return Err("session closed before the message was sent".into());
            }
            info!("Sent to {}", topic);
        }
    }

    coordinator.shutdown();
    Ok(())
}
