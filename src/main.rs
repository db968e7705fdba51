use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::Semaphore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dnsproxy::cache::DnsCache;
use dnsproxy::config::DnsProxyConfig;
use dnsproxy::graceful_shutdown::GracefulShutdown;
use dnsproxy::health::{StartupGrace, UpstreamHealth};
use dnsproxy::http_server::HttpServer;
use dnsproxy::metrics::DnsMetrics;
use dnsproxy::rate_limiter::RateLimiter;
use dnsproxy::resolver::{Resolver, ResolverConfig};
use dnsproxy::selector::{Selector, Upstream};
use dnsproxy::server::{run_tcp_server, run_udp_server};

/// Forwarding DNS proxy with caching, health-aware upstream selection, and
/// CNAME flattening.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "dnsproxy.toml")]
    config: std::path::PathBuf,

    /// Overrides the configured listen address.
    #[arg(long)]
    listen_address: Option<String>,

    /// Overrides the configured listen port.
    #[arg(long)]
    listen_port: Option<u16>,

    /// Tracing log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Load and validate the configuration, then exit.
    #[arg(long)]
    validate_config: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = DnsProxyConfig::load(&args.config)?;
    if let Some(address) = &args.listen_address {
        config.listen.address = address.parse()?;
    }
    if let Some(port) = args.listen_port {
        config.listen.port = port;
    }
    config.validate()?;

    if args.validate_config {
        info!("configuration is valid");
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(config))
}

async fn run(config: DnsProxyConfig) -> Result<(), Box<dyn std::error::Error>> {
    let upstreams = config
        .upstreams
        .iter()
        .map(|u| Upstream {
            name: u.name.clone(),
            addr: SocketAddr::new(u.address, u.port),
            weight: u.weight,
            priority: u.priority,
            timeout: Duration::from_secs_f64(u.timeout_seconds),
            health: Arc::new(UpstreamHealth::new(
                config.health_checks.failure_threshold,
                config.health_checks.recovery_threshold,
            )),
        })
        .collect();

    let selector = Selector::new(upstreams, config.selection_strategy);

    let cache = DnsCache::new(
        config.cache.max_size as usize,
        config.cache.cleanup_probability,
        Duration::from_secs(config.cache.cleanup_interval_s as u64),
    );

    let rate_limiter = RateLimiter::new(
        config.rate_limit.per_ip_rate,
        config.rate_limit.per_ip_burst,
        Duration::from_secs(config.rate_limit.cleanup_interval_s),
    );

    let startup_grace = StartupGrace::new(Duration::from_secs(config.startup_grace_s));

    let resolver_config = ResolverConfig {
        default_ttl_s: config.cache.default_ttl_s,
        max_ttl_s: config.cache.max_ttl_s,
        negative_ttl_s: config.cache.negative_ttl_s,
        aaaa_suppression: config.aaaa_suppression,
        upstream_timeout: Duration::from_secs(5),
    };

    let resolver = Arc::new(Resolver::new(cache, rate_limiter, selector, startup_grace, resolver_config));

    let shutdown = Arc::new(GracefulShutdown::new(Duration::from_secs(30)));
    let query_semaphore = Arc::new(Semaphore::new(4096));

    let bind_addr = SocketAddr::new(config.listen.address, config.listen.port);

    let udp_handle = tokio::spawn(run_udp_server(
        bind_addr,
        resolver.clone(),
        query_semaphore.clone(),
        shutdown.subscribe(),
    ));
    let tcp_handle = tokio::spawn(run_tcp_server(
        bind_addr,
        resolver.clone(),
        query_semaphore.clone(),
        shutdown.subscribe(),
    ));

    let http_handle = if let Some(http_listen) = &config.http_listen {
        let metrics = Arc::new(DnsMetrics::new()?);
        let http_bind = SocketAddr::new(http_listen.address, http_listen.port);
        let http_server = HttpServer::new(resolver.clone(), metrics, http_bind);
        Some(tokio::spawn(http_server.start(shutdown.subscribe())))
    } else {
        None
    };

    if config.health_checks.enabled {
        tokio::spawn(run_active_probe_loop(resolver.clone(), config.health_checks.clone(), shutdown.subscribe()));
    }

    tokio::signal::ctrl_c().await?;
    info!("received shutdown signal");
    shutdown.shutdown().await?;

    for handle in [udp_handle, tcp_handle] {
        if let Err(err) = handle.await {
            error!(%err, "listener task panicked");
        }
    }
    if let Some(handle) = http_handle {
        if let Err(err) = handle.await {
            error!(%err, "http server task panicked");
        }
    }

    Ok(())
}

/// Periodically probes every configured upstream (§4.5's active-probe loop),
/// querying `probe_name`/`probe_type` and recording the outcome regardless of
/// whether a real query happens to land on that upstream in the interim.
async fn run_active_probe_loop(
    resolver: Arc<Resolver>,
    config: dnsproxy::config::HealthCheckConfig,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) {
    use dnsproxy::dns::{DNSHeader, DNSQuestion, DNSResourceClass, DNSResourceType, Message};
    use dnsproxy::health::ProbeOutcome;
    use dnsproxy::upstream::UpstreamClient;

    let client = UpstreamClient::new();
    let probe_type = if config.probe_type.eq_ignore_ascii_case("AAAA") {
        DNSResourceType::AAAA
    } else {
        DNSResourceType::A
    };
    let labels: Vec<String> = config.probe_name.trim_end_matches('.').split('.').map(String::from).collect();
    let timeout = Duration::from_secs_f64(config.timeout_s);
    let period = Duration::from_secs(config.interval_s);
    let first_tick = tokio::time::Instant::now() + resolver.startup_grace().grace();
    let mut interval = tokio::time::interval_at(first_tick, period);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let query = Message {
                    header: DNSHeader {
                        id: 0,
                        rd: true,
                        qdcount: 1,
                        ..Default::default()
                    },
                    questions: vec![DNSQuestion {
                        labels: labels.clone(),
                        qtype: probe_type,
                        qclass: DNSResourceClass::IN,
                    }],
                    answers: vec![],
                    authorities: vec![],
                    additional: vec![],
                };

                let in_grace = resolver.startup_grace().in_grace();
                for upstream in resolver.selector().upstreams() {
                    match client.query(upstream.addr, &query, timeout).await {
                        Ok((_, rtt)) => upstream.health.record(ProbeOutcome::Success { rtt }, in_grace),
                        Err(_) => upstream.health.record(ProbeOutcome::Failure, in_grace),
                    }
                }
            }
        }
    }
}
