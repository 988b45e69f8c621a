mod cli;
mod dns;
mod stats;
mod utils;

use anyhow::Context;
use cli::PingArgs;
use icmpx::echo::{Client, ClientConfig};
use icmpx::{Echo, Interface};
use log::info;
use stats::PingStatistics;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    // Enable debug logging if RUST_LOG is set
    if std::env::var("RUST_LOG").is_ok() {
        env_logger::init();
    }

    // Parse command line arguments
    let args = match cli::parse_args() {
        Ok(args) => Arc::new(args),
        Err(e) => {
            utils::exit_with_error(&format!("invalid arguments: {}", e), 1);
        }
    };

    if let Err(e) = utils::validate_ping_params(&args) {
        utils::exit_with_error(&e.to_string(), 1);
    }

    let ifi = match Interface::find(&args.interface) {
        Ok(ifi) => ifi,
        Err(e) => {
            utils::exit_with_error(&format!("cannot use interface '{}': {}", args.interface, e), 1);
        }
    };

    if !ifi.is_up() {
        utils::print_warning(&format!("interface {} is down", ifi.name));
    }

    let retries = Arc::new(AtomicU32::new(0));
    let config = ClientConfig {
        retry_delay: Duration::from_millis(args.retry_delay.into()),
        on_retry: Some(Arc::new({
            let retries = retries.clone();
            move |_: &Echo| {
                retries.fetch_add(1, Ordering::Relaxed);
            }
        })),
    };

    let client = match Client::with_config(&ifi, config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            let mut message = format!("cannot open ICMP sockets on {}: {}", ifi.name, e);
            if let Some(hint) = utils::privilege_hint(&e) {
                message.push('\n');
                message.push_str(hint);
            }
            utils::exit_with_error(&message, 1);
        }
    };

    // Setup signal handler for Ctrl+C
    let cancel = utils::setup_signal_handler();

    let tasks: Vec<_> = args
        .targets
        .iter()
        .map(|target| {
            tokio::spawn(ping_target(
                client.clone(),
                cancel.clone(),
                args.clone(),
                target.clone(),
                ifi.name.clone(),
            ))
        })
        .collect();

    let mut failed = false;
    for (target, task) in args.targets.iter().zip(tasks) {
        match task.await {
            Ok(Ok(stats)) => println!("{}", stats.format_summary(target)),
            Ok(Err(e)) => {
                eprintln!("icmpx: {:#}", e);
                failed = true;
            }
            Err(e) => {
                eprintln!("icmpx: ping task for {} failed: {}", target, e);
                failed = true;
            }
        }
    }

    info!("{} echo requests resent", retries.load(Ordering::Relaxed));

    if let Err(e) = client.close().await {
        utils::exit_with_error(&format!("failed to close ICMP sockets: {}", e), 1);
    }

    if failed {
        std::process::exit(1);
    }
}

/// Pings one target until its count is reached or `cancel` fires.
async fn ping_target(
    client: Arc<Client>,
    cancel: CancellationToken,
    args: Arc<PingArgs>,
    target: String,
    iface: String,
) -> anyhow::Result<PingStatistics> {
    let ip = dns::resolve_hostname(&target, args.force_ipv4, args.force_ipv6)
        .await
        .with_context(|| format!("cannot resolve host '{}'", target))?;

    println!("{}", PingStatistics::format_header(&target, &ip.to_string(), &iface));

    let mut stats = PingStatistics::new();
    let timeout = Duration::from_millis(args.timeout.into());
    let interval = Duration::from_millis(args.interval.into());

    while args.count.is_none_or(|count| stats.packets_sent < count) {
        match tokio::time::timeout(timeout, client.ping(&cancel, ip)).await {
            Ok(Ok(response)) => {
                stats.record_sent();
                stats.record_received(&response);

                // Reverse lookup if requested
                let resolved_name = if args.resolve_addresses {
                    dns::reverse_lookup(response.ip.ip()).await
                } else {
                    None
                };

                println!("{}", stats.format_response(&response, resolved_name.as_deref()));
            }
            Ok(Err(e)) if e.is_cancelled() => break,
            Ok(Err(e)) => {
                return Err(e).with_context(|| format!("ping to {} failed", target));
            }
            Err(_) => {
                stats.record_sent();
                stats.record_lost();
                println!("Request to {} timed out.", target);
            }
        }

        if args.count.is_some_and(|count| stats.packets_sent >= count) {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(interval) => {}
        }
    }

    Ok(stats)
}
