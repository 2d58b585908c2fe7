mod cli;
mod dns;
mod icmp;
mod ping;
mod stats;
mod trace;
mod utils;

use cli::{Action, PingArgs, TraceArgs};
use ping::{PingConfig, PingEvent, PingSession};
use std::time::Duration;
use trace::{TraceConfig, TraceEvent, TracerouteSession};
use utils::CancelToken;

#[tokio::main]
async fn main() {
    // Enable debug logging if RUST_LOG is set
    if std::env::var("RUST_LOG").is_ok() {
        env_logger::init();
    }

    let result = match cli::parse_args() {
        Action::Ping(args) => run_ping(args).await,
        Action::Trace(args) => run_trace(args).await,
    };

    if let Err(e) = result {
        utils::exit_with_error(&format!("{:#}", e), 1);
    }
}

async fn run_ping(args: PingArgs) -> anyhow::Result<()> {
    utils::validate_ping_params(args.size, args.count, args.timeout)?;

    let config = PingConfig {
        target: args.target.clone(),
        timeout_ms: args.timeout,
        payload_size: args.size as usize,
        count: args.count,
        interval: Duration::from_secs(1),
    };

    let cancel = CancelToken::new();
    // Raw socket first: a privilege failure must come before any lookup or probe.
    let mut session = PingSession::open(config, cancel.clone())?;
    utils::setup_signal_handler(cancel);

    let report = tokio::task::spawn_blocking(move || {
        session.run(|event| match event {
            PingEvent::Resolved(address) => {
                println!("{}", stats::format_header(&args.target, address, args.size as usize));
            }
            PingEvent::Reply(reply) => {
                let name = if args.resolve_addresses {
                    dns::reverse_lookup(reply.reply.source)
                } else {
                    None
                };
                println!("{}", stats::format_response(reply, name.as_deref()));
            }
            PingEvent::Timeout => println!("Request timed out."),
            PingEvent::Failed(e) => println!("General failure: {}", e),
        })
    })
    .await??;

    println!("{}", report.stats.format_summary(&report.target));
    if report.cancelled {
        println!("Control-C");
    }
    Ok(())
}

async fn run_trace(args: TraceArgs) -> anyhow::Result<()> {
    utils::validate_trace_params(args.max_hops, args.timeout, args.size)?;

    let config = TraceConfig {
        target: args.target.clone(),
        max_hops: args.max_hops,
        timeout_ms: args.timeout,
        payload_size: args.size as usize,
    };

    let cancel = CancelToken::new();
    let mut session = TracerouteSession::open(config, cancel.clone())?;
    utils::setup_signal_handler(cancel);

    let report = tokio::task::spawn_blocking(move || {
        session.run(|event| match event {
            TraceEvent::Resolved(address) => {
                println!("{}", trace::format_header(&args.target, address, args.max_hops));
            }
            TraceEvent::Hop(hop) => {
                let name = match hop.address {
                    Some(address) if !args.no_resolve => dns::reverse_lookup(address),
                    _ => None,
                };
                println!("{}", trace::format_hop(hop, name.as_deref()));
            }
        })
    })
    .await??;

    println!("{}", trace::format_summary(&report));
    Ok(())
}
