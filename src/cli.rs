use clap::{Arg, ArgAction, ArgMatches, Command};

#[derive(Debug, Clone)]
pub struct PingArgs {
    pub target: String,
    pub continuous: bool,
    pub resolve_addresses: bool,
    pub count: Option<u32>,
    pub size: u32,
    pub timeout: u32,
}

impl Default for PingArgs {
    fn default() -> Self {
        Self {
            target: String::new(),
            continuous: false,
            resolve_addresses: false,
            count: Some(4),
            size: 32,
            timeout: 4000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraceArgs {
    pub target: String,
    pub no_resolve: bool,
    pub max_hops: u32,
    pub timeout: u32,
    pub size: u32,
}

impl Default for TraceArgs {
    fn default() -> Self {
        Self {
            target: String::new(),
            no_resolve: false,
            max_hops: 30,
            timeout: 3000,
            size: 64,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    Ping(PingArgs),
    Trace(TraceArgs),
}

fn target_arg() -> Arg {
    Arg::new("target")
        .help("Target hostname or IPv4 address")
        .required(true)
        .index(1)
}

fn timeout_arg() -> Arg {
    Arg::new("timeout")
        .short('w')
        .help("Timeout in milliseconds to wait for each reply")
        .value_name("timeout")
        .value_parser(clap::value_parser!(u32))
}

fn size_arg() -> Arg {
    Arg::new("size")
        .short('l')
        .help("Send buffer size")
        .value_name("size")
        .value_parser(clap::value_parser!(u32))
}

pub fn build_cli() -> Command {
    Command::new("icmpkit")
        .version(env!("CARGO_PKG_VERSION"))
        .about("ICMPv4 ping and traceroute over raw sockets")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("ping")
                .about("Send ICMP echo requests to a host")
                .arg(target_arg())
                .arg(
                    Arg::new("continuous")
                        .short('t')
                        .help("Ping the specified host until stopped")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("resolve")
                        .short('a')
                        .help("Resolve addresses to hostnames")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("count")
                        .short('n')
                        .help("Number of echo requests to send")
                        .value_name("count")
                        .value_parser(clap::value_parser!(u32)),
                )
                .arg(size_arg())
                .arg(timeout_arg()),
        )
        .subcommand(
            Command::new("tracert")
                .visible_alias("traceroute")
                .about("Trace the route to a host")
                .disable_help_flag(true)
                .arg(target_arg())
                .arg(
                    Arg::new("no_resolve")
                        .short('d')
                        .help("Do not resolve addresses to hostnames")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("max_hops")
                        .short('h')
                        .help("Maximum number of hops to search for target")
                        .value_name("maximum_hops")
                        .value_parser(clap::value_parser!(u32)),
                )
                .arg(timeout_arg())
                .arg(size_arg())
                .arg(
                    Arg::new("help")
                        .long("help")
                        .help("Print help")
                        .action(ArgAction::Help),
                ),
        )
}

fn parse_ping(matches: &ArgMatches) -> anyhow::Result<PingArgs> {
    let mut args = PingArgs::default();

    args.target = matches
        .get_one::<String>("target")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("missing target"))?;
    args.continuous = matches.get_flag("continuous");
    args.resolve_addresses = matches.get_flag("resolve");

    if let Some(count) = matches.get_one::<u32>("count") {
        args.count = Some(*count);
    }

    if let Some(size) = matches.get_one::<u32>("size") {
        args.size = *size;
    }

    if let Some(timeout) = matches.get_one::<u32>("timeout") {
        args.timeout = *timeout;
    }

    if args.continuous {
        args.count = None; // Continuous mode overrides count
    }

    Ok(args)
}

fn parse_trace(matches: &ArgMatches) -> anyhow::Result<TraceArgs> {
    let mut args = TraceArgs::default();

    args.target = matches
        .get_one::<String>("target")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("missing target"))?;
    args.no_resolve = matches.get_flag("no_resolve");

    if let Some(max_hops) = matches.get_one::<u32>("max_hops") {
        args.max_hops = *max_hops;
    }

    if let Some(timeout) = matches.get_one::<u32>("timeout") {
        args.timeout = *timeout;
    }

    if let Some(size) = matches.get_one::<u32>("size") {
        args.size = *size;
    }

    Ok(args)
}

pub fn parse_from<I, T>(argv: I) -> anyhow::Result<Action>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = build_cli().try_get_matches_from(argv)?;

    match matches.subcommand() {
        Some(("ping", sub)) => Ok(Action::Ping(parse_ping(sub)?)),
        Some(("tracert", sub)) => Ok(Action::Trace(parse_trace(sub)?)),
        _ => Err(anyhow::anyhow!("unknown command")),
    }
}

pub fn parse_args() -> Action {
    match parse_from(std::env::args_os()) {
        Ok(action) => action,
        Err(e) => match e.downcast::<clap::Error>() {
            Ok(clap_err) => clap_err.exit(),
            Err(e) => crate::utils::exit_with_error(&e.to_string(), 1),
        },
    }
}
