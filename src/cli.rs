use clap::{Arg, ArgAction, ArgMatches, Command};

#[derive(Debug, Clone)]
pub struct PingArgs {
    pub targets: Vec<String>,
    pub interface: String,
    pub continuous: bool,
    pub resolve_addresses: bool,
    pub count: Option<u32>,
    pub timeout: u32,
    pub interval: u32,
    pub retry_delay: u32,
    pub force_ipv4: bool,
    pub force_ipv6: bool,
}

impl Default for PingArgs {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            interface: String::new(),
            continuous: false,
            resolve_addresses: false,
            count: Some(4),
            timeout: 4000,
            interval: 1000,
            retry_delay: 1000,
            force_ipv4: false,
            force_ipv6: false,
        }
    }
}

pub fn build_cli() -> Command {
    Command::new("icmpx")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Ping hosts over raw ICMP sockets bound to one network interface")
        .arg(
            Arg::new("targets")
                .help("Target hostnames or IP addresses")
                .value_name("target")
                .required(true)
                .num_args(1..)
                .index(1),
        )
        .arg(
            Arg::new("interface")
                .short('I')
                .long("iface")
                .help("Network interface name or index to bind")
                .value_name("iface")
                .required(true),
        )
        .arg(
            Arg::new("continuous")
                .short('t')
                .help("Ping the specified hosts until stopped")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("resolve")
                .short('a')
                .help("Resolve replying addresses to hostnames")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("count")
                .short('n')
                .help("Number of echo requests to send per target")
                .value_name("count")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("timeout")
                .short('w')
                .help("Timeout in milliseconds to wait for each reply")
                .value_name("timeout")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .help("Milliseconds between echo requests to one target")
                .value_name("interval")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("retry_delay")
                .long("retry-delay")
                .help("Milliseconds without a reply before a request is resent")
                .value_name("ms")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("force_ipv4")
                .short('4')
                .help("Force using IPv4")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("force_ipv6")
                .short('6')
                .help("Force using IPv6")
                .action(ArgAction::SetTrue),
        )
}

pub fn parse_args() -> anyhow::Result<PingArgs> {
    parse_matches(&build_cli().get_matches())
}

fn parse_matches(matches: &ArgMatches) -> anyhow::Result<PingArgs> {
    let mut args = PingArgs::default();

    if let Some(targets) = matches.get_many::<String>("targets") {
        args.targets = targets.cloned().collect();
    }

    if let Some(iface) = matches.get_one::<String>("interface") {
        args.interface = iface.clone();
    }

    args.continuous = matches.get_flag("continuous");
    args.resolve_addresses = matches.get_flag("resolve");
    args.force_ipv4 = matches.get_flag("force_ipv4");
    args.force_ipv6 = matches.get_flag("force_ipv6");

    if let Some(count) = matches.get_one::<u32>("count") {
        args.count = Some(*count);
    }

    if let Some(timeout) = matches.get_one::<u32>("timeout") {
        args.timeout = *timeout;
    }

    if let Some(interval) = matches.get_one::<u32>("interval") {
        args.interval = *interval;
    }

    if let Some(retry_delay) = matches.get_one::<u32>("retry_delay") {
        args.retry_delay = *retry_delay;
    }

    // Validation
    if args.force_ipv4 && args.force_ipv6 {
        return Err(anyhow::anyhow!("Cannot force both IPv4 and IPv6"));
    }

    if args.continuous {
        args.count = None; // Continuous mode overrides count
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> anyhow::Result<PingArgs> {
        let matches = build_cli().try_get_matches_from(argv)?;
        parse_matches(&matches)
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["icmpx", "-I", "eth0", "192.0.2.1", "example.com"]).unwrap();
        assert_eq!(args.interface, "eth0");
        assert_eq!(args.targets, vec!["192.0.2.1", "example.com"]);
        assert_eq!(args.count, Some(4));
        assert_eq!(args.timeout, 4000);
        assert_eq!(args.interval, 1000);
        assert_eq!(args.retry_delay, 1000);
    }

    #[test]
    fn test_continuous_overrides_count() {
        let args = parse(&["icmpx", "-I", "2", "-t", "-n", "10", "::1"]).unwrap();
        assert!(args.continuous);
        assert_eq!(args.count, None);
    }

    #[test]
    fn test_invalid_combinations() {
        assert!(parse(&["icmpx", "-I", "lo", "-4", "-6", "::1"]).is_err());
        assert!(parse(&["icmpx", "::1"]).is_err());
        assert!(parse(&["icmpx", "-I", "lo"]).is_err());
    }
}
