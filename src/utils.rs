use std::process;
use std::time::Duration;

use log::warn;
use tokio_util::sync::CancellationToken;

use crate::cli::PingArgs;

/// Print error message and exit with error code
pub fn exit_with_error(message: &str, code: i32) -> ! {
    eprintln!("icmpx: {}", message);
    process::exit(code);
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!("warning: {}", message);
}

/// Extra guidance for errors caused by missing raw socket privileges.
pub fn privilege_hint(err: &icmpx::Error) -> Option<&'static str> {
    if err.is_permission_denied() {
        Some(
            "raw ICMP sockets require elevated privileges:\n\
            1. run as root, or\n\
            2. grant the binary CAP_NET_RAW: setcap cap_net_raw+ep <path-to-icmpx>",
        )
    } else {
        None
    }
}

/// Validate ping parameters
pub fn validate_ping_params(args: &PingArgs) -> anyhow::Result<()> {
    if args.count == Some(0) {
        return Err(anyhow::anyhow!("count must be greater than 0"));
    }

    if args.timeout == 0 {
        return Err(anyhow::anyhow!("timeout must be greater than 0"));
    }

    if args.retry_delay == 0 {
        return Err(anyhow::anyhow!("retry delay must be greater than 0"));
    }

    if args.retry_delay >= args.timeout {
        print_warning("retry delay is not shorter than the timeout, requests will not be resent");
    }

    Ok(())
}

/// Format time duration for display
pub fn format_time(d: Duration) -> String {
    if d < Duration::from_millis(1) {
        "<1ms".to_string()
    } else {
        format!("{:.0}ms", d.as_secs_f64() * 1000.0)
    }
}

/// Handle Ctrl+C signal for graceful shutdown
pub fn setup_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
            return;
        }
        cancel.cancel();
    });

    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_parameter_validation() {
        let valid = PingArgs {
            targets: vec!["192.0.2.1".to_string()],
            interface: "lo".to_string(),
            ..Default::default()
        };
        assert!(validate_ping_params(&valid).is_ok());

        let zero_count = PingArgs {
            count: Some(0),
            ..valid.clone()
        };
        assert!(validate_ping_params(&zero_count).is_err());

        let zero_timeout = PingArgs {
            timeout: 0,
            ..valid.clone()
        };
        assert!(validate_ping_params(&zero_timeout).is_err());

        let zero_retry = PingArgs {
            retry_delay: 0,
            ..valid
        };
        assert!(validate_ping_params(&zero_retry).is_err());
    }

    #[test]
    fn test_time_formatting() {
        assert_eq!(format_time(Duration::from_micros(500)), "<1ms");
        assert_eq!(format_time(Duration::from_millis(1)), "1ms");
        assert_eq!(format_time(Duration::from_micros(15_700)), "16ms");
        assert_eq!(format_time(Duration::from_millis(100)), "100ms");
    }

    #[test]
    fn test_privilege_hint() {
        let denied = icmpx::Error::from(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(privilege_hint(&denied).unwrap().contains("CAP_NET_RAW"));
        assert!(privilege_hint(&icmpx::Error::Closed).is_none());
    }
}
