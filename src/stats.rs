use std::time::Duration;

use icmpx::echo::Response;

use crate::utils::format_time;

/// Round-trip statistics for one target.
#[derive(Debug, Clone, Default)]
pub struct PingStatistics {
    pub packets_sent: u32,
    pub packets_received: u32,
    pub packets_lost: u32,
    pub min_time: Option<Duration>,
    pub max_time: Duration,
    pub total_time: Duration,
}

impl PingStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&mut self) {
        self.packets_sent += 1;
    }

    pub fn record_received(&mut self, response: &Response) {
        let rtt = response.duration;
        self.packets_received += 1;
        self.total_time += rtt;
        self.min_time = Some(self.min_time.map_or(rtt, |min| min.min(rtt)));
        self.max_time = self.max_time.max(rtt);
    }

    pub fn record_lost(&mut self) {
        self.packets_lost += 1;
    }

    pub fn loss_percentage(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        (self.packets_lost as f64 / self.packets_sent as f64) * 100.0
    }

    pub fn average_time(&self) -> Duration {
        if self.packets_received == 0 {
            return Duration::ZERO;
        }
        self.total_time / self.packets_received
    }

    pub fn format_summary(&self, target: &str) -> String {
        let mut summary = format!(
            "\nPing statistics for {}:\n    Packets: Sent = {}, Received = {}, Lost = {} ({:.0}% loss),\n",
            target,
            self.packets_sent,
            self.packets_received,
            self.packets_lost,
            self.loss_percentage()
        );

        if self.packets_received > 0 {
            summary.push_str(&format!(
                "Approximate round trip times:\n    Minimum = {}, Maximum = {}, Average = {}\n",
                format_time(self.min_time.unwrap_or_default()),
                format_time(self.max_time),
                format_time(self.average_time())
            ));
        }

        summary
    }

    pub fn format_response(&self, response: &Response, resolved_name: Option<&str>) -> String {
        let source_display = match resolved_name {
            Some(name) => format!("{} [{}]", name, response.ip),
            None => response.ip.to_string(),
        };

        format!(
            "Reply from {}: id={} seq={} time={}",
            source_display,
            response.pong.id,
            response.pong.seq,
            format_time(response.duration)
        )
    }

    pub fn format_header(target: &str, resolved_ip: &str, interface: &str) -> String {
        if target == resolved_ip {
            format!("Pinging {} on {}:", target, interface)
        } else {
            format!("Pinging {} [{}] on {}:", target, resolved_ip, interface)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icmpx::{Echo, ZonedAddr};
    use std::net::IpAddr;

    fn response(ms: u64, seq: u16) -> Response {
        let echo = Echo {
            id: 7,
            seq,
            data: vec![0, 7, 1, 2, 3, 4, 5, 6],
        };
        Response {
            duration: Duration::from_millis(ms),
            ping: echo.clone(),
            pong: echo,
            ip: ZonedAddr::from("192.0.2.1".parse::<IpAddr>().unwrap()),
        }
    }

    #[test]
    fn test_statistics_calculation() {
        let mut stats = PingStatistics::new();

        stats.record_sent();
        stats.record_received(&response(10, 1));

        stats.record_sent();
        stats.record_received(&response(20, 2));

        stats.record_sent();
        stats.record_lost();

        assert_eq!(stats.packets_sent, 3);
        assert_eq!(stats.packets_received, 2);
        assert_eq!(stats.packets_lost, 1);
        assert!((stats.loss_percentage() - 33.333333333333336).abs() < 0.0001);
        assert_eq!(stats.average_time(), Duration::from_millis(15));
        assert_eq!(stats.min_time, Some(Duration::from_millis(10)));
        assert_eq!(stats.max_time, Duration::from_millis(20));
    }

    #[test]
    fn test_response_formatting() {
        let stats = PingStatistics::new();
        let formatted = stats.format_response(&response(16, 1), None);
        assert_eq!(formatted, "Reply from 192.0.2.1: id=7 seq=1 time=16ms");

        let formatted = stats.format_response(&response(0, 1), Some("host.test"));
        assert_eq!(formatted, "Reply from host.test [192.0.2.1]: id=7 seq=1 time=<1ms");
    }

    #[test]
    fn test_summary_formatting() {
        let mut stats = PingStatistics::new();
        stats.record_sent();
        stats.record_received(&response(10, 1));
        stats.record_sent();
        stats.record_lost();

        let summary = stats.format_summary("192.0.2.1");
        assert!(summary.contains("Ping statistics for 192.0.2.1"));
        assert!(summary.contains("Sent = 2"));
        assert!(summary.contains("Received = 1"));
        assert!(summary.contains("Lost = 1"));
        assert!(summary.contains("50% loss"));
        assert!(summary.contains("Minimum = 10ms"));
    }

    #[test]
    fn test_summary_without_replies() {
        let mut stats = PingStatistics::new();
        stats.record_sent();
        stats.record_lost();

        let summary = stats.format_summary("192.0.2.1");
        assert!(summary.contains("100% loss"));
        assert!(!summary.contains("Minimum"));
    }
}
