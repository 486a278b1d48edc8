//! 监听端口的来源 IP 过滤。
//!
//! 条目可以是单个地址（`10.0.0.5`）或 CIDR（`10.0.0.0/8`、`fd00::/8`）：
//! - 命中 deny 一律拒绝
//! - allow 非空时，只放行命中 allow 的地址
//! - 两个列表都为空时不过滤

use crate::error::ProtocolError;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IpRule {
    Addr(IpAddr),
    Net { network: IpAddr, prefix: u8 },
}

impl IpRule {
    fn parse(entry: &str) -> Result<Self, ProtocolError> {
        let entry = entry.trim();
        let invalid = || ProtocolError::Config(format!("invalid ip filter entry: {entry}"));
        match entry.split_once('/') {
            None => entry.parse().map(IpRule::Addr).map_err(|_| invalid()),
            Some((addr, prefix)) => {
                let written: IpAddr = addr.parse().map_err(|_| invalid())?;
                let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
                // `::ffff:a.b.c.d/n` 归一为 IPv4 网段，前缀扣除 96 位映射头。
                let (network, prefix) = match (written, written.to_canonical()) {
                    (IpAddr::V6(_), network @ IpAddr::V4(_)) => {
                        (network, prefix.checked_sub(96).ok_or_else(invalid)?)
                    }
                    (_, network) => (network, prefix),
                };
                let max = if network.is_ipv4() { 32 } else { 128 };
                if prefix > max {
                    return Err(invalid());
                }
                Ok(IpRule::Net { network, prefix })
            }
        }
    }

    fn matches(&self, ip: IpAddr) -> bool {
        match *self {
            IpRule::Addr(addr) => addr.to_canonical() == ip,
            IpRule::Net { network, prefix } => match (network, ip) {
                (IpAddr::V4(net), IpAddr::V4(ip)) => {
                    let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
                    u32::from(net) & mask == u32::from(ip) & mask
                }
                (IpAddr::V6(net), IpAddr::V6(ip)) => {
                    let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
                    u128::from(net) & mask == u128::from(ip) & mask
                }
                _ => false,
            },
        }
    }
}

/// 编译后的 allow / deny 规则。
#[derive(Debug, Clone, Default)]
pub struct IpFilter {
    allow: Vec<IpRule>,
    deny: Vec<IpRule>,
}

impl IpFilter {
    /// 解析 allow / deny 列表，任一条目非法即失败。
    pub fn compile(allow: &[String], deny: &[String]) -> Result<Self, ProtocolError> {
        Ok(Self {
            allow: allow
                .iter()
                .map(|entry| IpRule::parse(entry))
                .collect::<Result<_, _>>()?,
            deny: deny
                .iter()
                .map(|entry| IpRule::parse(entry))
                .collect::<Result<_, _>>()?,
        })
    }

    /// 不过滤任何来源。
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        !self.allow.is_empty() || !self.deny.is_empty()
    }

    pub fn allows(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        if self.deny.iter().any(|rule| rule.matches(ip)) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|rule| rule.matches(ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|entry| entry.to_string()).collect()
    }

    fn ip(text: &str) -> IpAddr {
        text.parse().expect("ip")
    }

    #[test]
    fn empty_filter_allows_everything() {
        let filter = IpFilter::allow_all();
        assert!(!filter.is_enabled());
        assert!(filter.allows(ip("192.0.2.1")));
        assert!(filter.allows(ip("::1")));
    }

    #[test]
    fn allow_list_rejects_unlisted_addresses() {
        let filter = IpFilter::compile(&list(&["10.0.0.0/8", "192.168.1.7"]), &[]).expect("compile");
        assert!(filter.allows(ip("10.20.30.40")));
        assert!(filter.allows(ip("192.168.1.7")));
        assert!(!filter.allows(ip("192.168.1.8")));
    }

    #[test]
    fn deny_wins_over_allow() {
        let filter =
            IpFilter::compile(&list(&["10.0.0.0/8"]), &list(&["10.0.0.13"])).expect("compile");
        assert!(filter.allows(ip("10.0.0.12")));
        assert!(!filter.allows(ip("10.0.0.13")));
    }

    #[test]
    fn deny_only_allows_the_rest() {
        let filter = IpFilter::compile(&[], &list(&["127.0.0.0/8"])).expect("compile");
        assert!(!filter.allows(ip("127.0.0.1")));
        assert!(filter.allows(ip("198.51.100.4")));
    }

    #[test]
    fn mapped_ipv6_matches_ipv4_rules() {
        let filter = IpFilter::compile(&list(&["127.0.0.1"]), &[]).expect("compile");
        assert!(filter.allows(ip("::ffff:127.0.0.1")));
    }

    #[test]
    fn ipv6_prefix_and_zero_prefix() {
        let filter = IpFilter::compile(&list(&["fd00::/8"]), &[]).expect("compile");
        assert!(filter.allows(ip("fd12::1")));
        assert!(!filter.allows(ip("fe80::1")));

        let any = IpFilter::compile(&list(&["0.0.0.0/0"]), &[]).expect("compile");
        assert!(any.allows(ip("203.0.113.9")));
        assert!(!any.allows(ip("2001:db8::1")));
    }

    #[test]
    fn mapped_cidr_is_normalized_to_ipv4() {
        let filter = IpFilter::compile(&[], &list(&["::ffff:10.0.0.0/104"])).expect("compile");
        assert!(!filter.allows(ip("10.1.2.3")));
        assert!(!filter.allows(ip("::ffff:10.200.0.1")));
        assert!(filter.allows(ip("192.168.1.1")));

        let allow = IpFilter::compile(&list(&["::ffff:192.168.1.0/120"]), &[]).expect("compile");
        assert!(allow.allows(ip("192.168.1.77")));
        assert!(!allow.allows(ip("192.168.2.1")));
    }

    #[test]
    fn mapped_cidr_with_short_prefix_is_rejected() {
        assert!(IpFilter::compile(&[], &list(&["::ffff:10.0.0.0/64"])).is_err());
        assert!(IpFilter::compile(&list(&["::ffff:10.0.0.0/129"]), &[]).is_err());
    }

    #[test]
    fn invalid_entries_are_rejected() {
        assert!(IpFilter::compile(&list(&["not-an-ip"]), &[]).is_err());
        assert!(IpFilter::compile(&[], &list(&["10.0.0.0/33"])).is_err());
        assert!(IpFilter::compile(&list(&["10.0.0.0/x"]), &[]).is_err());
    }
}
