//! CIDR/range/single pool containment tests.
//!
//! Pools are tested in the order they're given (the caller, [`super::Reconciler`],
//! is responsible for a deterministic pool order — e.g. the order returned by
//! storage) and the first matching pool wins.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnetwork::{Ipv4Network, Ipv6Network};

use crate::storage::model::{IpamEntryType, IpamPool};

/// Finds the first pool that contains `ip`, testing pools in the given order.
#[must_use]
pub fn find_pool_for_ip<'a>(ip: &IpAddr, pools: &'a [IpamPool]) -> Option<&'a IpamPool> {
    pools.iter().find(|pool| pool_contains(pool, ip))
}

fn pool_contains(pool: &IpamPool, ip: &IpAddr) -> bool {
    match pool.entry_type {
        IpamEntryType::Cidr => pool.cidr.as_deref().is_some_and(|cidr| cidr_contains(cidr, ip)),
        IpamEntryType::Range => match (&pool.range_start, &pool.range_end) {
            (Some(start), Some(end)) => range_contains(start, end, ip),
            _ => false,
        },
        IpamEntryType::Single => {
            pool.range_start.as_deref() == Some(ip.to_string().as_str())
                || pool.cidr.as_deref() == Some(ip.to_string().as_str())
        }
    }
}

/// CIDR containment: excludes the network and broadcast address for
/// prefixes shorter than /31; /31 and /32 have no such reserved addresses
/// and admit every address in the mask range.
fn cidr_contains(cidr: &str, ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let Ok(net) = Ipv4Network::from_str(cidr) else { return false };
            if !net.contains(*v4) {
                return false;
            }
            net.prefix() >= 31 || (*v4 != net.network() && *v4 != net.broadcast())
        }
        IpAddr::V6(v6) => Ipv6Network::from_str(cidr).is_ok_and(|net| net.contains(*v6)),
    }
}

fn range_contains(start: &str, end: &str, ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let (Ok(s), Ok(e)) = (Ipv4Addr::from_str(start), Ipv4Addr::from_str(end)) else {
                return false;
            };
            let v = u32::from(*v4);
            v >= u32::from(s) && v <= u32::from(e)
        }
        IpAddr::V6(v6) => {
            let (Ok(s), Ok(e)) = (Ipv6Addr::from_str(start), Ipv6Addr::from_str(end)) else {
                return false;
            };
            let v = u128::from(*v6);
            v >= u128::from(s) && v <= u128::from(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cidr_pool(cidr: &str) -> IpamPool {
        IpamPool {
            id: "p1".into(),
            name: "test".into(),
            entry_type: IpamEntryType::Cidr,
            cidr: Some(cidr.to_string()),
            range_start: None,
            range_end: None,
        }
    }

    #[test]
    fn cidr_excludes_network_and_broadcast_for_slash_24() {
        let pool = cidr_pool("10.0.0.0/24");
        let pools = vec![pool];
        assert!(find_pool_for_ip(&"10.0.0.0".parse().unwrap(), &pools).is_none());
        assert!(find_pool_for_ip(&"10.0.0.255".parse().unwrap(), &pools).is_none());
        assert!(find_pool_for_ip(&"10.0.0.1".parse().unwrap(), &pools).is_some());
        assert!(find_pool_for_ip(&"10.0.0.254".parse().unwrap(), &pools).is_some());
        assert!(find_pool_for_ip(&"10.0.1.1".parse().unwrap(), &pools).is_none());
    }

    #[test]
    fn slash_31_and_slash_32_admit_every_address_in_range() {
        let pools = vec![cidr_pool("10.0.0.0/31")];
        assert!(find_pool_for_ip(&"10.0.0.0".parse().unwrap(), &pools).is_some());
        assert!(find_pool_for_ip(&"10.0.0.1".parse().unwrap(), &pools).is_some());

        let pools = vec![cidr_pool("10.0.0.5/32")];
        assert!(find_pool_for_ip(&"10.0.0.5".parse().unwrap(), &pools).is_some());
    }

    #[test]
    fn range_pool_matches_integer_comparison() {
        let pool = IpamPool {
            id: "p2".into(),
            name: "range".into(),
            entry_type: IpamEntryType::Range,
            cidr: None,
            range_start: Some("192.168.1.10".into()),
            range_end: Some("192.168.1.20".into()),
        };
        let pools = vec![pool];
        assert!(find_pool_for_ip(&"192.168.1.10".parse().unwrap(), &pools).is_some());
        assert!(find_pool_for_ip(&"192.168.1.20".parse().unwrap(), &pools).is_some());
        assert!(find_pool_for_ip(&"192.168.1.21".parse().unwrap(), &pools).is_none());
        assert!(find_pool_for_ip(&"192.168.1.9".parse().unwrap(), &pools).is_none());
    }

    #[test]
    fn single_pool_matches_either_field() {
        let pool = IpamPool {
            id: "p3".into(),
            name: "single".into(),
            entry_type: IpamEntryType::Single,
            cidr: None,
            range_start: Some("1.2.3.4".into()),
            range_end: None,
        };
        let pools = vec![pool];
        assert!(find_pool_for_ip(&"1.2.3.4".parse().unwrap(), &pools).is_some());
        assert!(find_pool_for_ip(&"1.2.3.5".parse().unwrap(), &pools).is_none());
    }

    #[test]
    fn first_matching_pool_in_order_wins() {
        let pools = vec![cidr_pool("10.0.0.0/16"), cidr_pool("10.0.0.0/24")];
        let found = find_pool_for_ip(&"10.0.0.5".parse().unwrap(), &pools).unwrap();
        assert_eq!(found.cidr.as_deref(), Some("10.0.0.0/16"));
    }
}
