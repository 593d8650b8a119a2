//! Source-address checks that tie a clock action to the workplace network.

use actix_web::HttpRequest;
use ipnet::IpNet;
use std::net::{IpAddr, Ipv4Addr};
use tracing::{error, info, warn};

use crate::error::ClockError;
use crate::model::location::Location;

/// Picks the client address: `X-Real-IP`, then the first `X-Forwarded-For` hop,
/// then the socket peer. Header values that are not addresses are ignored.
pub fn resolve_client_ip(
    x_real_ip: Option<&str>,
    x_forwarded_for: Option<&str>,
    peer: Option<IpAddr>,
) -> String {
    if let Some(real_ip) = x_real_ip.map(str::trim).filter(|v| !v.is_empty()) {
        match real_ip.parse::<IpAddr>() {
            Ok(addr) => return addr.to_string(),
            Err(_) => warn!(value = real_ip, "Invalid X-Real-IP"),
        }
    }

    if let Some(forwarded) = x_forwarded_for {
        let first = forwarded.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            match first.parse::<IpAddr>() {
                Ok(addr) => return addr.to_string(),
                Err(_) => warn!(value = first, "Invalid X-Forwarded-For"),
            }
        }
    }

    peer.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)).to_string()
}

pub fn client_ip(req: &HttpRequest, trust_proxy_headers: bool) -> String {
    let peer = req.peer_addr().map(|addr| addr.ip());
    if !trust_proxy_headers {
        return resolve_client_ip(None, None, peer);
    }

    let header = |name: &str| req.headers().get(name).and_then(|h| h.to_str().ok());
    resolve_client_ip(header("X-Real-IP"), header("X-Forwarded-For"), peer)
}

enum AllowEntry {
    Addr(IpAddr),
    Net(IpNet),
}

fn parse_allow_entry(raw: &str) -> Result<AllowEntry, String> {
    let raw = raw.trim();
    if raw.contains('/') {
        // host bits are tolerated: "192.168.1.5/24" means 192.168.1.0/24
        raw.parse::<IpNet>()
            .map(|net| AllowEntry::Net(net.trunc()))
            .map_err(|e| e.to_string())
    } else {
        raw.parse::<IpAddr>()
            .map(AllowEntry::Addr)
            .map_err(|e| e.to_string())
    }
}

/// True when `client_ip` equals a literal entry or falls inside a CIDR entry.
/// Malformed entries are skipped, an empty list allows nothing.
pub fn is_ip_allowed(client_ip: &str, allowed_list: &[String]) -> bool {
    if allowed_list.is_empty() {
        warn!("Empty allowed IP list");
        return false;
    }

    let client_addr = match client_ip.trim().parse::<IpAddr>() {
        Ok(addr) => addr,
        Err(_) => {
            error!(client_ip, "Invalid client IP");
            return false;
        }
    };

    for allowed in allowed_list {
        match parse_allow_entry(allowed) {
            Ok(AllowEntry::Addr(addr)) if addr == client_addr => return true,
            Ok(AllowEntry::Net(net)) if net.contains(&client_addr) => return true,
            Ok(_) => {}
            Err(e) => warn!(entry = %allowed, error = %e, "Invalid entry in allow-list"),
        }
    }

    info!(client_ip, allowed = ?allowed_list, "IP not in allow-list");
    false
}

/// Rejects entries that would never match, so admins notice typos on save.
pub fn validate_allow_list(entries: &[String]) -> Result<Vec<String>, ClockError> {
    entries
        .iter()
        .map(|raw| raw.trim())
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            parse_allow_entry(raw)
                .map(|_| raw.to_string())
                .map_err(|e| ClockError::Validation(format!("Invalid IP or CIDR \"{raw}\": {e}")))
        })
        .collect()
}

pub fn validate_location_access(location: &Location, client_ip: &str) -> Result<(), ClockError> {
    if !location.is_active {
        return Err(ClockError::LocationInactive);
    }

    if location.allowed_ips.0.is_empty() {
        return Err(ClockError::NoAllowedIps);
    }

    if is_ip_allowed(client_ip, &location.allowed_ips.0) {
        Ok(())
    } else {
        Err(ClockError::IpNotAllowed {
            ip: client_ip.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::location::sample_location;
    use actix_web::test::TestRequest;

    fn list(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cidr_membership() {
        assert!(is_ip_allowed("192.168.1.50", &list(&["192.168.1.0/24"])));
        assert!(!is_ip_allowed("192.168.1.50", &list(&["10.0.0.0/8"])));
    }

    #[test]
    fn literal_match() {
        let allowed = list(&["85.123.45.67"]);
        assert!(is_ip_allowed("85.123.45.67", &allowed));
        assert!(!is_ip_allowed("85.123.45.68", &allowed));
    }

    #[test]
    fn empty_list_denies() {
        assert!(!is_ip_allowed("192.168.1.50", &[]));
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let allowed = list(&["not-an-ip", "300.1.1.1/24", " 192.168.1.0/24 "]);
        assert!(is_ip_allowed("192.168.1.50", &allowed));
        assert!(!is_ip_allowed("10.0.0.1", &allowed));
    }

    #[test]
    fn host_bits_in_cidr_are_tolerated() {
        assert!(is_ip_allowed("192.168.1.200", &list(&["192.168.1.5/24"])));
    }

    #[test]
    fn invalid_client_ip_is_rejected() {
        assert!(!is_ip_allowed("garbage", &list(&["0.0.0.0/0"])));
    }

    #[test]
    fn ipv6_ranges() {
        let allowed = list(&["2001:db8::/32"]);
        assert!(is_ip_allowed("2001:db8::1", &allowed));
        assert!(!is_ip_allowed("2001:db9::1", &allowed));
        assert!(!is_ip_allowed("192.168.1.50", &allowed));
    }

    #[test]
    fn header_priority() {
        let peer = Some("10.0.0.9".parse().unwrap());
        assert_eq!(
            resolve_client_ip(Some("85.1.1.1"), Some("85.2.2.2, 10.0.0.1"), peer),
            "85.1.1.1"
        );
        assert_eq!(
            resolve_client_ip(None, Some("85.2.2.2, 10.0.0.1"), peer),
            "85.2.2.2"
        );
        assert_eq!(resolve_client_ip(Some("bogus"), None, peer), "10.0.0.9");
        assert_eq!(resolve_client_ip(None, Some("bogus, 85.2.2.2"), peer), "10.0.0.9");
        assert_eq!(resolve_client_ip(None, None, None), "0.0.0.0");
    }

    #[test]
    fn proxy_headers_ignored_when_untrusted() {
        let req = TestRequest::default()
            .insert_header(("X-Real-IP", "85.1.1.1"))
            .peer_addr("10.0.0.9:4000".parse().unwrap())
            .to_http_request();

        assert_eq!(client_ip(&req, true), "85.1.1.1");
        assert_eq!(client_ip(&req, false), "10.0.0.9");
    }

    #[test]
    fn allow_list_validation() {
        assert_eq!(
            validate_allow_list(&list(&[" 85.123.45.67 ", "", "192.168.1.0/24"])).unwrap(),
            list(&["85.123.45.67", "192.168.1.0/24"])
        );
        assert!(matches!(
            validate_allow_list(&list(&["10.0.0.0/33"])),
            Err(ClockError::Validation(_))
        ));
    }

    #[test]
    fn location_access_gate() {
        let location = sample_location(&["192.168.1.0/24"]);
        assert!(validate_location_access(&location, "192.168.1.50").is_ok());
        assert!(matches!(
            validate_location_access(&location, "8.8.8.8"),
            Err(ClockError::IpNotAllowed { .. })
        ));

        let mut inactive = sample_location(&["192.168.1.0/24"]);
        inactive.is_active = false;
        assert!(matches!(
            validate_location_access(&inactive, "192.168.1.50"),
            Err(ClockError::LocationInactive)
        ));

        assert!(matches!(
            validate_location_access(&sample_location(&[]), "192.168.1.50"),
            Err(ClockError::NoAllowedIps)
        ));
    }
}
