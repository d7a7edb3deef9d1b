//! Route string decomposition
//!
//! A route string is `host.domain/path` for HTTP domains or `domain:port`
//! for TCP domains. The domain part is matched against the catalog with the
//! longest name first, so `x.a.b.com` resolves to `a.b.com` with host `x`
//! even when `b.com` is also in the catalog.

use crate::error::{Result, RouteError};
use ferry_types::{DecomposedRoute, DomainSummary};

/// A decomposed route together with the catalog entry it matched
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRoute<'a> {
    pub domain: &'a DomainSummary,
    pub route: DecomposedRoute,
}

/// Split `route` against `domains`.
///
/// `path_override`, when given, replaces any path in the route string.
pub fn decompose_route<'a>(
    domains: &'a [DomainSummary],
    route: &str,
    path_override: Option<&str>,
) -> Result<MatchedRoute<'a>> {
    let route = route.trim();

    // 1. Split off the path
    let (remainder, mut path) = match route.find('/') {
        Some(index) => (&route[..index], Some(route[index..].to_string())),
        None => (route, None),
    };
    if let Some(path_override) = path_override.filter(|p| !p.is_empty()) {
        path = Some(path_override.to_string());
    }

    // 2. Split off a trailing port
    let (remainder, port) = match remainder.rsplit_once(':') {
        Some((head, digits)) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            let port = digits
                .parse::<u16>()
                .map_err(|_| RouteError::invalid(route, format!("port {} is out of range", digits)))?;
            (head, Some(port))
        }
        _ => (remainder, None),
    };

    // 3. Longest matching domain wins
    let mut sorted: Vec<&DomainSummary> = domains.iter().collect();
    sorted.sort_by(|a, b| b.name.len().cmp(&a.name.len()));

    let domain = sorted
        .into_iter()
        .find(|d| is_domain_match(remainder, &d.name))
        .ok_or_else(|| RouteError::DomainNotFound {
            route: route.to_string(),
        })?;

    let host = (remainder.len() > domain.name.len())
        .then(|| remainder[..remainder.len() - domain.name.len() - 1].to_string())
        .filter(|h| !h.is_empty());

    // 4. Host and path never combine with a port
    if port.is_some() && (host.is_some() || path.is_some()) {
        return Err(RouteError::invalid(route, "host/path cannot be set with port"));
    }
    if port.is_some() && !domain.is_tcp() {
        return Err(RouteError::invalid(
            route,
            format!("port requires a TCP domain, {} is HTTP", domain.name),
        ));
    }

    Ok(MatchedRoute {
        domain,
        route: DecomposedRoute {
            domain: domain.name.clone(),
            host,
            path,
            port,
        },
    })
}

/// Domain names compare ASCII case-insensitively
fn is_domain_match(route: &str, domain: &str) -> bool {
    let Some(split) = route.len().checked_sub(domain.len()) else {
        return false;
    };
    if !route.is_char_boundary(split) {
        return false;
    }
    let (prefix, suffix) = route.split_at(split);
    suffix.eq_ignore_ascii_case(domain) && (prefix.is_empty() || prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<DomainSummary> {
        vec![
            DomainSummary::http("1", "b.com"),
            DomainSummary::tcp("2", "a.b.com"),
        ]
    }

    fn http_catalog() -> Vec<DomainSummary> {
        vec![
            DomainSummary::http("1", "test.com"),
            DomainSummary::http("2", "test.test.com"),
        ]
    }

    #[test]
    fn test_longest_domain_wins() {
        let domains = vec![
            DomainSummary::http("1", "b.com"),
            DomainSummary::http("2", "a.b.com"),
        ];
        let matched = decompose_route(&domains, "x.a.b.com/path", None).unwrap();

        assert_eq!(matched.domain.name, "a.b.com");
        assert_eq!(matched.route.host.as_deref(), Some("x"));
        assert_eq!(matched.route.path.as_deref(), Some("/path"));
        assert_eq!(matched.route.port, None);
    }

    #[test]
    fn test_tcp_port() {
        let domains = catalog();
        let matched = decompose_route(&domains, "a.b.com:1234", None).unwrap();

        assert_eq!(matched.route.domain, "a.b.com");
        assert_eq!(matched.route.port, Some(1234));
        assert_eq!(matched.route.host, None);
        assert_eq!(matched.route.path, None);
    }

    #[test]
    fn test_bare_domain_has_no_host() {
        let domains = http_catalog();
        let matched = decompose_route(&domains, "test.test.com", None).unwrap();
        assert_eq!(matched.route.domain, "test.test.com");
        assert_eq!(matched.route.host, None);

        let matched = decompose_route(&domains, "host.test.com", None).unwrap();
        assert_eq!(matched.route.domain, "test.com");
        assert_eq!(matched.route.host.as_deref(), Some("host"));
    }

    #[test]
    fn test_path_override() {
        let domains = http_catalog();
        let matched = decompose_route(&domains, "host.test.com/path", Some("/override-path")).unwrap();
        assert_eq!(matched.route.path.as_deref(), Some("/override-path"));
    }

    #[test]
    fn test_unmatched_suffix() {
        let domains = http_catalog();
        for route in ["miss.com", "est.com", "miss.com/path"] {
            assert_eq!(
                decompose_route(&domains, route, None),
                Err(RouteError::DomainNotFound {
                    route: route.to_string()
                })
            );
        }
        assert!(decompose_route(&[], "test.com", None).is_err());
    }

    #[test]
    fn test_domain_match_ignores_case() {
        let domains = vec![DomainSummary::http("1", "apps.example.com")];
        let matched = decompose_route(&domains, "web.Apps.Example.COM/v1", None).unwrap();

        assert_eq!(matched.domain.name, "apps.example.com");
        assert_eq!(matched.route.domain, "apps.example.com");
        assert_eq!(matched.route.host.as_deref(), Some("web"));
        assert_eq!(matched.route.path.as_deref(), Some("/v1"));
    }

    #[test]
    fn test_partial_label_does_not_match() {
        let domains = vec![
            DomainSummary::http("1", "test.something.com"),
            DomainSummary::http("2", "something.com"),
            DomainSummary::http("3", "hing.com"),
        ];
        assert!(matches!(
            decompose_route(&domains, "thing.com", None),
            Err(RouteError::DomainNotFound { .. })
        ));
    }

    #[test]
    fn test_host_with_port_is_invalid() {
        let domains = catalog();
        assert!(matches!(
            decompose_route(&domains, "x.a.b.com:1234", None),
            Err(RouteError::InvalidRoute { .. })
        ));
        assert!(matches!(
            decompose_route(&domains, "a.b.com:1234/path", None),
            Err(RouteError::InvalidRoute { .. })
        ));
    }

    #[test]
    fn test_port_on_http_domain_is_invalid() {
        let domains = catalog();
        assert!(matches!(
            decompose_route(&domains, "b.com:80", None),
            Err(RouteError::InvalidRoute { .. })
        ));
    }
}
