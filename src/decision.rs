//! Capture decision
//!
//! Decides from status code and path alone whether an exchange is recorded.

use crate::config::CaptureConfig;

/// Whether an exchange with this status and path should be captured
pub fn should_capture(status_code: u16, path: &str, config: &CaptureConfig) -> bool {
    config.enabled
        && config.status_codes.contains(&status_code)
        && !is_excluded_path(path, &config.excluded_paths)
}

/// ASCII case-insensitive prefix match against the excluded paths
///
/// Plain prefix semantics: `/health` also excludes `/health2` and
/// `/healthcheck`.
pub fn is_excluded_path(path: &str, excluded: &[String]) -> bool {
    excluded.iter().any(|prefix| starts_with_ignore_case(path, prefix))
}

fn starts_with_ignore_case(path: &str, prefix: &str) -> bool {
    path.len() >= prefix.len()
        && path.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn config_with(codes: &[u16]) -> CaptureConfig {
        CaptureConfig {
            status_codes: codes.iter().copied().collect::<HashSet<_>>(),
            ..Default::default()
        }
    }

    #[test]
    fn test_codes_in_set_are_captured() {
        let config = CaptureConfig::default();
        for code in [400, 401, 403, 404, 500, 502, 503, 504] {
            assert!(should_capture(code, "/api/users", &config), "code {code}");
        }
    }

    #[test]
    fn test_codes_outside_set_are_skipped() {
        let config = CaptureConfig::default();
        for code in [200, 201, 204, 301, 302, 405, 409, 422, 429, 501, 599] {
            assert!(!should_capture(code, "/api/users", &config), "code {code}");
        }
    }

    #[test]
    fn test_exact_membership_not_range() {
        let config = config_with(&[500]);
        assert!(should_capture(500, "/x", &config));
        assert!(!should_capture(501, "/x", &config));
        assert!(!should_capture(499, "/x", &config));
    }

    #[test]
    fn test_disabled_never_captures() {
        let config = CaptureConfig::disabled();
        assert!(!should_capture(500, "/api/users", &config));
    }

    #[test]
    fn test_excluded_prefix_wins_for_every_code() {
        let config = CaptureConfig::default();
        for path in ["/health", "/actuator/info", "/metrics/prometheus", "/HEALTH", "/Actuator"] {
            for code in [400, 404, 500, 503] {
                assert!(!should_capture(code, path, &config), "{path} {code}");
            }
        }
    }

    #[test]
    fn test_prefix_boundary_is_not_segment_aware() {
        let config = CaptureConfig::default();
        assert!(!should_capture(500, "/health2", &config));
        assert!(!should_capture(500, "/healthcheck", &config));
        assert!(should_capture(500, "/api/health", &config));
    }

    #[test]
    fn test_path_shorter_than_prefix() {
        let excluded = vec!["/actuator".to_string()];
        assert!(!is_excluded_path("/act", &excluded));
        assert!(!is_excluded_path("", &excluded));
    }

    #[test]
    fn test_non_ascii_path_does_not_panic() {
        let excluded = vec!["/héalth".to_string()];
        assert!(is_excluded_path("/héalth/live", &excluded));
        assert!(!is_excluded_path("/é", &excluded));
    }
}
