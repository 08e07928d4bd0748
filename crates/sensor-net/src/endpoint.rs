//! Shared handling of configured HTTP endpoints.

use url::Url;

/// Stored endpoint slots are short, so operators routinely drop the
/// scheme. Treat a bare `host/path` as plain http.
pub(crate) fn service_url(raw: &str) -> Result<Url, url::ParseError> {
    match Url::parse(raw) {
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("http://{raw}")),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_hosts_default_to_http() {
        assert_eq!(
            service_url("collector.example.net/ingest").unwrap().as_str(),
            "http://collector.example.net/ingest"
        );
    }

    #[test]
    fn explicit_schemes_pass_through() {
        assert_eq!(
            service_url("https://collector.example.net/ingest")
                .unwrap()
                .as_str(),
            "https://collector.example.net/ingest"
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(service_url("http://[half").is_err());
    }
}
