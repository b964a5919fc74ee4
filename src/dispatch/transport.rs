//! HTTP transport seam.
//!
//! Non-2xx statuses are responses, not errors; only delivery failures are
//! errors, reported as [`stanzakit::Error::Network`].

use stanzakit::Error;
use std::time::Duration;

/// Status and body of a delivered request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    /// Splunk answers 200 for updates and 201 for creations.
    pub fn is_success(&self) -> bool {
        matches!(self.status, 200 | 201)
    }
}

/// Sends form-encoded POST requests.
pub trait Transport: Send + Sync {
    fn post(
        &self,
        url: &str,
        headers: &[(&str, String)],
        form: &[(String, String)],
    ) -> stanzakit::Result<Response>;
}

/// Production transport on `ureq`.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// Create a transport. `verify_tls = false` accepts any certificate.
    pub fn new(verify_tls: bool) -> Self {
        let tls = ureq::tls::TlsConfig::builder()
            .disable_verification(!verify_tls)
            .build();
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .tls_config(tls)
            .timeout_global(Some(Duration::from_secs(60)))
            .build();
        if !verify_tls {
            log::warn!("TLS certificate verification is disabled");
        }
        Self {
            agent: config.into(),
        }
    }
}

impl Transport for UreqTransport {
    fn post(
        &self,
        url: &str,
        headers: &[(&str, String)],
        form: &[(String, String)],
    ) -> stanzakit::Result<Response> {
        let network = |e: ureq::Error| Error::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let mut request = self.agent.post(url);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let mut response = request
            .send_form(form.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .map_err(network)?;

        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string().unwrap_or_default();
        Ok(Response { status, body })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records requests and answers with a fixed status, or a network error
    /// for URLs containing `fail_on`.
    pub struct MockTransport {
        pub status: u16,
        pub fail_on: Option<String>,
        pub calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    impl MockTransport {
        pub fn new(status: u16) -> Self {
            Self {
                status,
                fail_on: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing_on(mut self, fragment: &str) -> Self {
            self.fail_on = Some(fragment.to_string());
            self
        }

        pub fn urls(&self) -> Vec<String> {
            let mut urls: Vec<_> = self
                .calls
                .lock()
                .unwrap()
                .iter()
                .map(|(url, _)| url.clone())
                .collect();
            urls.sort();
            urls
        }
    }

    impl Transport for MockTransport {
        fn post(
            &self,
            url: &str,
            headers: &[(&str, String)],
            form: &[(String, String)],
        ) -> stanzakit::Result<Response> {
            assert!(headers.iter().any(|(name, _)| *name == "Authorization"));
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), form.to_vec()));

            if let Some(fragment) = &self.fail_on
                && url.contains(fragment.as_str())
            {
                return Err(Error::Network {
                    url: url.to_string(),
                    message: "connection refused".to_string(),
                });
            }
            Ok(Response {
                status: self.status,
                body: String::new(),
            })
        }
    }

    #[test]
    fn test_success_statuses() {
        let ok = |status| Response {
            status,
            body: String::new(),
        };
        assert!(ok(200).is_success());
        assert!(ok(201).is_success());
        assert!(!ok(204).is_success());
        assert!(!ok(409).is_success());
    }

    #[test]
    fn test_delivery_failure_is_network_error() {
        let transport = MockTransport::new(200).failing_on("/down");
        let headers = [("Authorization", "Bearer t".to_string())];
        let err = transport
            .post("https://splunk:8089/down", &headers, &[])
            .unwrap_err();

        assert_eq!(err.category(), stanzakit::ErrorCategory::Network);
        assert!(!err.category().is_line_local());
        assert_eq!(
            err.to_string(),
            "network error for https://splunk:8089/down: connection refused"
        );
    }
}
