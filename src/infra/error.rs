use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("http client error: {message}")]
    Http { message: String },
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_build_matching_variants() {
        let http = InfraError::http("failed to build GitHub client: bad proxy");
        assert!(matches!(http, InfraError::Http { .. }));
        assert_eq!(
            http.to_string(),
            "http client error: failed to build GitHub client: bad proxy"
        );

        let telemetry = InfraError::telemetry("subscriber already set");
        assert_eq!(
            telemetry.to_string(),
            "telemetry initialization failed: subscriber already set"
        );
    }
}
