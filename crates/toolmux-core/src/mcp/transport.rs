//! Transport preference and fallback

use super::error::{McpError, McpResult};
use super::session::{SessionConnector, SharedSession, TransportKind};
use crate::config::Settings;
use crate::logging::Logger;
use crate::types::{ServerDescriptor, ServerTransport};

/// Chooses and attempts transports for a server
///
/// Stateless: the plan depends only on the descriptor and settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportNegotiator;

impl TransportNegotiator {
    /// Transports to try, in order
    ///
    /// SSE-class servers try streamable HTTP first and fall back to SSE once.
    pub fn plan(descriptor: &ServerDescriptor, settings: &Settings) -> McpResult<Vec<TransportKind>> {
        match descriptor.transport() {
            ServerTransport::Stdio(_) if settings.stdio_disabled => {
                Err(McpError::UnsupportedTransport("Stdio".to_string()))
            }
            ServerTransport::Stdio(_) => Ok(vec![TransportKind::Stdio]),
            ServerTransport::Sse(_) | ServerTransport::StreamableHttp(_) => {
                Ok(vec![TransportKind::StreamableHttp, TransportKind::Sse])
            }
            ServerTransport::SimpleHttp(_) => Ok(vec![TransportKind::SimpleHttp]),
        }
    }

    /// Try each planned transport until one connects
    ///
    /// Returns the last failure when every attempt fails.
    pub async fn negotiate(
        connector: &dyn SessionConnector,
        descriptor: &ServerDescriptor,
        settings: &Settings,
        logger: &dyn Logger,
    ) -> McpResult<(TransportKind, SharedSession)> {
        let plan = Self::plan(descriptor, settings)?;
        let mut previous: Option<TransportKind> = None;
        let mut last_error = None;

        for kind in plan {
            if let Some(failed) = previous {
                log_info!(
                    logger,
                    "{} connection failed, falling back to {} transport",
                    failed,
                    kind
                );
            }

            match connector.connect(kind, descriptor, settings).await {
                Ok(session) => return Ok((kind, session)),
                Err(err) => {
                    log_debug!(logger, "{} attempt failed: {}", kind, err);
                    previous = Some(kind);
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            McpError::UnsupportedTransport(descriptor.protocol().to_string())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLevel, MemoryLogger};
    use crate::mcp::mock::{MockConnector, MockServerBehavior};

    fn sse() -> ServerDescriptor {
        ServerDescriptor::sse("docs", "https://docs.example.com/sse").unwrap()
    }

    #[test]
    fn test_plan_per_protocol() {
        let settings = Settings::default();

        assert_eq!(
            TransportNegotiator::plan(&sse(), &settings).unwrap(),
            vec![TransportKind::StreamableHttp, TransportKind::Sse]
        );

        let stdio = ServerDescriptor::stdio("fs", "npx", ["server-fs"]).unwrap();
        assert_eq!(
            TransportNegotiator::plan(&stdio, &settings).unwrap(),
            vec![TransportKind::Stdio]
        );

        let disabled = settings.with_stdio_disabled(true);
        assert!(matches!(
            TransportNegotiator::plan(&stdio, &disabled),
            Err(McpError::UnsupportedTransport(_))
        ));
    }

    #[tokio::test]
    async fn test_falls_back_to_sse_once() {
        let connector = MockConnector::new().with_server(
            "docs",
            MockServerBehavior::default().failing(TransportKind::StreamableHttp),
        );
        let logger = MemoryLogger::new();

        let (kind, _session) =
            TransportNegotiator::negotiate(&connector, &sse(), &Settings::default(), &logger)
                .await
                .unwrap();

        assert_eq!(kind, TransportKind::Sse);
        assert_eq!(
            connector.attempts("docs"),
            vec![TransportKind::StreamableHttp, TransportKind::Sse]
        );
        assert!(logger.contains(LogLevel::Info, "falling back to sse"));
    }

    #[tokio::test]
    async fn test_reports_fallback_failure() {
        let connector = MockConnector::new().with_server(
            "docs",
            MockServerBehavior::default()
                .failing(TransportKind::StreamableHttp)
                .failing(TransportKind::Sse),
        );

        let err = TransportNegotiator::negotiate(
            &connector,
            &sse(),
            &Settings::default(),
            &MemoryLogger::new(),
        )
        .await
        .err()
        .unwrap();

        assert_eq!(
            err,
            McpError::transport_connect("sse", "mock sse transport refused")
        );
    }

    #[tokio::test]
    async fn test_stdio_disabled_attempts_nothing() {
        let connector = MockConnector::new();
        let stdio = ServerDescriptor::stdio("fs", "npx", ["server-fs"]).unwrap();
        let settings = Settings::default().with_stdio_disabled(true);

        let result =
            TransportNegotiator::negotiate(&connector, &stdio, &settings, &MemoryLogger::new()).await;

        assert!(matches!(result, Err(McpError::UnsupportedTransport(_))));
        assert!(connector.attempts("fs").is_empty());
    }
}
