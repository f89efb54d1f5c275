//! Blocking-style requests over the async engine
//!
//! The probe tools issue one request, run the loop until the recorder
//! fires, and read the result back. The loop must be stopped when a sync
//! request starts; it is stopped again by the recorder before this returns.

use crate::engine::requests::Owner;
use crate::engine::{CompositeId, Engine, Target};
use crate::error::{Error, Result};
use crate::oid::Oid;
use crate::snmp::{PduType, SnmpCode, SnmpVersion, VarBind};
use tracing::debug;

/// Parameters of a one-shot sync request
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// Agent hostname or literal address
    pub hostname: String,
    /// Agent UDP port
    pub port: u16,
    /// Community string
    pub community: String,
    /// Protocol version
    pub version: SnmpVersion,
    /// Nominal poll interval, drives the retry spacing
    pub interval_ms: u64,
    /// Per-request timeout
    pub timeout_ms: u64,
    /// Get, GetNext or Set
    pub pdu_type: PduType,
    /// The object to query
    pub oid: Oid,
}

impl Engine {
    /// Issue one request and run the loop until its response lands
    ///
    /// Returns the completion code and, on success, the reply binding
    /// (OID and value). A refused enqueue reports as a local timeout.
    pub async fn sync_request(
        &mut self,
        request: &SyncRequest,
    ) -> Result<(SnmpCode, Option<VarBind>)> {
        if !self.stopped {
            return Err(Error::internal(
                "sync request issued while the event loop is running",
            ));
        }

        let target = Target {
            hostname: request.hostname.clone(),
            port: request.port,
            community: request.community.clone(),
            version: request.version,
            interval_ms: request.interval_ms,
            timeout_ms: request.timeout_ms,
            pdu_type: request.pdu_type,
        };

        self.sync_result = None;
        let Some(composite) = self.submit(&target, request.oid.clone(), Owner::Sync) else {
            return Ok((SnmpCode::Timeout, None));
        };
        debug!(request = %composite, hostname = %request.hostname, "sync request issued");

        let now = self.clock.now_ms();
        self.flush_all(now);
        self.run().await?;

        match self.sync_take() {
            Some((code, reply)) => Ok((code, reply)),
            // Loop stopped without a terminal callback
            None => Ok((SnmpCode::Timeout, None)),
        }
    }

    /// The sync recorder: remembers the completion and stops the loop
    pub(crate) fn on_sync_response(
        &mut self,
        composite: CompositeId,
        code: SnmpCode,
        reply: Option<&VarBind>,
    ) {
        debug!(request = %composite, code = %code, "sync response");
        self.sync_result = Some((code, reply.cloned()));
        self.stop();
    }

    /// Take the recorded sync completion, if any
    pub(crate) fn sync_take(&mut self) -> Option<(SnmpCode, Option<VarBind>)> {
        self.sync_result.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineOptions;
    use crate::persist::NullPersist;

    #[tokio::test]
    async fn test_sync_request_requires_stopped_loop() {
        let mut engine = Engine::new(
            EngineOptions::for_tests(),
            Vec::new(),
            Box::new(NullPersist),
        )
        .await
        .unwrap();
        engine.stopped = false;

        let request = SyncRequest {
            hostname: "127.0.0.1".to_string(),
            port: 16161,
            community: "public".to_string(),
            version: SnmpVersion::V2c,
            interval_ms: 1000,
            timeout_ms: 100,
            pdu_type: PduType::Get,
            oid: Oid::parse("1.3.6.1.2.1.1.3.0").unwrap(),
        };
        assert!(engine.sync_request(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_sync_request_times_out_against_silence() {
        let mut engine = Engine::new(
            EngineOptions::for_tests(),
            Vec::new(),
            Box::new(NullPersist),
        )
        .await
        .unwrap();

        // Nobody listens on this port; the retry budget runs out
        let request = SyncRequest {
            hostname: "127.0.0.1".to_string(),
            port: 16161,
            community: "public".to_string(),
            version: SnmpVersion::V2c,
            interval_ms: 1000,
            timeout_ms: 50,
            pdu_type: PduType::Get,
            oid: Oid::parse("1.3.6.1.2.1.1.3.0").unwrap(),
        };
        let (code, reply) = engine.sync_request(&request).await.unwrap();
        assert_eq!(code, SnmpCode::Timeout);
        assert!(reply.is_none());
        assert!(engine.stopped());

        engine.shutdown();
    }
}
