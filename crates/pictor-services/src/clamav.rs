use async_trait::async_trait;
use bytes::Bytes;
use clamav_client::Tcp;
use pictor_core::PipelineConfig;
use pictor_processing::{MalwareScanner, ScanVerdict};
use std::time::Instant;

/// Scans buffers with a ClamAV daemon over TCP (INSTREAM).
///
/// Reports exactly what clamd said. Transport and protocol errors become
/// [`ScanVerdict::Unavailable`]; the call site's failure policy decides what that
/// means for the upload, and the call site also bounds the wait.
#[derive(Debug, Clone)]
pub struct ClamAVScanner {
    host: String,
    port: u16,
}

impl ClamAVScanner {
    /// # Arguments
    /// * `host` - ClamAV daemon hostname
    /// * `port` - ClamAV daemon port (typically 3310)
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.clamav_host.clone(), config.clamav_port)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn reply_text(response: &[u8]) -> String {
    String::from_utf8_lossy(response)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

/// Signature name from a clamd reply such as `stream: Eicar-Test-Signature FOUND`.
pub fn parse_signature(response: &[u8]) -> Option<String> {
    let reply = reply_text(response);
    let body = reply.strip_suffix(" FOUND")?;
    let name = match body.rsplit_once(": ") {
        Some((_, name)) => name,
        None => body,
    };
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Map a raw clamd INSTREAM reply to a verdict.
///
/// Only `... OK` is clean and only `<name> FOUND` is an infection. Anything else,
/// including `... ERROR` replies such as `INSTREAM size limit exceeded. ERROR`, means
/// the daemon gave no answer about the content.
pub fn classify_reply(response: &[u8]) -> ScanVerdict {
    let reply = reply_text(response);
    if reply == "OK" || reply.ends_with(": OK") {
        return ScanVerdict::Clean;
    }
    match parse_signature(response) {
        Some(signature) => ScanVerdict::Infected(signature),
        None => ScanVerdict::Unavailable(format!("Unexpected ClamAV reply: {}", reply)),
    }
}

#[async_trait]
impl MalwareScanner for ClamAVScanner {
    /// Runs the sync client inside spawn_blocking to avoid !Send tokio futures.
    async fn scan(&self, data: Bytes) -> ScanVerdict {
        let start = Instant::now();
        let address = self.address();
        tracing::debug!(address = %address, bytes = data.len(), "Starting ClamAV scan");

        let result = tokio::task::spawn_blocking(move || {
            let connection = Tcp {
                host_address: address.as_str(),
            };
            clamav_client::scan_buffer(&data, connection, None)
                .map(|response| classify_reply(&response))
                .map_err(|e| format!("ClamAV scan error: {}", e))
        })
        .await;

        let verdict = match result {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(error_msg)) => ScanVerdict::Unavailable(error_msg),
            Err(e) => ScanVerdict::Unavailable(format!("ClamAV scan task join error: {}", e)),
        };

        match &verdict {
            ScanVerdict::Clean => tracing::debug!(
                duration_ms = start.elapsed().as_millis(),
                "ClamAV scan completed: clean"
            ),
            ScanVerdict::Infected(_) => tracing::debug!(
                duration_ms = start.elapsed().as_millis(),
                "ClamAV scan completed: infected"
            ),
            ScanVerdict::Unavailable(reason) => tracing::error!(
                duration_ms = start.elapsed().as_millis(),
                error = %reason,
                "ClamAV scan failed"
            ),
        }
        verdict
    }

    fn name(&self) -> &'static str {
        "clamav"
    }
}
