//! Raw report exchange on the active device.
//!
//! One transaction writes a request as output report `0x00` and waits for the
//! next input report. The first byte of the input report is dropped; probes
//! echo the command there. No command framing happens here.
//!
//! Input reports that arrive while no transaction is waiting belong to nobody.
//! They are discarded before the next request goes out, so a reply that
//! missed its deadline never answers a later request.

use tokio::time::timeout;
use tracing::{debug, trace};

use super::manager::ProbeSession;
use crate::device::{HidDevice, OUTPUT_REPORT_ID};
use crate::error::{Result, SessionError};
use crate::provider::DeviceAccessProvider;

impl<P: DeviceAccessProvider> ProbeSession<P> {
    /// Sends `request` to the active device and returns its response.
    ///
    /// Transactions are serialized so a response is never handed to the
    /// wrong caller.
    ///
    /// # Errors
    /// * [`SessionError::CapabilityUnavailable`] if HID access is missing.
    /// * [`SessionError::NoActiveDevice`] if no device is active or the
    ///   session was closed.
    /// * [`SessionError::RequestTooLarge`] if `request` exceeds the report
    ///   size.
    /// * [`SessionError::ResponseTimeout`] if the device stays silent.
    /// * [`SessionError::Provider`] for I/O failures.
    pub async fn transact(&self, request: &[u8]) -> Result<Vec<u8>> {
        if !self.is_available() {
            return Err(SessionError::CapabilityUnavailable);
        }

        let device = self.active().await.ok_or(SessionError::NoActiveDevice)?;

        if request.len() > self.options.report_size {
            return Err(SessionError::RequestTooLarge {
                size: request.len(),
                max: self.options.report_size,
            });
        }

        let _exchange = self.exchange_lock.lock().await;

        let stale = device.discard_pending().await?;
        if stale > 0 {
            debug!(session_id = %self.id(), device = %device.id(), stale, "Discarded unclaimed input reports");
        }

        device.send_report(OUTPUT_REPORT_ID, request).await?;
        trace!(session_id = %self.id(), device = %device.id(), len = request.len(), "Request sent");

        let wait = self.options.response_timeout;
        let report = timeout(wait, device.receive_report())
            .await
            .map_err(|_| SessionError::ResponseTimeout(wait))??;

        trace!(session_id = %self.id(), device = %device.id(), len = report.len(), "Response received");

        Ok(report.get(1..).map(<[u8]>::to_vec).unwrap_or_default())
    }

    /// Size of one output report for this session.
    pub fn report_size(&self) -> usize {
        self.options.report_size
    }
}
