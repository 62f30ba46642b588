//! HTTP side of chunked uploads.
//!
//! Maps each phase call onto the file's `startupload`, `continueupload`,
//! `finishupload` and `cancelupload` endpoints.

use spdrive_transfer::{PhaseAction, PhaseCall, PhaseFuture, PhaseTransport};

use crate::ClientError;
use crate::client::{REQUEST_DIGEST, ensure_success};
use crate::odata::string_literal;
use crate::types::OffsetValue;

const CONTEXT: &str = "Chunked upload failed";

/// Phase transport bound to one authenticated client and form digest.
pub(crate) struct HttpPhaseTransport<'c> {
    pub(crate) http: &'c reqwest::Client,
    pub(crate) site_url: &'c str,
    pub(crate) base_url: &'c str,
    pub(crate) token: &'c str,
    pub(crate) digest: String,
    pub(crate) debug: bool,
}

impl HttpPhaseTransport<'_> {
    fn url(&self, call: &PhaseCall<'_>) -> String {
        format!(
            "{}/_api/web/GetFileByServerRelativeUrl('{}')/{}",
            self.site_url.trim_end_matches('/'),
            string_literal(&format!("{}{}", self.base_url, call.path)),
            phase_endpoint(call)
        )
    }
}

/// Method segment for `call`, e.g. `continueupload(uploadId=guid'..',fileoffset=4)`.
pub(crate) fn phase_endpoint(call: &PhaseCall<'_>) -> String {
    let id = call.session_id;
    match call.action {
        PhaseAction::Start => format!("startupload(uploadId=guid'{id}')"),
        PhaseAction::Continue => {
            format!("continueupload(uploadId=guid'{id}',fileoffset={})", call.offset)
        }
        PhaseAction::Finish => {
            format!("finishupload(uploadId=guid'{id}',fileoffset={})", call.offset)
        }
        PhaseAction::Cancel => format!("cancelupload(uploadId=guid'{id}')"),
    }
}

/// Reads the acknowledged offset from a START / CONTINUE response.
///
/// An empty body or a missing `value` is an error: the next call's
/// `fileoffset` depends on it.
fn parse_offset(body: &[u8]) -> Result<u64, ClientError> {
    let missing = || ClientError::Upload("server returned no upload offset".into());
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(missing());
    }
    let parsed: OffsetValue = serde_json::from_slice(body)?;
    let value = parsed.value.ok_or_else(missing)?;
    value.as_u64().ok_or_else(|| {
        ClientError::Upload(format!("server returned an invalid upload offset: {value:?}"))
    })
}

impl PhaseTransport for HttpPhaseTransport<'_> {
    type Error = ClientError;

    fn request<'a>(&'a self, call: PhaseCall<'a>) -> PhaseFuture<'a, ClientError> {
        Box::pin(async move {
            let url = self.url(&call);
            let resp = self
                .http
                .post(&url)
                .bearer_auth(self.token)
                .header(REQUEST_DIGEST, &self.digest)
                .body(call.payload.unwrap_or_default())
                .send()
                .await?;
            let resp = ensure_success(resp, CONTEXT, self.debug).await?;

            match call.action {
                PhaseAction::Start | PhaseAction::Continue => {
                    parse_offset(&resp.bytes().await?).map(Some)
                }
                PhaseAction::Finish | PhaseAction::Cancel => Ok(None),
            }
        })
    }
}
