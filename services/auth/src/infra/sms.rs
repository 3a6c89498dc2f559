use anyhow::Context as _;
use serde::Deserialize;

use crm_domain::phone::Phone;

use crate::config::SmsSettings;
use crate::domain::repository::SmsSender;
use crate::domain::types::{SmsError, SmsReceipt};

/// Kavenegar verify-lookup client.
///
/// `GET {base}/{api_key}/verify/lookup.json?receptor=..&token=..&template=..`
#[derive(Clone)]
pub struct HttpSmsSender {
    client: reqwest::Client,
    settings: SmsSettings,
}

impl HttpSmsSender {
    pub fn new(settings: SmsSettings) -> Result<Self, SmsError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("build sms http client")
            .map_err(SmsError::Transport)?;
        Ok(Self { client, settings })
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(rename = "return")]
    status: LookupStatus,
    entries: Option<Vec<LookupEntry>>,
}

#[derive(Debug, Deserialize)]
struct LookupStatus {
    status: u16,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct LookupEntry {
    messageid: Option<serde_json::Value>,
}

fn receipt_from(response: LookupResponse) -> Result<SmsReceipt, SmsError> {
    if response.status.status != 200 {
        return Err(SmsError::Rejected(format!(
            "status {}: {}",
            response.status.status, response.status.message
        )));
    }
    let message_id = response
        .entries
        .unwrap_or_default()
        .into_iter()
        .find_map(|e| e.messageid)
        .map(|id| match id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });
    Ok(SmsReceipt { message_id })
}

impl SmsSender for HttpSmsSender {
    async fn send_otp_code(&self, phone: &Phone, code: &str) -> Result<SmsReceipt, SmsError> {
        let (Some(api_key), Some(template)) = (&self.settings.api_key, &self.settings.template)
        else {
            return Err(SmsError::NotConfigured);
        };

        let url = format!(
            "{}/{}/verify/lookup.json",
            self.settings.base_url.trim_end_matches('/'),
            api_key
        );
        let url = reqwest::Url::parse_with_params(
            &url,
            [
                ("receptor", phone.as_str()),
                ("token", code),
                ("template", template.as_str()),
            ],
        )
        .map_err(|e| SmsError::Transport(e.into()))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SmsError::Transport(e.into()))?;

        let http_status = response.status();
        // The vendor reports failures in the body as well, with a non-2xx status.
        let body: LookupResponse = response.json().await.map_err(|e| {
            if http_status.is_success() {
                SmsError::Transport(e.into())
            } else {
                SmsError::Rejected(format!("http {http_status}"))
            }
        })?;

        let receipt = receipt_from(body)?;
        tracing::info!(phone = %phone, message_id = ?receipt.message_id, "otp sms sent");
        Ok(receipt)
    }
}
