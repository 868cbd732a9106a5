use crate::err::SaverError;
use serde_json::Value;
use std::time::Duration;

/// Client for the bridge's CLIP v2 motion resource. Built once at
/// startup with the bridge CA certificate pinned.
pub struct HueGateway {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HueGateway {
    pub fn new(
        host: &str,
        sensor_id: &str,
        api_key: &str,
        cert_path: &str,
    ) -> Result<Self, SaverError> {
        let cert = reqwest::Certificate::from_pem(&std::fs::read(cert_path)?)?;
        let client = reqwest::Client::builder()
            .add_root_certificate(cert)
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            url: format!("https://{host}/clip/v2/resource/motion/{sensor_id}"),
            api_key: api_key.to_string(),
        })
    }

    async fn request(&self) -> Result<bool, SaverError> {
        let body: Value = self
            .client
            .get(&self.url)
            .header("hue-application-key", &self.api_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        extract_motion(&body)
    }

    /// One poll. Transport, TLS and payload failures all count as
    /// motion so a flaky bridge never blanks the screen; the next
    /// scheduled poll is the retry.
    pub async fn fetch_motion(&self) -> bool {
        motion_or_failsafe(self.request().await)
    }
}

fn motion_or_failsafe(result: Result<bool, SaverError>) -> bool {
    match result {
        Ok(motion) => motion,
        Err(e) => {
            tracing::error!("error fetching motion state: {}", e);
            true
        }
    }
}

fn extract_motion(body: &Value) -> Result<bool, SaverError> {
    body["data"][0]["motion"]["motion_report"]["motion"]
        .as_bool()
        .ok_or_else(|| SaverError::Payload(body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clip_body(motion: bool) -> Value {
        json!({
            "errors": [],
            "data": [{
                "id": "0f13a0ad-6ca5-4bb0-a19b-de1d35d1cb10",
                "type": "motion",
                "motion": {
                    "motion": motion,
                    "motion_valid": true,
                    "motion_report": {
                        "changed": "2024-01-06T22:58:00.000Z",
                        "motion": motion,
                    }
                }
            }]
        })
    }

    #[test]
    fn extracts_motion_flag() {
        assert!(extract_motion(&clip_body(true)).unwrap());
        assert!(!extract_motion(&clip_body(false)).unwrap());
    }

    #[test]
    fn failures_count_as_motion() {
        let payload = SaverError::Payload("{}".to_string());
        assert!(motion_or_failsafe(Err(payload)));

        let transport = SaverError::Io(std::io::ErrorKind::TimedOut.into());
        assert!(motion_or_failsafe(Err(transport)));

        // successful polls pass through untouched
        assert!(!motion_or_failsafe(Ok(false)));
        assert!(motion_or_failsafe(Ok(true)));
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(extract_motion(&json!({"data": []})).is_err());
        assert!(extract_motion(&json!({})).is_err());
        assert!(extract_motion(&json!({"data": [{"motion": {}}]})).is_err());
    }
}
