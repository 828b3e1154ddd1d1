//! Platform launch ("provide") URLs.
//!
//! A deployed activity is entered through a platform-hosted redirect
//! endpoint. The provider's external deploy URL is carried inside the
//! launch URL as an opaque payload: base64 (URL-safe, unpadded) over a
//! small JSON object. The ingress layer hands the payload back to
//! [`crate::activities::ActivityService::launch_student`] when a student
//! follows the link.

use crate::errors::{CoreError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// The payload embedded in a launch URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchPayload {
    /// The activity entry URL the provider returned at deploy time.
    #[serde(rename = "activityUrl")]
    pub activity_url: String,
}

/// Encode a provider's external deploy URL into an opaque payload.
pub fn encode_payload(activity_url: &str) -> String {
    let payload = LaunchPayload {
        activity_url: activity_url.to_string(),
    };

    // Serializing a two-field struct cannot fail
    let json = serde_json::to_string(&payload).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Decode a launch payload back into the activity entry URL.
pub fn decode_payload(data: &str) -> Result<LaunchPayload> {
    let bytes = URL_SAFE_NO_PAD
        .decode(data)
        .map_err(|e| CoreError::Validation(format!("launch payload is not valid base64: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| CoreError::Validation(format!("launch payload is not valid JSON: {}", e)))
}

/// Compose the platform launch URL for one deployed activity.
///
/// The platform base URL comes from the ingress layer (scheme + host);
/// a trailing slash is tolerated.
pub fn provide_url(platform_base_url: &str, activity_id: &str, external_deploy_url: &str) -> String {
    format!(
        "{}/activities/{}/provide?data={}",
        platform_base_url.trim_end_matches('/'),
        activity_id,
        encode_payload(external_deploy_url)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_round_trip() {
        let encoded = encode_payload("https://quiz.example.com/instances/a1");
        let decoded = decode_payload(&encoded).unwrap();
        assert_eq!(decoded.activity_url, "https://quiz.example.com/instances/a1");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_payload("!!!not-base64!!!").unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_decode_rejects_non_json_payload() {
        let data = URL_SAFE_NO_PAD.encode("just a string");
        let err = decode_payload(&data).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_provide_url_shape() {
        let url = provide_url("https://platform.example.com/", "act-1", "https://ap/inst/1");

        assert!(url.starts_with("https://platform.example.com/activities/act-1/provide?data="));
        // The payload survives the trip through the URL
        let data = url.split("data=").nth(1).unwrap();
        assert_eq!(
            decode_payload(data).unwrap().activity_url,
            "https://ap/inst/1"
        );
    }
}
