//! JSONP envelope parsing
//!
//! The legacy provider answers with
//! `try{<callback>({"site_uv":..,"page_pv":..,"site_pv":..});}catch(e){}`.
//! The wrapper is stripped as literal text and the interior is parsed as
//! strict JSON. The body comes from an untrusted third party, so it is never
//! interpreted as script.

use crate::error::LegacyError;

use super::LegacyCounts;

const SUFFIX: &str = ");}catch(e){}";

/// Callback wrapper for one callback name
#[derive(Debug, Clone)]
pub struct JsonpEnvelope {
    prefix: String,
}

impl JsonpEnvelope {
    /// Envelope for `callback`
    pub fn new(callback: &str) -> Self {
        Self {
            prefix: format!("try{{{}(", callback),
        }
    }

    /// Literal text preceding the payload
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Literal text following the payload
    pub fn suffix(&self) -> &'static str {
        SUFFIX
    }

    /// Strip the wrapper and parse the counts
    pub fn unwrap(&self, body: &str) -> Result<LegacyCounts, LegacyError> {
        let body = body.trim();
        let interior = body
            .strip_prefix(self.prefix.as_str())
            .ok_or_else(|| LegacyError::Envelope(format!("missing prefix in {}", preview(body))))?
            .strip_suffix(SUFFIX)
            .ok_or_else(|| LegacyError::Envelope(format!("missing suffix in {}", preview(body))))?;

        serde_json::from_str(interior).map_err(|e| LegacyError::Payload(e.to_string()))
    }

    /// Wrap a JSON document, as the provider and this service's own JSONP
    /// responses do
    pub fn wrap(&self, json: &str) -> String {
        format!("{}{}{}", self.prefix, json, SUFFIX)
    }
}

fn preview(body: &str) -> String {
    body.chars().take(64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALLBACK: &str = "BusuanziCallback_777487655111";

    #[test]
    fn test_envelope_lengths() {
        let envelope = JsonpEnvelope::new(CALLBACK);
        assert_eq!(envelope.prefix().len(), 34);
        assert_eq!(envelope.suffix().len(), 13);
    }

    #[test]
    fn test_unwrap_provider_body() {
        let envelope = JsonpEnvelope::new(CALLBACK);
        let body = "try{BusuanziCallback_777487655111({\"site_uv\":10,\"page_pv\":3,\"version\":2.4,\"site_pv\":20});}catch(e){}\n";
        let counts = envelope.unwrap(body).unwrap();
        assert_eq!(
            counts,
            LegacyCounts {
                site_uv: 10,
                site_pv: 20,
                page_pv: 3
            }
        );
    }

    #[test]
    fn test_missing_fields_default_to_zero() {
        let envelope = JsonpEnvelope::new(CALLBACK);
        let counts = envelope.unwrap(&envelope.wrap("{\"site_pv\":5}")).unwrap();
        assert_eq!(counts.site_pv, 5);
        assert_eq!(counts.site_uv, 0);
        assert_eq!(counts.page_pv, 0);
    }

    #[test]
    fn test_rejects_other_callback() {
        let envelope = JsonpEnvelope::new(CALLBACK);
        let body = JsonpEnvelope::new("evil").wrap("{\"site_uv\":1}");
        assert!(matches!(envelope.unwrap(&body), Err(LegacyError::Envelope(_))));
    }

    #[test]
    fn test_rejects_script_payload() {
        let envelope = JsonpEnvelope::new(CALLBACK);
        let body = envelope.wrap("{site_uv: __import__('os').system('id')}");
        assert!(matches!(envelope.unwrap(&body), Err(LegacyError::Payload(_))));

        let body = envelope.wrap("{\"site_uv\":\"10\"}");
        assert!(matches!(envelope.unwrap(&body), Err(LegacyError::Payload(_))));
    }

    #[test]
    fn test_rejects_truncated_body() {
        let envelope = JsonpEnvelope::new(CALLBACK);
        assert!(matches!(
            envelope.unwrap("try{BusuanziCallback_777487655111({\"site_uv\":1}"),
            Err(LegacyError::Envelope(_))
        ));
        assert!(envelope.unwrap("").is_err());
    }
}
