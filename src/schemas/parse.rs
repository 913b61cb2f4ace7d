use serde::Deserialize;
use validator::Validate;

use crate::services::parsing::{ParseMode, ParseRequest};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ParseRequestBody {
    pub(crate) queue_id: Option<String>,
    pub(crate) pdf_text: Option<String>,
    #[serde(default)]
    pub(crate) filename: String,
    pub(crate) extracted_type3: Option<String>,
    #[serde(default)]
    pub(crate) mode: ParseMode,
    #[serde(default)]
    pub(crate) reanalyze: bool,
    #[validate(range(min = 1, max = 200, message = "chunkSize must be between 1 and 200"))]
    pub(crate) chunk_size: Option<u32>,
}

impl ParseRequestBody {
    /// Fails with the message for the first missing required field.
    pub(crate) fn into_request(self) -> Result<ParseRequest, &'static str> {
        let queue_id = self
            .queue_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or("queueId is required")?;
        let pdf_text = self
            .pdf_text
            .filter(|value| !value.trim().is_empty())
            .ok_or("pdfText is required")?;

        Ok(ParseRequest {
            queue_id,
            pdf_text,
            filename: self.filename.trim().to_string(),
            extracted_type3: self.extracted_type3,
            mode: self.mode,
            reanalyze: self.reanalyze,
            chunk_size: self.chunk_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn camel_case_body_maps_to_request() {
        let body: ParseRequestBody = serde_json::from_value(json!({
            "queueId": "q-1",
            "pdfText": "1. text",
            "filename": "a.pdf",
            "extractedType3": "도표",
            "mode": "additional",
            "chunkSize": 20
        }))
        .expect("body");
        assert!(body.validate().is_ok());
        let request = body.into_request().expect("request");
        assert_eq!(request.queue_id, "q-1");
        assert_eq!(request.mode, ParseMode::Additional);
        assert_eq!(request.chunk_size, Some(20));
        assert!(!request.reanalyze);
    }

    #[test]
    fn missing_fields_are_reported() {
        let body: ParseRequestBody =
            serde_json::from_value(json!({"pdfText": "x"})).expect("body");
        assert_eq!(body.into_request().unwrap_err(), "queueId is required");

        let body: ParseRequestBody =
            serde_json::from_value(json!({"queueId": "q", "pdfText": "  "})).expect("body");
        assert_eq!(body.into_request().unwrap_err(), "pdfText is required");
    }

    #[test]
    fn zero_chunk_size_fails_validation() {
        let body: ParseRequestBody =
            serde_json::from_value(json!({"queueId": "q", "pdfText": "x", "chunkSize": 0}))
                .expect("body");
        assert!(body.validate().is_err());
    }
}
