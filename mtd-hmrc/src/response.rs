//! Turns raw HMRC responses into domain results.
//!
//! Everything here is synchronous and works on a status code and body
//! text, so it can be tested without a server.

use mtd_core::MtdError;
use mtd_core::auth::{TokenEndpointError, TokenGrant};
use mtd_core::submission::{BusinessDetails, CalculationAck, CalculationStatus};
use serde::Deserialize;
use serde_json::Value;

// ── Regulator API ────────────────────────────────────────────────────────

/// Maps a non-success status to the error taxonomy.
///
/// `nino` stands in for the user id of a 401; the orchestrator rebinds it.
pub fn api_error(status: u16, body: &str, nino: &str) -> MtdError {
    if status == 401 {
        return MtdError::NotAuthorized {
            user_id: nino.to_string(),
        };
    }
    if status == 429 || status >= 500 {
        return MtdError::TransientTransport(format!("HTTP {status}: {}", snippet(body)));
    }

    let body = parse_body(body);
    let first_error = body.get("errors").and_then(|e| e.get(0));
    let code = body
        .get("code")
        .or_else(|| first_error.and_then(|e| e.get("code")))
        .and_then(Value::as_str)
        .map(str::to_string);
    let message = body
        .get("message")
        .or_else(|| first_error.and_then(|e| e.get("message")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| code.clone())
        .unwrap_or_else(|| format!("HTTP {status}"));

    MtdError::RegulatorRejection {
        status,
        code,
        message,
        body,
    }
}

/// A failure before any status arrived: timeout, refused connection,
/// reset. Always retryable.
pub fn transport_error(err: &reqwest::Error) -> MtdError {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    MtdError::TransientTransport(format!("{kind}: {err}"))
}

#[derive(Deserialize)]
struct BusinessList {
    #[serde(default, alias = "listOfBusinesses")]
    businesses: Vec<BusinessDetails>,
}

pub fn parse_businesses(body: &str) -> Result<Vec<BusinessDetails>, MtdError> {
    let list: BusinessList = serde_json::from_str(body).map_err(|e| malformed("business details", e))?;
    Ok(list.businesses)
}

/// The acknowledgment of a final-calculation trigger.
///
/// Only `202 Accepted` carrying a calculation id counts. Anything else is a
/// non-retryable rejection, since the declaration may already have landed.
/// Older API versions return `id` instead of `calculationId`.
pub fn calculation_ack(status: u16, body: &str) -> Result<CalculationAck, MtdError> {
    let parsed = parse_body(body);
    let id = parsed
        .get("calculationId")
        .or_else(|| parsed.get("id"))
        .and_then(Value::as_str);

    match (status, id) {
        (202, Some(id)) => Ok(CalculationAck {
            calculation_id: id.to_string(),
        }),
        (202, None) => Err(unexpected_ack(
            status,
            "calculation trigger response has no calculationId",
            parsed,
        )),
        _ => Err(unexpected_ack(
            status,
            &format!("calculation trigger returned HTTP {status}, expected 202"),
            parsed,
        )),
    }
}

fn unexpected_ack(status: u16, message: &str, body: Value) -> MtdError {
    MtdError::RegulatorRejection {
        status,
        code: Some("UNEXPECTED_RESPONSE".to_string()),
        message: message.to_string(),
        body,
    }
}

/// Reads a retrieved calculation. Error messages mean the calculation
/// failed; a calculation section or completion timestamp means it is done.
pub fn parse_calculation_status(body: &str) -> Result<CalculationStatus, MtdError> {
    let body: Value = serde_json::from_str(body).map_err(|e| malformed("calculation", e))?;

    let errors: Vec<String> = body
        .pointer("/messages/errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| e.get("text").or_else(|| e.get("message")))
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if !errors.is_empty() {
        return Ok(CalculationStatus::Failed { errors });
    }

    let finished = body.get("calculation").is_some()
        || body.pointer("/metadata/calculationTimestamp").is_some();
    Ok(if finished {
        CalculationStatus::Completed
    } else {
        CalculationStatus::Processing
    })
}

// ── OAuth ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct OAuthErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

pub fn token_error(status: u16, body: &str) -> TokenEndpointError {
    if status == 429 || status >= 500 {
        return TokenEndpointError::Transport(format!("HTTP {status}"));
    }
    let parsed: Option<OAuthErrorBody> = serde_json::from_str(body).ok();
    let (error, description) = parsed
        .map(|b| (b.error, b.error_description))
        .unwrap_or((None, None));
    match error {
        Some(error) if error == "invalid_grant" => TokenEndpointError::InvalidGrant,
        Some(error) => TokenEndpointError::Rejected { error, description },
        None => TokenEndpointError::Rejected {
            error: format!("HTTP {status}"),
            description,
        },
    }
}

pub fn parse_token_grant(body: &str) -> Result<TokenGrant, TokenEndpointError> {
    serde_json::from_str(body)
        .map_err(|e| TokenEndpointError::Transport(format!("malformed token response: {e}")))
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn parse_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| {
        if body.is_empty() {
            Value::Null
        } else {
            Value::String(body.to_string())
        }
    })
}

fn malformed(what: &str, err: serde_json::Error) -> MtdError {
    MtdError::TransientTransport(format!("malformed {what} response: {err}"))
}

fn snippet(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    // ── api_error ────────────────────────────────────────────────────────

    #[test]
    fn unauthorized_is_not_authorized() {
        let err = api_error(401, r#"{"code":"INVALID_CREDENTIALS"}"#, "AA123456A");

        assert!(matches!(err, MtdError::NotAuthorized { user_id } if user_id == "AA123456A"));
    }

    #[test]
    fn server_errors_and_throttling_are_transient() {
        assert!(api_error(503, "Service Unavailable", "n").is_retryable());
        assert!(api_error(500, "", "n").is_retryable());
        assert!(api_error(429, r#"{"code":"MESSAGE_THROTTLED_OUT"}"#, "n").is_retryable());
    }

    #[test]
    fn top_level_code_and_message_are_used() {
        let body = r#"{"code":"RULE_TAX_YEAR_NOT_ENDED","message":"Tax year has not ended"}"#;

        let err = api_error(400, body, "n");

        match err {
            MtdError::RegulatorRejection {
                status,
                code,
                message,
                body,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code.as_deref(), Some("RULE_TAX_YEAR_NOT_ENDED"));
                assert_eq!(message, "Tax year has not ended");
                assert_eq!(body["code"], "RULE_TAX_YEAR_NOT_ENDED");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn first_nested_error_fills_in_missing_fields() {
        let body = json!({
            "errors": [
                { "code": "FORMAT_NINO", "message": "The NINO format is invalid" },
                { "code": "FORMAT_TAX_YEAR", "message": "The tax year format is invalid" }
            ]
        })
        .to_string();

        let err = api_error(400, &body, "n");

        assert!(matches!(
            err,
            MtdError::RegulatorRejection { code: Some(code), message, .. }
                if code == "FORMAT_NINO" && message == "The NINO format is invalid"
        ));
    }

    #[test]
    fn code_stands_in_for_a_missing_message() {
        let err = api_error(403, r#"{"code":"CLIENT_OR_AGENT_NOT_AUTHORISED"}"#, "n");

        assert!(matches!(
            err,
            MtdError::RegulatorRejection { message, .. } if message == "CLIENT_OR_AGENT_NOT_AUTHORISED"
        ));
    }

    #[test]
    fn non_json_body_is_kept_as_text() {
        let err = api_error(404, "Not Found", "n");

        match err {
            MtdError::RegulatorRejection { message, body, .. } => {
                assert_eq!(message, "HTTP 404");
                assert_eq!(body, json!("Not Found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    // ── bodies ───────────────────────────────────────────────────────────

    #[test]
    fn businesses_parse_from_either_list_name() {
        let body = r#"{"listOfBusinesses":[{"businessId":"XPIS1","typeOfBusiness":"uk-property"}]}"#;
        let businesses = parse_businesses(body).unwrap();
        assert_eq!(businesses.len(), 1);
        assert!(businesses[0].is_uk_property());

        let body = r#"{"businesses":[{"businessId":"X2","businessType":"property","tradingName":"Flats"}]}"#;
        let businesses = parse_businesses(body).unwrap();
        assert_eq!(businesses[0].trading_name.as_deref(), Some("Flats"));
        assert!(businesses[0].is_uk_property());
    }

    #[test]
    fn ack_accepts_calculation_id_or_id() {
        assert_eq!(
            calculation_ack(202, r#"{"calculationId":"c-1"}"#).unwrap().calculation_id,
            "c-1"
        );
        assert_eq!(calculation_ack(202, r#"{"id":"c-2"}"#).unwrap().calculation_id, "c-2");
    }

    #[test]
    fn ack_requires_accepted_status() {
        let err = calculation_ack(200, r#"{"id":"c-2"}"#).unwrap_err();

        assert!(!err.is_retryable());
        assert!(matches!(
            err,
            MtdError::RegulatorRejection { status: 200, code: Some(ref code), .. }
                if code == "UNEXPECTED_RESPONSE"
        ));
    }

    #[test]
    fn empty_success_is_not_retried() {
        let no_content = calculation_ack(204, "").unwrap_err();
        let no_id = calculation_ack(202, "{}").unwrap_err();

        assert!(!no_content.is_retryable());
        assert!(!no_id.is_retryable());
        assert_eq!(
            no_id.to_string(),
            MtdError::RegulatorRejection {
                status: 202,
                code: Some("UNEXPECTED_RESPONSE".to_string()),
                message: "calculation trigger response has no calculationId".to_string(),
                body: json!({}),
            }
            .to_string()
        );
    }

    #[test]
    fn calculation_with_errors_failed() {
        let body = json!({
            "metadata": { "calculationId": "c-1" },
            "messages": { "errors": [ { "id": "C55001", "text": "Losses exceed income" } ] }
        })
        .to_string();

        assert_eq!(
            parse_calculation_status(&body).unwrap(),
            CalculationStatus::Failed {
                errors: vec!["Losses exceed income".to_string()]
            }
        );
    }

    #[test]
    fn calculation_with_timestamp_completed() {
        let body = r#"{"metadata":{"calculationId":"c-1","calculationTimestamp":"2025-05-01T10:00:00Z"}}"#;

        assert_eq!(parse_calculation_status(body).unwrap(), CalculationStatus::Completed);
    }

    #[test]
    fn calculation_without_result_is_processing() {
        let body = r#"{"metadata":{"calculationId":"c-1"}}"#;

        assert_eq!(parse_calculation_status(body).unwrap(), CalculationStatus::Processing);
    }

    // ── OAuth ────────────────────────────────────────────────────────────

    #[test]
    fn invalid_grant_is_recognised() {
        let body = r#"{"error":"invalid_grant","error_description":"refresh token is expired"}"#;

        assert_eq!(token_error(400, body), TokenEndpointError::InvalidGrant);
    }

    #[test]
    fn other_oauth_errors_are_rejections() {
        let body = r#"{"error":"invalid_client","error_description":"unknown client"}"#;

        assert_eq!(
            token_error(401, body),
            TokenEndpointError::Rejected {
                error: "invalid_client".to_string(),
                description: Some("unknown client".to_string()),
            }
        );
    }

    #[test]
    fn oauth_server_errors_are_transport() {
        assert!(matches!(token_error(502, ""), TokenEndpointError::Transport(_)));
    }

    #[test]
    fn token_grant_parses() {
        let grant = parse_token_grant(
            r#"{"access_token":"a","refresh_token":"r","expires_in":14400,"scope":"read:self-assessment","token_type":"bearer"}"#,
        )
        .unwrap();

        assert_eq!(grant.expires_in, 14400);
        assert_eq!(grant.refresh_token.as_deref(), Some("r"));
    }
}
