//! Wire-contract tests for the intake API request/response shapes.

use serde_json::json;

// ============================================================================
// /build request body
// ============================================================================

#[test]
fn test_build_body_parses_as_request_spec() {
    let body = json!({
        "version": "0.0.1",
        "creator": "contract-tests",
        "start_date": "2024-01-01T00:00:00Z",
        "end_date": "2024-01-02T00:00:00Z",
        "time_step": 3600,
        "filename": "forcing",
        "format": "owi-ascii",
        "backfill": true,
        "nowcast": false,
        "multiple_forecasts": false,
        "domains": [{
            "name": "gulf",
            "service": "gfs-ncep",
            "level": 0,
            "x_init": -100.0, "y_init": 20.0,
            "x_end": -80.0, "y_end": 30.0,
            "di": 0.25, "dj": 0.25
        }]
    });

    let spec = metget_common::RequestSpec::parse(&body).unwrap();
    assert!(spec.backfill);
    assert!(!spec.multiple_forecasts);
    assert_eq!(spec.domains.len(), 1);
}

#[test]
fn test_build_body_missing_domains_is_rejected() {
    let body = json!({
        "version": "0.0.1",
        "creator": "contract-tests",
        "start_date": "2024-01-01T00:00:00Z",
        "end_date": "2024-01-02T00:00:00Z",
        "time_step": 3600,
        "filename": "forcing",
        "format": "owi-ascii"
    });
    assert!(metget_common::RequestSpec::parse(&body).is_err());
}

// ============================================================================
// Response envelopes
// ============================================================================

#[test]
fn test_build_response_shape() {
    let response = json!({
        "statusCode": 200,
        "body": {
            "request_id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "request_url": "https://bucket.s3.amazonaws.com/7c9e6679/filelist.json?...",
            "credit_usage": 83025
        }
    });
    assert_eq!(response["statusCode"], 200);
    assert!(response["body"]["request_id"].is_string());
    assert!(response["body"]["credit_usage"].is_number());
}

#[test]
fn test_error_response_shape() {
    let response = json!({
        "statusCode": 401,
        "body": { "message": "ERROR: Unauthorized" }
    });
    assert_eq!(response["statusCode"], 401);
    assert!(response["body"]["message"]
        .as_str()
        .unwrap()
        .starts_with("ERROR:"));
}

#[test]
fn test_check_response_shape() {
    let response = json!({
        "statusCode": 200,
        "body": {
            "request_id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "status": "completed",
            "try_count": 1,
            "start_date": "2024-01-01T00:00:00+00:00",
            "last_date": "2024-01-01T00:05:42+00:00",
            "credit_usage": 83025,
            "message": { "message": "Build complete" },
            "destination": "https://bucket.s3.amazonaws.com/7c9e6679/filelist.json?..."
        }
    });
    assert_eq!(response["body"]["status"], "completed");
    assert!(response["body"]["destination"].is_string());
}

// ============================================================================
// Queue envelope
// ============================================================================

#[test]
fn test_envelope_round_trip_preserves_spec() {
    let spec_json = json!({
        "version": "0.0.1",
        "request_id": "abc",
        "api_key": "k",
        "source_ip": "10.0.0.1",
        "domains": []
    });
    let envelope = storage::RequestEnvelope {
        request_id: "abc".to_string(),
        spec_json: spec_json.clone(),
        api_key: "k".to_string(),
        submitted_at: chrono::Utc::now(),
    };
    let wire = serde_json::to_string(&envelope).unwrap();
    let parsed: storage::RequestEnvelope = serde_json::from_str(&wire).unwrap();
    assert_eq!(parsed.spec_json, spec_json);
    assert_eq!(parsed.request_id, "abc");
}
