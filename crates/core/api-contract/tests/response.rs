use api_contract::ApiResponse;

#[test]
fn api_response_success() {
    let response = ApiResponse::success("ok");
    assert!(response.success);
    assert!(response.data.is_some());
    assert!(response.error.is_none());
}

#[test]
fn api_response_error() {
    let response = ApiResponse::<()>::error("AUTH.UNAUTHORIZED", "unauthorized");
    assert!(!response.success);
    assert!(response.data.is_none());
    assert!(response.error.is_some());
}

#[test]
fn api_response_error_serializes_code_and_message() {
    let response = ApiResponse::<()>::error("INGEST.DENIED", "ingest denied");
    let value = serde_json::to_value(response).expect("serialize");
    assert_eq!(value["success"], false);
    assert_eq!(value["error"]["code"], "INGEST.DENIED");
    assert!(value["data"].is_null());
}
