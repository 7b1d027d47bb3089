use std::collections::{BTreeMap, HashMap};

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};

use crate::{api::state::AppState, domain::ResponseInfo};

pub const CLIENT_IP_HEADER: &str = "cf-connecting-ip";

/// Query parameters first, then body fields the query did not carry. The
/// body may be JSON or form-encoded.
fn ccbill_payload(query: HashMap<String, String>, body: &[u8]) -> ResponseInfo {
    let mut payload: ResponseInfo = query
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();

    let body_fields: ResponseInfo = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map,
        _ => serde_urlencoded::from_bytes::<BTreeMap<String, String>>(body)
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect(),
    };
    for (key, value) in body_fields {
        payload.entry(key).or_insert(value);
    }
    payload
}

pub async fn ccbill_callhook(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Json<Value> {
    let payload = ccbill_payload(query, &body);
    let event_type = payload
        .get("eventType")
        .and_then(Value::as_str)
        .map(str::to_string);

    let ok = state
        .service_context
        .reconciler
        .handle_ccbill(event_type.as_deref(), payload)
        .await;

    Json(json!({ "ok": ok }))
}

pub async fn moonlight_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let client_ip = headers.get(CLIENT_IP_HEADER).and_then(|v| v.to_str().ok());
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    let success = state
        .service_context
        .reconciler
        .handle_moonlight(client_ip, &body)
        .await;

    Json(json!({ "success": success }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_wins_over_body() {
        let query = HashMap::from([("eventType".to_string(), "NewSaleSuccess".to_string())]);
        let body = br#"{"eventType":"Other","subscriptionId":"0115","X-transactionId":"abc"}"#;

        let payload = ccbill_payload(query, body);
        assert_eq!(payload["eventType"], "NewSaleSuccess");
        assert_eq!(payload["subscriptionId"], "0115");
    }

    #[test]
    fn accepts_form_bodies() {
        let payload = ccbill_payload(HashMap::new(), b"subscriptionId=0115&transactionId=77");
        assert_eq!(payload["transactionId"], "77");

        assert!(ccbill_payload(HashMap::new(), b"").is_empty());
    }
}
