//! `GET /accessories`

use crate::http::HttpResponse;
use hap_model::Bridge;

/// The whole accessory database, bridge first.
pub fn list(bridge: &Bridge) -> HttpResponse {
    HttpResponse::json(200, &bridge.to_hap())
}
