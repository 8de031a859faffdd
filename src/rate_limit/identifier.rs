use super::types::Identifier;
use axum::http::HeaderMap;

pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Derive the rate-limit key for a request.
///
/// Priority: authenticated principal, first `X-Forwarded-For` hop,
/// `X-Real-IP`, then the shared `unknown` bucket.
pub fn resolve(headers: &HeaderMap, principal_id: Option<&str>) -> Identifier {
    if let Some(id) = principal_id.map(str::trim).filter(|id| !id.is_empty()) {
        return Identifier::user(id);
    }

    if let Some(addr) = header_str(headers, FORWARDED_FOR_HEADER)
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
    {
        return Identifier::addr(addr);
    }

    if let Some(addr) = header_str(headers, REAL_IP_HEADER)
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
    {
        return Identifier::addr(addr);
    }

    Identifier::unknown()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
