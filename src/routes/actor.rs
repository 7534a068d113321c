use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;

/// Stand-in for the out-of-scope HTTP auth collaborator: the caller's user id,
/// taken from `X-User-Id`. A real deployment fronts these routes with the same
/// bearer-token validation the socket endpoint uses; that wiring lives outside
/// the delivery core (see spec §1's out-of-scope list).
pub struct ActorId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ActorId
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .map(|s| ActorId(s.to_string()))
            .ok_or((StatusCode::UNAUTHORIZED, "missing X-User-Id header"))
    }
}
