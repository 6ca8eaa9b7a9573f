/*!
 * # Request identity
 *
 * Identity is resolved upstream (gateway or session layer); requests arrive
 * with the already-authenticated user in plain headers. This module is only
 * the seam that pulls those headers into a typed value for handlers, it does
 * no credential verification of its own.
 *
 * Headers:
 * - `x-user-id`   required, UUID of the acting user
 * - `x-user-role` optional, one of `customer` / `seller` / `admin`
 *                 (defaults to `customer`)
 * - `x-seller-id` required when the role is `seller`, UUID of the shop
 */

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::errors::ServiceError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const SELLER_ID_HEADER: &str = "x-seller-id";

/// Role of the requester, as asserted by the upstream identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequesterRole {
    Customer,
    /// A seller acting on behalf of the given shop.
    Seller(Uuid),
    Admin,
}

impl RequesterRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    pub fn seller_id(&self) -> Option<Uuid> {
        match self {
            Self::Seller(id) => Some(*id),
            _ => None,
        }
    }
}

/// The acting user, extracted from request headers.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: RequesterRole,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_uuid(parts: &Parts, name: &str) -> Result<Option<Uuid>, ServiceError> {
    match header_str(parts, name) {
        None => Ok(None),
        Some(raw) => Uuid::parse_str(raw.trim())
            .map(Some)
            .map_err(|_| ServiceError::Unauthorized(format!("{} header is not a valid UUID", name))),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_uuid(parts, USER_ID_HEADER)?.ok_or_else(|| {
            ServiceError::Unauthorized(format!("missing {} header", USER_ID_HEADER))
        })?;

        let role = match header_str(parts, USER_ROLE_HEADER) {
            None => RequesterRole::Customer,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "customer" => RequesterRole::Customer,
                "admin" => RequesterRole::Admin,
                "seller" => {
                    let seller_id = header_uuid(parts, SELLER_ID_HEADER)?.ok_or_else(|| {
                        ServiceError::Unauthorized(format!(
                            "seller role requires the {} header",
                            SELLER_ID_HEADER
                        ))
                    })?;
                    RequesterRole::Seller(seller_id)
                }
                other => {
                    return Err(ServiceError::Unauthorized(format!(
                        "unknown role {:?} in {} header",
                        other, USER_ROLE_HEADER
                    )))
                }
            },
        };

        Ok(AuthenticatedUser { user_id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(req: Request<()>) -> Result<AuthenticatedUser, ServiceError> {
        let (mut parts, _) = req.into_parts();
        AuthenticatedUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn missing_user_id_is_unauthorized() {
        let req = Request::builder().body(()).unwrap();
        let err = extract(req).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn defaults_to_customer_role() {
        let user_id = Uuid::new_v4();
        let req = Request::builder()
            .header(USER_ID_HEADER, user_id.to_string())
            .body(())
            .unwrap();
        let user = extract(req).await.unwrap();
        assert_eq!(user.user_id, user_id);
        assert_eq!(user.role, RequesterRole::Customer);
    }

    #[tokio::test]
    async fn seller_role_requires_seller_id() {
        let req = Request::builder()
            .header(USER_ID_HEADER, Uuid::new_v4().to_string())
            .header(USER_ROLE_HEADER, "seller")
            .body(())
            .unwrap();
        let err = extract(req).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let seller_id = Uuid::new_v4();
        let req = Request::builder()
            .header(USER_ID_HEADER, Uuid::new_v4().to_string())
            .header(USER_ROLE_HEADER, "Seller")
            .header(SELLER_ID_HEADER, seller_id.to_string())
            .body(())
            .unwrap();
        let user = extract(req).await.unwrap();
        assert_eq!(user.role, RequesterRole::Seller(seller_id));
    }

    #[tokio::test]
    async fn unknown_role_is_rejected() {
        let req = Request::builder()
            .header(USER_ID_HEADER, Uuid::new_v4().to_string())
            .header(USER_ROLE_HEADER, "superuser")
            .body(())
            .unwrap();
        let err = extract(req).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }
}
