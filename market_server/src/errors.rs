use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use market_engine::traits::OrderFlowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Invalid input. {0}")]
    ValidationError(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Insufficient permissions. {0}")]
    InsufficientPermissions(String),
    #[error("Conflict. {0}")]
    Conflict(String),
    #[error("Webhook signature invalid or not provided")]
    InvalidSignature,
    #[error("Auth token invalid or not provided. {0}")]
    AuthenticationError(String),
    #[error("Payment gateway is unavailable. {0}")]
    GatewayUnavailable(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidSignature => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<OrderFlowError> for ServerError {
    fn from(e: OrderFlowError) -> Self {
        match &e {
            OrderFlowError::Validation(_) | OrderFlowError::InvalidRating(_) => Self::ValidationError(e.to_string()),
            OrderFlowError::OrderNotFound(_) | OrderFlowError::ItemNotFound(_) => Self::NoRecordFound(e.to_string()),
            OrderFlowError::Unauthorized(_) => Self::InsufficientPermissions(e.to_string()),
            OrderFlowError::ItemUnavailable(_) |
            OrderFlowError::IllegalTransition { .. } |
            OrderFlowError::RatingAlreadySet(_) |
            OrderFlowError::OrderAlreadyExists(_) |
            OrderFlowError::CheckoutSessionImmutable(_) => Self::Conflict(e.to_string()),
            OrderFlowError::Gateway(g) => Self::GatewayUnavailable(g.to_string()),
            OrderFlowError::PaymentReferenceMissing(oid) => {
                // Invariant violation. The client gets a 500; the details go to the logs.
                error!("🚨️ Invariant violated: order {oid} has no payment reference but a refund was requested");
                Self::BackendError(e.to_string())
            },
            OrderFlowError::DatabaseError(_) |
            OrderFlowError::CheckoutSessionMissing(_) |
            OrderFlowError::ProfileStore(_) => Self::BackendError(e.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use actix_web::{error::ResponseError, http::StatusCode};
    use market_engine::{
        db_types::{OrderId, OrderState},
        traits::{GatewayError, OrderFlowError},
    };

    use super::ServerError;

    fn status_for(e: OrderFlowError) -> StatusCode {
        ServerError::from(e).status_code()
    }

    #[test]
    fn order_flow_errors_map_to_the_documented_status_codes() {
        let oid = OrderId::from("ord-1".to_string());
        assert_eq!(status_for(OrderFlowError::Validation("bad".into())), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for(OrderFlowError::OrderNotFound(oid.clone())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(OrderFlowError::Unauthorized("nope".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_for(OrderFlowError::ItemUnavailable("item-1".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_for(OrderFlowError::IllegalTransition { from: OrderState::Completed, to: OrderState::Cancelled }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_for(OrderFlowError::Gateway(GatewayError::Transient("down".into()))), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(OrderFlowError::PaymentReferenceMissing(oid)), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ServerError::InvalidSignature.status_code(), StatusCode::BAD_REQUEST);
    }
}
