use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use platform::{
    domain::repositories::{
        organizations::OrganizationRepository, usage_metering::UsageMeteringRepository,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{organizations::OrganizationPostgres, usage_metering::UsageMeteringPostgres},
    },
    payments::stripe_client::StripeClient,
};
use tracing::{info, warn};

use crate::usecases::{
    billing::{BillingIntegration, BillingUseCase, StripeGateway},
    usage_reporting::{StripeUsageReporter, UsageReporter},
};

const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

pub fn routes(db_pool: Arc<PgPoolSquad>, stripe: Option<Arc<StripeClient>>) -> Router {
    let organization_repository = OrganizationPostgres::new(Arc::clone(&db_pool));
    let usage_metering_repository = UsageMeteringPostgres::new(Arc::clone(&db_pool));

    let integration = stripe.map(|stripe| BillingIntegration {
        usage_reporter: Arc::new(StripeUsageReporter::new(Arc::clone(&stripe))),
        stripe,
    });

    let billing_usecase = BillingUseCase::new(
        Arc::new(organization_repository),
        Arc::new(usage_metering_repository),
        integration,
    );

    router(Arc::new(billing_usecase))
}

pub fn router<O, M, G, R>(billing_usecase: Arc<BillingUseCase<O, M, G, R>>) -> Router
where
    O: OrganizationRepository + Send + Sync + 'static,
    M: UsageMeteringRepository + Send + Sync + 'static,
    G: StripeGateway + 'static,
    R: UsageReporter + 'static,
{
    Router::new()
        .route("/stripe-webhook", post(stripe_webhook::<O, M, G, R>))
        .with_state(billing_usecase)
}

pub async fn stripe_webhook<O, M, G, R>(
    State(billing_usecase): State<Arc<BillingUseCase<O, M, G, R>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    O: OrganizationRepository + Send + Sync + 'static,
    M: UsageMeteringRepository + Send + Sync + 'static,
    G: StripeGateway + 'static,
    R: UsageReporter + 'static,
{
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match billing_usecase.handle_stripe_webhook(&body, signature).await {
        Ok(()) => {
            info!("billing_webhook: event processed");
            (StatusCode::OK, axum::Json(serde_json::json!({ "received": true }))).into_response()
        }
        Err(err) => {
            warn!(
                status = err.status_code().as_u16(),
                error = %err,
                "billing_webhook: event rejected"
            );
            err.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::{billing::MockStripeGateway, usage_reporting::MockUsageReporter};
    use axum::{body::Body, http::Request};
    use platform::domain::repositories::{
        organizations::MockOrganizationRepository, usage_metering::MockUsageMeteringRepository,
    };
    use tower::ServiceExt;

    fn app(stripe: MockStripeGateway) -> Router {
        let billing_usecase = BillingUseCase::new(
            Arc::new(MockOrganizationRepository::new()),
            Arc::new(MockUsageMeteringRepository::new()),
            Some(BillingIntegration {
                stripe: Arc::new(stripe),
                usage_reporter: Arc::new(MockUsageReporter::new()),
            }),
        );
        router(Arc::new(billing_usecase))
    }

    #[tokio::test]
    async fn unconfigured_stripe_is_a_server_error_even_without_signature() {
        let billing_usecase: BillingUseCase<
            MockOrganizationRepository,
            MockUsageMeteringRepository,
            MockStripeGateway,
            MockUsageReporter,
        > = BillingUseCase::new(
            Arc::new(MockOrganizationRepository::new()),
            Arc::new(MockUsageMeteringRepository::new()),
            None,
        );

        let response = router(Arc::new(billing_usecase))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/stripe-webhook")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn rejects_delivery_without_signature_header() {
        let mut stripe = MockStripeGateway::new();
        stripe.expect_verify_webhook_signature().times(0);

        let response = app(stripe)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/stripe-webhook")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_forged_signature() {
        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_verify_webhook_signature()
            .withf(|payload, signature| payload == b"{}" && signature == "t=1,v1=forged")
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("no matching v1 signature")));

        let response = app(stripe)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/stripe-webhook")
                    .header("Stripe-Signature", "t=1,v1=forged")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
