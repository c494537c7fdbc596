use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use platform::{
    analytics::posthog_client::PosthogClient,
    domain::repositories::{
        environments::EnvironmentRepository, organizations::OrganizationRepository,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{environments::EnvironmentPostgres, organizations::OrganizationPostgres},
    },
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::MaybeSession,
    usecases::{
        environment_layout::EnvironmentLayoutUseCase,
        identity_bridge::{AnalyticsCollector, IdentityBridge},
    },
};

pub const LOGIN_PATH: &str = "/auth/login";

pub fn routes(db_pool: Arc<PgPoolSquad>, posthog: Option<Arc<PosthogClient>>) -> Router {
    let organization_repository = OrganizationPostgres::new(Arc::clone(&db_pool));
    let environment_repository = EnvironmentPostgres::new(Arc::clone(&db_pool));
    let identity_bridge = IdentityBridge::new(posthog);

    let layout_usecase = EnvironmentLayoutUseCase::new(
        Arc::new(organization_repository),
        Arc::new(environment_repository),
        Arc::new(identity_bridge),
    );

    router(Arc::new(layout_usecase))
}

pub fn router<O, E, A>(layout_usecase: Arc<EnvironmentLayoutUseCase<O, E, A>>) -> Router
where
    O: OrganizationRepository + Send + Sync + 'static,
    E: EnvironmentRepository + Send + Sync + 'static,
    A: AnalyticsCollector + 'static,
{
    Router::new()
        .route("/:environment_id/layout", get(environment_layout::<O, E, A>))
        .with_state(layout_usecase)
}

pub async fn environment_layout<O, E, A>(
    State(layout_usecase): State<Arc<EnvironmentLayoutUseCase<O, E, A>>>,
    Path(environment_id): Path<Uuid>,
    MaybeSession(session): MaybeSession,
) -> Response
where
    O: OrganizationRepository + Send + Sync + 'static,
    E: EnvironmentRepository + Send + Sync + 'static,
    A: AnalyticsCollector + 'static,
{
    let Some(user) = session else {
        debug!(%environment_id, "layout: no session; redirecting to login");
        return Redirect::to(LOGIN_PATH).into_response();
    };

    match layout_usecase.load_layout(&user, environment_id).await {
        Ok(layout) => (StatusCode::OK, Json(layout)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::SESSION_COOKIE, usecases::identity_bridge::MockAnalyticsCollector};
    use axum::{
        body::Body,
        http::{Request, header},
    };
    use platform::domain::repositories::{
        environments::MockEnvironmentRepository, organizations::MockOrganizationRepository,
    };
    use tower::ServiceExt;

    fn app() -> Router {
        let mut environment_repo = MockEnvironmentRepository::new();
        environment_repo.expect_has_user_environment_access().times(0);

        let mut collector = MockAnalyticsCollector::new();
        collector.expect_identify().times(0);

        let layout_usecase = EnvironmentLayoutUseCase::new(
            Arc::new(MockOrganizationRepository::new()),
            Arc::new(environment_repo),
            Arc::new(IdentityBridge::new(Some(Arc::new(collector)))),
        );
        router(Arc::new(layout_usecase))
    }

    #[tokio::test]
    async fn redirects_to_login_without_session() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri(format!("/{}/layout", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            LOGIN_PATH
        );
    }

    #[tokio::test]
    async fn redirects_to_login_with_garbage_token() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri(format!("/{}/layout", Uuid::new_v4()))
                    .header(header::COOKIE, format!("{SESSION_COOKIE}=not-a-jwt"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }
}
