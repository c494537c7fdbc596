use std::sync::Arc;

use platform::domain::repositories::{
    environments::EnvironmentRepository, organizations::OrganizationRepository,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::identity_bridge::{
    AnalyticsCollector, IdentityBridge, IdentityContext, OrganizationSummary,
};
use crate::auth::SessionUser;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("you do not have access to this environment")]
    Forbidden,
    #[error("organization not found")]
    OrganizationNotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl LayoutError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            LayoutError::Forbidden => StatusCode::FORBIDDEN,
            // A dangling environment is broken data, not a missing page.
            LayoutError::OrganizationNotFound | LayoutError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutUserSummary {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Context handed to the page shell of an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentLayoutDto {
    pub environment_id: Uuid,
    pub user: LayoutUserSummary,
    pub organization: OrganizationSummary,
}

pub struct EnvironmentLayoutUseCase<O, E, A>
where
    O: OrganizationRepository + Send + Sync + 'static,
    E: EnvironmentRepository + Send + Sync + 'static,
    A: AnalyticsCollector + 'static,
{
    organization_repo: Arc<O>,
    environment_repo: Arc<E>,
    identity_bridge: Arc<IdentityBridge<A>>,
}

impl<O, E, A> EnvironmentLayoutUseCase<O, E, A>
where
    O: OrganizationRepository + Send + Sync + 'static,
    E: EnvironmentRepository + Send + Sync + 'static,
    A: AnalyticsCollector + 'static,
{
    pub fn new(
        organization_repo: Arc<O>,
        environment_repo: Arc<E>,
        identity_bridge: Arc<IdentityBridge<A>>,
    ) -> Self {
        Self {
            organization_repo,
            environment_repo,
            identity_bridge,
        }
    }

    pub async fn load_layout(
        &self,
        user: &SessionUser,
        environment_id: Uuid,
    ) -> Result<EnvironmentLayoutDto, LayoutError> {
        let has_access = self
            .environment_repo
            .has_user_environment_access(user.user_id, environment_id)
            .await
            .map_err(|err| {
                error!(
                    user_id = %user.user_id,
                    %environment_id,
                    db_error = ?err,
                    "layout: failed to check environment access"
                );
                LayoutError::Internal(err)
            })?;

        if !has_access {
            warn!(
                user_id = %user.user_id,
                %environment_id,
                "layout: environment access denied"
            );
            return Err(LayoutError::Forbidden);
        }

        let organization = self
            .organization_repo
            .find_by_environment_id(environment_id)
            .await
            .map_err(|err| {
                error!(
                    %environment_id,
                    db_error = ?err,
                    "layout: failed to load organization"
                );
                LayoutError::Internal(err)
            })?
            .ok_or_else(|| {
                error!(%environment_id, "layout: environment has no organization");
                LayoutError::OrganizationNotFound
            })?;

        let organization = OrganizationSummary::from(&organization);

        self.identity_bridge
            .sync(&IdentityContext {
                user: Some(user.clone()),
                environment_id: Some(environment_id),
                organization: Some(organization.clone()),
            })
            .await;

        info!(
            user_id = %user.user_id,
            %environment_id,
            organization_id = %organization.id,
            "layout: environment layout loaded"
        );

        Ok(EnvironmentLayoutDto {
            environment_id,
            user: LayoutUserSummary {
                id: user.user_id,
                name: user.name.clone(),
                email: user.email.clone(),
            },
            organization,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::identity_bridge::MockAnalyticsCollector;
    use chrono::Utc;
    use mockall::predicate::eq;
    use platform::domain::{
        entities::organizations::OrganizationEntity,
        repositories::{
            environments::MockEnvironmentRepository, organizations::MockOrganizationRepository,
        },
        value_objects::{
            billing::{OrganizationBilling, OrganizationFeatures},
            enums::{
                feature_statuses::FeatureStatus, product_feature_keys::ProductFeatureKey,
            },
        },
    };

    fn session_user() -> SessionUser {
        SessionUser {
            user_id: Uuid::new_v4(),
            name: Some("Grace".to_string()),
            email: Some("grace@acme.test".to_string()),
            role: None,
            objective: None,
        }
    }

    fn access(granted: bool) -> MockEnvironmentRepository {
        let mut environment_repo = MockEnvironmentRepository::new();
        environment_repo
            .expect_has_user_environment_access()
            .times(1)
            .returning(move |_, _| Box::pin(async move { Ok(granted) }));
        environment_repo
    }

    fn use_case(
        organization_repo: MockOrganizationRepository,
        environment_repo: MockEnvironmentRepository,
        collector: MockAnalyticsCollector,
    ) -> EnvironmentLayoutUseCase<
        MockOrganizationRepository,
        MockEnvironmentRepository,
        MockAnalyticsCollector,
    > {
        EnvironmentLayoutUseCase::new(
            Arc::new(organization_repo),
            Arc::new(environment_repo),
            Arc::new(IdentityBridge::new(Some(Arc::new(collector)))),
        )
    }

    #[tokio::test]
    async fn denied_access_is_forbidden() {
        let mut organization_repo = MockOrganizationRepository::new();
        organization_repo.expect_find_by_environment_id().times(0);

        let mut collector = MockAnalyticsCollector::new();
        collector.expect_identify().times(0);

        let layout = use_case(organization_repo, access(false), collector);

        let err = layout
            .load_layout(&session_user(), Uuid::new_v4())
            .await
            .unwrap_err();

        assert!(matches!(err, LayoutError::Forbidden));
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn environment_without_organization_is_a_server_error() {
        let environment_id = Uuid::new_v4();

        let mut organization_repo = MockOrganizationRepository::new();
        organization_repo
            .expect_find_by_environment_id()
            .with(eq(environment_id))
            .returning(|_| Box::pin(async { Ok(None) }));

        let mut collector = MockAnalyticsCollector::new();
        collector.expect_identify().times(0);

        let layout = use_case(organization_repo, access(true), collector);

        let err = layout
            .load_layout(&session_user(), environment_id)
            .await
            .unwrap_err();

        assert!(matches!(err, LayoutError::OrganizationNotFound));
        assert_eq!(
            err.status_code(),
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn composes_layout_and_syncs_identity() {
        let user = session_user();
        let environment_id = Uuid::new_v4();
        let now = Utc::now();
        let organization = OrganizationEntity {
            id: Uuid::new_v4(),
            name: "Acme Research".to_string(),
            billing: OrganizationBilling {
                stripe_customer_id: Some("cus_123".to_string()),
                features: OrganizationFeatures::default()
                    .with_activated(ProductFeatureKey::UserTargeting, false),
            },
            created_at: now,
            updated_at: now,
        };
        let organization_id = organization.id;

        let mut organization_repo = MockOrganizationRepository::new();
        organization_repo
            .expect_find_by_environment_id()
            .with(eq(environment_id))
            .returning(move |_| {
                let organization = organization.clone();
                Box::pin(async move { Ok(Some(organization)) })
            });

        let mut collector = MockAnalyticsCollector::new();
        collector
            .expect_identify()
            .times(1)
            .returning(|_, _| Ok(()));
        collector
            .expect_group()
            .times(2)
            .returning(|_, _, _, _| Ok(()));

        let layout = use_case(organization_repo, access(true), collector);

        let dto = layout.load_layout(&user, environment_id).await.unwrap();

        assert_eq!(dto.environment_id, environment_id);
        assert_eq!(dto.user.id, user.user_id);
        assert_eq!(dto.organization.id, organization_id);
        assert_eq!(
            dto.organization.user_targeting_billing_status,
            FeatureStatus::Active
        );
        assert_eq!(
            dto.organization.in_app_survey_billing_status,
            FeatureStatus::Inactive
        );
    }
}
