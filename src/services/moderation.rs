//! Activity taxonomy, report types and the moderation queue

use chrono::Utc;
use std::sync::Arc;

use crate::db::repositories::{ActivityRepository, ReportRepository, ReportTypeRepository};
use crate::models::{
    Activity, ActivityNode, CreateActivityInput, CreateReportInput, CreateReportTypeInput,
    ListParams, PagedResult, Report, ReportStatus, ReportType, ReportTypeNode, User,
};
use crate::services::error::{found, require_text, ServiceError, ServiceResult};

const MAX_NAME_CHARS: usize = 100;
const MAX_DESCRIPTION_CHARS: usize = 2_000;

pub struct ModerationService {
    activities: Arc<dyn ActivityRepository>,
    report_types: Arc<dyn ReportTypeRepository>,
    reports: Arc<dyn ReportRepository>,
}

impl ModerationService {
    pub fn new(
        activities: Arc<dyn ActivityRepository>,
        report_types: Arc<dyn ReportTypeRepository>,
        reports: Arc<dyn ReportRepository>,
    ) -> Self {
        Self {
            activities,
            report_types,
            reports,
        }
    }

    pub async fn activity_tree(&self) -> ServiceResult<Vec<ActivityNode>> {
        Ok(ActivityNode::build_tree(self.activities.list().await?))
    }

    pub async fn create_activity(&self, user: &User, input: CreateActivityInput) -> ServiceResult<Activity> {
        require_admin(user)?;
        let name = require_text("Name", &input.name, MAX_NAME_CHARS)?;
        if let Some(parent_id) = input.parent_id {
            found(self.activities.get_by_id(parent_id).await?, "Parent activity")?;
        }
        let icon = input.icon.map(|i| i.trim().to_string()).filter(|i| !i.is_empty());
        Ok(self.activities.create(&name, input.parent_id, icon.as_deref()).await?)
    }

    pub async fn report_type_tree(&self) -> ServiceResult<Vec<ReportTypeNode>> {
        Ok(ReportTypeNode::build_tree(self.report_types.list().await?))
    }

    pub async fn create_report_type(&self, user: &User, input: CreateReportTypeInput) -> ServiceResult<ReportType> {
        require_admin(user)?;
        let name = require_text("Name", &input.name, MAX_NAME_CHARS)?;
        if let Some(parent_id) = input.parent_id {
            found(self.report_types.get_by_id(parent_id).await?, "Parent report type")?;
        }
        Ok(self.report_types.create(&name, input.parent_id).await?)
    }

    /// File a report against some piece of content or a user
    pub async fn file_report(&self, user: &User, input: CreateReportInput) -> ServiceResult<Report> {
        found(self.report_types.get_by_id(input.report_type_id).await?, "Report type")?;
        if input.target_id <= 0 {
            return Err(ServiceError::validation("Invalid report target"));
        }
        let description = match input.description {
            Some(d) if !d.trim().is_empty() => Some(require_text("Description", &d, MAX_DESCRIPTION_CHARS)?),
            _ => None,
        };

        let now = Utc::now();
        let report = Report {
            id: 0,
            reporter_id: user.id,
            report_type_id: input.report_type_id,
            target_type: input.target_type,
            target_id: input.target_id,
            description,
            status: ReportStatus::Open,
            resolved_by: None,
            created_at: now,
            updated_at: now,
        };
        let report = self.reports.create(&report).await?;
        tracing::info!(
            report_id = report.id,
            target = %report.target_type,
            target_id = report.target_id,
            "Report filed"
        );
        Ok(report)
    }

    pub async fn list_reports(
        &self,
        user: &User,
        status: Option<ReportStatus>,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<Report>> {
        require_staff(user)?;
        let (items, total) = self.reports.list(status, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn resolve(&self, user: &User, report_id: i64) -> ServiceResult<Report> {
        self.close(user, report_id, ReportStatus::Resolved).await
    }

    pub async fn dismiss(&self, user: &User, report_id: i64) -> ServiceResult<Report> {
        self.close(user, report_id, ReportStatus::Dismissed).await
    }

    pub async fn open_report_count(&self) -> ServiceResult<i64> {
        Ok(self.reports.count_open().await?)
    }

    async fn close(&self, user: &User, report_id: i64, status: ReportStatus) -> ServiceResult<Report> {
        require_staff(user)?;
        let mut report = found(self.reports.get_by_id(report_id).await?, "Report")?;
        if report.status != ReportStatus::Open {
            return Err(ServiceError::conflict(format!("Report is already {}", report.status)));
        }
        self.reports.set_status(report_id, status, Some(user.id)).await?;
        report.status = status;
        report.resolved_by = Some(user.id);
        Ok(report)
    }
}

fn require_admin(user: &User) -> ServiceResult<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::forbidden("Admin access required"))
    }
}

fn require_staff(user: &User) -> ServiceResult<()> {
    if user.is_staff() {
        Ok(())
    } else {
        Err(ServiceError::forbidden("Moderator access required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxActivityRepository, SqlxReportRepository, SqlxReportTypeRepository,
    };
    use crate::db::{migrated_test_pool, DynDatabasePool};
    use crate::models::{ReportTargetType, UserRole};
    use crate::services::test_support::{insert_user, insert_user_with_role};

    fn moderation_service(pool: &DynDatabasePool) -> ModerationService {
        ModerationService::new(
            SqlxActivityRepository::boxed(pool.clone()),
            SqlxReportTypeRepository::boxed(pool.clone()),
            SqlxReportRepository::boxed(pool.clone()),
        )
    }

    #[tokio::test]
    async fn test_only_admins_shape_the_taxonomies() {
        let pool = migrated_test_pool().await;
        let service = moderation_service(&pool);
        let ana = insert_user(&pool, "ana").await;
        let admin = insert_user_with_role(&pool, "admin", UserRole::Admin).await;

        let input = CreateActivityInput {
            name: "Dancing".into(),
            parent_id: None,
            icon: Some("shoe".into()),
        };
        assert!(matches!(
            service.create_activity(&ana, input.clone()).await,
            Err(ServiceError::Forbidden(_))
        ));
        let dancing = service.create_activity(&admin, input).await.unwrap();

        let child = CreateActivityInput {
            name: "Milonga".into(),
            parent_id: Some(dancing.id),
            icon: None,
        };
        service.create_activity(&admin, child).await.unwrap();
        let orphan = CreateActivityInput {
            name: "Lost".into(),
            parent_id: Some(999),
            icon: None,
        };
        assert!(matches!(
            service.create_activity(&admin, orphan).await,
            Err(ServiceError::NotFound(_))
        ));

        let tree = service.activity_tree().await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children[0].activity.name, "Milonga");
    }

    #[tokio::test]
    async fn test_report_lifecycle() {
        let pool = migrated_test_pool().await;
        let service = moderation_service(&pool);
        let ana = insert_user(&pool, "ana").await;
        let moderator = insert_user_with_role(&pool, "mod", UserRole::Moderator).await;
        let spam = service.report_type_tree().await.unwrap()[0].report_type.id;

        let report = service
            .file_report(
                &ana,
                CreateReportInput {
                    report_type_id: spam,
                    target_type: ReportTargetType::Post,
                    target_id: 7,
                    description: Some("selling shoes".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(service.open_report_count().await.unwrap(), 1);

        assert!(matches!(
            service.list_reports(&ana, None, &ListParams::default()).await,
            Err(ServiceError::Forbidden(_))
        ));
        let open = service
            .list_reports(&moderator, Some(ReportStatus::Open), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(open.total, 1);

        let resolved = service.resolve(&moderator, report.id).await.unwrap();
        assert_eq!(resolved.status, ReportStatus::Resolved);
        assert_eq!(resolved.resolved_by, Some(moderator.id));
        assert!(matches!(
            service.dismiss(&moderator, report.id).await,
            Err(ServiceError::Conflict(_))
        ));
        assert_eq!(service.open_report_count().await.unwrap(), 0);
    }
}
