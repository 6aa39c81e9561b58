use progress_core::sql::OverviewQuery;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{bind_args, conn, map_overview_row, ser};
use crate::repository::{OverviewRecord, OverviewRepository, StorageError};

#[async_trait::async_trait]
impl OverviewRepository for SqliteRepository {
    async fn count_users(&self, query: &OverviewQuery) -> Result<u64, StorageError> {
        let rendered = query.count_query()?;
        tracing::debug!(sql = %rendered.sql, args = rendered.args.len(), "counting overview users");

        let row = bind_args(sqlx::query(&rendered.sql), &rendered.args)
            .fetch_one(&self.pool)
            .await
            .map_err(conn)?;
        let total: i64 = row.try_get("total").map_err(ser)?;
        u64::try_from(total).map_err(|_| StorageError::Serialization(format!("invalid count: {total}")))
    }

    async fn fetch_page(
        &self,
        query: &OverviewQuery,
    ) -> Result<Vec<OverviewRecord>, StorageError> {
        let rendered = query.page_query()?;
        tracing::debug!(
            sql = %rendered.sql,
            page = query.page.page,
            per_page = query.page.per_page,
            "fetching overview page"
        );

        let rows = bind_args(sqlx::query(&rendered.sql), &rendered.args)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter().map(map_overview_row).collect()
    }
}
