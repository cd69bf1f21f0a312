use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::models::{
    AppreciationPost, CategoryPercentage, Evaluation, KudosPost, Member, Quarter,
};
use crate::scope::ScopeFilter;
use crate::store::{sample_dataset, EvaluationQuery, RecordStore};

const SCOPE_PREDICATE: &str = "($1::text IS NULL OR quarter = $1) AND ($2::int4 IS NULL OR year = $2)";

pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let url = config.url()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_member(pool: &PgPool, member: &Member) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO team_members (user_id, display_name, email, is_active)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id) DO UPDATE
        SET display_name = COALESCE(EXCLUDED.display_name, team_members.display_name),
            email = COALESCE(EXCLUDED.email, team_members.email),
            is_active = COALESCE(EXCLUDED.is_active, team_members.is_active)
        "#,
    )
    .bind(&member.user_id)
    .bind(&member.display_name)
    .bind(&member.email)
    .bind(member.is_active)
    .execute(pool)
    .await?;
    Ok(())
}

async fn upsert_post(pool: &PgPool, post: &AppreciationPost) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO appreciations
        (message_id, posted_by_user_id, message, quarter, year, created_time)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (message_id) DO UPDATE
        SET quarter = EXCLUDED.quarter, year = EXCLUDED.year
        "#,
    )
    .bind(&post.message_id)
    .bind(&post.posted_by_user_id)
    .bind(&post.message)
    .bind(post.quarter.map(Quarter::as_str))
    .bind(post.year)
    .bind(post.created_time)
    .execute(pool)
    .await?;
    Ok(())
}

async fn insert_evaluation(pool: &PgPool, evaluation: &Evaluation) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO evaluations
        (message_id, user_id, leadership, communication, management, problem_solving, final_score)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (message_id, user_id) DO NOTHING
        "#,
    )
    .bind(&evaluation.message_id)
    .bind(&evaluation.user_id)
    .bind(evaluation.leadership)
    .bind(evaluation.communication)
    .bind(evaluation.management)
    .bind(evaluation.problem_solving)
    .bind(evaluation.final_score)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let data = sample_dataset();

    for member in &data.members {
        upsert_member(pool, member).await?;
    }
    for post in &data.posts {
        upsert_post(pool, post).await?;
    }
    for evaluation in &data.evaluations {
        insert_evaluation(pool, evaluation).await?;
    }

    info!(
        members = data.members.len(),
        posts = data.posts.len(),
        evaluations = data.evaluations.len(),
        "seed data applied"
    );
    Ok(())
}

/// Upsert members and posts and insert evaluations from a flat CSV export.
/// Returns the number of new evaluations.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        message_id: String,
        posted_by_user_id: Option<String>,
        message: Option<String>,
        quarter: Option<String>,
        year: Option<i32>,
        created_time: Option<DateTime<Utc>>,
        user_id: String,
        display_name: Option<String>,
        email: Option<String>,
        leadership: Option<f64>,
        communication: Option<f64>,
        management: Option<f64>,
        problem_solving: Option<f64>,
        final_score: Option<f64>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid CSV record {}", line + 1))?;
        let quarter = row
            .quarter
            .as_deref()
            .map(str::parse::<Quarter>)
            .transpose()
            .with_context(|| format!("invalid quarter in CSV record {}", line + 1))?;

        upsert_member(
            pool,
            &Member {
                user_id: row.user_id.clone(),
                display_name: row.display_name,
                email: row.email,
                is_active: None,
            },
        )
        .await?;

        if let Some(poster) = &row.posted_by_user_id {
            upsert_member(
                pool,
                &Member {
                    user_id: poster.clone(),
                    display_name: None,
                    email: None,
                    is_active: None,
                },
            )
            .await?;
        }

        upsert_post(
            pool,
            &AppreciationPost {
                message_id: row.message_id.clone(),
                posted_by_user_id: row.posted_by_user_id,
                message: row.message,
                quarter,
                year: row.year,
                created_time: row.created_time,
            },
        )
        .await?;

        let evaluation = Evaluation {
            message_id: row.message_id,
            user_id: row.user_id,
            leadership: row.leadership,
            communication: row.communication,
            management: row.management,
            problem_solving: row.problem_solving,
            final_score: row.final_score,
        };
        if insert_evaluation(pool, &evaluation).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}

/// `RecordStore` over the hosted Postgres tables.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn read_failed(table: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |source| StoreError::ReadFailed { table, source }
}

fn evaluation_from_row(row: &PgRow) -> Result<Evaluation, sqlx::Error> {
    Ok(Evaluation {
        message_id: row.try_get("message_id")?,
        user_id: row.try_get("user_id")?,
        leadership: row.try_get("leadership")?,
        communication: row.try_get("communication")?,
        management: row.try_get("management")?,
        problem_solving: row.try_get("problem_solving")?,
        final_score: row.try_get("final_score")?,
    })
}

fn quarter_from_row(row: &PgRow) -> Result<Option<Quarter>, sqlx::Error> {
    let raw: Option<String> = row.try_get("quarter")?;
    Ok(raw.and_then(|value| value.parse().ok()))
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn members(&self) -> Result<Vec<Member>, StoreError> {
        let rows = sqlx::query(
            "SELECT user_id, display_name, email, is_active FROM team_members \
             ORDER BY display_name NULLS LAST, user_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(read_failed("team_members"))?;

        rows.iter()
            .map(|row| {
                Ok(Member {
                    user_id: row.try_get("user_id")?,
                    display_name: row.try_get("display_name")?,
                    email: row.try_get("email")?,
                    is_active: row.try_get("is_active")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(read_failed("team_members"))
    }

    async fn count_members(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM team_members")
            .fetch_one(&self.pool)
            .await
            .map_err(read_failed("team_members"))?;
        Ok(count.max(0) as u64)
    }

    async fn count_appreciations(&self, filter: &ScopeFilter) -> Result<u64, StoreError> {
        let query = format!("SELECT COUNT(*) FROM appreciations WHERE {SCOPE_PREDICATE}");
        let count: i64 = sqlx::query_scalar(&query)
            .bind(filter.quarter.map(Quarter::as_str))
            .bind(filter.year)
            .fetch_one(&self.pool)
            .await
            .map_err(read_failed("appreciations"))?;
        Ok(count.max(0) as u64)
    }

    async fn appreciation_ids(&self, filter: &ScopeFilter) -> Result<Vec<String>, StoreError> {
        let query = format!("SELECT message_id FROM appreciations WHERE {SCOPE_PREDICATE}");
        sqlx::query_scalar(&query)
            .bind(filter.quarter.map(Quarter::as_str))
            .bind(filter.year)
            .fetch_all(&self.pool)
            .await
            .map_err(read_failed("appreciations"))
    }

    async fn evaluations(&self, query: &EvaluationQuery) -> Result<Vec<Evaluation>, StoreError> {
        if matches!(&query.message_ids, Some(ids) if ids.is_empty()) {
            // `message_id IN ()` must mean "nothing", not "no restriction".
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            "SELECT message_id, user_id, leadership, communication, management, \
             problem_solving, final_score FROM evaluations WHERE TRUE",
        );
        let mut position = 0;
        if query.user_id.is_some() {
            position += 1;
            sql.push_str(&format!(" AND user_id = ${position}"));
        }
        if query.message_ids.is_some() {
            position += 1;
            sql.push_str(&format!(" AND message_id = ANY(${position})"));
        }

        let mut rows = sqlx::query(&sql);
        if let Some(user_id) = &query.user_id {
            rows = rows.bind(user_id);
        }
        if let Some(ids) = &query.message_ids {
            rows = rows.bind(ids);
        }

        let records = rows
            .fetch_all(&self.pool)
            .await
            .map_err(read_failed("evaluations"))?;
        debug!(rows = records.len(), user_id = ?query.user_id, "evaluations read");

        records
            .iter()
            .map(evaluation_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_failed("evaluations"))
    }

    async fn team_metrics(
        &self,
        filter: &ScopeFilter,
    ) -> Result<Vec<CategoryPercentage>, StoreError> {
        let rows = sqlx::query("SELECT category, percentage FROM get_team_metrics($1, $2)")
            .bind(filter.quarter.map(Quarter::as_str))
            .bind(filter.year)
            .fetch_all(&self.pool)
            .await
            .map_err(read_failed("get_team_metrics"))?;

        rows.iter()
            .map(|row| {
                Ok(CategoryPercentage {
                    category: row.try_get("category")?,
                    percentage: row.try_get("percentage")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(read_failed("get_team_metrics"))
    }

    async fn available_years(&self) -> Result<Vec<i32>, StoreError> {
        sqlx::query_scalar(
            "SELECT DISTINCT year FROM appreciations WHERE year IS NOT NULL ORDER BY year DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(read_failed("appreciations"))
    }

    async fn recent_kudos(
        &self,
        filter: &ScopeFilter,
        limit: usize,
    ) -> Result<Vec<KudosPost>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT a.message_id, a.message, m.display_name AS posted_by,
                   a.quarter, a.year, a.created_time
            FROM appreciations a
            LEFT JOIN team_members m ON m.user_id = a.posted_by_user_id
            WHERE ($1::text IS NULL OR a.quarter = $1) AND ($2::int4 IS NULL OR a.year = $2)
            ORDER BY a.created_time DESC NULLS LAST
            LIMIT $3
            "#,
        )
        .bind(filter.quarter.map(Quarter::as_str))
        .bind(filter.year)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(read_failed("appreciations"))?;

        rows.iter()
            .map(|row| {
                Ok(KudosPost {
                    message_id: row.try_get("message_id")?,
                    message: row.try_get("message")?,
                    posted_by: row.try_get("posted_by")?,
                    quarter: quarter_from_row(row)?,
                    year: row.try_get("year")?,
                    created_time: row.try_get("created_time")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(read_failed("appreciations"))
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
