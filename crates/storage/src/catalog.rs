//! Metadata catalog using PostgreSQL.
//!
//! One table per model family. Uniqueness keys vary by family shape:
//! synoptic tables are unique on (forecastcycle, forecasttime), ensembles
//! add the member, storm models add the storm name, and the NHC track
//! tables are keyed on storm identity (+ advisory for forecasts). Writers
//! racing on the same identity resolve through `ON CONFLICT`, which only
//! refreshes `filepath` and `accessed`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Row};

use metget_common::{MetGetError, MetGetResult, ModelFamily, Service};

/// Database connection pool and catalog operations.
#[derive(Clone)]
pub struct Catalog {
    pool: PgPool,
}

/// Identity filters applied to field queries.
#[derive(Debug, Clone, Default)]
pub struct FieldConstraints {
    pub storm: Option<String>,
    pub ensemble_member: Option<String>,
}

/// A catalog row for one forecast field.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct FieldRow {
    pub forecastcycle: DateTime<Utc>,
    pub forecasttime: DateTime<Utc>,
    pub tau: i32,
    pub filepath: String,
}

/// A new field row to be upserted.
#[derive(Debug, Clone)]
pub struct NewField {
    pub service: Service,
    pub forecastcycle: DateTime<Utc>,
    pub forecasttime: DateTime<Utc>,
    pub tau: i32,
    pub filepath: String,
    pub url: Option<String>,
    pub stormname: Option<String>,
    pub ensemble_member: Option<String>,
}

/// Which of the two NHC track tables a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    BestTrack,
    Forecast,
}

impl TrackKind {
    fn table(&self) -> &'static str {
        match self {
            TrackKind::BestTrack => "nhc_btk",
            TrackKind::Forecast => "nhc_fcst",
        }
    }
}

/// A catalog row for a tropical cyclone track product.
#[derive(Debug, Clone, FromRow)]
pub struct TrackRow {
    pub storm_year: i32,
    pub basin: String,
    pub storm: i32,
    pub advisory: Option<String>,
    pub advisory_start: Option<DateTime<Utc>>,
    pub advisory_end: Option<DateTime<Utc>>,
    pub filepath: String,
    pub md5: String,
}

/// A new track row to be upserted.
#[derive(Debug, Clone)]
pub struct NewTrack {
    pub kind: TrackKind,
    pub storm_year: i32,
    pub basin: String,
    pub storm: i32,
    pub advisory: Option<String>,
    pub advisory_start: DateTime<Utc>,
    pub advisory_end: DateTime<Utc>,
    pub advisory_duration_hr: i32,
    pub filepath: String,
    pub md5: String,
    pub geometry_data: Value,
}

/// Per-service cycle coverage for the status snapshot.
#[derive(Debug, Clone)]
pub struct CycleCoverage {
    pub cycle: DateTime<Utc>,
    pub max_tau: i32,
}

fn db_err(e: sqlx::Error) -> MetGetError {
    MetGetError::Database(e.to_string())
}

impl Catalog {
    /// Create a new catalog connection from database URL.
    pub async fn connect(database_url: &str) -> MetGetResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| MetGetError::Database(format!("Connection failed: {}", e)))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run schema migrations.
    pub async fn migrate(&self) -> MetGetResult<()> {
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| MetGetError::Database(format!("Migration failed: {}", e)))?;
            }
        }
        Ok(())
    }

    /// Readiness probe.
    pub async fn ping(&self) -> MetGetResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Upsert a field row. Returns true if the row was newly inserted.
    ///
    /// Conflicts refresh `filepath` and `accessed` only.
    pub async fn upsert_field(&self, field: &NewField) -> MetGetResult<bool> {
        let table = field.service.table();
        let sql = match field.service.family() {
            ModelFamily::Synoptic => format!(
                "INSERT INTO {t} (forecastcycle, forecasttime, tau, filepath, url, accessed) \
                 VALUES ($1, $2, $3, $4, $5, NOW()) \
                 ON CONFLICT (forecastcycle, forecasttime) \
                 DO UPDATE SET filepath = EXCLUDED.filepath, accessed = NOW() \
                 RETURNING (xmax = 0) AS inserted",
                t = table
            ),
            ModelFamily::SynopticEnsemble => format!(
                "INSERT INTO {t} (forecastcycle, forecasttime, tau, filepath, url, ensemble_member, accessed) \
                 VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
                 ON CONFLICT (forecastcycle, forecasttime, ensemble_member) \
                 DO UPDATE SET filepath = EXCLUDED.filepath, accessed = NOW() \
                 RETURNING (xmax = 0) AS inserted",
                t = table
            ),
            ModelFamily::Storm => format!(
                "INSERT INTO {t} (forecastcycle, forecasttime, tau, filepath, url, stormname, accessed) \
                 VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
                 ON CONFLICT (forecastcycle, forecasttime, stormname) \
                 DO UPDATE SET filepath = EXCLUDED.filepath, accessed = NOW() \
                 RETURNING (xmax = 0) AS inserted",
                t = table
            ),
            ModelFamily::StormEnsemble => format!(
                "INSERT INTO {t} (forecastcycle, forecasttime, tau, filepath, url, stormname, ensemble_member, accessed) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, NOW()) \
                 ON CONFLICT (forecastcycle, forecasttime, stormname, ensemble_member) \
                 DO UPDATE SET filepath = EXCLUDED.filepath, accessed = NOW() \
                 RETURNING (xmax = 0) AS inserted",
                t = table
            ),
            ModelFamily::Track => {
                return Err(MetGetError::Internal(
                    "Track rows are written with upsert_track".to_string(),
                ))
            }
        };

        let mut query = sqlx::query(&sql)
            .bind(field.forecastcycle)
            .bind(field.forecasttime)
            .bind(field.tau)
            .bind(&field.filepath)
            .bind(&field.url);

        match field.service.family() {
            ModelFamily::SynopticEnsemble => {
                query = query.bind(&field.ensemble_member);
            }
            ModelFamily::Storm => {
                query = query.bind(&field.stormname);
            }
            ModelFamily::StormEnsemble => {
                query = query.bind(&field.stormname).bind(&field.ensemble_member);
            }
            _ => {}
        }

        let row = query.fetch_one(&self.pool).await.map_err(db_err)?;
        Ok(row.try_get::<bool, _>("inserted").unwrap_or(false))
    }

    /// Check whether a field identity is already catalogued.
    pub async fn has_field(
        &self,
        service: Service,
        forecastcycle: DateTime<Utc>,
        forecasttime: DateTime<Utc>,
        constraints: &FieldConstraints,
    ) -> MetGetResult<bool> {
        let (sql, _) = filtered_query(
            service,
            "SELECT 1",
            "forecastcycle = $1 AND forecasttime = $2",
            constraints,
            3,
        );
        let mut query = sqlx::query(&sql).bind(forecastcycle).bind(forecasttime);
        query = bind_constraints(query, constraints);
        Ok(query
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .is_some())
    }

    /// Fields whose valid time lies in [start, end] with tau at or above the
    /// floor, identity filters applied. Ordered by valid time then tau.
    pub async fn fields_in_window(
        &self,
        service: Service,
        constraints: &FieldConstraints,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tau_floor: i32,
    ) -> MetGetResult<Vec<FieldRow>> {
        let (sql, _) = filtered_query(
            service,
            "SELECT forecastcycle, forecasttime, tau, filepath",
            "forecasttime BETWEEN $1 AND $2 AND tau >= $3",
            constraints,
            4,
        );
        let sql = format!("{} ORDER BY forecasttime, tau, filepath", sql);
        let mut query = sqlx::query_as::<_, FieldRow>(&sql)
            .bind(start)
            .bind(end)
            .bind(tau_floor);
        query = bind_constraints_as(query, constraints);
        query.fetch_all(&self.pool).await.map_err(db_err)
    }

    /// All fields belonging to one forecast cycle with tau at or above the
    /// floor, regardless of valid time.
    pub async fn fields_for_cycle(
        &self,
        service: Service,
        constraints: &FieldConstraints,
        cycle: DateTime<Utc>,
        tau_floor: i32,
    ) -> MetGetResult<Vec<FieldRow>> {
        let (sql, _) = filtered_query(
            service,
            "SELECT forecastcycle, forecasttime, tau, filepath",
            "forecastcycle = $1 AND tau >= $2",
            constraints,
            3,
        );
        let sql = format!("{} ORDER BY forecasttime, tau, filepath", sql);
        let mut query = sqlx::query_as::<_, FieldRow>(&sql).bind(cycle).bind(tau_floor);
        query = bind_constraints_as(query, constraints);
        query.fetch_all(&self.pool).await.map_err(db_err)
    }

    /// Cycle coverage (cycle, max tau) for a service, newest first.
    /// This is the status endpoint's cycle listing.
    pub async fn cycle_coverage(
        &self,
        service: Service,
        since: Option<DateTime<Utc>>,
    ) -> MetGetResult<Vec<CycleCoverage>> {
        let filter = if since.is_some() {
            "WHERE forecastcycle >= $1"
        } else {
            ""
        };
        let sql = format!(
            "SELECT forecastcycle, MAX(tau) AS max_tau FROM {} {} \
             GROUP BY forecastcycle ORDER BY forecastcycle DESC",
            service.table(),
            filter
        );
        let mut query = sqlx::query(&sql);
        if let Some(s) = since {
            query = query.bind(s);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|r| CycleCoverage {
                cycle: r.get("forecastcycle"),
                max_tau: r.get("max_tau"),
            })
            .collect())
    }

    /// Upsert a track row keyed on storm identity (+ advisory for forecasts).
    pub async fn upsert_track(&self, track: &NewTrack) -> MetGetResult<bool> {
        let sql = match track.kind {
            TrackKind::BestTrack => "INSERT INTO nhc_btk \
                 (storm_year, basin, storm, advisory_start, advisory_end, advisory_duration_hr, \
                  filepath, md5, accessed, geometry_data) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), $9) \
                 ON CONFLICT (storm_year, basin, storm) \
                 DO UPDATE SET advisory_start = EXCLUDED.advisory_start, \
                               advisory_end = EXCLUDED.advisory_end, \
                               advisory_duration_hr = EXCLUDED.advisory_duration_hr, \
                               filepath = EXCLUDED.filepath, md5 = EXCLUDED.md5, \
                               accessed = NOW(), geometry_data = EXCLUDED.geometry_data \
                 RETURNING (xmax = 0) AS inserted"
                .to_string(),
            TrackKind::Forecast => "INSERT INTO nhc_fcst \
                 (storm_year, basin, storm, advisory, advisory_start, advisory_end, \
                  advisory_duration_hr, filepath, md5, accessed, geometry_data) \
                 VALUES ($1, $2, $3, $10, $4, $5, $6, $7, $8, NOW(), $9) \
                 ON CONFLICT (storm_year, basin, storm, advisory) \
                 DO UPDATE SET advisory_start = EXCLUDED.advisory_start, \
                               advisory_end = EXCLUDED.advisory_end, \
                               advisory_duration_hr = EXCLUDED.advisory_duration_hr, \
                               filepath = EXCLUDED.filepath, md5 = EXCLUDED.md5, \
                               accessed = NOW(), geometry_data = EXCLUDED.geometry_data \
                 RETURNING (xmax = 0) AS inserted"
                .to_string(),
        };

        let mut query = sqlx::query(&sql)
            .bind(track.storm_year)
            .bind(&track.basin)
            .bind(track.storm)
            .bind(track.advisory_start)
            .bind(track.advisory_end)
            .bind(track.advisory_duration_hr)
            .bind(&track.filepath)
            .bind(&track.md5)
            .bind(&track.geometry_data);
        if track.kind == TrackKind::Forecast {
            query = query.bind(&track.advisory);
        }

        let row = query.fetch_one(&self.pool).await.map_err(db_err)?;
        Ok(row.try_get::<bool, _>("inserted").unwrap_or(false))
    }

    /// The stored md5 for a track identity, used to dedupe re-downloads.
    pub async fn track_md5(
        &self,
        kind: TrackKind,
        storm_year: i32,
        basin: &str,
        storm: i32,
        advisory: Option<&str>,
    ) -> MetGetResult<Option<String>> {
        let sql = match (kind, advisory) {
            (TrackKind::Forecast, Some(_)) => format!(
                "SELECT md5 FROM {} WHERE storm_year = $1 AND basin = $2 AND storm = $3 \
                 AND advisory = $4",
                kind.table()
            ),
            _ => format!(
                "SELECT md5 FROM {} WHERE storm_year = $1 AND basin = $2 AND storm = $3",
                kind.table()
            ),
        };
        let mut query = sqlx::query_scalar::<_, String>(&sql)
            .bind(storm_year)
            .bind(basin)
            .bind(storm);
        if let (TrackKind::Forecast, Some(adv)) = (kind, advisory) {
            query = query.bind(adv);
        }
        query.fetch_optional(&self.pool).await.map_err(db_err)
    }

    /// Find a track row: the advisory forecast when an advisory is given,
    /// the best track otherwise.
    pub async fn find_track(
        &self,
        storm_year: i32,
        basin: &str,
        storm: i32,
        advisory: Option<&str>,
    ) -> MetGetResult<Option<TrackRow>> {
        let sql = match advisory {
            Some(_) => "SELECT storm_year, basin, storm, advisory, advisory_start, advisory_end, \
                 filepath, md5 FROM nhc_fcst \
                 WHERE storm_year = $1 AND basin = $2 AND storm = $3 AND advisory = $4",
            None => "SELECT storm_year, basin, storm, CAST(NULL AS VARCHAR) AS advisory, \
                 advisory_start, advisory_end, filepath, md5 FROM nhc_btk \
                 WHERE storm_year = $1 AND basin = $2 AND storm = $3",
        };
        let mut query = sqlx::query_as::<_, TrackRow>(sql)
            .bind(storm_year)
            .bind(basin)
            .bind(storm);
        if let Some(adv) = advisory {
            query = query.bind(adv);
        }
        query.fetch_optional(&self.pool).await.map_err(db_err)
    }

    /// Field rows older than the cutoff, for the retention sweep.
    pub async fn expired_fields(
        &self,
        service: Service,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> MetGetResult<Vec<FieldRow>> {
        let sql = format!(
            "SELECT forecastcycle, forecasttime, tau, filepath FROM {} \
             WHERE forecasttime < $1 ORDER BY forecasttime LIMIT $2",
            service.table()
        );
        sqlx::query_as::<_, FieldRow>(&sql)
            .bind(cutoff)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }

    /// Remove a field row by storage path. Called only after the blob is
    /// deleted, per the retention ordering invariant.
    pub async fn delete_field(&self, service: Service, filepath: &str) -> MetGetResult<u64> {
        let sql = format!("DELETE FROM {} WHERE filepath = $1", service.table());
        let result = sqlx::query(&sql)
            .bind(filepath)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}

/// Build a filtered SELECT over a service table. Returns the SQL and the
/// next free bind index.
fn filtered_query(
    service: Service,
    select: &str,
    base_filter: &str,
    constraints: &FieldConstraints,
    mut next_bind: usize,
) -> (String, usize) {
    let mut sql = format!(
        "{} FROM {} WHERE {}",
        select,
        service.table(),
        base_filter
    );
    if constraints.storm.is_some() {
        sql.push_str(&format!(" AND stormname = ${}", next_bind));
        next_bind += 1;
    }
    if constraints.ensemble_member.is_some() {
        sql.push_str(&format!(" AND ensemble_member = ${}", next_bind));
        next_bind += 1;
    }
    (sql, next_bind)
}

fn bind_constraints<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    constraints: &'q FieldConstraints,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    if let Some(storm) = &constraints.storm {
        query = query.bind(storm);
    }
    if let Some(member) = &constraints.ensemble_member {
        query = query.bind(member);
    }
    query
}

fn bind_constraints_as<'q, T>(
    mut query: sqlx::query::QueryAs<'q, sqlx::Postgres, T, sqlx::postgres::PgArguments>,
    constraints: &'q FieldConstraints,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, T, sqlx::postgres::PgArguments> {
    if let Some(storm) = &constraints.storm {
        query = query.bind(storm);
    }
    if let Some(member) = &constraints.ensemble_member {
        query = query.bind(member);
    }
    query
}

/// Database schema SQL.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS gfs_ncep (
    id BIGSERIAL PRIMARY KEY,
    forecastcycle TIMESTAMPTZ NOT NULL,
    forecasttime TIMESTAMPTZ NOT NULL,
    tau INTEGER NOT NULL,
    filepath TEXT NOT NULL,
    url TEXT,
    accessed TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE(forecastcycle, forecasttime)
);

CREATE TABLE IF NOT EXISTS nam_ncep (LIKE gfs_ncep INCLUDING ALL);
CREATE TABLE IF NOT EXISTS hrrr_ncep (LIKE gfs_ncep INCLUDING ALL);
CREATE TABLE IF NOT EXISTS hrrr_alaska_ncep (LIKE gfs_ncep INCLUDING ALL);
CREATE TABLE IF NOT EXISTS wpc_ncep (LIKE gfs_ncep INCLUDING ALL);

CREATE TABLE IF NOT EXISTS gefs_fcst (
    id BIGSERIAL PRIMARY KEY,
    forecastcycle TIMESTAMPTZ NOT NULL,
    forecasttime TIMESTAMPTZ NOT NULL,
    tau INTEGER NOT NULL,
    ensemble_member VARCHAR(32) NOT NULL,
    filepath TEXT NOT NULL,
    url TEXT,
    accessed TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE(forecastcycle, forecasttime, ensemble_member)
);

CREATE TABLE IF NOT EXISTS hwrf (
    id BIGSERIAL PRIMARY KEY,
    forecastcycle TIMESTAMPTZ NOT NULL,
    forecasttime TIMESTAMPTZ NOT NULL,
    tau INTEGER NOT NULL,
    stormname VARCHAR(64) NOT NULL,
    filepath TEXT NOT NULL,
    url TEXT,
    accessed TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE(forecastcycle, forecasttime, stormname)
);

CREATE TABLE IF NOT EXISTS ncep_hafs_a (LIKE hwrf INCLUDING ALL);
CREATE TABLE IF NOT EXISTS ncep_hafs_b (LIKE hwrf INCLUDING ALL);
CREATE TABLE IF NOT EXISTS coamps_tc (LIKE hwrf INCLUDING ALL);

CREATE TABLE IF NOT EXISTS ctcx (
    id BIGSERIAL PRIMARY KEY,
    forecastcycle TIMESTAMPTZ NOT NULL,
    forecasttime TIMESTAMPTZ NOT NULL,
    tau INTEGER NOT NULL,
    stormname VARCHAR(64) NOT NULL,
    ensemble_member VARCHAR(32) NOT NULL,
    filepath TEXT NOT NULL,
    url TEXT,
    accessed TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE(forecastcycle, forecasttime, stormname, ensemble_member)
);

CREATE TABLE IF NOT EXISTS nhc_btk (
    id BIGSERIAL PRIMARY KEY,
    storm_year INTEGER NOT NULL,
    basin VARCHAR(2) NOT NULL,
    storm INTEGER NOT NULL,
    advisory_start TIMESTAMPTZ,
    advisory_end TIMESTAMPTZ,
    advisory_duration_hr INTEGER,
    filepath TEXT NOT NULL,
    md5 VARCHAR(32) NOT NULL,
    accessed TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    geometry_data JSONB NOT NULL DEFAULT '{}',
    UNIQUE(storm_year, basin, storm)
);

CREATE TABLE IF NOT EXISTS nhc_fcst (
    id BIGSERIAL PRIMARY KEY,
    storm_year INTEGER NOT NULL,
    basin VARCHAR(2) NOT NULL,
    storm INTEGER NOT NULL,
    advisory VARCHAR(8) NOT NULL,
    advisory_start TIMESTAMPTZ,
    advisory_end TIMESTAMPTZ,
    advisory_duration_hr INTEGER,
    filepath TEXT NOT NULL,
    md5 VARCHAR(32) NOT NULL,
    accessed TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    geometry_data JSONB NOT NULL DEFAULT '{}',
    UNIQUE(storm_year, basin, storm, advisory)
);

CREATE INDEX IF NOT EXISTS idx_gfs_ncep_cycle_brin ON gfs_ncep USING BRIN (forecastcycle);
CREATE INDEX IF NOT EXISTS idx_nam_ncep_cycle_brin ON nam_ncep USING BRIN (forecastcycle);
CREATE INDEX IF NOT EXISTS idx_hrrr_ncep_cycle_brin ON hrrr_ncep USING BRIN (forecastcycle);
CREATE INDEX IF NOT EXISTS idx_hrrr_alaska_cycle_brin ON hrrr_alaska_ncep USING BRIN (forecastcycle);
CREATE INDEX IF NOT EXISTS idx_wpc_ncep_cycle_brin ON wpc_ncep USING BRIN (forecastcycle);
CREATE INDEX IF NOT EXISTS idx_gefs_fcst_cycle_brin ON gefs_fcst USING BRIN (forecastcycle);

CREATE INDEX IF NOT EXISTS idx_gfs_ncep_time ON gfs_ncep (forecasttime, tau);
CREATE INDEX IF NOT EXISTS idx_nam_ncep_time ON nam_ncep (forecasttime, tau);
CREATE INDEX IF NOT EXISTS idx_hrrr_ncep_time ON hrrr_ncep (forecasttime, tau);
CREATE INDEX IF NOT EXISTS idx_hrrr_alaska_time ON hrrr_alaska_ncep (forecasttime, tau);
CREATE INDEX IF NOT EXISTS idx_wpc_ncep_time ON wpc_ncep (forecasttime, tau);
CREATE INDEX IF NOT EXISTS idx_gefs_fcst_time ON gefs_fcst (forecasttime, ensemble_member, tau);

CREATE TABLE IF NOT EXISTS requests (
    id BIGSERIAL PRIMARY KEY,
    request_id VARCHAR(36) NOT NULL UNIQUE,
    try INTEGER NOT NULL DEFAULT 0,
    status VARCHAR(16) NOT NULL DEFAULT 'queued',
    start_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    last_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    api_key VARCHAR(41) NOT NULL,
    source_ip VARCHAR(64) NOT NULL,
    credit_usage BIGINT NOT NULL DEFAULT 0,
    input_data JSONB NOT NULL,
    message JSONB NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_requests_api_key ON requests (api_key, last_date);

CREATE TABLE IF NOT EXISTS apikeys (
    id BIGSERIAL PRIMARY KEY,
    key VARCHAR(41) NOT NULL UNIQUE,
    username VARCHAR(128) NOT NULL,
    description TEXT,
    credit_limit BIGINT NOT NULL DEFAULT -1,
    credit_used BIGINT NOT NULL DEFAULT 0,
    enabled BOOLEAN NOT NULL DEFAULT TRUE,
    expiration TIMESTAMPTZ,
    permissions JSONB
)
"#;
