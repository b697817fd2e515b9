use sitescope_core::config::{AppConfig, LoadOptions};
use sitescope_db::{connect_with_config, DbPool};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DATABASE_CHECKS: [&str; 3] = ["database_connectivity", "schema_version", "catalog_readiness"];

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_site_lifecycle(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.push(DoctorCheck::skipped("site_lifecycle", "configuration did not load"));
            checks.extend(
                DATABASE_CHECKS
                    .into_iter()
                    .map(|name| DoctorCheck::skipped(name, "configuration did not load")),
            );
        }
    }

    finalize(checks)
}

fn finalize(checks: Vec<DoctorCheck>) -> DoctorReport {
    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_site_lifecycle(config: &AppConfig) -> DoctorCheck {
    match (&config.site_lifecycle.base_url, config.site_lifecycle.enabled) {
        (Some(base_url), true) => {
            DoctorCheck::pass("site_lifecycle", format!("approvals advance sites via `{base_url}`"))
        }
        _ => DoctorCheck::pass(
            "site_lifecycle",
            "disabled; approved sites must be moved to procurement manually",
        ),
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let mut checks = vec![DoctorCheck::fail(
                "database_connectivity",
                format!("failed to initialize async runtime: {error}"),
            )];
            checks.push(DoctorCheck::skipped("schema_version", "the runtime did not start"));
            checks.push(DoctorCheck::skipped("catalog_readiness", "the runtime did not start"));
            return checks;
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::fail(
                        "database_connectivity",
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::skipped("schema_version", "the database is unreachable"),
                    DoctorCheck::skipped("catalog_readiness", "the database is unreachable"),
                ];
            }
        };

        let mut checks = vec![DoctorCheck::pass(
            "database_connectivity",
            format!("connected using `{}`", config.database.url),
        )];
        checks.push(check_schema_version(&pool).await);
        if checks.last().map(|check| check.status) == Some(CheckStatus::Pass) {
            checks.push(check_catalog(&pool).await);
        } else {
            checks.push(DoctorCheck::skipped("catalog_readiness", "the schema is not migrated"));
        }

        pool.close().await;
        checks
    })
}

async fn check_schema_version(pool: &DbPool) -> DoctorCheck {
    let version: Result<Option<i64>, sqlx::Error> =
        sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations").fetch_one(pool).await;

    match version {
        Ok(Some(version)) => DoctorCheck::pass("schema_version", format!("schema version {version}")),
        Ok(None) | Err(_) => {
            DoctorCheck::fail("schema_version", "no migrations applied; run `sitescope migrate`")
        }
    }
}

async fn check_catalog(pool: &DbPool) -> DoctorCheck {
    let modules: Result<i64, sqlx::Error> =
        sqlx::query_scalar("SELECT COUNT(1) FROM capability_module WHERE active = 1")
            .fetch_one(pool)
            .await;

    match modules {
        Ok(0) => DoctorCheck::fail(
            "catalog_readiness",
            "no active capability modules; run `sitescope seed` or load a catalog",
        ),
        Ok(count) => DoctorCheck::pass("catalog_readiness", format!("{count} active module(s)")),
        Err(error) => DoctorCheck::fail("catalog_readiness", format!("catalog query failed: {error}")),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
