use crate::commands::CommandResult;
use sitescope_core::config::{AppConfig, LoadOptions};
use sitescope_db::{connect_with_config, migrations, DemoCatalogSeed, SeedResult};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = DemoCatalogSeed::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoCatalogSeed::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let outcome = if verification.all_present {
            Ok(seeded)
        } else {
            let failed = verification
                .checks
                .iter()
                .filter_map(|(check, present)| (!present).then_some(check.as_str()))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_failure_message(&failed), 6u8))
        };

        pool.close().await;
        outcome
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary(seeded: &SeedResult) -> String {
    format!(
        "demo catalog loaded: {} module(s), {} equipment item(s), {} recommendation rule(s), {} business rule(s)",
        seeded.modules_seeded,
        seeded.equipment_seeded,
        seeded.recommendation_rules_seeded,
        seeded.business_rules_seeded
    )
}

fn verification_failure_message(failed: &[&str]) -> String {
    if failed.is_empty() {
        "demo catalog verification failed".to_string()
    } else {
        format!("demo catalog verification failed for: {}", failed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use sitescope_db::SeedResult;

    use super::{summary, verification_failure_message};

    #[test]
    fn verification_message_names_missing_rows() {
        assert_eq!(
            verification_failure_message(&["module:pos", "equipment:terminal"]),
            "demo catalog verification failed for: module:pos, equipment:terminal"
        );
    }

    #[test]
    fn verification_message_falls_back_when_nothing_is_named() {
        assert_eq!(verification_failure_message(&[]), "demo catalog verification failed");
    }

    #[test]
    fn summary_counts_every_catalog_table() {
        let seeded = SeedResult {
            modules_seeded: 1,
            equipment_seeded: 2,
            recommendation_rules_seeded: 2,
            business_rules_seeded: 0,
        };

        assert_eq!(
            summary(&seeded),
            "demo catalog loaded: 1 module(s), 2 equipment item(s), 2 recommendation rule(s), 0 business rule(s)"
        );
    }
}
