use crate::commands::CommandResult;
use sitescope_core::config::{AppConfig, LoadOptions};
use sitescope_core::domain::approval::{Actor, ActorRole};
use sitescope_core::domain::selection::Selection;
use sitescope_core::errors::WorkflowError;
use sitescope_core::ledger::InMemoryApprovalStore;
use sitescope_core::scoping::ScopingEvaluation;
use sitescope_core::workflow::{NoopSiteLifecycle, RequestContext, ScopingWorkflow, WorkflowSettings};
use sitescope_db::{connect_with_config, migrations, SqlCatalogRepository};

/// Offline preview: recommendations, validation and costs for the given modules and
/// equipment quantities, evaluated against the configured catalog. Nothing is persisted.
pub fn run(modules: &[String], equipment: &[String]) -> CommandResult {
    let selection = match build_selection(modules, equipment) {
        Ok(selection) => selection,
        Err(message) => return CommandResult::failure("recommend", "invalid_argument", message, 2),
    };

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "recommend",
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
                "recommend",
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

        let workflow = ScopingWorkflow::new(
            InMemoryApprovalStore::default(),
            SqlCatalogRepository::new(pool.clone()),
            NoopSiteLifecycle,
            WorkflowSettings::default(),
        );
        let context = RequestContext::new(
            Actor::new("cli", "sitescope cli", ActorRole::DeploymentEngineer),
            "cli-recommend",
            config.workflow.storage_timeout(),
        );
        let evaluation = workflow.preview(&context, &selection).await.map_err(|error| {
            let error_class =
                if matches!(error, WorkflowError::NotFound { .. }) { "unknown_reference" } else { "preview" };
            (error_class, error.to_string(), 7u8)
        });

        pool.close().await;
        evaluation
    });

    match result {
        Ok(evaluation) => CommandResult::success_with_data(
            "recommend",
            summary(&evaluation),
            serde_json::to_value(&evaluation).ok(),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("recommend", error_class, message, exit_code)
        }
    }
}

/// Equipment arguments use `id=quantity`.
fn build_selection(modules: &[String], equipment: &[String]) -> Result<Selection, String> {
    let mut selection = Selection::new();
    for module in modules {
        selection = selection.with_module(module.trim());
    }

    for entry in equipment {
        let (id, quantity) = entry
            .split_once('=')
            .ok_or_else(|| format!("equipment `{entry}` must be written as id=quantity"))?;
        let quantity = quantity
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("equipment `{entry}` has a non-numeric quantity"))?;
        selection = selection.with_equipment(id.trim(), quantity);
    }

    Ok(selection)
}

fn summary(evaluation: &ScopingEvaluation) -> String {
    let required = evaluation.recommendations.equipment.iter().filter(|item| item.is_required).count();
    let validity = if evaluation.validation.ok {
        "selection is valid".to_string()
    } else {
        format!("selection has {} violation(s)", evaluation.validation.violations.len())
    };

    format!(
        "{} recommendation(s), {required} required; {validity}; one-time {} monthly {} annual {}",
        evaluation.recommendations.equipment.len(),
        evaluation.costs.totals.one_time,
        evaluation.costs.totals.monthly,
        evaluation.costs.totals.annual
    )
}
