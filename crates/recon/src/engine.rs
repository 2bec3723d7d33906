use tracing::{info, info_span};

use crate::config::FusionConfig;
use crate::derived::compute_derived;
use crate::error::FusionError;
use crate::fusion::merge_result_tables;
use crate::identity::fuse_identities;
use crate::model::{DiagnosticKind, Diagnostics, FusionInput, FusionOutput, Stage, StageFailure};
use crate::validate::validate;

/// Run every stage in order: identity, results, derived, validation.
///
/// Non-fatal conditions land in `FusionOutput::diagnostics`; the first
/// fatal one becomes a [`StageFailure`].
pub fn run(config: &FusionConfig, input: FusionInput) -> Result<FusionOutput, StageFailure> {
    let _span = info_span!("fusion").entered();
    let mut diagnostics = Diagnostics::new();

    let Some(tabular) = input.tabular else {
        let err = FusionError::MissingInput("tabular survey data".into());
        return Err(StageFailure::new(Stage::Load, &err));
    };
    if input.boundaries.is_none() {
        diagnostics.push(
            Stage::Load,
            DiagnosticKind::MissingOptionalInput,
            "no boundary data; records carry no geometry",
        );
    }

    let (mut dataset, matching) = fuse_identities(tabular, input.boundaries, config, &mut diagnostics);

    let results = merge_result_tables(&mut dataset, input.results, config, &mut diagnostics);

    let ranks: Vec<(String, String)> = results
        .iter()
        .filter_map(|r| r.rank_column.clone().map(|c| (r.method.clone(), c)))
        .collect();
    let derived = compute_derived(&mut dataset, &ranks, &config.derived);

    let validation = validate(&dataset, &config.validation);
    for warning in &validation.warnings {
        diagnostics.push(Stage::Validation, DiagnosticKind::ValidationWarning, warning.clone());
    }
    if !validation.passed() {
        let err = FusionError::ValidationFailure(validation.errors.clone());
        return Err(StageFailure::new(Stage::Validation, &err));
    }

    info!(
        records = dataset.len(),
        columns = dataset.columns.len(),
        results = results.len(),
        warnings = diagnostics.len(),
        "fusion complete"
    );

    Ok(FusionOutput {
        dataset,
        matching,
        results,
        derived,
        validation,
        diagnostics,
    })
}
