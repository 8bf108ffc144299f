//! Workflow composer
//!
//! Runs the steps of a multi-call intent in order. Each step is a full
//! reconciliation of another descriptor, so a re-run skips what is already
//! done. Outputs of earlier steps (ids, names) feed the inputs of later ones.
//!
//! A failing step stops the walk. Nothing is rolled back; the error names the
//! failing step and every step that completed before it.

use crate::context::{LogSink, ScrubbingSink};
use crate::error::{ReconcileError, Result};
use crate::executor::{Engine, Outcome, Target};
use crate::report::{DiffRecord, ReconcileReport, Redactor, StepReport};
use crate::resource::{ResourceDescriptor, StepInput, StepState, WorkflowStep, lookup};
use crate::types::{Action, DesiredState, Document, Phase, ReconcileRequest};
use serde_json::Value;
use std::collections::HashMap;

/// Outputs exported so far, by step name then output name
type Outputs = HashMap<String, HashMap<String, Value>>;

pub(crate) fn run(
    engine: &Engine,
    descriptor: &ResourceDescriptor,
    request: &ReconcileRequest,
    report: &mut ReconcileReport,
    redactor: &mut Redactor,
) -> Result<()> {
    let check_mode = request.check_mode;
    let label = format!(
        "{} {}",
        descriptor.kind,
        descriptor.identity_label(&request.desired)
    );
    let mut outputs = Outputs::new();
    let mut completed: Vec<String> = Vec::new();
    let mut combined = DiffRecord::default();

    crate::planner::validate(descriptor, request.state, &request.desired)?;
    report.phase = Phase::Validated;

    for (index, step) in descriptor.workflow.iter().enumerate() {
        let state = step_state(step, request.state);
        let step_descriptor = engine.registry().get(&step.kind);
        let prepared = step_descriptor.and_then(|d| bind_inputs(step, &request.desired, &outputs).map(|doc| (d, doc)));
        let (step_descriptor, doc) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return Err(fail(report, step, state, e, &completed)),
        };
        redactor.extend(&step_descriptor, &doc);
        let sink = ScrubbingSink::new(engine.log_sink(), redactor.secret_values());

        let target = Target {
            descriptor: &step_descriptor,
            state,
            desired: &doc,
            check_mode,
            options: &request.options,
            require_found: state == DesiredState::Query,
        };
        let mut outcome = Outcome::default();
        let result = engine.execute(&target, &mut outcome, &sink);

        report.changed |= outcome.changed;
        report.outcome_unknown |= outcome.outcome_unknown;
        if outcome.action != Action::None {
            report.action = outcome.action;
        }
        if let Some(diff) = outcome.diff.take() {
            combined.absorb(&step.name, diff);
        }
        if outcome.response.is_some() {
            report.response = outcome.response.clone();
        }
        report.phase = outcome.phase.max(report.phase);

        if let Err(e) = result {
            report.diff = (!combined.is_empty()).then_some(combined);
            return Err(fail(report, step, state, e, &completed));
        }

        report.steps.push(StepReport {
            name: step.name.clone(),
            kind: step_descriptor.kind.clone(),
            state,
            changed: outcome.changed,
            failed: false,
            skipped: false,
            msg: outcome.msg.clone(),
        });
        completed.push(step.name.clone());
        sink.info(&format!("{label}: step {} completed", step.name));

        if outcome.is_pending_create(check_mode) {
            let rest = &descriptor.workflow[index + 1..];
            if rest.iter().any(|later| later.depends_on(&step.name)) {
                for later in rest {
                    report.steps.push(StepReport::skipped(
                        &later.name,
                        &later.kind,
                        step_state(later, request.state),
                        &format!("depends on {} which would be created", step.name),
                    ));
                }
                sink.info(&format!(
                    "{label}: check mode stops after {}, later steps need its outputs",
                    step.name
                ));
                break;
            }
        }
        outputs.insert(step.name.clone(), collect_outputs(step, &outcome));
    }

    report.diff = (!combined.is_empty()).then_some(combined);
    report.msg = if check_mode && report.changed {
        format!("{label} would change ({} steps checked)", completed.len())
    } else if report.changed {
        format!("{label} applied ({} steps completed)", completed.len())
    } else {
        format!("{label} already in desired state ({} steps checked)", completed.len())
    };
    Ok(())
}

fn step_state(step: &WorkflowStep, workflow_state: DesiredState) -> DesiredState {
    match step.state {
        StepState::Inherit => workflow_state,
        StepState::Present => DesiredState::Present,
        StepState::Absent => DesiredState::Absent,
        StepState::Query => DesiredState::Query,
    }
}

/// Build a step's desired document from its bindings.
fn bind_inputs(step: &WorkflowStep, desired: &Document, outputs: &Outputs) -> Result<Document> {
    let mut doc = Document::new();
    for binding in &step.inputs {
        let value = match &binding.input {
            StepInput::Desired(field) => match desired.get(field) {
                Some(value) => value.clone(),
                None => continue,
            },
            StepInput::Output { step: from, name } => outputs
                .get(from)
                .and_then(|o| o.get(name))
                .cloned()
                .ok_or_else(|| {
                    ReconcileError::validation(format!(
                        "step {} needs output {name} of {from}, which produced none",
                        step.name
                    ))
                })?,
            StepInput::Literal(value) => value.clone(),
        };
        doc.insert(binding.target.clone(), value);
    }
    Ok(doc)
}

/// Read exported values from the step's final remote object.
fn collect_outputs(step: &WorkflowStep, outcome: &Outcome) -> HashMap<String, Value> {
    let Some(remote) = &outcome.remote else {
        return HashMap::new();
    };
    step.outputs
        .iter()
        .filter_map(|output| {
            remote
                .canonical
                .get(&output.field)
                .or_else(|| lookup(&remote.raw, &output.field))
                .filter(|v| !v.is_null())
                .map(|v| (output.name.clone(), v.clone()))
        })
        .collect()
}

fn fail(
    report: &mut ReconcileReport,
    step: &WorkflowStep,
    state: DesiredState,
    error: ReconcileError,
    completed: &[String],
) -> ReconcileError {
    report.steps.push(StepReport {
        name: step.name.clone(),
        kind: step.kind.clone(),
        state,
        changed: false,
        failed: true,
        skipped: false,
        msg: error.to_string(),
    });
    ReconcileError::WorkflowFailed {
        step: step.name.clone(),
        completed: completed.to_vec(),
        source: Box::new(error),
    }
}
