//! Reconciler - drives one desired document to its target state
//!
//! The state machine runs
//! `Start → Validated → Fetched → Decided → Dispatched → Awaiting → Verified → Reported`
//! and drops to `Failed` from any intermediate phase. Errors from every
//! component come back here and are turned into the report; nothing below
//! this module decides what the user sees.

use crate::context::{Clock, LogCrateSink, LogSink, ScrubbingSink, SystemClock};
use crate::diff::{self, DiffOutcome};
use crate::error::{ReconcileError, Result};
use crate::fetch::{self, RemoteObject};
use crate::lock::IdentityLocks;
use crate::planner;
use crate::poller::{Poller, PollerConfig, TaskHandle};
use crate::registry::Registry;
use crate::report::{DiffRecord, ReconcileReport, Redactor};
use crate::resource::{Completion, ResourceDescriptor};
use crate::transport::{Request, Response, Transport};
use crate::types::{Action, DesiredState, Document, Phase, ReconcileOptions, ReconcileRequest};
use crate::workflow;
use rayon::prelude::*;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// What one reconciliation pass did, filled in as it goes
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    pub phase: Phase,
    pub action: Action,
    pub changed: bool,
    pub outcome_unknown: bool,
    pub diff: Option<DiffRecord>,
    pub response: Option<Value>,
    /// The object as last read (after verification when a write happened)
    pub remote: Option<RemoteObject>,
    pub msg: String,
}

impl Outcome {
    /// Whether check mode predicted a create, so no remote object exists yet.
    pub fn is_pending_create(&self, check_mode: bool) -> bool {
        check_mode && self.action == Action::Create && self.remote.is_none()
    }

    fn copy_into(self, report: &mut ReconcileReport) {
        report.phase = self.phase;
        report.action = self.action;
        report.changed = self.changed;
        report.outcome_unknown = self.outcome_unknown;
        report.diff = self.diff;
        report.response = self.response;
        report.msg = self.msg;
    }
}

/// One descriptor-level reconciliation
pub(crate) struct Target<'a> {
    pub descriptor: &'a ResourceDescriptor,
    pub state: DesiredState,
    pub desired: &'a Document,
    pub check_mode: bool,
    pub options: &'a ReconcileOptions,
    /// Fail with `NotFound` when a query finds nothing
    pub require_found: bool,
}

/// The reconciliation engine.
///
/// Shares one transport and one read-only registry across every call;
/// safe to use from several threads at once.
pub struct Engine {
    transport: Arc<dyn Transport>,
    registry: Arc<Registry>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn LogSink>,
    poller: PollerConfig,
    locks: IdentityLocks,
}

impl Engine {
    pub fn new(transport: Arc<dyn Transport>, registry: Arc<Registry>) -> Self {
        Self {
            transport,
            registry,
            clock: Arc::new(SystemClock),
            sink: Arc::new(LogCrateSink),
            poller: PollerConfig::default(),
            locks: IdentityLocks::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_poller_config(mut self, config: PollerConfig) -> Self {
        self.poller = config;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn log_sink(&self) -> &dyn LogSink {
        self.sink.as_ref()
    }

    /// Reconcile one document. Never fails: errors land in the report.
    pub fn reconcile(&self, request: ReconcileRequest) -> ReconcileReport {
        let mut report = ReconcileReport::new(&request.kind, request.state, request.check_mode);
        let descriptor = match self.registry.get(&request.kind) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                report.fail(&e);
                return report;
            }
        };
        report.kind.clone_from(&descriptor.kind);

        let mut redactor = Redactor::for_descriptor(&descriptor, &request.desired);
        let result = if descriptor.is_workflow() {
            workflow::run(self, &descriptor, &request, &mut report, &mut redactor)
        } else {
            let sink = ScrubbingSink::new(self.sink.as_ref(), redactor.secret_values());
            let target = Target {
                descriptor: &descriptor,
                state: request.state,
                desired: &request.desired,
                check_mode: request.check_mode,
                options: &request.options,
                require_found: false,
            };
            let mut outcome = Outcome::default();
            let result = self.execute(&target, &mut outcome, &sink);
            outcome.copy_into(&mut report);
            result
        };

        match result {
            Ok(()) => report.phase = Phase::Reported,
            Err(e) => {
                let sink = ScrubbingSink::new(self.sink.as_ref(), redactor.secret_values());
                sink.warn(&format!("{} failed: {e}", descriptor.kind));
                report.fail(&e);
            }
        }
        report.redact(&redactor)
    }

    /// Reconcile several documents on a pool of `jobs` threads.
    ///
    /// Reports come back in request order. Documents naming the same
    /// resource are serialized by the identity locks.
    pub fn reconcile_many(&self, requests: Vec<ReconcileRequest>, jobs: usize) -> Vec<ReconcileReport> {
        if jobs <= 1 || requests.len() <= 1 {
            return requests.into_iter().map(|r| self.reconcile(r)).collect();
        }
        match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
            Ok(pool) => pool.install(|| requests.into_par_iter().map(|r| self.reconcile(r)).collect()),
            Err(e) => {
                self.sink
                    .warn(&format!("thread pool unavailable ({e}), running sequentially"));
                requests.into_iter().map(|r| self.reconcile(r)).collect()
            }
        }
    }

    /// Run the state machine for one descriptor.
    pub(crate) fn execute(&self, target: &Target<'_>, out: &mut Outcome, sink: &dyn LogSink) -> Result<()> {
        let descriptor = target.descriptor;
        planner::validate(descriptor, target.state, target.desired)?;
        let rotate = planner::rotation(descriptor, target.desired, &target.options.force_rotate)?;
        let fields = planner::fields_of(target.desired);
        let label = format!("{} {}", descriptor.kind, descriptor.identity_label(&fields));
        out.phase = Phase::Validated;

        let _guard = self
            .locks
            .acquire(format!("{}:{}", descriptor.kind, descriptor.identity_key(&fields)));

        let remote = fetch::fetch(self.transport.as_ref(), descriptor, &fields, sink)?;
        out.phase = Phase::Fetched;
        sink.debug(&format!(
            "{label}: {}",
            if remote.is_some() { "found" } else { "not found" }
        ));

        if target.state == DesiredState::Query {
            out.phase = Phase::Decided;
            return match remote {
                Some(found) => {
                    out.msg = format!("{label} found");
                    out.response = Some(found.raw.clone());
                    out.remote = Some(found);
                    Ok(())
                }
                None if target.require_found => Err(ReconcileError::NotFound {
                    kind: descriptor.kind.clone(),
                    identity: descriptor.identity_label(&fields),
                }),
                None => {
                    out.msg = format!("{label} not found");
                    Ok(())
                }
            };
        }

        let decision = diff::compute(
            descriptor,
            target.state,
            &fields,
            remote.as_ref().map(|r| &r.canonical),
            &rotate,
        );
        if !decision.unwritable.is_empty() {
            sink.warn(&format!(
                "{label}: cannot change {} after creation, ignoring",
                decision.unwritable.join(", ")
            ));
        }
        out.phase = Phase::Decided;

        let request = match (&decision.outcome, &remote) {
            (DiffOutcome::Equal, _) => {
                out.msg = if target.state == DesiredState::Absent {
                    format!("{label} already absent")
                } else {
                    format!("{label} already in desired state")
                };
                out.response = remote.as_ref().map(|r| r.raw.clone());
                out.remote = remote.clone();
                return Ok(());
            }
            (DiffOutcome::CreateRequired, _) => {
                out.action = Action::Create;
                out.diff = Some(DiffRecord::created(&fields));
                planner::create_request(descriptor, &fields)?
            }
            (DiffOutcome::UpdateRequired(patch), Some(current)) => {
                out.action = Action::Update;
                out.diff = Some(DiffRecord::updated(&patch.changes));
                planner::update_request(descriptor, &fields, patch, &current.raw)?
            }
            (DiffOutcome::DeleteRequired, Some(current)) => {
                out.action = Action::Delete;
                out.diff = Some(DiffRecord::deleted(&current.canonical));
                planner::delete_request(descriptor, &fields, &current.raw)?
            }
            (_, None) => {
                return Err(ReconcileError::validation(format!(
                    "{label}: write decided without a remote object"
                )));
            }
        };

        if target.check_mode {
            out.changed = true;
            out.msg = format!("{label} would {}", out.action.conditional());
            out.response = remote.as_ref().map(|r| r.raw.clone());
            out.remote = remote;
            return Ok(());
        }

        let cancelled = || ReconcileError::CancelledBeforeWrite { label: label.clone() };
        if target.options.cancel.is_cancelled() {
            return Err(cancelled());
        }
        let response = match self.dispatch(&request, sink) {
            Ok(response) => response,
            Err(ReconcileError::Transport(e)) if e.is_conflict() && out.action == Action::Create => {
                if target.options.cancel.is_cancelled() {
                    return Err(cancelled());
                }
                sink.info(&format!("{label}: create conflicted, re-reading"));
                match self.recover_conflict(target, &fields, &rotate, out, sink)? {
                    Some(response) => response,
                    None => return Ok(()),
                }
            }
            Err(e) => return Err(e),
        };
        out.phase = Phase::Dispatched;

        self.await_completion(target, &response, out, sink)?;
        out.changed = true;

        self.verify(target, &fields, out, sink)?;
        out.msg = format!("{label} {}", out.action.past_tense());
        Ok(())
    }

    fn dispatch(&self, request: &Request, sink: &dyn LogSink) -> Result<Response> {
        sink.info(&format!("{} {}", request.method, request.path));
        Ok(self.transport.request(request)?)
    }

    /// Another actor created the object between fetch and create: read it
    /// back once and converge with an update if needed.
    ///
    /// Returns the update response, or `None` when nothing is left to do.
    fn recover_conflict(
        &self,
        target: &Target<'_>,
        fields: &Document,
        rotate: &BTreeSet<String>,
        out: &mut Outcome,
        sink: &dyn LogSink,
    ) -> Result<Option<Response>> {
        let descriptor = target.descriptor;
        let conflict = || ReconcileError::Conflict {
            kind: descriptor.kind.clone(),
            identity: descriptor.identity_label(fields),
        };
        let Some(current) = fetch::fetch(self.transport.as_ref(), descriptor, fields, sink)? else {
            return Err(conflict());
        };
        let decision = diff::compute(descriptor, DesiredState::Present, fields, Some(&current.canonical), rotate);
        match decision.outcome {
            DiffOutcome::Equal => {
                out.action = Action::None;
                out.diff = None;
                out.msg = format!(
                    "{} {} already in desired state (created concurrently)",
                    descriptor.kind,
                    descriptor.identity_label(fields)
                );
                out.response = Some(current.raw.clone());
                out.remote = Some(current);
                Ok(None)
            }
            DiffOutcome::UpdateRequired(patch) => {
                out.action = Action::Update;
                out.diff = Some(DiffRecord::updated(&patch.changes));
                let request = planner::update_request(descriptor, fields, &patch, &current.raw)?;
                match self.dispatch(&request, sink) {
                    Ok(response) => Ok(Some(response)),
                    Err(ReconcileError::Transport(e)) if e.is_conflict() => Err(conflict()),
                    Err(e) => Err(e),
                }
            }
            _ => Err(conflict()),
        }
    }

    fn await_completion(
        &self,
        target: &Target<'_>,
        response: &Response,
        out: &mut Outcome,
        sink: &dyn LogSink,
    ) -> Result<()> {
        let descriptor = target.descriptor;
        let handle = TaskHandle::from_response(&descriptor.completion, response);
        out.response = Some(response.body.clone());
        if handle.is_none() {
            if descriptor.completion != Completion::Synchronous {
                sink.warn(&format!(
                    "{}: write response carried no task handle, treating as synchronous",
                    descriptor.kind
                ));
            }
            return Ok(());
        }

        out.phase = Phase::Awaiting;
        sink.debug(&format!("waiting for {handle}"));
        let config = self.poller.resolve(descriptor.timeout(), target.options);
        let poller = Poller::new(self.transport.as_ref(), self.clock.as_ref(), sink, config);
        match poller.wait(&handle, &target.options.cancel) {
            Ok(status) => {
                if !status.is_null() {
                    out.response = Some(status);
                }
                Ok(())
            }
            Err(e) => {
                if e.kind().leaves_outcome_unknown() {
                    out.changed = true;
                    out.outcome_unknown = true;
                }
                Err(e)
            }
        }
    }

    /// Re-read the object and check the write took effect.
    fn verify(&self, target: &Target<'_>, fields: &Document, out: &mut Outcome, sink: &dyn LogSink) -> Result<()> {
        let descriptor = target.descriptor;
        let mismatch = |fields_left: Vec<String>| ReconcileError::PostconditionMismatch {
            kind: descriptor.kind.clone(),
            identity: descriptor.identity_label(fields),
            fields: fields_left,
        };
        let after = fetch::fetch(self.transport.as_ref(), descriptor, fields, sink)?;

        match (out.action, after) {
            (Action::Delete, None) => {}
            (Action::Delete, Some(_)) => return Err(mismatch(vec!["(still present)".to_string()])),
            (_, None) => return Err(mismatch(vec!["(not found after write)".to_string()])),
            (_, Some(current)) => {
                let check = diff::compute(
                    descriptor,
                    DesiredState::Present,
                    fields,
                    Some(&current.canonical),
                    &BTreeSet::new(),
                );
                if let DiffOutcome::UpdateRequired(patch) = check.outcome {
                    return Err(mismatch(patch.fields()));
                }
                out.response = Some(current.raw.clone());
                out.remote = Some(current);
            }
        }
        out.phase = Phase::Verified;
        Ok(())
    }
}
