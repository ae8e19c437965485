//! The composition root: one request in, one envelope out.
//!
//! Pipeline per request:
//!
//! 1. Resolve the method (registry, then built-ins); unknown names get
//!    `METHOD_NOT_FOUND` and a search suggestion
//! 2. Lift control fields out of params and normalize the rest
//! 3. Check caller expectations against the live host
//! 4. High-risk writes: dry-run issues a token, real runs must present one
//! 5. Idempotency replay or conflict
//! 6. Invoke the handler, inside a transaction for writes; panics are caught
//! 7. Wrap the result, attach timings and context, record for idempotency
//!
//! Every stage returns an envelope; nothing propagates as a panic or error.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cadbridge_commands::{CommandMeta, CommandRegistry, RegisteredCommand, normalize};
use cadbridge_core::constants::CONTEXT_TOKEN_VERSION;
use cadbridge_core::errors::{
    CommandError, DRY_RUN, IDEMPOTENCY_KEY_CONFLICT, INTERNAL_ERROR, METHOD_NOT_FOUND,
};
use cadbridge_core::host::{DirectScope, HostDocument};
use cadbridge_core::ids::RequestId;
use cadbridge_core::request::{CommandRequest, Expectations, split_controls};
use cadbridge_guards::{
    ConfirmationTokenService, FailurePolicy, IdempotencyStore, Lookup, SelectionCache,
    TransactionGuard, TransactionReport, check_expectations, context_token, fingerprint,
};
use cadbridge_settings::EngineSettings;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument};

use crate::builtins;
use crate::envelope::{ResultEnvelope, Timings};

/// One call as received from a transport.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteCall {
    /// Method name as sent.
    pub method: String,
    /// Raw parameters; control fields may be embedded.
    #[serde(default)]
    pub params: Value,
    /// Token from a previous dry-run.
    #[serde(default)]
    pub confirm_token: Option<String>,
    /// Client retry key.
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// Preview only.
    #[serde(default)]
    pub dry_run: bool,
    /// Explicit expectations; params-embedded ones fill the gaps.
    #[serde(default)]
    pub expectations: Option<Expectations>,
}

impl ExecuteCall {
    /// Call with `params` and no controls.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            ..Self::default()
        }
    }

    /// Attach a confirmation token.
    #[must_use]
    pub fn with_confirm_token(mut self, token: impl Into<String>) -> Self {
        self.confirm_token = Some(token.into());
        self
    }

    /// Attach an idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Mark as dry-run.
    #[must_use]
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Attach expectations.
    #[must_use]
    pub fn with_expectations(mut self, expectations: Expectations) -> Self {
        self.expectations = Some(expectations);
        self
    }
}

enum Target<'a> {
    Command(&'a RegisteredCommand),
    Builtin(&'static str),
}

/// What the checked stages produced.
enum Checked {
    /// Envelope from a check, a built-in, or the handler. `claimed` is set
    /// when the request's idempotency key was reserved for this call.
    Ran {
        envelope: ResultEnvelope,
        claimed: bool,
    },
    /// Stored response for a repeated idempotency key, returned as recorded.
    Replayed(ResultEnvelope),
}

/// Routes calls through the safety pipeline to handlers.
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    confirmations: ConfirmationTokenService,
    idempotency: IdempotencyStore,
    selection: Arc<SelectionCache>,
    slice_budget: Duration,
}

impl Dispatcher {
    /// Dispatcher over `registry` configured from `settings`.
    pub fn new(registry: Arc<CommandRegistry>, settings: &EngineSettings) -> Self {
        Self {
            registry,
            confirmations: ConfirmationTokenService::new(Duration::from_secs(
                settings.confirmation.ttl_secs,
            )),
            idempotency: IdempotencyStore::new(),
            selection: Arc::new(SelectionCache::new()),
            slice_budget: Duration::from_millis(settings.transaction.slice_budget_ms),
        }
    }

    /// Share a selection cache that handlers also hold.
    #[must_use]
    pub fn with_selection_cache(mut self, selection: Arc<SelectionCache>) -> Self {
        self.selection = selection;
        self
    }

    /// Command registry.
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Selection cache fed by host notifications.
    pub fn selection(&self) -> Arc<SelectionCache> {
        Arc::clone(&self.selection)
    }

    /// Confirmation service.
    pub fn confirmations(&self) -> &ConfirmationTokenService {
        &self.confirmations
    }

    /// Idempotency store.
    pub fn idempotency(&self) -> &IdempotencyStore {
        &self.idempotency
    }

    /// Every command, built-ins included, sorted by name.
    pub fn list_commands(&self) -> Vec<CommandMeta> {
        builtins::all_commands(&self.registry)
    }

    /// Run one call against `host`. `queue_wait` is reported in timings.
    #[instrument(skip_all, fields(method = %call.method))]
    pub fn execute(
        &self,
        host: &mut dyn HostDocument,
        call: ExecuteCall,
        queue_wait: Duration,
    ) -> ResultEnvelope {
        let started = Instant::now();
        let raw_method = call.method.trim().to_owned();

        let target = match self.registry.resolve(&raw_method) {
            Some(cmd) => Target::Command(cmd),
            None => match builtins::resolve(&raw_method) {
                Some(name) => Target::Builtin(name),
                None => {
                    let envelope = ResultEnvelope::error(
                        METHOD_NOT_FOUND,
                        format!("unknown command '{raw_method}'"),
                        None,
                    )
                    .with_next_action(builtins::search_action(&raw_method));
                    return self.finish(host, envelope, &raw_method, started, started, queue_wait);
                }
            },
        };
        let canonical = match &target {
            Target::Command(cmd) => cmd.meta.name.clone(),
            Target::Builtin(name) => (*name).to_owned(),
        };

        let (params, controls) = split_controls(call.params);
        let normalized = normalize(&canonical, &params);
        let request = CommandRequest {
            id: RequestId::new(),
            raw_method,
            canonical_method: canonical.clone(),
            params: normalized.params,
            confirm_token: call.confirm_token.or(controls.confirm_token),
            idempotency_key: call.idempotency_key.or(controls.idempotency_key),
            dry_run: call.dry_run || controls.dry_run,
            expectations: call
                .expectations
                .unwrap_or_default()
                .or(controls.expectations),
        };

        debug!(
            request_id = %request.id,
            canonical = %canonical,
            issues = normalized.issues.len(),
            "request normalized"
        );

        let mut warnings: Vec<String> = normalized
            .issues
            .iter()
            .filter(|i| i.is_advisory())
            .map(|i| match i.path.as_str() {
                "" => format!("params: {}", i.detail),
                path => format!("params.{path}: {}", i.detail),
            })
            .collect();
        let issues = if normalized.issues.is_empty() {
            None
        } else {
            Some(json!(normalized.issues))
        };

        let exec_started = Instant::now();
        let (mut envelope, claimed) = match self.run_checked(host, &target, &request, &mut warnings) {
            Checked::Replayed(envelope) => {
                return self.finish(host, envelope, &canonical, started, exec_started, queue_wait);
            }
            Checked::Ran { envelope, claimed } => (envelope, claimed),
        };
        for warning in warnings {
            envelope.push_warning(warning);
        }
        if let Some(issues) = issues {
            let _ = envelope.context.extra.insert("paramIssues".into(), issues);
        }
        let envelope = self.finish(host, envelope, &canonical, started, exec_started, queue_wait);

        if let Some(key) = request.idempotency_key.as_deref().filter(|_| claimed) {
            if envelope.ok {
                let _ = self.idempotency.complete(key, envelope.to_value());
            } else {
                self.idempotency.release(key);
            }
        }
        envelope
    }

    /// Stages 3 to 6.
    fn run_checked(
        &self,
        host: &mut dyn HostDocument,
        target: &Target<'_>,
        request: &CommandRequest,
        warnings: &mut Vec<String>,
    ) -> Checked {
        let ran = |envelope| Checked::Ran {
            envelope,
            claimed: false,
        };
        if let Err(e) = check_expectations(host, &request.expectations) {
            return ran(ResultEnvelope::error(e.code(), e.to_string(), Some(e.details())));
        }

        let cmd = match target {
            Target::Builtin(name) => return ran(builtins::run(name, &self.registry, host, request)),
            Target::Command(cmd) => *cmd,
        };
        let method = &request.canonical_method;

        if request.dry_run {
            return ran(self.dry_run(host, cmd, request));
        }
        if cmd.meta.requires_confirmation() {
            let document_key = document_key(host);
            let fp = fingerprint(&document_key, &request.params);
            if let Err(e) = self.confirmations.validate(
                request.confirm_token.as_deref(),
                method,
                &document_key,
                &fp,
            ) {
                return ran(
                    ResultEnvelope::error(e.code(), e.to_string(), Some(json!({ "reason": e.reason() })))
                        .with_next_action(json!({ "method": method, "params": { "dryRun": true } })),
                );
            }
        }

        let claimed = match request.idempotency_key.as_deref() {
            None => false,
            Some(key) => match self.idempotency.reserve(key, method) {
                Lookup::Miss => true,
                Lookup::Replay(stored) => {
                    let mut envelope = ResultEnvelope::from_raw(stored);
                    envelope.timings = Timings::default();
                    let _ = envelope.context.extra.insert("idempotentReplay".into(), json!(true));
                    return Checked::Replayed(envelope);
                }
                Lookup::InFlight => {
                    return ran(ResultEnvelope::error(
                        IDEMPOTENCY_KEY_CONFLICT,
                        format!("a call with idempotency key '{key}' is still running"),
                        Some(json!({ "storedMethod": method, "inFlight": true })),
                    ));
                }
                Lookup::Conflict { stored_method } => {
                    return ran(ResultEnvelope::error(
                        IDEMPOTENCY_KEY_CONFLICT,
                        format!("idempotency key already used for '{stored_method}'"),
                        Some(json!({ "storedMethod": stored_method })),
                    ));
                }
            },
        };

        let envelope = match catch_unwind(AssertUnwindSafe(|| self.invoke(host, cmd, request))) {
            Ok(Ok((value, report))) => {
                let mut envelope = ResultEnvelope::from_raw(value);
                if let Some(report) = report {
                    envelope.timings.transaction_ms = Some(report.transaction_ms);
                    warnings.extend(report.warnings());
                }
                envelope
            }
            Ok(Err(e)) => ResultEnvelope::error(e.code(), e.to_string(), e.details()),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(method = %method, panic = %message, "handler panicked");
                ResultEnvelope::error(INTERNAL_ERROR, format!("internal error: {message}"), None)
            }
        };
        Checked::Ran { envelope, claimed }
    }

    fn invoke(
        &self,
        host: &mut dyn HostDocument,
        cmd: &RegisteredCommand,
        request: &CommandRequest,
    ) -> Result<(Value, Option<TransactionReport>), CommandError> {
        if cmd.meta.is_write() {
            let guard = TransactionGuard::new(
                self.slice_budget,
                FailurePolicy::from_codes(&cmd.meta.failure_whitelist),
            );
            let (value, report) =
                guard.run(host, &cmd.meta.name, |scope| cmd.handler.execute(scope, request))?;
            Ok((value, Some(report)))
        } else {
            let mut scope = DirectScope::new(host);
            Ok((cmd.handler.execute(&mut scope, request)?, None))
        }
    }

    /// Preview without mutating; high-risk writes also get a token.
    fn dry_run(
        &self,
        host: &mut dyn HostDocument,
        cmd: &RegisteredCommand,
        request: &CommandRequest,
    ) -> ResultEnvelope {
        let preview = match catch_unwind(AssertUnwindSafe(|| cmd.handler.preview(host, request))) {
            Ok(Ok(preview)) => preview.unwrap_or(Value::Null),
            Ok(Err(e)) => return ResultEnvelope::error(e.code(), e.to_string(), e.details()),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(method = %cmd.meta.name, panic = %message, "preview panicked");
                return ResultEnvelope::error(INTERNAL_ERROR, format!("internal error: {message}"), None);
            }
        };

        let mut envelope = ResultEnvelope::success(json!({ "preview": preview }));
        envelope.code = DRY_RUN.to_owned();
        if !cmd.meta.requires_confirmation() {
            return envelope.with_msg("dry run: nothing was changed");
        }

        let document_key = document_key(host);
        let fp = fingerprint(&document_key, &request.params);
        let issued = self.confirmations.issue(&cmd.meta.name, &document_key, &fp);
        let msg = format!(
            "dry run: re-send with confirmToken within {}s to execute",
            issued.expires_in_sec
        );
        let mut params = request.params.clone();
        if let Value::Object(map) = &mut params {
            let _ = map.insert("confirmToken".into(), json!(issued.token));
        }
        envelope
            .with_data(json!({
                "confirmToken": issued.token,
                "expiresInSec": issued.expires_in_sec,
                "expiresAt": issued.expires_at,
                "preview": preview,
            }))
            .with_msg(msg)
            .with_next_action(json!({ "method": cmd.meta.name, "params": params }))
    }

    /// Attach context and timings, sort id arrays, and log.
    fn finish(
        &self,
        host: &dyn HostDocument,
        mut envelope: ResultEnvelope,
        method: &str,
        started: Instant,
        exec_started: Instant,
        queue_wait: Duration,
    ) -> ResultEnvelope {
        let document = host.document();
        let view = host.active_view();
        let selection_ids = match (&document, self.selection.current()) {
            (Some(doc), Some(sel)) if sel.document_key == doc.key => sel.element_ids,
            _ => Vec::new(),
        };

        let ctx = &mut envelope.context;
        ctx.method = method.to_owned();
        ctx.context_token = context_token(document.as_ref(), view.as_ref(), &selection_ids);
        ctx.context_token_version = CONTEXT_TOKEN_VERSION.to_owned();
        ctx.document_key = document.as_ref().map(|d| d.key.clone());
        ctx.document_revision = document.as_ref().map(|d| d.revision);
        ctx.active_view_id = view.as_ref().map(|v| v.id);
        ctx.active_view_name = view.map(|v| v.name);

        envelope.fill_timings(
            millis(exec_started.elapsed()),
            millis(queue_wait),
            millis(started.elapsed() + queue_wait),
        );
        envelope.sort_id_arrays();

        info!(
            method,
            code = %envelope.code,
            ok = envelope.ok,
            elapsed_ms = millis(started.elapsed()),
            "request completed"
        );
        envelope
    }
}

fn document_key(host: &dyn HostDocument) -> String {
    host.document().map(|d| d.key).unwrap_or_default()
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_owned())
}
