//! The call-frame stepper and its public facade. A procedure body is a flat
//! statement list; the frame advances a cursor, and every jump (structured
//! or not) is a cursor assignment. Errors never unwind the Rust stack past a
//! frame boundary: they are wrapped into the frame's error state, offered to
//! the installed handler, and only propagate to the caller when unclaimed.

use std::sync::Arc;

use parking_lot::Mutex;

use ovb_core::{
    codes, ArgumentError, CallArg, Callee, DeclArena, EventId, Expr, ExprKind, LinkError,
    ModuleId, ModuleKind, ParamMode, ProcBody, ProcDecl, ProcId, ResumeKind, RuleCandidate,
    RuntimeError, SourceLocation, StatementKind, Target, TraceFrame, TypeTag,
};

use super::binder::{bind_arguments, reorder_named, Arg};
use super::debug::{DebugHub, FrameSnapshot, LocalSnapshot, StepMode};
use super::frame::{CallFrame, FrameState};
use super::objects::ModuleInstance;
use super::values::{
    as_condition, cast, eval_binary, eval_unary, new_slot, value_to_json, Repr, Slot, Value,
};

/// A host procedure callable from script. Arguments arrive already bound and
/// coerced against the declared parameter list.
pub type NativeFn = Arc<dyn Fn(Vec<Value>) -> Result<Value, RuntimeError> + Send + Sync>;

pub struct NativeProc {
    pub name: String,
    pub func: NativeFn,
}

impl NativeProc {
    pub fn new(name: impl Into<String>, func: NativeFn) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

/// Public entry point. Every external call locks the engine, so outside
/// callers are serialized while script-level recursion runs unimpeded
/// inside the lock.
pub struct Interpreter {
    engine: Mutex<Engine>,
    hub: Arc<DebugHub>,
}

impl Interpreter {
    pub fn new(arena: DeclArena) -> Result<Self, LinkError> {
        Self::with_natives(arena, Vec::new())
    }

    pub fn with_natives(mut arena: DeclArena, natives: Vec<NativeProc>) -> Result<Self, LinkError> {
        arena.link_implements()?;
        let hub = DebugHub::new();
        let mut engine = Engine {
            arena: Arc::new(arena),
            natives,
            instances: Vec::new(),
            stack: Vec::new(),
            hub: hub.clone(),
        };
        // Loading: every standard module gets its singleton up front, so
        // field and static storage exists before the first call.
        let arena = engine.arena.clone();
        for (index, module) in arena.modules.iter().enumerate() {
            if module.kind == ModuleKind::Standard {
                engine.singleton(ModuleId(index));
            }
        }
        Ok(Self {
            engine: Mutex::new(engine),
            hub,
        })
    }

    /// Handle for stepping and stack inspection from a controller thread.
    pub fn debug_hub(&self) -> Arc<DebugHub> {
        self.hub.clone()
    }

    pub fn set_step_mode(&self, mode: StepMode) {
        self.hub.set_step_mode(mode);
    }

    /// Calls a procedure. `instance` is required for class members; standard
    /// module procedures run against their singleton when it is omitted.
    /// Arguments are positional; `Arg::ByRef` opts into caller-visible
    /// mutation of the shared slot.
    pub fn invoke(
        &self,
        instance: Option<Arc<ModuleInstance>>,
        proc: ProcId,
        args: Vec<Arg>,
    ) -> Result<Value, RuntimeError> {
        let args = args.into_iter().map(Some).collect();
        self.engine.lock().call_proc(instance, proc, args, &[])
    }

    /// Fans an event out to the publisher's live subscribers, in
    /// subscription order, stopping at the first handler failure.
    pub fn raise_event(
        &self,
        publisher: &Arc<ModuleInstance>,
        event: EventId,
        args: Vec<Value>,
    ) -> Result<(), RuntimeError> {
        self.engine.lock().raise_event_inner(publisher, event, args)
    }

    /// Creates a class instance, wiring its hidden base object and firing
    /// Initialize before the instance is handed out.
    pub fn new_instance(&self, module: ModuleId) -> Result<Arc<ModuleInstance>, RuntimeError> {
        self.engine.lock().new_instance_inner(module)
    }

    /// The singleton backing a standard module, created on first use.
    /// Returns `None` for class modules.
    pub fn module_instance(&self, module: ModuleId) -> Option<Arc<ModuleInstance>> {
        let mut engine = self.engine.lock();
        match engine.arena.module(module).kind {
            ModuleKind::Standard => Some(engine.singleton(module)),
            ModuleKind::Class => None,
        }
    }

    /// Gives an instance back to the engine. When the caller held the last
    /// strong reference this fires Class_Terminate before the drop.
    pub fn release_instance(&self, instance: Arc<ModuleInstance>) -> Result<(), RuntimeError> {
        self.engine.lock().release_instance_inner(instance)
    }
}

/// Where control goes after a statement executes.
#[derive(PartialEq)]
enum Flow {
    Normal,
    Exit,
}

struct StackEntry {
    module: String,
    proc: String,
    statement: usize,
    locals: Vec<(String, Slot)>,
}

struct Engine {
    arena: Arc<DeclArena>,
    natives: Vec<NativeProc>,
    /// Standard-module singletons, indexed by module id.
    instances: Vec<Option<Arc<ModuleInstance>>>,
    /// Live activation records, outermost first, mirrored for snapshots.
    stack: Vec<StackEntry>,
    hub: Arc<DebugHub>,
}

impl Engine {
    fn singleton(&mut self, module: ModuleId) -> Arc<ModuleInstance> {
        if self.instances.len() <= module.0 {
            self.instances.resize(module.0 + 1, None);
        }
        if let Some(instance) = &self.instances[module.0] {
            return instance.clone();
        }
        let instance = ModuleInstance::new(&self.arena, module);
        self.instances[module.0] = Some(instance.clone());
        instance
    }

    /// Dispatches one call to whichever body shape the procedure has.
    /// `arg_locs` maps binding failures back to argument expressions; it is
    /// empty for calls arriving from outside the engine.
    fn call_proc(
        &mut self,
        instance: Option<Arc<ModuleInstance>>,
        proc: ProcId,
        args: Vec<Option<Arg>>,
        arg_locs: &[Option<SourceLocation>],
    ) -> Result<Value, RuntimeError> {
        let arena = self.arena.clone();
        let decl = arena.proc(proc);
        match &decl.body {
            ProcBody::Script(_) => {
                let bound = bind_arguments(&decl.params, args)
                    .map_err(|err| argument_failure(err, arg_locs))?;
                self.run_script(instance, proc, bound)
            }
            ProcBody::Rules(candidates) => self.dispatch_rules(instance, candidates, args),
            ProcBody::Native(native) => {
                let bound = bind_arguments(&decl.params, args)
                    .map_err(|err| argument_failure(err, arg_locs))?;
                let values = bound.iter().map(|slot| slot.lock().clone()).collect();
                let func = self
                    .natives
                    .get(native.0)
                    .ok_or_else(|| RuntimeError::new(codes::INVALID_PROCEDURE_CALL))?
                    .func
                    .clone();
                func(values)
            }
        }
    }

    /// Tries candidates in declaration order: the arguments must bind against
    /// the candidate's parameters and its guard (if any) must accept. The
    /// first accepting candidate runs. A binding failure only rejects the
    /// candidate; a guard failure aborts the whole dispatch.
    fn dispatch_rules(
        &mut self,
        instance: Option<Arc<ModuleInstance>>,
        candidates: &[RuleCandidate],
        args: Vec<Option<Arg>>,
    ) -> Result<Value, RuntimeError> {
        let arena = self.arena.clone();
        for candidate in candidates {
            let body = arena.proc(candidate.body);
            let Ok(bound) = bind_arguments(&body.params, args.clone()) else {
                continue;
            };
            if let Some(guard) = &candidate.guard {
                let locals = frame_locals(body, bound.clone());
                let mut probe = CallFrame::new(instance.clone(), candidate.body, locals);
                let verdict = self
                    .eval_expr(&mut probe, guard)
                    .and_then(|value| as_condition(&value))
                    .map_err(|err| {
                        // Guard failures surface at the call site, wrapping
                        // the underlying error.
                        RuntimeError::with_message(
                            err.code,
                            format!("rule guard failed: {}", err.message),
                        )
                        .caused_by(err)
                    })?;
                if !verdict {
                    continue;
                }
            }
            return self.run_script(instance, candidate.body, bound);
        }
        let error = RuntimeError::new(codes::NO_MATCHING_RULE);
        Err(match candidates.last() {
            Some(last) => error.attribute(last.guard_loc),
            None => error,
        })
    }

    /// The stepper: runs one frame to completion. Statement dispatch, the
    /// error-handler jump, and Resume bookkeeping all live here.
    fn run_script(
        &mut self,
        instance: Option<Arc<ModuleInstance>>,
        proc: ProcId,
        params: Vec<Slot>,
    ) -> Result<Value, RuntimeError> {
        let arena = self.arena.clone();
        let decl = arena.proc(proc);
        let instance = match instance {
            Some(instance) => instance,
            None => match arena.module(decl.module).kind {
                ModuleKind::Standard => self.singleton(decl.module),
                ModuleKind::Class => {
                    return Err(RuntimeError::new(codes::OBJECT_VARIABLE_NOT_SET))
                }
            },
        };

        let locals = frame_locals(decl, params);
        let names = decl
            .params
            .iter()
            .map(|param| param.name.clone())
            .chain(decl.locals.iter().map(|var| var.name.clone()));
        let mut frame = CallFrame::new(Some(instance), proc, locals);
        frame.state = FrameState::Running;
        self.stack.push(StackEntry {
            module: arena.module(decl.module).name.clone(),
            proc: decl.name.clone(),
            statement: 0,
            locals: names.zip(frame.locals.iter().cloned()).collect(),
        });

        let statements = decl.statements();
        while frame.cursor < statements.len() {
            frame.statement_index = frame.cursor;
            frame.cursor += 1;
            if let Some(entry) = self.stack.last_mut() {
                entry.statement = frame.statement_index;
            }
            if self.hub.should_stop(self.stack.len()) {
                frame.state = FrameState::Suspended;
                self.hub.stop(self.snapshot_stack());
                frame.state = FrameState::Running;
            }

            let statement = &statements[frame.statement_index];
            match self.exec_statement(&mut frame, &statement.kind) {
                Ok(Flow::Normal) => {}
                Ok(Flow::Exit) => break,
                Err(err) => {
                    let mut err = err.attribute(statement.loc);
                    err.capture_trace(self.trace());
                    frame.error.wrap(err, frame.statement_index);
                }
            }

            if frame.error.active() {
                match frame.handler {
                    Some(handler) if !frame.error.in_handler => {
                        frame.error.mark_handled();
                        frame.error.in_handler = true;
                        frame.cursor = handler;
                    }
                    _ => {
                        frame.state = FrameState::Failed;
                        break;
                    }
                }
            }
        }
        self.stack.pop();

        if frame.state == FrameState::Failed {
            return Err(frame
                .error
                .take()
                .unwrap_or_else(|| RuntimeError::new(codes::INTERNAL_ERROR)));
        }
        frame.state = FrameState::Completed;
        match decl.result {
            Some(index) => {
                let slot = frame.local(index)?;
                let value = slot.lock().clone();
                Ok(value)
            }
            None => Ok(Value::empty()),
        }
    }

    fn exec_statement(
        &mut self,
        frame: &mut CallFrame,
        kind: &StatementKind,
    ) -> Result<Flow, RuntimeError> {
        match kind {
            StatementKind::Assign { target, expr } => {
                let value = self.eval_expr(frame, expr)?;
                self.store(frame, *target, value)?;
            }
            StatementKind::Call { callee, args } => {
                self.prepare_and_call(frame, callee, args)?;
            }
            StatementKind::IfGoto { cond, target } => {
                let value = self.eval_expr(frame, cond)?;
                if as_condition(&value)? {
                    frame.cursor = *target;
                }
            }
            StatementKind::Goto { target } => frame.cursor = *target,
            StatementKind::GoSub { target } => {
                frame.gosub_stack.push(frame.cursor);
                frame.cursor = *target;
            }
            StatementKind::ReturnSub => {
                frame.cursor = frame
                    .gosub_stack
                    .pop()
                    .ok_or_else(|| RuntimeError::new(codes::RETURN_WITHOUT_GOSUB))?;
            }
            StatementKind::OnError { handler } => frame.install_handler(*handler),
            StatementKind::Resume { kind } => {
                if !frame.error.claimed() {
                    return Err(RuntimeError::new(codes::RESUME_WITHOUT_ERROR));
                }
                let resume_point = frame.error.resume_point();
                frame.error.clear();
                frame.cursor = match kind {
                    ResumeKind::Same => resume_point,
                    ResumeKind::Next => resume_point + 1,
                    ResumeKind::Label(target) => *target,
                };
            }
            StatementKind::RaiseError { code } => {
                let value = self.eval_expr(frame, code)?;
                let code = match cast(&value, TypeTag::Long)?.repr {
                    Repr::Long(v) if v > 0 => v as u32,
                    _ => return Err(RuntimeError::new(codes::INVALID_PROCEDURE_CALL)),
                };
                return Err(RuntimeError::new(code));
            }
            StatementKind::RaiseEvent { event, args } => {
                let publisher = frame
                    .instance
                    .clone()
                    .ok_or_else(|| RuntimeError::new(codes::OBJECT_VARIABLE_NOT_SET))?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expr(frame, arg)?);
                }
                self.raise_event_inner(&publisher, *event, values)?;
            }
            StatementKind::ExitProc => return Ok(Flow::Exit),
        }
        Ok(Flow::Normal)
    }

    fn eval_expr(&mut self, frame: &mut CallFrame, expr: &Expr) -> Result<Value, RuntimeError> {
        let value = match &expr.kind {
            ExprKind::Literal(literal) => Value::from_literal(literal),
            ExprKind::Local(index) => {
                let slot = frame.local(*index)?;
                let value = slot.lock().clone();
                value
            }
            ExprKind::Field { target, index } => {
                let instance = match target {
                    Some(target) => {
                        let value = self.eval_expr(frame, target)?;
                        expect_instance(&value)?
                    }
                    None => frame
                        .instance
                        .clone()
                        .ok_or_else(|| RuntimeError::new(codes::OBJECT_VARIABLE_NOT_SET))?,
                };
                let slot = instance.field(*index);
                let value = slot.lock().clone();
                value
            }
            ExprKind::Static(index) => {
                let instance = frame
                    .instance
                    .clone()
                    .ok_or_else(|| RuntimeError::new(codes::OBJECT_VARIABLE_NOT_SET))?;
                let slot = instance.static_slot(*index);
                let value = slot.lock().clone();
                value
            }
            ExprKind::MeRef => frame
                .instance
                .clone()
                .map(Value::object)
                .ok_or_else(|| RuntimeError::new(codes::OBJECT_VARIABLE_NOT_SET))?,
            ExprKind::Unary { op, operand } => {
                let value = self.eval_expr(frame, operand)?;
                eval_unary(*op, &value).map_err(|err| err.attribute(expr.loc))?
            }
            ExprKind::Binary { op, left, right } => {
                // Both sides always evaluate; And/Or do not short-circuit.
                let l = self.eval_expr(frame, left)?;
                let r = self.eval_expr(frame, right)?;
                eval_binary(*op, &l, &r).map_err(|err| err.attribute(expr.loc))?
            }
            ExprKind::Invoke { callee, args } => self.prepare_and_call(frame, callee, args)?,
            ExprKind::New(module) => Value::object(self.new_instance_inner(*module)?),
            ExprKind::Index { target, index } => {
                let value = self.eval_expr(frame, target)?;
                let position = match cast(&self.eval_expr(frame, index)?, TypeTag::Long)?.repr {
                    Repr::Long(v) => v,
                    _ => return Err(RuntimeError::new(codes::TYPE_MISMATCH)),
                };
                match &value.repr {
                    Repr::Array(items) => usize::try_from(position)
                        .ok()
                        .and_then(|i| items.get(i).cloned())
                        .ok_or_else(|| RuntimeError::new(codes::SUBSCRIPT_OUT_OF_RANGE))?,
                    Repr::Null => return Err(RuntimeError::new(codes::INVALID_USE_OF_NULL)),
                    _ => return Err(RuntimeError::new(codes::TYPE_MISMATCH)),
                }
            }
            ExprKind::IsMissing(index) => {
                let slot = frame.local(*index)?;
                let missing = slot.lock().is_missing();
                Value::bool(missing)
            }
        };
        Ok(value)
    }

    /// Resolves the callee, reorders named arguments against its parameter
    /// list, prepares each argument (sharing the caller's slot where a plain
    /// variable meets a by-ref parameter), and calls.
    fn prepare_and_call(
        &mut self,
        frame: &mut CallFrame,
        callee: &Callee,
        args: &[CallArg],
    ) -> Result<Value, RuntimeError> {
        let arena = self.arena.clone();
        let (instance, proc) = match callee {
            Callee::Proc(proc) => {
                let owner = arena.proc(*proc).module;
                let instance = match &frame.instance {
                    Some(current) if current.module() == owner => Some(current.clone()),
                    _ => None,
                };
                (instance, *proc)
            }
            Callee::Method { target, proc } => {
                let value = self.eval_expr(frame, target)?;
                let instance = expect_instance(&value)?;
                let declared = arena.proc(*proc);
                let resolved = if instance.module() == declared.module {
                    *proc
                } else {
                    // Late-bound: re-resolve by name on the live instance.
                    arena
                        .find_proc(instance.module(), &declared.name)
                        .ok_or_else(|| {
                            member_not_supported(instance.module_name(), &declared.name)
                        })?
                };
                (Some(instance), resolved)
            }
            Callee::Interface {
                target,
                interface,
                proc,
            } => {
                let value = self.eval_expr(frame, target)?;
                let instance = expect_instance(&value)?;
                // An instance of the interface class itself owns the member
                // directly; forwarding is only for implementors.
                let resolved = if instance.module() == *interface {
                    *proc
                } else {
                    arena
                        .forward_interface(instance.module(), *interface, *proc)
                        .ok_or_else(|| {
                            member_not_supported(instance.module_name(), &arena.proc(*proc).name)
                        })?
                };
                (Some(instance), resolved)
            }
        };

        let params = &arena.proc(proc).params;
        let ordered = reorder_named(
            params,
            args.iter().map(|arg| (arg.name.clone(), arg)).collect(),
        )?;

        let mut prepared = Vec::with_capacity(ordered.len());
        let mut locs = Vec::with_capacity(ordered.len());
        for (position, entry) in ordered.into_iter().enumerate() {
            match entry {
                Some(arg) => {
                    let by_ref = params
                        .get(position)
                        .map(|param| param.mode == ParamMode::ByRef && !param.param_array)
                        .unwrap_or(false);
                    let value = match slot_for(frame, &arg.expr) {
                        Some(slot) if by_ref => Arg::ByRef(slot),
                        _ => Arg::ByVal(self.eval_expr(frame, &arg.expr)?),
                    };
                    prepared.push(Some(value));
                    locs.push(Some(arg.expr.loc));
                }
                None => {
                    prepared.push(None);
                    locs.push(None);
                }
            }
        }

        self.call_proc(instance, proc, prepared, &locs)
    }

    /// Ordered fan-out to every live subscriber; the first handler failure
    /// stops delivery and surfaces to the raiser.
    fn raise_event_inner(
        &mut self,
        publisher: &Arc<ModuleInstance>,
        event: EventId,
        args: Vec<Value>,
    ) -> Result<(), RuntimeError> {
        for (subscriber, handler) in publisher.subscriptions_for(event) {
            let prepared = args
                .iter()
                .map(|value| Some(Arg::ByVal(value.clone())))
                .collect();
            self.call_proc(Some(subscriber), handler, prepared, &[])?;
        }
        Ok(())
    }

    fn store(
        &mut self,
        frame: &mut CallFrame,
        target: Target,
        value: Value,
    ) -> Result<(), RuntimeError> {
        match target {
            Target::Local(index) => {
                let slot = frame.local(index)?;
                let old = store_in_slot(&slot, value)?;
                self.release_value(old)?;
            }
            Target::Static(index) => {
                let instance = frame
                    .instance
                    .clone()
                    .ok_or_else(|| RuntimeError::new(codes::OBJECT_VARIABLE_NOT_SET))?;
                let slot = instance.static_slot(index);
                let old = store_in_slot(&slot, value)?;
                self.release_value(old)?;
            }
            Target::Field(index) => {
                let instance = frame
                    .instance
                    .clone()
                    .ok_or_else(|| RuntimeError::new(codes::OBJECT_VARIABLE_NOT_SET))?;
                let arena = self.arena.clone();
                let var = &arena.module(instance.module()).fields[index];
                let slot = instance.field(index);
                let old = store_in_slot(&slot, value)?;
                if var.with_events {
                    if let Some(old_publisher) = old.as_instance() {
                        old_publisher.remove_event_listener(&instance);
                    }
                    let new_publisher = {
                        let cell = slot.lock();
                        cell.as_instance().cloned()
                    };
                    if let Some(new_publisher) = new_publisher {
                        new_publisher.bind_event_handlers(&arena, &var.name, &instance);
                    }
                }
                self.release_value(old)?;
            }
        }
        Ok(())
    }

    /// Class instantiation: auto-instancing members (the hidden base object
    /// included) come up first, then Initialize fires on the base publisher.
    fn new_instance_inner(&mut self, module: ModuleId) -> Result<Arc<ModuleInstance>, RuntimeError> {
        let arena = self.arena.clone();
        let decl = arena.module(module);
        if decl.kind == ModuleKind::Standard {
            return Ok(self.singleton(module));
        }
        let instance = ModuleInstance::new(&arena, module);

        for (index, var) in decl.fields.iter().enumerate() {
            if !var.with_new {
                continue;
            }
            let Some(class) = var.class else { continue };
            let member = self.new_instance_inner(class)?;
            let slot = instance.field(index);
            *slot.lock() = Value::object(member.clone());
            if var.with_events {
                member.bind_event_handlers(&arena, &var.name, &instance);
            }
        }

        if let (Some(base_field), Some(initialize)) = (decl.base_field, arena.base_initialize()) {
            let base = {
                let slot = instance.field(base_field);
                let cell = slot.lock();
                cell.as_instance().cloned()
            };
            if let Some(base) = base {
                self.raise_event_inner(&base, initialize, Vec::new())?;
            }
        }
        Ok(instance)
    }

    fn release_value(&mut self, value: Value) -> Result<(), RuntimeError> {
        if let Repr::Object(instance) = value.repr {
            self.release_instance_inner(instance)?;
        }
        Ok(())
    }

    /// Fires Class_Terminate when the engine holds the last strong reference
    /// to a released instance, then lets it drop.
    fn release_instance_inner(
        &mut self,
        instance: Arc<ModuleInstance>,
    ) -> Result<(), RuntimeError> {
        if Arc::strong_count(&instance) == 1 {
            let arena = self.arena.clone();
            let decl = arena.module(instance.module());
            if let (Some(base_field), Some(terminate)) = (decl.base_field, arena.base_terminate())
            {
                let base = {
                    let slot = instance.field(base_field);
                    let cell = slot.lock();
                    cell.as_instance().cloned()
                };
                if let Some(base) = base {
                    self.raise_event_inner(&base, terminate, Vec::new())?;
                }
            }
        }
        Ok(())
    }

    fn snapshot_stack(&self) -> Vec<FrameSnapshot> {
        self.stack
            .iter()
            .map(|entry| FrameSnapshot {
                module: entry.module.clone(),
                proc: entry.proc.clone(),
                statement: entry.statement,
                locals: entry
                    .locals
                    .iter()
                    .map(|(name, slot)| LocalSnapshot {
                        name: name.clone(),
                        value: value_to_json(&slot.lock()),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Innermost frame first.
    fn trace(&self) -> Vec<TraceFrame> {
        self.stack
            .iter()
            .rev()
            .map(|entry| TraceFrame {
                module: entry.module.clone(),
                proc: entry.proc.clone(),
                statement: entry.statement,
            })
            .collect()
    }
}

/// Parameter slots first, then fresh cells for the declared locals.
fn frame_locals(decl: &ProcDecl, params: Vec<Slot>) -> Vec<Slot> {
    let mut locals = params;
    locals.extend(
        decl.locals
            .iter()
            .map(|var| new_slot(Value::default_for(var.tag))),
    );
    locals
}

/// The caller's storage cell for a plain variable expression, if the
/// argument is one. Anything else passes by value regardless of the
/// parameter's declared mode.
fn slot_for(frame: &CallFrame, expr: &Expr) -> Option<Slot> {
    match &expr.kind {
        ExprKind::Local(index) => frame.local(*index).ok(),
        ExprKind::Field {
            target: None,
            index,
        } => frame.instance.as_ref().map(|i| i.field(*index)),
        ExprKind::Static(index) => frame.instance.as_ref().map(|i| i.static_slot(*index)),
        _ => None,
    }
}

/// Replaces the cell's content, coercing to the cell's declared type, and
/// hands back the previous value for release bookkeeping.
fn store_in_slot(slot: &Slot, value: Value) -> Result<Value, RuntimeError> {
    let mut cell = slot.lock();
    let converted = cast(&value, cell.declared)?;
    Ok(std::mem::replace(&mut *cell, converted))
}

fn expect_instance(value: &Value) -> Result<Arc<ModuleInstance>, RuntimeError> {
    match value.as_instance() {
        Some(instance) => Ok(instance.clone()),
        None if value.is_object() => Err(RuntimeError::new(codes::OBJECT_VARIABLE_NOT_SET)),
        None => Err(RuntimeError::new(codes::TYPE_MISMATCH)),
    }
}

fn member_not_supported(module: &str, member: &str) -> RuntimeError {
    RuntimeError::with_message(
        codes::MEMBER_NOT_SUPPORTED,
        format!("{module} does not support member {member}"),
    )
}

/// Maps a binding failure back to the failing argument's source position.
fn argument_failure(err: ArgumentError, locs: &[Option<SourceLocation>]) -> RuntimeError {
    let ArgumentError { index, mut cause } = err;
    cause.message = format!("argument {}: {}", index + 1, cause.message);
    match locs.get(index).copied().flatten() {
        Some(loc) => cause.relocate(loc),
        None => cause,
    }
}
