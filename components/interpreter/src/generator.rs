//! Coroutine machinery: generator state transitions, the await
//! resume path and the async-generator request queue.
//!
//! Suspension freezes the frame inside the coroutine object;
//! resumption consumes a `(received_kind, received_value)` pair and
//! re-enters the dispatch loop at the saved instruction pointer.

use async_runtime as ar;
use core_types::{Completion, ObjectId, PropertyKey, Thrown, Value};
use memory_manager::{
    Agent, AgentErrors, AsyncGenRequest, CoroutineKind, ExecutionContext, GeneratorData, GeneratorState,
    JsObject, ObjectKind, PendingCompletion, Property, ResumeKind,
};
use object_model as om;

use crate::dispatch::{FrameResult, SuspendKind};
use crate::vm::Vm;

/// What one driven step of a coroutine produced.
enum StepOutcome {
    Returned(Value),
    Yielded(Value),
    /// Parked on an await; a resume job will continue it.
    AwaitParked,
    Threw(Value),
}

/// Allocate the coroutine object for a generator call or async body.
/// The object is created before its prototype is resolved so the
/// parked context is reachable if the lookup runs user code.
pub(crate) fn create_coroutine_object(
    vm: &mut Vm,
    func_obj: Option<ObjectId>,
    ctx: ExecutionContext,
    kind: CoroutineKind,
) -> ObjectId {
    let gen = vm.heap.alloc_object(JsObject::with_kind(
        None,
        ObjectKind::Generator(GeneratorData::new(kind, ctx)),
    ));
    if kind == CoroutineKind::AsyncFunction {
        return gen;
    }
    let mark = vm.heap.root_mark();
    vm.heap.roots.push(Value::Object(gen));
    let default = match kind {
        CoroutineKind::Generator => vm.realm.intrinsics.generator_prototype,
        _ => vm.realm.intrinsics.async_generator_prototype,
    };
    let from_func = func_obj.and_then(|f| {
        om::get(
            vm,
            f,
            &PropertyKey::from_str("prototype"),
            &Value::Object(f),
        )
        .ok()
        .and_then(|p| p.as_object())
    });
    vm.heap.object_mut(gen).prototype = Some(from_func.unwrap_or(default));
    vm.heap.root_release(mark);
    gen
}

/// Start an async function or module body: wrap the prepared context
/// in a coroutine, drive it to the first await or completion, return
/// the result promise.
pub(crate) fn start_async_body(vm: &mut Vm, ctx: ExecutionContext) -> Completion<ObjectId> {
    let promise = ar::new_promise(vm);
    let gen = create_coroutine_object(vm, None, ctx, CoroutineKind::AsyncFunction);
    if let ObjectKind::Generator(data) = &mut vm.heap.object_mut(gen).kind {
        data.capability = Some(promise);
    }
    resume(vm, gen, ResumeKind::Next, Value::Undefined)?;
    Ok(promise)
}

fn gen_data(vm: &Vm, gen: ObjectId) -> &GeneratorData {
    match &vm.heap.object(gen).kind {
        ObjectKind::Generator(data) => data,
        _ => unreachable!("coroutine operation on a non-coroutine"),
    }
}

fn gen_data_mut(vm: &mut Vm, gen: ObjectId) -> &mut GeneratorData {
    match &mut vm.heap.object_mut(gen).kind {
        ObjectKind::Generator(data) => data,
        _ => unreachable!("coroutine operation on a non-coroutine"),
    }
}

fn iter_result(vm: &mut Vm, value: Value, done: bool) -> Value {
    let proto = vm.realm.intrinsics.object_prototype;
    let id = vm.heap.alloc_object(JsObject::ordinary(Some(proto)));
    let obj = vm.heap.object_mut(id);
    obj.set_property(PropertyKey::from_str("value"), Property::data(value));
    obj.set_property(PropertyKey::from_str("done"), Property::data(Value::Boolean(done)));
    Value::Object(id)
}

/// Take the parked context, inject the received completion and run
/// until the next suspension point or completion.
fn drive(vm: &mut Vm, gen: ObjectId, kind: ResumeKind, value: Value) -> Completion<StepOutcome> {
    let mut ctx = {
        let data = gen_data_mut(vm, gen);
        data.state = GeneratorState::Executing;
        data.context.take().expect("resumable coroutine has a context")
    };

    match kind {
        ResumeKind::Next => {
            if let Some(reg) = ctx.resume_reg.take() {
                ctx.registers[reg as usize] = value;
            }
            vm.contexts.push(*ctx);
        }
        ResumeKind::Throw => {
            let probe = ctx.suspend_ip;
            vm.contexts.push(*ctx);
            if let Err(Thrown(v)) = vm.unwind_top(value, probe) {
                vm.contexts.pop();
                return Ok(StepOutcome::Threw(v));
            }
        }
        ResumeKind::Return => {
            // abrupt return still runs finally handlers on the way out
            let probe = ctx.suspend_ip;
            let module = ctx.module.clone();
            match module.find_region(probe as u32, false, None) {
                None => return Ok(StepOutcome::Returned(value)),
                Some((_, region)) => {
                    let region = *region;
                    vm.contexts.push(*ctx);
                    {
                        let priv_base = vm.priv_base();
                        let cx = vm.top_mut();
                        cx.scope_stack.truncate(region.scope_depth as usize);
                        cx.lex_env =
                            cx.scope_stack.last().copied().unwrap_or(cx.var_env);
                        cx.priv_stack
                            .truncate(priv_base + region.priv_depth as usize);
                        cx.priv_env = cx.priv_stack.last().cloned();
                        cx.pending = Some(PendingCompletion::Return(value));
                        cx.ip = region.handler as usize;
                    }
                }
            }
        }
    }

    let result = vm.run_frame();
    let ctx = vm.contexts.pop().expect("coroutine frame");
    match result {
        Ok(FrameResult::Return(v)) => Ok(StepOutcome::Returned(v)),
        Ok(FrameResult::Suspend {
            kind: SuspendKind::Yield,
            value,
        }) => {
            gen_data_mut(vm, gen).context = Some(Box::new(ctx));
            Ok(StepOutcome::Yielded(value))
        }
        Ok(FrameResult::Suspend {
            kind: SuspendKind::Await,
            value,
        }) => {
            gen_data_mut(vm, gen).context = Some(Box::new(ctx));
            let promise = ar::promise_resolve_value(vm, value)?;
            let (on_ok, on_err) = ar::await_reactions(gen);
            ar::perform_then(vm, promise, on_ok, on_err, None);
            Ok(StepOutcome::AwaitParked)
        }
        Err(Thrown(v)) => Ok(StepOutcome::Threw(v)),
    }
}

/// The agent-facing resume entry: sync generator protocol, await
/// continuations, async-generator steps. The coroutine handle is
/// rooted for the duration, since running its body may collect.
pub(crate) fn resume(
    vm: &mut Vm,
    gen: ObjectId,
    kind: ResumeKind,
    value: Value,
) -> Completion<Value> {
    let mark = vm.heap.root_mark();
    vm.heap.roots.push(Value::Object(gen));
    let coroutine_kind = gen_data(vm, gen).kind;
    let result = match coroutine_kind {
        CoroutineKind::Generator => resume_sync_generator(vm, gen, kind, value),
        CoroutineKind::AsyncFunction => resume_async_function(vm, gen, kind, value),
        CoroutineKind::AsyncGenerator => resume_async_generator(vm, gen, kind, value),
    };
    vm.heap.root_release(mark);
    result
}

/// The `.next`/`.return`/`.throw` table of the generator state
/// machine.
fn resume_sync_generator(
    vm: &mut Vm,
    gen: ObjectId,
    kind: ResumeKind,
    value: Value,
) -> Completion<Value> {
    let state = gen_data(vm, gen).state;
    match (state, kind) {
        (GeneratorState::Executing, _) => vm.type_error("generator is already running"),
        (GeneratorState::Completed, ResumeKind::Next) => {
            Ok(iter_result(vm, Value::Undefined, true))
        }
        (GeneratorState::Completed, ResumeKind::Return) => Ok(iter_result(vm, value, true)),
        (GeneratorState::Completed, ResumeKind::Throw) => Err(Thrown(value)),
        (GeneratorState::Undefined, _) => vm.type_error("generator has not been started"),
        (GeneratorState::SuspendedStart, ResumeKind::Return) => {
            let data = gen_data_mut(vm, gen);
            data.state = GeneratorState::Completed;
            data.context = None;
            Ok(iter_result(vm, value, true))
        }
        (GeneratorState::SuspendedStart, ResumeKind::Throw) => {
            let data = gen_data_mut(vm, gen);
            data.state = GeneratorState::Completed;
            data.context = None;
            Err(Thrown(value))
        }
        (GeneratorState::SuspendedStart | GeneratorState::SuspendedYield, _) => {
            match drive(vm, gen, kind, value)? {
                StepOutcome::Returned(v) => {
                    gen_data_mut(vm, gen).state = GeneratorState::Completed;
                    Ok(iter_result(vm, v, true))
                }
                StepOutcome::Yielded(v) => {
                    gen_data_mut(vm, gen).state = GeneratorState::SuspendedYield;
                    Ok(iter_result(vm, v, false))
                }
                StepOutcome::Threw(v) => {
                    gen_data_mut(vm, gen).state = GeneratorState::Completed;
                    Err(Thrown(v))
                }
                StepOutcome::AwaitParked => {
                    let err = self_err(vm);
                    Err(err)
                }
            }
        }
        (GeneratorState::AwaitingReturn, _) => vm.type_error("generator is already running"),
    }
}

fn self_err(vm: &mut Vm) -> Thrown {
    let err = vm.make_error(
        core_types::ErrorKind::InternalError,
        "await inside a synchronous generator",
    );
    Thrown(err)
}

fn resume_async_function(
    vm: &mut Vm,
    gen: ObjectId,
    kind: ResumeKind,
    value: Value,
) -> Completion<Value> {
    let capability = gen_data(vm, gen).capability;
    let outcome = drive(vm, gen, kind, value)?;
    match outcome {
        StepOutcome::Returned(v) => {
            gen_data_mut(vm, gen).state = GeneratorState::Completed;
            gen_data_mut(vm, gen).context = None;
            if let Some(p) = capability {
                ar::resolve_promise(vm, p, v)?;
            }
        }
        StepOutcome::Threw(v) => {
            gen_data_mut(vm, gen).state = GeneratorState::Completed;
            gen_data_mut(vm, gen).context = None;
            if let Some(p) = capability {
                ar::reject_promise(vm, p, v);
            }
        }
        StepOutcome::AwaitParked => {
            // state stays Executing with the context parked
        }
        StepOutcome::Yielded(_) => {
            let err = vm.make_error(
                core_types::ErrorKind::InternalError,
                "yield inside an async function body",
            );
            return Err(err.into());
        }
    }
    Ok(Value::Undefined)
}

/// Public queue entry: `.next()`/`.return()`/`.throw()` on an async
/// generator. Returns the request's promise.
pub(crate) fn async_generator_request(
    vm: &mut Vm,
    gen: ObjectId,
    kind: ResumeKind,
    value: Value,
) -> Completion<Value> {
    let mark = vm.heap.root_mark();
    vm.heap.roots.push(Value::Object(gen));
    let capability = ar::new_promise(vm);
    gen_data_mut(vm, gen).queue.push_back(AsyncGenRequest {
        kind,
        value,
        capability,
    });
    let state = gen_data(vm, gen).state;
    let result = if matches!(
        state,
        GeneratorState::SuspendedStart | GeneratorState::SuspendedYield | GeneratorState::Completed
    ) {
        drain_async_generator(vm, gen)
    } else {
        Ok(())
    };
    vm.heap.root_release(mark);
    result?;
    Ok(Value::Object(capability))
}

/// Await continuation inside an async generator body.
fn resume_async_generator(
    vm: &mut Vm,
    gen: ObjectId,
    kind: ResumeKind,
    value: Value,
) -> Completion<Value> {
    let state = gen_data(vm, gen).state;
    if state == GeneratorState::AwaitingReturn {
        // a `.return()` value finished awaiting; settle the head
        let head = gen_data_mut(vm, gen).queue.pop_front();
        gen_data_mut(vm, gen).state = GeneratorState::Completed;
        if let Some(req) = head {
            match kind {
                ResumeKind::Throw => ar::reject_promise(vm, req.capability, value),
                _ => {
                    let result = iter_result(vm, value, true);
                    ar::resolve_promise(vm, req.capability, result)?;
                }
            }
        }
        drain_async_generator(vm, gen)?;
        return Ok(Value::Undefined);
    }

    let outcome = drive(vm, gen, kind, value)?;
    settle_async_generator_step(vm, gen, outcome)?;
    Ok(Value::Undefined)
}

fn settle_async_generator_step(
    vm: &mut Vm,
    gen: ObjectId,
    outcome: StepOutcome,
) -> Completion<()> {
    match outcome {
        StepOutcome::AwaitParked => Ok(()),
        StepOutcome::Yielded(v) => {
            gen_data_mut(vm, gen).state = GeneratorState::SuspendedYield;
            let head = gen_data_mut(vm, gen).queue.pop_front();
            if let Some(req) = head {
                let result = iter_result(vm, v, false);
                ar::resolve_promise(vm, req.capability, result)?;
            }
            drain_async_generator(vm, gen)
        }
        StepOutcome::Returned(v) => {
            gen_data_mut(vm, gen).state = GeneratorState::Completed;
            gen_data_mut(vm, gen).context = None;
            let head = gen_data_mut(vm, gen).queue.pop_front();
            if let Some(req) = head {
                let result = iter_result(vm, v, true);
                ar::resolve_promise(vm, req.capability, result)?;
            }
            drain_async_generator(vm, gen)
        }
        StepOutcome::Threw(v) => {
            gen_data_mut(vm, gen).state = GeneratorState::Completed;
            gen_data_mut(vm, gen).context = None;
            let head = gen_data_mut(vm, gen).queue.pop_front();
            if let Some(req) = head {
                ar::reject_promise(vm, req.capability, v);
            }
            drain_async_generator(vm, gen)
        }
    }
}

/// Serve queued requests strictly in FIFO order until the generator
/// parks or the queue empties.
fn drain_async_generator(vm: &mut Vm, gen: ObjectId) -> Completion<()> {
    loop {
        let state = gen_data(vm, gen).state;
        let head = match gen_data(vm, gen).queue.front() {
            Some(req) => req.clone(),
            None => return Ok(()),
        };
        match state {
            GeneratorState::Completed => {
                match head.kind {
                    ResumeKind::Next => {
                        gen_data_mut(vm, gen).queue.pop_front();
                        let result = iter_result(vm, Value::Undefined, true);
                        ar::resolve_promise(vm, head.capability, result)?;
                    }
                    ResumeKind::Throw => {
                        gen_data_mut(vm, gen).queue.pop_front();
                        ar::reject_promise(vm, head.capability, head.value);
                    }
                    ResumeKind::Return => {
                        // bridge the return value through the promise
                        // machinery so thenables settle first
                        gen_data_mut(vm, gen).state = GeneratorState::AwaitingReturn;
                        let inner = ar::promise_resolve_value(vm, head.value.clone())?;
                        let (on_ok, on_err) = ar::await_reactions(gen);
                        ar::perform_then(vm, inner, on_ok, on_err, None);
                        return Ok(());
                    }
                }
            }
            GeneratorState::SuspendedStart | GeneratorState::SuspendedYield => {
                // `.return()` before the body starts completes it
                if state == GeneratorState::SuspendedStart && head.kind == ResumeKind::Return {
                    gen_data_mut(vm, gen).state = GeneratorState::Completed;
                    gen_data_mut(vm, gen).context = None;
                    continue;
                }
                let outcome = drive(vm, gen, head.kind, head.value.clone())?;
                settle_async_generator_step(vm, gen, outcome)?;
                return Ok(());
            }
            _ => return Ok(()),
        }
    }
}
