//! `%GeneratorPrototype%` and `%AsyncGeneratorPrototype%`: the
//! next/return/throw surface over the coroutine machinery.

use core_types::{Completion, Value};
use memory_manager::{Agent, AgentErrors, Heap, NativeCallInfo, ObjectKind, Realm, ResumeKind};

use crate::helpers::{method, this_object};

pub(crate) fn install(heap: &mut Heap, realm: &Realm) {
    let i = &realm.intrinsics;
    let fp = i.function_prototype;
    method(heap, fp, i.generator_prototype, "next", 1, generator_next);
    method(heap, fp, i.generator_prototype, "return", 1, generator_return);
    method(heap, fp, i.generator_prototype, "throw", 1, generator_throw);

    method(
        heap,
        fp,
        i.async_generator_prototype,
        "next",
        1,
        async_generator_next,
    );
    method(
        heap,
        fp,
        i.async_generator_prototype,
        "return",
        1,
        async_generator_return,
    );
    method(
        heap,
        fp,
        i.async_generator_prototype,
        "throw",
        1,
        async_generator_throw,
    );
}

fn generator_step(
    agent: &mut dyn Agent,
    info: &NativeCallInfo<'_>,
    kind: ResumeKind,
) -> Completion<Value> {
    let id = this_object(agent, info, "Generator.prototype")?;
    if !matches!(agent.heap_ref().object(id).kind, ObjectKind::Generator(_)) {
        return agent.type_error("generator method called on a non-generator");
    }
    agent.resume_coroutine(id, kind, info.arg(0))
}

fn generator_next(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    generator_step(agent, info, ResumeKind::Next)
}

fn generator_return(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    generator_step(agent, info, ResumeKind::Return)
}

fn generator_throw(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    generator_step(agent, info, ResumeKind::Throw)
}

fn async_generator_step(
    agent: &mut dyn Agent,
    info: &NativeCallInfo<'_>,
    kind: ResumeKind,
) -> Completion<Value> {
    let id = this_object(agent, info, "AsyncGenerator.prototype")?;
    if !matches!(agent.heap_ref().object(id).kind, ObjectKind::Generator(_)) {
        return agent.type_error("async generator method called on a non-generator");
    }
    agent.async_generator_request(id, kind, info.arg(0))
}

fn async_generator_next(agent: &mut dyn Agent, info: &NativeCallInfo<'_>) -> Completion<Value> {
    async_generator_step(agent, info, ResumeKind::Next)
}

fn async_generator_return(
    agent: &mut dyn Agent,
    info: &NativeCallInfo<'_>,
) -> Completion<Value> {
    async_generator_step(agent, info, ResumeKind::Return)
}

fn async_generator_throw(
    agent: &mut dyn Agent,
    info: &NativeCallInfo<'_>,
) -> Completion<Value> {
    async_generator_step(agent, info, ResumeKind::Throw)
}
