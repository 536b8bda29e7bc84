//! A minimal `Agent` for exercising the protocol in unit tests:
//! a bare heap, placeholder intrinsics and native-function calls
//! only.

use core_types::{Completion, JsString, ObjectId, Value};
use memory_manager::{
    Agent, AgentErrors, BuiltinFunctionData, Heap, Intrinsics, JsObject, NativeCallInfo, NativeFn, ObjectKind,
    Reaction, Realm,
};

pub(crate) struct TestAgent {
    pub heap: Heap,
    pub realm: Realm,
    pub reactions: Vec<(Reaction, Value)>,
}

impl TestAgent {
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let mut alloc = || heap.alloc_object(JsObject::ordinary(None));
        let intrinsics = Intrinsics {
            object_prototype: alloc(),
            function_prototype: alloc(),
            array_prototype: alloc(),
            string_prototype: alloc(),
            number_prototype: alloc(),
            boolean_prototype: alloc(),
            symbol_prototype: alloc(),
            bigint_prototype: alloc(),
            error_prototype: alloc(),
            type_error_prototype: alloc(),
            range_error_prototype: alloc(),
            reference_error_prototype: alloc(),
            syntax_error_prototype: alloc(),
            uri_error_prototype: alloc(),
            eval_error_prototype: alloc(),
            map_prototype: alloc(),
            set_prototype: alloc(),
            weak_map_prototype: alloc(),
            weak_set_prototype: alloc(),
            weak_ref_prototype: alloc(),
            finalization_registry_prototype: alloc(),
            promise_prototype: alloc(),
            iterator_prototype: alloc(),
            async_iterator_prototype: alloc(),
            array_iterator_prototype: alloc(),
            map_iterator_prototype: alloc(),
            set_iterator_prototype: alloc(),
            generator_prototype: alloc(),
            async_generator_prototype: alloc(),
            array_buffer_prototype: alloc(),
            typed_array_prototype: alloc(),
        };
        let global_object = heap.alloc_object(JsObject::ordinary(Some(intrinsics.object_prototype)));
        let global_env = heap.alloc_env(memory_manager::EnvRecord::declarative(None));
        Self {
            heap,
            realm: Realm {
                global_object,
                global_env,
                intrinsics,
            },
            reactions: Vec::new(),
        }
    }

    pub fn fresh_object(&mut self) -> ObjectId {
        let proto = self.realm.intrinsics.object_prototype;
        self.heap.alloc_object(JsObject::ordinary(Some(proto)))
    }

    pub fn fresh_object_with_proto(&mut self, proto: ObjectId) -> ObjectId {
        self.heap.alloc_object(JsObject::ordinary(Some(proto)))
    }

    pub fn native(&mut self, name: &str, func: NativeFn) -> ObjectId {
        let proto = self.realm.intrinsics.function_prototype;
        self.heap.alloc_object(JsObject::with_kind(
            Some(proto),
            ObjectKind::Builtin(BuiltinFunctionData {
                func,
                name: JsString::from_str(name),
                length: 0,
                constructable: false,
                captured: Vec::new(),
            }),
        ))
    }
}

impl Agent for TestAgent {
    fn heap(&mut self) -> &mut Heap {
        &mut self.heap
    }

    fn heap_ref(&self) -> &Heap {
        &self.heap
    }

    fn realm(&self) -> &Realm {
        &self.realm
    }

    fn call(&mut self, callee: Value, this: Value, args: &[Value]) -> Completion<Value> {
        let Some(id) = callee.as_object() else {
            return self.type_error("not a function");
        };
        let data = match &self.heap.object(id).kind {
            ObjectKind::Builtin(b) => b.clone(),
            _ => return self.type_error("test agent can only call native functions"),
        };
        (data.func)(
            self,
            &NativeCallInfo {
                callee: id,
                this,
                args,
                new_target: Value::Undefined,
            },
        )
    }

    fn construct(
        &mut self,
        callee: Value,
        args: &[Value],
        new_target: Value,
    ) -> Completion<Value> {
        let Some(id) = callee.as_object() else {
            return self.type_error("not a constructor");
        };
        let data = match &self.heap.object(id).kind {
            ObjectKind::Builtin(b) if b.constructable => b.clone(),
            _ => return self.type_error("test agent can only construct native functions"),
        };
        (data.func)(
            self,
            &NativeCallInfo {
                callee: id,
                this: Value::Undefined,
                args,
                new_target,
            },
        )
    }

    fn enqueue_reaction(&mut self, reaction: Reaction, argument: Value) {
        self.reactions.push((reaction, argument));
    }
}
