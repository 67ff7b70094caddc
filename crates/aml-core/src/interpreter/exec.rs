//! Control method invocation

use super::Interpreter;
use crate::namespace::NodeId;
use crate::object::{Object, ObjectHandle, ObjectType};
use crate::sync::{SyncError, WAIT_FOREVER};
use crate::walk::{SlotValue, WalkList};
use crate::{AmlError, AmlResult};

impl Interpreter {
    /// Run a control method on the caller's walk list
    ///
    /// A new walk state with a fresh owner id is pushed for the duration of
    /// the call. Nodes the method creates are deleted when it returns, and a
    /// serialized method holds its implicit mutex while the body runs.
    pub(crate) fn invoke_method(
        &self,
        list: &mut WalkList,
        node: NodeId,
        mut args: Vec<SlotValue>,
    ) -> AmlResult<Option<ObjectHandle>> {
        // The first walk state belongs to the host entry point
        let limit = self.options.max_call_depth;
        if list.depth() > limit {
            return Err(AmlError::MethodLimit(limit));
        }

        let (handle, method, path) = {
            let ns = self.namespace.lock();
            let path = ns.display_path(node);
            let handle = ns
                .object(node)
                .ok_or_else(|| AmlError::NotFound(path.clone()))?;
            let method = match &*handle.read() {
                Object::Method(method) => method.clone(),
                other => {
                    return Err(AmlError::type_mismatch(
                        ObjectType::Method,
                        other.object_type(),
                    ))
                }
            };
            (handle, method, path)
        };

        if args.len() > usize::from(method.arg_count) {
            log::warn!(
                "{} takes {} arguments, {} passed",
                path,
                method.arg_count,
                args.len()
            );
            args.truncate(usize::from(method.arg_count));
        }
        log::debug!("invoking {} ({} args)", path, args.len());

        if let Some(mutex) = &method.mutex {
            if !list.acquire_mutex(mutex, WAIT_FOREVER)? {
                return Err(SyncError::AcquireTimeout.into());
            }
        }

        let owner = self.allocate_owner();
        let mut state =
            self.walk_pool
                .lock()
                .acquire(owner, node, Some(handle), self.options.slack_uninitialized);
        let result = match state.frame.init_args(args) {
            Ok(()) => {
                list.push(state);
                let result = self.execute_block(list, &method.body);
                match list.pop() {
                    Some(mut state) => {
                        let value = state.return_value.take();
                        self.walk_pool.lock().release(state);
                        result.map(|_| value)
                    }
                    None => Err(AmlError::InternalInconsistency(
                        "walk state lost during invocation".to_string(),
                    )),
                }
            }
            Err(err) => {
                self.walk_pool.lock().release(state);
                Err(err)
            }
        };

        let deleted = self.namespace.lock().delete_by_owner(owner);
        if deleted > 0 {
            log::trace!("{}: deleted {} temporary nodes", path, deleted);
        }
        let released = match &method.mutex {
            Some(mutex) => list.release_mutex(mutex),
            None => Ok(()),
        };

        match result {
            Ok(value) => {
                released?;
                match value {
                    Some(value) => Ok(Some(value)),
                    None if self.options.enable_interpreter_slack => {
                        Ok(Some(ObjectHandle::integer(0)))
                    }
                    None => Ok(None),
                }
            }
            Err(err) => {
                log::debug!("{} failed: {}", path, err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::{NamePath, NameSeg};
    use crate::namespace::{NodeFlags, OwnerId};
    use crate::object::Method;
    use crate::options::InterpreterOptions;
    use crate::term::{BinaryOp, Target, Term};
    use std::sync::Arc;

    fn define_method(interp: &Interpreter, name: &str, arg_count: u8, body: Vec<Term>) -> NodeId {
        let mut ns = interp.namespace();
        let root = ns.root();
        let node = ns
            .create(root, NameSeg::new(name).unwrap(), ObjectType::Method, OwnerId::new(1), NodeFlags::NONE)
            .unwrap();
        let method = Object::Method(Method {
            arg_count,
            serialized: false,
            sync_level: 0,
            body: Arc::from(body),
            mutex: None,
        });
        ns.attach(node, ObjectHandle::new(method), ObjectType::Method)
            .unwrap();
        node
    }

    #[test]
    fn test_method_returns_sum_of_args() {
        let interp = Interpreter::new(InterpreterOptions::default()).unwrap();
        define_method(
            &interp,
            "ADD2",
            2,
            vec![Term::Return(Box::new(Term::Binary {
                op: BinaryOp::Add,
                left: Box::new(Term::Arg(0)),
                right: Box::new(Term::Arg(1)),
                target: Target::Null,
            }))],
        );

        let value = interp
            .evaluate("\\ADD2", vec![ObjectHandle::integer(40), ObjectHandle::integer(2)])
            .unwrap()
            .unwrap();
        assert_eq!(value.as_integer(), Some(42));
    }

    #[test]
    fn test_missing_return_with_and_without_slack() {
        let slack = Interpreter::new(InterpreterOptions::default()).unwrap();
        define_method(&slack, "VOID", 0, vec![Term::Noop]);
        let value = slack.evaluate("\\VOID", vec![]).unwrap();
        assert_eq!(value.and_then(|v| v.as_integer()), Some(0));

        let strict = Interpreter::new(InterpreterOptions::strict()).unwrap();
        define_method(&strict, "VOID", 0, vec![Term::Noop]);
        assert!(strict.evaluate("\\VOID", vec![]).unwrap().is_none());
    }

    #[test]
    fn test_recursion_hits_depth_limit() {
        let interp = Interpreter::new(InterpreterOptions::with_call_depth(8)).unwrap();
        define_method(
            &interp,
            "LOOP",
            0,
            vec![Term::NameRef(NamePath::parse("\\LOOP").unwrap())],
        );
        assert!(matches!(
            interp.evaluate("\\LOOP", vec![]),
            Err(AmlError::MethodLimit(8))
        ));
    }

    #[test]
    fn test_temporary_names_are_removed() {
        let interp = Interpreter::new(InterpreterOptions::default()).unwrap();
        define_method(
            &interp,
            "TEMP",
            0,
            vec![Term::name(NamePath::parse("TMPV").unwrap(), Term::Integer(5))],
        );
        let before = interp.namespace().len();
        interp.evaluate("\\TEMP", vec![]).unwrap();
        assert_eq!(interp.namespace().len(), before);
    }
}
