//! AML interpreter
//!
//! The [`Interpreter`] owns the namespace and the installed region handlers.
//! Tables are loaded with [`Interpreter::load_table`]; control methods and
//! named objects are evaluated with [`Interpreter::evaluate`].
//!
//! Every entry point builds a [`WalkList`] for the call chain it starts.
//! Method invocations push walk states onto that list, so nested calls never
//! recurse through the host and every AML mutex acquired along the way is
//! owned by the list.

mod eval;
mod exec;
mod field_io;
mod init;
mod load;
mod resolve;
mod store;

pub use init::InitializationReport;
pub use store::Destination;

use crate::name::{NamePath, NameSeg};
use crate::namespace::{Namespace, NodeFlags, NodeId, OwnerId};
use crate::object::{Object, ObjectHandle, ObjectType};
use crate::options::{IntegerWidth, InterpreterOptions};
use crate::region::{RegionHandler, RegionHandlers, RegionSpace};
use crate::sync::{AmlEvent, AmlMutex, Semaphore};
use crate::walk::{SlotValue, WalkList, WalkStatePool};
use crate::{AmlError, AmlResult};
use crossbeam::atomic::AtomicCell;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Value of the `Revision` opcode
pub const AML_REVISION: u64 = 0x2023_0628;

/// Scopes present before any table is loaded
const PREDEFINED_SCOPES: [(&str, ObjectType); 5] = [
    ("_GPE", ObjectType::LocalScope),
    ("_PR_", ObjectType::LocalScope),
    ("_SB_", ObjectType::Device),
    ("_SI_", ObjectType::LocalScope),
    ("_TZ_", ObjectType::ThermalZone),
];

/// The AML interpreter
pub struct Interpreter {
    namespace: Mutex<Namespace>,
    handlers: RegionHandlers,
    options: InterpreterOptions,
    integer_width: AtomicCell<IntegerWidth>,
    next_owner: AtomicU32,
    /// Serializes bank and index register sequences
    field_sequence: Semaphore,
    global_lock: Arc<AmlMutex>,
    walk_pool: Mutex<WalkStatePool>,
}

impl Interpreter {
    /// Create an interpreter with the predefined namespace
    pub fn new(options: InterpreterOptions) -> AmlResult<Self> {
        let global_lock = Arc::new(AmlMutex::new(0)?);
        let interpreter = Self {
            namespace: Mutex::new(Namespace::new()),
            handlers: RegionHandlers::new(),
            integer_width: AtomicCell::new(options.integer_width),
            next_owner: AtomicU32::new(OwnerId::ROOT.as_u32() + 1),
            field_sequence: Semaphore::new(1, 1),
            global_lock,
            walk_pool: Mutex::new(WalkStatePool::new()),
            options,
        };
        interpreter.create_predefined()?;
        Ok(interpreter)
    }

    fn create_predefined(&self) -> AmlResult<()> {
        let mut ns = self.namespace.lock();
        let root = ns.root();
        let mut define = |name: &str, ty: ObjectType, object: Option<Object>| -> AmlResult<()> {
            let seg = NameSeg::new(name)?;
            let node = ns.create(root, seg, ty, OwnerId::ROOT, NodeFlags::PREDEFINED)?;
            if let Some(object) = object {
                ns.attach(node, ObjectHandle::new(object), ty)?;
            }
            Ok(())
        };

        for (name, ty) in PREDEFINED_SCOPES {
            let object = match ty {
                ObjectType::Device => Some(Object::Device),
                ObjectType::ThermalZone => Some(Object::ThermalZone),
                _ => None,
            };
            define(name, ty, object)?;
        }
        define(
            "_REV",
            ObjectType::Integer,
            Some(Object::Integer(self.options.revision)),
        )?;
        define(
            "_OS_",
            ObjectType::String,
            Some(Object::String(self.options.os_name.clone())),
        )?;
        define(
            "_GL_",
            ObjectType::Mutex,
            Some(Object::Mutex(Arc::clone(&self.global_lock))),
        )?;
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Options the interpreter was created with
    pub fn options(&self) -> &InterpreterOptions {
        &self.options
    }

    /// Integer width of the most recently loaded table
    pub fn integer_width(&self) -> IntegerWidth {
        self.integer_width.load()
    }

    /// Exclusive access to the namespace
    ///
    /// The guard must be dropped before calling back into the interpreter.
    pub fn namespace(&self) -> MutexGuard<'_, Namespace> {
        self.namespace.lock()
    }

    /// The `\_GL_` mutex
    pub fn global_lock(&self) -> &Arc<AmlMutex> {
        &self.global_lock
    }

    /// Install the handler for an address space
    pub fn install_handler(
        &self,
        space: RegionSpace,
        handler: Arc<dyn RegionHandler>,
    ) -> Option<Arc<dyn RegionHandler>> {
        log::debug!("installing {:?} region handler", space);
        self.handlers.install(space, handler)
    }

    /// Remove the handler for an address space
    pub fn remove_handler(&self, space: RegionSpace) -> Option<Arc<dyn RegionHandler>> {
        self.handlers.remove(space)
    }

    /// Resolve an absolute path (or a path relative to the root)
    pub fn lookup_path(&self, path: &str) -> AmlResult<NodeId> {
        let path = NamePath::parse(path)?;
        let ns = self.namespace.lock();
        ns.find(ns.root(), &path)
    }

    /// Allocate a fresh owner id
    pub fn allocate_owner(&self) -> OwnerId {
        OwnerId::new(self.next_owner.fetch_add(1, Ordering::Relaxed))
    }

    /// Delete every node a table load created
    pub fn unload_table(&self, owner: OwnerId) -> usize {
        let deleted = self.namespace.lock().delete_by_owner(owner);
        log::debug!("unloaded owner {}: {} nodes", owner, deleted);
        deleted
    }

    // ========================================================================
    // Evaluation entry points
    // ========================================================================

    /// Evaluate the object at `path`
    ///
    /// Methods are invoked with `args`; any other object yields its current
    /// value (fields are read). Returns `None` when a method returns nothing.
    pub fn evaluate(
        &self,
        path: &str,
        args: Vec<ObjectHandle>,
    ) -> AmlResult<Option<ObjectHandle>> {
        let node = self.lookup_path(path)?;
        self.evaluate_node(node, args)
    }

    /// Evaluate a namespace node
    pub fn evaluate_node(
        &self,
        node: NodeId,
        args: Vec<ObjectHandle>,
    ) -> AmlResult<Option<ObjectHandle>> {
        let mut list = WalkList::new();
        let root = self.namespace.lock().root();
        self.begin_walk(&mut list, OwnerId::ROOT, root);

        let result = self.evaluate_in(&mut list, node, args);

        self.end_walk(&mut list);
        list.release_all();
        result
    }

    fn evaluate_in(
        &self,
        list: &mut WalkList,
        node: NodeId,
        args: Vec<ObjectHandle>,
    ) -> AmlResult<Option<ObjectHandle>> {
        let target = self.namespace.lock().resolve_alias(node)?;
        let ty = self.namespace.lock().object_type(target)?;
        let value = if ty == ObjectType::Method {
            let args = args.into_iter().map(SlotValue::Object).collect();
            self.invoke_method(list, target, args)?
        } else {
            Some(self.node_value(list, target)?)
        };

        match value {
            Some(value) if value.object_type() == ObjectType::Reference => {
                Ok(Some(self.dereference(list, &value)?))
            }
            other => Ok(other),
        }
    }

    /// Push a base walk state for a host-initiated walk
    fn begin_walk(&self, list: &mut WalkList, owner: OwnerId, origin: NodeId) {
        let state =
            self.walk_pool
                .lock()
                .acquire(owner, origin, None, self.options.slack_uninitialized);
        list.push(state);
    }

    fn end_walk(&self, list: &mut WalkList) {
        if let Some(state) = list.pop() {
            self.walk_pool.lock().release(state);
        }
    }

    fn event_handle(&self, object: &ObjectHandle) -> AmlResult<Arc<AmlEvent>> {
        match &*object.read() {
            Object::Event(event) => Ok(Arc::clone(event)),
            other => Err(AmlError::type_mismatch(ObjectType::Event, other.object_type())),
        }
    }

    fn mutex_handle(&self, object: &ObjectHandle) -> AmlResult<Arc<AmlMutex>> {
        match &*object.read() {
            Object::Mutex(mutex) => Ok(Arc::clone(mutex)),
            other => Err(AmlError::type_mismatch(ObjectType::Mutex, other.object_type())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predefined_namespace() {
        let interp = Interpreter::new(InterpreterOptions::default()).unwrap();
        for path in ["\\_GPE", "\\_PR_", "\\_SB_", "\\_SI_", "\\_TZ_", "\\_GL_"] {
            assert!(interp.lookup_path(path).is_ok(), "{} missing", path);
        }

        let rev = interp.evaluate("\\_REV", vec![]).unwrap().unwrap();
        assert_eq!(rev.as_integer(), Some(2));

        let os = interp.evaluate("\\_OS_", vec![]).unwrap().unwrap();
        assert!(matches!(&*os.read(), Object::String(name) if name == "Microsoft Windows NT"));
    }

    #[test]
    fn test_owner_ids_are_unique() {
        let interp = Interpreter::new(InterpreterOptions::default()).unwrap();
        let first = interp.allocate_owner();
        let second = interp.allocate_owner();
        assert_ne!(first, second);
        assert_ne!(first, OwnerId::ROOT);
    }

    #[test]
    fn test_evaluate_missing_path() {
        let interp = Interpreter::new(InterpreterOptions::default()).unwrap();
        assert!(matches!(
            interp.evaluate("\\_SB_.NONE", vec![]),
            Err(AmlError::NotFound(_))
        ));
    }
}
