//! Term evaluation
//!
//! Statements run through [`Interpreter::execute_term`]; expressions produce
//! an [`ObjectHandle`] through [`Interpreter::eval_term`]. Operands of an
//! operator are evaluated left to right onto the result stack and moved to
//! the operand stack before the operator runs, so a nested operator never
//! sees its caller's operands.

use super::load::LoadPhase;
use super::store::{owned_copy, Destination};
use super::{Interpreter, AML_REVISION};
use crate::name::NamePath;
use crate::namespace::{Lookup, NodeId};
use crate::object::convert::{self, to_integer};
use crate::object::reference::{IndexRef, IndexTarget, RefTarget, SlotRef};
use crate::object::{Object, ObjectHandle, ObjectType, Reference};
use crate::options::IntegerWidth;
use crate::term::{BinaryOp, ConvertOp, LogicalOp, Target, Term};
use crate::walk::{SlotKind, SlotValue, WalkList};
use crate::{AmlError, AmlResult};
use std::cmp::Ordering;

/// How control leaves a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Fall through to the next statement
    Normal,
    /// `Break` out of the innermost While
    Break,
    /// `Continue` the innermost While
    Continue,
    /// `Return` from the method
    Return,
}

impl Interpreter {
    // ========================================================================
    // Statements
    // ========================================================================

    /// Run a list of statements until one changes the control flow
    pub(crate) fn execute_block(&self, list: &mut WalkList, terms: &[Term]) -> AmlResult<Flow> {
        for term in terms {
            let flow = self.execute_term(list, term)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    pub(crate) fn execute_term(&self, list: &mut WalkList, term: &Term) -> AmlResult<Flow> {
        match term {
            definition if definition.is_definition() => {
                self.load_term(list, definition, LoadPhase::Execute)?;
            }
            Term::If {
                predicate,
                then,
                otherwise,
            } => {
                let branch = if self.eval_predicate(list, predicate)? {
                    then
                } else {
                    otherwise
                };
                return self.execute_block(list, branch);
            }
            Term::While { predicate, body } => return self.op_while(list, predicate, body),
            Term::Break => return Ok(Flow::Break),
            Term::Continue => return Ok(Flow::Continue),
            Term::Return(value) => {
                let value = self.eval_term(list, value)?;
                list.current_mut()?.return_value = Some(value);
                return Ok(Flow::Return);
            }
            Term::Noop => {}
            Term::Release(target) => {
                let mutex = self.target_value(list, target)?;
                let mutex = self.mutex_handle(&mutex)?;
                list.release_mutex(&mutex)?;
            }
            Term::Signal(target) => {
                let event = self.target_value(list, target)?;
                self.event_handle(&event)?.signal();
            }
            Term::Reset(target) => {
                let event = self.target_value(list, target)?;
                self.event_handle(&event)?.reset();
            }
            Term::Sleep(duration) => {
                let ms = self.eval_integer(list, duration)?;
                log::trace!("Sleep({} ms)", ms);
            }
            Term::Stall(duration) => {
                let us = self.eval_integer(list, duration)?;
                log::trace!("Stall({} us)", us);
            }
            Term::NameRef(method) => {
                self.call(list, method, &[])?;
            }
            Term::Invoke { method, args } => {
                self.call(list, method, args)?;
            }
            expression => {
                self.eval_term(list, expression)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn op_while(&self, list: &mut WalkList, predicate: &Term, body: &[Term]) -> AmlResult<Flow> {
        let limit = self.options.max_loop_iterations;
        let mut iterations = 0u64;
        while self.eval_predicate(list, predicate)? {
            iterations += 1;
            if iterations > limit {
                log::warn!("While loop exceeded {} iterations", limit);
                return Err(AmlError::LoopTimeout);
            }
            match self.execute_block(list, body)? {
                Flow::Break => break,
                Flow::Return => return Ok(Flow::Return),
                Flow::Normal | Flow::Continue => {}
            }
        }
        Ok(Flow::Normal)
    }

    fn eval_predicate(&self, list: &mut WalkList, predicate: &Term) -> AmlResult<bool> {
        Ok(self.eval_integer(list, predicate)? != 0)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Evaluate an expression to a value
    pub(crate) fn eval_term(&self, list: &mut WalkList, term: &Term) -> AmlResult<ObjectHandle> {
        let width = self.integer_width();
        match term {
            Term::Integer(value) => Ok(ObjectHandle::integer(width.truncate(*value))),
            Term::String(text) => Ok(ObjectHandle::string(text.clone())),
            Term::Buffer { size, bytes } => self.op_buffer(list, size.as_deref(), bytes),
            Term::Package { count, elements } => self.op_package(list, count.as_deref(), elements),
            Term::Zero => Ok(ObjectHandle::integer(0)),
            Term::One => Ok(ObjectHandle::integer(1)),
            Term::Ones => Ok(ObjectHandle::integer(width.ones())),
            Term::Revision => Ok(ObjectHandle::integer(AML_REVISION)),
            Term::Debug => Ok(ObjectHandle::new(Object::Debug)),

            Term::NameRef(path) => self
                .call(list, path, &[])?
                .ok_or_else(|| AmlError::NoReturnValue(path.to_string())),
            Term::Invoke { method, args } => self
                .call(list, method, args)?
                .ok_or_else(|| AmlError::NoReturnValue(method.to_string())),
            Term::Local(index) => self.slot_value(list, SlotKind::Local, *index),
            Term::Arg(index) => self.slot_value(list, SlotKind::Arg, *index),

            Term::Store { value, target } => {
                let value = self.eval_term(list, value)?;
                if let Some(destination) = self.resolve_target(list, target)? {
                    self.store(list, value.clone(), &destination)?;
                }
                Ok(value)
            }
            Term::CopyObject { value, target } => {
                let value = self.eval_term(list, value)?;
                let value = self.resolve_operand(list, &value)?;
                if let Some(destination) = self.resolve_target(list, target)? {
                    self.copy_object(list, value.clone(), &destination)?;
                }
                Ok(value)
            }

            Term::Binary {
                op,
                left,
                right,
                target,
            } => {
                let [a, b] = self.integer_operands(list, [&**left, &**right])?;
                let value = binary(*op, a, b, width)?;
                self.finish(list, ObjectHandle::integer(value), target)
            }
            Term::Not { operand, target } => {
                let [value] = self.integer_operands(list, [&**operand])?;
                self.finish(list, ObjectHandle::integer(width.truncate(!value)), target)
            }
            Term::Divide {
                dividend,
                divisor,
                remainder,
                quotient,
            } => self.op_divide(list, dividend, divisor, remainder, quotient),
            Term::Increment(target) => self.op_step(list, target, true),
            Term::Decrement(target) => self.op_step(list, target, false),

            Term::Logical { op, left, right } => {
                let truth = self.op_logical(list, *op, left, right)?;
                Ok(self.boolean(truth))
            }
            Term::LNot(operand) => {
                let [value] = self.integer_operands(list, [&**operand])?;
                Ok(self.boolean(value == 0))
            }

            Term::RefOf(target) => self.reference_to(list, target),
            Term::CondRefOf { source, target } => self.op_cond_ref_of(list, source, target),
            Term::DerefOf(reference) => {
                let reference = self.eval_term(list, reference)?;
                let value = self.dereference(list, &reference)?;
                self.resolve_operand(list, &value)
            }
            Term::Index {
                source,
                index,
                target,
            } => self.op_index(list, source, index, target),
            Term::SizeOf(target) => self.op_size_of(list, target),
            Term::ObjectType(target) => {
                let ty = self.target_type(list, target)?;
                Ok(ObjectHandle::integer(ty.code()))
            }

            Term::Convert {
                op,
                operand,
                target,
            } => {
                let [value] = self.eval_operands(list, [&**operand])?;
                let value = self.resolve_operand(list, &value)?;
                let result = convert_op(*op, &value.read(), width)?;
                self.finish(list, ObjectHandle::new(result), target)
            }
            Term::Concatenate {
                left,
                right,
                target,
            } => {
                let [a, b] = self.eval_operands(list, [&**left, &**right])?;
                let a = self.resolve_operand(list, &a)?;
                let b = self.resolve_operand(list, &b)?;
                // A copy of the right side keeps `Concatenate(X, X)` from
                // locking the same object twice
                let b = b.read().duplicate();
                let result = convert::concatenate(&a.read(), &b, width)?;
                self.finish(list, ObjectHandle::new(result), target)
            }

            Term::Acquire { mutex, timeout } => {
                let mutex = self.target_value(list, mutex)?;
                let mutex = self.mutex_handle(&mutex)?;
                let acquired = list.acquire_mutex(&mutex, *timeout)?;
                Ok(self.boolean(!acquired))
            }
            Term::Wait { event, timeout } => {
                let event = self.target_value(list, event)?;
                let event = self.event_handle(&event)?;
                let timeout = self.eval_integer(list, timeout)?;
                let timeout = u16::try_from(timeout).unwrap_or(u16::MAX);
                Ok(self.boolean(!event.wait(timeout)))
            }

            other => Err(AmlError::BadOpcode(format!(
                "{} cannot be used as an operand",
                term_name(other)
            ))),
        }
    }

    fn op_buffer(&self, list: &mut WalkList, size: Option<&Term>, bytes: &[u8]) -> AmlResult<ObjectHandle> {
        let size = match size {
            Some(size) => {
                let size = self.eval_integer(list, size)?;
                usize::try_from(size).map_err(|_| AmlError::NoMemory)?
            }
            None => bytes.len(),
        };
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(size.max(bytes.len()))
            .map_err(|_| AmlError::NoMemory)?;
        buffer.extend_from_slice(bytes);
        if buffer.len() < size {
            buffer.resize(size, 0);
        }
        Ok(ObjectHandle::buffer(buffer))
    }

    fn op_package(
        &self,
        list: &mut WalkList,
        count: Option<&Term>,
        elements: &[Term],
    ) -> AmlResult<ObjectHandle> {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            values.push(self.package_element(list, element)?);
        }

        if let Some(count) = count {
            let count = self.eval_integer(list, count)?;
            let count = usize::try_from(count).map_err(|_| AmlError::NoMemory)?;
            if count < values.len() {
                log::warn!(
                    "package initializer has {} elements, declared {}",
                    values.len(),
                    count
                );
                values.truncate(count);
            } else {
                values
                    .try_reserve_exact(count - values.len())
                    .map_err(|_| AmlError::NoMemory)?;
                values.resize_with(count, || ObjectHandle::integer(0));
            }
        }
        Ok(ObjectHandle::package(values))
    }

    /// Package elements keep unresolved names as strings
    fn package_element(&self, list: &mut WalkList, element: &Term) -> AmlResult<ObjectHandle> {
        match element {
            Term::NameRef(path) => {
                let scope = list.current()?.current_scope();
                match self.namespace.lock().find(scope, path) {
                    Ok(node) => Ok(ObjectHandle::new(Object::Reference(Reference::Name(node)))),
                    Err(AmlError::NotFound(_)) => Ok(ObjectHandle::string(path.to_string())),
                    Err(err) => Err(err),
                }
            }
            other => {
                let value = self.eval_term(list, other)?;
                Ok(owned_copy(value))
            }
        }
    }

    fn op_divide(
        &self,
        list: &mut WalkList,
        dividend: &Term,
        divisor: &Term,
        remainder: &Target,
        quotient: &Target,
    ) -> AmlResult<ObjectHandle> {
        let [dividend, divisor] = self.integer_operands(list, [dividend, divisor])?;
        if divisor == 0 {
            return Err(AmlError::DivideByZero);
        }
        let result = ObjectHandle::integer(dividend / divisor);
        self.finish(list, ObjectHandle::integer(dividend % divisor), remainder)?;
        self.finish(list, result, quotient)
    }

    fn op_step(&self, list: &mut WalkList, target: &Target, up: bool) -> AmlResult<ObjectHandle> {
        let current = self.target_value(list, target)?;
        let value = self.operand_integer(list, &current)?;
        let value = if up {
            value.wrapping_add(1)
        } else {
            value.wrapping_sub(1)
        };
        let result = ObjectHandle::integer(self.integer_width().truncate(value));
        self.finish(list, result, target)
    }

    fn op_logical(
        &self,
        list: &mut WalkList,
        op: LogicalOp,
        left: &Term,
        right: &Term,
    ) -> AmlResult<bool> {
        if let LogicalOp::And | LogicalOp::Or = op {
            let [a, b] = self.integer_operands(list, [left, right])?;
            return Ok(if op == LogicalOp::And {
                a != 0 && b != 0
            } else {
                a != 0 || b != 0
            });
        }

        let [a, b] = self.eval_operands(list, [left, right])?;
        let a = self.resolve_operand(list, &a)?;
        let b = self.resolve_operand(list, &b)?;
        let ordering = compare(&a, &b, self.integer_width())?;
        Ok(matches!(
            (op, ordering),
            (LogicalOp::Equal, Ordering::Equal)
                | (LogicalOp::NotEqual, Ordering::Less | Ordering::Greater)
                | (LogicalOp::Greater, Ordering::Greater)
                | (LogicalOp::GreaterEqual, Ordering::Greater | Ordering::Equal)
                | (LogicalOp::Less, Ordering::Less)
                | (LogicalOp::LessEqual, Ordering::Less | Ordering::Equal)
        ))
    }

    fn op_cond_ref_of(
        &self,
        list: &mut WalkList,
        source: &Target,
        target: &Target,
    ) -> AmlResult<ObjectHandle> {
        let reference = match self.reference_to(list, source) {
            Ok(reference) => reference,
            Err(AmlError::NotFound(_)) => return Ok(ObjectHandle::integer(0)),
            Err(err) => return Err(err),
        };
        if let Some(destination) = self.resolve_target(list, target)? {
            self.store(list, reference, &destination)?;
        }
        Ok(self.boolean(true))
    }

    fn op_index(
        &self,
        list: &mut WalkList,
        source: &Term,
        index: &Term,
        target: &Target,
    ) -> AmlResult<ObjectHandle> {
        let [container, index] = self.eval_operands(list, [source, index])?;
        let container = self.resolve_operand(list, &container)?;
        let index = self.operand_integer(list, &index)?;

        let (length, kind) = match &*container.read() {
            Object::Package(elements) => (elements.len(), IndexTarget::PackageElement),
            Object::Buffer(bytes) => (bytes.len(), IndexTarget::BufferByte),
            Object::String(text) => (text.len(), IndexTarget::BufferByte),
            other => {
                return Err(AmlError::type_mismatch(
                    ObjectType::Package,
                    other.object_type(),
                ))
            }
        };
        let position = usize::try_from(index)
            .ok()
            .filter(|position| *position < length)
            .ok_or(AmlError::BufferOverflow {
                index,
                length: length as u64,
            })?;

        let reference = ObjectHandle::new(Object::Reference(Reference::Index(IndexRef {
            container,
            index: position,
            target: kind,
        })));
        self.finish(list, reference, target)
    }

    fn op_size_of(&self, list: &mut WalkList, target: &Target) -> AmlResult<ObjectHandle> {
        let value = self.target_value(list, target)?;
        let value = if value.object_type() == ObjectType::Reference {
            self.dereference(list, &value)?
        } else {
            value
        };
        let size = match &*value.read() {
            Object::String(text) => text.len(),
            Object::Buffer(bytes) => bytes.len(),
            Object::Package(elements) => elements.len(),
            other => {
                return Err(AmlError::type_mismatch(
                    ObjectType::Buffer,
                    other.object_type(),
                ))
            }
        };
        Ok(ObjectHandle::integer(size as u64))
    }

    // ========================================================================
    // Operands
    // ========================================================================

    /// Evaluate operands in order through the result and operand stacks
    fn eval_operand_list(&self, list: &mut WalkList, terms: &[&Term]) -> AmlResult<Vec<ObjectHandle>> {
        let base = list.current()?.results.len();
        for term in terms {
            let pushed = self
                .eval_term(list, term)
                .and_then(|value| list.current_mut()?.results.push(value));
            if let Err(err) = pushed {
                if let Ok(state) = list.current_mut() {
                    state.results.truncate(base);
                }
                return Err(err);
            }
        }

        let state = list.current_mut()?;
        for _ in 0..terms.len() {
            let value = state.results.pop()?;
            state.operands.push(value)?;
        }
        let mut values = Vec::with_capacity(terms.len());
        for _ in 0..terms.len() {
            values.push(state.operands.pop()?);
        }
        Ok(values)
    }

    fn eval_operands<const N: usize>(
        &self,
        list: &mut WalkList,
        terms: [&Term; N],
    ) -> AmlResult<[ObjectHandle; N]> {
        let values = self.eval_operand_list(list, &terms)?;
        values
            .try_into()
            .map_err(|_| AmlError::InternalInconsistency("operand count".to_string()))
    }

    fn integer_operands<const N: usize>(
        &self,
        list: &mut WalkList,
        terms: [&Term; N],
    ) -> AmlResult<[u64; N]> {
        let values = self.eval_operands(list, terms)?;
        let mut integers = [0u64; N];
        for (integer, value) in integers.iter_mut().zip(&values) {
            *integer = self.operand_integer(list, value)?;
        }
        Ok(integers)
    }

    fn eval_integer(&self, list: &mut WalkList, term: &Term) -> AmlResult<u64> {
        let value = self.eval_term(list, term)?;
        self.operand_integer(list, &value)
    }

    /// Integer value of an operand, converting strings and buffers
    pub(crate) fn operand_integer(&self, list: &mut WalkList, value: &ObjectHandle) -> AmlResult<u64> {
        let value = self.resolve_operand(list, value)?;
        let value = value.read();
        to_integer(&value, self.integer_width())
    }

    fn boolean(&self, truth: bool) -> ObjectHandle {
        ObjectHandle::integer(if truth { self.integer_width().ones() } else { 0 })
    }

    fn slot_value(&self, list: &mut WalkList, kind: SlotKind, index: u8) -> AmlResult<ObjectHandle> {
        let value = list.current()?.frame.get_value(kind, usize::from(index))?;
        self.slot_object(list, value)
    }

    fn slot_ref(&self, list: &WalkList, kind: SlotKind, index: u8) -> AmlResult<SlotRef> {
        let index = usize::from(index);
        if index >= kind.capacity() {
            return Err(AmlError::InvalidIndex { kind, index });
        }
        Ok(SlotRef {
            frame: list.current()?.frame_id(),
            kind,
            index,
        })
    }

    /// Resolve a name against the current scope, searching parents
    pub(crate) fn lookup_node(
        &self,
        list: &WalkList,
        path: &NamePath,
        expected: ObjectType,
    ) -> AmlResult<NodeId> {
        let scope = list.current()?.current_scope();
        let request = Lookup::new(scope, path).expecting(expected);
        self.namespace.lock().lookup(&request, None)
    }

    /// Invoke a method by name, or read a non-method object named without
    /// arguments
    fn call(&self, list: &mut WalkList, path: &NamePath, args: &[Term]) -> AmlResult<Option<ObjectHandle>> {
        let node = self.lookup_node(list, path, ObjectType::Any)?;
        let ty = self.namespace.lock().object_type(node)?;
        if ty != ObjectType::Method {
            if !args.is_empty() {
                return Err(AmlError::type_mismatch(ObjectType::Method, ty));
            }
            return self.node_value(list, node).map(Some);
        }

        let terms: Vec<&Term> = args.iter().collect();
        let values = self.eval_operand_list(list, &terms)?;
        let args = values.into_iter().map(SlotValue::Object).collect();
        self.invoke_method(list, node, args)
    }

    // ========================================================================
    // Targets
    // ========================================================================

    /// Where an operator result goes; `None` for the null target
    pub(crate) fn resolve_target(
        &self,
        list: &mut WalkList,
        target: &Target,
    ) -> AmlResult<Option<Destination>> {
        let destination = match target {
            Target::Null => return Ok(None),
            Target::Name(path) => Destination::Node(self.lookup_node(list, path, ObjectType::Any)?),
            Target::Local(index) => {
                let slot = self.slot_ref(list, SlotKind::Local, *index)?;
                Destination::Object(ObjectHandle::new(Object::Reference(Reference::Slot(slot))))
            }
            Target::Arg(index) => {
                let slot = self.slot_ref(list, SlotKind::Arg, *index)?;
                Destination::Object(ObjectHandle::new(Object::Reference(Reference::Slot(slot))))
            }
            Target::Debug => Destination::Object(ObjectHandle::new(Object::Reference(Reference::Debug))),
            Target::Reference(term) => {
                let inner = match &**term {
                    Term::DerefOf(inner) => &**inner,
                    other => other,
                };
                let value = self.eval_term(list, inner)?;
                self.reference_destination(list, value)?
            }
        };
        Ok(Some(destination))
    }

    fn reference_destination(&self, list: &mut WalkList, value: ObjectHandle) -> AmlResult<Destination> {
        let path = match &*value.read() {
            Object::Reference(_) | Object::Integer(_) => None,
            Object::String(text) => Some(NamePath::parse(text)?),
            other => {
                return Err(AmlError::BadOpcode(format!(
                    "{} is not a valid target",
                    other.object_type()
                )))
            }
        };
        match path {
            Some(path) => Ok(Destination::Node(self.lookup_node(list, &path, ObjectType::Any)?)),
            None => Ok(Destination::Object(value)),
        }
    }

    /// Store an operator result into its target and hand it back
    fn finish(&self, list: &mut WalkList, value: ObjectHandle, target: &Target) -> AmlResult<ObjectHandle> {
        if let Some(destination) = self.resolve_target(list, target)? {
            self.store(list, value.clone(), &destination)?;
        }
        Ok(value)
    }

    /// Current value of a SuperName operand
    pub(crate) fn target_value(&self, list: &mut WalkList, target: &Target) -> AmlResult<ObjectHandle> {
        match target {
            Target::Null => Err(AmlError::BadOpcode("missing operand".to_string())),
            Target::Name(path) => {
                let node = self.lookup_node(list, path, ObjectType::Any)?;
                self.node_value(list, node)
            }
            Target::Local(index) => self.slot_value(list, SlotKind::Local, *index),
            Target::Arg(index) => self.slot_value(list, SlotKind::Arg, *index),
            Target::Debug => Ok(ObjectHandle::new(Object::Debug)),
            Target::Reference(term) => {
                let value = self.eval_term(list, term)?;
                self.resolve_operand(list, &value)
            }
        }
    }

    /// `RefOf` a SuperName
    fn reference_to(&self, list: &mut WalkList, target: &Target) -> AmlResult<ObjectHandle> {
        let reference = match target {
            Target::Null => return Err(AmlError::BadOpcode("RefOf without operand".to_string())),
            Target::Name(path) => {
                Reference::RefOf(RefTarget::Node(self.lookup_node(list, path, ObjectType::Any)?))
            }
            Target::Local(index) => {
                Reference::RefOf(RefTarget::Slot(self.slot_ref(list, SlotKind::Local, *index)?))
            }
            Target::Arg(index) => {
                Reference::RefOf(RefTarget::Slot(self.slot_ref(list, SlotKind::Arg, *index)?))
            }
            Target::Debug => Reference::Debug,
            Target::Reference(term) => {
                let value = self.eval_term(list, term)?;
                return match self.reference_destination(list, value)? {
                    Destination::Node(node) => Ok(ObjectHandle::new(Object::Reference(
                        Reference::RefOf(RefTarget::Node(node)),
                    ))),
                    Destination::Object(object) => Ok(object),
                };
            }
        };
        Ok(ObjectHandle::new(Object::Reference(reference)))
    }

    /// `ObjectType` of a SuperName, looking through references
    fn target_type(&self, list: &mut WalkList, target: &Target) -> AmlResult<ObjectType> {
        let value = match target {
            Target::Null => return Err(AmlError::BadOpcode("missing operand".to_string())),
            Target::Debug => return Ok(ObjectType::Debug),
            Target::Name(path) => {
                let node = self.lookup_node(list, path, ObjectType::Any)?;
                return self.namespace.lock().object_type(node);
            }
            Target::Local(index) => list
                .current()?
                .frame
                .get_value(SlotKind::Local, usize::from(*index))?,
            Target::Arg(index) => list
                .current()?
                .frame
                .get_value(SlotKind::Arg, usize::from(*index))?,
            Target::Reference(term) => SlotValue::Object(self.eval_term(list, term)?),
        };
        match value {
            SlotValue::Node(node) => self.namespace.lock().object_type(node),
            SlotValue::Object(object) => self.object_type_of(list, &object),
            SlotValue::Unset => Ok(ObjectType::Any),
        }
    }

    fn object_type_of(&self, list: &WalkList, object: &ObjectHandle) -> AmlResult<ObjectType> {
        let reference = match &*object.read() {
            Object::Reference(reference) => reference.clone(),
            other => return Ok(other.object_type()),
        };
        match reference {
            Reference::Name(node) | Reference::RefOf(RefTarget::Node(node)) => {
                self.namespace.lock().object_type(node)
            }
            Reference::Slot(slot) | Reference::RefOf(RefTarget::Slot(slot)) => {
                let frame = list.find_frame(slot.frame).ok_or_else(|| {
                    AmlError::NotFound(format!("{}{} of a finished method", slot.kind, slot.index))
                })?;
                Ok(frame.get_node(slot.kind, slot.index)?.ty)
            }
            Reference::Index(index) => match index.target {
                IndexTarget::BufferByte => Ok(ObjectType::BufferField),
                IndexTarget::PackageElement => match &*index.container.read() {
                    Object::Package(elements) => Ok(elements
                        .get(index.index)
                        .map(|element| element.object_type())
                        .unwrap_or(ObjectType::Any)),
                    other => Ok(other.object_type()),
                },
            },
            Reference::Debug => Ok(ObjectType::Debug),
        }
    }
}

/// Integer operator on values already truncated to `width`
fn binary(op: BinaryOp, a: u64, b: u64, width: IntegerWidth) -> AmlResult<u64> {
    let bits = u64::from(width.bits());
    let value = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Subtract => a.wrapping_sub(b),
        BinaryOp::Multiply => a.wrapping_mul(b),
        BinaryOp::Mod => {
            if b == 0 {
                return Err(AmlError::DivideByZero);
            }
            a % b
        }
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Nand => !(a & b),
        BinaryOp::Nor => !(a | b),
        BinaryOp::ShiftLeft if b >= bits => 0,
        BinaryOp::ShiftLeft => a << b,
        BinaryOp::ShiftRight if b >= bits => 0,
        BinaryOp::ShiftRight => a >> b,
    };
    Ok(width.truncate(value))
}

/// Compare two data objects; the left operand selects the comparison type
fn compare(left: &ObjectHandle, right: &ObjectHandle, width: IntegerWidth) -> AmlResult<Ordering> {
    let right = right.read().duplicate();
    let left = left.read();
    match &*left {
        Object::Integer(value) => Ok(width.truncate(*value).cmp(&to_integer(&right, width)?)),
        Object::String(text) => {
            let other = convert::to_string_implicit(&right, width)?;
            Ok(text.as_bytes().cmp(other.as_bytes()))
        }
        Object::Buffer(bytes) => {
            let other = convert::to_buffer(&right, width)?;
            Ok(bytes.as_slice().cmp(other.as_slice()))
        }
        other => Err(AmlError::type_mismatch(
            ObjectType::Integer,
            other.object_type(),
        )),
    }
}

fn convert_op(op: ConvertOp, value: &Object, width: IntegerWidth) -> AmlResult<Object> {
    Ok(match op {
        ConvertOp::ToInteger => Object::Integer(convert::to_integer_explicit(value, width)?),
        ConvertOp::ToBuffer => Object::Buffer(convert::to_buffer(value, width)?),
        ConvertOp::ToHexString => Object::String(convert::to_hex_string(value, width)?),
        ConvertOp::ToDecimalString => Object::String(convert::to_decimal_string(value, width)?),
        ConvertOp::ToBcd => Object::Integer(convert::to_bcd(to_integer(value, width)?, width)?),
        ConvertOp::FromBcd => Object::Integer(convert::from_bcd(to_integer(value, width)?, width)?),
    })
}

fn term_name(term: &Term) -> &'static str {
    match term {
        Term::If { .. } => "If",
        Term::While { .. } => "While",
        Term::Break => "Break",
        Term::Continue => "Continue",
        Term::Return(_) => "Return",
        Term::Noop => "Noop",
        Term::Release(_) => "Release",
        Term::Signal(_) => "Signal",
        Term::Reset(_) => "Reset",
        Term::Sleep(_) => "Sleep",
        Term::Stall(_) => "Stall",
        _ => "definition",
    }
}
