//! Operand resolution and deferred evaluation
//!
//! Regions, buffer fields and non-constant Buffer/Package initializers keep
//! their operand terms until first use. Forcing one evaluates the terms in
//! the scope that declared it and replaces the pending state in place, so
//! every holder of the object sees the result.

use super::Interpreter;
use crate::field::FieldDescriptor;
use crate::name::{NamePath, NameSeg};
use crate::namespace::NodeId;
use crate::object::convert::to_integer;
use crate::object::reference::{IndexTarget, RefTarget, SlotRef};
use crate::object::{
    BufferBinding, Deferred, DeferredTerm, Object, ObjectHandle, ObjectType, Reference,
    RegionExtent,
};
use crate::region::{PciLocation, RegionSpace};
use crate::walk::{SlotValue, WalkList};
use crate::{AmlError, AmlResult};

/// What a node's attached object needs before it can be used as a value
enum NodeValue {
    Field,
    Deferred,
    Plain,
}

impl Interpreter {
    /// Value of a namespace node as an operand
    ///
    /// Fields are read, pending initializers are run, and a node without an
    /// object yields a name reference to itself.
    pub(crate) fn node_value(&self, list: &mut WalkList, node: NodeId) -> AmlResult<ObjectHandle> {
        let object = {
            let ns = self.namespace.lock();
            let node = ns.resolve_alias(node)?;
            ns.object(node).ok_or(node)
        };
        let object = match object {
            Ok(object) => object,
            Err(node) => return Ok(ObjectHandle::new(Object::Reference(Reference::Name(node)))),
        };

        let kind = match &*object.read() {
            Object::BufferField(_)
            | Object::RegionField(_)
            | Object::BankField(_)
            | Object::IndexField(_) => NodeValue::Field,
            Object::Deferred(_) => NodeValue::Deferred,
            _ => NodeValue::Plain,
        };
        match kind {
            NodeValue::Field => self.read_field(list, &object),
            NodeValue::Deferred => {
                self.force_data(list, &object)?;
                Ok(object)
            }
            NodeValue::Plain => Ok(object),
        }
    }

    /// Object an operand stands for
    ///
    /// Name, slot and index references resolve to the referenced value; a
    /// package element that is itself a name reference resolves once more.
    /// `RefOf` references and plain objects are returned as is.
    pub(crate) fn resolve_operand(
        &self,
        list: &mut WalkList,
        operand: &ObjectHandle,
    ) -> AmlResult<ObjectHandle> {
        let reference = match &*operand.read() {
            Object::Reference(
                reference @ (Reference::Name(_) | Reference::Slot(_) | Reference::Index(_)),
            ) => reference.clone(),
            _ => return Ok(operand.clone()),
        };
        let resolved = self.deref_reference(list, reference)?;
        let inner = match &*resolved.read() {
            Object::Reference(Reference::Name(node)) => Some(*node),
            _ => None,
        };
        match inner {
            Some(node) => self.node_value(list, node),
            None => Ok(resolved),
        }
    }

    /// `DerefOf`: the object a reference (or a name string) designates
    pub(crate) fn dereference(
        &self,
        list: &mut WalkList,
        value: &ObjectHandle,
    ) -> AmlResult<ObjectHandle> {
        let reference = match &*value.read() {
            Object::Reference(reference) => reference.clone(),
            Object::String(text) => {
                let path = NamePath::parse(text)?;
                let scope = list.current()?.current_scope();
                Reference::Name(self.namespace.lock().find(scope, &path)?)
            }
            other => {
                return Err(AmlError::type_mismatch(
                    ObjectType::Reference,
                    other.object_type(),
                ))
            }
        };
        self.deref_reference(list, reference)
    }

    fn deref_reference(
        &self,
        list: &mut WalkList,
        reference: Reference,
    ) -> AmlResult<ObjectHandle> {
        match reference {
            Reference::Name(node) | Reference::RefOf(RefTarget::Node(node)) => {
                self.node_value(list, node)
            }
            Reference::Slot(slot) | Reference::RefOf(RefTarget::Slot(slot)) => {
                self.slot_ref_value(list, slot)
            }
            Reference::Index(index) => match (&*index.container.read(), index.target) {
                (Object::Package(elements), IndexTarget::PackageElement) => {
                    elements.get(index.index).cloned().ok_or(AmlError::BufferOverflow {
                        index: index.index as u64,
                        length: elements.len() as u64,
                    })
                }
                (Object::Buffer(bytes), IndexTarget::BufferByte) => bytes
                    .get(index.index)
                    .map(|byte| ObjectHandle::integer(u64::from(*byte)))
                    .ok_or(AmlError::BufferOverflow {
                        index: index.index as u64,
                        length: bytes.len() as u64,
                    }),
                (Object::String(text), IndexTarget::BufferByte) => text
                    .as_bytes()
                    .get(index.index)
                    .map(|byte| ObjectHandle::integer(u64::from(*byte)))
                    .ok_or(AmlError::BufferOverflow {
                        index: index.index as u64,
                        length: text.len() as u64,
                    }),
                (other, _) => Err(AmlError::type_mismatch(
                    ObjectType::Package,
                    other.object_type(),
                )),
            },
            Reference::Debug => Err(AmlError::BadOpcode("Debug object has no value".to_string())),
        }
    }

    /// Value of a slot in any frame of the chain
    pub(crate) fn slot_ref_value(
        &self,
        list: &mut WalkList,
        slot: SlotRef,
    ) -> AmlResult<ObjectHandle> {
        let value = list
            .find_frame(slot.frame)
            .ok_or_else(|| {
                AmlError::NotFound(format!("{}{} of a finished method", slot.kind, slot.index))
            })?
            .get_value(slot.kind, slot.index)?;
        self.slot_object(list, value)
    }

    pub(crate) fn slot_object(
        &self,
        list: &mut WalkList,
        value: SlotValue,
    ) -> AmlResult<ObjectHandle> {
        match value {
            SlotValue::Object(object) => Ok(object),
            SlotValue::Node(node) => self.node_value(list, node),
            SlotValue::Unset => Err(AmlError::InternalInconsistency(
                "unset slot read".to_string(),
            )),
        }
    }

    // ========================================================================
    // Deferred operands
    // ========================================================================

    /// Evaluate captured operand terms in their declaring scope
    pub(crate) fn eval_deferred(
        &self,
        list: &mut WalkList,
        deferred: &DeferredTerm,
    ) -> AmlResult<Vec<ObjectHandle>> {
        let owner = list.current()?.owner;
        self.begin_walk(list, owner, deferred.scope);
        let result = deferred
            .args
            .iter()
            .map(|term| {
                let value = self.eval_term(list, term)?;
                self.resolve_operand(list, &value)
            })
            .collect::<AmlResult<Vec<_>>>();
        self.end_walk(list);
        result
    }

    fn deferred_integer(&self, values: &[ObjectHandle], index: usize) -> AmlResult<u64> {
        let value = values.get(index).ok_or_else(|| {
            AmlError::InternalInconsistency(format!("missing deferred operand {}", index))
        })?;
        let value = value.read();
        to_integer(&value, self.integer_width())
    }

    /// Resolve a region's address and length on first use
    pub(crate) fn force_region(
        &self,
        list: &mut WalkList,
        region: &ObjectHandle,
    ) -> AmlResult<RegionExtent> {
        let pending = match &*region.read() {
            Object::Region(r) => match &r.extent {
                Deferred::Ready(extent) => return Ok(*extent),
                Deferred::Pending(term) => term.clone(),
            },
            other => return Err(AmlError::type_mismatch(ObjectType::Region, other.object_type())),
        };
        let values = self.eval_deferred(list, &pending)?;
        self.bind_region(list, region, &values)
    }

    /// Resolve a region from its evaluated address and length operands
    pub(crate) fn bind_region(
        &self,
        list: &mut WalkList,
        region: &ObjectHandle,
        values: &[ObjectHandle],
    ) -> AmlResult<RegionExtent> {
        let (space, node) = match &*region.read() {
            Object::Region(r) => (r.space, r.node),
            other => return Err(AmlError::type_mismatch(ObjectType::Region, other.object_type())),
        };
        let address = self.deferred_integer(values, 0)?;
        let length = self.deferred_integer(values, 1)?;
        let pci = match space {
            RegionSpace::PciConfig => Some(self.pci_location(list, node)?),
            _ => None,
        };
        let extent = RegionExtent {
            address,
            length,
            pci,
        };
        log::debug!(
            "region {} ({:?}) at {:#x} length {:#x}",
            self.namespace.lock().display_path(node),
            space,
            address,
            length
        );

        if let Object::Region(r) = &mut *region.write() {
            if !r.extent.resolve(extent) {
                if let Some(existing) = r.extent.ready() {
                    return Ok(*existing);
                }
            }
        }
        Ok(extent)
    }

    /// Bus location of a PCI configuration region from `_ADR`, `_BBN`, `_SEG`
    fn pci_location(&self, list: &mut WalkList, region_node: NodeId) -> AmlResult<PciLocation> {
        let device = self
            .namespace
            .lock()
            .parent(region_node)
            .ok_or_else(|| AmlError::InternalInconsistency("region without parent".to_string()))?;
        let adr = self.child_integer(list, device, "_ADR", false)?.unwrap_or(0);
        let bbn = self.child_integer(list, device, "_BBN", true)?.unwrap_or(0);
        let seg = self.child_integer(list, device, "_SEG", true)?.unwrap_or(0);
        Ok(PciLocation::from_acpi(adr, bbn, seg))
    }

    /// Integer value of a named child of `scope`, evaluating methods
    ///
    /// With `search_up`, ancestor scopes are searched as well. Returns `None`
    /// when the name does not exist.
    pub(crate) fn child_integer(
        &self,
        list: &mut WalkList,
        scope: NodeId,
        name: &str,
        search_up: bool,
    ) -> AmlResult<Option<u64>> {
        let seg = NameSeg::new(name)?;
        let node = {
            let ns = self.namespace.lock();
            if search_up {
                ns.find(scope, &NamePath::single(seg)).ok()
            } else {
                ns.child(scope, seg).map(|node| ns.resolve_alias(node)).transpose()?
            }
        };
        let Some(node) = node else {
            return Ok(None);
        };

        let value = if self.namespace.lock().object_type(node)? == ObjectType::Method {
            self.invoke_method(list, node, Vec::new())?
                .ok_or_else(|| AmlError::NoReturnValue(name.to_string()))?
        } else {
            self.node_value(list, node)?
        };
        let value = self.resolve_operand(list, &value)?;
        let value = value.read();
        Ok(Some(to_integer(&value, self.integer_width())?))
    }

    /// Bind a buffer field to its buffer on first use
    pub(crate) fn force_buffer_field(
        &self,
        list: &mut WalkList,
        field: &ObjectHandle,
    ) -> AmlResult<BufferBinding> {
        let pending = match &*field.read() {
            Object::BufferField(f) => match &f.binding {
                Deferred::Ready(binding) => return Ok(binding.clone()),
                Deferred::Pending(term) => term.clone(),
            },
            other => {
                return Err(AmlError::type_mismatch(
                    ObjectType::BufferField,
                    other.object_type(),
                ))
            }
        };
        let values = self.eval_deferred(list, &pending)?;
        self.bind_buffer_field(field, &values)
    }

    /// Bind a buffer field from its evaluated buffer, index and length operands
    pub(crate) fn bind_buffer_field(
        &self,
        field: &ObjectHandle,
        values: &[ObjectHandle],
    ) -> AmlResult<BufferBinding> {
        let kind = match &*field.read() {
            Object::BufferField(f) => f.kind,
            other => {
                return Err(AmlError::type_mismatch(
                    ObjectType::BufferField,
                    other.object_type(),
                ))
            }
        };
        let buffer = values
            .first()
            .cloned()
            .ok_or_else(|| AmlError::InternalInconsistency("missing buffer operand".to_string()))?;
        let buffer_len = match &*buffer.read() {
            Object::Buffer(bytes) => bytes.len() as u64,
            other => return Err(AmlError::type_mismatch(ObjectType::Buffer, other.object_type())),
        };

        let (unit_bits, fixed_bits, access) = kind.layout();
        let index = self.deferred_integer(values, 1)?;
        let bit_length = match fixed_bits {
            Some(bits) => u64::from(bits),
            None => self.deferred_integer(values, 2)?,
        };
        let bit_position = index
            .checked_mul(u64::from(unit_bits))
            .ok_or(AmlError::NumericOverflow)?;
        let end_bit = bit_position
            .checked_add(bit_length)
            .ok_or(AmlError::NumericOverflow)?;
        if end_bit > buffer_len * 8 {
            return Err(AmlError::BufferOverflow {
                index: end_bit.div_ceil(8),
                length: buffer_len,
            });
        }
        let to_u32 = |value: u64| {
            u32::try_from(value).map_err(|_| AmlError::BufferOverflow {
                index: value / 8,
                length: buffer_len,
            })
        };
        let binding = BufferBinding {
            buffer,
            field: FieldDescriptor::for_buffer(to_u32(bit_position)?, to_u32(bit_length)?, access)?,
        };

        if let Object::BufferField(f) = &mut *field.write() {
            if !f.binding.resolve(binding.clone()) {
                if let Some(existing) = f.binding.ready() {
                    return Ok(existing.clone());
                }
            }
        }
        Ok(binding)
    }

    /// Run a deferred Buffer or Package initializer in place
    pub(crate) fn force_data(&self, list: &mut WalkList, object: &ObjectHandle) -> AmlResult<()> {
        let pending = match &*object.read() {
            Object::Deferred(data) => data.term.clone(),
            _ => return Ok(()),
        };
        let values = self.eval_deferred(list, &pending)?;
        let value = values
            .first()
            .ok_or_else(|| AmlError::InternalInconsistency("empty initializer".to_string()))?
            .read()
            .duplicate();

        let mut slot = object.write();
        if matches!(&*slot, Object::Deferred(_)) {
            *slot = value;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::{NodeFlags, OwnerId};
    use crate::object::{DeferredData, Region};
    use crate::options::InterpreterOptions;
    use crate::term::Term;

    fn interp() -> Interpreter {
        Interpreter::new(InterpreterOptions::default()).unwrap()
    }

    fn with_walk<T>(interp: &Interpreter, f: impl FnOnce(&mut WalkList) -> T) -> T {
        let mut list = WalkList::new();
        let root = interp.namespace().root();
        interp.begin_walk(&mut list, OwnerId::ROOT, root);
        let result = f(&mut list);
        interp.end_walk(&mut list);
        result
    }

    #[test]
    fn test_node_without_object_yields_name_reference() {
        let interp = interp();
        let node = {
            let mut ns = interp.namespace();
            let root = ns.root();
            let name = NameSeg::new("EMPT").unwrap();
            ns.create(root, name, ObjectType::Any, OwnerId::ROOT, NodeFlags::NONE)
                .unwrap()
        };
        let value = with_walk(&interp, |list| interp.node_value(list, node)).unwrap();
        assert!(matches!(&*value.read(), Object::Reference(Reference::Name(n)) if *n == node));
    }

    #[test]
    fn test_force_region_once() {
        let interp = interp();
        let root = interp.namespace().root();
        let region = ObjectHandle::new(Object::Region(Region {
            space: RegionSpace::SystemMemory,
            extent: Deferred::Pending(DeferredTerm::new(
                root,
                vec![Term::Integer(0x1000), Term::Integer(0x10)],
            )),
            node: root,
        }));

        let extent = with_walk(&interp, |list| interp.force_region(list, &region)).unwrap();
        assert_eq!(extent.address, 0x1000);
        assert_eq!(extent.length, 0x10);
        assert!(extent.pci.is_none());
        assert!(matches!(&*region.read(), Object::Region(r) if r.extent.is_ready()));
    }

    #[test]
    fn test_force_data_replaces_in_place() {
        let interp = interp();
        let root = interp.namespace().root();
        let object = ObjectHandle::new(Object::Deferred(DeferredData {
            ty: ObjectType::Buffer,
            term: DeferredTerm::new(
                root,
                vec![Term::Buffer {
                    size: Some(Box::new(Term::Integer(4))),
                    bytes: vec![7],
                }],
            ),
        }));
        let alias = object.clone();

        with_walk(&interp, |list| interp.force_data(list, &object)).unwrap();
        assert!(matches!(&*alias.read(), Object::Buffer(b) if b == &[7, 0, 0, 0]));
    }
}
