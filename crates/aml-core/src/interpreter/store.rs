//! Store engine
//!
//! `Store` converts the source to the type of a typed destination (Integer,
//! String, Buffer, fields); every other destination receives a copy of the
//! source as is. `CopyObject` never converts: the destination takes both the
//! value and the type of the source.
//!
//! | destination           | Store                         | CopyObject        |
//! |-----------------------|-------------------------------|-------------------|
//! | Integer/String/Buffer | convert, overwrite in place   | replace object    |
//! | field                 | write through the field       | write through     |
//! | untyped name          | attach a copy                 | attach a copy     |
//! | Local                 | replace                       | replace           |
//! | Arg holding `RefOf`   | store through the reference   | same              |
//! | Index of a Package    | overwrite element             | same              |
//! | Index of a Buffer     | write the low byte            | same              |
//! | Index of a String     | write an ASCII byte           | same              |
//! | Debug                 | log the value                 | same              |

use super::Interpreter;
use crate::namespace::NodeId;
use crate::object::convert::{convert_for_store, truncate_string};
use crate::object::reference::{IndexRef, IndexTarget, RefTarget, SlotRef};
use crate::object::{Object, ObjectHandle, ObjectType, Reference};
use crate::walk::{MethodFrame, SlotKind, SlotValue, WalkList};
use crate::{AmlError, AmlResult};

/// Where a result is stored
#[derive(Debug, Clone)]
pub enum Destination {
    /// A namespace node
    Node(NodeId),
    /// A reference object (slot, `RefOf`, `Index`, Debug); an Integer
    /// destination is a constant and silently ignores the store
    Object(ObjectHandle),
}

/// How the destination treats the source type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreMode {
    /// `Store` and operator targets: implicit conversion
    Convert,
    /// `CopyObject` and stores through an Arg reference: no conversion
    Copy,
}

impl Interpreter {
    /// Store `source` into `destination`
    pub fn store(
        &self,
        list: &mut WalkList,
        source: ObjectHandle,
        destination: &Destination,
    ) -> AmlResult<()> {
        self.store_with_mode(list, source, destination, StoreMode::Convert)
    }

    /// `CopyObject`: store without conversion
    pub fn copy_object(
        &self,
        list: &mut WalkList,
        source: ObjectHandle,
        destination: &Destination,
    ) -> AmlResult<()> {
        self.store_with_mode(list, source, destination, StoreMode::Copy)
    }

    fn store_with_mode(
        &self,
        list: &mut WalkList,
        source: ObjectHandle,
        destination: &Destination,
        mode: StoreMode,
    ) -> AmlResult<()> {
        let target = match destination {
            Destination::Node(node) => return self.store_to_node(list, source, *node, mode),
            Destination::Object(target) => target,
        };
        if source.ptr_eq(target) {
            return Ok(());
        }

        let reference = match &*target.read() {
            Object::Reference(reference) => reference.clone(),
            Object::Integer(_) => return Ok(()),
            other => {
                return Err(AmlError::BadOpcode(format!(
                    "{} is not a store target",
                    other.object_type()
                )))
            }
        };

        match reference {
            Reference::Name(node) | Reference::RefOf(RefTarget::Node(node)) => {
                self.store_to_node(list, source, node, mode)
            }
            Reference::Slot(slot) | Reference::RefOf(RefTarget::Slot(slot)) => {
                self.store_to_slot(list, source, slot)
            }
            Reference::Index(index) => self.store_to_index(list, source, &index),
            Reference::Debug => {
                self.store_to_debug(&source);
                Ok(())
            }
        }
    }

    fn store_to_debug(&self, source: &ObjectHandle) {
        match &*source.read() {
            Object::Package(elements) => {
                log::info!(target: "aml::debug", "Package ({} elements)", elements.len());
                for (i, element) in elements.iter().enumerate() {
                    log::info!(target: "aml::debug", "  [{}] {}", i, &*element.read());
                }
            }
            other => log::info!(target: "aml::debug", "{}", other),
        }
    }

    // ========================================================================
    // Named destinations
    // ========================================================================

    /// Store into a namespace node
    pub(crate) fn store_to_node(
        &self,
        list: &mut WalkList,
        source: ObjectHandle,
        node: NodeId,
        mode: StoreMode,
    ) -> AmlResult<()> {
        let (node, target_type, current) = {
            let ns = self.namespace.lock();
            let node = ns.resolve_alias(node)?;
            (node, ns.object_type(node)?, ns.object(node))
        };

        if let Some(current) = &current {
            if current.ptr_eq(&source) {
                return Ok(());
            }
            self.force_data(list, current)?;
        }

        if mode == StoreMode::Convert {
            match target_type {
                ObjectType::Package => {
                    let found = source.object_type();
                    if found != ObjectType::Package {
                        return Err(AmlError::type_mismatch(ObjectType::Package, found));
                    }
                }
                ObjectType::Device
                | ObjectType::Event
                | ObjectType::Mutex
                | ObjectType::Region
                | ObjectType::PowerResource
                | ObjectType::Processor
                | ObjectType::ThermalZone
                | ObjectType::Method => {
                    return Err(AmlError::BadOpcode(format!(
                        "cannot store to {} {}",
                        target_type,
                        self.namespace.lock().display_path(node)
                    )))
                }
                _ => {}
            }
        }

        let source = self.store_source(list, source, target_type, mode)?;
        match (target_type, current) {
            (ty, Some(current)) if ty.is_simple_data() && mode == StoreMode::Convert => {
                self.store_object_to_object(&source, &current)
            }
            (ty, Some(current)) if ty.is_field() => {
                let value = source.read();
                self.write_field(list, &current, &value)
            }
            _ => self.store_direct_to_node(source, node),
        }
    }

    /// Resolve the source for a typed destination
    ///
    /// Integer, String, Buffer and field destinations take the value behind
    /// a reference, and under `Store` only accept Integer, String or Buffer
    /// sources.
    fn store_source(
        &self,
        list: &mut WalkList,
        source: ObjectHandle,
        target_type: ObjectType,
        mode: StoreMode,
    ) -> AmlResult<ObjectHandle> {
        if !(target_type.is_simple_data() || target_type.is_field()) {
            return Ok(source);
        }
        let source = if source.object_type() == ObjectType::Reference {
            self.resolve_operand(list, &source)?
        } else {
            source
        };
        if mode == StoreMode::Convert {
            let found = source.object_type();
            if !found.is_simple_data() {
                return Err(AmlError::type_mismatch(target_type, found));
            }
        }
        Ok(source)
    }

    /// Attach a copy of `source` to `node`, retyping the node
    fn store_direct_to_node(&self, source: ObjectHandle, node: NodeId) -> AmlResult<()> {
        let object = if source.ref_count() > 1 {
            source.duplicate()
        } else {
            source
        };
        let ty = object.object_type();
        self.namespace.lock().attach(node, object, ty)?;
        Ok(())
    }

    /// Convert `source` to the type of `target` and overwrite it in place
    ///
    /// String and Buffer targets keep their length: longer sources are
    /// truncated, shorter ones zero-filled. An empty target adopts the source
    /// length.
    pub(crate) fn store_object_to_object(
        &self,
        source: &ObjectHandle,
        target: &ObjectHandle,
    ) -> AmlResult<()> {
        if source.ptr_eq(target) {
            return Ok(());
        }
        let width = self.integer_width();
        let converted = {
            let target_type = target.object_type();
            convert_for_store(target_type, &source.read(), width)?
        };

        let mut target = target.write();
        match (&mut *target, converted) {
            (Object::Integer(value), Object::Integer(new)) => *value = width.truncate(new),
            (Object::String(text), Object::String(new)) => {
                let capacity = text.len();
                *text = new;
                if capacity > 0 {
                    truncate_string(text, capacity);
                }
            }
            (Object::Buffer(bytes), Object::Buffer(new)) => {
                if bytes.is_empty() {
                    *bytes = new;
                } else {
                    let count = new.len().min(bytes.len());
                    bytes.fill(0);
                    bytes[..count].copy_from_slice(&new[..count]);
                }
            }
            (slot, new) => *slot = new,
        }
        Ok(())
    }

    // ========================================================================
    // Slot destinations
    // ========================================================================

    /// Store into a Local or Arg of any invocation in the chain
    ///
    /// A shared source is copied first. An Arg that holds a `RefOf`
    /// reference is not overwritten: the store goes through the reference to
    /// the object it designates, without conversion.
    pub(crate) fn store_to_slot(
        &self,
        list: &mut WalkList,
        source: ObjectHandle,
        slot: SlotRef,
    ) -> AmlResult<()> {
        let current = list
            .find_frame(slot.frame)
            .ok_or_else(|| {
                AmlError::NotFound(format!("{}{} of a finished method", slot.kind, slot.index))
            })?
            .get_node(slot.kind, slot.index)?
            .value
            .clone();

        let mut indirect = None;
        if let SlotValue::Object(current) = &current {
            if current.ptr_eq(&source) {
                return Ok(());
            }
            if slot.kind == SlotKind::Arg {
                if let Object::Reference(Reference::RefOf(target)) = &*current.read() {
                    indirect = Some(*target);
                }
            }
        }
        drop(current);

        match indirect {
            Some(RefTarget::Node(node)) => {
                self.store_to_node(list, source, node, StoreMode::Copy)
            }
            Some(RefTarget::Slot(target)) => {
                let object = owned_copy(source);
                self.frame_mut(list, target)?
                    .set_value(target.kind, target.index, object)
            }
            None => {
                let object = owned_copy(source);
                self.frame_mut(list, slot)?
                    .set_value(slot.kind, slot.index, object)
            }
        }
    }

    fn frame_mut<'a>(
        &self,
        list: &'a mut WalkList,
        slot: SlotRef,
    ) -> AmlResult<&'a mut MethodFrame> {
        list.find_frame_mut(slot.frame).ok_or_else(|| {
            AmlError::NotFound(format!("{}{} of a finished method", slot.kind, slot.index))
        })
    }

    // ========================================================================
    // Index destinations
    // ========================================================================

    /// Store into the element an `Index` reference selects
    pub(crate) fn store_to_index(
        &self,
        list: &mut WalkList,
        source: ObjectHandle,
        index: &IndexRef,
    ) -> AmlResult<()> {
        match index.target {
            IndexTarget::PackageElement => self.store_to_element(list, source, index),
            IndexTarget::BufferByte => self.store_to_byte(list, source, index),
        }
    }

    fn store_to_element(
        &self,
        list: &mut WalkList,
        source: ObjectHandle,
        index: &IndexRef,
    ) -> AmlResult<()> {
        let element = match &*index.container.read() {
            Object::Package(elements) => {
                elements
                    .get(index.index)
                    .cloned()
                    .ok_or(AmlError::BufferOverflow {
                        index: index.index as u64,
                        length: elements.len() as u64,
                    })?
            }
            other => return Err(AmlError::type_mismatch(ObjectType::Package, other.object_type())),
        };
        if element.ptr_eq(&source) {
            return Ok(());
        }

        let element_type = element.object_type();
        if element_type.is_simple_data() {
            let source = self.store_source(list, source, element_type, StoreMode::Convert)?;
            return self.store_object_to_object(&source, &element);
        }

        // The old element loses exactly the reference the package held
        let replacement = owned_copy(source);
        if let Object::Package(elements) = &mut *index.container.write() {
            if let Some(slot) = elements.get_mut(index.index) {
                *slot = replacement;
            }
        }
        Ok(())
    }

    fn store_to_byte(
        &self,
        list: &mut WalkList,
        source: ObjectHandle,
        index: &IndexRef,
    ) -> AmlResult<()> {
        let source = self.resolve_operand(list, &source)?;
        let byte = match &*source.read() {
            Object::Integer(value) => *value as u8,
            Object::Buffer(bytes) => first_byte(bytes)?,
            Object::String(text) => first_byte(text.as_bytes())?,
            other => return Err(AmlError::type_mismatch(ObjectType::Integer, other.object_type())),
        };

        let mut container = index.container.write();
        match &mut *container {
            Object::Buffer(bytes) => {
                let length = bytes.len() as u64;
                let slot = bytes.get_mut(index.index).ok_or(AmlError::BufferOverflow {
                    index: index.index as u64,
                    length,
                })?;
                *slot = byte;
            }
            Object::String(text) => {
                let length = text.len() as u64;
                let current = *text.as_bytes().get(index.index).ok_or(AmlError::BufferOverflow {
                    index: index.index as u64,
                    length,
                })?;
                // Only an ASCII byte over an ASCII byte keeps the length and encoding
                if !byte.is_ascii() || !current.is_ascii() {
                    return Err(AmlError::BadParameter(format!(
                        "byte {:#04x} cannot replace string index {}",
                        byte, index.index
                    )));
                }
                let mut utf8 = [0u8; 4];
                text.replace_range(
                    index.index..index.index + 1,
                    char::from(byte).encode_utf8(&mut utf8),
                );
            }
            other => return Err(AmlError::type_mismatch(ObjectType::Buffer, other.object_type())),
        }
        Ok(())
    }
}

fn first_byte(bytes: &[u8]) -> AmlResult<u8> {
    bytes
        .first()
        .copied()
        .ok_or(AmlError::BufferOverflow { index: 0, length: 0 })
}

/// The source itself when nobody else holds it, a copy otherwise
pub(super) fn owned_copy(source: ObjectHandle) -> ObjectHandle {
    if source.ref_count() > 1 {
        source.duplicate()
    } else {
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::NameSeg;
    use crate::namespace::{NodeFlags, OwnerId};
    use crate::options::InterpreterOptions;

    fn setup() -> (Interpreter, WalkList) {
        let interp = Interpreter::new(InterpreterOptions::default()).unwrap();
        let mut list = WalkList::new();
        let root = interp.namespace().root();
        interp.begin_walk(&mut list, OwnerId::ROOT, root);
        (interp, list)
    }

    fn named(interp: &Interpreter, name: &str, object: Object) -> NodeId {
        let mut ns = interp.namespace();
        let root = ns.root();
        let ty = object.object_type();
        let node = ns
            .create(root, NameSeg::new(name).unwrap(), ty, OwnerId::ROOT, NodeFlags::NONE)
            .unwrap();
        ns.attach(node, ObjectHandle::new(object), ty).unwrap();
        node
    }

    #[test]
    fn test_store_converts_to_named_integer() {
        let (interp, mut list) = setup();
        let node = named(&interp, "INT_", Object::Integer(0));
        interp
            .store(&mut list, ObjectHandle::string("1F"), &Destination::Node(node))
            .unwrap();
        assert_eq!(interp.namespace().object(node).unwrap().as_integer(), Some(0x1F));
    }

    #[test]
    fn test_store_keeps_buffer_length() {
        let (interp, mut list) = setup();
        let node = named(&interp, "BUF_", Object::Buffer(vec![9; 4]));
        interp
            .store(&mut list, ObjectHandle::buffer(vec![1, 2]), &Destination::Node(node))
            .unwrap();
        let object = interp.namespace().object(node).unwrap();
        assert!(matches!(&*object.read(), Object::Buffer(b) if b == &[1, 2, 0, 0]));

        interp
            .store(&mut list, ObjectHandle::integer(0x0807_0605_0403), &Destination::Node(node))
            .unwrap();
        assert!(matches!(&*object.read(), Object::Buffer(b) if b == &[3, 4, 5, 6]));
    }

    #[test]
    fn test_store_truncates_string() {
        let (interp, mut list) = setup();
        let node = named(&interp, "STR_", Object::String("abc".into()));
        interp
            .store(&mut list, ObjectHandle::string("wxyz"), &Destination::Node(node))
            .unwrap();
        let object = interp.namespace().object(node).unwrap();
        assert!(matches!(&*object.read(), Object::String(s) if s == "wxy"));
    }

    #[test]
    fn test_copy_object_retypes() {
        let (interp, mut list) = setup();
        let node = named(&interp, "INT_", Object::Integer(5));
        interp
            .copy_object(&mut list, ObjectHandle::string("text"), &Destination::Node(node))
            .unwrap();
        assert_eq!(interp.namespace().object_type(node).unwrap(), ObjectType::String);
    }

    #[test]
    fn test_store_to_device_fails() {
        let (interp, mut list) = setup();
        let node = named(&interp, "DEV_", Object::Device);
        assert!(matches!(
            interp.store(&mut list, ObjectHandle::integer(1), &Destination::Node(node)),
            Err(AmlError::BadOpcode(_))
        ));
    }

    #[test]
    fn test_store_to_constant_is_noop() {
        let (interp, mut list) = setup();
        let constant = ObjectHandle::integer(1);
        interp
            .store(&mut list, ObjectHandle::integer(7), &Destination::Object(constant.clone()))
            .unwrap();
        assert_eq!(constant.as_integer(), Some(1));
    }

    fn local(list: &WalkList, index: usize) -> SlotRef {
        SlotRef {
            frame: list.current().unwrap().frame_id(),
            kind: SlotKind::Local,
            index,
        }
    }

    #[test]
    fn test_local_store_copies_shared_source() {
        let (interp, mut list) = setup();
        let source = ObjectHandle::integer(3);
        let held = source.clone();
        let slot = local(&list, 0);
        interp.store_to_slot(&mut list, source, slot).unwrap();

        let frame = &list.current().unwrap().frame;
        match &frame.get_node(SlotKind::Local, 0).unwrap().value {
            SlotValue::Object(object) => {
                assert!(!object.ptr_eq(&held));
                assert_eq!(object.as_integer(), Some(3));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(held.ref_count(), 1);
    }

    #[test]
    fn test_store_same_object_keeps_count() {
        let (interp, mut list) = setup();
        let slot = local(&list, 1);
        interp
            .store_to_slot(&mut list, ObjectHandle::integer(3), slot)
            .unwrap();
        let occupant = match list.current().unwrap().frame.get_value(SlotKind::Local, 1).unwrap() {
            SlotValue::Object(object) => object,
            other => panic!("unexpected {:?}", other),
        };
        let before = occupant.ref_count();
        interp.store_to_slot(&mut list, occupant.clone(), slot).unwrap();
        assert_eq!(occupant.ref_count(), before);
    }

    #[test]
    fn test_store_to_buffer_byte() {
        let (interp, mut list) = setup();
        let buffer = ObjectHandle::buffer(vec![0u8; 3]);
        let reference = IndexRef {
            container: buffer.clone(),
            index: 1,
            target: IndexTarget::BufferByte,
        };
        interp
            .store_to_index(&mut list, ObjectHandle::integer(0x1234), &reference)
            .unwrap();
        assert!(matches!(&*buffer.read(), Object::Buffer(b) if b == &[0, 0x34, 0]));
    }

    #[test]
    fn test_store_to_package_element_drops_one_reference() {
        let (interp, mut list) = setup();
        let inner = ObjectHandle::package(vec![]);
        let package = ObjectHandle::package(vec![inner.clone()]);
        assert_eq!(inner.ref_count(), 2);

        let reference = IndexRef {
            container: package.clone(),
            index: 0,
            target: IndexTarget::PackageElement,
        };
        interp
            .store_to_index(&mut list, ObjectHandle::integer(9), &reference)
            .unwrap();
        assert_eq!(inner.ref_count(), 1);
        match &*package.read() {
            Object::Package(elements) => assert_eq!(elements[0].as_integer(), Some(9)),
            other => panic!("unexpected {:?}", other),
        };
    }
}
