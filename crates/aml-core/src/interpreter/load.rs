//! Table loading
//!
//! A definition block is loaded in two passes over its term tree. Pass 1
//! creates every named node so forward references resolve; pass 2 builds
//! the objects that need other names (fields, aliases, computed `Name`
//! values) and runs module-level code. Definitions met while a method runs
//! go through the same code in the execute phase, creating and building in
//! one step.

use super::store::owned_copy;
use super::Interpreter;
use crate::field::{FieldDescriptor, FieldFlags};
use crate::name::NamePath;
use crate::namespace::{Lookup, LookupFlags, LookupMode, NodeId, OwnerId};
use crate::object::{
    BankField, BufferField, Deferred, DeferredData, DeferredTerm, IndexField, Method, Object,
    ObjectHandle, ObjectType, PowerResource, Processor, Region, RegionField,
};
use crate::options::IntegerWidth;
use crate::sync::{AmlEvent, AmlMutex};
use crate::term::{DefinitionBlock, FieldElement, Term};
use crate::walk::WalkList;
use crate::{AmlError, AmlResult};
use std::sync::Arc;

/// Which step of namespace construction a definition is processed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadPhase {
    /// Create names
    Pass1,
    /// Build objects that reference other names, run module-level code
    Pass2,
    /// Definition inside a running method
    Execute,
}

impl Interpreter {
    /// Load a definition block into the namespace
    ///
    /// Returns the owner id of every node the table created. On failure the
    /// partially loaded table is unloaded again.
    pub fn load_table(&self, table: &DefinitionBlock) -> AmlResult<OwnerId> {
        let width = IntegerWidth::from_revision(table.revision);
        self.integer_width.store(width);
        let owner = self.allocate_owner();
        log::info!(
            "loading table: revision {}, {}-bit integers, owner {}",
            table.revision,
            width.bits(),
            owner
        );

        let mut list = WalkList::new();
        let root = self.namespace.lock().root();
        self.begin_walk(&mut list, owner, root);
        let result = self
            .load_block(&mut list, &table.body, LoadPhase::Pass1)
            .and_then(|()| self.load_block(&mut list, &table.body, LoadPhase::Pass2));
        self.end_walk(&mut list);
        list.release_all();

        match result {
            Ok(()) => {
                log::info!(
                    "table loaded: {} namespace nodes",
                    self.namespace.lock().len()
                );
                Ok(owner)
            }
            Err(err) => {
                log::error!("table load failed: {}", err);
                self.unload_table(owner);
                Err(err)
            }
        }
    }

    fn load_block(&self, list: &mut WalkList, terms: &[Term], phase: LoadPhase) -> AmlResult<()> {
        for term in terms {
            self.load_term(list, term, phase)?;
        }
        Ok(())
    }

    /// Process one term of a table body (or a definition inside a method)
    pub(crate) fn load_term(&self, list: &mut WalkList, term: &Term, phase: LoadPhase) -> AmlResult<()> {
        match term {
            Term::Scope { name, body } => {
                let (node, ty) = self.existing_scope(list, name)?;
                self.load_scope(list, node, ty, body, phase)
            }
            Term::Device { name, body } => {
                self.load_container(list, name, ObjectType::Device, Object::Device, body, phase)
            }
            Term::Processor {
                name,
                id,
                pblk_address,
                pblk_length,
                body,
            } => {
                let processor = Object::Processor(Processor {
                    id: *id,
                    pblk_address: *pblk_address,
                    pblk_length: *pblk_length,
                });
                self.load_container(list, name, ObjectType::Processor, processor, body, phase)
            }
            Term::PowerResource {
                name,
                system_level,
                resource_order,
                body,
            } => {
                let resource = Object::PowerResource(PowerResource {
                    system_level: *system_level,
                    resource_order: *resource_order,
                });
                self.load_container(list, name, ObjectType::PowerResource, resource, body, phase)
            }
            Term::ThermalZone { name, body } => self.load_container(
                list,
                name,
                ObjectType::ThermalZone,
                Object::ThermalZone,
                body,
                phase,
            ),
            Term::Method {
                name,
                arg_count,
                serialized,
                sync_level,
                body,
            } => {
                if phase == LoadPhase::Pass2 {
                    return Ok(());
                }
                let node = self.define(list, name, ObjectType::Method, phase)?;
                let mutex = if *serialized {
                    Some(Arc::new(AmlMutex::new(*sync_level)?))
                } else {
                    None
                };
                let method = Object::Method(Method {
                    arg_count: *arg_count,
                    serialized: *serialized,
                    sync_level: *sync_level,
                    body: Arc::clone(body),
                    mutex,
                });
                self.attach_new(node, ObjectHandle::new(method))?;
                Ok(())
            }
            Term::Name { name, value } => self.load_name(list, name, value, phase),
            Term::Alias { source, alias } => {
                let node = self.define(list, alias, ObjectType::Alias, phase)?;
                if phase == LoadPhase::Pass1 {
                    return Ok(());
                }
                let scope = list.current()?.current_scope();
                let mut ns = self.namespace.lock();
                let target = ns.find(scope, source)?;
                ns.set_alias(node, target)
            }
            Term::OperationRegion {
                name,
                space,
                offset,
                length,
            } => {
                if phase == LoadPhase::Pass2 {
                    return Ok(());
                }
                let node = self.define(list, name, ObjectType::Region, phase)?;
                let scope = list.current()?.current_scope();
                let operands = vec![(**offset).clone(), (**length).clone()];
                let region = ObjectHandle::new(Object::Region(Region {
                    space: *space,
                    extent: Deferred::Pending(DeferredTerm::new(scope, operands.clone())),
                    node,
                }));
                if self.attach_new(node, region.clone())? && phase == LoadPhase::Execute {
                    let values = self.eval_now(list, &operands)?;
                    self.bind_region(list, &region, &values)?;
                }
                Ok(())
            }
            Term::Field {
                region,
                flags,
                elements,
            } => {
                if phase != LoadPhase::Pass2 {
                    self.declare_fields(list, elements, ObjectType::RegionField, phase)?;
                }
                if phase == LoadPhase::Pass1 {
                    return Ok(());
                }
                let region = self.named_object(list, region, ObjectType::Region)?;
                let max_width = region_max_width(&region)?;
                self.build_fields(list, elements, *flags, max_width, |field| {
                    Object::RegionField(RegionField {
                        region: region.clone(),
                        field,
                    })
                })
            }
            Term::BankField {
                region,
                bank,
                bank_value,
                flags,
                elements,
            } => {
                if phase != LoadPhase::Pass2 {
                    self.declare_fields(list, elements, ObjectType::BankField, phase)?;
                }
                if phase == LoadPhase::Pass1 {
                    return Ok(());
                }
                let region = self.named_object(list, region, ObjectType::Region)?;
                let max_width = region_max_width(&region)?;
                let bank_register = self.field_register(list, bank)?;
                let value = self.eval_term(list, bank_value)?;
                let bank_value = self.operand_integer(list, &value)?;
                self.build_fields(list, elements, *flags, max_width, |field| {
                    Object::BankField(BankField {
                        region: region.clone(),
                        bank_register: bank_register.clone(),
                        bank_value,
                        field,
                    })
                })
            }
            Term::IndexField {
                index,
                data,
                flags,
                elements,
            } => {
                if phase != LoadPhase::Pass2 {
                    self.declare_fields(list, elements, ObjectType::IndexField, phase)?;
                }
                if phase == LoadPhase::Pass1 {
                    return Ok(());
                }
                let index_register = self.field_register(list, index)?;
                let data_register = self.field_register(list, data)?;
                let max_width = register_width(&data_register)?;
                self.build_fields(list, elements, *flags, max_width, |field| {
                    Object::IndexField(IndexField {
                        index_register: index_register.clone(),
                        data_register: data_register.clone(),
                        field,
                    })
                })
            }
            Term::CreateField {
                kind,
                buffer,
                index,
                length,
                name,
            } => {
                if phase == LoadPhase::Pass2 {
                    return Ok(());
                }
                let node = self.define(list, name, ObjectType::BufferField, phase)?;
                let scope = list.current()?.current_scope();
                let mut operands = vec![(**buffer).clone(), (**index).clone()];
                if let Some(length) = length {
                    operands.push((**length).clone());
                }
                let field = ObjectHandle::new(Object::BufferField(BufferField {
                    kind: *kind,
                    binding: Deferred::Pending(DeferredTerm::new(scope, operands.clone())),
                }));
                if self.attach_new(node, field.clone())? && phase == LoadPhase::Execute {
                    let values = self.eval_now(list, &operands)?;
                    self.bind_buffer_field(&field, &values)?;
                }
                Ok(())
            }
            Term::Mutex { name, sync_level } => {
                if phase == LoadPhase::Pass2 {
                    return Ok(());
                }
                let node = self.define(list, name, ObjectType::Mutex, phase)?;
                let mutex = Arc::new(AmlMutex::new(*sync_level)?);
                self.attach_new(node, ObjectHandle::new(Object::Mutex(mutex)))?;
                Ok(())
            }
            Term::Event { name } => {
                if phase == LoadPhase::Pass2 {
                    return Ok(());
                }
                let node = self.define(list, name, ObjectType::Event, phase)?;
                let event = Arc::new(AmlEvent::new());
                self.attach_new(node, ObjectHandle::new(Object::Event(event)))?;
                Ok(())
            }
            statement => match phase {
                LoadPhase::Pass1 => Ok(()),
                LoadPhase::Pass2 => {
                    if let Err(err) = self.execute_term(list, statement) {
                        log::warn!("module-level code failed: {}", err);
                    }
                    Ok(())
                }
                LoadPhase::Execute => self.execute_term(list, statement).map(|_| ()),
            },
        }
    }

    // ========================================================================
    // Names and scopes
    // ========================================================================

    /// Find or create the node a definition names
    fn define(
        &self,
        list: &WalkList,
        name: &NamePath,
        ty: ObjectType,
        phase: LoadPhase,
    ) -> AmlResult<NodeId> {
        let state = list.current()?;
        let request = Lookup::new(state.current_scope(), name)
            .expecting(ty)
            .owner(state.owner);
        let request = match phase {
            LoadPhase::Pass1 => request.mode(LookupMode::LoadPass1).flags(LookupFlags::NONE),
            LoadPhase::Pass2 => request.mode(LookupMode::LoadPass2).flags(LookupFlags::NONE),
            LoadPhase::Execute => {
                let mut flags = LookupFlags::DEFINE | LookupFlags::NO_DUPLICATES;
                if state.method.is_some() {
                    flags = flags | LookupFlags::TEMPORARY;
                }
                request.mode(LookupMode::Execute).flags(flags)
            }
        };
        self.namespace.lock().lookup(&request, None)
    }

    /// Attach an object unless the node already has one
    ///
    /// A name defined again by a later table keeps its first object.
    fn attach_new(&self, node: NodeId, object: ObjectHandle) -> AmlResult<bool> {
        let mut ns = self.namespace.lock();
        if ns.object(node).is_some() {
            log::debug!("{} already has an object", ns.display_path(node));
            return Ok(false);
        }
        let ty = object.object_type();
        ns.attach(node, object, ty)?;
        Ok(true)
    }

    fn existing_scope(&self, list: &WalkList, name: &NamePath) -> AmlResult<(NodeId, ObjectType)> {
        let node = self.lookup_node(list, name, ObjectType::Any)?;
        let ty = self.namespace.lock().object_type(node)?;
        if ty.opens_scope() || ty == ObjectType::Any {
            Ok((node, ty))
        } else {
            Err(AmlError::type_mismatch(ObjectType::LocalScope, ty))
        }
    }

    fn load_container(
        &self,
        list: &mut WalkList,
        name: &NamePath,
        ty: ObjectType,
        object: Object,
        body: &[Term],
        phase: LoadPhase,
    ) -> AmlResult<()> {
        let node = self.define(list, name, ty, phase)?;
        if phase != LoadPhase::Pass2 {
            self.attach_new(node, ObjectHandle::new(object))?;
        }
        self.load_scope(list, node, ty, body, phase)
    }

    fn load_scope(
        &self,
        list: &mut WalkList,
        node: NodeId,
        ty: ObjectType,
        body: &[Term],
        phase: LoadPhase,
    ) -> AmlResult<()> {
        list.current_mut()?.scopes.push(node, ty);
        let result = match phase {
            LoadPhase::Execute => self.execute_block(list, body).map(|_| ()),
            LoadPhase::Pass1 | LoadPhase::Pass2 => self.load_block(list, body, phase),
        };
        list.current_mut()?.scopes.pop()?;
        result
    }

    fn load_name(
        &self,
        list: &mut WalkList,
        name: &NamePath,
        value: &Term,
        phase: LoadPhase,
    ) -> AmlResult<()> {
        match phase {
            LoadPhase::Pass1 => {
                let node = self.define(list, name, ObjectType::Any, phase)?;
                let object = match value {
                    literal if literal.is_literal() => self.eval_term(list, literal)?,
                    Term::Buffer { .. } | Term::Package { .. } => {
                        let ty = match value {
                            Term::Buffer { .. } => ObjectType::Buffer,
                            _ => ObjectType::Package,
                        };
                        let scope = list.current()?.current_scope();
                        ObjectHandle::new(Object::Deferred(DeferredData {
                            ty,
                            term: DeferredTerm::new(scope, vec![value.clone()]),
                        }))
                    }
                    // Needs other names; built in pass 2
                    _ => return Ok(()),
                };
                self.attach_new(node, object)?;
                Ok(())
            }
            LoadPhase::Pass2 => {
                let node = self.define(list, name, ObjectType::Any, phase)?;
                if self.namespace.lock().object(node).is_some() {
                    return Ok(());
                }
                let object = self.eval_term(list, value)?;
                self.attach_new(node, owned_copy(object))?;
                Ok(())
            }
            LoadPhase::Execute => {
                let object = self.eval_term(list, value)?;
                let node = self.define(list, name, ObjectType::Any, phase)?;
                self.attach_new(node, owned_copy(object))?;
                Ok(())
            }
        }
    }

    /// Evaluate operand terms in the current walk state
    fn eval_now(&self, list: &mut WalkList, terms: &[Term]) -> AmlResult<Vec<ObjectHandle>> {
        terms
            .iter()
            .map(|term| {
                let value = self.eval_term(list, term)?;
                self.resolve_operand(list, &value)
            })
            .collect()
    }

    fn named_object(
        &self,
        list: &WalkList,
        path: &NamePath,
        expected: ObjectType,
    ) -> AmlResult<ObjectHandle> {
        let node = self.lookup_node(list, path, expected)?;
        let ns = self.namespace.lock();
        ns.object(node)
            .ok_or_else(|| AmlError::NotFound(ns.display_path(node)))
    }

    /// A field used as a bank, index or data register
    fn field_register(&self, list: &WalkList, path: &NamePath) -> AmlResult<ObjectHandle> {
        let register = self.named_object(list, path, ObjectType::Any)?;
        let ty = register.object_type();
        if ty.is_field() && ty != ObjectType::BufferField {
            Ok(register)
        } else {
            Err(AmlError::type_mismatch(ObjectType::RegionField, ty))
        }
    }

    // ========================================================================
    // Field lists
    // ========================================================================

    fn declare_fields(
        &self,
        list: &WalkList,
        elements: &[FieldElement],
        ty: ObjectType,
        phase: LoadPhase,
    ) -> AmlResult<()> {
        for element in elements {
            if let FieldElement::Named { name, .. } = element {
                self.define(list, &NamePath::single(*name), ty, phase)?;
            }
        }
        Ok(())
    }

    /// Walk a field list, attaching a descriptor to every named entry
    fn build_fields(
        &self,
        list: &WalkList,
        elements: &[FieldElement],
        flags: FieldFlags,
        max_width: u32,
        make: impl Fn(FieldDescriptor) -> Object,
    ) -> AmlResult<()> {
        let mut flags = flags;
        let mut bit_position: u32 = 0;
        for element in elements {
            match element {
                FieldElement::Named { name, bit_length } => {
                    let field = FieldDescriptor::new(bit_position, *bit_length, flags, max_width)?;
                    let node = self.define(
                        list,
                        &NamePath::single(*name),
                        ObjectType::Any,
                        LoadPhase::Pass2,
                    )?;
                    self.attach_new(node, ObjectHandle::new(make(field)))?;
                    bit_position = advance(bit_position, *bit_length)?;
                }
                FieldElement::Reserved { bit_length } => {
                    bit_position = advance(bit_position, *bit_length)?;
                }
                FieldElement::Offset(byte_offset) => {
                    bit_position = byte_offset
                        .checked_mul(8)
                        .ok_or_else(|| AmlError::BadParameter("field offset".to_string()))?;
                }
                FieldElement::AccessAs(access) => {
                    flags = flags.with_access_type(*access);
                }
            }
        }
        Ok(())
    }
}

fn advance(bit_position: u32, bit_length: u32) -> AmlResult<u32> {
    bit_position
        .checked_add(bit_length)
        .ok_or_else(|| AmlError::BadParameter("field list too long".to_string()))
}

fn region_max_width(region: &ObjectHandle) -> AmlResult<u32> {
    match &*region.read() {
        Object::Region(r) => Ok(r.space.max_access_width()),
        other => Err(AmlError::type_mismatch(ObjectType::Region, other.object_type())),
    }
}

/// Access width of the register an index field reads through
fn register_width(register: &ObjectHandle) -> AmlResult<u32> {
    match &*register.read() {
        Object::RegionField(f) => Ok(f.field.access_width),
        Object::BankField(f) => Ok(f.field.access_width),
        Object::IndexField(f) => Ok(f.field.access_width),
        other => Err(AmlError::type_mismatch(
            ObjectType::RegionField,
            other.object_type(),
        )),
    }
}
