//! Namespace initialization after a table load

use super::Interpreter;
use crate::name::NameSeg;
use crate::namespace::{NodeFlags, NodeId, OwnerId};
use crate::object::{Object, ObjectHandle, ObjectType};
use crate::walk::WalkList;

/// `_STA` value assumed when a device has none
const STA_DEFAULT: u64 = 0x0F;
/// Device present
const STA_PRESENT: u64 = 1 << 0;
/// Device functioning (children may be present even if the device is not)
const STA_FUNCTIONING: u64 = 1 << 3;

/// Outcome of an initialization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitializationReport {
    /// Deferred objects evaluated
    pub objects: usize,
    /// Devices examined
    pub devices: usize,
    /// `_INI` methods run
    pub initialized: usize,
    /// Evaluations that failed (logged and skipped)
    pub failures: usize,
}

enum Pending {
    Region,
    BufferField,
    Data,
}

fn pending_kind(object: &ObjectHandle) -> Option<Pending> {
    match &*object.read() {
        Object::Region(region) if !region.extent.is_ready() => Some(Pending::Region),
        Object::BufferField(field) if !field.binding.is_ready() => Some(Pending::BufferField),
        Object::Deferred(_) => Some(Pending::Data),
        _ => None,
    }
}

impl Interpreter {
    /// Evaluate every deferred region, buffer field and data object a table
    /// created
    ///
    /// Failures are logged and counted; the remaining objects are still
    /// initialized.
    pub fn initialize_objects(&self, owner: OwnerId) -> InitializationReport {
        let objects: Vec<(NodeId, ObjectHandle)> = {
            let ns = self.namespace.lock();
            ns.descendants(ns.root(), usize::MAX, None)
                .into_iter()
                .filter_map(|id| {
                    let node = ns.get(id)?;
                    if node.owner() != owner {
                        return None;
                    }
                    node.object().map(|object| (id, object.clone()))
                })
                .collect()
        };

        let mut report = InitializationReport::default();
        let mut list = WalkList::new();
        let root = self.namespace.lock().root();
        self.begin_walk(&mut list, owner, root);

        for (node, object) in objects {
            let Some(kind) = pending_kind(&object) else {
                continue;
            };
            let result = match kind {
                Pending::Region => self.force_region(&mut list, &object).map(|_| ()),
                Pending::BufferField => self.force_buffer_field(&mut list, &object).map(|_| ()),
                Pending::Data => self.force_data(&mut list, &object),
            };
            match result {
                Ok(()) => report.objects += 1,
                Err(err) => {
                    report.failures += 1;
                    log::warn!(
                        "initializing {} failed: {}",
                        self.namespace.lock().display_path(node),
                        err
                    );
                }
            }
        }

        self.end_walk(&mut list);
        list.release_all();
        log::info!(
            "initialized {} objects ({} failed) for owner {}",
            report.objects,
            report.failures,
            owner
        );
        report
    }

    /// Run `_STA` and `_INI` for every device, depth first from the root
    ///
    /// A device whose `_STA` reports it absent is not initialized, and its
    /// children are skipped unless it reports itself functioning.
    pub fn initialize_devices(&self) -> InitializationReport {
        let mut report = InitializationReport::default();
        let mut list = WalkList::new();
        let root = self.namespace.lock().root();
        self.begin_walk(&mut list, OwnerId::ROOT, root);

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let ty = match self.namespace.lock().object_type(node) {
                Ok(ty) => ty,
                Err(_) => continue,
            };
            let descend = match ty {
                ObjectType::Device | ObjectType::Processor | ObjectType::ThermalZone => {
                    self.initialize_device(&mut list, node, &mut report)
                }
                ObjectType::Method => false,
                _ => true,
            };
            if descend {
                let mut children = self.namespace.lock().children(node);
                children.reverse();
                stack.extend(children);
            }
        }

        self.end_walk(&mut list);
        list.release_all();
        log::info!(
            "examined {} devices, ran {} _INI methods ({} failed)",
            report.devices,
            report.initialized,
            report.failures
        );
        report
    }

    /// Returns whether the device's children should be visited
    fn initialize_device(
        &self,
        list: &mut WalkList,
        node: NodeId,
        report: &mut InitializationReport,
    ) -> bool {
        report.devices += 1;
        let status = match self.child_integer(list, node, "_STA", false) {
            Ok(status) => status.unwrap_or(STA_DEFAULT),
            Err(err) => {
                report.failures += 1;
                log::warn!(
                    "{}._STA failed: {}",
                    self.namespace.lock().display_path(node),
                    err
                );
                return false;
            }
        };

        if status & STA_PRESENT != 0 {
            let ini = {
                let ns = self.namespace.lock();
                NameSeg::new("_INI")
                    .ok()
                    .and_then(|seg| ns.child(node, seg))
                    .filter(|ini| ns.object_type(*ini).ok() == Some(ObjectType::Method))
            };
            if let Some(ini) = ini {
                match self.invoke_method(list, ini, Vec::new()) {
                    Ok(_) => report.initialized += 1,
                    Err(err) => {
                        report.failures += 1;
                        log::warn!(
                            "{} failed: {}",
                            self.namespace.lock().display_path(ini),
                            err
                        );
                    }
                }
            }
            if let Err(err) = self
                .namespace
                .lock()
                .insert_flags(node, NodeFlags::INITIALIZED)
            {
                log::debug!("marking device initialized: {}", err);
            }
        }
        status & (STA_PRESENT | STA_FUNCTIONING) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::NamePath;
    use crate::options::InterpreterOptions;
    use crate::term::{DefinitionBlock, Target, Term};

    fn path(text: &str) -> NamePath {
        NamePath::parse(text).unwrap()
    }

    fn method(name: &str, body: Vec<Term>) -> Term {
        Term::Method {
            name: path(name),
            arg_count: 0,
            serialized: false,
            sync_level: 0,
            body: body.into(),
        }
    }

    /// `_INI` that increments the root-level counter `CNT_`
    fn counting_ini() -> Term {
        method("_INI", vec![Term::Increment(Target::Name(path("\\CNT_")))])
    }

    #[test]
    fn test_absent_device_skips_ini_and_children() {
        let interp = Interpreter::new(InterpreterOptions::default()).unwrap();
        let table = DefinitionBlock::new(
            2,
            vec![
                Term::name(path("CNT_"), Term::Integer(0)),
                Term::Device {
                    name: path("\\_SB_.DEV0"),
                    body: vec![
                        counting_ini(),
                        Term::Device {
                            name: path("DEV1"),
                            body: vec![counting_ini()],
                        },
                    ],
                },
                Term::Device {
                    name: path("\\_SB_.GONE"),
                    body: vec![
                        method("_STA", vec![Term::Return(Box::new(Term::Zero))]),
                        counting_ini(),
                        Term::Device {
                            name: path("CHLD"),
                            body: vec![counting_ini()],
                        },
                    ],
                },
            ],
        );
        interp.load_table(&table).unwrap();

        let report = interp.initialize_devices();
        assert_eq!(report.initialized, 2);
        assert_eq!(report.failures, 0);
        let count = interp.evaluate("\\CNT_", vec![]).unwrap().unwrap();
        assert_eq!(count.as_integer(), Some(2));

        let dev0 = interp.lookup_path("\\_SB_.DEV0").unwrap();
        let gone = interp.lookup_path("\\_SB_.GONE").unwrap();
        let ns = interp.namespace();
        assert!(ns.node(dev0).unwrap().flags().contains(NodeFlags::INITIALIZED));
        assert!(!ns.node(gone).unwrap().flags().contains(NodeFlags::INITIALIZED));
    }

    #[test]
    fn test_initialize_objects_forces_regions() {
        let interp = Interpreter::new(InterpreterOptions::default()).unwrap();
        let table = DefinitionBlock::new(
            2,
            vec![
                Term::name(path("BASE"), Term::Integer(0xFED0_0000)),
                Term::OperationRegion {
                    name: path("HPET"),
                    space: crate::region::RegionSpace::SystemMemory,
                    offset: Box::new(Term::NameRef(path("BASE"))),
                    length: Box::new(Term::Integer(0x400)),
                },
            ],
        );
        let owner = interp.load_table(&table).unwrap();

        let report = interp.initialize_objects(owner);
        assert_eq!(report.objects, 1);
        assert_eq!(report.failures, 0);

        let node = interp.lookup_path("\\HPET").unwrap();
        let region = interp.namespace().object(node).unwrap();
        assert!(matches!(&*region.read(), Object::Region(r) if r.extent.ready().map(|e| e.address) == Some(0xFED0_0000)));
    }
}
