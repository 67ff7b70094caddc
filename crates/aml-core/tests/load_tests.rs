//! Integration tests for table loading and initialization
//!
//! Tests cover:
//! - Unloading a table by owner
//! - Deferred buffer initializers and buffer fields
//! - Aliases
//! - Module-level code
//! - Duplicate definitions across tables
//! - Processor and PowerResource objects
//! - Object and device initialization after a load

use aml_core::term::CreateFieldKind;
use aml_core::{
    AmlError, DefinitionBlock, Interpreter, InterpreterOptions, NamePath, Object, ObjectType,
    Target, Term,
};

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

fn ret(value: Term) -> Term {
    Term::Return(Box::new(value))
}

fn new_interp() -> Interpreter {
    Interpreter::new(InterpreterOptions::default()).unwrap()
}

fn integer(interp: &Interpreter, path: &str) -> u64 {
    interp
        .evaluate(path, vec![])
        .unwrap()
        .and_then(|value| value.as_integer())
        .unwrap()
}

#[test]
fn test_unload_keeps_predefined_nodes() {
    let interp = new_interp();
    let before = interp.namespace().len();

    let owner = interp
        .load_table(&DefinitionBlock::new(
            2,
            vec![
                Term::name(path("VAL1"), Term::Integer(1)),
                Term::Device {
                    name: path("\\_SB_.PCI0"),
                    body: vec![Term::name(path("_ADR"), Term::Zero)],
                },
            ],
        ))
        .unwrap();
    assert_eq!(interp.namespace().len(), before + 3);

    assert_eq!(interp.unload_table(owner), 3);
    assert_eq!(interp.namespace().len(), before);
    assert!(interp.lookup_path("\\_SB_").is_ok());
    assert!(matches!(
        interp.lookup_path("\\_SB_.PCI0"),
        Err(AmlError::NotFound(_))
    ));
}

#[test]
fn test_failed_load_leaves_no_nodes() {
    let interp = new_interp();
    let before = interp.namespace().len();

    let result = interp.load_table(&DefinitionBlock::new(
        2,
        vec![
            Term::name(path("KEEP"), Term::One),
            Term::Scope {
                name: path("\\NOPE"),
                body: vec![Term::name(path("INNR"), Term::One)],
            },
        ],
    ));
    assert!(result.is_err());
    assert_eq!(interp.namespace().len(), before);
}

#[test]
fn test_deferred_buffer_size() {
    let interp = new_interp();
    interp
        .load_table(&DefinitionBlock::new(
            2,
            vec![
                Term::name(path("SIZE"), Term::Integer(8)),
                Term::name(
                    path("BUF_"),
                    Term::Buffer {
                        size: Some(Box::new(Term::NameRef(path("SIZE")))),
                        bytes: vec![1, 2],
                    },
                ),
                method("BLEN", vec![ret(Term::SizeOf(Target::Name(path("BUF_"))))]),
            ],
        ))
        .unwrap();

    assert_eq!(integer(&interp, "\\BLEN"), 8);
    let value = interp.evaluate("\\BUF_", vec![]).unwrap().unwrap();
    assert!(matches!(&*value.read(), Object::Buffer(bytes) if bytes == &[1, 2, 0, 0, 0, 0, 0, 0]));
}

#[test]
fn test_create_dword_field_over_buffer() {
    let interp = new_interp();
    interp
        .load_table(&DefinitionBlock::new(
            2,
            vec![
                Term::name(
                    path("BUF_"),
                    Term::Buffer {
                        size: None,
                        bytes: vec![0xAA, 0x78, 0x56, 0x34, 0x12, 0xBB],
                    },
                ),
                Term::CreateField {
                    kind: CreateFieldKind::DWord,
                    buffer: Box::new(Term::NameRef(path("BUF_"))),
                    index: Box::new(Term::One),
                    length: None,
                    name: path("DWD0"),
                },
            ],
        ))
        .unwrap();

    assert_eq!(integer(&interp, "\\DWD0"), 0x1234_5678);
    let node = interp.lookup_path("\\DWD0").unwrap();
    assert_eq!(
        interp.namespace().object_type(node).unwrap(),
        ObjectType::BufferField
    );
}

#[test]
fn test_alias_evaluates_target() {
    let interp = new_interp();
    interp
        .load_table(&DefinitionBlock::new(
            2,
            vec![
                Term::name(path("ORIG"), Term::Integer(0x33)),
                Term::Alias {
                    source: path("ORIG"),
                    alias: path("ALIS"),
                },
            ],
        ))
        .unwrap();
    assert_eq!(integer(&interp, "\\ALIS"), 0x33);
}

#[test]
fn test_module_level_if_creates_permanent_name() {
    let interp = new_interp();
    let owner = interp
        .load_table(&DefinitionBlock::new(
            2,
            vec![Term::If {
                predicate: Box::new(Term::One),
                then: vec![Term::name(path("CNDN"), Term::Integer(4))],
                otherwise: vec![Term::name(path("OTHR"), Term::Integer(5))],
            }],
        ))
        .unwrap();

    assert_eq!(integer(&interp, "\\CNDN"), 4);
    assert!(interp.lookup_path("\\OTHR").is_err());
    let node = interp.lookup_path("\\CNDN").unwrap();
    assert_eq!(interp.namespace().node(node).unwrap().owner(), owner);
}

#[test]
fn test_duplicate_definition_keeps_first() {
    let interp = new_interp();
    interp
        .load_table(&DefinitionBlock::new(
            2,
            vec![Term::name(path("DUPL"), Term::One)],
        ))
        .unwrap();
    interp
        .load_table(&DefinitionBlock::new(
            2,
            vec![Term::name(path("DUPL"), Term::Integer(2))],
        ))
        .unwrap();
    assert_eq!(integer(&interp, "\\DUPL"), 1);
}

#[test]
fn test_processor_and_power_resource() {
    let interp = new_interp();
    interp
        .load_table(&DefinitionBlock::new(
            2,
            vec![
                Term::Processor {
                    name: path("\\_PR_.CPU0"),
                    id: 1,
                    pblk_address: 0x810,
                    pblk_length: 6,
                    body: vec![],
                },
                Term::PowerResource {
                    name: path("\\_SB_.PWR0"),
                    system_level: 0,
                    resource_order: 0,
                    body: vec![method("_STA", vec![ret(Term::One)])],
                },
            ],
        ))
        .unwrap();

    let cpu = interp.lookup_path("\\_PR_.CPU0").unwrap();
    let object = interp.namespace().object(cpu).unwrap();
    assert!(matches!(&*object.read(), Object::Processor(p) if p.id == 1 && p.pblk_address == 0x810));
    assert_eq!(integer(&interp, "\\_SB_.PWR0._STA"), 1);
}

#[test]
fn test_load_then_initialize() {
    let interp = new_interp();
    let owner = interp
        .load_table(&DefinitionBlock::new(
            2,
            vec![
                Term::name(path("FLAG"), Term::Zero),
                Term::name(
                    path("PKG_"),
                    Term::Package {
                        count: Some(Box::new(Term::NameRef(path("FLAG")))),
                        elements: vec![],
                    },
                ),
                Term::Device {
                    name: path("\\_SB_.DEV0"),
                    body: vec![method(
                        "_INI",
                        vec![Term::store(Term::Integer(0x55), Target::Name(path("\\FLAG")))],
                    )],
                },
            ],
        ))
        .unwrap();

    let objects = interp.initialize_objects(owner);
    assert_eq!(objects.objects, 1);
    assert_eq!(objects.failures, 0);

    let devices = interp.initialize_devices();
    assert_eq!(devices.initialized, 1);
    assert_eq!(integer(&interp, "\\FLAG"), 0x55);
}
