//! Integration tests for control method execution
//!
//! Tests cover:
//! - Loops with Break and Continue
//! - Recursion through arguments
//! - Serialized methods and explicit mutexes
//! - Events
//! - Uninitialized Locals and missing return values
//! - Conversion operators
//! - Operand nesting bounded by the result stack

use aml_core::term::{BinaryOp, ConvertOp, LogicalOp};
use aml_core::{
    AmlError, DefinitionBlock, Interpreter, InterpreterOptions, NamePath, Object, ObjectHandle,
    Target, Term,
};

fn path(text: &str) -> NamePath {
    NamePath::parse(text).unwrap()
}

fn method(name: &str, arg_count: u8, body: Vec<Term>) -> Term {
    Term::Method {
        name: path(name),
        arg_count,
        serialized: false,
        sync_level: 0,
        body: body.into(),
    }
}

fn ret(value: Term) -> Term {
    Term::Return(Box::new(value))
}

fn int(value: u64) -> Box<Term> {
    Box::new(Term::Integer(value))
}

fn local(index: u8) -> Box<Term> {
    Box::new(Term::Local(index))
}

fn logical(op: LogicalOp, left: Box<Term>, right: Box<Term>) -> Box<Term> {
    Box::new(Term::Logical { op, left, right })
}

fn binary(op: BinaryOp, left: Box<Term>, right: Box<Term>, target: Target) -> Term {
    Term::Binary {
        op,
        left,
        right,
        target,
    }
}

fn load(options: InterpreterOptions, body: Vec<Term>) -> Interpreter {
    let interp = Interpreter::new(options).unwrap();
    interp.load_table(&DefinitionBlock::new(2, body)).unwrap();
    interp
}

fn integer(interp: &Interpreter, path: &str, args: Vec<ObjectHandle>) -> u64 {
    interp
        .evaluate(path, args)
        .unwrap()
        .and_then(|value| value.as_integer())
        .unwrap()
}

fn mutex_locked(interp: &Interpreter, path: &str) -> bool {
    let node = interp.lookup_path(path).unwrap();
    let object = interp.namespace().object(node).unwrap();
    let locked = match &*object.read() {
        Object::Mutex(mutex) => mutex.is_locked(),
        Object::Method(method) => method.mutex.as_ref().unwrap().is_locked(),
        other => panic!("{} has no mutex", other.object_type()),
    };
    locked
}

#[test]
fn test_while_loop_sum() {
    // Store (10, Local0) Store (0, Local1)
    // While (Local0) { Add (Local1, Local0, Local1) Decrement (Local0) }
    let interp = load(
        InterpreterOptions::default(),
        vec![method(
            "SUMM",
            0,
            vec![
                Term::store(Term::Integer(10), Target::Local(0)),
                Term::store(Term::Zero, Target::Local(1)),
                Term::While {
                    predicate: local(0),
                    body: vec![
                        binary(BinaryOp::Add, local(1), local(0), Target::Local(1)),
                        Term::Decrement(Target::Local(0)),
                    ],
                },
                ret(Term::Local(1)),
            ],
        )],
    );
    assert_eq!(integer(&interp, "\\SUMM", vec![]), 55);
}

#[test]
fn test_break_and_continue() {
    // Sums 1 + 2 + 4 + 5: skips 3, stops at 6
    let interp = load(
        InterpreterOptions::default(),
        vec![method(
            "LOOP",
            0,
            vec![
                Term::store(Term::Zero, Target::Local(0)),
                Term::store(Term::Zero, Target::Local(1)),
                Term::While {
                    predicate: logical(LogicalOp::Less, local(0), int(10)),
                    body: vec![
                        Term::Increment(Target::Local(0)),
                        Term::If {
                            predicate: logical(LogicalOp::Equal, local(0), int(3)),
                            then: vec![Term::Continue],
                            otherwise: vec![],
                        },
                        Term::If {
                            predicate: logical(LogicalOp::Equal, local(0), int(6)),
                            then: vec![Term::Break],
                            otherwise: vec![],
                        },
                        binary(BinaryOp::Add, local(1), local(0), Target::Local(1)),
                    ],
                },
                ret(Term::Local(1)),
            ],
        )],
    );
    assert_eq!(integer(&interp, "\\LOOP", vec![]), 12);
}

#[test]
fn test_recursive_factorial() {
    // If (LLess (Arg0, 2)) { Return (1) }
    // Return (Multiply (Arg0, FACT (Subtract (Arg0, 1))))
    let interp = load(
        InterpreterOptions::default(),
        vec![method(
            "FACT",
            1,
            vec![
                Term::If {
                    predicate: logical(LogicalOp::Less, Box::new(Term::Arg(0)), int(2)),
                    then: vec![ret(Term::One)],
                    otherwise: vec![],
                },
                ret(binary(
                    BinaryOp::Multiply,
                    Box::new(Term::Arg(0)),
                    Box::new(Term::Invoke {
                        method: path("FACT"),
                        args: vec![binary(
                            BinaryOp::Subtract,
                            Box::new(Term::Arg(0)),
                            int(1),
                            Target::Null,
                        )],
                    }),
                    Target::Null,
                )),
            ],
        )],
    );
    assert_eq!(integer(&interp, "\\FACT", vec![ObjectHandle::integer(5)]), 120);
}

#[test]
fn test_serialized_method_releases_its_mutex() {
    let interp = load(
        InterpreterOptions::default(),
        vec![Term::Method {
            name: path("SERM"),
            arg_count: 0,
            serialized: true,
            sync_level: 3,
            body: vec![ret(Term::Integer(7))].into(),
        }],
    );
    assert_eq!(integer(&interp, "\\SERM", vec![]), 7);
    assert!(!mutex_locked(&interp, "\\SERM"));
}

#[test]
fn test_acquire_and_release() {
    let interp = load(
        InterpreterOptions::default(),
        vec![
            Term::Mutex {
                name: path("MTX_"),
                sync_level: 0,
            },
            method(
                "LOCK",
                0,
                vec![
                    Term::store(
                        Term::Acquire {
                            mutex: Target::Name(path("MTX_")),
                            timeout: 0xFFFF,
                        },
                        Target::Local(0),
                    ),
                    Term::Release(Target::Name(path("MTX_"))),
                    ret(Term::Local(0)),
                ],
            ),
        ],
    );
    assert_eq!(integer(&interp, "\\LOCK", vec![]), 0);
    assert!(!mutex_locked(&interp, "\\MTX_"));
}

#[test]
fn test_mutex_left_held_is_released_at_exit() {
    let interp = load(
        InterpreterOptions::default(),
        vec![
            Term::Mutex {
                name: path("MTX_"),
                sync_level: 0,
            },
            method(
                "LEAK",
                0,
                vec![ret(Term::Acquire {
                    mutex: Target::Name(path("MTX_")),
                    timeout: 0xFFFF,
                })],
            ),
        ],
    );
    assert_eq!(integer(&interp, "\\LEAK", vec![]), 0);
    assert!(!mutex_locked(&interp, "\\MTX_"));
}

#[test]
fn test_event_signal_then_wait() {
    let wait = || Term::Wait {
        event: Target::Name(path("EVT_")),
        timeout: int(0),
    };
    let interp = load(
        InterpreterOptions::default(),
        vec![
            Term::Event { name: path("EVT_") },
            method(
                "SIGW",
                0,
                vec![Term::Signal(Target::Name(path("EVT_"))), ret(wait())],
            ),
            method("WAIT", 0, vec![ret(wait())]),
        ],
    );
    assert_eq!(integer(&interp, "\\SIGW", vec![]), 0);
    assert_eq!(integer(&interp, "\\WAIT", vec![]), u64::MAX);
}

#[test]
fn test_uninitialized_local() {
    let interp = load(
        InterpreterOptions::default(),
        vec![method("BADL", 0, vec![ret(Term::Local(3))])],
    );
    assert!(matches!(
        interp.evaluate("\\BADL", vec![]),
        Err(AmlError::UninitializedLocal(3))
    ));
}

#[test]
fn test_void_method_as_operand_in_strict_mode() {
    let interp = load(
        InterpreterOptions::strict(),
        vec![
            method("VOID", 0, vec![Term::Noop]),
            method(
                "USE_",
                0,
                vec![ret(binary(
                    BinaryOp::Add,
                    Box::new(Term::NameRef(path("VOID"))),
                    int(1),
                    Target::Null,
                ))],
            ),
        ],
    );
    assert!(matches!(
        interp.evaluate("\\USE_", vec![]),
        Err(AmlError::NoReturnValue(_))
    ));
}

#[test]
fn test_conversion_operators() {
    let convert = |op, value| Term::Convert {
        op,
        operand: int(value),
        target: Target::Null,
    };
    let interp = load(
        InterpreterOptions::default(),
        vec![
            method("HEXS", 0, vec![ret(convert(ConvertOp::ToHexString, 0x1A))]),
            method("DECS", 0, vec![ret(convert(ConvertOp::ToDecimalString, 123))]),
            method("BCD_", 0, vec![ret(convert(ConvertOp::ToBcd, 1234))]),
        ],
    );

    let hex = interp.evaluate("\\HEXS", vec![]).unwrap().unwrap();
    assert!(matches!(&*hex.read(), Object::String(text) if text == "000000000000001A"));
    let dec = interp.evaluate("\\DECS", vec![]).unwrap().unwrap();
    assert!(matches!(&*dec.read(), Object::String(text) if text == "123"));
    assert_eq!(integer(&interp, "\\BCD_", vec![]), 0x1234);
}

#[test]
fn test_operand_nesting_limit() {
    // Add (1, Add (1, ... Add (1, 1)))
    let nested = |depth: usize| {
        let mut term = Term::Integer(1);
        for _ in 0..depth {
            term = binary(BinaryOp::Add, int(1), Box::new(term), Target::Null);
        }
        term
    };
    let interp = load(
        InterpreterOptions::default(),
        vec![
            method("SHAL", 0, vec![ret(nested(30))]),
            method("DEEP", 0, vec![ret(nested(60))]),
        ],
    );
    assert_eq!(integer(&interp, "\\SHAL", vec![]), 31);
    assert!(matches!(
        interp.evaluate("\\DEEP", vec![]),
        Err(AmlError::ResultFrameOverflow)
    ));
}
