//! End-to-end runs through the public surface: lowered statement lists in,
//! values and structured errors out.

use ovb::{
    codes, Arg, BinOp, CallArg, Callee, DeclArena, Expr, ExprKind, Interpreter, Literal,
    ModuleId, ModuleKind, ParamDecl, ProcBody, ProcDecl, ProcId, ProcKind, Repr, SourceLocation,
    Statement, StatementKind, Target, TypeTag, Value, VarDecl,
};

fn loc(line: u32) -> SourceLocation {
    SourceLocation::new(line, 1)
}

fn long(v: i32) -> Expr {
    Expr::new(ExprKind::Literal(Literal::Long(v)), loc(0))
}

fn local(index: usize) -> Expr {
    Expr::new(ExprKind::Local(index), loc(0))
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        loc(0),
    )
}

fn set_local(index: usize, expr: Expr, line: u32) -> Statement {
    Statement::new(
        StatementKind::Assign {
            target: Target::Local(index),
            expr,
        },
        loc(line),
    )
}

fn function(
    arena: &mut DeclArena,
    module: ModuleId,
    name: &str,
    params: Vec<ParamDecl>,
    extras: Vec<VarDecl>,
    result_tag: TypeTag,
    body: Vec<Statement>,
) -> ProcId {
    let result = params.len() + extras.len();
    let mut locals = extras;
    locals.push(VarDecl::scalar(name, result_tag));
    arena.add_proc(ProcDecl {
        name: name.to_string(),
        module,
        kind: ProcKind::Function,
        public: true,
        params,
        locals,
        result: Some(result),
        body: ProcBody::Script(body),
    })
}

fn as_long(value: &Value) -> i32 {
    match value.repr {
        Repr::Long(v) => v,
        _ => panic!("expected Long, got {:?}", value),
    }
}

#[test]
fn lowered_loop_runs_to_completion() {
    // Sum(n): i = 1; total = 0; while i <= n { total += i; i += 1 }
    let mut arena = DeclArena::new();
    let main = arena.add_module("Main", ModuleKind::Standard);
    let sum = function(
        &mut arena,
        main,
        "Sum",
        vec![ParamDecl::by_val("n", TypeTag::Long)],
        vec![VarDecl::scalar("i", TypeTag::Long)],
        TypeTag::Long,
        vec![
            set_local(1, long(1), 0),
            set_local(2, long(0), 1),
            Statement::new(
                StatementKind::IfGoto {
                    cond: binary(BinOp::Gt, local(1), local(0)),
                    target: 6,
                },
                loc(2),
            ),
            set_local(2, binary(BinOp::Add, local(2), local(1)), 3),
            set_local(1, binary(BinOp::Add, local(1), long(1)), 4),
            Statement::new(StatementKind::Goto { target: 2 }, loc(5)),
            Statement::new(StatementKind::ExitProc, loc(6)),
        ],
    );
    let interp = Interpreter::new(arena).unwrap();
    let result = interp
        .invoke(None, sum, vec![Arg::ByVal(Value::long(5))])
        .unwrap();
    assert_eq!(as_long(&result), 15);
}

#[test]
fn external_by_ref_argument_shares_storage() {
    let mut arena = DeclArena::new();
    let main = arena.add_module("Main", ModuleKind::Standard);
    let bump = arena.add_proc(ProcDecl {
        name: "Bump".to_string(),
        module: main,
        kind: ProcKind::Sub,
        public: true,
        params: vec![ParamDecl::by_ref("n", TypeTag::Long)],
        locals: vec![],
        result: None,
        body: ProcBody::Script(vec![set_local(
            0,
            binary(BinOp::Add, local(0), long(1)),
            0,
        )]),
    });
    let interp = Interpreter::new(arena).unwrap();

    let shared = ovb::new_slot(Value::long(41));
    interp
        .invoke(None, bump, vec![Arg::ByRef(shared.clone())])
        .unwrap();
    assert_eq!(as_long(&shared.lock()), 42);

    // The by-value shape of the same call leaves the caller's value alone.
    let copied = Value::long(41);
    interp.invoke(None, bump, vec![Arg::ByVal(copied.clone())]).unwrap();
    assert_eq!(as_long(&copied), 41);
}

#[test]
fn unhandled_errors_carry_a_renderable_trace() {
    let mut arena = DeclArena::new();
    let main = arena.add_module("Main", ModuleKind::Standard);
    let inner = arena.add_proc(ProcDecl {
        name: "Inner".to_string(),
        module: main,
        kind: ProcKind::Sub,
        public: true,
        params: vec![],
        locals: vec![],
        result: None,
        body: ProcBody::Script(vec![Statement::new(
            StatementKind::RaiseError { code: long(91) },
            loc(4),
        )]),
    });
    let outer = arena.add_proc(ProcDecl {
        name: "Outer".to_string(),
        module: main,
        kind: ProcKind::Sub,
        public: true,
        params: vec![],
        locals: vec![],
        result: None,
        body: ProcBody::Script(vec![Statement::new(
            StatementKind::Call {
                callee: Callee::Proc(inner),
                args: vec![],
            },
            loc(9),
        )]),
    });
    let interp = Interpreter::new(arena).unwrap();
    let err = interp.invoke(None, outer, vec![]).unwrap_err();
    assert_eq!(err.code, codes::OBJECT_VARIABLE_NOT_SET);
    assert_eq!(err.location, Some(loc(4)));
    let rendered = err.render_trace();
    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "  at Main.Inner (statement 0)");
    assert_eq!(lines[1], "  at Main.Outer (statement 0)");
}

#[test]
fn call_arguments_keep_the_failing_expression_location() {
    let mut arena = DeclArena::new();
    let main = arena.add_module("Main", ModuleKind::Standard);
    let takes_long = arena.add_proc(ProcDecl {
        name: "TakesLong".to_string(),
        module: main,
        kind: ProcKind::Sub,
        public: true,
        params: vec![ParamDecl::by_val("n", TypeTag::Long)],
        locals: vec![],
        result: None,
        body: ProcBody::Script(vec![]),
    });
    let caller = arena.add_proc(ProcDecl {
        name: "Caller".to_string(),
        module: main,
        kind: ProcKind::Sub,
        public: true,
        params: vec![],
        locals: vec![],
        result: None,
        body: ProcBody::Script(vec![Statement::new(
            StatementKind::Call {
                callee: Callee::Proc(takes_long),
                args: vec![CallArg::positional(Expr::new(
                    ExprKind::Literal(Literal::Str("oops".to_string())),
                    loc(31),
                ))],
            },
            loc(30),
        )]),
    });
    let interp = Interpreter::new(arena).unwrap();
    let err = interp.invoke(None, caller, vec![]).unwrap_err();
    assert_eq!(err.code, codes::TYPE_MISMATCH);
    assert_eq!(err.location, Some(loc(31)));
    assert!(err.message.contains("argument 1"));
}
