// Serializer/deserializer round trips over generated and parsed trees

use astcc::astc::{self, deserialize, serialize};
use astcc::parser::ast::*;
use astcc::parser::parse_source;
use astcc::parser::wasm::{WasmImmediate, WasmInstr, WasmOp};
use proptest::prelude::*;

fn loc() -> impl Strategy<Value = SourceLocation> {
    (0u32..5000, 0u32..200).prop_map(|(line, column)| SourceLocation::new(line, column))
}

fn ident() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,8}"
}

fn base_type() -> impl Strategy<Value = BaseType> {
    prop_oneof![
        Just(BaseType::Void),
        Just(BaseType::Bool),
        Just(BaseType::Char),
        Just(BaseType::Short),
        Just(BaseType::Int),
        Just(BaseType::Long),
        Just(BaseType::Float),
        Just(BaseType::Double),
        ident().prop_map(BaseType::Struct),
        ident().prop_map(BaseType::Union),
        ident().prop_map(BaseType::Enum),
        ident().prop_map(BaseType::Named),
    ]
}

fn c_type() -> impl Strategy<Value = Type> {
    (
        base_type(),
        any::<bool>(),
        any::<bool>(),
        0u32..4,
        prop::collection::vec(prop::option::of(1u32..64), 0..3),
    )
        .prop_map(|(base, is_const, is_unsigned, pointer_depth, array_dims)| Type {
            base,
            is_const,
            is_unsigned,
            pointer_depth,
            array_dims,
        })
}

fn bin_op() -> impl Strategy<Value = BinOp> {
    prop_oneof![
        Just(BinOp::Add),
        Just(BinOp::Sub),
        Just(BinOp::Mul),
        Just(BinOp::Div),
        Just(BinOp::Mod),
        Just(BinOp::Eq),
        Just(BinOp::Ne),
        Just(BinOp::Lt),
        Just(BinOp::Le),
        Just(BinOp::Gt),
        Just(BinOp::Ge),
        Just(BinOp::And),
        Just(BinOp::Or),
        Just(BinOp::BitAnd),
        Just(BinOp::BitOr),
        Just(BinOp::BitXor),
        Just(BinOp::Shl),
        Just(BinOp::Shr),
    ]
}

fn un_op() -> impl Strategy<Value = UnOp> {
    prop_oneof![
        Just(UnOp::Neg),
        Just(UnOp::Not),
        Just(UnOp::BitNot),
        Just(UnOp::PreInc),
        Just(UnOp::PreDec),
        Just(UnOp::PostInc),
        Just(UnOp::PostDec),
        Just(UnOp::Deref),
        Just(UnOp::AddrOf),
    ]
}

fn immediate() -> impl Strategy<Value = WasmImmediate> {
    prop_oneof![
        Just(WasmImmediate::None),
        any::<i32>().prop_map(WasmImmediate::I32),
        any::<i64>().prop_map(WasmImmediate::I64),
        // NaN never compares equal to itself
        (-1.0e6f32..1.0e6).prop_map(WasmImmediate::F32),
        (-1.0e12f64..1.0e12).prop_map(WasmImmediate::F64),
        any::<u32>().prop_map(WasmImmediate::Index),
        ident().prop_map(WasmImmediate::Name),
    ]
}

fn leaf() -> impl Strategy<Value = AstNode> {
    let kind = prop_oneof![
        ident().prop_map(NodeKind::Identifier),
        any::<i64>().prop_map(NodeKind::IntLiteral),
        (-1.0e9f64..1.0e9).prop_map(NodeKind::FloatLiteral),
        any::<u8>().prop_map(NodeKind::CharLiteral),
        "[ -~]{0,12}".prop_map(NodeKind::StringLiteral),
        c_type().prop_map(NodeKind::SizeofType),
        Just(NodeKind::Break),
        Just(NodeKind::Continue),
        Just(NodeKind::Empty),
    ];
    (kind, loc()).prop_map(|(kind, location)| AstNode::new(kind, location))
}

fn tree() -> impl Strategy<Value = AstNode> {
    leaf().prop_recursive(6, 64, 4, |inner| {
        let boxed = inner.clone().prop_map(Box::new);
        let kind = prop_oneof![
            (bin_op(), boxed.clone(), boxed.clone())
                .prop_map(|(op, left, right)| NodeKind::Binary { op, left, right }),
            (un_op(), boxed.clone()).prop_map(|(op, operand)| NodeKind::Unary { op, operand }),
            (prop::option::of(bin_op()), boxed.clone(), boxed.clone())
                .prop_map(|(op, target, value)| NodeKind::Assign { op, target, value }),
            (boxed.clone(), boxed.clone(), boxed.clone()).prop_map(|(condition, then_expr, else_expr)| {
                NodeKind::Ternary {
                    condition,
                    then_expr,
                    else_expr,
                }
            }),
            (boxed.clone(), prop::collection::vec(inner.clone(), 0..4))
                .prop_map(|(callee, args)| NodeKind::Call { callee, args }),
            (boxed.clone(), boxed.clone()).prop_map(|(array, index)| NodeKind::Index { array, index }),
            (boxed.clone(), ident()).prop_map(|(object, member)| NodeKind::Member { object, member }),
            (boxed.clone(), ident()).prop_map(|(object, member)| NodeKind::PtrMember { object, member }),
            (c_type(), boxed.clone()).prop_map(|(target_type, expr)| NodeKind::Cast { target_type, expr }),
            boxed.clone().prop_map(NodeKind::SizeofExpr),
            prop::collection::vec(inner.clone(), 0..5).prop_map(|statements| NodeKind::Compound { statements }),
            (boxed.clone(), boxed.clone(), prop::option::of(boxed.clone())).prop_map(
                |(condition, then_branch, else_branch)| NodeKind::If {
                    condition,
                    then_branch,
                    else_branch,
                }
            ),
            (boxed.clone(), boxed.clone()).prop_map(|(condition, body)| NodeKind::While { condition, body }),
            (boxed.clone(), boxed.clone()).prop_map(|(body, condition)| NodeKind::DoWhile { body, condition }),
            (
                prop::option::of(boxed.clone()),
                prop::option::of(boxed.clone()),
                prop::option::of(boxed.clone()),
                boxed.clone()
            )
                .prop_map(|(init, condition, increment, body)| NodeKind::For {
                    init,
                    condition,
                    increment,
                    body,
                }),
            (
                boxed.clone(),
                prop::collection::vec(
                    (prop::option::of(boxed.clone()), prop::collection::vec(inner.clone(), 0..3), loc()),
                    0..3
                )
            )
                .prop_map(|(expr, cases)| NodeKind::Switch {
                    expr,
                    cases: cases
                        .into_iter()
                        .map(|(value, body, location)| SwitchCase { value, body, location })
                        .collect(),
                }),
            prop::option::of(boxed.clone()).prop_map(|expr| NodeKind::Return { expr }),
            boxed.clone().prop_map(|expr| NodeKind::ExprStmt { expr }),
            (ident(), c_type(), prop::option::of(boxed.clone()))
                .prop_map(|(name, var_type, init)| NodeKind::VarDecl { name, var_type, init }),
            (
                ident(),
                c_type(),
                prop::collection::vec((ident(), c_type()), 0..3),
                prop::option::of(boxed.clone())
            )
                .prop_map(|(name, return_type, params, body)| NodeKind::FunctionDecl {
                    name,
                    return_type,
                    params: params
                        .into_iter()
                        .map(|(name, param_type)| Param { name, param_type })
                        .collect(),
                    body,
                }),
            (
                ident(),
                prop::collection::vec((ident(), prop::option::of(boxed.clone())), 0..4)
            )
                .prop_map(|(name, constants)| NodeKind::EnumDecl {
                    name,
                    constants: constants
                        .into_iter()
                        .map(|(name, value)| EnumConstant { name, value })
                        .collect(),
                }),
            (ident(), prop::collection::vec((ident(), c_type()), 0..4)).prop_map(|(name, fields)| {
                NodeKind::StructDecl {
                    name,
                    fields: fields
                        .into_iter()
                        .map(|(name, field_type)| Field { name, field_type })
                        .collect(),
                }
            }),
            (ident(), c_type()).prop_map(|(name, target)| NodeKind::TypedefDecl { name, target }),
            (
                prop::sample::select(WasmOp::ALL),
                immediate(),
                prop::collection::vec(inner.clone(), 0..3)
            )
                .prop_map(|(op, immediate, operands)| NodeKind::Wasm(WasmInstr::new(op, immediate, operands))),
            prop::collection::vec(inner, 0..4).prop_map(|declarations| NodeKind::TranslationUnit { declarations }),
        ];
        (kind, loc()).prop_map(|(kind, location)| AstNode::new(kind, location))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn generated_trees_survive_round_trip(node in tree()) {
        let bytes = serialize(&node).unwrap();
        let back = deserialize(&bytes).unwrap();
        prop_assert_eq!(back, node);
    }

    #[test]
    fn truncated_encodings_never_decode(node in tree(), cut in any::<prop::sample::Index>()) {
        let bytes = serialize(&node).unwrap();
        let cut = cut.index(bytes.len());
        prop_assert!(deserialize(&bytes[..cut]).is_err());
    }
}

#[test]
fn test_parsed_program_round_trip() {
    let source = r#"
        typedef unsigned long size_t;
        struct Point { int x; int y; };
        union Word { int i; char bytes[4]; };
        enum Mode { OFF, ON = 1 << 3 };

        int table[3][4];
        const char *greeting = "hi\n";

        int helper(int *p, struct Point pt);

        int main(int argc, char **argv) {
            struct Point pt;
            pt.x = 1;
            double ratio = 2.5e-3;
            for (int i = 0; i < 10; i++) {
                if (i % 2) continue; else table[0][i % 4] += i;
            }
            switch (argc) {
                case ON: return -1;
                default: break;
            }
            do { pt.y--; } while (pt.y > -3 && !0);
            return (int)(sizeof(size_t) + sizeof pt.x) ? helper(&pt.x, pt) : 'c';
        }
    "#;
    let unit = parse_source(source, "all.c").unwrap();
    let bytes = serialize(&unit).unwrap();
    assert_eq!(deserialize(&bytes).unwrap(), unit);

    let module = astc::decode_module(&astc::encode_module(&unit, "main").unwrap()).unwrap();
    assert_eq!(module.unit, unit);
    assert_eq!(module.entry.as_deref(), Some("main"));
}

fn sum_chain(terms: usize) -> String {
    format!("int main() {{ return {}; }}", vec!["1"; terms].join(" + "))
}

#[test]
fn test_long_expression_chain_round_trip() {
    let unit = parse_source(&sum_chain(400), "chain.c").unwrap();
    let bytes = serialize(&unit).unwrap();
    assert_eq!(deserialize(&bytes).unwrap(), unit);

    let outcome = astcc::Pipeline::default().interpret(&unit).unwrap();
    assert_eq!(outcome.status, 400);
}

#[test]
fn test_over_deep_chain_is_rejected() {
    let unit = parse_source(&sum_chain(1100), "chain.c").unwrap();
    match serialize(&unit) {
        Err(astc::SerializationError::DepthLimitExceeded { limit, .. }) => assert_eq!(limit, astc::errors::MAX_DEPTH),
        other => panic!("expected a depth error, got {:?}", other.map(|bytes| bytes.len())),
    }
    assert!(matches!(
        astc::encode_module(&unit, "main"),
        Err(astc::SerializationError::DepthLimitExceeded { .. })
    ));
}
