//! Integration tests for the SVML assembler: container-level checks
//! and round-trip properties over generated programs.

use proptest::prelude::*;
use svml_assembler::{assemble, disassemble, AssembleError, DisassembleError, MAGIC};
use svml_common::{verify, Arg, Instruction, Opcode, SvmFunction, SvmProgram};

fn lgci(v: i64) -> Instruction {
    Instruction::with_int(Opcode::Lgci, v)
}

fn retg() -> Instruction {
    Instruction::nullary(Opcode::Retg)
}

/// A program exercising every operand layout.
fn kitchen_sink() -> SvmProgram {
    let child = SvmFunction::new(
        1,
        2,
        1,
        vec![
            Instruction::with_int(Opcode::Ldlg, 0),
            Instruction::with_int(Opcode::Stlg, 1),
            Instruction::with_ints(Opcode::Ldpg, 0, 1),
            retg(),
        ],
    );
    let entry = SvmFunction::new(
        2,
        1,
        0,
        vec![
            lgci(-7),
            Instruction::unary(Opcode::Lgcf64, Arg::Float(2.5)),
            Instruction::nullary(Opcode::Addg),
            Instruction::with_int(Opcode::Lgcs, 0),
            Instruction::nullary(Opcode::Popg),
            Instruction::nullary(Opcode::Popg),
            Instruction::with_int(Opcode::Newc, 1),
            Instruction::with_int(Opcode::Stlg, 0),
            Instruction::nullary(Opcode::Lgcb1),
            Instruction::with_int(Opcode::Brf, 2),
            Instruction::with_int(Opcode::Ldlg, 0),
            Instruction::with_int(Opcode::Br, 1),
            Instruction::with_int(Opcode::Ldlg, 0),
            lgci(1),
            Instruction::with_int(Opcode::Call, 1),
            Instruction::with_ints(Opcode::Callp, 10, 1),
            retg(),
        ],
    );
    let mut program = SvmProgram::new(0, vec![entry, child]);
    program.intern("a string constant");
    program
}

#[test]
fn kitchen_sink_roundtrips() {
    let program = kitchen_sink();
    let bytes = assemble(&program).unwrap();
    let back = disassemble(&bytes).unwrap();
    assert_eq!(back, program);
}

#[test]
fn roundtripped_functions_keep_their_contracts() {
    let program = kitchen_sink();
    let back = disassemble(&assemble(&program).unwrap()).unwrap();
    assert_eq!(back.functions.len(), program.functions.len());
    for (a, b) in program.functions.iter().zip(&back.functions) {
        assert_eq!(a.max_stack, b.max_stack);
        assert_eq!(a.env_size, b.env_size);
        assert_eq!(a.num_args, b.num_args);
        assert_eq!(a.code, b.code);
    }
}

#[test]
fn functions_are_four_byte_aligned() {
    let program = kitchen_sink();
    let bytes = assemble(&program).unwrap();
    let entry_off = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    assert_eq!(entry_off % 4, 0);
}

#[test]
fn magic_is_little_endian_on_the_wire() {
    let bytes = assemble(&kitchen_sink()).unwrap();
    assert_eq!(bytes[0], 0xAD);
    assert_eq!(bytes[1], 0xAC);
    assert_eq!(bytes[2], 0x05);
    assert_eq!(bytes[3], 0x50);
    assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), MAGIC);
}

#[test]
fn empty_input_rejected() {
    assert!(matches!(
        disassemble(&[]),
        Err(DisassembleError::Truncated { .. })
    ));
}

#[test]
fn garbage_rejected() {
    let garbage = vec![0x5A; 64];
    assert!(matches!(
        disassemble(&garbage),
        Err(DisassembleError::BadMagic { .. })
    ));
}

#[test]
fn program_with_no_functions_rejected() {
    let program = SvmProgram::new(0, vec![]);
    assert_eq!(
        assemble(&program),
        Err(AssembleError::EntryOutOfRange { index: 0 })
    );
}

#[test]
fn deep_nesting_roundtrips() {
    // A chain of closures: each function builds the next.
    let mut functions = Vec::new();
    for i in 0..10usize {
        let code = if i == 9 {
            vec![lgci(99), retg()]
        } else {
            vec![
                Instruction::with_int(Opcode::Newc, (i + 1) as i64),
                retg(),
            ]
        };
        functions.push(SvmFunction::new(1, 0, 0, code));
    }
    let program = SvmProgram::new(0, functions);
    let bytes = assemble(&program).unwrap();
    let back = disassemble(&bytes).unwrap();
    assert_eq!(back, program);
}

#[test]
fn many_strings_roundtrip() {
    let mut program = SvmProgram::new(
        0,
        vec![SvmFunction::new(
            1,
            0,
            0,
            vec![Instruction::with_int(Opcode::Lgcs, 17), retg()],
        )],
    );
    for i in 0..40 {
        program.intern(&format!("string number {i}"));
    }
    let bytes = assemble(&program).unwrap();
    let back = disassemble(&bytes).unwrap();
    assert_eq!(back.strings.len(), 40);
    assert_eq!(back, program);
}

#[test]
fn roundtripped_program_passes_static_checks() {
    let program = kitchen_sink();
    let back = disassemble(&assemble(&program).unwrap()).unwrap();
    assert!(verify::check_program(&back).is_ok());
}

// ---- Property tests ----

/// A straight-line function: k constant pushes, k−1 pops, RETG.
/// Always stack-disciplined; exercises constants, strings and NEWC.
fn arb_function(num_strings: usize, num_functions: usize) -> impl Strategy<Value = SvmFunction> {
    let push = prop_oneof![
        (i32::MIN..i32::MAX).prop_map(|v| lgci(v as i64)),
        any::<f64>().prop_map(|v| Instruction::unary(Opcode::Lgcf64, Arg::Float(v))),
        Just(Instruction::nullary(Opcode::Lgcb0)),
        Just(Instruction::nullary(Opcode::Lgcb1)),
        Just(Instruction::nullary(Opcode::Lgcu)),
        Just(Instruction::nullary(Opcode::Lgcn)),
        (0..num_strings).prop_map(|i| Instruction::with_int(Opcode::Lgcs, i as i64)),
        (0..num_functions).prop_map(|i| Instruction::with_int(Opcode::Newc, i as i64)),
    ];
    prop::collection::vec(push, 1..12).prop_map(|pushes| {
        let peak = pushes.len();
        let mut code = pushes;
        for _ in 0..peak - 1 {
            code.push(Instruction::nullary(Opcode::Popg));
        }
        code.push(retg());
        SvmFunction::new(peak, 0, 0, code)
    })
}

fn arb_program() -> impl Strategy<Value = SvmProgram> {
    // Distinct strings: the assembler deduplicates the table, so
    // duplicates would not survive a byte-level comparison.
    let strings = prop::collection::btree_set("[a-z]{1,12}", 1..5);
    (strings, 1..4usize).prop_flat_map(|(strings, nfuncs)| {
        let strings: Vec<String> = strings.into_iter().collect();
        let n = strings.len();
        prop::collection::vec(arb_function(n, nfuncs), nfuncs..=nfuncs).prop_map(
            move |mut functions| {
                // Make every function reachable from the entry: chain
                // NEWC references ahead of the real body.
                for i in 0..functions.len().saturating_sub(1) {
                    let mut code = vec![
                        Instruction::with_int(Opcode::Newc, (i + 1) as i64),
                        Instruction::nullary(Opcode::Popg),
                    ];
                    code.extend(functions[i].code.iter().copied());
                    functions[i] = SvmFunction::new(
                        functions[i].max_stack,
                        functions[i].env_size,
                        functions[i].num_args,
                        code,
                    );
                }
                SvmProgram {
                    entry_index: 0,
                    functions,
                    strings: strings.clone(),
                }
            },
        )
    })
}

proptest! {
    /// disassemble(assemble(p)) reproduces p, up to string-pool
    /// deduplication.
    #[test]
    fn roundtrip_generated_programs(program in arb_program()) {
        let bytes = assemble(&program).unwrap();
        let back = disassemble(&bytes).unwrap();
        prop_assert_eq!(back.entry_index, program.entry_index);
        prop_assert_eq!(back.functions.len(), program.functions.len());
        for (a, b) in program.functions.iter().zip(&back.functions) {
            prop_assert_eq!(&a.code, &b.code);
            prop_assert_eq!(a.max_stack, b.max_stack);
        }
    }

    /// Assembled output always carries the magic and a 16-byte header.
    #[test]
    fn assembled_header_is_well_formed(program in arb_program()) {
        let bytes = assemble(&program).unwrap();
        prop_assert!(bytes.len() >= 16);
        prop_assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), MAGIC);
    }
}
