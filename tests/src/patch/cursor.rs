use super::Fixed;
use ilweave_core::validator::verify;
use ilweave_core::{Instruction, InstructionStream, MethodId, Opcode, Signature, ValueType};
use ilweave_patch::pattern::{any, ldc_i4, opcode};
use ilweave_patch::{Cursor, CursorState, Error, Matcher};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Sums `len` constants drawn from 0..4; returns the stream and how many equal `needle`.
fn sum_of_constants(rng: &mut StdRng, len: usize, needle: i32) -> (InstructionStream, usize) {
    let mut stream = InstructionStream::new(
        MethodId::new("Sum", "constants"),
        Signature::new(vec![], Some(ValueType::I32)),
    );
    let mut hits = 0;
    for i in 0..len {
        let value = rng.random_range(0..4);
        if value == needle {
            hits += 1;
        }
        stream.push(Instruction::ldc_i4(value));
        if i > 0 {
            stream.push(Instruction::simple(Opcode::Add));
        }
    }
    stream.push(Instruction::simple(Opcode::Ret));
    (stream, hits)
}

#[test]
fn test_single_match_is_found_then_exhausted() {
    let mut rng = StdRng::seed_from_u64(0xc0ffee);
    for _ in 0..40 {
        let (mut stream, _) = sum_of_constants(&mut rng, 8, 9);
        let at = rng.random_range(0..stream.len());
        // Plant a unique needle at a random position.
        let planted = stream.insert(at, Instruction::ldc_i4(9)).unwrap();
        let position = stream.position_of(planted).unwrap();

        let mut cursor = Cursor::new(&mut stream);
        assert!(cursor.find_next(&ldc_i4(9)));
        assert_eq!(cursor.index(), Some(position));
        assert!(!cursor.find_next(&ldc_i4(9)));
        assert_eq!(cursor.state(), CursorState::Exhausted);
    }
}

#[test]
fn test_zero_matches_leave_stream_unmodified() {
    let mut rng = StdRng::seed_from_u64(17);
    for _ in 0..40 {
        let (mut stream, _) = sum_of_constants(&mut rng, 10, 7);
        let before = stream.digest().unwrap();
        {
            let mut cursor = Cursor::new(&mut stream);
            assert!(!cursor.find_next(&ldc_i4(7)));
        }
        assert_eq!(stream.digest().unwrap(), before);
    }
}

#[test]
fn test_replacing_every_match_preserves_length_and_balance() {
    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..40 {
        let (mut stream, hits) = sum_of_constants(&mut rng, 10, 2);
        let len = stream.len();
        let expected = ilweave_core::interp::execute(&stream, &[]).unwrap();
        let source = Arc::new(Fixed::i32("two", 2));

        let mut replaced = 0;
        {
            let mut cursor = Cursor::new(&mut stream);
            while cursor.find_next(&ldc_i4(2)) {
                cursor.remove_current().unwrap();
                cursor.insert_call(source.clone()).unwrap();
                replaced += 1;
            }
        }

        assert_eq!(replaced, hits);
        assert_eq!(stream.len(), len);
        assert_eq!(stream.externals().len(), hits);
        verify(&stream).unwrap();
        assert_eq!(ilweave_core::interp::execute(&stream, &[]).unwrap(), expected);
    }
}

#[test]
fn test_removed_branch_target_moves_to_replacement() {
    let src = "
.method Loop::f(bool) -> i32
    ldarg 0
    brtrue @five
    ldc.i4 1
    ret
@five:
    ldc.i4 5
    ret
";
    let mut stream = ilweave_core::decoder::parse_method(src).unwrap();
    let call_id = {
        let mut cursor = Cursor::new(&mut stream);
        assert!(cursor.find_next(&ldc_i4(5)));
        cursor.remove_current().unwrap();
        cursor.insert_call(Arc::new(Fixed::i32("seven", 7))).unwrap();
        cursor.stream().id_at(cursor.index().unwrap()).unwrap()
    };
    assert_eq!(stream.get(1).and_then(|i| i.label()), Some(call_id));
    verify(&stream).unwrap();
}

#[test]
fn test_remove_without_current_instruction() {
    let (mut stream, _) = sum_of_constants(&mut StdRng::seed_from_u64(1), 3, 0);
    let mut cursor = Cursor::new(&mut stream);
    assert!(matches!(
        cursor.remove_current(),
        Err(Error::NoCurrentInstruction)
    ));
    assert!(cursor.find_next(&any()));
    cursor.remove_current().unwrap();
    // A gap is not an instruction either.
    assert!(matches!(
        cursor.remove_current(),
        Err(Error::NoCurrentInstruction)
    ));
}

#[test]
fn test_dyn_matchers_in_windows() {
    let (mut stream, _) = sum_of_constants(&mut StdRng::seed_from_u64(5), 4, 0);
    let mut cursor = Cursor::new(&mut stream);
    let add_then_const: [&dyn Matcher; 2] = [&opcode(Opcode::Add), &opcode(Opcode::LdcI4)];
    let mut windows = 0;
    while cursor.find_next_sequence(&add_then_const) {
        windows += 1;
    }
    // ldc ldc add ldc add ldc add ret
    assert_eq!(windows, 2);
}
