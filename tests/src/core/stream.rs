use ilweave_core::{
    InstrId, Instruction, InstructionStream, MethodId, Opcode, Signature, ValueType,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_stream(rng: &mut StdRng, len: usize) -> InstructionStream {
    let mut stream = InstructionStream::new(
        MethodId::new("Random", "body"),
        Signature::new(vec![ValueType::I32], None),
    );
    for _ in 0..len {
        let instruction = match rng.random_range(0..3) {
            0 => Instruction::ldc_i4(rng.random_range(-8..8)),
            1 => Instruction::ldarg(0),
            _ => Instruction::simple(Opcode::Nop),
        };
        stream.push(instruction);
    }
    stream
}

#[test]
fn test_ids_survive_random_edits() {
    let mut rng = StdRng::seed_from_u64(0x11_57_ea_7e);
    for _ in 0..50 {
        let mut stream = random_stream(&mut rng, 12);
        let mut tracked: Vec<(InstrId, Instruction)> = stream
            .entries()
            .iter()
            .map(|e| (e.id(), e.instruction().clone()))
            .collect();

        for _ in 0..20 {
            if stream.is_empty() || rng.random_bool(0.5) {
                let at = rng.random_range(0..=stream.len());
                let instruction = Instruction::ldc_i4(rng.random());
                let id = stream.insert(at, instruction.clone()).unwrap();
                tracked.push((id, instruction));
            } else {
                let at = rng.random_range(0..stream.len());
                let (id, _) = stream.remove(at).unwrap();
                tracked.retain(|(kept, _)| *kept != id);
            }
        }

        assert_eq!(tracked.len(), stream.len());
        let positions = stream.positions();
        for (id, instruction) in &tracked {
            let pos = positions[id];
            assert_eq!(stream.id_at(pos), Some(*id));
            assert_eq!(stream.get(pos), Some(instruction));
        }
    }
}

#[test]
fn test_branch_follows_its_target_across_inserts() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut stream = random_stream(&mut rng, 6);
    let target = stream.id_at(4).unwrap();
    stream.insert(0, Instruction::branch(Opcode::Br, target)).unwrap();

    for _ in 0..10 {
        let at = rng.random_range(1..=stream.len());
        stream.insert(at, Instruction::simple(Opcode::Nop)).unwrap();
    }

    let branch = stream.get(0).unwrap();
    assert_eq!(branch.label(), Some(target));
    assert_eq!(stream.referrers(target), vec![stream.id_at(0).unwrap()]);
}

#[test]
fn test_out_of_bounds_edits_are_rejected() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut stream = random_stream(&mut rng, 3);
    assert!(stream.insert(4, Instruction::simple(Opcode::Nop)).is_err());
    assert!(stream.remove(3).is_err());
    assert_eq!(stream.len(), 3);
}

#[test]
fn test_retarget_moves_every_referrer() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut stream = random_stream(&mut rng, 4);
    let old = stream.id_at(3).unwrap();
    let new = stream.id_at(2).unwrap();
    stream.insert(0, Instruction::branch(Opcode::Br, old)).unwrap();
    stream.insert(1, Instruction::branch(Opcode::Brtrue, old)).unwrap();

    let changed = stream.retarget(old, new);
    assert_eq!(changed.len(), 2);
    assert!(stream.referrers(old).is_empty());
    assert_eq!(stream.referrers(new).len(), 2);
}
