//! Delta application checked against a straightforward reference model.

use proptest::prelude::*;

use mirror_rs::delta::apply_delta;

const MAX_OUT: usize = 1 << 20;

fn encode_size(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            return out;
        }
    }
}

/// One generated delta operation.
#[derive(Clone, Debug)]
enum Op {
    /// Copy `len` bytes from `offset` within the base.
    Copy { offset: usize, len: usize },
    /// Insert the literal bytes.
    Insert(Vec<u8>),
}

/// Ops valid for a base of `base_len` bytes (requires `base_len >= 1`).
fn op_strategy(base_len: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..base_len, 1usize..64).prop_map(move |(offset, len)| {
            let len = len.min(base_len - offset);
            Op::Copy { offset, len }
        }),
        prop::collection::vec(any::<u8>(), 1..64).prop_map(Op::Insert),
    ]
}

/// Encodes ops into a delta stream and computes the expected output.
fn build_delta(base: &[u8], ops: &[Op]) -> (Vec<u8>, Vec<u8>) {
    let mut expected = Vec::new();
    for op in ops {
        match op {
            Op::Copy { offset, len } => expected.extend_from_slice(&base[*offset..offset + len]),
            Op::Insert(bytes) => expected.extend_from_slice(bytes),
        }
    }

    let mut delta = encode_size(base.len() as u64);
    delta.extend_from_slice(&encode_size(expected.len() as u64));
    for op in ops {
        match op {
            Op::Copy { offset, len } => {
                // Emit all four offset bytes and all three length bytes;
                // redundant zero bytes are legal in the encoding.
                delta.push(0x80 | 0x0f | 0x70);
                delta.extend_from_slice(&(*offset as u32).to_le_bytes());
                let len_bytes = (*len as u32).to_le_bytes();
                delta.extend_from_slice(&len_bytes[..3]);
            }
            Op::Insert(bytes) => {
                delta.push(bytes.len() as u8);
                delta.extend_from_slice(bytes);
            }
        }
    }
    (delta, expected)
}

proptest! {
    #[test]
    fn insert_only_delta_concatenates_literals(
        literals in prop::collection::vec(
            prop::collection::vec(any::<u8>(), 1..=127),
            0..10,
        )
    ) {
        let expected: Vec<u8> = literals.concat();
        let mut delta = encode_size(0);
        delta.extend_from_slice(&encode_size(expected.len() as u64));
        for literal in &literals {
            delta.push(literal.len() as u8);
            delta.extend_from_slice(literal);
        }

        prop_assert_eq!(apply_delta(b"", &delta, MAX_OUT).unwrap(), expected);
    }

    #[test]
    fn prefix_copy_yields_leading_base_bytes(
        base in prop::collection::vec(any::<u8>(), 1..512),
        take in 1usize..512,
    ) {
        let take = take.min(base.len());
        let mut delta = encode_size(base.len() as u64);
        delta.extend_from_slice(&encode_size(take as u64));
        delta.push(0x80 | 0x0f | 0x70);
        delta.extend_from_slice(&0u32.to_le_bytes());
        delta.extend_from_slice(&(take as u32).to_le_bytes()[..3]);

        prop_assert_eq!(apply_delta(&base, &delta, MAX_OUT).unwrap(), &base[..take]);
    }

    #[test]
    fn generated_deltas_match_the_reference_model(
        base in prop::collection::vec(any::<u8>(), 1..400),
        ops in prop::collection::vec(op_strategy(399), 0..16),
    ) {
        // Clamp generated copies to the actual base length.
        let ops: Vec<Op> = ops
            .into_iter()
            .map(|op| match op {
                Op::Copy { offset, len } => {
                    let offset = offset.min(base.len() - 1);
                    let len = len.min(base.len() - offset).max(1);
                    Op::Copy { offset, len }
                }
                insert => insert,
            })
            .collect();

        let (delta, expected) = build_delta(&base, &ops);
        prop_assert_eq!(apply_delta(&base, &delta, MAX_OUT).unwrap(), expected);
    }
}
