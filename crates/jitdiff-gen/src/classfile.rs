//! Minimal Java class-file emitter.
//!
//! Emits a valid class file (major version 52) containing a single
//! `public static void main(String[])` whose body is a seed-derived
//! straight-line chain of `long` operations folding into one value that is
//! printed via `System.out.println(long)`.  The printed value is therefore a
//! pure function of the emitted bytecode, which gives every execution
//! backend the same observable output to agree on.
//!
//! Division is deliberately excluded from the mix: a zero divisor drawn from
//! the stream would make the interesting output an exception for most seeds.

use crate::config::GeneratorConfig;
use crate::error::{GenerationError, Result};
use crate::rng::XorShift64;

const MAGIC: u32 = 0xCAFE_BABE;
const MAJOR_VERSION: u16 = 52; // Java 8

// Constant-pool tags
const CONST_UTF8: u8 = 1;
const CONST_LONG: u8 = 5;
const CONST_CLASS: u8 = 7;
const CONST_FIELDREF: u8 = 9;
const CONST_METHODREF: u8 = 10;
const CONST_NAME_AND_TYPE: u8 = 12;

// Fixed constant-pool indices (longs follow at FIRST_LONG_INDEX)
const IDX_THIS_CLASS: u16 = 2;
const IDX_SUPER_CLASS: u16 = 4;
const IDX_MAIN_NAME: u16 = 5;
const IDX_MAIN_DESC: u16 = 6;
const IDX_CODE_ATTR: u16 = 7;
const IDX_OUT_FIELDREF: u16 = 13;
const IDX_PRINTLN_METHODREF: u16 = 19;
const FIRST_LONG_INDEX: u16 = 20;

// Opcodes
const OP_LDC2_W: u8 = 0x14;
const OP_LADD: u8 = 0x61;
const OP_LSUB: u8 = 0x65;
const OP_LMUL: u8 = 0x69;
const OP_LAND: u8 = 0x7F;
const OP_LOR: u8 = 0x81;
const OP_LXOR: u8 = 0x83;
const OP_GETSTATIC: u8 = 0xB2;
const OP_INVOKEVIRTUAL: u8 = 0xB6;
const OP_RETURN: u8 = 0xB1;

// getstatic + initial ldc2_w + invokevirtual + return
const CODE_OVERHEAD: usize = 10;
// ldc2_w + two-byte index + operation byte
const BYTES_PER_OP: usize = 4;

/// Largest op count whose constant pool still fits the format.
///
/// Every op adds one long operand, each long occupies two pool slots, and
/// both the pool count and every `ldc2_w` index are u16 fields.  Beyond
/// this bound the pool count would wrap and the emitted indices would
/// alias earlier entries.
pub const MAX_OP_COUNT: u32 = (u16::MAX as u32 - FIRST_LONG_INDEX as u32 - 2) / 2;

/// One drawn operation of the method body.
#[derive(Debug, Clone, Copy)]
struct DrawnOp {
    opcode: u8,
    operand: i64,
}

/// Emit the class file for `(seed, config)`.
///
/// Deterministic: identical inputs always produce identical bytes.
pub fn emit_class(seed: u64, config: &GeneratorConfig) -> Result<Vec<u8>> {
    config.validate()?;
    if config.op_count > MAX_OP_COUNT {
        return Err(GenerationError::InvalidConfig(format!(
            "op_count {} exceeds the constant-pool limit of {MAX_OP_COUNT}",
            config.op_count
        )));
    }

    let class_name = config.class_name(seed);
    let mut rng = XorShift64::new(seed);

    let initial: i64 = rng.next_u64() as i64;
    let ops: Vec<DrawnOp> = (0..config.op_count)
        .map(|_| draw_op(&mut rng, config))
        .collect();

    let bytes = assemble(&class_name, initial, &ops);
    if bytes.len() > config.max_bytecode_size as usize {
        return Err(GenerationError::SizeBudget {
            needed: bytes.len(),
            budget: config.max_bytecode_size,
        });
    }
    Ok(bytes)
}

/// The value the generated program prints, mirroring JVM wrapping
/// semantics.  Exposed for harness self-tests.
pub fn expected_value(seed: u64, config: &GeneratorConfig) -> i64 {
    let mut rng = XorShift64::new(seed);
    let mut acc = rng.next_u64() as i64;
    for _ in 0..config.op_count {
        let op = draw_op(&mut rng, config);
        acc = match op.opcode {
            OP_LADD => acc.wrapping_add(op.operand),
            OP_LSUB => acc.wrapping_sub(op.operand),
            OP_LMUL => acc.wrapping_mul(op.operand),
            OP_LAND => acc & op.operand,
            OP_LOR => acc | op.operand,
            _ => acc ^ op.operand,
        };
    }
    acc
}

fn draw_op(rng: &mut XorShift64, config: &GeneratorConfig) -> DrawnOp {
    let w = &config.weights;
    let mut pick = rng.next_below(w.total());
    let operand = rng.next_u64() as i64;

    let table = [
        (u64::from(w.add), OP_LADD),
        (u64::from(w.sub), OP_LSUB),
        (u64::from(w.mul), OP_LMUL),
        (u64::from(w.and), OP_LAND),
        (u64::from(w.or), OP_LOR),
        (u64::from(w.xor), OP_LXOR),
    ];
    for (weight, opcode) in table {
        if pick < weight {
            return DrawnOp { opcode, operand };
        }
        pick -= weight;
    }
    // Unreachable while total() covers the draw range
    DrawnOp { opcode: OP_LXOR, operand }
}

fn assemble(class_name: &str, initial: i64, ops: &[DrawnOp]) -> Vec<u8> {
    let n_longs = ops.len() + 1;
    let mut out = Vec::with_capacity(512 + ops.len() * 16);

    put_u32(&mut out, MAGIC);
    put_u16(&mut out, 0); // minor
    put_u16(&mut out, MAJOR_VERSION);

    // Each long occupies two constant-pool slots.
    let cp_count = FIRST_LONG_INDEX as usize + 2 * n_longs;
    put_u16(&mut out, cp_count as u16);

    put_utf8(&mut out, class_name); // 1
    put_class(&mut out, 1); // 2
    put_utf8(&mut out, "java/lang/Object"); // 3
    put_class(&mut out, 3); // 4
    put_utf8(&mut out, "main"); // 5
    put_utf8(&mut out, "([Ljava/lang/String;)V"); // 6
    put_utf8(&mut out, "Code"); // 7
    put_utf8(&mut out, "java/lang/System"); // 8
    put_class(&mut out, 8); // 9
    put_utf8(&mut out, "out"); // 10
    put_utf8(&mut out, "Ljava/io/PrintStream;"); // 11
    put_name_and_type(&mut out, 10, 11); // 12
    out.push(CONST_FIELDREF); // 13
    put_u16(&mut out, 9);
    put_u16(&mut out, 12);
    put_utf8(&mut out, "java/io/PrintStream"); // 14
    put_class(&mut out, 14); // 15
    put_utf8(&mut out, "println"); // 16
    put_utf8(&mut out, "(J)V"); // 17
    put_name_and_type(&mut out, 16, 17); // 18
    out.push(CONST_METHODREF); // 19
    put_u16(&mut out, 15);
    put_u16(&mut out, 18);

    put_long(&mut out, initial); // 20 (+ phantom 21)
    for op in ops {
        put_long(&mut out, op.operand);
    }

    put_u16(&mut out, 0x0021); // ACC_PUBLIC | ACC_SUPER
    put_u16(&mut out, IDX_THIS_CLASS);
    put_u16(&mut out, IDX_SUPER_CLASS);
    put_u16(&mut out, 0); // interfaces
    put_u16(&mut out, 0); // fields

    put_u16(&mut out, 1); // methods
    put_u16(&mut out, 0x0009); // ACC_PUBLIC | ACC_STATIC
    put_u16(&mut out, IDX_MAIN_NAME);
    put_u16(&mut out, IDX_MAIN_DESC);
    put_u16(&mut out, 1); // attribute count

    let code_len = CODE_OVERHEAD + ops.len() * BYTES_PER_OP;
    put_u16(&mut out, IDX_CODE_ATTR);
    put_u32(&mut out, (12 + code_len) as u32); // attribute length
    put_u16(&mut out, 5); // max_stack: objectref + two longs
    put_u16(&mut out, 1); // max_locals: String[] args
    put_u32(&mut out, code_len as u32);

    out.push(OP_GETSTATIC);
    put_u16(&mut out, IDX_OUT_FIELDREF);
    out.push(OP_LDC2_W);
    put_u16(&mut out, FIRST_LONG_INDEX);
    for (k, op) in ops.iter().enumerate() {
        out.push(OP_LDC2_W);
        put_u16(&mut out, FIRST_LONG_INDEX + 2 * (k as u16 + 1));
        out.push(op.opcode);
    }
    out.push(OP_INVOKEVIRTUAL);
    put_u16(&mut out, IDX_PRINTLN_METHODREF);
    out.push(OP_RETURN);

    put_u16(&mut out, 0); // exception table
    put_u16(&mut out, 0); // code attributes
    put_u16(&mut out, 0); // class attributes

    out
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_utf8(out: &mut Vec<u8>, s: &str) {
    out.push(CONST_UTF8);
    put_u16(out, s.len() as u16);
    out.extend_from_slice(s.as_bytes());
}

fn put_class(out: &mut Vec<u8>, name_index: u16) {
    out.push(CONST_CLASS);
    put_u16(out, name_index);
}

fn put_name_and_type(out: &mut Vec<u8>, name_index: u16, desc_index: u16) {
    out.push(CONST_NAME_AND_TYPE);
    put_u16(out, name_index);
    put_u16(out, desc_index);
}

fn put_long(out: &mut Vec<u8>, v: i64) {
    out.push(CONST_LONG);
    out.extend_from_slice(&v.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpWeights;

    fn config(op_count: u32) -> GeneratorConfig {
        GeneratorConfig { op_count, ..GeneratorConfig::default() }
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let cfg = config(32);
        let a = emit_class(7, &cfg).unwrap();
        let b = emit_class(7, &cfg).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_differ() {
        let cfg = config(32);
        let a = emit_class(1, &cfg).unwrap();
        let b = emit_class(2, &cfg).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn header_is_well_formed() {
        let cfg = config(4);
        let bytes = emit_class(0, &cfg).unwrap();
        assert_eq!(&bytes[0..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), 0);
        assert_eq!(u16::from_be_bytes([bytes[6], bytes[7]]), MAJOR_VERSION);
        // constant pool count: fixed entries + 2 slots per long
        let cp = u16::from_be_bytes([bytes[8], bytes[9]]);
        assert_eq!(cp, FIRST_LONG_INDEX + 2 * 5);
    }

    #[test]
    fn size_budget_enforced() {
        let cfg = GeneratorConfig {
            max_bytecode_size: 20,
            ..config(4)
        };
        match emit_class(0, &cfg) {
            Err(GenerationError::SizeBudget { needed, budget }) => {
                assert!(needed > 20);
                assert_eq!(budget, 20);
            }
            other => panic!("expected SizeBudget, got {other:?}"),
        }
    }

    #[test]
    fn op_count_scales_size() {
        let small = emit_class(0, &config(1)).unwrap();
        let large = emit_class(0, &config(100)).unwrap();
        // each op adds a 9-byte long constant and 4 code bytes
        assert_eq!(large.len() - small.len(), 99 * (9 + BYTES_PER_OP));
    }

    #[test]
    fn expected_value_is_stable() {
        let cfg = config(16);
        assert_eq!(expected_value(3, &cfg), expected_value(3, &cfg));
    }

    fn read_u16(bytes: &[u8], pos: &mut usize) -> u16 {
        let v = u16::from_be_bytes([bytes[*pos], bytes[*pos + 1]]);
        *pos += 2;
        v
    }

    fn read_u32(bytes: &[u8], pos: &mut usize) -> u32 {
        let v = u32::from_be_bytes([
            bytes[*pos],
            bytes[*pos + 1],
            bytes[*pos + 2],
            bytes[*pos + 3],
        ]);
        *pos += 4;
        v
    }

    #[test]
    fn op_count_beyond_pool_limit_rejected() {
        let cfg = GeneratorConfig {
            op_count: 40_000,
            max_bytecode_size: u32::MAX,
            ..GeneratorConfig::default()
        };
        assert!(matches!(
            emit_class(0, &cfg),
            Err(GenerationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn op_count_at_pool_limit_emits() {
        let at_limit = GeneratorConfig {
            op_count: MAX_OP_COUNT,
            max_bytecode_size: u32::MAX,
            ..GeneratorConfig::default()
        };
        let bytes = emit_class(0, &at_limit).unwrap();
        // the pool count still fits its u16 field
        let cp = u16::from_be_bytes([bytes[8], bytes[9]]) as u32;
        assert_eq!(cp, FIRST_LONG_INDEX as u32 + 2 * (MAX_OP_COUNT + 1));

        let past_limit = GeneratorConfig {
            op_count: MAX_OP_COUNT + 1,
            ..at_limit
        };
        assert!(emit_class(0, &past_limit).is_err());
    }

    #[test]
    fn expected_value_matches_emitted_bytecode() {
        let cfg = config(24);
        let seed = 5;
        let bytes = emit_class(seed, &cfg).unwrap();

        // walk the constant pool collecting long values by index
        let mut pos = 8;
        let cp_count = read_u16(&bytes, &mut pos) as usize;
        let mut longs: Vec<Option<i64>> = vec![None; cp_count];
        let mut index = 1;
        while index < cp_count {
            let tag = bytes[pos];
            pos += 1;
            match tag {
                CONST_UTF8 => {
                    let len = read_u16(&bytes, &mut pos) as usize;
                    pos += len;
                }
                CONST_CLASS => pos += 2,
                CONST_FIELDREF | CONST_METHODREF | CONST_NAME_AND_TYPE => pos += 4,
                CONST_LONG => {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(&bytes[pos..pos + 8]);
                    longs[index] = Some(i64::from_be_bytes(raw));
                    pos += 8;
                    index += 1; // longs take two slots
                }
                other => panic!("unexpected constant-pool tag {other}"),
            }
            index += 1;
        }

        // skip the class header, the single method header, and the code
        // attribute preamble to reach the instruction stream
        pos += 2 + 2 + 2 + 2 + 2; // access, this, super, interfaces, fields
        pos += 2 + 2 + 2 + 2 + 2; // method count, access, name, desc, attrs
        pos += 2 + 4; // attribute name index, attribute length
        pos += 2 + 2; // max_stack, max_locals
        let code_len = read_u32(&bytes, &mut pos) as usize;
        let code = &bytes[pos..pos + code_len];

        assert_eq!(code[0], OP_GETSTATIC);
        assert_eq!(code[3], OP_LDC2_W);
        let idx = u16::from_be_bytes([code[4], code[5]]) as usize;
        let mut acc = longs[idx].unwrap();
        let mut at = 6;
        while code[at] != OP_INVOKEVIRTUAL {
            assert_eq!(code[at], OP_LDC2_W);
            let idx = u16::from_be_bytes([code[at + 1], code[at + 2]]) as usize;
            let operand = longs[idx].unwrap();
            acc = match code[at + 3] {
                OP_LADD => acc.wrapping_add(operand),
                OP_LSUB => acc.wrapping_sub(operand),
                OP_LMUL => acc.wrapping_mul(operand),
                OP_LAND => acc & operand,
                OP_LOR => acc | operand,
                OP_LXOR => acc ^ operand,
                other => panic!("unexpected opcode {other:#x}"),
            };
            at += BYTES_PER_OP;
        }

        assert_eq!(acc, expected_value(seed, &cfg));
    }

    #[test]
    fn skewed_weights_still_emit() {
        let cfg = GeneratorConfig {
            weights: OpWeights { add: 0, sub: 0, mul: 0, and: 0, or: 0, xor: 1 },
            ..config(8)
        };
        assert!(emit_class(9, &cfg).is_ok());
    }
}
