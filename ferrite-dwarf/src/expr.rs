//! DWARF location expressions.
//!
//! An expression is a byte stream of operators, each a single opcode byte
//! followed by zero, one or two operands whose shapes are fixed by the
//! standard. Parsing runs in two passes: the first counts operators so
//! storage can be sized, the second fills the records in.

use ferrite_elf::{Buffer, Cursor, ElfError};

use crate::constants::*;
use crate::error::{DwarfError, DwarfErrorKind};

/// A single decoded operator.
///
/// Operands are carried as raw 64-bit values; signed operands (SLEB128
/// and the signed constant forms) keep their two's-complement bit
/// pattern. `operand2` is zero except for `DW_OP_bregx`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Operation {
    /// The operator (`DW_OP_*`).
    pub code: u8,
    /// The first operand, zero if the operator takes none.
    pub operand1: u64,
    /// The second operand, zero unless the operator takes two.
    pub operand2: u64,
}

/// A location description: an expression valid over an address range.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Locdesc {
    /// First address covered.
    pub lopc: u64,
    /// One past the last address covered.
    pub hipc: u64,
    /// The operators of the expression.
    pub operations: Vec<Operation>,
}

fn invalid(e: ElfError) -> DwarfError {
    DwarfError::new(DwarfErrorKind::InvalidExpr, e)
}

/// The operand shape of an opcode, or `None` for undefined opcodes.
enum Shape {
    None,
    Fixed(usize),
    Uleb,
    Sleb,
    UlebSleb,
    Addr,
}

fn shape_of(code: u8) -> Option<Shape> {
    match code {
        DW_OP_deref
        | DW_OP_dup
        | DW_OP_drop
        | DW_OP_over
        | DW_OP_swap
        | DW_OP_rot
        | DW_OP_xderef
        | DW_OP_abs
        | DW_OP_and
        | DW_OP_div
        | DW_OP_minus
        | DW_OP_mod
        | DW_OP_mul
        | DW_OP_neg
        | DW_OP_not
        | DW_OP_or
        | DW_OP_plus
        | DW_OP_shl
        | DW_OP_shr
        | DW_OP_shra
        | DW_OP_xor
        | DW_OP_eq
        | DW_OP_ge
        | DW_OP_gt
        | DW_OP_le
        | DW_OP_lt
        | DW_OP_ne
        | DW_OP_nop => Some(Shape::None),
        DW_OP_lit0..=DW_OP_lit31 | DW_OP_reg0..=DW_OP_reg31 => Some(Shape::None),
        DW_OP_const1u | DW_OP_const1s | DW_OP_pick | DW_OP_deref_size | DW_OP_xderef_size => {
            Some(Shape::Fixed(1))
        }
        DW_OP_const2u | DW_OP_const2s | DW_OP_bra | DW_OP_skip => Some(Shape::Fixed(2)),
        DW_OP_const4u | DW_OP_const4s => Some(Shape::Fixed(4)),
        DW_OP_const8u | DW_OP_const8s => Some(Shape::Fixed(8)),
        DW_OP_constu | DW_OP_plus_uconst | DW_OP_regx | DW_OP_piece => Some(Shape::Uleb),
        DW_OP_consts | DW_OP_fbreg => Some(Shape::Sleb),
        DW_OP_breg0..=DW_OP_breg31 => Some(Shape::Sleb),
        DW_OP_bregx => Some(Shape::UlebSleb),
        DW_OP_addr => Some(Shape::Addr),
        _ => None,
    }
}

/// Counts the operators in an expression.
///
/// Returns [`DwarfErrorKind::InvalidExpr`] when an undefined opcode or a
/// truncated operand is encountered.
pub fn count_operations(
    data: &[u8],
    endian: scroll::Endian,
    address_size: u8,
) -> Result<usize, DwarfError> {
    let mut cursor = Cursor::new(data, endian);
    let mut count = 0;

    while !cursor.is_empty() {
        let code = cursor.read_u8().map_err(invalid)?;
        match shape_of(code).ok_or(DwarfErrorKind::InvalidExpr)? {
            Shape::None => {}
            Shape::Fixed(size) => cursor.skip(size).map_err(invalid)?,
            Shape::Uleb => {
                cursor.read_uleb128().map_err(invalid)?;
            }
            Shape::Sleb => {
                cursor.read_sleb128().map_err(invalid)?;
            }
            Shape::UlebSleb => {
                cursor.read_uleb128().map_err(invalid)?;
                cursor.read_sleb128().map_err(invalid)?;
            }
            Shape::Addr => cursor.skip(address_size as usize).map_err(invalid)?,
        }
        count += 1;
    }

    Ok(count)
}

fn parse_one(
    cursor: &mut Cursor<'_>,
    address_size: u8,
) -> Result<Operation, DwarfError> {
    let code = cursor.read_u8().map_err(invalid)?;
    let mut operand1 = 0;
    let mut operand2 = 0;

    match shape_of(code).ok_or(DwarfErrorKind::InvalidExpr)? {
        Shape::None => {}
        Shape::Fixed(size) => operand1 = cursor.read_uint(size).map_err(invalid)?,
        Shape::Uleb => operand1 = cursor.read_uleb128().map_err(invalid)?,
        Shape::Sleb => operand1 = cursor.read_sleb128().map_err(invalid)? as u64,
        Shape::UlebSleb => {
            operand1 = cursor.read_uleb128().map_err(invalid)?;
            operand2 = cursor.read_sleb128().map_err(invalid)? as u64;
        }
        Shape::Addr => operand1 = cursor.read_uint(address_size as usize).map_err(invalid)?,
    }

    Ok(Operation {
        code,
        operand1,
        operand2,
    })
}

/// Parses an expression into operator records.
pub fn parse_expression(
    data: &[u8],
    endian: scroll::Endian,
    address_size: u8,
) -> Result<Vec<Operation>, DwarfError> {
    let count = count_operations(data, endian, address_size)?;
    let mut operations = Vec::with_capacity(count);

    let mut cursor = Cursor::new(data, endian);
    while !cursor.is_empty() {
        operations.push(parse_one(&mut cursor, address_size)?);
    }

    Ok(operations)
}

/// Parses a bare expression into a location description valid everywhere:
/// `lopc` zero, `hipc` all-ones for the pointer width.
pub fn parse_locdesc(
    data: &[u8],
    endian: scroll::Endian,
    address_size: u8,
) -> Result<Locdesc, DwarfError> {
    Ok(Locdesc {
        lopc: 0,
        hipc: max_address(address_size),
        operations: parse_expression(data, endian, address_size)?,
    })
}

/// The all-ones address for a pointer width, used both as the "valid
/// everywhere" upper bound and as the base-select marker in location
/// lists.
pub fn max_address(address_size: u8) -> u64 {
    if address_size == 4 {
        u64::from(u32::MAX)
    } else {
        u64::MAX
    }
}

/// Serializes operator records back into expression bytes.
///
/// The inverse of [`parse_expression`]; an operator with an undefined
/// opcode is rejected.
pub fn encode_expression(
    operations: &[Operation],
    buf: &mut Buffer,
    address_size: u8,
) -> Result<(), DwarfError> {
    for op in operations {
        buf.push_u8(op.code);
        match shape_of(op.code).ok_or(DwarfErrorKind::InvalidExpr)? {
            Shape::None => {}
            Shape::Fixed(size) => buf
                .push_uint(op.operand1, size)
                .map_err(invalid)?,
            Shape::Uleb => buf.push_uleb128(op.operand1),
            Shape::Sleb => buf.push_sleb128(op.operand1 as i64),
            Shape::UlebSleb => {
                buf.push_uleb128(op.operand1);
                buf.push_sleb128(op.operand2 as i64);
            }
            Shape::Addr => buf
                .push_uint(op.operand1, address_size as usize)
                .map_err(invalid)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use scroll::LE;

    #[test]
    fn test_parse_addr() {
        // DW_OP_addr 0x12345678 on a 64-bit unit.
        let data = [0x03, 0x78, 0x56, 0x34, 0x12, 0x00, 0x00, 0x00, 0x00];
        let ops = parse_expression(&data, LE, 8).unwrap();
        assert_eq!(
            ops,
            vec![Operation {
                code: DW_OP_addr,
                operand1: 0x1234_5678,
                operand2: 0,
            }]
        );
    }

    #[test]
    fn test_parse_fbreg_and_bregx() {
        let mut buf = Buffer::new(LE);
        buf.push_u8(DW_OP_fbreg);
        buf.push_sleb128(-16);
        buf.push_u8(DW_OP_bregx);
        buf.push_uleb128(31);
        buf.push_sleb128(-8);

        let data = buf.into_vec();
        let ops = parse_expression(&data, LE, 8).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].code, DW_OP_fbreg);
        assert_eq!(ops[0].operand1 as i64, -16);
        assert_eq!(ops[1].code, DW_OP_bregx);
        assert_eq!(ops[1].operand1, 31);
        assert_eq!(ops[1].operand2 as i64, -8);
    }

    #[test]
    fn test_count_matches_parse() {
        let mut buf = Buffer::new(LE);
        buf.push_u8(DW_OP_lit0 + 5);
        buf.push_u8(DW_OP_const2u);
        buf.push_u16(0x1234);
        buf.push_u8(DW_OP_plus);
        buf.push_u8(DW_OP_piece);
        buf.push_uleb128(4);

        let data = buf.into_vec();
        let count = count_operations(&data, LE, 4).unwrap();
        let ops = parse_expression(&data, LE, 4).unwrap();
        assert_eq!(ops.len(), count);
        assert_eq!(count, 4);
    }

    #[test]
    fn test_undefined_opcode() {
        let data = [0x02]; // reserved opcode
        let err = count_operations(&data, LE, 8).unwrap_err();
        assert_eq!(err.kind(), DwarfErrorKind::InvalidExpr);
        let err = parse_expression(&data, LE, 8).unwrap_err();
        assert_eq!(err.kind(), DwarfErrorKind::InvalidExpr);
    }

    #[test]
    fn test_truncated_operand() {
        let data = [DW_OP_const4u, 0x01, 0x02];
        let err = parse_expression(&data, LE, 8).unwrap_err();
        assert_eq!(err.kind(), DwarfErrorKind::InvalidExpr);
    }

    #[test]
    fn test_locdesc_covers_everything() {
        let desc = parse_locdesc(&[DW_OP_reg0 + 3], LE, 4).unwrap();
        assert_eq!(desc.lopc, 0);
        assert_eq!(desc.hipc, u64::from(u32::MAX));
        assert_eq!(desc.operations[0].code, DW_OP_reg0 + 3);
    }

    #[test]
    fn test_encode_round_trip() {
        let ops = vec![
            Operation {
                code: DW_OP_addr,
                operand1: 0xdead_beef,
                operand2: 0,
            },
            Operation {
                code: DW_OP_consts,
                operand1: (-42i64) as u64,
                operand2: 0,
            },
            Operation {
                code: DW_OP_bregx,
                operand1: 7,
                operand2: (-1i64) as u64,
            },
            Operation {
                code: DW_OP_nop,
                operand1: 0,
                operand2: 0,
            },
        ];

        let mut buf = Buffer::new(LE);
        encode_expression(&ops, &mut buf, 8).unwrap();
        let data = buf.into_vec();
        assert_eq!(parse_expression(&data, LE, 8).unwrap(), ops);
    }
}
