//! Producer → consumer round trips over every supported construct.

use scroll::LE;

use similar_asserts::assert_eq;

use ferrite_dwarf::constants::*;
use ferrite_dwarf::{
    AttrValue, DwarfContext, DwarfErrorKind, DwarfProducer, FileEntry, Format, LineProgram,
    LineProgramHeader, LineRow, Locdesc, LoclistEntry, MacroRecord, Operation, ProducerValue,
};

fn producer() -> DwarfProducer {
    DwarfProducer::new(LE, Format::Dwarf32, 2, 8).unwrap()
}

#[test]
fn test_die_tree_round_trip() {
    let mut producer = producer();
    let unit = producer.add_unit();

    let root = producer.add_die(unit, None, DW_TAG_compile_unit).unwrap();
    producer
        .add_attr(unit, root, DW_AT_name, ProducerValue::Str("main.c".into()))
        .unwrap();
    producer
        .add_attr(unit, root, DW_AT_low_pc, ProducerValue::Address(0x1000))
        .unwrap();
    producer
        .add_attr(unit, root, DW_AT_high_pc, ProducerValue::Address(0x2000))
        .unwrap();

    let int_type = producer.add_die(unit, Some(root), DW_TAG_base_type).unwrap();
    producer
        .add_attr(unit, int_type, DW_AT_name, ProducerValue::Str("int".into()))
        .unwrap();
    producer
        .add_attr(unit, int_type, DW_AT_byte_size, ProducerValue::Unsigned(4))
        .unwrap();

    let subprogram = producer.add_die(unit, Some(root), DW_TAG_subprogram).unwrap();
    producer
        .add_attr(unit, subprogram, DW_AT_name, ProducerValue::Str("main".into()))
        .unwrap();
    // Forward and backward references resolve by offset after emission.
    producer
        .add_attr(unit, subprogram, DW_AT_type, ProducerValue::Reference(int_type))
        .unwrap();

    let variable = producer.add_die(unit, Some(subprogram), DW_TAG_variable).unwrap();
    producer
        .add_attr(unit, variable, DW_AT_name, ProducerValue::Str("x".into()))
        .unwrap();
    producer
        .add_attr(
            unit,
            variable,
            DW_AT_location,
            ProducerValue::Location(vec![Operation {
                code: DW_OP_fbreg,
                operand1: (-16i64) as u64,
                operand2: 0,
            }]),
        )
        .unwrap();

    let sections = producer.emit().unwrap();
    let context = DwarfContext::from_sections(sections, LE).unwrap();

    assert_eq!(context.units().len(), 1);
    let unit = &context.units()[0];
    assert_eq!(unit.encoding.version, 2);
    assert_eq!(unit.encoding.address_size, 8);

    let root = unit.root().unwrap();
    assert_eq!(root.tag, DW_TAG_compile_unit);
    assert_eq!(root.level, 0);
    assert_eq!(
        root.attr(DW_AT_name),
        Some(&AttrValue::Str("main.c".into()))
    );
    assert_eq!(root.attr(DW_AT_low_pc), Some(&AttrValue::Address(0x1000)));

    let children: Vec<_> = unit.children(root).collect();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0].tag, DW_TAG_base_type);
    assert_eq!(children[1].tag, DW_TAG_subprogram);
    assert_eq!(children[1].level, 1);

    // The subprogram's type reference resolves to the base type DIE
    // through the unit's offset hash.
    let type_ref = match children[1].attr(DW_AT_type) {
        Some(AttrValue::Reference(offset)) => *offset,
        other => panic!("expected reference, got {other:?}"),
    };
    let resolved = unit.die_by_offset(type_ref).unwrap();
    assert_eq!(resolved.tag, DW_TAG_base_type);
    assert_eq!(resolved.attr(DW_AT_name), Some(&AttrValue::Str("int".into())));

    // The nested variable carries its parsed location expression.
    let grandchildren: Vec<_> = unit.children(children[1]).collect();
    assert_eq!(grandchildren.len(), 1);
    match grandchildren[0].attr(DW_AT_location) {
        Some(AttrValue::Location(desc)) => {
            assert_eq!(desc.lopc, 0);
            assert_eq!(desc.hipc, u64::MAX);
            assert_eq!(desc.operations[0].code, DW_OP_fbreg);
            assert_eq!(desc.operations[0].operand1 as i64, -16);
        }
        other => panic!("expected location, got {other:?}"),
    }

    // Preorder DIE offsets are monotonically increasing.
    let offsets: Vec<_> = unit.dies().iter().map(|die| die.offset).collect();
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_abbrev_shapes_are_shared() {
    let mut producer = producer();
    let unit = producer.add_unit();

    let root = producer.add_die(unit, None, DW_TAG_compile_unit).unwrap();
    for name in ["a", "b", "c"] {
        let die = producer.add_die(unit, Some(root), DW_TAG_variable).unwrap();
        producer
            .add_attr(unit, die, DW_AT_name, ProducerValue::Str(name.into()))
            .unwrap();
    }

    let sections = producer.emit().unwrap();
    let context = DwarfContext::from_sections(sections, LE).unwrap();

    // One code for the root, one shared by the three identical variables.
    let unit = &context.units()[0];
    assert_eq!(unit.abbrevs.abbrevs().len(), 2);
    assert!(unit.abbrevs.get(1).is_some());
    assert!(unit.abbrevs.get(2).is_some());
    assert!(unit.abbrevs.get(3).is_none());
}

#[test]
fn test_multiple_units() {
    let mut producer = producer();
    for name in ["one.c", "two.c"] {
        let unit = producer.add_unit();
        let root = producer.add_die(unit, None, DW_TAG_compile_unit).unwrap();
        producer
            .add_attr(unit, root, DW_AT_name, ProducerValue::Str(name.into()))
            .unwrap();
    }

    let sections = producer.emit().unwrap();
    let context = DwarfContext::from_sections(sections, LE).unwrap();

    assert_eq!(context.units().len(), 2);
    let names: Vec<_> = context
        .units()
        .iter()
        .map(|unit| unit.root().unwrap().attr(DW_AT_name).cloned())
        .collect();
    assert_eq!(
        names,
        vec![
            Some(AttrValue::Str("one.c".into())),
            Some(AttrValue::Str("two.c".into()))
        ]
    );
    assert_eq!(context.units()[1].offset, context.units()[0].end_offset());
}

#[test]
fn test_loclist_round_trip_and_idempotent_add() {
    let mut producer = producer();

    let first = producer.add_loclist(vec![
        LoclistEntry::Location(Locdesc {
            lopc: 0x10,
            hipc: 0x20,
            operations: vec![Operation {
                code: DW_OP_reg0 + 1,
                operand1: 0,
                operand2: 0,
            }],
        }),
        LoclistEntry::End,
    ]);
    let second = producer.add_loclist(vec![
        LoclistEntry::BaseSelect { base: 0x4000 },
        LoclistEntry::Location(Locdesc {
            lopc: 0x0,
            hipc: 0x8,
            operations: vec![Operation {
                code: DW_OP_breg0 + 5,
                operand1: (-8i64) as u64,
                operand2: 0,
            }],
        }),
        LoclistEntry::End,
    ]);

    let first_offset = producer.loclist_offset(first).unwrap();
    let second_offset = producer.loclist_offset(second).unwrap();
    assert_eq!(first_offset, 0);

    let unit = producer.add_unit();
    let root = producer.add_die(unit, None, DW_TAG_compile_unit).unwrap();
    producer
        .add_attr(
            unit,
            root,
            DW_AT_location,
            ProducerValue::LoclistPointer(second_offset),
        )
        .unwrap();

    let sections = producer.emit().unwrap();
    let mut context = DwarfContext::from_sections(sections, LE).unwrap();

    // The attribute surfaced as a loclist pointer.
    let unit = &context.units()[0];
    assert_eq!(
        unit.root().unwrap().attr(DW_AT_location),
        Some(&AttrValue::LoclistPointer(second_offset))
    );

    // Adding twice yields one cached entry with the same contents.
    let parsed = context.loclist_add(second_offset, 8).unwrap().clone();
    let again = context.loclist_add(second_offset, 8).unwrap().clone();
    assert_eq!(parsed, again);
    assert_eq!(parsed.entries.len(), 3);
    assert_eq!(parsed.entries[0], LoclistEntry::BaseSelect { base: 0x4000 });
    assert_eq!(*context.loclist_find(second_offset).unwrap(), parsed);

    assert_eq!(
        context.loclist_find(first_offset).unwrap_err().kind(),
        DwarfErrorKind::NoEntry
    );
}

#[test]
fn test_macro_round_trip() {
    let mut producer = producer();
    producer.add_macro(MacroRecord::StartFile { line: 0, file: 1 });
    producer.add_macro(MacroRecord::Define {
        line: 2,
        text: "PI 3".into(),
    });
    producer.add_macro(MacroRecord::EndFile);

    let unit = producer.add_unit();
    producer.add_die(unit, None, DW_TAG_compile_unit).unwrap();

    let sections = producer.emit().unwrap();
    let mut context = DwarfContext::from_sections(sections, LE).unwrap();

    let sets = context.macro_sets().unwrap();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].records.len(), 3);
    assert_eq!(
        sets[0].records[1],
        MacroRecord::Define {
            line: 2,
            text: "PI 3".into()
        }
    );
}

#[test]
fn test_line_program_round_trip_through_context() {
    let mut producer = producer();

    let unit = producer.add_unit();
    let root = producer.add_die(unit, None, DW_TAG_compile_unit).unwrap();
    producer
        .add_attr(unit, root, DW_AT_stmt_list, ProducerValue::Unsigned(0))
        .unwrap();

    let rows = vec![
        LineRow {
            address: 0x400000,
            file: 1,
            line: 1,
            column: 0,
            is_stmt: true,
            end_sequence: false,
        },
        LineRow {
            address: 0x400010,
            file: 1,
            line: 3,
            column: 8,
            is_stmt: false,
            end_sequence: false,
        },
        LineRow {
            address: 0x400020,
            file: 1,
            line: 3,
            column: 8,
            is_stmt: false,
            end_sequence: true,
        },
    ];
    producer.set_line_program(LineProgram {
        header: LineProgramHeader::new(vec![FileEntry {
            name: "main.c".into(),
            ..FileEntry::default()
        }]),
        rows: rows.clone(),
    });

    let sections = producer.emit().unwrap();
    let mut context = DwarfContext::from_sections(sections, LE).unwrap();

    let program = context.line_program(0).unwrap();
    assert_eq!(program.rows, rows);
    assert_eq!(program.header.file_names[0].name, "main.c");
}

#[test]
fn test_unit_error_does_not_infect_others() {
    let mut producer = producer();
    for _ in 0..2 {
        let unit = producer.add_unit();
        producer.add_die(unit, None, DW_TAG_compile_unit).unwrap();
    }

    let mut sections = producer.emit().unwrap();

    // Corrupt the first unit's version field; its boundary stays intact.
    if let Some(ref mut info) = sections.info {
        info[4] = 0xee;
    }

    let context = DwarfContext::from_sections(sections, LE).unwrap();
    assert_eq!(context.units().len(), 1);
    assert_eq!(context.unit_errors.len(), 1);
    assert_eq!(context.unit_errors[0].offset, 0);
}
