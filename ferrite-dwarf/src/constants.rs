//! DWARF constants for the 2–4 era handled by this crate.
//!
//! Values are plain integers rather than newtypes; they travel through
//! abbreviation tables and attribute lists where the numeric identity is
//! the point. Only the constants the toolchain actually interprets are
//! listed; unknown tags and attributes pass through untouched.

#![allow(missing_docs)]

// Tags.
pub const DW_TAG_array_type: u64 = 0x01;
pub const DW_TAG_class_type: u64 = 0x02;
pub const DW_TAG_enumeration_type: u64 = 0x04;
pub const DW_TAG_formal_parameter: u64 = 0x05;
pub const DW_TAG_lexical_block: u64 = 0x0b;
pub const DW_TAG_member: u64 = 0x0d;
pub const DW_TAG_pointer_type: u64 = 0x0f;
pub const DW_TAG_compile_unit: u64 = 0x11;
pub const DW_TAG_structure_type: u64 = 0x13;
pub const DW_TAG_subroutine_type: u64 = 0x15;
pub const DW_TAG_typedef: u64 = 0x16;
pub const DW_TAG_union_type: u64 = 0x17;
pub const DW_TAG_inheritance: u64 = 0x1c;
pub const DW_TAG_subrange_type: u64 = 0x21;
pub const DW_TAG_base_type: u64 = 0x24;
pub const DW_TAG_const_type: u64 = 0x26;
pub const DW_TAG_enumerator: u64 = 0x28;
pub const DW_TAG_subprogram: u64 = 0x2e;
pub const DW_TAG_variable: u64 = 0x34;
pub const DW_TAG_volatile_type: u64 = 0x35;
pub const DW_TAG_namespace: u64 = 0x39;

// Child determination bytes in abbreviation declarations.
pub const DW_CHILDREN_no: u8 = 0x00;
pub const DW_CHILDREN_yes: u8 = 0x01;

// Attributes.
pub const DW_AT_sibling: u64 = 0x01;
pub const DW_AT_location: u64 = 0x02;
pub const DW_AT_name: u64 = 0x03;
pub const DW_AT_byte_size: u64 = 0x0b;
pub const DW_AT_bit_offset: u64 = 0x0c;
pub const DW_AT_bit_size: u64 = 0x0d;
pub const DW_AT_stmt_list: u64 = 0x10;
pub const DW_AT_low_pc: u64 = 0x11;
pub const DW_AT_high_pc: u64 = 0x12;
pub const DW_AT_language: u64 = 0x13;
pub const DW_AT_string_length: u64 = 0x19;
pub const DW_AT_comp_dir: u64 = 0x1b;
pub const DW_AT_const_value: u64 = 0x1c;
pub const DW_AT_upper_bound: u64 = 0x2f;
pub const DW_AT_producer: u64 = 0x25;
pub const DW_AT_return_addr: u64 = 0x2a;
pub const DW_AT_data_member_location: u64 = 0x38;
pub const DW_AT_decl_file: u64 = 0x3a;
pub const DW_AT_decl_line: u64 = 0x3b;
pub const DW_AT_declaration: u64 = 0x3c;
pub const DW_AT_encoding: u64 = 0x3e;
pub const DW_AT_external: u64 = 0x3f;
pub const DW_AT_frame_base: u64 = 0x40;
pub const DW_AT_macro_info: u64 = 0x43;
pub const DW_AT_segment: u64 = 0x46;
pub const DW_AT_static_link: u64 = 0x48;
pub const DW_AT_type: u64 = 0x49;
pub const DW_AT_use_location: u64 = 0x4a;
pub const DW_AT_vtable_elem_location: u64 = 0x4d;

/// Attributes whose value is a location: a block holds an expression, a
/// constant holds a `.debug_loc` offset.
pub fn is_location_attribute(attr: u64) -> bool {
    matches!(
        attr,
        DW_AT_location
            | DW_AT_string_length
            | DW_AT_return_addr
            | DW_AT_data_member_location
            | DW_AT_frame_base
            | DW_AT_segment
            | DW_AT_static_link
            | DW_AT_use_location
            | DW_AT_vtable_elem_location
    )
}

// Forms.
pub const DW_FORM_addr: u64 = 0x01;
pub const DW_FORM_block2: u64 = 0x03;
pub const DW_FORM_block4: u64 = 0x04;
pub const DW_FORM_data2: u64 = 0x05;
pub const DW_FORM_data4: u64 = 0x06;
pub const DW_FORM_data8: u64 = 0x07;
pub const DW_FORM_string: u64 = 0x08;
pub const DW_FORM_block: u64 = 0x09;
pub const DW_FORM_block1: u64 = 0x0a;
pub const DW_FORM_data1: u64 = 0x0b;
pub const DW_FORM_flag: u64 = 0x0c;
pub const DW_FORM_sdata: u64 = 0x0d;
pub const DW_FORM_strp: u64 = 0x0e;
pub const DW_FORM_udata: u64 = 0x0f;
pub const DW_FORM_ref_addr: u64 = 0x10;
pub const DW_FORM_ref1: u64 = 0x11;
pub const DW_FORM_ref2: u64 = 0x12;
pub const DW_FORM_ref4: u64 = 0x13;
pub const DW_FORM_ref8: u64 = 0x14;
pub const DW_FORM_ref_udata: u64 = 0x15;
pub const DW_FORM_indirect: u64 = 0x16;
pub const DW_FORM_sec_offset: u64 = 0x17;
pub const DW_FORM_exprloc: u64 = 0x18;
pub const DW_FORM_flag_present: u64 = 0x19;

// Expression operators.
pub const DW_OP_addr: u8 = 0x03;
pub const DW_OP_deref: u8 = 0x06;
pub const DW_OP_const1u: u8 = 0x08;
pub const DW_OP_const1s: u8 = 0x09;
pub const DW_OP_const2u: u8 = 0x0a;
pub const DW_OP_const2s: u8 = 0x0b;
pub const DW_OP_const4u: u8 = 0x0c;
pub const DW_OP_const4s: u8 = 0x0d;
pub const DW_OP_const8u: u8 = 0x0e;
pub const DW_OP_const8s: u8 = 0x0f;
pub const DW_OP_constu: u8 = 0x10;
pub const DW_OP_consts: u8 = 0x11;
pub const DW_OP_dup: u8 = 0x12;
pub const DW_OP_drop: u8 = 0x13;
pub const DW_OP_over: u8 = 0x14;
pub const DW_OP_pick: u8 = 0x15;
pub const DW_OP_swap: u8 = 0x16;
pub const DW_OP_rot: u8 = 0x17;
pub const DW_OP_xderef: u8 = 0x18;
pub const DW_OP_abs: u8 = 0x19;
pub const DW_OP_and: u8 = 0x1a;
pub const DW_OP_div: u8 = 0x1b;
pub const DW_OP_minus: u8 = 0x1c;
pub const DW_OP_mod: u8 = 0x1d;
pub const DW_OP_mul: u8 = 0x1e;
pub const DW_OP_neg: u8 = 0x1f;
pub const DW_OP_not: u8 = 0x20;
pub const DW_OP_or: u8 = 0x21;
pub const DW_OP_plus: u8 = 0x22;
pub const DW_OP_plus_uconst: u8 = 0x23;
pub const DW_OP_shl: u8 = 0x24;
pub const DW_OP_shr: u8 = 0x25;
pub const DW_OP_shra: u8 = 0x26;
pub const DW_OP_xor: u8 = 0x27;
pub const DW_OP_bra: u8 = 0x28;
pub const DW_OP_eq: u8 = 0x29;
pub const DW_OP_ge: u8 = 0x2a;
pub const DW_OP_gt: u8 = 0x2b;
pub const DW_OP_le: u8 = 0x2c;
pub const DW_OP_lt: u8 = 0x2d;
pub const DW_OP_ne: u8 = 0x2e;
pub const DW_OP_skip: u8 = 0x2f;
pub const DW_OP_lit0: u8 = 0x30;
pub const DW_OP_lit31: u8 = 0x4f;
pub const DW_OP_reg0: u8 = 0x50;
pub const DW_OP_reg31: u8 = 0x6f;
pub const DW_OP_breg0: u8 = 0x70;
pub const DW_OP_breg31: u8 = 0x8f;
pub const DW_OP_regx: u8 = 0x90;
pub const DW_OP_fbreg: u8 = 0x91;
pub const DW_OP_bregx: u8 = 0x92;
pub const DW_OP_piece: u8 = 0x93;
pub const DW_OP_deref_size: u8 = 0x94;
pub const DW_OP_xderef_size: u8 = 0x95;
pub const DW_OP_nop: u8 = 0x96;

// Line number program: standard opcodes.
pub const DW_LNS_copy: u8 = 0x01;
pub const DW_LNS_advance_pc: u8 = 0x02;
pub const DW_LNS_advance_line: u8 = 0x03;
pub const DW_LNS_set_file: u8 = 0x04;
pub const DW_LNS_set_column: u8 = 0x05;
pub const DW_LNS_negate_stmt: u8 = 0x06;
pub const DW_LNS_set_basic_block: u8 = 0x07;
pub const DW_LNS_const_add_pc: u8 = 0x08;
pub const DW_LNS_fixed_advance_pc: u8 = 0x09;
pub const DW_LNS_set_prologue_end: u8 = 0x0a;
pub const DW_LNS_set_epilogue_begin: u8 = 0x0b;
pub const DW_LNS_set_isa: u8 = 0x0c;

// Line number program: extended opcodes.
pub const DW_LNE_end_sequence: u8 = 0x01;
pub const DW_LNE_set_address: u8 = 0x02;
pub const DW_LNE_define_file: u8 = 0x03;
pub const DW_LNE_set_discriminator: u8 = 0x04;

// Macro information entry types.
pub const DW_MACINFO_define: u8 = 0x01;
pub const DW_MACINFO_undef: u8 = 0x02;
pub const DW_MACINFO_start_file: u8 = 0x03;
pub const DW_MACINFO_end_file: u8 = 0x04;
pub const DW_MACINFO_vendor_ext: u8 = 0xff;
