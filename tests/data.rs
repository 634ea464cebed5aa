//! Data declarations: the db family, DUP, strings, floats, and incbin.

use std::borrow::Cow;

use pretty_assertions::assert_eq;

use mingus::diag::{DiagKind, Severity, WarnClass};
use mingus::x86::{ExtopKind, Opcode};
use mingus::{Context, Pass, Session};

fn number(offset: i64) -> ExtopKind<'static> {
    ExtopKind::Number {
        offset,
        segment: None,
        wrt: None,
        relative: false,
    }
}

#[test]
fn byte_list() {
    let mut s = Session::new();
    let insn = s.parse_line("db 1, 2, 3");

    assert_eq!(insn.opcode, Some(Opcode::Db));
    assert_eq!(insn.operands, 3);
    assert_eq!(insn.eops.len(), 3);
    for (i, eop) in insn.eops.iter().enumerate() {
        assert_eq!(eop.elem, 1);
        assert_eq!(eop.dup, 1);
        assert_eq!(eop.kind, number(i as i64 + 1));
    }
    assert!(s.diag.is_empty());
}

#[test]
fn string_reserve_and_undersized_float() {
    let mut s = Session::new();
    let insn = s.parse_line("times 4 db \"ab\", ?, 1.5");

    assert_eq!(insn.opcode, Some(Opcode::Db));
    assert_eq!(insn.times, 4);
    // the float has no 8-bit format: diagnosed, and its element vanishes
    assert_eq!(insn.operands, 3);
    assert_eq!(insn.eops.len(), 2);
    assert_eq!(
        insn.eops[0].kind,
        ExtopKind::String {
            data: Cow::Borrowed(b"ab")
        }
    );
    assert_eq!(insn.eops[1].kind, ExtopKind::Reserve);
    assert_eq!(insn.eops[1].dup, 1);
    assert!(s.diag.contains(&DiagKind::NoFloatFormat(8)));
}

#[test]
fn float_literals_by_element_size() {
    let mut s = Session::new();
    let insn = s.parse_line("dd 1.5");
    assert_eq!(
        insn.eops[0].kind,
        ExtopKind::Float {
            bytes: vec![0x00, 0x00, 0xC0, 0x3F]
        }
    );

    let insn = s.parse_line("dq -2.5");
    assert_eq!(
        insn.eops[0].kind,
        ExtopKind::Float {
            bytes: (-2.5f64).to_bits().to_le_bytes().to_vec()
        }
    );

    let insn = s.parse_line("dw 1.0");
    assert_eq!(
        insn.eops[0].kind,
        ExtopKind::Float {
            bytes: vec![0x00, 0x3C]
        }
    );
}

#[test]
fn signed_floats_need_the_lookahead() {
    let mut s = Session::new();
    let insn = s.parse_line("dd -1.5, +0.5");
    assert_eq!(insn.eops.len(), 2);
    assert_eq!(
        insn.eops[0].kind,
        ExtopKind::Float {
            bytes: vec![0x00, 0x00, 0xC0, 0xBF]
        }
    );
    assert_eq!(
        insn.eops[1].kind,
        ExtopKind::Float {
            bytes: vec![0x00, 0x00, 0x00, 0x3F]
        }
    );

    // minus followed by a number is ordinary arithmetic
    let insn = s.parse_line("db -1");
    assert_eq!(insn.eops[0].kind, number(-1));
}

#[test]
fn extended_float() {
    let mut s = Session::new();
    let insn = s.parse_line("dt 1.0");
    match &insn.eops[0].kind {
        ExtopKind::Float { bytes } => {
            assert_eq!(bytes.len(), 10);
            assert_eq!(&bytes[..8], &[0, 0, 0, 0, 0, 0, 0, 0x80]);
        }
        other => panic!("expected a float element, got {other:?}"),
    }
}

#[test]
fn strings_in_expressions_are_numbers() {
    let mut s = Session::new();
    let insn = s.parse_line("dd 'ab'+1");
    assert_eq!(insn.eops[0].kind, number(0x6262));
}

#[test]
fn dup_replication() {
    let mut s = Session::new();
    let insn = s.parse_line("db 3 dup (0)");
    assert_eq!(insn.eops.len(), 1);
    assert_eq!(insn.eops[0].dup, 3);
    assert_eq!(insn.eops[0].elem, 1);
    assert_eq!(insn.eops[0].kind, number(0));
    assert!(s.diag.is_empty());
}

#[test]
fn dup_of_a_list_becomes_a_group() {
    let mut s = Session::new();
    let insn = s.parse_line("db 2 dup (1, 2)");
    assert_eq!(insn.eops.len(), 1);
    assert_eq!(insn.eops[0].dup, 2);
    match &insn.eops[0].kind {
        ExtopKind::Group { items } => {
            assert_eq!(items.len(), 2);
            assert_eq!(items[0].kind, number(1));
            assert_eq!(items[1].kind, number(2));
        }
        other => panic!("expected a group, got {other:?}"),
    }
}

#[test]
fn nested_dup_multiplies() {
    let mut s = Session::new();
    let insn = s.parse_line("db 2 dup (3 dup (7))");
    assert_eq!(insn.eops.len(), 1);
    // the inner single-element list flattens through both layers
    assert_eq!(insn.eops[0].dup, 6);
    assert_eq!(insn.eops[0].kind, number(7));
}

#[test]
fn non_constant_dup_fails() {
    let mut s = Session::new();
    let insn = s.parse_line("db eax dup (0)");
    assert_eq!(insn.opcode, None);
    assert!(s.diag.contains(&DiagKind::DupNotConstant));
}

#[test]
fn negative_dup_fails() {
    let mut s = Session::new();
    let insn = s.parse_line("db -1 dup (0)");
    assert_eq!(insn.opcode, None);
    assert!(s.diag.contains(&DiagKind::DupNegative));
}

#[test]
fn zero_dup_elides_the_element() {
    let mut s = Session::new();
    let insn = s.parse_line("db 0 dup (5), 9");
    assert_eq!(insn.eops.len(), 1);
    assert_eq!(insn.eops[0].kind, number(9));
    // both items were still parsed
    assert_eq!(insn.operands, 2);
}

#[test]
fn percent_group() {
    let mut s = Session::new();
    let insn = s.parse_line("db %(1, 2)");
    assert_eq!(insn.eops.len(), 1);
    assert!(matches!(insn.eops[0].kind, ExtopKind::Group { .. }));
}

#[test]
fn element_size_override() {
    let mut s = Session::new();
    let insn = s.parse_line("db dword (0x11223344)");
    assert_eq!(insn.eops.len(), 1);
    assert_eq!(insn.eops[0].elem, 4);
    assert_eq!(insn.eops[0].kind, number(0x11223344));
}

#[test]
fn reservations_coalesce() {
    let mut s = Session::new();
    let insn = s.parse_line("dw ?, ?, ?");
    assert_eq!(insn.operands, 3);
    assert_eq!(insn.eops.len(), 1);
    assert_eq!(insn.eops[0].kind, ExtopKind::Reserve);
    assert_eq!(insn.eops[0].dup, 3);
    assert_eq!(insn.eops[0].elem, 2);
}

#[test]
fn string_transform_functions() {
    let mut s = Session::new();
    let insn = s.parse_line("db __utf16__('ab')");
    assert_eq!(
        insn.eops[0].kind,
        ExtopKind::String {
            data: Cow::Owned(vec![0x61, 0x00, 0x62, 0x00])
        }
    );

    let insn = s.parse_line("db __utf32be__ 'a'");
    assert_eq!(
        insn.eops[0].kind,
        ExtopKind::String {
            data: Cow::Owned(vec![0, 0, 0, 0x61])
        }
    );
}

#[test]
fn string_transform_needs_a_string() {
    let mut s = Session::new();
    let insn = s.parse_line("db __utf16__(123)");
    assert_eq!(insn.opcode, Some(Opcode::Db));
    assert!(insn.eops.is_empty());
    assert!(s.diag.contains(&DiagKind::StrFuncNeedsString(
        "__utf16__".into(),
        "`123'".into()
    )));
}

#[test]
fn empty_db_warns() {
    let mut s = Session::new();
    let insn = s.parse_line("db");
    assert_eq!(insn.operands, 0);
    assert!(s
        .diag
        .iter()
        .any(|d| d.severity == Severity::Warning(WarnClass::DbEmpty)));
}

#[test]
fn trailing_comma_is_an_error() {
    let mut s = Session::new();
    let insn = s.parse_line("db 1,");
    assert_eq!(insn.opcode, None);
    assert!(s
        .diag
        .iter()
        .any(|d| matches!(d.kind, DiagKind::CommaExpected(_))));
}

#[test]
fn relocatable_data() {
    let mut s = Session::new();
    let seg = s.symtab.declare_segment(".text");
    s.symtab.define_label("entry", Some(seg), 0x80, true);
    let insn = s.parse_line("dd entry+8");
    assert_eq!(
        insn.eops[0].kind,
        ExtopKind::Number {
            offset: 0x88,
            segment: Some(seg),
            wrt: None,
            relative: false
        }
    );
}

#[test]
fn registers_do_not_belong_in_data() {
    let mut s = Session::new();
    let insn = s.parse_line("db eax");
    assert!(s.diag.contains(&DiagKind::NotRelocatable));
    // diagnosed but the line survives
    assert_eq!(insn.opcode, Some(Opcode::Db));
}

#[test]
fn incbin_accepts_up_to_three_params() {
    let mut s = Session::new();
    let insn = s.parse_line("incbin \"blob.bin\"");
    assert_eq!(insn.opcode, Some(Opcode::Incbin));
    assert_eq!(insn.eops.len(), 1);

    let insn = s.parse_line("incbin \"blob.bin\", 0x10");
    assert_eq!(insn.opcode, Some(Opcode::Incbin));

    let insn = s.parse_line("incbin \"blob.bin\", 0x10, 0x20");
    assert_eq!(insn.opcode, Some(Opcode::Incbin));
    assert_eq!(insn.eops.len(), 3);
}

#[test]
fn incbin_shape_violations() {
    let mut s = Session::new();
    let insn = s.parse_line("incbin 5");
    assert_eq!(insn.opcode, None);
    assert!(s.diag.contains(&DiagKind::IncbinNeedsFile));

    s.diag.clear();
    let insn = s.parse_line("incbin \"f\", ?");
    assert_eq!(insn.opcode, None);
    assert!(s.diag.contains(&DiagKind::IncbinSecondNonNumeric));

    s.diag.clear();
    let insn = s.parse_line("incbin \"f\", 1, 2, 3");
    assert_eq!(insn.opcode, None);
    assert!(s.diag.contains(&DiagKind::IncbinTooManyParams));
}

#[test]
fn incbin_evaluates_critically_even_on_pass_one() {
    let mut s = Session::new();
    assert_eq!(s.ctx.pass, Pass::First);
    let insn = s.parse_line("incbin \"f\", later_symbol");
    assert_eq!(insn.opcode, None);
    assert!(s
        .diag
        .contains(&DiagKind::SymbolNotDefined("later_symbol".into())));

    // an ordinary data declaration is happy to wait
    s.diag.clear();
    let insn = s.parse_line("dd later_symbol");
    assert_eq!(insn.opcode, Some(Opcode::Dd));
    assert!(s.diag.is_empty());
}

#[test]
fn word_sized_elements() {
    let mut ctx = Context::default();
    ctx.bits = 32;
    let mut s = Session::with_context(ctx);
    let insn = s.parse_line("dw 0xFFFF, 'a'");
    assert_eq!(insn.eops.len(), 2);
    assert_eq!(insn.eops[0].elem, 2);
    assert_eq!(insn.eops[0].kind, number(0xFFFF));
    // a lone quoted character is a string element, not a number
    assert_eq!(
        insn.eops[1].kind,
        ExtopKind::String {
            data: Cow::Borrowed(b"a")
        }
    );
}
