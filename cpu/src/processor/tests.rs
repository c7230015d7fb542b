use base::charset::string_to_bic;
use base::prelude::*;

use super::super::central::{CentralControl, ControlRequest};
use super::super::interrupt::{Interrupt, I_ADDRESS, I_STACK_OVERFLOW};
use super::super::memory::{AccessRequest, MemoryConfiguration};
use super::super::types::{IoUnitId, ProcessorId, Requestor};
use super::control_word::{Icw, Ircw, LoopControl};
use super::*;

const PROGRAM: u16 = 0o2000;
const SOURCE: u16 = 0o3000;
const DEST: u16 = 0o3100;
const LOOP_STACK: u16 = 0o4000;

fn make_cc() -> CentralControl {
    CentralControl::new(&MemoryConfiguration::default(), 1, true)
}

fn poke(cc: &mut CentralControl, addr: u16, w: Word) {
    let mut req =
        AccessRequest::new(Requestor::Processor(ProcessorId::P1), addr, false).with_word(w);
    cc.store(&mut req);
    assert!(!req.failed());
}

fn peek(cc: &mut CentralControl, addr: u16) -> Word {
    let mut req = AccessRequest::new(Requestor::Processor(ProcessorId::P1), addr, false);
    cc.fetch(&mut req);
    req.outcome().expect("test memory should be readable")
}

/// Packs syllables four to a word, starting at `addr`.
fn program(cc: &mut CentralControl, addr: u16, syllables: &[u16]) {
    for (i, chunk) in syllables.chunks(4).enumerate() {
        let mut w: Word = 0;
        for j in 0..4 {
            w = (w << 12) | Word::from(chunk.get(j).copied().unwrap_or(0o0055));
        }
        poke(cc, addr + i as u16, w);
    }
}

/// Packs up to eight characters into a word, padding with blanks.
fn chars(s: &str) -> Word {
    let mut codes = string_to_bic(s);
    codes.resize(8, 0o60);
    codes.iter().fold(0, |w, c| (w << 6) | Word::from(*c))
}

/// A processor about to execute the syllables at `PROGRAM`.
fn processor_at(id: ProcessorId, normal: bool) -> Processor {
    let mut p = Processor::new(id);
    p.start_at(PROGRAM);
    p.regs.ncsf = normal;
    p
}

/// A P1 in character mode with the source and destination strings
/// set up.
fn char_mode(cc: &mut CentralControl, source: &str, dest: &str) -> Processor {
    poke(cc, SOURCE, chars(source));
    poke(cc, DEST, chars(dest));
    let mut p = processor_at(ProcessorId::P1, false);
    p.regs.cwmf = true;
    p.regs.s = SOURCE;
    p.regs.m = DEST;
    p.regs.x = LoopControl {
        s: LOOP_STACK,
        ..LoopControl::default()
    }
    .encode();
    p
}

fn char_op(op: u16, n: u16) -> u16 {
    (n << 6) | op
}

fn run_until_word_mode(p: &mut Processor, cc: &mut CentralControl) {
    for _ in 0..100 {
        if !p.regs.cwmf {
            return;
        }
        p.step(cc);
    }
    panic!("processor never left character mode");
}

#[test]
fn test_literal_calls_push() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[5 << 2, 7 << 2]);
    let mut p = processor_at(ProcessorId::P1, false);
    p.step(&mut cc);
    assert!(p.regs.arof);
    assert_eq!(p.regs.a, 5);
    p.step(&mut cc);
    assert_eq!(p.regs.a, 7);
    assert!(p.regs.brof);
    assert_eq!(p.regs.b, 5);
    assert_eq!(p.regs.l, 2);
}

#[test]
fn test_operand_and_descriptor_calls() {
    let mut cc = make_cc();
    let r: u16 = 0o40;
    poke(&mut cc, r * 64 + 0o25, 0o12345);
    program(&mut cc, PROGRAM, &[(0o25 << 2) | 2, (0o3 << 2) | 3]);
    let mut p = processor_at(ProcessorId::P1, true);
    p.regs.r = r;
    p.regs.s = 0o5000;
    p.step(&mut cc);
    assert_eq!(p.regs.a, 0o12345);
    p.step(&mut cc);
    assert_eq!(p.regs.a, FLAG_BIT | PRESENCE_BIT | Word::from(r * 64 + 3));
    assert_eq!(p.regs.b, 0o12345);
}

#[test]
fn test_stack_overflow_leaves_registers_alone() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[1 << 2]);
    let mut p = processor_at(ProcessorId::P1, true);
    p.regs.r = 1;
    p.regs.s = 0o77;
    p.regs.a = 11;
    p.regs.arof = true;
    p.regs.b = 22;
    p.regs.brof = true;
    p.step(&mut cc);
    assert_eq!((p.regs.a, p.regs.b, p.regs.s), (11, 22, 0o77));
    assert!(p.regs.arof && p.regs.brof);
    assert_ne!(cc.processor_interrupt(ProcessorId::P1) & I_STACK_OVERFLOW, 0);
    assert_eq!(cc.current_interrupt(), Some(Interrupt::P1StackOverflow));
}

fn busy_registers() -> Registers {
    Registers {
        a: 0o1111,
        arof: true,
        b: 0o2222,
        brof: true,
        c: PROGRAM + 3,
        l: 2,
        s: 0o5000,
        f: 0o4770,
        r: 0o20,
        m: 0o6000,
        n: 9,
        g: 3,
        h: 4,
        k: 5,
        v: 1,
        ncsf: true,
        msff: true,
        salf: true,
        varf: true,
        ..Registers::default()
    }
}

#[test]
fn test_store_for_interrupt_then_initiate_restores_word_mode_state() {
    let mut cc = make_cc();
    let mut p = Processor::new(ProcessorId::P1);
    let original = busy_registers();
    p.regs = original.clone();
    p.store_for_interrupt(&mut cc, false);
    assert!(!p.regs.ncsf);
    assert!(!p.regs.arof && !p.regs.brof && !p.regs.msff && !p.regs.salf);
    // B, A, ICW and IRCW.
    assert_eq!(p.regs.s, 0o5004);
    let incw = peek(&mut cc, 0o20 * 64 + 8);
    assert_eq!(incw & CONTROL_WORD, CONTROL_WORD);
    assert_eq!(address_of(incw), 0o5004);
    p.initiate(&mut cc, incw, false);
    assert_eq!(p.regs, original);
}

#[test]
fn test_store_for_interrupt_skips_empty_registers() {
    let mut cc = make_cc();
    let mut p = Processor::new(ProcessorId::P1);
    let original = Registers {
        arof: false,
        brof: false,
        ..busy_registers()
    };
    p.regs = original.clone();
    p.store_for_interrupt(&mut cc, false);
    assert_eq!(p.regs.s, 0o5002);
    let incw = peek(&mut cc, 0o20 * 64 + 8);
    p.initiate(&mut cc, incw, false);
    assert_eq!(p.regs, original);
}

#[test]
fn test_store_for_test_saves_maintenance_registers() {
    let mut cc = make_cc();
    let mut p = Processor::new(ProcessorId::P1);
    let original = Registers {
        arof: false,
        y: 0o12,
        z: 0o34,
        q: 0o567,
        ..busy_registers()
    };
    p.regs = original.clone();
    p.store_for_interrupt(&mut cc, true);
    // A and B are always saved, plus the maintenance word.
    assert_eq!(p.regs.s, 0o5005);
    p.regs.y = 0;
    p.regs.z = 0;
    p.regs.q = 0;
    let incw = peek(&mut cc, 0o20 * 64 + 8);
    p.initiate(&mut cc, incw, true);
    assert_eq!(p.regs, original);
}

#[test]
fn test_store_for_interrupt_in_character_mode() {
    let mut cc = make_cc();
    let mut p = Processor::new(ProcessorId::P1);
    let original = Registers {
        cwmf: true,
        s: SOURCE,
        x: LoopControl {
            c: PROGRAM,
            l: 1,
            s: LOOP_STACK,
            repeat: 7,
        }
        .encode(),
        tally: 0o33,
        tfff: true,
        ..busy_registers()
    };
    p.regs = original.clone();
    p.store_for_interrupt(&mut cc, false);
    // The stack was in X; A, B, ILCW, ICW and IRCW were pushed there.
    assert_eq!(p.regs.s, LOOP_STACK + 5);
    assert!(!p.regs.cwmf);
    let incw = peek(&mut cc, 0o20 * 64 + 8);
    assert_ne!(incw & (1 << 15), 0);
    p.initiate(&mut cc, incw, false);
    assert_eq!(p.regs, original);
}

#[test]
fn test_pending_interrupt_diverts_normal_state() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[1 << 2]);
    let mut p = processor_at(ProcessorId::P1, true);
    p.regs.r = 0o20;
    p.regs.s = 0o5000;
    cc.set_interrupt(Interrupt::TimeInterval);
    p.step(&mut cc);
    assert!(!p.regs.ncsf);
    assert_eq!(p.regs.c, Interrupt::TimeInterval.vector());
    assert_eq!(p.regs.l, 0);
    assert_eq!(p.regs.s, 0o100);
    assert_eq!(cc.interrupt_address(), 0);
    // The return point is the syllable which was not executed.
    let incw = peek(&mut cc, 0o20 * 64 + 8);
    let ircw = peek(&mut cc, address_of(incw));
    assert_eq!(address_of(ircw), PROGRAM);
}

#[test]
fn test_character_mode_takes_interrupt_at_syllable_boundary() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[char_op(0o76, 1); 4]);
    let mut p = char_mode(&mut cc, "ABCDEFGH", "");
    p.regs.ncsf = true;
    p.regs.r = 0o20;
    p.step(&mut cc);
    assert_eq!((p.regs.k, p.regs.g), (1, 1));

    cc.set_interrupt(Interrupt::TimeInterval);
    p.step(&mut cc);
    assert!(!p.regs.cwmf);
    assert!(!p.regs.ncsf);
    assert_eq!(p.regs.c, Interrupt::TimeInterval.vector());
    assert_eq!(p.regs.l, 0);
    assert_eq!(p.regs.s, 0o100);
    assert_eq!(cc.interrupt_address(), 0);

    // A, B, ILCW, ICW and IRCW went onto the stack held in X.
    let incw = peek(&mut cc, 0o20 * 64 + 8);
    assert_ne!(incw & (1 << 15), 0);
    assert_eq!(address_of(incw), LOOP_STACK + 5);
    let ircw = Ircw::decode(peek(&mut cc, LOOP_STACK + 5));
    assert_eq!((ircw.c, ircw.l, ircw.k, ircw.g), (PROGRAM, 1, 1, 1));
    let icw = Icw::decode(peek(&mut cc, LOOP_STACK + 4));
    assert_eq!((icw.m, icw.r), (DEST, 0o20));

    // Initiate resumes with the syllable that was not executed.
    p.initiate(&mut cc, incw, false);
    assert!(p.regs.cwmf && p.regs.ncsf);
    p.step(&mut cc);
    assert_eq!((p.regs.k, p.regs.g), (2, 2));
    assert_eq!(char_at(p.regs.b, 1), string_to_bic("B")[0]);
}

#[test]
fn test_control_state_ignores_interrupts() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[1 << 2]);
    let mut p = processor_at(ProcessorId::P1, false);
    cc.set_interrupt(Interrupt::TimeInterval);
    p.step(&mut cc);
    assert_eq!(p.regs.a, 1);
    assert_eq!(cc.current_interrupt(), Some(Interrupt::TimeInterval));
}

#[test]
fn test_p1_control_state_memory_error_halts() {
    let mut cc = CentralControl::new(&MemoryConfiguration::contiguous(1), 1, false);
    let mut p = Processor::new(ProcessorId::P1);
    p.start_at(0o20000);
    p.step(&mut cc);
    assert!(!p.is_busy());
    assert!(matches!(
        p.fault(),
        Some(ProcessorFault::ControlStateMemoryError(
            MemoryAccessError::Address(0o20000)
        ))
    ));
}

#[test]
fn test_normal_state_memory_error_interrupts() {
    let mut cc = CentralControl::new(&MemoryConfiguration::contiguous(1), 1, false);
    let mut p = Processor::new(ProcessorId::P1);
    p.start_at(0o20000);
    p.regs.ncsf = true;
    p.step(&mut cc);
    assert!(p.is_busy());
    assert_eq!(p.fault(), None);
    assert_ne!(cc.processor_interrupt(ProcessorId::P1) & I_ADDRESS, 0);
}

#[test]
fn test_p2_idles_after_interrupt_and_restarts_from_cell_8() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[1 << 2]);
    let mut p2 = processor_at(ProcessorId::P2, true);
    p2.regs.s = 0o5000;
    p2.regs.a = 0o7;
    p2.regs.arof = true;
    let saved = p2.regs.clone();
    cc.set_processor_interrupt(ProcessorId::P2, I_ADDRESS);
    p2.step(&mut cc);
    assert!(!p2.is_busy());
    // R is zero, so the INCW went to cell 8, where P2 starts from.
    assert_eq!(peek(&mut cc, 0o10) & CONTROL_WORD, CONTROL_WORD);
    p2.start_from_cell_8(&mut cc);
    assert!(p2.is_busy());
    assert_eq!(p2.regs.c, saved.c);
    assert_eq!(p2.regs.s, saved.s);
    assert_eq!(p2.regs.a, saved.a);
    assert!(p2.regs.arof);
    assert!(p2.regs.ncsf);
}

#[test]
fn test_dial_operators_and_variant_mode() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[(0o53 << 6) | 0o55, (0o27 << 6) | 0o61, 0o0061, 0o0055]);
    let mut p = processor_at(ProcessorId::P1, false);
    p.regs.salf = true;
    p.step(&mut cc);
    assert_eq!((p.regs.g, p.regs.h), (5, 3));
    p.step(&mut cc);
    assert_eq!((p.regs.k, p.regs.v), (2, 7));
    p.step(&mut cc);
    assert!(p.regs.varf);
    assert!(!p.regs.salf);
    let before = p.regs.clone();
    p.step(&mut cc);
    assert_eq!(p.regs.g, before.g);
    assert_eq!(p.regs.c, PROGRAM + 1);
}

#[test]
fn test_stack_operators() {
    let mut cc = make_cc();
    // LOR, then DUP, XCH and DEL.
    program(&mut cc, PROGRAM, &[0o0215, 0o2025, 0o1025, 0o0051, 0o4015]);
    let mut p = processor_at(ProcessorId::P1, false);
    p.regs.s = 0o5000;
    p.regs.a = FLAG_BIT | 0b1010;
    p.regs.arof = true;
    p.regs.b = 0b0101;
    p.regs.brof = true;
    p.step(&mut cc);
    assert_eq!(p.regs.a, 0b1111);
    assert!(!p.regs.brof);
    p.step(&mut cc);
    assert_eq!((p.regs.a, p.regs.b), (0b1111, 0b1111));
    p.regs.a = 0o55;
    p.step(&mut cc);
    assert_eq!((p.regs.a, p.regs.b), (0b1111, 0o55));
    p.step(&mut cc);
    assert!(!p.regs.arof);
    assert!(p.regs.brof);
    p.step(&mut cc);
    assert_eq!(p.regs.a, FLAG_BIT | 0o55);
}

#[test]
fn test_communicate_sets_syllable_interrupt() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[0o1011]);
    let mut p = processor_at(ProcessorId::P1, true);
    p.regs.r = 0o20;
    p.regs.a = 0o321;
    p.regs.arof = true;
    p.step(&mut cc);
    assert_eq!(peek(&mut cc, 0o20 * 64 + 9), 0o321);
    assert_eq!(cc.current_interrupt(), Some(Interrupt::P1Syllable(4)));
}

#[test]
fn test_initiate_io_stores_descriptor_address() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[0o4411]);
    let mut p = processor_at(ProcessorId::P1, false);
    p.regs.a = 0o500;
    p.regs.arof = true;
    p.step(&mut cc);
    assert_eq!(peek(&mut cc, 0o10), 0o500);
    let io1 = IoUnitId::new(1).expect("valid I/O unit");
    assert_eq!(cc.take_requests(), vec![ControlRequest::InitiateIo(io1)]);
}

#[test]
fn test_control_state_operators_are_ignored_in_normal_state() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[0o4411]);
    let mut p = processor_at(ProcessorId::P1, true);
    p.regs.a = 0o500;
    p.regs.arof = true;
    p.step(&mut cc);
    assert!(p.regs.arof);
    assert!(cc.take_requests().is_empty());
}

#[test]
fn test_cmn_enters_and_exc_leaves_character_mode() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[0o4441, 0o0000]);
    let mut p = processor_at(ProcessorId::P1, false);
    p.regs.s = LOOP_STACK;
    p.regs.a = Word::from(DEST) | (2 << 15);
    p.regs.arof = true;
    p.regs.b = Word::from(SOURCE) | (1 << 15);
    p.regs.brof = true;
    p.step(&mut cc);
    assert!(p.regs.cwmf);
    assert_eq!((p.regs.m, p.regs.g), (DEST, 2));
    assert_eq!((p.regs.s, p.regs.k), (SOURCE, 1));
    assert_eq!(LoopControl::decode(p.regs.x).s, LOOP_STACK);
    p.step(&mut cc);
    assert!(!p.regs.cwmf);
    assert_eq!(p.regs.s, LOOP_STACK);
}

#[test]
fn test_transfer_source_characters() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[char_op(0o76, 5), 0]);
    let mut p = char_mode(&mut cc, "HELLO", "ABCDEFGH");
    run_until_word_mode(&mut p, &mut cc);
    assert_eq!(peek(&mut cc, DEST), chars("HELLOFGH"));
}

#[test]
fn test_transfer_across_word_boundary() {
    let mut cc = make_cc();
    poke(&mut cc, SOURCE + 1, chars("IJKLMNOP"));
    program(&mut cc, PROGRAM, &[char_op(0o76, 10), 0]);
    let mut p = char_mode(&mut cc, "ABCDEFGH", "");
    run_until_word_mode(&mut p, &mut cc);
    assert_eq!(peek(&mut cc, DEST), chars("ABCDEFGH"));
    assert_eq!(peek(&mut cc, DEST + 1), chars("IJ") & !((1 << 36) - 1));
}

#[test]
fn test_compare_fields() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[char_op(0o70, 3), 0]);
    let mut p = char_mode(&mut cc, "ABC", "ABD");
    run_until_word_mode(&mut p, &mut cc);
    assert!(p.regs.tfff);

    program(&mut cc, PROGRAM, &[char_op(0o57, 3), 0]);
    let mut p = char_mode(&mut cc, "ABC", "ABD");
    run_until_word_mode(&mut p, &mut cc);
    assert!(!p.regs.tfff);

    program(&mut cc, PROGRAM, &[char_op(0o57, 2), 0]);
    let mut p = char_mode(&mut cc, "ABC", "ABD");
    run_until_word_mode(&mut p, &mut cc);
    assert!(p.regs.tfff);
}

#[test]
fn test_test_source_character() {
    let mut cc = make_cc();
    // TEQ against 'A' (0o21), then TAN.
    program(&mut cc, PROGRAM, &[char_op(0o24, 0o21)]);
    let mut p = char_mode(&mut cc, "A", "");
    p.step(&mut cc);
    assert!(p.regs.tfff);
    assert_eq!(p.regs.k, 0);
    program(&mut cc, PROGRAM, &[char_op(0o35, 0)]);
    let mut p = char_mode(&mut cc, "*", "");
    p.regs.tfff = true;
    p.step(&mut cc);
    assert!(!p.regs.tfff);
}

#[test]
fn test_loop_repeats_body() {
    let mut cc = make_cc();
    // BNS 3; INC 1; ENS; EXC
    program(
        &mut cc,
        PROGRAM,
        &[char_op(0o51, 3), char_op(0o37, 1), char_op(0o50, 0), 0],
    );
    let mut p = char_mode(&mut cc, "", "");
    let x = p.regs.x;
    run_until_word_mode(&mut p, &mut cc);
    assert_eq!(p.regs.tally, 3);
    assert_eq!(peek(&mut cc, LOOP_STACK + 1), x);
    assert_eq!(p.regs.s, LOOP_STACK);
}

#[test]
fn test_jump_out_of_loop() {
    let mut cc = make_cc();
    // BNS 5; INC 1; JNS 1; ENS; EXC
    program(
        &mut cc,
        PROGRAM,
        &[
            char_op(0o51, 5),
            char_op(0o37, 1),
            char_op(0o45, 1),
            char_op(0o50, 0),
            0,
        ],
    );
    let mut p = char_mode(&mut cc, "", "");
    let x = p.regs.x;
    run_until_word_mode(&mut p, &mut cc);
    assert_eq!(p.regs.tally, 1);
    assert_eq!(p.regs.x, x);
    assert_eq!(p.regs.s, LOOP_STACK);
}

#[test]
fn test_blank_leading_zeros() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[char_op(0o12, 8), 0]);
    let mut p = char_mode(&mut cc, "", "00012345");
    run_until_word_mode(&mut p, &mut cc);
    assert_eq!(peek(&mut cc, DEST), chars("   12345"));
    assert!(!p.regs.tfff);

    program(&mut cc, PROGRAM, &[char_op(0o12, 4), 0]);
    let mut p = char_mode(&mut cc, "", "00001234");
    run_until_word_mode(&mut p, &mut cc);
    assert_eq!(peek(&mut cc, DEST), chars("    1234"));
    assert!(p.regs.tfff);
}

#[test]
fn test_set_and_reset_destination_bits() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[char_op(0o63, 3), char_op(0o64, 1), 0]);
    let mut p = char_mode(&mut cc, "", "");
    poke(&mut cc, DEST, 0);
    run_until_word_mode(&mut p, &mut cc);
    assert_eq!(peek(&mut cc, DEST), 0b111 << 45);

    program(&mut cc, PROGRAM, &[char_op(0o64, 2), 0]);
    let mut p = char_mode(&mut cc, "", "");
    poke(&mut cc, DEST, WORD_MASK);
    run_until_word_mode(&mut p, &mut cc);
    assert_eq!(peek(&mut cc, DEST), WORD_MASK >> 2);
}

#[test]
fn test_restored_destination_bit_index_carries_into_next_character() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[char_op(0o63, 2), 0]);
    let mut p = char_mode(&mut cc, "", "");
    poke(&mut cc, DEST, 0);
    p.regs.h = 7;
    p.store_for_interrupt(&mut cc, false);
    let incw = peek(&mut cc, 8);
    p.initiate(&mut cc, incw, false);
    assert!(p.regs.cwmf);
    assert_eq!(p.regs.h, 7);
    run_until_word_mode(&mut p, &mut cc);
    // Bit 7 of character 0 is bit 1 of character 1.
    assert_eq!(peek(&mut cc, DEST), (1 << 40) | (1 << 39));
}

#[test]
fn test_bit_indexes_6_and_7_cross_character_boundaries() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[char_op(0o64, 1), char_op(0o36, 1), 0]);
    let mut p = char_mode(&mut cc, "", "");
    poke(&mut cc, DEST + 1, WORD_MASK);
    poke(&mut cc, SOURCE, 0o20 << 36);
    p.regs.g = 7;
    p.regs.h = 6;
    p.regs.v = 7;
    run_until_word_mode(&mut p, &mut cc);
    // BIR cleared the first bit of the following word.
    assert_eq!(peek(&mut cc, DEST + 1), WORD_MASK & !(1 << 47));
    assert_eq!(peek(&mut cc, DEST), chars(""));
    // BIT looked at bit 1 of source character 1.
    assert!(p.regs.tfff);
}

#[test]
fn test_output_and_input_conversion() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[char_op(0o65, 4), 0]);
    let mut p = char_mode(&mut cc, "", "ZZZZZZZZ");
    poke(&mut cc, SOURCE, MANTISSA_NEGATIVE_42);
    run_until_word_mode(&mut p, &mut cc);
    // The sign is carried in the zone of the last digit: 2 becomes K.
    assert_eq!(peek(&mut cc, DEST), chars("004KZZZZ"));

    program(&mut cc, PROGRAM, &[char_op(0o66, 4), 0]);
    let mut p = char_mode(&mut cc, "004K", "");
    run_until_word_mode(&mut p, &mut cc);
    assert_eq!(peek(&mut cc, DEST), MANTISSA_NEGATIVE_42);
}

const MANTISSA_NEGATIVE_42: Word = (1 << 46) | 42;

#[test]
fn test_decimal_add() {
    let mut cc = make_cc();
    program(&mut cc, PROGRAM, &[char_op(0o72, 3), 0]);
    let mut p = char_mode(&mut cc, "456", "123");
    run_until_word_mode(&mut p, &mut cc);
    assert_eq!(peek(&mut cc, DEST) >> 30, chars("579") >> 30);
    assert!(!p.regs.tfff);

    program(&mut cc, PROGRAM, &[char_op(0o71, 3), 0]);
    let mut p = char_mode(&mut cc, "200", "150");
    run_until_word_mode(&mut p, &mut cc);
    // 150 - 200 = -50, the sign in the zone of the last digit.
    assert_eq!(peek(&mut cc, DEST) >> 30, chars("05|") >> 30);
}

#[test]
fn test_transfer_program_characters() {
    let mut cc = make_cc();
    let codes = string_to_bic("HI!");
    // TRP 3, the characters packed two per syllable, then EXC.
    program(
        &mut cc,
        PROGRAM,
        &[
            char_op(0o73, 3),
            (u16::from(codes[0]) << 6) | u16::from(codes[1]),
            u16::from(codes[2]) << 6,
            0,
        ],
    );
    let mut p = char_mode(&mut cc, "", "........");
    run_until_word_mode(&mut p, &mut cc);
    assert_eq!(peek(&mut cc, DEST), chars("HI!....."));
}

#[test]
fn test_transfer_words() {
    let mut cc = make_cc();
    poke(&mut cc, SOURCE + 1, 0o1111);
    poke(&mut cc, SOURCE + 2, 0o2222);
    program(&mut cc, PROGRAM, &[char_op(0o05, 2), 0]);
    let mut p = char_mode(&mut cc, "", "");
    p.regs.k = 3;
    run_until_word_mode(&mut p, &mut cc);
    assert_eq!(peek(&mut cc, DEST), 0o1111);
    assert_eq!(peek(&mut cc, DEST + 1), 0o2222);
}

#[test]
fn test_run_slice_stops_at_the_slice_boundary() {
    let mut cc = make_cc();
    // JRV 1 jumps back to itself.
    program(&mut cc, PROGRAM, &[char_op(0o56, 1)]);
    let mut p = char_mode(&mut cc, "", "");
    let cycles = p.run_slice(&mut cc);
    assert!(cycles >= SLICE_CYCLES);
    assert!(cycles < SLICE_CYCLES + 1 + MEMORY_CYCLES);
    assert!(p.is_busy());
    assert_eq!(p.status().cycles, cycles);
}
