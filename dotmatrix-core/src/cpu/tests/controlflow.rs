use crate::cpu::tests::{hash_map, run_test, ExpectedState};

#[test]
fn jp_skips_over_code() {
    run_test(
        // LD A, 0xFF; JP 0x0158; LD A, 0x01; NOP
        "3EFFC358013E0100",
        &ExpectedState { a: Some(0xFF), ..ExpectedState::empty() },
    );
}

#[test]
fn jp_nz_taken() {
    run_test(
        // LD A, 0xFF; OR A; JP NZ, 0x0159; LD A, 0x01; NOP
        "3EFFB7C259013E0100",
        &ExpectedState { a: Some(0xFF), ..ExpectedState::empty() },
    );
}

#[test]
fn jp_nz_not_taken() {
    run_test(
        // LD A, 0x00; OR A; JP NZ, 0x0159; LD A, 0x42; NOP
        "3E00B7C259013E4200",
        &ExpectedState { a: Some(0x42), ..ExpectedState::empty() },
    );
}

#[test]
fn jr_forward() {
    run_test(
        // LD A, 0xFF; JR +2; LD A, 0x01
        "3EFF18023E01",
        &ExpectedState { a: Some(0xFF), ..ExpectedState::empty() },
    );
}

#[test]
fn jr_z_taken() {
    run_test(
        // LD A, 0x00; OR A; JR Z, +2; LD A, 0x42
        "3E00B728023E42",
        &ExpectedState { a: Some(0x00), ..ExpectedState::empty() },
    );
}

#[test]
fn jr_z_not_taken() {
    run_test(
        // LD A, 0xFF; OR A; JR Z, +2; LD A, 0x42
        "3EFFB728023E42",
        &ExpectedState { a: Some(0x42), ..ExpectedState::empty() },
    );
}

#[test]
fn jr_c_on_carry() {
    run_test(
        // SCF; JR C, +2; LD A, 0x42
        "3738023E42",
        // The load is skipped, leaving the post-boot accumulator
        &ExpectedState { a: Some(0x01), ..ExpectedState::empty() },
    );
}

#[test]
fn call_and_return() {
    // 0x0150: LD SP, 0xC100
    // 0x0153: CALL 0x015A
    // 0x0156: LD A, 0x42
    // 0x0158: JR +4 (to the end of the program)
    // 0x015A: LD A, 0x99
    // 0x015C: RET
    // 0x015D: NOP
    run_test(
        "3100C1CD5A013E4218043E99C900",
        &ExpectedState {
            a: Some(0x42),
            sp: Some(0xC100),
            // The return address 0x0156 stays behind on the stack
            memory: hash_map!(0xC0FE: 0x56, 0xC0FF: 0x01),
            ..ExpectedState::empty()
        },
    );
}

#[test]
fn conditional_call_not_taken() {
    run_test(
        // LD SP, 0xC100; LD A, 0xFF; OR A; CALL Z, 0x0000; LD A, 0x42
        "3100C13EFFB7CC00003E42",
        &ExpectedState { a: Some(0x42), sp: Some(0xC100), ..ExpectedState::empty() },
    );
}

#[test]
fn conditional_return() {
    // 0x0150: LD SP, 0xC100
    // 0x0153: CALL 0x015B
    // 0x0156: LD A, 0x42
    // 0x0158: JR +6 (to the end of the program)
    // 0x015A: NOP
    // 0x015B: OR A      (A = post-boot 0x01, so Z is clear)
    // 0x015C: RET NZ
    // 0x015D: LD A, 0x99 (skipped by the taken return)
    // 0x015F: NOP
    run_test(
        "3100C1CD5B013E42180600B7C03E9900",
        &ExpectedState { a: Some(0x42), sp: Some(0xC100), ..ExpectedState::empty() },
    );
}

#[test]
fn jp_hl() {
    run_test(
        // LD A, 0xFF; LD HL, 0x0159; JP (HL); LD A, 0x01; NOP
        "3EFF215901E93E0100",
        &ExpectedState { a: Some(0xFF), h: Some(0x01), l: Some(0x59), ..ExpectedState::empty() },
    );
}
