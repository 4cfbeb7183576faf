use crate::cpu::tests::{hash_map, run_test, ExpectedState};

#[test]
fn rlca_never_sets_zero() {
    run_test(
        // LD A, 0x85; RLCA
        "3E8507",
        &ExpectedState { a: Some(0x0B), f: Some(0x10), ..ExpectedState::empty() },
    );
}

#[test]
fn rla_shifts_carry_in() {
    run_test(
        // OR A; LD A, 0x80; RLA
        "B73E8017",
        // Result is 0 but the accumulator rotate variants always clear Z
        &ExpectedState { a: Some(0x00), f: Some(0x10), ..ExpectedState::empty() },
    );
}

#[test]
fn rrca_rotates_into_bit_7() {
    run_test(
        // LD A, 0x01; RRCA
        "3E010F",
        &ExpectedState { a: Some(0x80), f: Some(0x10), ..ExpectedState::empty() },
    );
}

#[test]
fn rra_shifts_carry_in() {
    run_test(
        // OR A; LD A, 0x01; RRA
        "B73E011F",
        &ExpectedState { a: Some(0x00), f: Some(0x10), ..ExpectedState::empty() },
    );
}

#[test]
fn rlc_register() {
    run_test(
        // LD B, 0x80; RLC B
        "0680CB00",
        &ExpectedState { b: Some(0x01), f: Some(0x10), ..ExpectedState::empty() },
    );
}

#[test]
fn rlc_zero_result_sets_z() {
    run_test(
        // LD B, 0x00; RLC B
        "0600CB00",
        &ExpectedState { b: Some(0x00), f: Some(0x80), ..ExpectedState::empty() },
    );
}

#[test]
fn rl_uses_carry_in() {
    run_test(
        // SCF; LD B, 0x00; RL B
        "370600CB10",
        &ExpectedState { b: Some(0x01), f: Some(0x00), ..ExpectedState::empty() },
    );
}

#[test]
fn rrc_register() {
    run_test(
        // LD C, 0x01; RRC C
        "0E01CB09",
        &ExpectedState { c: Some(0x80), f: Some(0x10), ..ExpectedState::empty() },
    );
}

#[test]
fn rr_uses_carry_in() {
    run_test(
        // SCF; LD C, 0x00; RR C
        "370E00CB19",
        &ExpectedState { c: Some(0x80), f: Some(0x00), ..ExpectedState::empty() },
    );
}

#[test]
fn sla_shifts_out_high_bit() {
    run_test(
        // LD D, 0xC0; SLA D
        "16C0CB22",
        &ExpectedState { d: Some(0x80), f: Some(0x10), ..ExpectedState::empty() },
    );
}

#[test]
fn sra_preserves_sign_bit() {
    run_test(
        // LD E, 0x81; SRA E
        "1E81CB2B",
        &ExpectedState { e: Some(0xC0), f: Some(0x10), ..ExpectedState::empty() },
    );
}

#[test]
fn srl_clears_high_bit() {
    run_test(
        // LD H, 0x01; SRL H
        "2601CB3C",
        &ExpectedState { h: Some(0x00), f: Some(0x90), ..ExpectedState::empty() },
    );
}

#[test]
fn swap_nibbles() {
    run_test(
        // LD L, 0xF0; SWAP L
        "2EF0CB35",
        &ExpectedState { l: Some(0x0F), f: Some(0x00), ..ExpectedState::empty() },
    );
}

#[test]
fn swap_zero_sets_z() {
    run_test(
        // LD L, 0x00; SWAP L
        "2E00CB35",
        &ExpectedState { l: Some(0x00), f: Some(0x80), ..ExpectedState::empty() },
    );
}

#[test]
fn shift_indirect_hl() {
    run_test(
        // LD HL, 0xC000; LD (HL), 0x80; SLA (HL)
        "2100C03680CB26",
        &ExpectedState {
            f: Some(0x90),
            memory: hash_map!(0xC000: 0x00),
            ..ExpectedState::empty()
        },
    );
}
