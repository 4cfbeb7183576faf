use crate::cpu::instructions::{Instruction, JumpCondition, ModifyTarget, ReadTarget, WriteTarget};
use crate::cpu::registers::{CpuRegister, CpuRegisterPair};
use crate::memory::AddressSpace;
use crate::ppu::PpuState;

/// Decode the instruction at the given PC. Returns the instruction together with the address
/// of the following instruction.
///
/// Decoding is total: both the primary and the CB-prefixed opcode tables are dense, with the
/// eleven undocumented primary opcodes decoding to 4-cycle no-ops.
pub fn parse_next_instruction(
    address_space: &AddressSpace,
    pc: u16,
    ppu_state: &PpuState,
) -> (Instruction, u16) {
    let opcode = address_space.read_address_u8(pc, ppu_state);

    let read_imm_u8 = || address_space.read_address_u8(pc.wrapping_add(1), ppu_state);
    let read_imm_i8 = || address_space.read_address_u8(pc.wrapping_add(1), ppu_state) as i8;
    let read_imm_u16 = || address_space.read_address_u16(pc.wrapping_add(1), ppu_state);

    match opcode {
        0x00 => (Instruction::NoOp, pc + 1),
        0x01 | 0x11 | 0x21 | 0x31 => {
            let rr = register_pair_for_other_ops(opcode);
            (Instruction::LoadRegisterPairImmediate(rr, read_imm_u16()), pc + 3)
        }
        0x02 => (Instruction::Load(WriteTarget::IndirectBC, ReadTarget::Accumulator), pc + 1),
        0x03 | 0x13 | 0x23 | 0x33 => {
            (Instruction::IncRegisterPair(register_pair_for_other_ops(opcode)), pc + 1)
        }
        0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
            (Instruction::Increment(modify_target_from_mid_bits(opcode)), pc + 1)
        }
        0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
            (Instruction::Decrement(modify_target_from_mid_bits(opcode)), pc + 1)
        }
        0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
            let write_target = write_target_from_mid_bits(opcode);
            (Instruction::Load(write_target, ReadTarget::Immediate(read_imm_u8())), pc + 2)
        }
        0x07 => (Instruction::RotateLeft(ModifyTarget::Accumulator), pc + 1),
        0x08 => (Instruction::LoadDirectStackPointer(read_imm_u16()), pc + 3),
        0x09 | 0x19 | 0x29 | 0x39 => {
            (Instruction::AddHLRegister(register_pair_for_other_ops(opcode)), pc + 1)
        }
        0x0A => (Instruction::Load(WriteTarget::Accumulator, ReadTarget::IndirectBC), pc + 1),
        0x0B | 0x1B | 0x2B | 0x3B => {
            (Instruction::DecRegisterPair(register_pair_for_other_ops(opcode)), pc + 1)
        }
        0x0F => (Instruction::RotateRight(ModifyTarget::Accumulator), pc + 1),
        0x10 => (Instruction::Stop, pc + 2),
        0x12 => (Instruction::Load(WriteTarget::IndirectDE, ReadTarget::Accumulator), pc + 1),
        0x17 => (Instruction::RotateLeftThruCarry(ModifyTarget::Accumulator), pc + 1),
        0x18 => (Instruction::RelativeJump(read_imm_i8()), pc + 2),
        0x1A => (Instruction::Load(WriteTarget::Accumulator, ReadTarget::IndirectDE), pc + 1),
        0x1F => (Instruction::RotateRightThruCarry(ModifyTarget::Accumulator), pc + 1),
        0x20 | 0x28 | 0x30 | 0x38 => {
            let cc = parse_jump_condition(opcode);
            (Instruction::RelativeJumpCond(cc, read_imm_i8()), pc + 2)
        }
        0x22 => (Instruction::Load(WriteTarget::IndirectHLInc, ReadTarget::Accumulator), pc + 1),
        0x27 => (Instruction::DecimalAdjustAccumulator, pc + 1),
        0x2A => (Instruction::Load(WriteTarget::Accumulator, ReadTarget::IndirectHLInc), pc + 1),
        0x2F => (Instruction::ComplementAccumulator, pc + 1),
        0x32 => (Instruction::Load(WriteTarget::IndirectHLDec, ReadTarget::Accumulator), pc + 1),
        0x37 => (Instruction::SetCarryFlag, pc + 1),
        0x3A => (Instruction::Load(WriteTarget::Accumulator, ReadTarget::IndirectHLDec), pc + 1),
        0x3F => (Instruction::ComplementCarryFlag, pc + 1),
        0x76 => (Instruction::Halt, pc + 1),
        opcode @ 0x40..=0x7F => {
            let write_target = write_target_from_mid_bits(opcode);
            let read_target = read_target_from_low_bits(opcode);
            (Instruction::Load(write_target, read_target), pc + 1)
        }
        opcode @ 0x80..=0xBF => {
            (arithmetic_instruction(opcode, read_target_from_low_bits(opcode)), pc + 1)
        }
        0xC0 | 0xC8 | 0xD0 | 0xD8 => {
            (Instruction::ReturnCond(parse_jump_condition(opcode)), pc + 1)
        }
        0xC1 | 0xD1 | 0xE1 | 0xF1 => {
            (Instruction::PopStack(register_pair_for_push_pop(opcode)), pc + 1)
        }
        0xC2 | 0xCA | 0xD2 | 0xDA => {
            let cc = parse_jump_condition(opcode);
            (Instruction::JumpCond(cc, read_imm_u16()), pc + 3)
        }
        0xC3 => (Instruction::Jump(read_imm_u16()), pc + 3),
        0xC4 | 0xCC | 0xD4 | 0xDC => {
            let cc = parse_jump_condition(opcode);
            (Instruction::CallCond(cc, read_imm_u16()), pc + 3)
        }
        0xC5 | 0xD5 | 0xE5 | 0xF5 => {
            (Instruction::PushStack(register_pair_for_push_pop(opcode)), pc + 1)
        }
        0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
            (arithmetic_instruction(opcode, ReadTarget::Immediate(read_imm_u8())), pc + 2)
        }
        0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
            (Instruction::RestartCall(opcode & 0x38), pc + 1)
        }
        0xC9 => (Instruction::Return, pc + 1),
        0xCB => parse_cb_prefixed_opcode(address_space, pc, ppu_state),
        0xCD => (Instruction::Call(read_imm_u16()), pc + 3),
        0xD9 => (Instruction::ReturnFromInterruptHandler, pc + 1),
        0xE0 => (Instruction::Load(WriteTarget::FFDirect(read_imm_u8()), ReadTarget::Accumulator), pc + 2),
        0xE2 => (Instruction::Load(WriteTarget::FFIndirectC, ReadTarget::Accumulator), pc + 1),
        0xE8 => (Instruction::AddSPImmediate(read_imm_i8()), pc + 2),
        0xE9 => (Instruction::JumpHL, pc + 1),
        0xEA => (Instruction::Load(WriteTarget::Direct(read_imm_u16()), ReadTarget::Accumulator), pc + 3),
        0xF0 => (Instruction::Load(WriteTarget::Accumulator, ReadTarget::FFDirect(read_imm_u8())), pc + 2),
        0xF2 => (Instruction::Load(WriteTarget::Accumulator, ReadTarget::FFIndirectC), pc + 1),
        0xF3 => (Instruction::DisableInterrupts, pc + 1),
        0xF8 => (Instruction::LoadHLStackPointerOffset(read_imm_i8()), pc + 2),
        0xF9 => (Instruction::LoadStackPointerHL, pc + 1),
        0xFA => (Instruction::Load(WriteTarget::Accumulator, ReadTarget::Direct(read_imm_u16())), pc + 3),
        0xFB => (Instruction::EnableInterrupts, pc + 1),
        // 0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD
        _ => (Instruction::UndocumentedNoOp(opcode), pc + 1),
    }
}

fn parse_cb_prefixed_opcode(
    address_space: &AddressSpace,
    pc: u16,
    ppu_state: &PpuState,
) -> (Instruction, u16) {
    let opcode = address_space.read_address_u8(pc.wrapping_add(1), ppu_state);

    let instruction = match opcode {
        opcode @ 0x00..=0x3F => {
            let modify_target = modify_target_from_low_bits(opcode);
            match opcode & 0x38 {
                0x00 => Instruction::RotateLeft(modify_target),
                0x08 => Instruction::RotateRight(modify_target),
                0x10 => Instruction::RotateLeftThruCarry(modify_target),
                0x18 => Instruction::RotateRightThruCarry(modify_target),
                0x20 => Instruction::ShiftLeft(modify_target),
                0x28 => Instruction::ArithmeticShiftRight(modify_target),
                0x30 => Instruction::Swap(modify_target),
                0x38 => Instruction::LogicalShiftRight(modify_target),
                _ => unreachable!("{opcode} & 0x38 produced a value outside 0x00..=0x38"),
            }
        }
        opcode @ 0x40..=0x7F => {
            Instruction::TestBit((opcode & 0x38) >> 3, read_target_from_low_bits(opcode))
        }
        opcode @ 0x80..=0xBF => {
            Instruction::ResetBit((opcode & 0x38) >> 3, modify_target_from_low_bits(opcode))
        }
        opcode @ 0xC0..=0xFF => {
            Instruction::SetBit((opcode & 0x38) >> 3, modify_target_from_low_bits(opcode))
        }
    };

    (instruction, pc + 2)
}

// ADD/ADC/SUB/SBC/AND/XOR/OR/CP, selected by bits 3-5 of the opcode
fn arithmetic_instruction(opcode: u8, read_target: ReadTarget) -> Instruction {
    match opcode & 0x38 {
        0x00 => Instruction::Add(read_target),
        0x08 => Instruction::AddWithCarry(read_target),
        0x10 => Instruction::Subtract(read_target),
        0x18 => Instruction::SubtractWithCarry(read_target),
        0x20 => Instruction::And(read_target),
        0x28 => Instruction::Xor(read_target),
        0x30 => Instruction::Or(read_target),
        0x38 => Instruction::Compare(read_target),
        _ => unreachable!("{opcode} & 0x38 produced a value outside 0x00..=0x38"),
    }
}

// Register operands live in bits 0-2 (source position) or bits 3-5 (destination
// position); operand field value 6 means (HL) in either position.

fn read_target_from_low_bits(opcode: u8) -> ReadTarget {
    CpuRegister::from_opcode_bits(opcode).map_or(ReadTarget::IndirectHL, ReadTarget::Register)
}

fn modify_target_from_low_bits(opcode: u8) -> ModifyTarget {
    CpuRegister::from_opcode_bits(opcode).map_or(ModifyTarget::IndirectHL, ModifyTarget::Register)
}

fn modify_target_from_mid_bits(opcode: u8) -> ModifyTarget {
    CpuRegister::from_opcode_bits(opcode >> 3)
        .map_or(ModifyTarget::IndirectHL, ModifyTarget::Register)
}

fn write_target_from_mid_bits(opcode: u8) -> WriteTarget {
    CpuRegister::from_opcode_bits(opcode >> 3)
        .map_or(WriteTarget::IndirectHL, WriteTarget::Register)
}

fn register_pair_for_other_ops(opcode: u8) -> CpuRegisterPair {
    match opcode & 0x30 {
        0x00 => CpuRegisterPair::BC,
        0x10 => CpuRegisterPair::DE,
        0x20 => CpuRegisterPair::HL,
        0x30 => CpuRegisterPair::SP,
        _ => unreachable!("{opcode} & 0x30 produced a value outside 0x00..=0x30"),
    }
}

fn register_pair_for_push_pop(opcode: u8) -> CpuRegisterPair {
    match opcode & 0x30 {
        0x00 => CpuRegisterPair::BC,
        0x10 => CpuRegisterPair::DE,
        0x20 => CpuRegisterPair::HL,
        0x30 => CpuRegisterPair::AF,
        _ => unreachable!("{opcode} & 0x30 produced a value outside 0x00..=0x30"),
    }
}

fn parse_jump_condition(opcode: u8) -> JumpCondition {
    match opcode & 0x18 {
        0x00 => JumpCondition::NZ,
        0x08 => JumpCondition::Z,
        0x10 => JumpCondition::NC,
        0x18 => JumpCondition::C,
        _ => unreachable!("{opcode} & 0x18 produced a value outside 0x00..=0x18"),
    }
}
