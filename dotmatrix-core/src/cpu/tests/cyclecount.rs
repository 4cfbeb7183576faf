use crate::cpu::{instructions, CpuRegisters};
use crate::memory::{AddressSpace, Cartridge};
use crate::ppu::PpuState;

const Z_FLAG: u8 = 0x80;
const C_FLAG: u8 = 0x10;

// Parse the instruction at the start of the given byte sequence and return its cycle count
// given the specified flags register contents.
fn cycles_for(program: &[u8], flags: u8) -> u32 {
    let mut rom = vec![0x00; 0x0150];
    rom.extend_from_slice(program);
    rom.resize(0x8000, 0x00);

    let cartridge = Cartridge::new(rom, None).expect("synthesized test ROM should be valid");
    let address_space = AddressSpace::new(cartridge);
    let ppu_state = PpuState::new_disabled_for_test();

    let mut cpu_registers = CpuRegisters::new();
    cpu_registers.flags = flags;

    let (instruction, _) =
        instructions::parse_next_instruction(&address_space, 0x0150, &ppu_state);
    instruction.cycles_required(&cpu_registers)
}

#[test]
fn single_byte_operations() {
    assert_eq!(4, cycles_for(&[0x00], 0)); // NOP
    assert_eq!(4, cycles_for(&[0x78], 0)); // LD A, B
    assert_eq!(4, cycles_for(&[0x80], 0)); // ADD A, B
    assert_eq!(4, cycles_for(&[0x27], 0)); // DAA
    assert_eq!(4, cycles_for(&[0x07], 0)); // RLCA
    assert_eq!(4, cycles_for(&[0x76], 0)); // HALT
    assert_eq!(4, cycles_for(&[0xF3], 0)); // DI
}

#[test]
fn memory_operands_add_cycles() {
    assert_eq!(8, cycles_for(&[0x3E, 0x00], 0)); // LD A, n
    assert_eq!(8, cycles_for(&[0x7E], 0)); // LD A, (HL)
    assert_eq!(8, cycles_for(&[0x86], 0)); // ADD A, (HL)
    assert_eq!(12, cycles_for(&[0x34], 0)); // INC (HL)
    assert_eq!(12, cycles_for(&[0x36, 0x00], 0)); // LD (HL), n
    assert_eq!(12, cycles_for(&[0xE0, 0x80], 0)); // LDH (n), A
    assert_eq!(16, cycles_for(&[0xEA, 0x00, 0xC0], 0)); // LD (nn), A
}

#[test]
fn sixteen_bit_operations() {
    assert_eq!(12, cycles_for(&[0x01, 0x00, 0x00], 0)); // LD BC, nn
    assert_eq!(8, cycles_for(&[0x03], 0)); // INC BC
    assert_eq!(8, cycles_for(&[0x09], 0)); // ADD HL, BC
    assert_eq!(16, cycles_for(&[0xC5], 0)); // PUSH BC
    assert_eq!(12, cycles_for(&[0xC1], 0)); // POP BC
    assert_eq!(16, cycles_for(&[0xE8, 0x01], 0)); // ADD SP, e
    assert_eq!(12, cycles_for(&[0xF8, 0x01], 0)); // LDHL SP, e
    assert_eq!(8, cycles_for(&[0xF9], 0)); // LD SP, HL
    assert_eq!(20, cycles_for(&[0x08, 0x00, 0xC0], 0)); // LD (nn), SP
}

#[test]
fn control_flow_depends_on_condition() {
    assert_eq!(16, cycles_for(&[0xC3, 0x00, 0x00], 0)); // JP nn
    assert_eq!(4, cycles_for(&[0xE9], 0)); // JP (HL)
    assert_eq!(12, cycles_for(&[0x18, 0x00], 0)); // JR e
    assert_eq!(24, cycles_for(&[0xCD, 0x00, 0x00], 0)); // CALL nn
    assert_eq!(16, cycles_for(&[0xC9], 0)); // RET
    assert_eq!(16, cycles_for(&[0xD9], 0)); // RETI
    assert_eq!(16, cycles_for(&[0xC7], 0)); // RST 00

    // JP Z taken/not taken
    assert_eq!(16, cycles_for(&[0xCA, 0x00, 0x00], Z_FLAG));
    assert_eq!(12, cycles_for(&[0xCA, 0x00, 0x00], 0));

    // JR C taken/not taken
    assert_eq!(12, cycles_for(&[0x38, 0x00], C_FLAG));
    assert_eq!(8, cycles_for(&[0x38, 0x00], 0));

    // CALL NZ taken/not taken
    assert_eq!(24, cycles_for(&[0xC4, 0x00, 0x00], 0));
    assert_eq!(12, cycles_for(&[0xC4, 0x00, 0x00], Z_FLAG));

    // RET NC taken/not taken
    assert_eq!(20, cycles_for(&[0xD0], 0));
    assert_eq!(8, cycles_for(&[0xD0], C_FLAG));
}

#[test]
fn prefixed_operations() {
    assert_eq!(8, cycles_for(&[0xCB, 0x00], 0)); // RLC B
    assert_eq!(8, cycles_for(&[0xCB, 0x37], 0)); // SWAP A
    assert_eq!(16, cycles_for(&[0xCB, 0x06], 0)); // RLC (HL)
    assert_eq!(8, cycles_for(&[0xCB, 0x47], 0)); // BIT 0, A
    assert_eq!(12, cycles_for(&[0xCB, 0x46], 0)); // BIT 0, (HL)
    assert_eq!(16, cycles_for(&[0xCB, 0xC6], 0)); // SET 0, (HL)
    assert_eq!(16, cycles_for(&[0xCB, 0x86], 0)); // RES 0, (HL)
}

#[test]
fn undocumented_opcodes_are_four_cycles() {
    for opcode in [0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD] {
        assert_eq!(4, cycles_for(&[opcode], 0), "opcode {opcode:02X}");
    }
}

#[test]
fn undocumented_opcodes_advance_pc_by_one() {
    let mut rom = vec![0x00; 0x8000];
    rom[0x0150] = 0xD3;

    let cartridge = Cartridge::new(rom, None).expect("synthesized test ROM should be valid");
    let address_space = AddressSpace::new(cartridge);
    let ppu_state = PpuState::new_disabled_for_test();

    let (instruction, pc) =
        instructions::parse_next_instruction(&address_space, 0x0150, &ppu_state);
    assert_eq!(0x0151, pc);

    let mut cpu_registers = CpuRegisters::new();
    let mut address_space = address_space;
    instruction.execute(&mut address_space, &mut cpu_registers, &ppu_state);
    assert_eq!(CpuRegisters::new(), cpu_registers);
}
