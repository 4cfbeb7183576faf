pub(crate) mod instructions;
mod registers;


pub use registers::CpuRegisters;

use crate::memory::ioregisters::IoRegister;
use crate::memory::AddressSpace;
use crate::ppu::PpuState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptType {
    VBlank,
    LcdStatus,
    Timer,
    Serial,
    Joypad,
}

impl InterruptType {
    // Dispatch priority order, highest first (lowest IF bit wins)
    const ALL: [Self; 5] = [Self::VBlank, Self::LcdStatus, Self::Timer, Self::Serial, Self::Joypad];

    pub fn bit(self) -> u8 {
        match self {
            Self::VBlank => 1 << 0,
            Self::LcdStatus => 1 << 1,
            Self::Timer => 1 << 2,
            Self::Serial => 1 << 3,
            Self::Joypad => 1 << 4,
        }
    }

    pub fn handler_address(self) -> u16 {
        match self {
            Self::VBlank => 0x0040,
            Self::LcdStatus => 0x0048,
            Self::Timer => 0x0050,
            Self::Serial => 0x0058,
            Self::Joypad => 0x0060,
        }
    }
}

/// Cycles charged for an interrupt service routine dispatch.
pub const ISR_CYCLES_REQUIRED: u32 = 20;

fn pending_interrupts(address_space: &AddressSpace) -> u8 {
    address_space.get_ie_register()
        & address_space.get_io_registers().read_register(IoRegister::IF)
        & 0x1F
}

/// Whether the CPU should dispatch an interrupt before fetching the next instruction: the
/// master enable must be set (and not deferred by a just-executed EI), and an enabled
/// interrupt must be requested.
pub fn interrupt_triggered(cpu_registers: &CpuRegisters, address_space: &AddressSpace) -> bool {
    cpu_registers.ime && !cpu_registers.interrupt_delay && pending_interrupts(address_space) != 0
}

/// Whether any enabled interrupt is requested, regardless of the master enable. A pending
/// interrupt wakes a HALTed CPU even when IME is clear.
pub fn interrupt_pending(address_space: &AddressSpace) -> bool {
    pending_interrupts(address_space) != 0
}

/// Dispatch the highest-priority pending interrupt: clear IME, acknowledge the request bit,
/// push PC, and jump to the handler address.
pub fn execute_interrupt_service_routine(
    cpu_registers: &mut CpuRegisters,
    address_space: &mut AddressSpace,
    ppu_state: &PpuState,
) {
    let pending = pending_interrupts(address_space);
    let Some(interrupt_type) =
        InterruptType::ALL.into_iter().find(|interrupt_type| pending & interrupt_type.bit() != 0)
    else {
        panic!("interrupt service routine executed with no pending interrupts");
    };

    log::trace!("Dispatching {interrupt_type:?} interrupt, PC={:04X}", cpu_registers.pc);

    cpu_registers.halted = false;
    cpu_registers.ime = false;

    address_space.get_io_registers_mut().interrupt_flags().clear(interrupt_type);

    cpu_registers.sp = cpu_registers.sp.wrapping_sub(2);
    address_space.write_address_u16(cpu_registers.sp, cpu_registers.pc, ppu_state);

    cpu_registers.pc = interrupt_type.handler_address();
}

#[cfg(test)]
mod interrupt_tests {
    use super::*;
    use crate::memory::Cartridge;

    fn test_fixture() -> (CpuRegisters, AddressSpace, PpuState) {
        let cartridge =
            Cartridge::new(vec![0x00; 0x8000], None).expect("synthesized test ROM should be valid");
        (CpuRegisters::new(), AddressSpace::new(cartridge), PpuState::new())
    }

    #[test]
    fn lowest_pending_bit_wins() {
        let (mut cpu_registers, mut address_space, ppu_state) = test_fixture();

        cpu_registers.ime = true;
        address_space.write_address_u8(0xFFFF, 0x1F, &ppu_state);
        address_space.write_address_u8(0xFF0F, 0x14, &ppu_state);

        assert!(interrupt_triggered(&cpu_registers, &address_space));
        execute_interrupt_service_routine(&mut cpu_registers, &mut address_space, &ppu_state);

        assert_eq!(0x0050, cpu_registers.pc);
        assert!(!cpu_registers.ime);
        // Timer bit acknowledged, joypad bit still pending
        assert_eq!(
            0x10,
            address_space.get_io_registers().read_register(IoRegister::IF) & 0x1F
        );
    }

    #[test]
    fn dispatch_pushes_pc() {
        let (mut cpu_registers, mut address_space, ppu_state) = test_fixture();

        cpu_registers.ime = true;
        cpu_registers.pc = 0x1234;
        address_space.write_address_u8(0xFFFF, 0x01, &ppu_state);
        address_space.write_address_u8(0xFF0F, 0x01, &ppu_state);

        execute_interrupt_service_routine(&mut cpu_registers, &mut address_space, &ppu_state);

        assert_eq!(0x0040, cpu_registers.pc);
        assert_eq!(0xFFFC, cpu_registers.sp);
        assert_eq!(0x1234, address_space.read_address_u16(cpu_registers.sp, &ppu_state));
    }

    #[test]
    fn masked_interrupts_do_not_trigger() {
        let (mut cpu_registers, mut address_space, ppu_state) = test_fixture();

        cpu_registers.ime = true;
        address_space.write_address_u8(0xFFFF, 0x01, &ppu_state);
        address_space.write_address_u8(0xFF0F, 0x04, &ppu_state);

        assert!(!interrupt_triggered(&cpu_registers, &address_space));
        assert!(!interrupt_pending(&address_space));
    }

    #[test]
    fn ei_delay_defers_dispatch() {
        let (mut cpu_registers, mut address_space, ppu_state) = test_fixture();

        cpu_registers.ime = true;
        cpu_registers.interrupt_delay = true;
        address_space.write_address_u8(0xFFFF, 0x04, &ppu_state);
        address_space.write_address_u8(0xFF0F, 0x04, &ppu_state);

        assert!(!interrupt_triggered(&cpu_registers, &address_space));
        assert!(interrupt_pending(&address_space));

        cpu_registers.interrupt_delay = false;
        assert!(interrupt_triggered(&cpu_registers, &address_space));
    }
}
